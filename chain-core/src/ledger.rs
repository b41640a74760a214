//! Hash-linked block sequence
//!
//! Free functions build and check blocks; [`Ledger`] is the shared container the
//! block producer appends to and the snapshot writer reads from.
//!
//! # Invariants
//!
//! - Block 0 is the genesis block: zero previous hash, marker payload
//! - Indices are contiguous from 0
//! - `blocks[i].previous_hash == blocks[i - 1].hash` for every i > 0
//! - Every stored hash recomputes from the block's own fields

use crate::{
    canonical::block_preimage,
    crypto::hash_bytes,
    types::{Block, BlockHash, BlockPayload, Transaction},
    Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Nanoseconds since the Unix epoch, as hashed into a block.
///
/// Fails with [`Error::InvalidBlock`] for instants an `i64` of nanoseconds
/// cannot hold (before 1677 or after 2262).
pub fn timestamp_nanos(timestamp: &DateTime<Utc>) -> Result<i64> {
    timestamp.timestamp_nanos_opt().ok_or_else(|| {
        Error::InvalidBlock(format!("timestamp {} outside the hashable range", timestamp))
    })
}

/// SHA-256 over `index ∥ timestamp ∥ payload ∥ previous_hash`.
///
/// Blocks with an unhashable timestamp never validate and are refused by
/// [`Ledger::push`], so the value hashed for them is irrelevant.
pub fn compute_block_hash(
    index: u64,
    timestamp: &DateTime<Utc>,
    payload: &BlockPayload,
    previous_hash: &BlockHash,
) -> BlockHash {
    let preimage = block_preimage(
        index,
        timestamp_nanos(timestamp).unwrap_or(i64::MIN),
        payload,
        previous_hash,
    );
    BlockHash::from_bytes(hash_bytes(&preimage))
}

/// Genesis block stamped with the current time
pub fn genesis_block() -> Block {
    genesis_block_at(Utc::now())
}

/// Genesis block with an explicit timestamp
pub fn genesis_block_at(timestamp: DateTime<Utc>) -> Block {
    Block::seal(0, timestamp, BlockPayload::Genesis, BlockHash::ZERO)
}

/// Next block after `previous`, stamped with the current time.
///
/// Only builds the block; pushing it onto a [`Ledger`] is the caller's job.
pub fn append_block(previous: &Block, transactions: Vec<Transaction>) -> Block {
    append_block_at(previous, transactions, Utc::now())
}

/// Next block after `previous` with an explicit timestamp
pub fn append_block_at(
    previous: &Block,
    transactions: Vec<Transaction>,
    timestamp: DateTime<Utc>,
) -> Block {
    Block::seal(
        previous.index() + 1,
        timestamp,
        BlockPayload::Transactions(transactions),
        *previous.hash(),
    )
}

/// Outcome of [`validate_chain`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainValidation {
    /// Every check passed
    Valid,
    /// First failing block
    Invalid {
        /// Index (position) of the offending block
        index: u64,
        /// What did not match
        reason: String,
    },
}

impl ChainValidation {
    /// Whether the chain passed
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainValidation::Valid)
    }

    /// Convert into an [`Error::IntegrityViolation`] on failure
    pub fn into_result(self) -> Result<()> {
        match self {
            ChainValidation::Valid => Ok(()),
            ChainValidation::Invalid { index, reason } => {
                Err(Error::IntegrityViolation { index, reason })
            }
        }
    }

    fn invalid(index: u64, reason: impl Into<String>) -> Self {
        ChainValidation::Invalid {
            index,
            reason: reason.into(),
        }
    }
}

fn check_genesis(block: &Block) -> ChainValidation {
    if block.index() != 0 {
        return ChainValidation::invalid(0, format!("first block has index {}", block.index()));
    }
    if !block.payload().is_genesis() {
        return ChainValidation::invalid(0, "first block does not carry the genesis marker");
    }
    if *block.previous_hash() != BlockHash::ZERO {
        return ChainValidation::invalid(0, "genesis previous hash is not zero");
    }
    if timestamp_nanos(block.timestamp()).is_err() {
        return ChainValidation::invalid(0, "genesis timestamp outside the hashable range");
    }
    if block.compute_hash() != *block.hash() {
        return ChainValidation::invalid(0, "genesis hash does not match contents");
    }
    ChainValidation::Valid
}

/// Check the hash-chain invariant over `blocks`, stopping at the first failure
pub fn validate_chain<B: AsRef<Block>>(blocks: &[B]) -> ChainValidation {
    let Some(first) = blocks.first() else {
        return ChainValidation::invalid(0, "chain is empty");
    };

    let genesis = check_genesis(first.as_ref());
    if !genesis.is_valid() {
        return genesis;
    }

    for (position, pair) in blocks.windows(2).enumerate() {
        let previous = pair[0].as_ref();
        let block = pair[1].as_ref();
        let expected = position as u64 + 1;

        if block.index() != expected {
            return ChainValidation::invalid(
                expected,
                format!("index {} out of sequence", block.index()),
            );
        }
        if block.payload().is_genesis() {
            return ChainValidation::invalid(expected, "genesis marker after block 0");
        }
        if block.previous_hash() != previous.hash() {
            return ChainValidation::invalid(
                expected,
                format!(
                    "previous hash {} does not match block {} hash {}",
                    block.previous_hash(),
                    previous.index(),
                    previous.hash()
                ),
            );
        }
        if timestamp_nanos(block.timestamp()).is_err() {
            return ChainValidation::invalid(expected, "timestamp outside the hashable range");
        }
        if block.compute_hash() != *block.hash() {
            return ChainValidation::invalid(expected, "hash does not match contents");
        }
    }

    ChainValidation::Valid
}

/// Append-only chain shared between the producer and readers.
///
/// Blocks are stored behind `Arc` so readers can take a copy of the sequence
/// under a short read lock and work on it without blocking the producer.
#[derive(Debug)]
pub struct Ledger {
    genesis: Arc<Block>,
    tail: RwLock<Vec<Arc<Block>>>,
}

impl Ledger {
    /// Fresh ledger holding only a new genesis block
    pub fn new() -> Self {
        Self::with_genesis(genesis_block())
    }

    fn with_genesis(genesis: Block) -> Self {
        Self {
            genesis: Arc::new(genesis),
            tail: RwLock::new(Vec::new()),
        }
    }

    /// Rebuild a ledger from persisted blocks.
    ///
    /// Fails with [`Error::IntegrityViolation`] if the blocks do not form a
    /// valid chain.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self> {
        validate_chain(&blocks).into_result()?;

        let mut blocks = blocks.into_iter();
        let genesis = blocks.next().ok_or_else(|| Error::IntegrityViolation {
            index: 0,
            reason: "chain is empty".to_string(),
        })?;

        Ok(Self {
            genesis: Arc::new(genesis),
            tail: RwLock::new(blocks.map(Arc::new).collect()),
        })
    }

    /// Genesis block
    pub fn genesis(&self) -> Arc<Block> {
        self.genesis.clone()
    }

    /// Latest block
    pub fn tip(&self) -> Arc<Block> {
        self.tail
            .read()
            .last()
            .cloned()
            .unwrap_or_else(|| self.genesis.clone())
    }

    /// Index of the latest block
    pub fn height(&self) -> u64 {
        self.tip().index()
    }

    /// Number of blocks including genesis
    pub fn block_count(&self) -> usize {
        self.tail.read().len() + 1
    }

    /// Block at `index`
    pub fn get(&self, index: u64) -> Option<Arc<Block>> {
        if index == 0 {
            return Some(self.genesis.clone());
        }
        let position = usize::try_from(index - 1).ok()?;
        self.tail.read().get(position).cloned()
    }

    /// Consistent copy of the whole sequence
    pub fn blocks(&self) -> Vec<Arc<Block>> {
        let tail = self.tail.read();
        let mut blocks = Vec::with_capacity(tail.len() + 1);
        blocks.push(self.genesis.clone());
        blocks.extend(tail.iter().cloned());
        blocks
    }

    /// Append `block` if it extends the current tip.
    ///
    /// The tip check and the push happen under one write lock, so two blocks
    /// built against the same tip can never both land.
    pub fn push(&self, block: Block) -> Result<Arc<Block>> {
        let mut tail = self.tail.write();
        let tip = tail.last().unwrap_or(&self.genesis);

        if block.index() != tip.index() + 1 || block.previous_hash() != tip.hash() {
            return Err(Error::StaleTip {
                index: block.index(),
                previous_hash: block.previous_hash().to_hex(),
                tip_hash: tip.hash().to_hex(),
            });
        }
        if block.payload().is_genesis() {
            return Err(Error::InvalidBlock(format!(
                "block {} carries the genesis marker",
                block.index()
            )));
        }
        timestamp_nanos(block.timestamp())?;
        if block.compute_hash() != *block.hash() {
            return Err(Error::InvalidBlock(format!(
                "block {} hash does not match contents",
                block.index()
            )));
        }

        let block = Arc::new(block);
        tail.push(block.clone());
        Ok(block)
    }

    /// Validate the current sequence
    pub fn validate(&self) -> ChainValidation {
        validate_chain(&self.blocks())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
