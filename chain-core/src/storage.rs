//! Chain snapshot persistence
//!
//! The whole chain is written as one JSON document on every production:
//!
//! ```json
//! {
//!   "version": 1,
//!   "blocks": [
//!     { "index": 0, "timestamp": "...", "transactions": "Genesis Block",
//!       "previous_hash": "000…", "hash": "…" },
//!     { "index": 1, "timestamp": "...",
//!       "transactions": [ { "sender": "…", "receiver": "…", "amount": 7, "signature": "…" } ],
//!       "previous_hash": "…", "hash": "…" }
//!   ]
//! }
//! ```
//!
//! Keys, signatures and hashes are lowercase hex. Writes go to `<path>.tmp`
//! first and are renamed over `<path>`, so a reader never sees a torn file.

use crate::{
    ledger::Ledger,
    transaction::verify_transaction,
    types::{Block, BlockHash, BlockPayload, PublicKey, Signature, Transaction, GENESIS_MARKER},
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Schema version
    pub version: u32,
    /// Blocks in index order
    pub blocks: Vec<BlockRecord>,
}

/// On-disk block record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block height
    pub index: u64,
    /// Creation time (RFC 3339, nanosecond precision)
    pub timestamp: DateTime<Utc>,
    /// Genesis marker string or transaction list
    pub transactions: PayloadRecord,
    /// Hex hash of the predecessor
    pub previous_hash: String,
    /// Hex hash of this block
    pub hash: String,
}

/// On-disk block payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadRecord {
    /// Genesis marker
    Marker(String),
    /// Transaction batch
    Transactions(Vec<TransactionRecord>),
}

/// On-disk transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Hex sender key
    pub sender: String,
    /// Hex receiver key
    pub receiver: String,
    /// Amount
    pub amount: u64,
    /// Hex signature
    pub signature: String,
}

impl From<&Transaction> for TransactionRecord {
    fn from(tx: &Transaction) -> Self {
        Self {
            sender: tx.sender().to_hex(),
            receiver: tx.receiver().to_hex(),
            amount: tx.amount(),
            signature: tx.signature().to_hex(),
        }
    }
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = Error;

    fn try_from(record: TransactionRecord) -> Result<Self> {
        Ok(Transaction::from_parts(
            PublicKey::from_hex(&record.sender)?,
            PublicKey::from_hex(&record.receiver)?,
            record.amount,
            Signature::from_hex(&record.signature)?,
        ))
    }
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        let transactions = match block.payload() {
            BlockPayload::Genesis => PayloadRecord::Marker(GENESIS_MARKER.to_string()),
            BlockPayload::Transactions(txs) => {
                PayloadRecord::Transactions(txs.iter().map(TransactionRecord::from).collect())
            }
        };

        Self {
            index: block.index(),
            timestamp: *block.timestamp(),
            transactions,
            previous_hash: block.previous_hash().to_hex(),
            hash: block.hash().to_hex(),
        }
    }
}

impl TryFrom<BlockRecord> for Block {
    type Error = Error;

    fn try_from(record: BlockRecord) -> Result<Self> {
        if record.timestamp.timestamp_nanos_opt().is_none() {
            return Err(Error::Snapshot(format!(
                "block {}: timestamp {} outside the hashable range",
                record.index, record.timestamp
            )));
        }

        let payload = match record.transactions {
            PayloadRecord::Marker(marker) if marker == GENESIS_MARKER => BlockPayload::Genesis,
            PayloadRecord::Marker(marker) => {
                return Err(Error::Snapshot(format!(
                    "block {}: unknown payload marker {:?}",
                    record.index, marker
                )))
            }
            PayloadRecord::Transactions(records) => BlockPayload::Transactions(
                records
                    .into_iter()
                    .map(Transaction::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        Ok(Block::from_parts(
            record.index,
            record.timestamp,
            payload,
            BlockHash::from_hex(&record.previous_hash)?,
            BlockHash::from_hex(&record.hash)?,
        ))
    }
}

/// Serialize `blocks` into snapshot bytes
pub fn encode_snapshot<B: AsRef<Block>>(blocks: &[B]) -> Result<Vec<u8>> {
    let snapshot = ChainSnapshot {
        version: SNAPSHOT_VERSION,
        blocks: blocks.iter().map(|b| BlockRecord::from(b.as_ref())).collect(),
    };
    let mut bytes = serde_json::to_vec_pretty(&snapshot)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse snapshot bytes into blocks (no chain validation)
pub fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Block>> {
    let snapshot: ChainSnapshot = serde_json::from_slice(bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::UnsupportedSnapshotVersion(snapshot.version));
    }
    snapshot.blocks.into_iter().map(Block::try_from).collect()
}

/// Snapshot file location and read/write operations
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a snapshot file exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Replace the snapshot with the full `blocks` sequence
    pub fn persist<B: AsRef<Block>>(&self, blocks: &[B]) -> Result<()> {
        let bytes = encode_snapshot(blocks)?;
        write_atomic(&self.path, &bytes)?;
        tracing::debug!(
            path = %self.path.display(),
            blocks = blocks.len(),
            bytes = bytes.len(),
            "Snapshot written"
        );
        Ok(())
    }

    /// Read the snapshot back as blocks, without validating the chain
    pub fn load(&self) -> Result<Vec<Block>> {
        let bytes = fs::read(&self.path)?;
        decode_snapshot(&bytes)
    }

    /// Read the snapshot and rebuild a ledger from it.
    ///
    /// Fails with [`Error::IntegrityViolation`] when the hash chain is broken or
    /// a stored transaction does not verify.
    pub fn load_ledger(&self) -> Result<Ledger> {
        let blocks = self.load()?;

        for block in &blocks {
            if let Some(position) = block.transactions().iter().position(|tx| !verify_transaction(tx)) {
                return Err(Error::IntegrityViolation {
                    index: block.index(),
                    reason: format!("transaction {} has an invalid signature", position),
                });
            }
        }

        Ledger::from_blocks(blocks)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Write `bytes` to `<path>.tmp`, fsync, rename over `path`, fsync the directory
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);

    let staged = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });

    // `<path>.tmp` is removed whichever step failed
    if let Err(e) = staged.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fsync_parent(path)
}

#[cfg(target_family = "unix")]
fn fsync_parent(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

#[cfg(not(target_family = "unix"))]
fn fsync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
