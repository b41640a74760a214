//! Block producer
//!
//! Periodic task that drains a batch from the mempool into a new block:
//!
//! ```text
//! Idle ──tick──▶ CheckPool ──empty──▶ Idle
//!                    │
//!                    └─▶ Producing ──▶ AppendAndPersist ──▶ Idle
//! ```
//!
//! A tick body never runs twice at once: a tick that finds another in flight
//! returns [`TickOutcome::Busy`] without touching the pool. Snapshot failures
//! are logged and counted; the in-memory append stands and the next
//! production rewrites the full chain.

use crate::{
    config::ProducerConfig,
    ledger::{append_block, Ledger},
    mempool::Mempool,
    metrics::Metrics,
    storage::SnapshotStore,
    transaction::verify_transaction,
    types::{Block, Transaction},
    Result,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of one producer tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Mempool was empty
    Idle,
    /// Another tick was already running
    Busy,
    /// A block was appended
    Produced {
        /// Index of the new block
        index: u64,
        /// Transactions included
        tx_count: usize,
        /// Whether the snapshot write succeeded
        persisted: bool,
    },
    /// Every dequeued transaction failed verification; no block was made
    Rejected {
        /// Transactions dropped
        dropped: usize,
    },
}

/// Drains the mempool into the ledger on a fixed interval
#[derive(Debug)]
pub struct BlockProducer {
    ledger: Arc<Ledger>,
    mempool: Arc<Mempool>,
    store: SnapshotStore,
    metrics: Metrics,
    batch_size: usize,
    tick_interval: Duration,
    in_flight: Mutex<()>,
}

impl BlockProducer {
    /// Create a producer over shared ledger and mempool
    pub fn new(
        ledger: Arc<Ledger>,
        mempool: Arc<Mempool>,
        store: SnapshotStore,
        config: &ProducerConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            ledger,
            mempool,
            store,
            metrics,
            batch_size: config.batch_size,
            tick_interval: config.tick_interval(),
            in_flight: Mutex::new(()),
        }
    }

    /// Run one check-and-produce cycle
    pub fn tick(&self) -> Result<TickOutcome> {
        let Some(_guard) = self.in_flight.try_lock() else {
            debug!("Producer tick already in flight, skipping");
            return Ok(TickOutcome::Busy);
        };

        let batch = self.mempool.dequeue_batch(self.batch_size);
        if batch.is_empty() {
            debug!("Mempool empty, nothing to produce");
            return Ok(TickOutcome::Idle);
        }

        let (valid, invalid): (Vec<Transaction>, Vec<Transaction>) =
            batch.into_iter().partition(verify_transaction);

        if !invalid.is_empty() {
            warn!(dropped = invalid.len(), "Excluding transactions with invalid signatures");
            self.metrics.record_rejected(invalid.len());
        }
        if valid.is_empty() {
            return Ok(TickOutcome::Rejected {
                dropped: invalid.len(),
            });
        }

        let tx_count = valid.len();
        let block = self.append(valid)?;

        let persisted = match self.store.persist(&self.ledger.blocks()) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    path = %self.store.path().display(),
                    "Snapshot write failed, will retry on next block: {}", e
                );
                self.metrics.record_snapshot_failure();
                false
            }
        };

        let depth = self.mempool.len();
        self.metrics.record_block(tx_count, depth);

        info!(
            index = block.index(),
            tx_count,
            hash = %block.hash(),
            pending = depth,
            "New block created"
        );

        Ok(TickOutcome::Produced {
            index: block.index(),
            tx_count,
            persisted,
        })
    }

    /// Seal `transactions` on top of the current tip and push the block.
    ///
    /// Within a node the producer is the ledger's only writer and ticks never
    /// overlap, so the tip read here is the tip `push` checks against. A push
    /// that still fails drops the batch and counts it as rejected.
    fn append(&self, transactions: Vec<Transaction>) -> Result<Arc<Block>> {
        let count = transactions.len();
        let block = append_block(&self.ledger.tip(), transactions);
        self.ledger.push(block).map_err(|e| {
            error!(dropped = count, "Failed to append block: {}", e);
            self.metrics.record_rejected(count);
            e
        })
    }

    /// Write the current chain to the snapshot file, waiting for any running tick
    pub fn persist_snapshot(&self) -> Result<()> {
        let _guard = self.in_flight.lock();
        self.store.persist(&self.ledger.blocks()).map_err(|e| {
            self.metrics.record_snapshot_failure();
            e
        })
    }

    /// Tick on the configured interval until `shutdown` fires
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.tick_interval.as_secs(),
            batch_size = self.batch_size,
            "Starting block producer"
        );

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick() {
                        error!("Producer tick failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Block producer stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::transaction::create_transaction;
    use crate::types::{BlockHash, Signature};

    struct Fixture {
        ledger: Arc<Ledger>,
        mempool: Arc<Mempool>,
        producer: BlockProducer,
        _dir: tempfile::TempDir,
    }

    fn fixture(batch_size: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("blockchain.json"));
        fixture_with_store(batch_size, store, dir)
    }

    fn fixture_with_store(batch_size: usize, store: SnapshotStore, dir: tempfile::TempDir) -> Fixture {
        let ledger = Arc::new(Ledger::new());
        let mempool = Arc::new(Mempool::default());
        let config = ProducerConfig {
            batch_size,
            ..ProducerConfig::default()
        };
        let producer = BlockProducer::new(
            ledger.clone(),
            mempool.clone(),
            store,
            &config,
            Metrics::new().unwrap(),
        );
        Fixture {
            ledger,
            mempool,
            producer,
            _dir: dir,
        }
    }

    fn tx(amount: u64) -> Transaction {
        let sender = KeyPair::generate();
        let receiver = KeyPair::generate();
        create_transaction(&sender.public_key(), &receiver.public_key(), amount, &sender).unwrap()
    }

    #[test]
    fn test_idle_on_empty_pool() {
        let f = fixture(3);
        assert_eq!(f.producer.tick().unwrap(), TickOutcome::Idle);
        assert_eq!(f.ledger.block_count(), 1);
    }

    #[test]
    fn test_tick_produces_batch() {
        let f = fixture(3);
        let genesis_hash = *f.ledger.genesis().hash();
        assert_eq!(genesis_hash, *f.ledger.tip().hash());
        assert_eq!(*f.ledger.genesis().previous_hash(), BlockHash::ZERO);

        for amount in 1..=5 {
            f.mempool.enqueue(tx(amount)).unwrap();
        }

        let outcome = f.producer.tick().unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Produced {
                index: 1,
                tx_count: 3,
                persisted: true
            }
        );

        let block = f.ledger.tip();
        assert_eq!(block.index(), 1);
        assert_eq!(*block.previous_hash(), genesis_hash);
        let amounts: Vec<u64> = block.transactions().iter().map(|t| t.amount()).collect();
        assert_eq!(amounts, vec![1, 2, 3]);
        assert_eq!(f.mempool.len(), 2);
    }

    #[test]
    fn test_partial_batch_is_valid() {
        let f = fixture(3);
        f.mempool.enqueue(tx(9)).unwrap();

        match f.producer.tick().unwrap() {
            TickOutcome::Produced { tx_count, .. } => assert_eq!(tx_count, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(f.mempool.is_empty());
        assert!(f.ledger.validate().is_valid());
    }

    #[test]
    fn test_invalid_transactions_excluded() {
        let f = fixture(3);
        let good = tx(5);
        let forged = Transaction::from_parts(
            *good.sender(),
            *good.receiver(),
            50,
            *good.signature(),
        );
        let junk = Transaction::from_parts(
            *good.sender(),
            *good.receiver(),
            5,
            Signature::from_bytes([0u8; 64]),
        );

        f.mempool.enqueue(forged).unwrap();
        f.mempool.enqueue(good.clone()).unwrap();
        f.mempool.enqueue(junk.clone()).unwrap();

        let outcome = f.producer.tick().unwrap();
        assert!(matches!(outcome, TickOutcome::Produced { tx_count: 1, .. }));
        assert_eq!(f.ledger.tip().transactions(), &[good]);

        f.mempool.enqueue(junk).unwrap();
        assert_eq!(
            f.producer.tick().unwrap(),
            TickOutcome::Rejected { dropped: 1 }
        );
        assert_eq!(f.ledger.height(), 1);
    }

    #[test]
    fn test_snapshot_failure_keeps_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("missing").join("blockchain.json"));
        let f = fixture_with_store(3, store, dir);

        f.mempool.enqueue(tx(1)).unwrap();
        let outcome = f.producer.tick().unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Produced {
                index: 1,
                tx_count: 1,
                persisted: false
            }
        );
        assert_eq!(f.ledger.height(), 1);
        assert_eq!(f.producer.metrics.snapshot_failures.get(), 1);
    }

    #[test]
    fn test_snapshot_reflects_chain() {
        let f = fixture(2);
        for amount in 1..=4 {
            f.mempool.enqueue(tx(amount)).unwrap();
        }
        f.producer.tick().unwrap();
        f.producer.tick().unwrap();

        let loaded = f.producer.store.load_ledger().unwrap();
        assert_eq!(loaded.height(), 2);
        assert_eq!(loaded.tip().hash(), f.ledger.tip().hash());
    }

    #[test]
    fn test_busy_when_tick_in_flight() {
        let f = fixture(3);
        f.mempool.enqueue(tx(1)).unwrap();

        let guard = f.producer.in_flight.lock();
        assert_eq!(f.producer.tick().unwrap(), TickOutcome::Busy);
        drop(guard);

        assert_eq!(f.mempool.len(), 1);
        assert!(matches!(
            f.producer.tick().unwrap(),
            TickOutcome::Produced { .. }
        ));
    }

    #[test]
    fn test_builds_on_current_tip() {
        let f = fixture(3);
        let outside = append_block(&f.ledger.tip(), vec![tx(7)]);
        f.ledger.push(outside).unwrap();

        f.mempool.enqueue(tx(1)).unwrap();
        let outcome = f.producer.tick().unwrap();
        assert!(matches!(outcome, TickOutcome::Produced { index: 2, .. }));
        assert!(f.ledger.validate().is_valid());
        assert_eq!(f.producer.metrics.transactions_rejected.get(), 0);
    }

    #[test]
    fn test_append_seals_on_tip() {
        let f = fixture(3);
        let first = f.producer.append(vec![tx(1), tx(2)]).unwrap();
        let second = f.producer.append(vec![tx(3)]).unwrap();

        assert_eq!(first.index(), 1);
        assert_eq!(second.previous_hash(), first.hash());
        assert_eq!(f.ledger.tip().hash(), second.hash());
        assert_eq!(f.producer.metrics.transactions_rejected.get(), 0);
    }
}
