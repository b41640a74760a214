//! Node runtime
//!
//! Wires the ledger, mempool, producer and generator together and owns their
//! lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   signed tx   ┌─────────────┐
//! │ TransactionGenerator │ ────────────▶ │   Mempool   │
//! └──────────────────────┘               └──────┬──────┘
//!                                               │ dequeue_batch
//!                                               ▼
//!                                       ┌───────────────┐
//!                                       │ BlockProducer │
//!                                       └───────┬───────┘
//!                                  push ┌───────┴───────┐ persist
//!                                       ▼               ▼
//!                                 ┌──────────┐   ┌───────────────┐
//!                                 │  Ledger  │   │ SnapshotStore │
//!                                 └──────────┘   └───────────────┘
//! ```
//!
//! Both background tasks subscribe to one broadcast stop signal. Shutdown
//! waits for them to exit, then writes a final snapshot.

use crate::{
    config::Config,
    generator::TransactionGenerator,
    ledger::Ledger,
    mempool::Mempool,
    metrics::Metrics,
    producer::BlockProducer,
    storage::SnapshotStore,
    Error, Result,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A configured node that has not started its background tasks yet
#[derive(Debug)]
pub struct Node {
    config: Config,
    ledger: Arc<Ledger>,
    mempool: Arc<Mempool>,
    metrics: Metrics,
    producer: Arc<BlockProducer>,
    generator: Arc<TransactionGenerator>,
}

impl Node {
    /// Build a node from configuration, resuming from the snapshot if asked to
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = SnapshotStore::new(config.snapshot_path.clone());
        let ledger = if config.resume_from_snapshot && store.exists() {
            let ledger = store.load_ledger()?;
            info!(
                path = %store.path().display(),
                height = ledger.height(),
                tip = %ledger.tip().hash(),
                "Resumed chain from snapshot"
            );
            ledger
        } else {
            let ledger = Ledger::new();
            info!(genesis = %ledger.genesis().hash(), "Created genesis block");
            ledger
        };
        let ledger = Arc::new(ledger);

        let mempool = Arc::new(Mempool::new(config.mempool.capacity));
        let metrics = Metrics::new()?;

        let producer = Arc::new(BlockProducer::new(
            ledger.clone(),
            mempool.clone(),
            store,
            &config.producer,
            metrics.clone(),
        ));
        let generator = Arc::new(TransactionGenerator::new(
            mempool.clone(),
            &config.generator,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            ledger,
            mempool,
            metrics,
            producer,
            generator,
        })
    }

    /// Shared ledger
    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    /// Shared mempool
    pub fn mempool(&self) -> Arc<Mempool> {
        self.mempool.clone()
    }

    /// Block producer
    pub fn producer(&self) -> Arc<BlockProducer> {
        self.producer.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawn the producer (and the generator, if enabled) onto the runtime
    pub fn start(self) -> NodeHandle {
        let (shutdown, _) = broadcast::channel(1);

        let mut tasks = vec![tokio::spawn(
            self.producer.clone().run(shutdown.subscribe()),
        )];
        if self.config.generator.enabled {
            tasks.push(tokio::spawn(
                self.generator.clone().run(shutdown.subscribe()),
            ));
        } else {
            info!("Transaction generator disabled");
        }

        info!(
            snapshot = %self.config.snapshot_path.display(),
            tasks = tasks.len(),
            "Node started"
        );

        NodeHandle {
            ledger: self.ledger,
            mempool: self.mempool,
            metrics: self.metrics,
            producer: self.producer,
            shutdown,
            tasks,
        }
    }
}

/// Handle to a running node
#[derive(Debug)]
pub struct NodeHandle {
    ledger: Arc<Ledger>,
    mempool: Arc<Mempool>,
    metrics: Metrics,
    producer: Arc<BlockProducer>,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Shared ledger
    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    /// Shared mempool
    pub fn mempool(&self) -> Arc<Mempool> {
        self.mempool.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop background tasks, wait for them and write a final snapshot
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down node");

        // No receivers left only if every task already exited
        if self.shutdown.send(()).is_err() {
            debug!("Background tasks already stopped");
        }

        // The final snapshot is written even if a task died
        let mut task_failure = None;
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Background task failed: {}", e);
                if task_failure.is_none() {
                    task_failure = Some(Error::Concurrency(format!("Background task failed: {}", e)));
                }
            }
        }

        if let Err(e) = self.producer.persist_snapshot() {
            warn!("Final snapshot failed: {}", e);
            return Err(e);
        }
        if let Some(e) = task_failure {
            return Err(e);
        }

        info!(
            height = self.ledger.height(),
            tip = %self.ledger.tip().hash(),
            pending = self.mempool.len(),
            "Node stopped"
        );
        debug!("Final metrics:\n{}", self.metrics.render());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeneratorConfig, ProducerConfig};
    use crate::crypto::KeyPair;
    use crate::transaction::create_transaction;
    use tokio::time::{sleep, Duration};

    fn config(dir: &tempfile::TempDir) -> Config {
        Config {
            snapshot_path: dir.path().join("blockchain.json"),
            producer: ProducerConfig {
                tick_interval_secs: 10,
                batch_size: 3,
            },
            generator: GeneratorConfig {
                enabled: false,
                ..GeneratorConfig::default()
            },
            ..Config::default()
        }
    }

    fn enqueue(pool: &Mempool, amount: u64) {
        let sender = KeyPair::generate();
        let receiver = KeyPair::generate();
        let tx =
            create_transaction(&sender.public_key(), &receiver.public_key(), amount, &sender)
                .unwrap();
        pool.enqueue(tx).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_drains_pool_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::open(config(&dir)).unwrap();
        let pool = node.mempool();
        for amount in 1..=5 {
            enqueue(&pool, amount);
        }

        let handle = node.start();
        // First interval tick fires immediately, the second at t=10s
        sleep(Duration::from_secs(15)).await;

        let ledger = handle.ledger();
        assert_eq!(ledger.height(), 2);
        assert_eq!(ledger.get(1).unwrap().transactions().len(), 3);
        assert_eq!(ledger.get(2).unwrap().transactions().len(), 2);
        assert!(pool.is_empty());
        assert_eq!(handle.metrics().blocks_produced.get(), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_writes_snapshot_and_resume_loads_it() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::open(config(&dir)).unwrap();
        enqueue(&node.mempool(), 42);

        let handle = node.start();
        sleep(Duration::from_secs(1)).await;
        let tip = *handle.ledger().tip().hash();
        handle.shutdown().await.unwrap();

        let mut resumed = config(&dir);
        resumed.resume_from_snapshot = true;
        let node = Node::open(resumed).unwrap();
        assert_eq!(node.ledger().height(), 1);
        assert_eq!(*node.ledger().tip().hash(), tip);

        // Without resume the node starts fresh
        let fresh = Node::open(config(&dir)).unwrap();
        assert_eq!(fresh.ledger().height(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_feeds_producer() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.generator.enabled = true;
        let node = Node::open(cfg).unwrap();

        let handle = node.start();
        sleep(Duration::from_secs(35)).await;
        let ledger = handle.ledger();
        handle.shutdown().await.unwrap();

        assert!(ledger.height() >= 1);
        assert!(ledger.validate().is_valid());
        assert!(blocks_within_batch_size(&ledger));
    }

    fn blocks_within_batch_size(ledger: &Ledger) -> bool {
        ledger
            .blocks()
            .iter()
            .skip(1)
            .all(|b| !b.transactions().is_empty() && b.transactions().len() <= 3)
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_persists_after_task_panic() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let node = Node::open(cfg.clone()).unwrap();

        let mut handle = node.start();
        handle.tasks.push(tokio::spawn(async {
            panic!("task crashed");
        }));
        sleep(Duration::from_secs(1)).await;

        let tip = *handle.ledger().tip().hash();
        assert!(matches!(
            handle.shutdown().await,
            Err(Error::Concurrency(_))
        ));

        // Empty pool, so only the shutdown path wrote the file
        let loaded = SnapshotStore::new(&cfg.snapshot_path).load_ledger().unwrap();
        assert_eq!(*loaded.tip().hash(), tip);
    }

    #[test]
    fn test_resume_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.resume_from_snapshot = true;
        std::fs::write(&cfg.snapshot_path, b"{\"version\":1,\"blocks\":[]}").unwrap();

        assert!(matches!(
            Node::open(cfg),
            Err(Error::IntegrityViolation { index: 0, .. })
        ));
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.producer.batch_size = 0;
        assert!(matches!(Node::open(cfg), Err(Error::Config(_))));
    }
}
