//! Simulated transaction traffic
//!
//! Stands in for an external submission API: every few seconds a fresh pair of
//! parties is minted and a signed transfer between them lands in the mempool.

use crate::{
    config::GeneratorConfig,
    crypto::KeyPair,
    mempool::Mempool,
    metrics::Metrics,
    transaction::create_transaction,
    types::Transaction,
    Error, Result,
};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Feeds randomly generated, correctly signed transactions into the mempool
#[derive(Debug)]
pub struct TransactionGenerator {
    mempool: Arc<Mempool>,
    metrics: Metrics,
    min_interval: Duration,
    max_interval: Duration,
    max_amount: u64,
}

impl TransactionGenerator {
    /// Create a generator over the shared mempool
    pub fn new(mempool: Arc<Mempool>, config: &GeneratorConfig, metrics: Metrics) -> Self {
        Self {
            mempool,
            metrics,
            min_interval: config.min_interval(),
            max_interval: config.max_interval(),
            max_amount: config.max_amount.max(1),
        }
    }

    /// Mint two parties, sign a random transfer between them and enqueue it
    pub fn generate_one(&self) -> Result<Transaction> {
        let sender = KeyPair::generate();
        let receiver = KeyPair::generate();
        let amount = rand::thread_rng().gen_range(1..=self.max_amount);

        let tx = create_transaction(&sender.public_key(), &receiver.public_key(), amount, &sender)?;
        let depth = self.mempool.enqueue(tx.clone())?;
        self.metrics.record_enqueued(depth);

        debug!(
            sender = %tx.sender().short(),
            receiver = %tx.receiver().short(),
            amount,
            pending = depth,
            "New transaction"
        );
        Ok(tx)
    }

    /// Pause before the next transaction, uniform over the configured range
    pub fn next_delay(&self) -> Duration {
        if self.min_interval >= self.max_interval {
            return self.min_interval;
        }
        rand::thread_rng().gen_range(self.min_interval..=self.max_interval)
    }

    /// Generate until `shutdown` fires
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            min_interval_secs = self.min_interval.as_secs(),
            max_interval_secs = self.max_interval.as_secs(),
            "Starting transaction generator"
        );

        loop {
            match self.generate_one() {
                Ok(_) => {}
                Err(Error::MempoolFull { capacity }) => {
                    warn!(capacity, "Mempool full, dropping generated transaction");
                    self.metrics.record_rejected(1);
                }
                Err(e) => warn!("Failed to generate transaction: {}", e),
            }

            let delay = self.next_delay();
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Transaction generator stopping");
                    break;
                }
            }
        }
    }
}
