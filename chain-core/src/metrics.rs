//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the node.
//!
//! # Metrics
//!
//! - `chain_blocks_produced_total` - Blocks appended by the producer
//! - `chain_transactions_enqueued_total` - Transactions accepted into the mempool
//! - `chain_transactions_rejected_total` - Transactions dropped (pool full or bad signature)
//! - `chain_snapshot_failures_total` - Failed snapshot writes
//! - `chain_mempool_depth` - Pending transactions after the last pool operation
//! - `chain_block_transactions` - Histogram of transactions per block

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Blocks appended
    pub blocks_produced: IntCounter,

    /// Transactions accepted into the mempool
    pub transactions_enqueued: IntCounter,

    /// Transactions dropped
    pub transactions_rejected: IntCounter,

    /// Failed snapshot writes
    pub snapshot_failures: IntCounter,

    /// Current mempool depth
    pub mempool_depth: IntGauge,

    /// Transactions per block
    pub block_transactions: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let blocks_produced = IntCounter::new(
            "chain_blocks_produced_total",
            "Blocks appended by the producer",
        )?;
        registry.register(Box::new(blocks_produced.clone()))?;

        let transactions_enqueued = IntCounter::new(
            "chain_transactions_enqueued_total",
            "Transactions accepted into the mempool",
        )?;
        registry.register(Box::new(transactions_enqueued.clone()))?;

        let transactions_rejected = IntCounter::new(
            "chain_transactions_rejected_total",
            "Transactions dropped before inclusion",
        )?;
        registry.register(Box::new(transactions_rejected.clone()))?;

        let snapshot_failures = IntCounter::new(
            "chain_snapshot_failures_total",
            "Failed snapshot writes",
        )?;
        registry.register(Box::new(snapshot_failures.clone()))?;

        let mempool_depth = IntGauge::new("chain_mempool_depth", "Pending transactions")?;
        registry.register(Box::new(mempool_depth.clone()))?;

        let block_transactions = Histogram::with_opts(
            HistogramOpts::new("chain_block_transactions", "Transactions per block")
                .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        )?;
        registry.register(Box::new(block_transactions.clone()))?;

        Ok(Self {
            blocks_produced,
            transactions_enqueued,
            transactions_rejected,
            snapshot_failures,
            mempool_depth,
            block_transactions,
            registry,
        })
    }

    /// Record a transaction entering the pool
    pub fn record_enqueued(&self, depth: usize) {
        self.transactions_enqueued.inc();
        self.mempool_depth.set(depth as i64);
    }

    /// Record dropped transactions
    pub fn record_rejected(&self, count: usize) {
        self.transactions_rejected.inc_by(count as u64);
    }

    /// Record a produced block
    pub fn record_block(&self, tx_count: usize, depth: usize) {
        self.blocks_produced.inc();
        self.block_transactions.observe(tx_count as f64);
        self.mempool_depth.set(depth as i64);
    }

    /// Record a failed snapshot write
    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures.inc();
    }

    /// Render all metrics in the text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("blocks_produced", &self.blocks_produced.get())
            .field("transactions_enqueued", &self.transactions_enqueued.get())
            .field("transactions_rejected", &self.transactions_rejected.get())
            .field("snapshot_failures", &self.snapshot_failures.get())
            .field("mempool_depth", &self.mempool_depth.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.blocks_produced.get(), 0);
        assert_eq!(metrics.transactions_enqueued.get(), 0);

        // Private registries do not collide
        let other = Metrics::new().unwrap();
        assert_eq!(other.snapshot_failures.get(), 0);
    }

    #[test]
    fn test_record_block() {
        let metrics = Metrics::new().unwrap();
        metrics.record_enqueued(4);
        assert_eq!(metrics.mempool_depth.get(), 4);

        metrics.record_block(3, 1);
        assert_eq!(metrics.blocks_produced.get(), 1);
        assert_eq!(metrics.mempool_depth.get(), 1);
        assert_eq!(metrics.block_transactions.get_sample_count(), 1);
    }

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejected(2);
        metrics.record_snapshot_failure();

        let text = metrics.render();
        assert!(text.contains("chain_transactions_rejected_total 2"));
        assert!(text.contains("chain_snapshot_failures_total 1"));
    }
}
