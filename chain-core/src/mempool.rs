//! Pending-transaction pool
//!
//! FIFO queue shared by the transaction generator (producer side) and the block
//! producer (consumer side). A single mutex guards the queue, so an `enqueue`
//! and a `dequeue_batch` never interleave and a batch is removed in one step.

use crate::{types::Transaction, Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Default maximum number of pending transactions
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 10_000;

/// Bounded FIFO of signed, not yet included transactions
#[derive(Debug)]
pub struct Mempool {
    queue: Mutex<VecDeque<Transaction>>,
    capacity: usize,
}

impl Mempool {
    /// Create an empty pool holding at most `capacity` transactions
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Append `tx` at the tail.
    ///
    /// Returns the new pool depth. Fails with [`Error::MempoolFull`] when the
    /// pool is at capacity, in which case `tx` is dropped.
    pub fn enqueue(&self, tx: Transaction) -> Result<usize> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(Error::MempoolFull {
                capacity: self.capacity,
            });
        }
        queue.push_back(tx);
        Ok(queue.len())
    }

    /// Remove and return up to `max_count` transactions from the head, oldest first
    pub fn dequeue_batch(&self, max_count: usize) -> Vec<Transaction> {
        let mut queue = self.queue.lock();
        let count = max_count.min(queue.len());
        queue.drain(..count).collect()
    }

    /// Number of pending transactions
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Maximum number of pending transactions
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(DEFAULT_MEMPOOL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::transaction::create_transaction;
    use std::sync::Arc;

    fn tx(amount: u64) -> Transaction {
        let sender = KeyPair::generate();
        let receiver = KeyPair::generate();
        create_transaction(&sender.public_key(), &receiver.public_key(), amount, &sender).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let pool = Mempool::default();
        for amount in 1..=5 {
            pool.enqueue(tx(amount)).unwrap();
        }

        let first = pool.dequeue_batch(3);
        let amounts: Vec<u64> = first.iter().map(|t| t.amount()).collect();
        assert_eq!(amounts, vec![1, 2, 3]);
        assert_eq!(pool.len(), 2);

        let rest = pool.dequeue_batch(3);
        let amounts: Vec<u64> = rest.iter().map(|t| t.amount()).collect();
        assert_eq!(amounts, vec![4, 5]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_empty_pool_returns_empty_batch() {
        let pool = Mempool::default();
        assert!(pool.dequeue_batch(3).is_empty());
        pool.enqueue(tx(1)).unwrap();
        assert!(pool.dequeue_batch(0).is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_capacity_enforced() {
        let pool = Mempool::new(2);
        assert_eq!(pool.enqueue(tx(1)).unwrap(), 1);
        assert_eq!(pool.enqueue(tx(2)).unwrap(), 2);
        assert!(matches!(
            pool.enqueue(tx(3)),
            Err(Error::MempoolFull { capacity: 2 })
        ));

        pool.dequeue_batch(1);
        assert!(pool.enqueue(tx(4)).is_ok());
    }

    #[test]
    fn test_concurrent_enqueue_and_dequeue() {
        let pool = Arc::new(Mempool::default());
        let producers = 4;
        let per_producer = 50;

        let txs: Vec<Vec<Transaction>> = (0..producers)
            .map(|p| {
                (0..per_producer)
                    .map(|i| tx((p * per_producer + i + 1) as u64))
                    .collect()
            })
            .collect();

        let producer_handles: Vec<_> = txs
            .into_iter()
            .map(|batch| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for t in batch {
                        pool.enqueue(t).unwrap();
                    }
                })
            })
            .collect();

        let consumer_handles: Vec<_> = (0..3)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    for _ in 0..200 {
                        seen.extend(pool.dequeue_batch(3).into_iter().map(|t| t.amount()));
                        std::thread::yield_now();
                    }
                    seen
                })
            })
            .collect();

        for h in producer_handles {
            h.join().unwrap();
        }
        let mut seen: Vec<u64> = consumer_handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seen.extend(pool.dequeue_batch(usize::MAX).into_iter().map(|t| t.amount()));

        seen.sort_unstable();
        let expected: Vec<u64> = (1..=(producers * per_producer) as u64).collect();
        assert_eq!(seen, expected);
    }
}
