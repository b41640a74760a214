//! Error types for the chain

use thiserror::Error;

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chain errors
#[derive(Error, Debug)]
pub enum Error {
    /// Transaction amount must be strictly positive
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(u64),

    /// Verification key bytes do not decode to a curve point
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// Signature bytes have the wrong length or encoding
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// Signing key does not belong to the declared sender
    #[error("Signing key does not match sender {sender}")]
    SignerMismatch {
        /// Hex of the declared sender key
        sender: String,
    },

    /// Mempool is at capacity
    #[error("Mempool full (capacity {capacity})")]
    MempoolFull {
        /// Configured capacity
        capacity: usize,
    },

    /// Block does not extend the current tip
    #[error("Stale tip: block {index} links to {previous_hash}, tip is {tip_hash}")]
    StaleTip {
        /// Index of the rejected block
        index: u64,
        /// Previous hash the block claims
        previous_hash: String,
        /// Hash of the actual tip
        tip_hash: String,
    },

    /// Block is internally inconsistent
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    /// Hash-chain invariant broken
    #[error("Integrity violation at block {index}: {reason}")]
    IntegrityViolation {
        /// First offending block index
        index: u64,
        /// What did not match
        reason: String,
    },

    /// Snapshot content could not be interpreted
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Snapshot was written by an unknown schema version
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedSnapshotVersion(u32),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Concurrency error (background task panicked, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
