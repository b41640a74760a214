//! Chain Core
//!
//! Single-node ledger of signed value transfers grouped into hash-linked blocks.
//!
//! # Architecture
//!
//! - **Signed transactions**: Ed25519 signatures over a canonical encoding
//! - **Hash chain**: each block commits to its predecessor with SHA-256
//! - **Single producer**: one task drains the mempool into blocks
//! - **Snapshots**: the full chain is rewritten atomically after every block
//!
//! # Invariants
//!
//! - Every transaction in the ledger verifies under its sender's key
//! - Block `i` links to the hash of block `i - 1`; block 0 is genesis
//! - Blocks are append-only and never modified after creation
//! - A transaction leaves the mempool at most once

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod canonical;
pub mod crypto;
pub mod transaction;
pub mod ledger;
pub mod mempool;
pub mod storage;
pub mod producer;
pub mod generator;
pub mod node;
pub mod config;
pub mod metrics;
pub mod error;

// Re-exports
pub use error::{Error, Result};
pub use types::{Block, BlockHash, BlockPayload, PublicKey, Signature, Transaction};
pub use crypto::KeyPair;
pub use transaction::{create_transaction, verify_transaction};
pub use ledger::{append_block, genesis_block, validate_chain, ChainValidation, Ledger};
pub use mempool::Mempool;
pub use storage::SnapshotStore;
pub use producer::{BlockProducer, TickOutcome};
pub use generator::TransactionGenerator;
pub use node::{Node, NodeHandle};
pub use config::Config;
pub use metrics::Metrics;
