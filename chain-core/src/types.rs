//! Core types for the chain
//!
//! Records are immutable once built: fields are private and read through
//! accessors. `from_parts` rebuilds persisted records and performs no checks;
//! anything built that way goes through verification before it is trusted.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// Length of an Ed25519 verification key
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of an Ed25519 signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of a SHA-256 digest
pub const HASH_LENGTH: usize = 32;

/// Payload marker stored in the genesis block instead of a transaction list
pub const GENESIS_MARKER: &str = "Genesis Block";

fn decode_fixed<const N: usize>(hex_str: &str) -> std::result::Result<[u8; N], String> {
    let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| format!("expected {} bytes, got {}", N, len))
}

/// Ed25519 verification key bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Create from raw bytes (not checked to be a valid curve point)
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse lowercase or uppercase hex
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        decode_fixed(hex_str)
            .map(Self)
            .map_err(Error::MalformedKey)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First six hex characters, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..3])
    }

    /// Decode into a dalek verifying key, rejecting bytes that are not a curve point
    pub fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| Error::MalformedKey(format!("{}: {}", self.to_hex(), e)))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// Digital signature (Ed25519)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse hex
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        decode_fixed(hex_str)
            .map(Self)
            .map_err(Error::MalformedSignature)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// SHA-256 block hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHash([u8; HASH_LENGTH]);

impl BlockHash {
    /// All-zero sentinel used as the genesis previous hash
    pub const ZERO: BlockHash = BlockHash([0u8; HASH_LENGTH]);

    /// Create from bytes
    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse hex
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        decode_fixed(hex_str)
            .map(Self)
            .map_err(|e| Error::Snapshot(format!("invalid hash {:?}: {}", hex_str, e)))
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

/// Signed value transfer
///
/// Built by [`crate::transaction::create_transaction`]; the signature covers the
/// canonical encoding of sender, receiver and amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    sender: PublicKey,
    receiver: PublicKey,
    amount: u64,
    signature: Signature,
}

impl Transaction {
    /// Assemble a transaction from already-signed parts.
    ///
    /// No verification happens here; callers loading untrusted data must run
    /// [`crate::transaction::verify_transaction`].
    pub fn from_parts(
        sender: PublicKey,
        receiver: PublicKey,
        amount: u64,
        signature: Signature,
    ) -> Self {
        Self {
            sender,
            receiver,
            amount,
            signature,
        }
    }

    /// Sender verification key
    pub fn sender(&self) -> &PublicKey {
        &self.sender
    }

    /// Receiver verification key
    pub fn receiver(&self) -> &PublicKey {
        &self.receiver
    }

    /// Transferred amount
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Sender's signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// What a block carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPayload {
    /// Fixed marker of block 0
    Genesis,
    /// Ordered batch drained from the mempool
    Transactions(Vec<Transaction>),
}

impl BlockPayload {
    /// Transactions in this payload (none for genesis)
    pub fn transactions(&self) -> &[Transaction] {
        match self {
            BlockPayload::Genesis => &[],
            BlockPayload::Transactions(txs) => txs,
        }
    }

    /// Whether this is the genesis marker
    pub fn is_genesis(&self) -> bool {
        matches!(self, BlockPayload::Genesis)
    }
}

/// Sealed block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    index: u64,
    timestamp: DateTime<Utc>,
    payload: BlockPayload,
    previous_hash: BlockHash,
    hash: BlockHash,
}

impl Block {
    /// Build a block and compute its hash from the other fields
    pub fn seal(
        index: u64,
        timestamp: DateTime<Utc>,
        payload: BlockPayload,
        previous_hash: BlockHash,
    ) -> Self {
        let hash = crate::ledger::compute_block_hash(index, &timestamp, &payload, &previous_hash);
        Self {
            index,
            timestamp,
            payload,
            previous_hash,
            hash,
        }
    }

    /// Assemble a block with a stored hash, as read back from a snapshot.
    ///
    /// The stored hash is kept as-is; [`crate::ledger::validate_chain`] decides
    /// whether it is correct.
    pub fn from_parts(
        index: u64,
        timestamp: DateTime<Utc>,
        payload: BlockPayload,
        previous_hash: BlockHash,
        hash: BlockHash,
    ) -> Self {
        Self {
            index,
            timestamp,
            payload,
            previous_hash,
            hash,
        }
    }

    /// Block height
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Creation time
    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    /// Payload
    pub fn payload(&self) -> &BlockPayload {
        &self.payload
    }

    /// Transactions carried (empty for genesis)
    pub fn transactions(&self) -> &[Transaction] {
        self.payload.transactions()
    }

    /// Hash of the predecessor
    pub fn previous_hash(&self) -> &BlockHash {
        &self.previous_hash
    }

    /// Stored hash of this block
    pub fn hash(&self) -> &BlockHash {
        &self.hash
    }

    /// Recompute the hash from the block's own fields
    pub fn compute_hash(&self) -> BlockHash {
        crate::ledger::compute_block_hash(
            self.index,
            &self.timestamp,
            &self.payload,
            &self.previous_hash,
        )
    }
}

impl AsRef<Block> for Block {
    fn as_ref(&self) -> &Block {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_hex_roundtrip() {
        let key = PublicKey::from_bytes([0xab; PUBLIC_KEY_LENGTH]);
        let parsed = PublicKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(key.short(), "ababab");
    }

    #[test]
    fn test_public_key_wrong_length() {
        let err = PublicKey::from_hex("abcd").unwrap_err();
        assert!(matches!(err, Error::MalformedKey(_)));
    }

    #[test]
    fn test_signature_not_hex() {
        let err = Signature::from_hex("zz").unwrap_err();
        assert!(matches!(err, Error::MalformedSignature(_)));
    }

    #[test]
    fn test_zero_hash_hex() {
        assert_eq!(BlockHash::ZERO.to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_genesis_payload_has_no_transactions() {
        assert!(BlockPayload::Genesis.transactions().is_empty());
        assert!(BlockPayload::Genesis.is_genesis());
        assert!(!BlockPayload::Transactions(vec![]).is_genesis());
    }
}
