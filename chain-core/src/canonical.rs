//! Canonical serialization for signing and hashing
//!
//! Ensures deterministic byte representation for signing and verification.
//! Integers are big-endian, variable-length values are u32-length-prefixed,
//! and record fields are emitted in name order regardless of the order in
//! which they were added.

use crate::types::{BlockPayload, Transaction, GENESIS_MARKER};
use std::collections::BTreeMap;

/// Domain tag prefixed to every transaction signing message
pub const TRANSACTION_DOMAIN: &str = "chain-core/tx/v1";

/// Payload tag for the genesis marker
const PAYLOAD_GENESIS: u8 = 0;

/// Payload tag for a transaction batch
const PAYLOAD_TRANSACTIONS: u8 = 1;

/// Canonical serializer
#[derive(Debug, Default)]
pub struct CanonicalSerializer {
    buffer: Vec<u8>,
}

impl CanonicalSerializer {
    /// Create new serializer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Write raw bytes
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a single byte
    pub fn write_u8(&mut self, n: u8) {
        self.buffer.push(n);
    }

    /// Write u32 (big-endian)
    pub fn write_u32(&mut self, n: u32) {
        self.write_raw(&n.to_be_bytes());
    }

    /// Write u64 (big-endian)
    pub fn write_u64(&mut self, n: u64) {
        self.write_raw(&n.to_be_bytes());
    }

    /// Write i64 (big-endian)
    pub fn write_i64(&mut self, n: i64) {
        self.write_raw(&n.to_be_bytes());
    }

    /// Write bytes (length-prefixed).
    ///
    /// Lengths must fit in a `u32`: keys, signatures and messages are fixed
    /// size, and batch counts are bounded by the mempool capacity check.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.write_raw(bytes);
    }

    /// Write string (length-prefixed)
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Finalize and return bytes
    pub fn finalize(self) -> Vec<u8> {
        self.buffer
    }
}

/// Named-field record encoded in field-name order.
///
/// Two records holding the same field values encode identically no matter
/// which order the fields were added in.
#[derive(Debug, Clone)]
pub struct CanonicalRecord {
    domain: &'static str,
    fields: BTreeMap<&'static str, Vec<u8>>,
}

impl CanonicalRecord {
    /// Start a record under a domain tag
    pub fn new(domain: &'static str) -> Self {
        Self {
            domain,
            fields: BTreeMap::new(),
        }
    }

    /// Add an unsigned integer field
    pub fn field_u64(mut self, name: &'static str, value: u64) -> Self {
        self.fields.insert(name, value.to_be_bytes().to_vec());
        self
    }

    /// Add a byte-string field
    pub fn field_bytes(mut self, name: &'static str, value: &[u8]) -> Self {
        self.fields.insert(name, value.to_vec());
        self
    }

    /// Encode: domain, field count, then `name, value` pairs sorted by name
    pub fn encode(&self) -> Vec<u8> {
        let mut ser = CanonicalSerializer::new();
        ser.write_string(self.domain);
        ser.write_u32(self.fields.len() as u32);
        for (name, value) in &self.fields {
            ser.write_string(name);
            ser.write_bytes(value);
        }
        ser.finalize()
    }
}

/// Signing message for a transfer of `amount` from `sender` to `receiver`
pub fn transaction_message(
    sender: &crate::types::PublicKey,
    receiver: &crate::types::PublicKey,
    amount: u64,
) -> Vec<u8> {
    CanonicalRecord::new(TRANSACTION_DOMAIN)
        .field_bytes("sender", sender.as_bytes())
        .field_bytes("receiver", receiver.as_bytes())
        .field_u64("amount", amount)
        .encode()
}

impl Transaction {
    /// Canonical bytes covered by the signature
    pub fn signing_message(&self) -> Vec<u8> {
        transaction_message(self.sender(), self.receiver(), self.amount())
    }

    /// Canonical bytes including the signature, as hashed into blocks
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut ser = CanonicalSerializer::new();
        ser.write_bytes(&self.signing_message());
        ser.write_bytes(self.signature().as_bytes());
        ser.finalize()
    }
}

/// Write a block payload into `ser`
pub fn write_payload(ser: &mut CanonicalSerializer, payload: &BlockPayload) {
    match payload {
        BlockPayload::Genesis => {
            ser.write_u8(PAYLOAD_GENESIS);
            ser.write_string(GENESIS_MARKER);
        }
        BlockPayload::Transactions(txs) => {
            ser.write_u8(PAYLOAD_TRANSACTIONS);
            ser.write_u32(txs.len() as u32);
            for tx in txs {
                ser.write_bytes(&tx.canonical_bytes());
            }
        }
    }
}

/// `index ∥ timestamp ∥ payload ∥ previous_hash`
pub fn block_preimage(
    index: u64,
    timestamp_nanos: i64,
    payload: &BlockPayload,
    previous_hash: &crate::types::BlockHash,
) -> Vec<u8> {
    let mut ser = CanonicalSerializer::new();
    ser.write_u64(index);
    ser.write_i64(timestamp_nanos);
    write_payload(&mut ser, payload);
    ser.write_raw(previous_hash.as_bytes());
    ser.finalize()
}
