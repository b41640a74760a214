//! Transaction construction and verification
//!
//! A transaction is well-formed when its amount is positive, both keys decode
//! to Ed25519 points, and its signature verifies under the sender key over
//! [`crate::canonical::transaction_message`].

use crate::{
    canonical::transaction_message,
    crypto::{verify_signature, KeyPair},
    types::{PublicKey, Transaction},
    Error, Result,
};

/// Build and sign a transfer of `amount` from `sender` to `receiver`.
///
/// `signer` must be the key pair behind `sender`.
pub fn create_transaction(
    sender: &PublicKey,
    receiver: &PublicKey,
    amount: u64,
    signer: &KeyPair,
) -> Result<Transaction> {
    if amount == 0 {
        return Err(Error::InvalidAmount(amount));
    }

    sender.verifying_key()?;
    receiver.verifying_key()?;

    if signer.public_key() != *sender {
        return Err(Error::SignerMismatch {
            sender: sender.to_hex(),
        });
    }

    let message = transaction_message(sender, receiver, amount);
    let signature = signer.sign(&message);

    Ok(Transaction::from_parts(*sender, *receiver, amount, signature))
}

/// Check the signature of `tx` against its own sender key
pub fn verify_transaction(tx: &Transaction) -> bool {
    tx.amount() > 0 && verify_signature(&tx.signing_message(), tx.signature(), tx.sender())
}
