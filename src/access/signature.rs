use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::decimal::FeeRate;
use crate::types::Address;

/// detached-signature check, independent of the signing scheme
pub trait SignatureVerifier: Send + Sync {
    /// true when `signature` over `message` was produced by `expected_signer`
    fn verify(&self, message: &[u8], signature: &[u8], expected_signer: &Address) -> bool;
}

/// ed25519 verification where the address is the verifying key
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &[u8], expected_signer: &Address) -> bool {
        let Ok(pubkey) = VerifyingKey::from_bytes(expected_signer.as_bytes()) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        pubkey.verify(message, &signature).is_ok()
    }
}

/// digest the originator signs to authorise a fee rate change
///
/// blake3 over the 32-byte big-endian rate followed by the ledger identity,
/// so a signature is only valid for one rate on one ledger.
pub fn fee_rate_digest(new_rate: FeeRate, ledger_id: &Address) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&new_rate.to_be_bytes32());
    hasher.update(ledger_id.as_bytes());
    *hasher.finalize().as_bytes()
}

/// sign a fee rate change with the originator's key
pub fn sign_fee_rate_update(key: &SigningKey, new_rate: FeeRate, ledger_id: &Address) -> Vec<u8> {
    let digest = fee_rate_digest(new_rate, ledger_id);
    let sig: Signature = key.sign(&digest);
    sig.to_bytes().to_vec()
}
