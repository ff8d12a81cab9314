//! secp256k1 keys.
//!
//! Signatures are recoverable ECDSA over the BLAKE2b-256 hash of the payload,
//! serialized as `r || s || v` (65 bytes).

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use super::SignerError;
use crate::types::Address;
use crate::types::message::blake2b_256;

/// Length of a recoverable signature.
pub const SIGNATURE_LEN: usize = 65;

/// A secp256k1 private key. The inner `SigningKey` zeroizes on drop.
pub struct Secp256k1Key {
    signing: SigningKey,
}

impl Secp256k1Key {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        let signing = SigningKey::from_slice(secret)
            .map_err(|e| SignerError::MalformedKeyMaterial(format!("secp256k1 key: {e}")))?;
        Ok(Self { signing })
    }

    pub fn address(&self) -> Address {
        address_of(self.signing.verifying_key())
    }

    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError> {
        let digest = blake2b_256(payload);
        let (sig, recid) = self
            .signing
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(&sig.to_bytes());
        out.push(recid.to_byte());
        Ok(out)
    }
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::new_secp256k1(point.as_bytes())
}

/// Recovers the signer's address from a 65-byte signature over `payload`.
pub fn recover_address(payload: &[u8], signature: &[u8]) -> Result<Address, SignerError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignerError::Verification(format!(
            "expected {SIGNATURE_LEN}-byte signature, got {}",
            signature.len()
        )));
    }
    let sig = EcdsaSignature::from_slice(&signature[..64])
        .map_err(|e| SignerError::Verification(e.to_string()))?;
    let recid = RecoveryId::from_byte(signature[64])
        .ok_or_else(|| SignerError::Verification("invalid recovery id".into()))?;
    let digest = blake2b_256(payload);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recid)
        .map_err(|e| SignerError::Verification(e.to_string()))?;
    Ok(address_of(&key))
}
