//! Offline signing.
//!
//! Key material arrives as the hex-encoded JSON key-info blob exported by
//! wallets (`{"Type": "secp256k1" | "bls", "PrivateKey": "<base64>"}`). It is
//! decoded once into a [`KeyMaterial`] variant, kept only in memory, zeroized
//! on drop and never printed. Nothing in this module performs I/O.
//!
//! The signed payload is always the bytes of the unsigned message's CID, as
//! produced by [`UnsignedMessage::cid`].

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::types::{Address, Payload, SigType, Signature, SignedMessage, UnsignedMessage};

pub mod bls;
pub mod secp256k1;

pub use bls::BlsKey;
pub use secp256k1::Secp256k1Key;

/// Errors raised by the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// Blob is not hex, not JSON, not base64, or holds an invalid secret.
    MalformedKeyMaterial(String),
    /// Key type tag this signer does not handle.
    UnsupportedKeyType(String),
    /// The signing primitive itself failed.
    Signing(String),
    /// Signature does not verify against the given signer.
    Verification(String),
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerError::MalformedKeyMaterial(msg) => write!(f, "malformed key material: {msg}"),
            SignerError::UnsupportedKeyType(tag) => write!(f, "unsupported key type {tag:?}"),
            SignerError::Signing(msg) => write!(f, "signing failed: {msg}"),
            SignerError::Verification(msg) => write!(f, "signature verification failed: {msg}"),
        }
    }
}

impl std::error::Error for SignerError {}

/// Wire shape of a wallet key-info export.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyInfoBlob {
    #[serde(rename = "Type")]
    key_type: String,
    #[serde(rename = "PrivateKey")]
    private_key: String,
}

/// A decoded private key, tagged by signature scheme.
pub enum KeyMaterial {
    Secp256k1(Secp256k1Key),
    Bls(BlsKey),
}

impl KeyMaterial {
    /// Decodes a hex-encoded key-info blob.
    pub fn from_hex_blob(blob: &str) -> Result<Self, SignerError> {
        let json = Zeroizing::new(
            hex::decode(blob.trim())
                .map_err(|e| SignerError::MalformedKeyMaterial(format!("not hex: {e}")))?,
        );
        let info: KeyInfoBlob = serde_json::from_slice(&json)
            .map_err(|e| SignerError::MalformedKeyMaterial(format!("not a key-info object: {e}")))?;
        let secret = Zeroizing::new(
            STANDARD
                .decode(info.private_key.as_bytes())
                .map_err(|e| SignerError::MalformedKeyMaterial(format!("private key: {e}")))?,
        );

        match info.key_type.as_str() {
            "secp256k1" => Ok(KeyMaterial::Secp256k1(Secp256k1Key::from_bytes(&secret)?)),
            "bls" => Ok(KeyMaterial::Bls(BlsKey::from_bytes(&secret)?)),
            other => Err(SignerError::UnsupportedKeyType(other.to_string())),
        }
    }

    pub fn sig_type(&self) -> SigType {
        match self {
            KeyMaterial::Secp256k1(_) => SigType::Secp256k1,
            KeyMaterial::Bls(_) => SigType::Bls,
        }
    }

    /// Account-key address controlled by this key.
    pub fn address(&self) -> Address {
        match self {
            KeyMaterial::Secp256k1(k) => k.address(),
            KeyMaterial::Bls(k) => k.address(),
        }
    }

    /// Signs the CID of `message`.
    pub fn sign(&self, message: &UnsignedMessage) -> Result<Signature, SignerError> {
        let digest = message.cid().to_bytes();
        let bytes = match self {
            KeyMaterial::Secp256k1(k) => k.sign(&digest)?,
            KeyMaterial::Bls(k) => k.sign(&digest),
        };
        Ok(Signature {
            sig_type: self.sig_type(),
            bytes,
        })
    }

    /// Signs `message` and pairs it with its signature.
    pub fn sign_message(&self, message: UnsignedMessage) -> Result<SignedMessage, SignerError> {
        let signature = self.sign(&message)?;
        Ok(SignedMessage { message, signature })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("type", &self.sig_type())
            .field("address", &self.address().to_string())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Checks `signature` over `message` against the account-key address
/// `signer`. ID addresses cannot be checked offline.
pub fn verify(
    signer: &Address,
    message: &UnsignedMessage,
    signature: &Signature,
) -> Result<(), SignerError> {
    let digest = message.cid().to_bytes();
    match (signature.sig_type, signer.payload()) {
        (SigType::Secp256k1, Payload::Secp256k1(_)) => {
            let recovered = secp256k1::recover_address(&digest, &signature.bytes)?;
            if recovered == *signer {
                Ok(())
            } else {
                Err(SignerError::Verification(format!(
                    "recovered signer {recovered}, expected {signer}"
                )))
            }
        }
        (SigType::Bls, Payload::Bls(public_key)) => {
            bls::verify(public_key, &digest, &signature.bytes)
        }
        (sig_type, _) => Err(SignerError::Verification(format!(
            "{sig_type:?} signature cannot be checked against {signer}"
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::blob;
    use super::*;
    use crate::builder::build;
    use crate::types::TokenAmount;

    fn message(from: &Address) -> UnsignedMessage {
        let mut msg = build(
            from,
            &Address::new_id(1000),
            0,
            TokenAmount::from_whole(1),
            Vec::new(),
            3,
        );
        msg.gas_limit = 1_000_000;
        msg.gas_fee_cap = TokenAmount::from(100_000u64);
        msg.gas_premium = TokenAmount::from(1_000u64);
        msg
    }

    fn keys() -> Vec<KeyMaterial> {
        let bls_secret = ::bls_signatures::Serialize::as_bytes(
            &::bls_signatures::PrivateKey::new(b"offsign test seed for bls keys!!"),
        );
        vec![
            KeyMaterial::from_hex_blob(&blob("secp256k1", &[7u8; 32])).unwrap(),
            KeyMaterial::from_hex_blob(&blob("bls", &bls_secret)).unwrap(),
        ]
    }

    #[test]
    fn sign_then_verify_roundtrips_for_each_scheme() {
        for key in keys() {
            let signer = key.address();
            let msg = message(&signer);
            let sig = key.sign(&msg).unwrap();
            assert_eq!(sig.sig_type, key.sig_type());
            verify(&signer, &msg, &sig).unwrap();
        }
    }

    #[test]
    fn mutating_any_field_breaks_the_signature() {
        for key in keys() {
            let signer = key.address();
            let msg = message(&signer);
            let sig = key.sign(&msg).unwrap();

            let mut value = msg.clone();
            value.value = TokenAmount::from_whole(2);
            let mut nonce = msg.clone();
            nonce.nonce += 1;
            let mut params = msg.clone();
            params.params = vec![0x40];

            for tampered in [value, nonce, params] {
                assert!(verify(&signer, &tampered, &sig).is_err());
            }
        }
    }

    #[test]
    fn secp_signature_is_65_bytes_and_bls_96() {
        let keys = keys();
        let secp = keys[0].sign(&message(&keys[0].address())).unwrap();
        let bls = keys[1].sign(&message(&keys[1].address())).unwrap();
        assert_eq!(secp.bytes.len(), 65);
        assert_eq!(bls.bytes.len(), 96);
    }

    #[test]
    fn malformed_blobs_are_rejected() {
        let cases = [
            "zz".to_string(),
            hex::encode("not json"),
            hex::encode(r#"{"Type":"secp256k1","PrivateKey":"***"}"#),
            blob("secp256k1", &[0u8; 32]),
            blob("secp256k1", &[1u8; 31]),
        ];
        for case in cases {
            assert!(matches!(
                KeyMaterial::from_hex_blob(&case),
                Err(SignerError::MalformedKeyMaterial(_))
            ));
        }
    }

    #[test]
    fn unknown_key_types_are_unsupported() {
        for tag in ["delegated", "ed25519", ""] {
            assert_eq!(
                KeyMaterial::from_hex_blob(&blob(tag, &[7u8; 32])).unwrap_err(),
                SignerError::UnsupportedKeyType(tag.to_string())
            );
        }
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let secret = [7u8; 32];
        let key = KeyMaterial::from_hex_blob(&blob("secp256k1", &secret)).unwrap();
        let printed = format!("{key:?}");
        assert!(printed.contains("redacted"));
        assert!(!printed.contains(&hex::encode(secret)));
    }

    #[test]
    fn id_signer_cannot_be_verified_offline() {
        let key = &keys()[0];
        let msg = message(&key.address());
        let sig = key.sign(&msg).unwrap();
        assert!(verify(&Address::new_id(5), &msg, &sig).is_err());
    }
}
