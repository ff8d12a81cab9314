//! BLS keys. Signatures are over the raw payload bytes (96 bytes, G2).

use bls_signatures::{PrivateKey, PublicKey, Serialize as _, Signature as BlsSignature};
use zeroize::Zeroizing;

use super::SignerError;
use crate::types::Address;
use crate::types::address::BLS_PUB_LEN;

/// Length of a BLS private key.
pub const SECRET_LEN: usize = 32;

/// A BLS private key.
///
/// The scalar is parsed once and held only inside the library's
/// `PrivateKey`; the raw input bytes are zeroized as soon as it is built.
pub struct BlsKey {
    private: PrivateKey,
    public: [u8; BLS_PUB_LEN],
    address: Address,
}

impl BlsKey {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        let bytes: Zeroizing<[u8; SECRET_LEN]> =
            Zeroizing::new(secret.try_into().map_err(|_| {
                SignerError::MalformedKeyMaterial(format!(
                    "bls key must be {SECRET_LEN} bytes, got {}",
                    secret.len()
                ))
            })?);
        let private = PrivateKey::from_bytes(&bytes[..])
            .map_err(|e| SignerError::MalformedKeyMaterial(format!("bls key: {e}")))?;
        let public: [u8; BLS_PUB_LEN] = private
            .public_key()
            .as_bytes()
            .try_into()
            .map_err(|_| SignerError::MalformedKeyMaterial("bls public key length".into()))?;
        let address = Address::new_bls(&public)
            .map_err(|e| SignerError::MalformedKeyMaterial(e.to_string()))?;
        Ok(Self {
            private,
            public,
            address,
        })
    }

    pub fn address(&self) -> Address {
        self.address.clone()
    }

    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.private.sign(payload).as_bytes()
    }
}

/// Verifies a BLS signature over `payload` for `public_key`.
pub fn verify(
    public_key: &[u8; BLS_PUB_LEN],
    payload: &[u8],
    signature: &[u8],
) -> Result<(), SignerError> {
    let pk = PublicKey::from_bytes(public_key)
        .map_err(|e| SignerError::Verification(format!("bls public key: {e}")))?;
    let sig = BlsSignature::from_bytes(signature)
        .map_err(|e| SignerError::Verification(format!("bls signature: {e}")))?;
    if pk.verify(sig, payload) {
        Ok(())
    } else {
        Err(SignerError::Verification("bls signature does not match".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BlsKey {
        let secret = PrivateKey::new(b"another thirty-two byte bls seed").as_bytes();
        BlsKey::from_bytes(&secret).unwrap()
    }

    #[test]
    fn address_is_a_bls_address() {
        let addr = key().address();
        assert_eq!(addr.protocol(), 3);
        assert!(addr.to_string().starts_with("f3"));
    }

    #[test]
    fn verify_checks_payload() {
        let k = key();
        let sig = k.sign(b"payload");
        verify(&k.public, b"payload", &sig).unwrap();
        assert!(verify(&k.public, b"tampered", &sig).is_err());
    }

    #[test]
    fn signing_is_deterministic_for_one_loaded_key() {
        let k = key();
        assert_eq!(k.sign(b"payload"), k.sign(b"payload"));
        assert_eq!(k.sign(b"payload"), key().sign(b"payload"));
        assert_eq!(k.sign(b"payload").len(), 96);
    }

    #[test]
    fn wrong_length_secret_is_malformed() {
        assert!(matches!(
            BlsKey::from_bytes(&[1u8; 31]),
            Err(SignerError::MalformedKeyMaterial(_))
        ));
    }
}
