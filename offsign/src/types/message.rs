//! Unsigned and signed messages and their content identifiers.
//!
//! The canonical encoding of a message is a DAG-CBOR tuple; its content
//! identifier (CIDv1, DAG-CBOR codec, BLAKE2b-256 multihash) is what gets
//! signed and what the node reports back after a push. Every hashing and
//! signing path goes through [`UnsignedMessage::canonical_bytes`] and
//! [`UnsignedMessage::cid`] to avoid format drift.

use std::fmt;
use std::str::FromStr;

use blake2::Blake2b;
use blake2::digest::Digest;
use blake2::digest::consts::U32;
use cid::Cid;
use cid::multihash::Multihash;
use serde::ser::{Serialize, SerializeTuple, Serializer};
use serde_bytes::Bytes;

use super::{Address, MethodNum, ParseError, TokenAmount};

/// Multicodec code for DAG-CBOR.
pub const DAG_CBOR: u64 = 0x71;

/// Multihash code for BLAKE2b-256.
pub const BLAKE2B_256: u64 = 0xb220;

/// Content identifier of a message, as returned by the node's pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MessageId(pub Cid);

impl MessageId {
    /// Computes the DAG-CBOR / BLAKE2b-256 CID of an encoded object.
    pub fn of_cbor(bytes: &[u8]) -> Self {
        let digest = blake2b_256(bytes);
        // A 32-byte digest always fits the 64-byte multihash buffer.
        let mh = Multihash::<64>::wrap(BLAKE2B_256, &digest)
            .expect("32-byte digest fits in a 64-byte multihash");
        MessageId(Cid::new_v1(DAG_CBOR, mh))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cid::try_from(s.trim())
            .map(MessageId)
            .map_err(|e| ParseError::Cid(format!("{s:?}: {e}")))
    }
}

/// An unsigned message addressed to an actor method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedMessage {
    pub version: u64,
    pub to: Address,
    pub from: Address,
    /// Sender sequence number; must equal the sender's next expected nonce
    /// when the node evaluates it.
    pub nonce: u64,
    pub value: TokenAmount,
    pub gas_limit: i64,
    pub gas_fee_cap: TokenAmount,
    pub gas_premium: TokenAmount,
    pub method: MethodNum,
    /// Method parameters, already serialized. Opaque to the message layer.
    pub params: Vec<u8>,
}

impl UnsignedMessage {
    /// Canonical DAG-CBOR encoding of this message.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Every field is a plain integer or byte string, so encoding into a
        // Vec cannot fail.
        serde_cbor::to_vec(self).expect("message fields are always CBOR-encodable")
    }

    /// Content identifier of the canonical encoding. This is the digest the
    /// sender signs.
    pub fn cid(&self) -> MessageId {
        MessageId::of_cbor(&self.canonical_bytes())
    }

    /// Maximum amount of attoFIL this message can burn on gas.
    pub fn max_gas_cost(&self) -> TokenAmount {
        &self.gas_fee_cap * self.gas_limit
    }
}

impl Serialize for UnsignedMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(10)?;
        tuple.serialize_element(&self.version)?;
        tuple.serialize_element(Bytes::new(&self.to.to_bytes()))?;
        tuple.serialize_element(Bytes::new(&self.from.to_bytes()))?;
        tuple.serialize_element(&self.nonce)?;
        tuple.serialize_element(Bytes::new(&self.value.to_cbor_bytes()))?;
        tuple.serialize_element(&self.gas_limit)?;
        tuple.serialize_element(Bytes::new(&self.gas_fee_cap.to_cbor_bytes()))?;
        tuple.serialize_element(Bytes::new(&self.gas_premium.to_cbor_bytes()))?;
        tuple.serialize_element(&self.method)?;
        tuple.serialize_element(Bytes::new(&self.params))?;
        tuple.end()
    }
}

/// Signature scheme tag, numbered as on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SigType {
    Secp256k1 = 1,
    Bls = 2,
}

impl SigType {
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(SigType::Secp256k1),
            2 => Some(SigType::Bls),
            _ => None,
        }
    }
}

/// Detached signature over a message CID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub sig_type: SigType,
    pub bytes: Vec<u8>,
}

impl Signature {
    /// Wire form: the type byte followed by the raw signature bytes.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() + 1);
        out.push(self.sig_type as u8);
        out.extend_from_slice(&self.bytes);
        out
    }
}

/// An unsigned message together with the sender's signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedMessage {
    pub message: UnsignedMessage,
    pub signature: Signature,
}

impl SignedMessage {
    /// Identifier the pool reports for this message.
    ///
    /// BLS messages are aggregated in blocks, so they are identified by the
    /// unsigned message CID; secp256k1 messages by the CID of the signed
    /// envelope.
    pub fn id(&self) -> MessageId {
        match self.signature.sig_type {
            SigType::Bls => self.message.cid(),
            SigType::Secp256k1 => {
                let bytes =
                    serde_cbor::to_vec(self).expect("signed message is always CBOR-encodable");
                MessageId::of_cbor(&bytes)
            }
        }
    }
}

impl Serialize for SignedMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.message)?;
        tuple.serialize_element(Bytes::new(&self.signature.to_wire_bytes()))?;
        tuple.end()
    }
}

pub(crate) fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> UnsignedMessage {
        UnsignedMessage {
            version: 0,
            to: Address::new_id(1000),
            from: Address::new_id(1001),
            nonce: 7,
            value: TokenAmount::from(5u64),
            gas_limit: 1_000_000,
            gas_fee_cap: TokenAmount::from(200u64),
            gas_premium: TokenAmount::from(100u64),
            method: 3,
            params: vec![0x82, 0x42, 0x00, 0x01],
        }
    }

    #[test]
    fn canonical_bytes_are_a_ten_element_cbor_array() {
        let bytes = sample_message().canonical_bytes();
        // 0x8a = major type 4 (array), length 10.
        assert_eq!(bytes[0], 0x8a);
        // version 0 encodes as a single zero byte.
        assert_eq!(bytes[1], 0x00);
    }

    #[test]
    fn cid_is_deterministic_and_sensitive_to_every_field() {
        let base = sample_message();
        assert_eq!(base.cid(), sample_message().cid());

        let mut nonce = base.clone();
        nonce.nonce += 1;
        let mut value = base.clone();
        value.value = TokenAmount::from(6u64);
        let mut params = base.clone();
        params.params.push(0);

        for changed in [nonce, value, params] {
            assert_ne!(changed.cid(), base.cid());
        }
    }

    #[test]
    fn message_id_uses_dag_cbor_and_blake2b() {
        let id = sample_message().cid();
        assert_eq!(id.0.codec(), DAG_CBOR);
        assert_eq!(id.0.hash().code(), BLAKE2B_256);
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn signed_id_depends_on_scheme() {
        let message = sample_message();
        let bls = SignedMessage {
            message: message.clone(),
            signature: Signature {
                sig_type: SigType::Bls,
                bytes: vec![1; 96],
            },
        };
        let secp = SignedMessage {
            message: message.clone(),
            signature: Signature {
                sig_type: SigType::Secp256k1,
                bytes: vec![1; 65],
            },
        };
        assert_eq!(bls.id(), message.cid());
        assert_ne!(secp.id(), message.cid());
    }

    #[test]
    fn max_gas_cost_multiplies_limit_and_fee_cap() {
        assert_eq!(sample_message().max_gas_cost(), TokenAmount::from(200_000_000u64));
    }
}
