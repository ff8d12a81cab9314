//! Filecoin account addresses.
//!
//! An address is a protocol tag plus a protocol-specific payload. The same
//! account can be named by its short ID form (`f01234`) or by its long,
//! key-derived form (`f1...`/`f3...`); callers must resolve both to one form
//! through the node before comparing them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use blake2::Blake2b;
use blake2::digest::Digest;
use blake2::digest::consts::{U4, U20};
use multibase::Base;

use super::ParseError;

/// Length of a secp256k1 / actor address payload (BLAKE2b-160).
pub const PAYLOAD_HASH_LEN: usize = 20;

/// Length of a BLS public key, which is used directly as the payload.
pub const BLS_PUB_LEN: usize = 48;

/// Length of the address checksum.
pub const CHECKSUM_LEN: usize = 4;

const MAX_SUBADDRESS_LEN: usize = 54;

/// Network prefix used when rendering an address as a string.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    fn prefix(self) -> char {
        match self {
            Network::Mainnet => 'f',
            Network::Testnet => 't',
        }
    }
}

/// Protocol-specific address payload.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Payload {
    /// Short numeric actor ID assigned by the chain.
    Id(u64),
    /// BLAKE2b-160 of an uncompressed secp256k1 public key.
    Secp256k1([u8; PAYLOAD_HASH_LEN]),
    /// BLAKE2b-160 of actor creation data.
    Actor([u8; PAYLOAD_HASH_LEN]),
    /// Raw 48-byte BLS public key.
    Bls([u8; BLS_PUB_LEN]),
    /// Address delegated to an address manager actor (e.g. EVM `f410`).
    Delegated { namespace: u64, subaddress: Vec<u8> },
}

impl Payload {
    fn protocol(&self) -> u8 {
        match self {
            Payload::Id(_) => 0,
            Payload::Secp256k1(_) => 1,
            Payload::Actor(_) => 2,
            Payload::Bls(_) => 3,
            Payload::Delegated { .. } => 4,
        }
    }

    fn payload_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Id(id) => {
                let mut out = Vec::new();
                write_uvarint(*id, &mut out);
                out
            }
            Payload::Secp256k1(h) | Payload::Actor(h) => h.to_vec(),
            Payload::Bls(pk) => pk.to_vec(),
            Payload::Delegated {
                namespace,
                subaddress,
            } => {
                let mut out = Vec::new();
                write_uvarint(*namespace, &mut out);
                out.extend_from_slice(subaddress);
                out
            }
        }
    }
}

/// A Filecoin address.
///
/// Equality and hashing only consider the payload; the network prefix is a
/// rendering detail so `f01000` and `t01000` compare equal.
#[derive(Clone, Debug, Eq)]
pub struct Address {
    network: Network,
    payload: Payload,
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
    }
}

impl Address {
    /// Builds an ID address (`f0<id>`).
    pub fn new_id(id: u64) -> Self {
        Self::with_payload(Payload::Id(id))
    }

    /// Derives a secp256k1 address from an uncompressed 65-byte public key.
    pub fn new_secp256k1(uncompressed_pubkey: &[u8]) -> Self {
        Self::with_payload(Payload::Secp256k1(blake2b_160(uncompressed_pubkey)))
    }

    /// Builds a BLS address from a 48-byte public key.
    pub fn new_bls(pubkey: &[u8]) -> Result<Self, ParseError> {
        let pk: [u8; BLS_PUB_LEN] = pubkey.try_into().map_err(|_| {
            ParseError::Address(format!(
                "BLS public key must be {BLS_PUB_LEN} bytes, got {}",
                pubkey.len()
            ))
        })?;
        Ok(Self::with_payload(Payload::Bls(pk)))
    }

    fn with_payload(payload: Payload) -> Self {
        Self {
            network: Network::Mainnet,
            payload,
        }
    }

    /// Returns the same address rendered for another network.
    pub fn on_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Protocol tag: 0 ID, 1 secp256k1, 2 actor, 3 BLS, 4 delegated.
    pub fn protocol(&self) -> u8 {
        self.payload.protocol()
    }

    /// Returns the actor ID if this is an ID address.
    pub fn id(&self) -> Option<u64> {
        match self.payload {
            Payload::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Binary encoding used inside CBOR structures: `protocol || payload`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.protocol()];
        out.extend(self.payload.payload_bytes());
        out
    }

    /// Decodes the binary form produced by [`Address::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let (&protocol, raw) = bytes
            .split_first()
            .ok_or_else(|| ParseError::Address("empty address bytes".to_string()))?;

        let payload = match protocol {
            0 => {
                let (id, used) = read_uvarint(raw)?;
                if used != raw.len() {
                    return Err(ParseError::Address(
                        "trailing bytes after ID payload".to_string(),
                    ));
                }
                Payload::Id(id)
            }
            1 => Payload::Secp256k1(fixed(raw, "secp256k1")?),
            2 => Payload::Actor(fixed(raw, "actor")?),
            3 => Payload::Bls(fixed(raw, "BLS")?),
            4 => {
                let (namespace, used) = read_uvarint(raw)?;
                let subaddress = raw[used..].to_vec();
                if subaddress.len() > MAX_SUBADDRESS_LEN {
                    return Err(ParseError::Address("delegated subaddress too long".to_string()));
                }
                Payload::Delegated {
                    namespace,
                    subaddress,
                }
            }
            other => {
                return Err(ParseError::Address(format!(
                    "unknown address protocol {other}"
                )));
            }
        };

        Ok(Self::with_payload(payload))
    }

    fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Blake2b::<U4>::new();
        hasher.update(self.to_bytes());
        hasher.finalize().into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.network.prefix();
        match &self.payload {
            Payload::Id(id) => write!(f, "{prefix}0{id}"),
            Payload::Delegated {
                namespace,
                subaddress,
            } => {
                let mut data = subaddress.clone();
                data.extend_from_slice(&self.checksum());
                write!(f, "{prefix}4{namespace}f{}", encode_base32(&data))
            }
            other => {
                let mut data = self.payload.payload_bytes();
                data.extend_from_slice(&self.checksum());
                write!(f, "{prefix}{}{}", other.protocol(), encode_base32(&data))
            }
        }
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| ParseError::Address(format!("invalid address {s:?}: {why}"));

        let mut chars = s.chars();
        let network = match chars.next() {
            Some('f') => Network::Mainnet,
            Some('t') => Network::Testnet,
            _ => return Err(invalid("unknown network prefix")),
        };
        let protocol = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| invalid("missing protocol"))?;
        let rest = chars.as_str();
        if rest.is_empty() {
            return Err(invalid("missing payload"));
        }

        if protocol == 0 {
            if !rest.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("ID payload must be decimal"));
            }
            let id = rest.parse().map_err(|_| invalid("ID out of range"))?;
            return Ok(Address {
                network,
                payload: Payload::Id(id),
            });
        }

        let (namespace, encoded) = match protocol {
            4 => {
                let (ns, sub) = rest
                    .split_once('f')
                    .ok_or_else(|| invalid("missing namespace separator"))?;
                (Some(ns.parse().map_err(|_| invalid("bad namespace"))?), sub)
            }
            1..=3 => (None, rest),
            _ => return Err(invalid("unknown protocol")),
        };

        let raw = decode_base32(encoded).ok_or_else(|| invalid("bad base32 payload"))?;
        if raw.len() < CHECKSUM_LEN {
            return Err(invalid("payload too short"));
        }
        let (body, given) = raw.split_at(raw.len() - CHECKSUM_LEN);

        let payload = match (protocol, namespace) {
            (1, _) => Payload::Secp256k1(fixed(body, "secp256k1")?),
            (2, _) => Payload::Actor(fixed(body, "actor")?),
            (3, _) => Payload::Bls(fixed(body, "BLS")?),
            (_, Some(namespace)) => {
                if body.len() > MAX_SUBADDRESS_LEN {
                    return Err(invalid("subaddress too long"));
                }
                Payload::Delegated {
                    namespace,
                    subaddress: body.to_vec(),
                }
            }
            _ => return Err(invalid("unknown protocol")),
        };

        let addr = Address { network, payload };
        if given != addr.checksum() {
            return Err(invalid("checksum mismatch"));
        }

        Ok(addr)
    }
}

fn fixed<const N: usize>(raw: &[u8], kind: &str) -> Result<[u8; N], ParseError> {
    raw.try_into().map_err(|_| {
        ParseError::Address(format!(
            "{kind} payload must be {N} bytes, got {}",
            raw.len()
        ))
    })
}

fn blake2b_160(data: &[u8]) -> [u8; PAYLOAD_HASH_LEN] {
    let mut hasher = Blake2b::<U20>::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn encode_base32(data: &[u8]) -> String {
    Base::Base32Lower.encode(data)
}

fn decode_base32(s: &str) -> Option<Vec<u8>> {
    Base::Base32Lower.decode(s).ok()
}

pub(crate) fn write_uvarint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub(crate) fn read_uvarint(bytes: &[u8]) -> Result<(u64, usize), ParseError> {
    let mut value: u64 = 0;
    for (i, b) in bytes.iter().enumerate().take(10) {
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ParseError::Address("truncated varint".to_string()))
}
