//! Storage-provider (miner) actor methods, parameters and state snapshot.
//!
//! Parameter structs serialize to the actor's CBOR tuple layout. The message
//! builder treats the resulting bytes as opaque; [`encode_params`] is the
//! single place that turns a typed parameter struct into those bytes.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeTuple, Serializer};
use serde_bytes::{ByteBuf, Bytes};

use super::{Address, ChainEpoch, MethodNum, ParseError, TokenAmount};

/// Method numbers used by the offline workflows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MinerMethod {
    /// Plain value transfer; valid on any actor.
    Send,
    ChangeWorkerAddress,
    WithdrawBalance,
    ConfirmChangeWorkerAddress,
    ChangeOwnerAddress,
}

impl MinerMethod {
    pub const fn number(self) -> MethodNum {
        match self {
            MinerMethod::Send => 0,
            MinerMethod::ChangeWorkerAddress => 3,
            MinerMethod::WithdrawBalance => 16,
            MinerMethod::ConfirmChangeWorkerAddress => 21,
            MinerMethod::ChangeOwnerAddress => 23,
        }
    }

    pub fn from_number(n: MethodNum) -> Option<Self> {
        [
            MinerMethod::Send,
            MinerMethod::ChangeWorkerAddress,
            MinerMethod::WithdrawBalance,
            MinerMethod::ConfirmChangeWorkerAddress,
            MinerMethod::ChangeOwnerAddress,
        ]
        .into_iter()
        .find(|m| m.number() == n)
    }
}

/// Parameters of `ChangeWorkerAddress`: the worker to propose (or keep) and
/// the complete new list of control addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeWorkerAddressParams {
    pub new_worker: Address,
    pub new_control_addresses: Vec<Address>,
}

impl Serialize for ChangeWorkerAddressParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let controls: Vec<ByteBuf> = self
            .new_control_addresses
            .iter()
            .map(|a| ByteBuf::from(a.to_bytes()))
            .collect();
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(Bytes::new(&self.new_worker.to_bytes()))?;
        tuple.serialize_element(&controls)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for ChangeWorkerAddressParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (worker, controls): (ByteBuf, Vec<ByteBuf>) = Deserialize::deserialize(deserializer)?;
        let new_worker = Address::from_bytes(&worker).map_err(serde::de::Error::custom)?;
        let new_control_addresses = controls
            .iter()
            .map(|b| Address::from_bytes(b))
            .collect::<Result<Vec<_>, _>>()
            .map_err(serde::de::Error::custom)?;
        Ok(Self {
            new_worker,
            new_control_addresses,
        })
    }
}

/// Parameters of `WithdrawBalance`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawBalanceParams {
    pub amount_requested: TokenAmount,
}

impl Serialize for WithdrawBalanceParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (Bytes::new(&self.amount_requested.to_cbor_bytes()),).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WithdrawBalanceParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (raw,): (ByteBuf,) = Deserialize::deserialize(deserializer)?;
        let amount_requested =
            TokenAmount::from_cbor_bytes(&raw).map_err(serde::de::Error::custom)?;
        Ok(Self { amount_requested })
    }
}

/// Parameters of `ChangeOwnerAddress`: a bare address, not a tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeOwnerParams {
    pub new_owner: Address,
}

impl Serialize for ChangeOwnerParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Bytes::new(&self.new_owner.to_bytes()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChangeOwnerParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = ByteBuf::deserialize(deserializer)?;
        let new_owner = Address::from_bytes(&raw).map_err(serde::de::Error::custom)?;
        Ok(Self { new_owner })
    }
}

/// Serializes method parameters to their CBOR wire form.
pub fn encode_params<T: Serialize>(params: &T) -> Result<Vec<u8>, ParseError> {
    serde_cbor::to_vec(params).map_err(|e| ParseError::Encoding(format!("serializing params: {e}")))
}

/// Decodes CBOR method parameters.
pub fn decode_params<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ParseError> {
    serde_cbor::from_slice(bytes)
        .map_err(|e| ParseError::Encoding(format!("deserializing params: {e}")))
}

/// Read-only view of a miner actor, fetched fresh before every decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinerInfo {
    /// Owner, in ID form.
    pub owner: Address,
    /// Current worker, in ID form.
    pub worker: Address,
    /// Worker proposed by a pending `ChangeWorkerAddress`, if any.
    pub pending_worker: Option<Address>,
    /// Height at or after which the pending worker can be confirmed.
    /// Meaningless without a pending worker.
    pub worker_change_epoch: ChainEpoch,
    /// Owner proposed by a pending `ChangeOwnerAddress`, if any.
    pub pending_owner: Option<Address>,
    pub control_addresses: Vec<Address>,
    /// Balance that can be withdrawn right now.
    pub available_balance: TokenAmount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_numbers_match_the_actor_interface() {
        assert_eq!(MinerMethod::ChangeWorkerAddress.number(), 3);
        assert_eq!(MinerMethod::WithdrawBalance.number(), 16);
        assert_eq!(MinerMethod::ConfirmChangeWorkerAddress.number(), 21);
        assert_eq!(MinerMethod::ChangeOwnerAddress.number(), 23);
        assert_eq!(
            MinerMethod::from_number(21),
            Some(MinerMethod::ConfirmChangeWorkerAddress)
        );
        assert_eq!(MinerMethod::from_number(99), None);
    }

    #[test]
    fn change_worker_params_encode_as_two_tuple() {
        let params = ChangeWorkerAddressParams {
            new_worker: Address::new_id(5),
            new_control_addresses: vec![Address::new_id(6), Address::new_id(7)],
        };
        let bytes = encode_params(&params).unwrap();
        // array(2), bytes(2) [0x00, 0x05], array(2) ...
        assert_eq!(&bytes[..4], &[0x82, 0x42, 0x00, 0x05]);
        assert_eq!(bytes[4], 0x82);

        let decoded: ChangeWorkerAddressParams = decode_params(&bytes).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn withdraw_params_wrap_amount_in_one_tuple() {
        let params = WithdrawBalanceParams {
            amount_requested: TokenAmount::from(256u64),
        };
        let bytes = encode_params(&params).unwrap();
        assert_eq!(bytes, vec![0x81, 0x43, 0x00, 0x01, 0x00]);
        let decoded: WithdrawBalanceParams = decode_params(&bytes).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn change_owner_params_are_a_bare_address() {
        let params = ChangeOwnerParams {
            new_owner: Address::new_id(1234),
        };
        let bytes = encode_params(&params).unwrap();
        assert_eq!(bytes, vec![0x43, 0x00, 0xd2, 0x09]);
        let decoded: ChangeOwnerParams = decode_params(&bytes).unwrap();
        assert_eq!(decoded, params);
    }
}
