//! Unsigned message assembly.

use crate::types::{Address, MethodNum, TokenAmount, UnsignedMessage};

/// Message version understood by the network.
pub const MESSAGE_VERSION: u64 = 0;

/// Assembles an unsigned message with zeroed gas fields.
///
/// `params` must already be serialized (see [`crate::types::miner::encode_params`]);
/// the builder never inspects it. Gas fields are filled in later by the fee
/// policy, after the node has estimated this exact message.
pub fn build(
    from: &Address,
    to: &Address,
    method: MethodNum,
    value: TokenAmount,
    params: Vec<u8>,
    nonce: u64,
) -> UnsignedMessage {
    UnsignedMessage {
        version: MESSAGE_VERSION,
        to: to.clone(),
        from: from.clone(),
        nonce,
        value,
        gas_limit: 0,
        gas_fee_cap: TokenAmount::zero(),
        gas_premium: TokenAmount::zero(),
        method,
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::miner::{MinerMethod, WithdrawBalanceParams, encode_params};

    #[test]
    fn build_is_deterministic() {
        let params = encode_params(&WithdrawBalanceParams {
            amount_requested: TokenAmount::from_whole(3),
        })
        .unwrap();
        let make = || {
            build(
                &Address::new_id(100),
                &Address::new_id(1000),
                MinerMethod::WithdrawBalance.number(),
                TokenAmount::zero(),
                params.clone(),
                42,
            )
        };
        let a = make();
        let b = make();
        assert_eq!(a, b);
        assert_eq!(a.cid(), b.cid());
        assert_eq!(a.nonce, 42);
        assert_eq!(a.method, 16);
        assert_eq!(a.params, params);
    }

    #[test]
    fn gas_fields_start_empty() {
        let msg = build(
            &Address::new_id(1),
            &Address::new_id(2),
            0,
            TokenAmount::from(5u64),
            Vec::new(),
            0,
        );
        assert_eq!(msg.gas_limit, 0);
        assert!(msg.gas_fee_cap.is_zero());
        assert!(msg.gas_premium.is_zero());
    }
}
