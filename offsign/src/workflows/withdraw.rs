use tracing::info;

use super::{Dispatch, Report, Workflow};
use crate::builder::build;
use crate::error::OfflineError;
use crate::fees::FeeOverrides;
use crate::node::NodeApi;
use crate::signer::KeyMaterial;
use crate::types::miner::encode_params;
use crate::types::{Address, MinerMethod, TokenAmount, WithdrawBalanceParams};

/// Withdraw available balance from a miner to its owner.
#[derive(Clone, Debug)]
pub struct WithdrawBalance {
    pub miner: Address,
    pub sender: Address,
    /// Defaults to everything available.
    pub amount: Option<TokenAmount>,
    pub fees: FeeOverrides,
    pub execute: bool,
    pub wait: bool,
}

impl<N: NodeApi + ?Sized> Workflow<'_, N> {
    pub async fn withdraw_balance(
        &self,
        key: &KeyMaterial,
        req: WithdrawBalance,
    ) -> Result<Report, OfflineError> {
        let version = self.node.version().await?;
        info!(version = %version, "connected to node");

        self.check_signer(&req.sender, key).await?;
        let info = self.miner_info(&req.miner).await?;
        let available = info.available_balance.clone();

        let amount = match req.amount {
            None => available.clone(),
            Some(amount) if amount.is_negative() => {
                return Err(OfflineError::InputValidation(format!(
                    "amount must not be negative, got {}",
                    amount.to_fil_string()
                )));
            }
            Some(amount) if amount > available => {
                return Err(OfflineError::InputValidation(format!(
                    "can't withdraw more funds than available; requested: {}; available: {}",
                    amount.to_fil_string(),
                    available.to_fil_string()
                )));
            }
            Some(amount) => amount,
        };
        if amount.is_zero() {
            return Err(OfflineError::InputValidation(
                "nothing to withdraw, available balance is zero".to_string(),
            ));
        }
        let warnings: Vec<String> = self.owner_warning(&info, &req.sender).await?.into_iter().collect();

        let params = encode_params(&WithdrawBalanceParams {
            amount_requested: amount.clone(),
        })?;
        let nonce = self.node.next_nonce(&req.sender).await?;
        let draft = build(
            &req.sender,
            &req.miner,
            MinerMethod::WithdrawBalance.number(),
            TokenAmount::zero(),
            params,
            nonce,
        );
        let message = self.price(draft, None, &req.fees).await?;

        self.dispatch(
            format!(
                "withdraw {} of {} available from {}",
                amount.to_fil_string(),
                available.to_fil_string(),
                req.miner
            ),
            key,
            message,
            Dispatch {
                execute: req.execute,
                wait: req.wait,
                postcondition: None,
            },
            warnings,
        )
        .await
    }
}
