//! Replace-by-fee for a message stuck in the pool.

use tracing::info;

use super::{Dispatch, Report, Workflow};
use crate::error::OfflineError;
use crate::fees::{FeeOverrides, FeeParameters};
use crate::node::NodeApi;
use crate::signer::KeyMaterial;
use crate::types::{Address, MessageId, TokenAmount};

/// Which pending message to replace.
#[derive(Clone, Debug)]
pub enum ReplaceTarget {
    FromNonce { from: Address, nonce: u64 },
    /// Sender and nonce are read from the referenced message.
    Message(MessageId),
}

#[derive(Clone, Debug)]
pub struct ReplacePending {
    pub target: ReplaceTarget,
    /// Re-estimate and bump automatically. Otherwise `fees.gas_premium` and
    /// `fees.gas_fee_cap` are required.
    pub auto: bool,
    pub fees: FeeOverrides,
    pub execute: bool,
    pub wait: bool,
}

#[derive(Clone, Debug)]
pub struct ReplaceOutcome {
    pub replaced: MessageId,
    pub previous_premium: TokenAmount,
    pub report: Report,
}

impl<N: NodeApi + ?Sized> Workflow<'_, N> {
    pub async fn replace_pending(
        &self,
        key: &KeyMaterial,
        req: ReplacePending,
    ) -> Result<ReplaceOutcome, OfflineError> {
        let (from, nonce) = match &req.target {
            ReplaceTarget::FromNonce { from, nonce } => (from.clone(), *nonce),
            ReplaceTarget::Message(id) => {
                let msg = self.node.get_message(id).await.map_err(|e| {
                    OfflineError::InputValidation(format!(
                        "could not find referenced message {id}: {e}"
                    ))
                })?;
                (msg.from, msg.nonce)
            }
        };

        let head = self.node.chain_head().await?;
        let pending = self.node.pending_messages(&head.key).await?;
        let sender_id = self.resolve_id(&from).await?;

        let mut found = None;
        for candidate in pending.into_iter().filter(|p| p.message.nonce == nonce) {
            if candidate.message.from == from
                || self.resolve_id(&candidate.message.from).await? == sender_id
            {
                found = Some(candidate);
                break;
            }
        }
        let found = found.ok_or_else(|| OfflineError::PendingMessageNotFound {
            from: from.clone(),
            nonce,
        })?;

        self.check_signer(&found.message.from, key).await?;

        let previous = FeeParameters::of(&found.message);
        let mut message = found.message.clone();
        let fees = if req.auto {
            message.gas_fee_cap = TokenAmount::zero();
            message.gas_premium = TokenAmount::zero();
            let priced = self
                .price(message.clone(), Some(&previous.gas_premium), &req.fees)
                .await?;
            FeeParameters::of(&priced)
        } else {
            self.fee_policy().manual_replacement(&previous, &req.fees)?
        };
        fees.apply_to(&mut message);

        info!(
            from = %message.from,
            nonce,
            old_premium = %previous.gas_premium,
            new_premium = %fees.gas_premium,
            fee_cap = %fees.gas_fee_cap,
            "replacing pending message"
        );

        let action = format!(
            "replace message {} from {} nonce {nonce}: premium {} -> {}, fee cap {} -> {}",
            found.id(),
            message.from,
            previous.gas_premium,
            fees.gas_premium,
            previous.gas_fee_cap,
            fees.gas_fee_cap
        );
        let report = self
            .dispatch(
                action,
                key,
                message,
                Dispatch {
                    execute: req.execute,
                    wait: req.wait,
                    postcondition: None,
                },
                Vec::new(),
            )
            .await?;

        Ok(ReplaceOutcome {
            replaced: found.id(),
            previous_premium: previous.gas_premium,
            report,
        })
    }
}
