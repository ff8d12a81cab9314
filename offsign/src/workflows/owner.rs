//! Two-step owner change.
//!
//! The current owner proposes a new owner with `ChangeOwnerAddress(new)`;
//! the proposed owner then sends `ChangeOwnerAddress(self)` to accept.

use tracing::info;

use super::{Dispatch, Report, Workflow};
use crate::builder::build;
use crate::error::OfflineError;
use crate::fees::FeeOverrides;
use crate::node::NodeApi;
use crate::signer::KeyMaterial;
use crate::submit::Postcondition;
use crate::types::miner::encode_params;
use crate::types::{Address, ChangeOwnerParams, MinerMethod, TokenAmount};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnerStep {
    /// Sent by the current owner.
    Propose { new_owner: Address },
    /// Sent by the proposed owner.
    Confirm,
}

#[derive(Clone, Debug)]
pub struct SetOwner {
    pub miner: Address,
    pub sender: Address,
    pub step: OwnerStep,
    pub fees: FeeOverrides,
    pub execute: bool,
    pub wait: bool,
}

impl<N: NodeApi + ?Sized> Workflow<'_, N> {
    pub async fn set_owner(&self, key: &KeyMaterial, req: SetOwner) -> Result<Report, OfflineError> {
        self.check_signer(&req.sender, key).await?;
        let info = self.miner_info(&req.miner).await?;
        let sender_id = self.resolve_id(&req.sender).await?;

        let mut warnings = Vec::new();
        let (new_owner, action, postcondition) = match &req.step {
            OwnerStep::Propose { new_owner } => {
                let new_owner = self.resolve_id(new_owner).await?;
                if new_owner == info.owner {
                    return Err(OfflineError::InputValidation(format!(
                        "{new_owner} is already the owner of {}",
                        req.miner
                    )));
                }
                warnings.extend(self.owner_warning(&info, &req.sender).await?);
                let action = format!("propose {new_owner} as owner of {}", req.miner);
                (new_owner.clone(), action, Postcondition::PendingOwner(new_owner))
            }
            OwnerStep::Confirm => {
                match &info.pending_owner {
                    Some(pending) if *pending == sender_id => {}
                    Some(pending) => {
                        return Err(OfflineError::InputValidation(format!(
                            "pending owner of {} is {pending}, not the sender {sender_id}",
                            req.miner
                        )));
                    }
                    None => {
                        return Err(OfflineError::InputValidation(format!(
                            "{} has no pending owner change",
                            req.miner
                        )));
                    }
                }
                let action = format!("accept ownership of {} as {sender_id}", req.miner);
                (sender_id.clone(), action, Postcondition::Owner(sender_id.clone()))
            }
        };

        let params = encode_params(&ChangeOwnerParams { new_owner })?;
        let nonce = self.node.next_nonce(&req.sender).await?;
        let draft = build(
            &req.sender,
            &req.miner,
            MinerMethod::ChangeOwnerAddress.number(),
            TokenAmount::zero(),
            params,
            nonce,
        );
        let message = self.price(draft, None, &req.fees).await?;

        let mut report = self
            .dispatch(
                action,
                key,
                message,
                Dispatch {
                    execute: req.execute,
                    wait: req.wait,
                    postcondition: req.wait.then_some((&req.miner, postcondition)),
                },
                warnings,
            )
            .await?;

        if let OwnerStep::Propose { .. } = req.step {
            if report.submitted {
                info!(miner = %req.miner, "owner change proposed");
            }
            report
                .next_steps
                .push("the new owner must send the confirm step to accept".to_string());
        }
        Ok(report)
    }
}
