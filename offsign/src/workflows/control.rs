//! Control-address management and worker key rotation.
//!
//! All three workflows send `ChangeWorkerAddress` or
//! `ConfirmChangeWorkerAddress` to the miner from its owner:
//!
//! - `set_control_addresses` keeps the current worker and replaces the
//!   control list,
//! - `propose_worker_change` keeps the control list and proposes a worker,
//! - `confirm_worker_change` completes a proposal once its activation height
//!   is reached.

use tracing::info;

use super::{Dispatch, Report, Workflow};
use crate::builder::build;
use crate::error::OfflineError;
use crate::fees::FeeOverrides;
use crate::node::NodeApi;
use crate::reconcile::{ControlDiff, reconcile};
use crate::rotation::RotationState;
use crate::signer::KeyMaterial;
use crate::submit::Postcondition;
use crate::types::miner::encode_params;
use crate::types::{Address, ChainEpoch, ChangeWorkerAddressParams, MinerMethod, TokenAmount};

/// Replace a miner's control addresses.
#[derive(Clone, Debug)]
pub struct SetControlAddresses {
    pub miner: Address,
    /// Owner account sending the message.
    pub sender: Address,
    /// Complete desired list, in order.
    pub desired: Vec<Address>,
    pub fees: FeeOverrides,
    pub execute: bool,
    pub wait: bool,
}

#[derive(Clone, Debug)]
pub struct ControlSetOutcome {
    /// Diff in account-key form.
    pub diff: ControlDiff,
    pub report: Report,
}

/// Propose a new worker key.
#[derive(Clone, Debug)]
pub struct ProposeWorkerChange {
    pub miner: Address,
    pub sender: Address,
    pub new_worker: Address,
    pub fees: FeeOverrides,
    pub execute: bool,
}

#[derive(Clone, Debug)]
pub struct ProposeOutcome {
    /// Proposed worker, in ID form.
    pub new_worker: Address,
    /// Height at or after which the change can be confirmed. Known once the
    /// proposal has been included.
    pub activation_height: Option<ChainEpoch>,
    pub report: Report,
}

/// Confirm a pending worker key change.
#[derive(Clone, Debug)]
pub struct ConfirmWorkerChange {
    pub miner: Address,
    pub sender: Address,
    /// Worker the caller expects to be pending.
    pub new_worker: Address,
    pub fees: FeeOverrides,
    pub execute: bool,
}

impl<N: NodeApi + ?Sized> Workflow<'_, N> {
    pub async fn set_control_addresses(
        &self,
        key: &KeyMaterial,
        req: SetControlAddresses,
    ) -> Result<ControlSetOutcome, OfflineError> {
        self.check_signer(&req.sender, key).await?;
        let info = self.miner_info(&req.miner).await?;

        let mut current = Vec::with_capacity(info.control_addresses.len());
        for a in &info.control_addresses {
            current.push(self.resolve_key(a).await?);
        }
        let mut desired = Vec::with_capacity(req.desired.len());
        for a in &req.desired {
            let resolved = self.resolve_key(a).await?;
            // Must exist on chain, not just be well-formed.
            self.resolve_id(&resolved).await?;
            desired.push(resolved);
        }

        let diff = reconcile(&desired, &current);
        for a in &diff.to_remove {
            info!(address = %a, "control address removed");
        }
        for a in &diff.to_add {
            info!(address = %a, "control address added");
        }

        let params = encode_params(&ChangeWorkerAddressParams {
            new_worker: info.worker.clone(),
            new_control_addresses: diff.to_set.clone(),
        })?;
        let nonce = self.node.next_nonce(&req.sender).await?;
        let draft = build(
            &req.sender,
            &req.miner,
            MinerMethod::ChangeWorkerAddress.number(),
            TokenAmount::zero(),
            params,
            nonce,
        );
        let message = self.price(draft, None, &req.fees).await?;

        let action = format!(
            "set control addresses of {} to [{}] (+{} -{})",
            req.miner,
            join(&diff.to_set),
            diff.to_add.len(),
            diff.to_remove.len()
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
        Ok(ControlSetOutcome { diff, report })
    }

    pub async fn propose_worker_change(
        &self,
        key: &KeyMaterial,
        req: ProposeWorkerChange,
    ) -> Result<ProposeOutcome, OfflineError> {
        let info = self.miner_info(&req.miner).await?;
        let new_worker = self.resolve_id(&req.new_worker).await?;
        let head = self.node.chain_head().await?;

        RotationState::observe(&info, head.height).check_propose(&new_worker)?;

        self.check_signer(&req.sender, key).await?;
        let warnings: Vec<String> = self.owner_warning(&info, &req.sender).await?.into_iter().collect();

        let params = encode_params(&ChangeWorkerAddressParams {
            new_worker: new_worker.clone(),
            new_control_addresses: info.control_addresses.clone(),
        })?;
        let nonce = self.node.next_nonce(&req.sender).await?;
        let draft = build(
            &req.sender,
            &req.miner,
            MinerMethod::ChangeWorkerAddress.number(),
            TokenAmount::zero(),
            params,
            nonce,
        );
        let message = self.price(draft, None, &req.fees).await?;

        let mut report = self
            .dispatch(
                format!("propose worker change of {} to {new_worker}", req.miner),
                key,
                message,
                Dispatch {
                    execute: req.execute,
                    wait: true,
                    postcondition: Some((&req.miner, Postcondition::PendingWorker(new_worker.clone()))),
                },
                warnings,
            )
            .await?;

        let activation_height = report.state_after.as_ref().map(|s| s.worker_change_epoch);
        if let Some(height) = activation_height {
            info!(worker = %new_worker, activation_height = height, "worker change proposed");
            report.next_steps.push(format!(
                "confirm the worker change to {new_worker} at or after height {height}"
            ));
        }
        Ok(ProposeOutcome {
            new_worker,
            activation_height,
            report,
        })
    }

    pub async fn confirm_worker_change(
        &self,
        key: &KeyMaterial,
        req: ConfirmWorkerChange,
    ) -> Result<Report, OfflineError> {
        let info = self.miner_info(&req.miner).await?;
        let new_worker = self.resolve_id(&req.new_worker).await?;
        let head = self.node.chain_head().await?;

        RotationState::observe(&info, head.height).check_confirm(&new_worker)?;

        self.check_signer(&req.sender, key).await?;
        let warnings: Vec<String> = self.owner_warning(&info, &req.sender).await?.into_iter().collect();

        let nonce = self.node.next_nonce(&req.sender).await?;
        let draft = build(
            &req.sender,
            &req.miner,
            MinerMethod::ConfirmChangeWorkerAddress.number(),
            TokenAmount::zero(),
            Vec::new(),
            nonce,
        );
        let message = self.price(draft, None, &req.fees).await?;

        let report = self
            .dispatch(
                format!("confirm worker change of {} to {new_worker}", req.miner),
                key,
                message,
                Dispatch {
                    execute: req.execute,
                    wait: true,
                    postcondition: Some((&req.miner, Postcondition::Worker(new_worker.clone()))),
                },
                warnings,
            )
            .await?;
        if report.submitted {
            info!(worker = %new_worker, "worker change confirmed");
        }
        Ok(report)
    }
}

fn join(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(Address::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
