//! Command workflows.
//!
//! Each workflow is a fixed pipeline:
//!
//! 1. resolve addresses and check the key controls the sender,
//! 2. fetch actor state and check protocol preconditions,
//! 3. build params and the unsigned message with a fresh (or reused) nonce,
//! 4. estimate gas and apply the fee policy,
//! 5. sign,
//! 6. push, wait and verify, unless this is a dry run.
//!
//! Dry run is the default (`execute == false`). It performs steps 1 to 5 so
//! the report shows the exact signed message and its id, and never pushes.
//!
//! Workflows borrow the node and an immutable [`OfflineConfig`]; they hold no
//! other state, so running one twice against the same chain state yields the
//! same message.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::OfflineConfig;
use crate::error::OfflineError;
use crate::fees::{FeeOverrides, FeePolicy};
use crate::node::{MessageLookup, NodeApi, NodeError};
use crate::signer::KeyMaterial;
use crate::submit::{Postcondition, Submitter};
use crate::types::{Address, MessageId, MinerInfo, SignedMessage, TokenAmount, UnsignedMessage};

pub mod control;
pub mod owner;
pub mod replace;
pub mod send;
pub mod withdraw;

pub use control::{ConfirmWorkerChange, ControlSetOutcome, ProposeOutcome, ProposeWorkerChange, SetControlAddresses};
pub use owner::{OwnerStep, SetOwner};
pub use replace::{ReplaceOutcome, ReplacePending, ReplaceTarget};
pub use send::SendFunds;
pub use withdraw::WithdrawBalance;

/// What a workflow did, or would have done.
#[derive(Clone, Debug)]
pub struct Report {
    /// One-line description of the intended effect.
    pub action: String,
    /// The signed message, pushed or not.
    pub message: SignedMessage,
    /// Id returned by the pool, or the locally computed id on a dry run.
    pub message_id: MessageId,
    pub submitted: bool,
    /// Receipt, when the workflow waited for inclusion.
    pub receipt: Option<MessageLookup>,
    /// Actor state read back for the postcondition check.
    pub state_after: Option<MinerInfo>,
    /// Non-fatal findings, e.g. a sender that is not the recorded owner.
    pub warnings: Vec<String>,
    /// What the operator should do next.
    pub next_steps: Vec<String>,
}

impl Report {
    pub fn is_dry_run(&self) -> bool {
        !self.submitted
    }
}

/// How far a pushed message is followed.
pub(crate) struct Dispatch<'m> {
    pub execute: bool,
    pub wait: bool,
    pub postcondition: Option<(&'m Address, Postcondition)>,
}

/// Entry point for every workflow.
pub struct Workflow<'a, N: NodeApi + ?Sized> {
    node: &'a N,
    config: &'a OfflineConfig,
    cancel: CancellationToken,
}

impl<'a, N: NodeApi + ?Sized> Workflow<'a, N> {
    pub fn new(node: &'a N, config: &'a OfflineConfig, cancel: CancellationToken) -> Self {
        Self {
            node,
            config,
            cancel,
        }
    }

    fn fee_policy(&self) -> FeePolicy {
        FeePolicy::new(self.config.fees.clone())
    }

    fn submitter(&self) -> Submitter<'a, N> {
        Submitter::new(self.node, self.config.inclusion.clone(), self.cancel.clone())
    }

    /// Resolves `address` to account-key form.
    pub(crate) async fn resolve_key(&self, address: &Address) -> Result<Address, OfflineError> {
        self.node
            .resolve_account_key(address)
            .await
            .map_err(unresolvable(address))
    }

    /// Resolves `address` to ID form, proving it exists on chain.
    pub(crate) async fn resolve_id(&self, address: &Address) -> Result<Address, OfflineError> {
        self.node.lookup_id(address).await.map_err(unresolvable(address))
    }

    pub(crate) async fn miner_info(&self, miner: &Address) -> Result<MinerInfo, OfflineError> {
        self.node
            .miner_info(miner, None)
            .await
            .map_err(unresolvable(miner))
    }

    /// Requires `key` to control `sender`.
    pub(crate) async fn check_signer(
        &self,
        sender: &Address,
        key: &KeyMaterial,
    ) -> Result<(), OfflineError> {
        let expected = self.resolve_key(sender).await?;
        let actual = key.address();
        if expected != actual {
            return Err(OfflineError::SignerMismatch { expected, actual });
        }
        Ok(())
    }

    /// Warns when `sender` is not the miner's recorded owner. The node's
    /// view may lag, so this never aborts.
    pub(crate) async fn owner_warning(
        &self,
        info: &MinerInfo,
        sender: &Address,
    ) -> Result<Option<String>, OfflineError> {
        let sender_id = self.resolve_id(sender).await?;
        if sender_id == info.owner {
            return Ok(None);
        }
        warn!(owner = %info.owner, sender = %sender_id, "sender is not the miner owner");
        Ok(Some(format!(
            "sender {sender_id} is not the recorded owner {}",
            info.owner
        )))
    }

    /// Estimates gas for `draft` and applies the fee policy.
    ///
    /// A non-zero gas limit already on `draft` is kept, as the node does.
    pub(crate) async fn price(
        &self,
        mut draft: UnsignedMessage,
        previous_premium: Option<&TokenAmount>,
        overrides: &FeeOverrides,
    ) -> Result<UnsignedMessage, OfflineError> {
        let policy = self.fee_policy();
        let max_fee = overrides
            .max_fee
            .as_deref()
            .map(|raw| policy.max_fee(Some(raw)))
            .transpose()?;

        let mut estimate = self.node.estimate_gas(&draft, max_fee.as_ref()).await?;
        if draft.gas_limit > 0 {
            estimate.gas_limit = draft.gas_limit;
        }
        let fees = policy.compute_fees(&estimate, previous_premium, overrides)?;
        fees.apply_to(&mut draft);
        Ok(draft)
    }

    /// Signs `message` and, when executing, pushes and follows it.
    pub(crate) async fn dispatch(
        &self,
        action: String,
        key: &KeyMaterial,
        message: UnsignedMessage,
        how: Dispatch<'_>,
        warnings: Vec<String>,
    ) -> Result<Report, OfflineError> {
        let signed = key.sign_message(message)?;
        let mut report = Report {
            action,
            message_id: signed.id(),
            message: signed,
            submitted: false,
            receipt: None,
            state_after: None,
            warnings,
            next_steps: Vec::new(),
        };

        if !how.execute {
            info!(message = %report.message_id, action = %report.action, "dry run, not pushing");
            return Ok(report);
        }

        let submitter = self.submitter();
        report.message_id = submitter.submit(&report.message).await?;
        report.submitted = true;

        if !how.wait && how.postcondition.is_none() {
            return Ok(report);
        }
        let lookup = submitter.await_inclusion(&report.message_id).await?;
        if let Some((miner, expected)) = &how.postcondition {
            report.state_after = Some(
                submitter
                    .verify_postcondition(miner, &lookup, expected)
                    .await?,
            );
        }
        report.receipt = Some(lookup);
        Ok(report)
    }
}

/// Maps a node `NotFound` on `address` to `UnresolvableAddress`.
fn unresolvable(address: &Address) -> impl FnOnce(NodeError) -> OfflineError + '_ {
    move |e| match e {
        NodeError::NotFound(reason) => OfflineError::UnresolvableAddress {
            address: address.clone(),
            reason,
        },
        other => other.into(),
    }
}
