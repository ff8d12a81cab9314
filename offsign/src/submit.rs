//! Submission and confirmation.
//!
//! [`Submitter`] pushes signed messages, waits for them to reach the
//! configured confirmation depth and checks actor state afterwards. Waiting
//! is a polling loop bounded by a deadline and by the caller's
//! [`CancellationToken`]; neither bound ever hides the fact that a message
//! already left the process.

use std::fmt;

use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::InclusionConfig;
use crate::error::OfflineError;
use crate::node::{MessageLookup, NodeApi, NodeError};
use crate::types::{Address, ChainEpoch, MessageId, MinerInfo, SignedMessage};

/// Actor state a successful message is expected to leave behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Postcondition {
    PendingWorker(Address),
    Worker(Address),
    PendingOwner(Address),
    Owner(Address),
}

impl Postcondition {
    /// Whether `info` satisfies this condition.
    pub fn holds(&self, info: &MinerInfo) -> bool {
        match self {
            Postcondition::PendingWorker(a) => info.pending_worker.as_ref() == Some(a),
            Postcondition::Worker(a) => info.worker == *a,
            Postcondition::PendingOwner(a) => info.pending_owner.as_ref() == Some(a),
            Postcondition::Owner(a) => info.owner == *a,
        }
    }

    fn found(&self, info: &MinerInfo) -> String {
        let show = |a: Option<&Address>| a.map_or_else(|| "<empty>".to_string(), Address::to_string);
        match self {
            Postcondition::PendingWorker(_) => format!("pending worker {}", show(info.pending_worker.as_ref())),
            Postcondition::Worker(_) => format!("worker {}", info.worker),
            Postcondition::PendingOwner(_) => format!("pending owner {}", show(info.pending_owner.as_ref())),
            Postcondition::Owner(_) => format!("owner {}", info.owner),
        }
    }
}

impl fmt::Display for Postcondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Postcondition::PendingWorker(a) => write!(f, "pending worker {a}"),
            Postcondition::Worker(a) => write!(f, "worker {a}"),
            Postcondition::PendingOwner(a) => write!(f, "pending owner {a}"),
            Postcondition::Owner(a) => write!(f, "owner {a}"),
        }
    }
}

/// Pushes messages and follows them onto the chain.
pub struct Submitter<'a, N: NodeApi + ?Sized> {
    node: &'a N,
    config: InclusionConfig,
    cancel: CancellationToken,
}

impl<'a, N: NodeApi + ?Sized> Submitter<'a, N> {
    pub fn new(node: &'a N, config: InclusionConfig, cancel: CancellationToken) -> Self {
        Self {
            node,
            config,
            cancel,
        }
    }

    /// Pushes `message` once. Refusals come back as
    /// [`OfflineError::RejectedByPool`] and are never retried.
    pub async fn submit(&self, message: &SignedMessage) -> Result<MessageId, OfflineError> {
        if self.cancel.is_cancelled() {
            return Err(OfflineError::Cancelled { message: None });
        }
        let expected = message.id();
        let id = tokio::select! {
            // The push may or may not have reached the node.
            _ = self.cancel.cancelled() => {
                return Err(OfflineError::Cancelled { message: Some(expected) });
            }
            res = self.node.push(message) => res?,
        };
        info!(
            message = %id,
            from = %message.message.from,
            nonce = message.message.nonce,
            method = message.message.method,
            "message pushed"
        );
        Ok(id)
    }

    /// Waits until `id` is included and buried under `confidence` epochs.
    ///
    /// A receipt with a non-zero exit code is an
    /// [`OfflineError::OnChainExecutionFailure`].
    pub async fn await_inclusion(&self, id: &MessageId) -> Result<MessageLookup, OfflineError> {
        let started = Instant::now();
        let confidence = ChainEpoch::try_from(self.config.confidence).unwrap_or(ChainEpoch::MAX);

        let after_submit = |source: NodeError| OfflineError::AfterSubmit {
            message: *id,
            source,
        };
        let poll = async {
            loop {
                if let Some(lookup) = self.node.search_message(id).await.map_err(after_submit)? {
                    let head = self.node.chain_head().await.map_err(after_submit)?;
                    if head.height >= lookup.height.saturating_add(confidence) {
                        return Ok::<_, OfflineError>(lookup);
                    }
                    debug!(message = %id, included_at = lookup.height, head = head.height, "waiting for confidence");
                } else {
                    debug!(message = %id, "not yet included");
                }
                sleep(self.config.poll_interval).await;
            }
        };

        let lookup = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(OfflineError::Cancelled { message: Some(*id) });
            }
            res = timeout(self.config.deadline, poll) => match res {
                Ok(found) => found?,
                Err(_) => {
                    return Err(OfflineError::Timeout {
                        message: *id,
                        waited: started.elapsed(),
                    });
                }
            },
        };

        if !lookup.succeeded() {
            return Err(OfflineError::OnChainExecutionFailure {
                message: lookup.message,
                exit_code: lookup.exit_code,
            });
        }
        info!(message = %lookup.message, height = lookup.height, "message confirmed");
        Ok(lookup)
    }

    /// Pushes `message` and waits for a successful receipt.
    pub async fn submit_and_wait(
        &self,
        message: &SignedMessage,
    ) -> Result<(MessageId, MessageLookup), OfflineError> {
        let id = self.submit(message).await?;
        let lookup = self.await_inclusion(&id).await?;
        Ok((id, lookup))
    }

    /// Re-reads `miner` at the tipset that carries `lookup`'s receipt and
    /// checks `expected` against it.
    pub async fn verify_postcondition(
        &self,
        miner: &Address,
        lookup: &MessageLookup,
        expected: &Postcondition,
    ) -> Result<MinerInfo, OfflineError> {
        let info = self
            .node
            .miner_info(miner, Some(&lookup.tipset))
            .await
            .map_err(|source| OfflineError::AfterSubmit {
                message: lookup.message,
                source,
            })?;
        if expected.holds(&info) {
            Ok(info)
        } else {
            Err(OfflineError::PostconditionMismatch {
                message: lookup.message,
                expected: expected.to_string(),
                found: expected.found(&info),
            })
        }
    }
}
