//! Two-phase worker key rotation.
//!
//! ```text
//! NoProposal --propose--> Proposed --(head >= activation)--> ConfirmEligible --confirm--> NoProposal
//! ```
//!
//! The state is never stored locally. It is derived from a fresh
//! [`MinerInfo`] and the current head every time a decision is made, so the
//! chain stays the single source of truth. `Confirmed` is simply
//! `NoProposal` with the target as worker; see [`RotationState::is_confirmed`].

use crate::error::OfflineError;
use crate::types::{Address, ChainEpoch, MinerInfo};

/// Rotation state of a miner actor at a given head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RotationState {
    /// No worker change is pending.
    NoProposal { worker: Address },
    /// A change is pending but the activation height is not reached.
    Proposed {
        worker: Address,
        pending: Address,
        activation_height: ChainEpoch,
        current_height: ChainEpoch,
    },
    /// A change is pending and may be confirmed now.
    ConfirmEligible {
        worker: Address,
        pending: Address,
        activation_height: ChainEpoch,
    },
}

impl RotationState {
    /// Derives the state from a miner snapshot and the head height.
    pub fn observe(info: &MinerInfo, head: ChainEpoch) -> Self {
        let worker = info.worker.clone();
        match &info.pending_worker {
            None => RotationState::NoProposal { worker },
            Some(pending) if head < info.worker_change_epoch => RotationState::Proposed {
                worker,
                pending: pending.clone(),
                activation_height: info.worker_change_epoch,
                current_height: head,
            },
            Some(pending) => RotationState::ConfirmEligible {
                worker,
                pending: pending.clone(),
                activation_height: info.worker_change_epoch,
            },
        }
    }

    pub fn worker(&self) -> &Address {
        match self {
            RotationState::NoProposal { worker }
            | RotationState::Proposed { worker, .. }
            | RotationState::ConfirmEligible { worker, .. } => worker,
        }
    }

    pub fn pending(&self) -> Option<&Address> {
        match self {
            RotationState::NoProposal { .. } => None,
            RotationState::Proposed { pending, .. }
            | RotationState::ConfirmEligible { pending, .. } => Some(pending),
        }
    }

    pub fn activation_height(&self) -> Option<ChainEpoch> {
        match self {
            RotationState::NoProposal { .. } => None,
            RotationState::Proposed {
                activation_height, ..
            }
            | RotationState::ConfirmEligible {
                activation_height, ..
            } => Some(*activation_height),
        }
    }

    /// `target` is the worker and nothing is pending.
    pub fn is_confirmed(&self, target: &Address) -> bool {
        matches!(self, RotationState::NoProposal { worker } if worker == target)
    }

    /// Precondition for proposing `target` (ID form).
    ///
    /// A proposal for a different worker may replace a pending one; only
    /// re-proposing the current worker or the pending worker is refused.
    pub fn check_propose(&self, target: &Address) -> Result<(), OfflineError> {
        match self {
            RotationState::NoProposal { worker } if worker == target => {
                Err(OfflineError::NoOpProposal {
                    worker: worker.clone(),
                })
            }
            RotationState::Proposed { pending, .. } | RotationState::ConfirmEligible { pending, .. }
                if pending == target =>
            {
                Err(OfflineError::ProposalAlreadyPending {
                    pending: pending.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Precondition for confirming `target` (ID form).
    pub fn check_confirm(&self, target: &Address) -> Result<(), OfflineError> {
        match self {
            RotationState::NoProposal { .. } => Err(OfflineError::NoPendingProposal),
            RotationState::Proposed { pending, .. } | RotationState::ConfirmEligible { pending, .. }
                if pending != target =>
            {
                Err(OfflineError::ProposalMismatch {
                    requested: target.clone(),
                    pending: pending.clone(),
                })
            }
            RotationState::Proposed {
                activation_height,
                current_height,
                ..
            } => Err(OfflineError::ConfirmTooEarly {
                activation_height: *activation_height,
                current_height: *current_height,
            }),
            RotationState::ConfirmEligible { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenAmount;

    fn info(worker: u64, pending: Option<u64>, epoch: ChainEpoch) -> MinerInfo {
        MinerInfo {
            owner: Address::new_id(1),
            worker: Address::new_id(worker),
            pending_worker: pending.map(Address::new_id),
            worker_change_epoch: epoch,
            pending_owner: None,
            control_addresses: Vec::new(),
            available_balance: TokenAmount::zero(),
        }
    }

    #[test]
    fn observe_follows_the_height_gate() {
        let snapshot = info(10, Some(11), 500);
        assert!(matches!(
            RotationState::observe(&snapshot, 499),
            RotationState::Proposed { .. }
        ));
        assert!(matches!(
            RotationState::observe(&snapshot, 500),
            RotationState::ConfirmEligible { .. }
        ));
        assert_eq!(
            RotationState::observe(&info(10, None, -1), 1),
            RotationState::NoProposal {
                worker: Address::new_id(10)
            }
        );
    }

    #[test]
    fn propose_rejects_noops_and_duplicates() {
        let idle = RotationState::observe(&info(10, None, -1), 100);
        assert!(matches!(
            idle.check_propose(&Address::new_id(10)),
            Err(OfflineError::NoOpProposal { .. })
        ));
        assert!(idle.check_propose(&Address::new_id(11)).is_ok());

        let proposed = RotationState::observe(&info(10, Some(11), 500), 100);
        assert!(matches!(
            proposed.check_propose(&Address::new_id(11)),
            Err(OfflineError::ProposalAlreadyPending { .. })
        ));
        assert!(proposed.check_propose(&Address::new_id(12)).is_ok());
    }

    #[test]
    fn confirm_checks_pending_target_and_height() {
        let idle = RotationState::observe(&info(10, None, -1), 100);
        assert!(matches!(
            idle.check_confirm(&Address::new_id(11)),
            Err(OfflineError::NoPendingProposal)
        ));

        let snapshot = info(10, Some(11), 500);
        let early = RotationState::observe(&snapshot, 499);
        assert!(matches!(
            early.check_confirm(&Address::new_id(12)),
            Err(OfflineError::ProposalMismatch { .. })
        ));
        match early.check_confirm(&Address::new_id(11)) {
            Err(OfflineError::ConfirmTooEarly {
                activation_height,
                current_height,
            }) => {
                assert_eq!(activation_height, 500);
                assert_eq!(current_height, 499);
            }
            other => panic!("expected ConfirmTooEarly, got {other:?}"),
        }

        let ready = RotationState::observe(&snapshot, 500);
        assert!(ready.check_confirm(&Address::new_id(11)).is_ok());
    }

    #[test]
    fn confirmed_means_target_is_worker_with_nothing_pending() {
        assert!(RotationState::observe(&info(11, None, -1), 0).is_confirmed(&Address::new_id(11)));
        assert!(!RotationState::observe(&info(10, Some(11), 5), 9).is_confirmed(&Address::new_id(11)));
    }
}
