//! Control-address reconciliation.
//!
//! Inputs must already be resolved to account-key form by the caller; two
//! spellings of the same account would otherwise show up as both an addition
//! and a removal.

use std::collections::HashSet;

use crate::types::Address;

/// Result of diffing a desired control-address list against the actor's.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlDiff {
    /// Desired addresses not currently registered, in desired order.
    pub to_add: Vec<Address>,
    /// Registered addresses not desired, in on-chain order.
    pub to_remove: Vec<Address>,
    /// Full list to send: the desired list with duplicates dropped.
    pub to_set: Vec<Address>,
}

impl ControlDiff {
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Computes additions and removals turning `current` into `desired`.
pub fn reconcile(desired: &[Address], current: &[Address]) -> ControlDiff {
    let mut seen = HashSet::new();
    let to_set: Vec<Address> = desired
        .iter()
        .filter(|a| seen.insert(*a))
        .cloned()
        .collect();

    let current_set: HashSet<&Address> = current.iter().collect();
    let desired_set: HashSet<&Address> = to_set.iter().collect();

    let to_add = to_set
        .iter()
        .filter(|a| !current_set.contains(a))
        .cloned()
        .collect();

    let mut removed = HashSet::new();
    let to_remove = current
        .iter()
        .filter(|a| !desired_set.contains(a) && removed.insert(*a))
        .cloned()
        .collect();

    ControlDiff {
        to_add,
        to_remove,
        to_set,
    }
}
