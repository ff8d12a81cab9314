//! Offline message authoring for Filecoin storage providers.
//!
//! This crate builds, prices, signs and submits the privileged messages a
//! storage provider sends to its miner actor, without ever handing keys to
//! the node:
//!
//! - strongly-typed addresses, amounts and messages (`types`),
//! - the gas fee policy with replace-by-fee bumps (`fees`),
//! - control-address reconciliation (`reconcile`),
//! - unsigned message construction (`builder`),
//! - secp256k1 and BLS offline signing (`signer`),
//! - the full-node interface and its implementations (`node`),
//! - push, inclusion wait and postcondition checks (`submit`),
//! - the two-phase worker rotation state machine (`rotation`),
//! - the end-to-end command workflows (`workflows`),
//! - and a top-level configuration (`config`).
//!
//! Binaries compose these into operator tooling; see the `offsign-cli`
//! crate.

pub mod builder;
pub mod config;
pub mod error;
pub mod fees;
pub mod node;
pub mod reconcile;
pub mod rotation;
pub mod signer;
pub mod submit;
pub mod types;
pub mod workflows;

// Re-export top-level configuration types.
pub use config::{FeePolicyConfig, InclusionConfig, OfflineConfig, RpcConfig};

pub use error::OfflineError;
pub use fees::{FeeError, FeeOverrides, FeeParameters, FeePolicy};
pub use reconcile::{ControlDiff, reconcile};
pub use rotation::RotationState;
pub use signer::{KeyMaterial, SignerError};
pub use submit::{Postcondition, Submitter};

// Re-export the node seam and its implementations.
pub use node::{
    ChainHead, InMemoryNode, LotusRpcClient, MemoryNodeConfig, MessageLookup, NodeApi, NodeError,
    TipSetKey,
};

pub use workflows::{Report, Workflow};

// Re-export domain types at the crate root for convenience.
pub use types::*;
