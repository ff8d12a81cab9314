//! Configuration for an offline signing session.
//!
//! This module aggregates configuration for:
//!
//! - the node connection (`RpcConfig`),
//! - fee policy knobs (`FeePolicyConfig`),
//! - inclusion waiting (`InclusionConfig`).
//!
//! Every workflow receives an `OfflineConfig` by reference. Nothing in the
//! library reads environment variables or other ambient state; the binary is
//! responsible for building this struct from flags and the environment.

use std::time::Duration;

use crate::types::TokenAmount;

/// Connection settings for the node's JSON-RPC endpoint.
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// Full JSON-RPC URL, e.g. `"http://127.0.0.1:1234/rpc/v1"`.
    pub endpoint: String,
    /// Optional bearer token sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:1234/rpc/v1".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Fee policy parameters.
#[derive(Clone, Debug)]
pub struct FeePolicyConfig {
    /// Replace-by-fee ratio numerator. A replacement premium must be at least
    /// `prev * num / den + 1`.
    pub rbf_numerator: u64,
    /// Replace-by-fee ratio denominator. Must be non-zero.
    pub rbf_denominator: u64,
    /// Total gas spend ceiling used when the caller gives none.
    pub default_max_fee: TokenAmount,
    /// Upper bound accepted for a caller-supplied fee cap, in attoFIL.
    pub max_gas_fee_cap: TokenAmount,
}

impl Default for FeePolicyConfig {
    fn default() -> Self {
        Self {
            rbf_numerator: 320,
            rbf_denominator: 256,
            // 0.07 FIL
            default_max_fee: TokenAmount::from(70_000_000_000_000_000u64),
            // 100 nanoFIL
            max_gas_fee_cap: TokenAmount::from_nano(100),
        }
    }
}

/// How long and how deep to wait for a submitted message.
#[derive(Clone, Debug)]
pub struct InclusionConfig {
    /// Number of epochs that must be built on top of the inclusion tipset.
    pub confidence: u64,
    /// Delay between two polls of the node.
    pub poll_interval: Duration,
    /// Overall bound on a single wait.
    pub deadline: Duration,
}

impl Default for InclusionConfig {
    fn default() -> Self {
        Self {
            confidence: 5,
            poll_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(30 * 60),
        }
    }
}

/// Top-level configuration handed to every workflow.
#[derive(Clone, Debug, Default)]
pub struct OfflineConfig {
    pub rpc: RpcConfig,
    pub fees: FeePolicyConfig,
    pub inclusion: InclusionConfig,
}
