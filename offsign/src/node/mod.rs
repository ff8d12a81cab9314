//! Remote node interface.
//!
//! The pipeline talks to exactly one external collaborator: a full node that
//! resolves addresses, hands out nonces, estimates gas, accepts signed
//! messages into its pool and reports chain progress. [`NodeApi`] is that
//! seam. Two implementations ship with the crate:
//!
//! - [`lotus::LotusRpcClient`], a JSON-RPC client for a real node,
//! - [`memory::InMemoryNode`], an in-process fake with just enough miner-actor
//!   semantics for tests and rehearsals.
//!
//! Implementations never retry. Every failure goes back to the caller, who
//! decides whether re-querying is safe.

use std::fmt;

use async_trait::async_trait;
use cid::Cid;

use crate::fees::FeeParameters;
use crate::types::{
    Address, ChainEpoch, MessageId, MinerInfo, SignedMessage, TokenAmount, UnsignedMessage,
};

pub mod lotus;
pub mod memory;

pub use lotus::LotusRpcClient;
pub use memory::{InMemoryNode, MemoryNodeConfig};

/// Identifies a tipset by the CIDs of its blocks. The empty key means
/// "the current head".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TipSetKey(pub Vec<Cid>);

impl TipSetKey {
    pub fn head() -> Self {
        Self::default()
    }

    pub fn is_head(&self) -> bool {
        self.0.is_empty()
    }
}

/// Current heaviest tipset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainHead {
    pub key: TipSetKey,
    pub height: ChainEpoch,
}

/// Where and how a message executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageLookup {
    /// Message that actually executed. Differs from the searched id if the
    /// pool replaced it.
    pub message: MessageId,
    pub exit_code: i64,
    /// Tipset the receipt belongs to.
    pub tipset: TipSetKey,
    pub height: ChainEpoch,
}

impl MessageLookup {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors returned by node implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The queried address, actor or message does not exist.
    NotFound(String),
    /// The pool refused a signed message.
    Rejected(String),
    /// Connection, timeout or HTTP-level failure.
    Transport(String),
    /// The node answered something this client cannot interpret.
    Protocol(String),
    /// Any other error reported by the node itself.
    Rpc { code: i64, message: String },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::NotFound(msg) => write!(f, "not found: {msg}"),
            NodeError::Rejected(msg) => write!(f, "rejected by pool: {msg}"),
            NodeError::Transport(msg) => write!(f, "node transport error: {msg}"),
            NodeError::Protocol(msg) => write!(f, "node protocol error: {msg}"),
            NodeError::Rpc { code, message } => write!(f, "node error {code}: {message}"),
        }
    }
}

impl std::error::Error for NodeError {}

/// Operations the pipeline needs from a full node.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Resolves any address form to its account-key (`f1`/`f3`) form.
    async fn resolve_account_key(&self, address: &Address) -> Result<Address, NodeError>;

    /// Resolves any address form to its ID (`f0`) form.
    async fn lookup_id(&self, address: &Address) -> Result<Address, NodeError>;

    /// Miner actor snapshot, at `tipset` or at the head when `None`.
    async fn miner_info(
        &self,
        miner: &Address,
        tipset: Option<&TipSetKey>,
    ) -> Result<MinerInfo, NodeError>;

    /// Next nonce the pool expects from `address`, counting pending messages.
    async fn next_nonce(&self, address: &Address) -> Result<u64, NodeError>;

    /// Gas estimate for `message`. `max_fee` bounds the total spend the
    /// estimator may plan for.
    async fn estimate_gas(
        &self,
        message: &UnsignedMessage,
        max_fee: Option<&TokenAmount>,
    ) -> Result<FeeParameters, NodeError>;

    /// Messages waiting in the pool relative to `tipset`.
    async fn pending_messages(&self, tipset: &TipSetKey) -> Result<Vec<SignedMessage>, NodeError>;

    /// Fetches a message by id, pending or included.
    async fn get_message(&self, id: &MessageId) -> Result<UnsignedMessage, NodeError>;

    /// Pushes a signed message into the pool. Refusals are
    /// [`NodeError::Rejected`].
    async fn push(&self, message: &SignedMessage) -> Result<MessageId, NodeError>;

    /// Looks up the receipt of a message, following replacements. `None`
    /// while it is still pending.
    async fn search_message(&self, id: &MessageId) -> Result<Option<MessageLookup>, NodeError>;

    async fn chain_head(&self) -> Result<ChainHead, NodeError>;

    /// Node software version string.
    async fn version(&self) -> Result<String, NodeError>;
}
