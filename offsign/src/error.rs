use std::fmt;
use std::time::Duration;

use crate::fees::FeeError;
use crate::node::NodeError;
use crate::signer::SignerError;
use crate::types::{Address, ChainEpoch, MessageId, ParseError};

/// Errors surfaced at the workflow boundary.
///
/// Variants before [`OfflineError::RejectedByPool`] are raised before
/// anything is pushed; the rest can only happen once a message has left the
/// process, so dry runs never produce them.
#[derive(Debug)]
pub enum OfflineError {
    /// Malformed address, amount or argument.
    InputValidation(String),
    /// An address could not be looked up on chain.
    UnresolvableAddress { address: Address, reason: String },
    /// Proposed worker is already the current worker.
    NoOpProposal { worker: Address },
    /// The same worker change is already pending.
    ProposalAlreadyPending { pending: Address },
    /// A different worker change is pending than the one being confirmed.
    ProposalMismatch { requested: Address, pending: Address },
    NoPendingProposal,
    /// Confirmation attempted before the activation height.
    ConfirmTooEarly {
        activation_height: ChainEpoch,
        current_height: ChainEpoch,
    },
    InvalidFeeParameters(FeeError),
    MalformedKeyMaterial(String),
    UnsupportedKeyType(String),
    /// Any other signer failure.
    Signer(SignerError),
    /// The supplied key does not control the sending account.
    SignerMismatch { expected: Address, actual: Address },
    /// Nothing in the pool matches the message to replace.
    PendingMessageNotFound { from: Address, nonce: u64 },
    /// The node refused the signed message.
    RejectedByPool(String),
    /// Message landed but its receipt carries a non-zero exit code.
    OnChainExecutionFailure { message: MessageId, exit_code: i64 },
    /// Actor state after inclusion differs from what the message should have
    /// produced.
    PostconditionMismatch {
        message: MessageId,
        expected: String,
        found: String,
    },
    /// Inclusion not observed before the deadline. The message may still land.
    Timeout { message: MessageId, waited: Duration },
    /// Caller cancelled. `message` is set if something was already pushed.
    Cancelled { message: Option<MessageId> },
    /// The node failed while following a message that was already pushed.
    AfterSubmit { message: MessageId, source: NodeError },
    /// Transport or protocol failure talking to the node.
    Node(NodeError),
}

impl OfflineError {
    /// Message already pushed when this error happened, if any.
    pub fn submitted_message(&self) -> Option<&MessageId> {
        match self {
            OfflineError::OnChainExecutionFailure { message, .. }
            | OfflineError::PostconditionMismatch { message, .. }
            | OfflineError::Timeout { message, .. }
            | OfflineError::AfterSubmit { message, .. } => Some(message),
            OfflineError::Cancelled { message } => message.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for OfflineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfflineError::InputValidation(msg) => write!(f, "invalid input: {msg}"),
            OfflineError::UnresolvableAddress { address, reason } => {
                write!(f, "cannot resolve {address} on chain: {reason}")
            }
            OfflineError::NoOpProposal { worker } => {
                write!(f, "worker address already set to {worker}")
            }
            OfflineError::ProposalAlreadyPending { pending } => {
                write!(f, "change to worker address {pending} already pending")
            }
            OfflineError::ProposalMismatch { requested, pending } => write!(
                f,
                "worker key {requested} does not match current worker key proposal {pending}"
            ),
            OfflineError::NoPendingProposal => write!(f, "no worker key change proposed"),
            OfflineError::ConfirmTooEarly {
                activation_height,
                current_height,
            } => write!(
                f,
                "worker key change cannot be confirmed until {activation_height}, current height is {current_height}"
            ),
            OfflineError::InvalidFeeParameters(e) => write!(f, "invalid fee parameters: {e}"),
            OfflineError::MalformedKeyMaterial(msg) => write!(f, "malformed key material: {msg}"),
            OfflineError::UnsupportedKeyType(tag) => write!(f, "unsupported key type {tag:?}"),
            OfflineError::Signer(e) => write!(f, "{e}"),
            OfflineError::SignerMismatch { expected, actual } => write!(
                f,
                "key controls {actual} but the sender resolves to {expected}"
            ),
            OfflineError::PendingMessageNotFound { from, nonce } => {
                write!(f, "no pending message found from {from} with nonce {nonce}")
            }
            OfflineError::RejectedByPool(msg) => write!(f, "mpool push: {msg}"),
            OfflineError::OnChainExecutionFailure { message, exit_code } => {
                write!(f, "message {message} failed on chain with exit code {exit_code}")
            }
            OfflineError::PostconditionMismatch {
                message,
                expected,
                found,
            } => write!(
                f,
                "change from message {message} not reflected on chain: expected {expected}, found {found}"
            ),
            OfflineError::Timeout { message, waited } => write!(
                f,
                "message {message} not confirmed after {}s; check it before resubmitting",
                waited.as_secs()
            ),
            OfflineError::Cancelled { message: Some(m) } => {
                write!(f, "cancelled after submitting {m}; its fate is unknown")
            }
            OfflineError::Cancelled { message: None } => write!(f, "cancelled before submission"),
            OfflineError::AfterSubmit { message, source } => {
                write!(f, "lost track of submitted message {message}: {source}")
            }
            OfflineError::Node(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OfflineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OfflineError::InvalidFeeParameters(e) => Some(e),
            OfflineError::Signer(e) => Some(e),
            OfflineError::Node(e) | OfflineError::AfterSubmit { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for OfflineError {
    fn from(e: ParseError) -> Self {
        OfflineError::InputValidation(e.to_string())
    }
}

impl From<FeeError> for OfflineError {
    fn from(e: FeeError) -> Self {
        OfflineError::InvalidFeeParameters(e)
    }
}

impl From<SignerError> for OfflineError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::MalformedKeyMaterial(msg) => OfflineError::MalformedKeyMaterial(msg),
            SignerError::UnsupportedKeyType(tag) => OfflineError::UnsupportedKeyType(tag),
            other => OfflineError::Signer(other),
        }
    }
}

impl From<NodeError> for OfflineError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Rejected(msg) => OfflineError::RejectedByPool(msg),
            other => OfflineError::Node(other),
        }
    }
}
