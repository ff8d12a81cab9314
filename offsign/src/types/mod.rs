//! Core domain types shared across the pipeline.
//!
//! This module defines Filecoin addresses, token amounts, unsigned and
//! signed messages with their content identifiers, and the storage-provider
//! (miner) actor's method numbers, parameters and info snapshot. Public APIs
//! use these newtypes instead of naked strings or byte buffers.

use std::fmt;

pub mod address;
pub mod message;
pub mod miner;
pub mod token;

pub use address::{Address, Network, Payload};
pub use message::{MessageId, SigType, Signature, SignedMessage, UnsignedMessage};
pub use miner::{
    ChangeOwnerParams, ChangeWorkerAddressParams, MinerInfo, MinerMethod, WithdrawBalanceParams,
};
pub use token::TokenAmount;

/// Chain height, in epochs. Negative values mean "unset" on the wire.
pub type ChainEpoch = i64;

/// Actor method selector.
pub type MethodNum = u64;

/// Errors raised while parsing or decoding user- or node-supplied values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Malformed address string or bytes.
    Address(String),
    /// Malformed token amount.
    Amount(String),
    /// Malformed content identifier.
    Cid(String),
    /// CBOR encoding or decoding failure.
    Encoding(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Address(msg) => write!(f, "address: {msg}"),
            ParseError::Amount(msg) => write!(f, "amount: {msg}"),
            ParseError::Cid(msg) => write!(f, "cid: {msg}"),
            ParseError::Encoding(msg) => write!(f, "encoding: {msg}"),
        }
    }
}

impl std::error::Error for ParseError {}
