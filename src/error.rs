//! Error types
//!
//! Typed failures for each boundary of the aggregation engine. Only
//! `UnauthorizedRefreshError` ever reaches an HTTP caller; everything else is
//! recovered close to where it happens.

use std::time::Duration;
use thiserror::Error;

/// JSON-RPC error code geth and most EVM nodes use for reverted calls.
const EXECUTION_REVERTED: i64 = 3;

/// A single contract read, log query or height lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainCallError {
    /// The request never produced a JSON-RPC response (connection, HTTP status, body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint did not answer within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The endpoint answered with a JSON-RPC error object (reverts land here).
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The endpoint answered, but the payload could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ChainCallError {
    /// Whether the contract executed the call and reverted.
    ///
    /// Only execution reverts count. Other JSON-RPC errors (rate limits,
    /// rejected batches, unknown methods) say nothing about contract state.
    pub fn is_rejection(&self) -> bool {
        match self {
            ChainCallError::Rpc { code, message } => {
                *code == EXECUTION_REVERTED || message.to_ascii_lowercase().contains("revert")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ChainCallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChainCallError::Timeout
        } else if e.is_decode() {
            ChainCallError::Malformed(e.to_string())
        } else {
            ChainCallError::Transport(e.to_string())
        }
    }
}

/// The cache backend could not be reached or answered with an error.
#[derive(Debug, Error)]
#[error("cache backend unavailable: {0}")]
pub struct CacheUnavailableError(pub String);

impl From<reqwest::Error> for CacheUnavailableError {
    fn from(e: reqwest::Error) -> Self {
        CacheUnavailableError(e.to_string())
    }
}

/// A forced refresh was requested without the admin secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("forced refresh requires a valid admin secret")]
pub struct UnauthorizedRefreshError;

/// A reconstruction pass produced no usable data.
#[derive(Debug, Error)]
pub enum ReconstructionFailure {
    #[error("chain height unavailable: {0}")]
    ChainUnavailable(ChainCallError),

    #[error("staker index unreadable: {0}")]
    IndexUnavailable(ChainCallError),

    #[error("every stake read failed: {0}")]
    StakesUnavailable(ChainCallError),

    #[error("both stake event streams failed")]
    LogsUnavailable,

    #[error("reconstruction exceeded {0:?}")]
    TimedOut(Duration),

    #[error("every strategy failed; last error: {0}")]
    Exhausted(Box<ReconstructionFailure>),
}
