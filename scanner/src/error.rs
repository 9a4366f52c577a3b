//! Error taxonomy for the scanner
//!
//! Transient network failures and protocol errors are `RpcError`s; the
//! executor retries and fails over on them. Only `ScanError` reaches the
//! orchestrator, where it decides whether a cycle is fatal.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors surfaced by a scan cycle or one of its components
#[derive(Debug, Error)]
pub enum ScanError {
    /// Every provider exhausted its retries for a required call
    #[error("all RPC providers failed for {operation}: {last_error}")]
    Exhausted {
        operation: String,
        last_error: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("state store: {0}")]
    Store(#[from] StoreError),
}

/// A single failed RPC attempt against one provider
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Http(String),

    #[error("RPC call failed: HTTP {0}")]
    Status(u16),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("RPC response has no result")]
    MissingResult,

    #[error("unexpected result shape: {0}")]
    Decode(#[from] DecodeError),
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => RpcError::Status(status.as_u16()),
            None => RpcError::Http(err.to_string()),
        }
    }
}

/// Malformed log entry or hex quantity
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid hex in {field}: {reason}")]
    Hex { field: &'static str, reason: String },

    #[error("log entry has {0} topics, expected at least 3")]
    MissingTopics(usize),

    #[error("ABI data truncated: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("ABI word {0} does not fit in usize")]
    WordOverflow(&'static str),

    #[error("empty ephemeral public key")]
    EmptyEphemeralKey,

    #[error("invalid JSON: {0}")]
    Json(String),
}

/// Failures reported by a `StateStore` backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

/// Per-announcement failures inside the matcher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("ephemeral key is not a valid curve point")]
    InvalidEphemeralKey,

    #[error("spend key does not produce a usable public key")]
    InvalidSpendKey,

    #[error("invalid meta-address: {0}")]
    InvalidMetaAddress(&'static str),

    #[error("balance lookup failed: {0}")]
    Balance(String),
}
