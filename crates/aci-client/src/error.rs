//! ACI client errors

use thiserror::Error;

/// Errors that can occur when talking to an APIC or handling its data
#[derive(Debug, Error)]
pub enum AciError {
    /// The connectivity probe made while opening a session failed
    #[error("Unable to connect to {0}")]
    UnreachableHost(String),

    /// Malformed IPv4 literal or out-of-range octet
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Out-of-range prefix length or non-contiguous dotted mask
    #[error("Invalid mask: {0}")]
    InvalidMask(String),

    /// A subnet computation was requested on an address without a mask
    #[error("Address {0} has no mask")]
    MissingMask(String),

    /// Hostname resolution failed while building an address
    #[error("Unable to resolve hostname {0}")]
    UnresolvedHost(String),

    /// Login rejected (401) or no credentials available
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// 403 on an authenticated call that could not be recovered
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// APIC answered with an error status
    #[error("HTTP error {status}: {body}")]
    HttpError {
        /// Response status code
        status: u16,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// A query option outside its enumerated domain
    #[error("Invalid query option: {0}")]
    InvalidQueryOption(String),

    /// Response body that does not match the expected shape
    #[error("Parse error at offset {position}: {reason}")]
    Parse {
        /// Byte offset into the input where parsing stopped
        position: usize,
        /// What was expected
        reason: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O error (saved queries, payload files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Object does not exist on the controller
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., unknown attribute, bad index, bad configuration value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AciError {
    /// Build a [`AciError::Parse`] error
    pub(crate) fn parse(position: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            position,
            reason: reason.into(),
        }
    }
}
