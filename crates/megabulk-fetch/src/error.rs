//! Error types for megabulk-fetch.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single HTTP exchange, independent of the client implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("response body error: {0}")]
    Body(String),
}

/// Failure of a provider API call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("provider unreachable: {0}")]
    Network(String),

    #[error("provider rate limit reached")]
    RateLimited,

    #[error("provider answered HTTP {0}")]
    Status(u16),

    #[error("provider error code {0}")]
    Api(i64),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Map a negative provider error code.
    pub fn from_code(code: i64) -> Self {
        match code {
            -4 => ProviderError::RateLimited,
            code => ProviderError::Api(code),
        }
    }
}

impl From<TransportError> for ProviderError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => ProviderError::Timeout,
            TransportError::Connect(msg) | TransportError::Body(msg) => ProviderError::Network(msg),
            TransportError::Status(509) => ProviderError::RateLimited,
            TransportError::Status(code) => ProviderError::Status(code),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid share link: {0}")]
    InvalidLink(String),

    #[error("invalid proxy address: {0}")]
    InvalidProxy(String),

    #[error(transparent)]
    Crypto(#[from] megabulk_crypto::Error),

    #[error(transparent)]
    Fs(#[from] megabulk_fs::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("transfer failed: {0}")]
    Transport(#[from] TransportError),

    #[error("no data received for {0:?}")]
    TransferTimeout(Duration),

    #[error("transfer ended at byte {received} of {expected}")]
    IncompleteTransfer { expected: u64, received: u64 },

    #[error("integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("no usable proxy after {attempts} refill attempts")]
    ProxyExhaustion { attempts: u32 },

    #[error("verification failed to run: {0}")]
    Verifier(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Whether the error leaves a file beyond recovery for this run.
    ///
    /// Network and proxy faults are always retried. Filesystem faults are retried only for the
    /// transient I/O class, and broken key material never heals.
    pub fn is_fatal_for_file(&self) -> bool {
        match self {
            Error::Fs(e) => !e.is_transient(),
            Error::Crypto(megabulk_crypto::Error::Io(_)) => false,
            Error::Crypto(_) | Error::InvalidState(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
