//! Resumable bulk downloads of end-to-end encrypted folder shares, fanned out over proxies.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and types
//! - [`core`] - Pure transformations
//! - [`effects`] - I/O operations with trait abstraction
//!
//! # Key Features
//!
//! - **Resumable**: the partial file's length on disk is the resume point, and content is
//!   decrypted at that offset, so an interrupted run picks up where it stopped
//! - **Crash-Recoverable**: markers next to each file record whether it awaits verification
//!   or is finished
//! - **Proxy-Fanned**: a tiered pool spreads provider calls and transfers over many proxies,
//!   cooling down and quarantining the ones that fail
//! - **Verified**: every file is authenticated against the tag carried in its key before it
//!   counts as downloaded

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use data::{
    DEFAULT_API_URL, FailedFile, Item, ItemKind, PoolCounts, ProxyAddress, ProxyScheme, RunOptions, RunReport,
    RunSnapshot, ShareCredential, TaskStatus, Tier, TransferStats, VerifyMode,
};
pub use effects::{
    ByteStream, Connector, FileTask, HttpClient, ProxyList, ProxyPool, ProxySource, RemoteProxyLists, Scheduler,
    VerifyEvent, VerifyLine, MISMATCH_EXIT_CODE, verify,
};
#[cfg(feature = "reqwest")]
pub use effects::{ReqwestClient, ReqwestConnector};

pub use error::{Error, ProviderError, Result, TransportError};
