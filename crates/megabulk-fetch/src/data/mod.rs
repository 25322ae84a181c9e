//! Immutable data types for a download run.
//!
//! Configuration, the provider's item model, proxy addresses and the task status enum live here.
//! Nothing in this module performs I/O.

pub mod item;
pub mod link;
pub mod options;
pub mod progress;
pub mod proxy;
pub mod status;

pub use item::{Item, ItemKind};
pub use link::ShareCredential;
pub use options::{DEFAULT_API_URL, RunOptions, VerifyMode};
pub use progress::{FailedFile, RunReport, RunSnapshot, TransferStats};
pub use proxy::{PoolCounts, ProxyAddress, ProxyScheme, Tier};
pub use status::TaskStatus;
