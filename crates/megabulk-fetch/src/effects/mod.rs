//! I/O operations for a download run.
//!
//! Everything that touches the network, the filesystem or the clock lives here: the HTTP
//! client seam, the provider API, proxy sources and the proxy pool, per-file transfers,
//! verification and the scheduler that ties them together.

pub mod http;
pub mod pool;
pub mod provider;
pub mod proxy_source;
pub mod scheduler;
pub mod task;
pub mod verify;

pub use http::{BoxStream, ByteStream, Connector, HttpClient};
#[cfg(feature = "reqwest")]
pub use http::{ReqwestClient, ReqwestConnector};
pub use pool::{PoolOptions, ProxyLease, ProxyPool};
pub use provider::{DownloadTicket, Provider, unwrap_response};
pub use proxy_source::{ProxyList, ProxySource, RemoteProxyLists, default_lists, parse_list};
pub use scheduler::Scheduler;
pub use task::{FileTask, TransferEvent};
pub use verify::{MISMATCH_EXIT_CODE, VerifyEvent, VerifyLine, verify};
