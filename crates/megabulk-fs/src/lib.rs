//! Synchronous filesystem primitives for resumable downloads.
//!
//! Every download owns a [`FileLayout`]: a partial file that grows as bytes arrive, two marker
//! files that checkpoint verification, and the final file. Together they encode enough state to
//! resume after a crash without any in-memory bookkeeping.

mod error;
mod layout;
pub mod primitives;

pub use error::{Error, Result, is_transient};
pub use layout::{FileLayout, Recovery};
pub use primitives::{
    AtomicWriteOptions, RetryOptions, atomic_write, len_or_zero, remove_if_exists, replace_file, with_retry,
};
