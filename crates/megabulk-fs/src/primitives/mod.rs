pub mod atomic_write;
pub mod replace_file;

pub use atomic_write::{AtomicWriteOptions, atomic_write, len_or_zero, remove_if_exists};
pub use replace_file::{RetryOptions, replace_file, with_retry};
