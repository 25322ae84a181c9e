use crate::error::is_transient;
use crate::{Error, Result};
use std::path::Path;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct RetryOptions {
    retry_count: u32,
    retry_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self {
            retry_count: 5,
            retry_delay: Duration::from_millis(8),
        }
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn get_retry_count(&self) -> u32 {
        self.retry_count
    }
}

/// Run `op`, retrying with doubling delays while it fails with a transient I/O error.
///
/// Non-transient errors are returned immediately; a transient error that outlives the budget
/// becomes [`Error::RetryLimitExceeded`].
pub fn with_retry<T>(
    path: &Path,
    options: RetryOptions,
    mut op: impl FnMut() -> std::io::Result<T>,
    wrap: impl Fn(std::io::Error) -> Error,
) -> Result<T> {
    let mut delay = options.retry_delay;
    let mut attempts = 0;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                attempts += 1;
                if attempts > options.retry_count {
                    return Err(Error::RetryLimitExceeded {
                        path: path.to_path_buf(),
                        attempts,
                        source: e,
                    });
                }
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(wrap(e)),
        }
    }
}

/// Rename `src` over `dest`, retrying transient failures.
pub fn replace_file(src: impl AsRef<Path>, dest: impl AsRef<Path>, options: RetryOptions) -> Result<()> {
    let src = src.as_ref();
    let dest = dest.as_ref();

    with_retry(
        dest,
        options,
        || std::fs::rename(src, dest),
        |e| Error::Rename {
            from: src.to_path_buf(),
            to: dest.to_path_buf(),
            source: e,
        },
    )
}
