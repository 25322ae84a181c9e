use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("retry limit exceeded after {attempts} attempts on {path}: {source}")]
    RetryLimitExceeded {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// The underlying I/O error.
    pub fn io(&self) -> &io::Error {
        match self {
            Error::Read { source, .. }
            | Error::Write { source, .. }
            | Error::Rename { source, .. }
            | Error::Remove { source, .. }
            | Error::RetryLimitExceeded { source, .. } => source,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::RetryLimitExceeded { .. }) && is_transient(self.io())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The only I/O failures worth retrying in place.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ResourceBusy
    )
}
