use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("attribute decryption failed: {0}")]
    AttributeDecrypt(String),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
