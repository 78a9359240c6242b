use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("incomplete data, more input required")]
    Incomplete,

    #[error("sync marker not found")]
    SyncNotFound,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("ring buffer overflow: {0}")]
    BufferOverflow(String),

    #[error("ring buffer underflow: {0}")]
    BufferUnderflow(String),

    #[error("pack size mismatch: wrote {written} bytes, expected {expected}")]
    PackSize { written: usize, expected: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

impl RemuxError {
    /// Returns true when the caller should retry with more input instead of
    /// treating the error as a failure.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, RemuxError::Incomplete)
    }
}

pub type Result<T> = std::result::Result<T, RemuxError>;
