use std::io;

use thiserror::Error;

use datalog::LogError;

/// Everything the public engine API can fail with.
///
/// I/O failures pass through the `Io` umbrella, and so do record-level
/// failures on the read path: a CRC mismatch or corrupt header is an
/// I/O-class error to callers. The named variants are conditions callers
/// are expected to branch on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("key is empty")]
    EmptyKey,

    #[error("key not found in database")]
    KeyNotFound,

    #[error("data file not found")]
    DataFileNotFound,

    #[error("the database directory may be corrupted")]
    DataDirectoryCorrupted,

    #[error("failed to update index")]
    IndexUpdateFailed,

    #[error("the database directory is used by another process")]
    DatabaseInUse,

    #[error("merge is already in progress")]
    MergeInProgress,

    #[error("reclaimable space has not reached the merge ratio")]
    MergeRatioUnreached,

    #[error("not enough disk space to merge")]
    InsufficientDiskSpace,

    #[error("batch exceeds the configured maximum record count")]
    BatchTooLarge,

    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    /// An underlying I/O error, including corrupt or unverifiable records.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<LogError> for Error {
    fn from(e: LogError) -> Self {
        match e {
            LogError::Io(io_err) => Error::Io(io_err),
            other => Error::Io(io::Error::new(io::ErrorKind::InvalidData, other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
