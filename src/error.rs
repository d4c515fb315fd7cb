//! Unified error type for all store operations.

use std::path::{Path, PathBuf};

/// Things that can go wrong when reading or committing a mapping.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system problem (read, temp write, fsync, rename).
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        /// File or directory the failing operation touched.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// Failed to serialize the document to bytes.
    #[error("serialization error: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The backing file does not hold a valid document.
    #[error("deserialization error: {0}")]
    Deserialize(#[source] serde_json::Error),
    /// Bad configuration (unusable path, etc.).
    #[error("config error: {0}")]
    Config(String),
    /// The commit worker went away before reporting an outcome.
    #[error("commit worker for {} is unavailable", .path.display())]
    Disconnected {
        /// Backing file the commit was meant for.
        path: PathBuf,
    },
    /// An `update_with` closure panicked; nothing was written.
    #[error("update closure panicked while committing {}", .path.display())]
    Panicked {
        /// Backing file the commit was meant for.
        path: PathBuf,
    },
}

impl Error {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The underlying OS error kind, if this is an I/O failure.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Error::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// Result alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
