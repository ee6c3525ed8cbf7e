//! Error types for ado-mcp-tools.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for ado-mcp-tools operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Creating, reading or deleting something on disk failed
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied path or file name is not acceptable
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap an I/O error together with the path it happened on.
    pub fn filesystem(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this is a filesystem or permission failure.
    pub fn is_filesystem(&self) -> bool {
        matches!(self, Self::Filesystem { .. })
    }
}

/// Result type alias for ado-mcp-tools operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_error_display() {
        let err = Error::filesystem(
            "/tmp/ado-mcp-server-1/downloads",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        assert!(err.is_filesystem());
        let msg = err.to_string();
        assert!(msg.contains("/tmp/ado-mcp-server-1/downloads"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_filesystem_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::filesystem(
            "x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_path_is_not_filesystem() {
        let err = Error::InvalidPath("empty output path".to_string());
        assert!(!err.is_filesystem());
        assert_eq!(err.to_string(), "Invalid path: empty output path");
    }
}
