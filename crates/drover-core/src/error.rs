//! Unified error types for Drover.
//!
//! All errors are represented by [`DroverError`], using `thiserror` for
//! ergonomic definitions. Errors coming from the object store or the
//! cluster control plane keep the original client error as their
//! `source` so callers can inspect the failure detail.

use thiserror::Error;

/// Boxed error from an underlying client library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The unified error type for all Drover operations.
#[derive(Error, Debug)]
pub enum DroverError {
    /// A location string is not of the form `s3://container[/key]`.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The rejected input.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The object, cluster, or step does not exist.
    #[error("Not found: {path}")]
    NotFound {
        /// The path or identifier that was not found.
        path: String,
    },

    /// The control plane refused the request for lack of permission.
    #[error("Access denied: {path}")]
    Access {
        /// The path or identifier the request targeted.
        path: String,
        /// The underlying client error.
        #[source]
        source: BoxError,
    },

    /// Tabular data could not be parsed or serialized.
    #[error("Format error: {message}")]
    Format {
        /// Description of the failure.
        message: String,
        /// The underlying parser/serializer error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// A move copied the object but could not delete the origin.
    ///
    /// Both copies now exist; the caller must reconcile.
    #[error("Partial move: copied {src} to {dst} but failed to delete {src}")]
    PartialMove {
        /// The origin path, which still exists.
        src: String,
        /// The destination path, which now exists.
        dst: String,
        /// The error raised by the delete.
        #[source]
        source: Box<DroverError>,
    },

    /// A control-plane client failed (network, throttling, service error).
    #[error("Transport error: {message}")]
    Transport {
        /// What Drover was doing when the call failed.
        message: String,
        /// The original client error.
        #[source]
        source: BoxError,
    },

    /// Invalid configuration was provided.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// An internal error (bug).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl DroverError {
    /// Create a transport error from a message and client error.
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Create an access error for a path from a client error.
    pub fn access(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Access {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create a format error from a message and parser error.
    pub fn format(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Format {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a format error from a message only.
    pub fn format_msg(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
            source: None,
        }
    }

    /// Create a not-found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Whether this error is worth retrying under a [`RetryPolicy`](crate::RetryPolicy).
    ///
    /// Only transport failures qualify; not-found and access errors are
    /// answers, not hiccups.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_partial_move_names_both_paths() {
        let err = DroverError::PartialMove {
            src: "s3://a/x".into(),
            dst: "s3://b/x".into(),
            source: Box::new(DroverError::Internal {
                message: "boom".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("s3://a/x"));
        assert!(msg.contains("s3://b/x"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_transport_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let err = DroverError::transport("describe step", io);
        assert!(err.is_transient());
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "slow");
    }

    #[test]
    fn test_not_found_is_not_transient() {
        assert!(!DroverError::not_found("s3://a/b").is_transient());
    }
}
