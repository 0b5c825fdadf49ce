//! Error taxonomy for collection, assembly and division.
//!
//! Every fatal condition surfaces as a [`BlocksError`]. Variants carry the offending
//! path(s) and, for joins, both column-group identities with their row counts, so a
//! failed pipeline can be diagnosed from the message alone.
//!
//! Storage backends report [`StorageError`]s; converting one into a [`BlocksError`]
//! maps transient kinds (network, timeout, throttling) to [`BlocksError::Connectivity`]
//! and everything else to [`BlocksError::Storage`].

use crate::storage::StorageError;
use arrow::error::ArrowError;
use thiserror::Error;

/// Boxed source error used where the underlying failure comes from `anyhow`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum BlocksError {
    /// No files matched a root path, or an explicitly requested column group matched nothing.
    #[error("not found: {message}")]
    NotFound { path: String, message: String },

    /// Bad axis, join mode, extension, column selection, or other caller input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An optional codec or the parallel engine was compiled out.
    #[error("{what} requires the `{feature}` feature of ironblocks")]
    MissingDependency { what: String, feature: &'static str },

    /// No codec is registered for the extension.
    #[error("unsupported format {extension:?} for {path}")]
    UnsupportedFormat { path: String, extension: String },

    /// Transient storage failure that outlived the retry budget.
    #[error("connectivity failure: {0}")]
    Connectivity(#[source] StorageError),

    #[error("storage failure: {0}")]
    Storage(#[source] StorageError),

    /// Row counts differ across a join; only raised when strict joins are requested.
    #[error(
        "column groups {left} ({left_rows} rows) and {right} ({right_rows} rows) have a different number of rows"
    )]
    ShapeMismatch {
        left: String,
        right: String,
        left_rows: usize,
        right_rows: usize,
    },

    #[error("{codec} codec failed on {path}")]
    Codec {
        codec: String,
        path: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}")]
    Serde {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = BlocksError> = std::result::Result<T, E>;

impl BlocksError {
    pub(crate) fn not_found(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True for errors a caller may reasonably retry later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl From<StorageError> for BlocksError {
    fn from(err: StorageError) -> Self {
        if err.kind.is_transient() {
            Self::Connectivity(err)
        } else {
            Self::Storage(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ErrorKind;

    #[test]
    fn transient_storage_errors_become_connectivity() {
        let err: BlocksError = StorageError::new(ErrorKind::Network, "reset by peer").into();
        assert!(matches!(err, BlocksError::Connectivity(_)));
        assert!(err.is_transient());

        let err: BlocksError = StorageError::new(ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, BlocksError::Storage(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn shape_mismatch_names_both_groups() {
        let err = BlocksError::ShapeMismatch {
            left: "c0".into(),
            right: "c1".into(),
            left_rows: 10,
            right_rows: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains("c0 (10 rows)"));
        assert!(msg.contains("c1 (9 rows)"));
    }
}
