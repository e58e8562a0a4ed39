//! Error types.
//!
//! Every failure is raised synchronously at the point of misuse. Nothing in
//! the notification path returns an error.

use thiserror::Error;

use crate::path::Path;

/// Errors produced by the tracking engine.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation was invoked on a value of the wrong shape: a scalar where
    /// a composite was required, an untracked value passed to `subscribe`, or
    /// a node that belongs to another store.
    #[error("{0}")]
    InvalidArgument(String),

    /// A path lookup hit a missing key or a non-composite intermediate value.
    #[error("Invalid path ({path}) provided for object: {root}")]
    PathNotFound {
        /// Dotted form of the requested path.
        path: String,
        /// Serialized snapshot of the lookup root.
        root: String,
    },

    /// A configuration document could not be parsed.
    #[error("invalid store configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn path_not_found(path: &Path, root: &serde_json::Value) -> Self {
        Error::PathNotFound {
            path: path.to_string(),
            root: root.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
