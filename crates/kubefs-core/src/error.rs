//! Path resolution errors.

use thiserror::Error;

/// Errors raised while walking the virtual tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A path segment was consumed against a node that is not a directory.
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// No child matched the next path segment.
    #[error("not found: {path}")]
    NotFound { path: String },
}

pub type Result<T> = std::result::Result<T, ResolveError>;
