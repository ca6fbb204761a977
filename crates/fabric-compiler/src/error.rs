//! Errors raised while resolving scopes for code generation.

use thiserror::Error;

/// Failure while binding a scope's names for one code path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// One or more inherited names hold a kind the local scope excluded.
    /// Messages for individual names are joined with newlines.
    #[error("{message}")]
    NarrowingViolation { message: String },

    /// A fetched name has no kind left on this path.
    #[error("no value of “{0}” can reach this scope")]
    Uninhabited(String),

    /// A name that failed classification reached code generation.
    #[error("attempted to load invalid name “{0}”")]
    InvalidName(String),
}

/// Scope resolution result type alias.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Failure loading [`AnalysisOptions`](crate::AnalysisOptions).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid analysis options: {0}")]
    Json(#[from] serde_json::Error),
}
