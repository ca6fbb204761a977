//! Runtime error types for frames and lookups.

use fabric_types::Type;
use thiserror::Error;

use crate::value::Value;

/// Why a [`Lookup`](crate::Lookup) failed.
///
/// Delivered as the `Err` side of a lookup result. Failed lookups are never
/// retried by the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    /// No frame in the context could supply the whole path.
    #[error("no frame among {frames} defines “{name}”")]
    NameNotFound { name: String, frames: usize },
    /// A component with more components after it named a non-frame value.
    #[error("lookup for “{name}” drilled into {found} at “{component}”")]
    NotAFrame {
        name: String,
        component: String,
        found: Type,
    },
    /// Zero components were requested.
    #[error("lookup with an empty name path")]
    EmptyNamePath,
    /// A component is not a valid attribute symbol.
    #[error("invalid name “{name}”: {reason}")]
    InvalidName { name: String, reason: String },
}

/// Misuse of a frame's write side.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("frame has no attribute “{0}”")]
    UnknownAttribute(String),
    #[error("attribute “{0}” has already been produced")]
    AlreadyResolved(String),
}

/// The value a lookup settles on.
pub type LookupResult = Result<Value, LookupError>;
