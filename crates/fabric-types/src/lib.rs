//! Shared types for the Fabric core.
//!
//! This crate defines the primitive type lattice, the interface-level AST
//! consumed by static analysis, source spans, and the structured diagnostics
//! used across the compiler and runtime crates.

mod error;
mod span;
mod ty;
pub mod ast;

pub use error::{
    CompileErrors, ErrorCategory, ErrorCode, FabricError, Severity, TypeConflict, MAX_ERRORS,
};
pub use span::Span;
pub use ty::Type;

/// Result type used throughout the Fabric core.
pub type Result<T> = std::result::Result<T, FabricError>;
