use crate::{Span, Type};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of errors stored; later ones are only counted.
pub const MAX_ERRORS: usize = 20;

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Type,
    Narrowing,
    Dispatch,
    Scope,
}

/// Numeric error code (E200–E599).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Type errors (E200–E299) ──
    pub const TYPE_CONFLICT: Self = Self(200);
    pub const EXPRESSION_TYPE_MISMATCH: Self = Self(201);

    // ── Narrowing errors (E300–E399) ──
    pub const NARROWING_VIOLATION: Self = Self(300);

    // ── Dispatch diagnostics (E400–E499) ──
    pub const DISPATCH_EXPLOSION: Self = Self(400);

    // ── Scope errors (E500–E599) ──
    pub const FORBIDDEN_NAME_ACCESS: Self = Self(500);
    pub const DUPLICATE_ATTRIBUTE: Self = Self(501);
    pub const EMPTY_LOOKUP: Self = Self(502);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            300..=399 => ErrorCategory::Narrowing,
            400..=499 => ErrorCategory::Dispatch,
            500..=599 => ErrorCategory::Scope,
            _ => ErrorCategory::Type,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// The two sets involved in an empty intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConflict {
    /// What was known to be possible before the demand.
    pub known: Type,
    /// What the demand required.
    pub demanded: Type,
}

/// A structured diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricError {
    /// Source file name.
    pub file: String,
    /// Error code (e.g., E200).
    pub code: ErrorCode,
    /// Error severity.
    pub severity: Severity,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Source location.
    #[serde(flatten)]
    pub span: Span,
    /// Both sides of a type conflict, when that is what went wrong.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<TypeConflict>,
    /// Optional fix suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl FabricError {
    /// Create a new error.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            span,
            conflict: None,
            suggestion: None,
        }
    }

    /// Create a warning.
    pub fn warning(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(file, code, message, span)
        }
    }

    /// Attach the sets of a type conflict.
    pub fn with_conflict(mut self, known: Type, demanded: Type) -> Self {
        self.conflict = Some(TypeConflict { known, demanded });
        self
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Renders as `file:line:col-line:col: E200 [type] message`.
impl fmt::Display for FabricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.file, self.span, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for FabricError {}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Narrowing => write!(f, "narrowing"),
            Self::Dispatch => write!(f, "dispatch"),
            Self::Scope => write!(f, "scope"),
        }
    }
}

/// Accumulated diagnostics of one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<FabricError>,
    pub warnings: Vec<FabricError>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl CompileErrors {
    /// Create an empty result (no errors).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the MAX_ERRORS limit.
    pub fn push_error(&mut self, error: FabricError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Add a warning.
    pub fn push_warning(&mut self, warning: FabricError) {
        self.warnings.push(warning);
        self.total_warnings += 1;
    }

    /// Iterate the stored errors carrying `code`.
    pub fn with_code(&self, code: ErrorCode) -> impl Iterator<Item = &FabricError> {
        self.errors.iter().filter(move |e| e.code == code)
    }
}
