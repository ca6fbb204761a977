//! Error reporting for one analysis run.

use std::collections::HashSet;

use fabric_types::{CompileErrors, ErrorCode, FabricError, Span, Type};

/// Collects diagnostics for one analysed unit.
///
/// A demand can be applied to the same node more than once, so an error that
/// repeats an earlier one exactly is dropped.
#[derive(Debug)]
pub struct Diagnostics {
    file: String,
    errors: CompileErrors,
    seen: HashSet<(ErrorCode, Span, String)>,
}

impl Diagnostics {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            errors: CompileErrors::empty(),
            seen: HashSet::new(),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// True while no error has been reported.
    pub fn success(&self) -> bool {
        !self.errors.has_errors()
    }

    pub fn errors(&self) -> &CompileErrors {
        &self.errors
    }

    pub fn into_errors(self) -> CompileErrors {
        self.errors
    }

    fn push(&mut self, error: FabricError) {
        if !self
            .seen
            .insert((error.code, error.span, error.message.clone()))
        {
            return;
        }
        tracing::debug!(file = %self.file, span = %error.span, code = %error.code, "analysis error");
        self.errors.push_error(error);
    }

    pub fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.push(FabricError::new(&self.file, code, message, span));
    }

    /// A demand on a name conflicted with what the name can already be.
    pub fn lookup_type_error(&mut self, span: Span, name: &str, known: Type, demanded: Type) {
        let error = FabricError::new(
            &self.file,
            ErrorCode::TYPE_CONFLICT,
            format!("Lookup for “{name}” can only be {known}, but {demanded} is required."),
            span,
        )
        .with_conflict(known, demanded);
        self.push(error);
    }

    /// An inherited name was masked to kinds its definition can never
    /// produce.
    pub fn inherited_mask_error(&mut self, span: Span, name: &str, known: Type, mask: Type) {
        let error = FabricError::new(
            &self.file,
            ErrorCode::TYPE_CONFLICT,
            format!("Lookup for “{name}” can only be {known}, but {mask} is required."),
            span,
        )
        .with_conflict(known, mask)
        .with_suggestion(format!(
            "“{name}” is defined in an enclosing scope as {known}."
        ));
        self.push(error);
    }

    /// A demand on an expression conflicted with what it can produce.
    pub fn expression_type_error(&mut self, span: Span, known: Type, demanded: Type) {
        let error = FabricError::new(
            &self.file,
            ErrorCode::EXPRESSION_TYPE_MISMATCH,
            format!("Expression can only be {known}, but {demanded} is required."),
            span,
        )
        .with_conflict(known, demanded);
        self.push(error);
    }

    pub fn forbidden_name(&mut self, span: Span, name: &str) {
        self.error(
            ErrorCode::FORBIDDEN_NAME_ACCESS,
            format!("Lookup for “{name}” is forbidden."),
            span,
        );
    }
}
