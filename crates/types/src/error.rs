//! Typed errors shared across the compile and run pipeline.
//!
//! Every user-facing error carries three pieces: what went wrong, where
//! (a dotted document path or a node/parameter pair), and what to do about
//! it. The `Display` output is the canonical rendering shown by the CLI.

use std::fmt;

use thiserror::Error;

/// Structural validation failure with a dotted field path and fix suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// What was wrong with the document.
    pub message: String,
    /// Dotted path to the offending field, e.g. `nodes[0].type`. Empty means
    /// the document root.
    pub path: String,
    /// Optional human-readable fix, possibly multi-line.
    pub suggestion: String,
}

impl ValidationError {
    /// Creates an error anchored at the document root with no suggestion.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: String::new(),
            suggestion: String::new(),
        }
    }

    /// Sets the dotted field path.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Attaches a fix suggestion.
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation error")?;
        if !self.path.is_empty() {
            write!(f, " at {}", self.path)?;
        }
        write!(f, ": {}", self.message)?;
        if !self.suggestion.is_empty() {
            write!(f, "\n{}", self.suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Failure while turning a validated document into a runnable flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationError {
    /// What prevented compilation.
    pub message: String,
    /// Dotted path into the document when one applies, e.g. `inputs.path`.
    pub path: String,
    /// Optional remediation text.
    pub suggestion: String,
}

impl CompilationError {
    /// Creates an error with no path or suggestion.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: String::new(),
            suggestion: String::new(),
        }
    }

    /// Sets the dotted field path.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Attaches a remediation suggestion.
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compilation error")?;
        if !self.path.is_empty() {
            write!(f, " at {}", self.path)?;
        }
        write!(f, ": {}", self.message)?;
        if !self.suggestion.is_empty() {
            write!(f, "\n{}", self.suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompilationError {}

/// Unresolved template reference reported during strict-mode resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Template resolution failed for node '{node_id}' parameter '{param}': ${{{expression}}} — {message}")]
pub struct TemplateError {
    /// Node whose parameters were being resolved.
    pub node_id: String,
    /// Parameter (or source path) carrying the expression.
    pub param: String,
    /// The expression body without `${` `}` delimiters.
    pub expression: String,
    /// Why resolution failed, including any available alternatives.
    pub message: String,
}

/// Failure raised from a node's `prep` or `exec` phase.
///
/// Transient failures are retried according to the node's retry policy;
/// fatal failures abort the run immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// Retryable failure (I/O, timeout, transient upstream error).
    #[error("{0}")]
    Transient(String),
    /// Unrecoverable failure that invalidates the whole flow.
    #[error("{0}")]
    Fatal(String),
}

impl NodeError {
    /// Shorthand for a retryable failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Shorthand for an unrecoverable failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Returns true when the failure may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_renders_path_and_suggestion() {
        let error = ValidationError::new("'ir_version' is required")
            .at("root")
            .suggest("Add the required field 'ir_version'");
        let rendered = error.to_string();
        assert!(rendered.starts_with("Validation error at root: 'ir_version' is required"));
        assert!(rendered.ends_with("Add the required field 'ir_version'"));
    }

    #[test]
    fn validation_error_omits_empty_parts() {
        let error = ValidationError::new("bad document");
        assert_eq!(error.to_string(), "Validation error: bad document");
    }

    #[test]
    fn node_error_classification() {
        assert!(NodeError::transient("boom").is_transient());
        assert!(!NodeError::fatal("boom").is_transient());
    }
}
