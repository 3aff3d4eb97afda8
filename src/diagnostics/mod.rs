//! Diagnostics attached to individual elements
//!
//! An element carries at most one diagnostic at a time. Reporting replaces the
//! previous one; clearing removes it. Both notify the element's visual.

use serde::{Deserialize, Serialize};

/// Severity level of a diagnostic
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

/// Problem report for one element
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Diagnostic {
    /// Severity level
    pub severity: DiagnosticSeverity,
    /// Kind identifier (e.g., "unresolved_function", "type_mismatch")
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Region the problem was found in, if it is confined to one
    pub region: Option<usize>,
}

impl Diagnostic {
    pub fn new(severity: DiagnosticSeverity, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind: kind.into(),
            message: message.into(),
            region: None,
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, kind, message)
    }

    pub fn warning(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, kind, message)
    }

    /// Confine the diagnostic to one text region
    pub fn in_region(mut self, region: usize) -> Self {
        self.region = Some(region);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}
