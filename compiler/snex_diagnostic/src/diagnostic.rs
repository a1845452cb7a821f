use std::fmt;

use snex_ir::Span;

use crate::ErrorCode;

/// Severity level for diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One user-facing diagnostic: code, message, 1-based source line.
///
/// A failed compile yields exactly one `Error` diagnostic describing the
/// first error encountered. Shadow warnings and similar non-fatal findings
/// are collected separately on the compile result.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(code: ErrorCode, message: impl Into<String>, span: Span, source: &str) -> Self {
        Diagnostic {
            code,
            severity: Severity::Error,
            message: message.into(),
            line: span.line_number(source),
            span,
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>, span: Span, source: &str) -> Self {
        Diagnostic {
            code,
            severity: Severity::Warning,
            message: message.into(),
            line: span.line_number(source),
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: Line {}: {}",
            self.severity, self.code, self.line, self.message
        )
    }
}
