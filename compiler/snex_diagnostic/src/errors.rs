//! The compile-error type threaded through every pass.
//!
//! All user-facing failures flow as `Result<_, CompileError>` with `?` and
//! are converted into a single [`Diagnostic`] at the top-level compile
//! entry point. Internal invariant violations do not use this type; they
//! panic, because they indicate an earlier-pass bug.

use snex_ir::Span;
use thiserror::Error;

use crate::{Diagnostic, ErrorCode};

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum CompileError {
    // Lexical errors
    #[error("unexpected character '{found}'")]
    UnexpectedCharacter { found: char, span: Span },

    #[error("malformed number literal '{literal}'")]
    MalformedLiteral { literal: String, span: Span },

    #[error("unterminated string literal")]
    UnterminatedString { span: Span },

    #[error("unterminated block comment")]
    UnterminatedComment { span: Span },

    // Syntax errors
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("expected an expression, found {found}")]
    ExpectedExpression { found: String, span: Span },

    #[error("expected a type, found {found}")]
    ExpectedType { found: String, span: Span },

    #[error("not all control paths of '{function}' return a value")]
    MissingReturn { function: String, span: Span },

    #[error("this statement is not allowed at the top level")]
    IllegalStatement { span: Span },

    // Resolution errors
    #[error("use of undefined symbol '{name}'")]
    UndefinedSymbol { name: String, span: Span },

    #[error("illegal redeclaration of '{name}'")]
    Redeclaration { name: String, span: Span },

    #[error("'{name}' is {visibility} and not accessible from this scope")]
    NotAccessible {
        name: String,
        visibility: &'static str,
        span: Span,
    },

    #[error("no matching overload for '{name}({signature})'")]
    NoMatchingOverload {
        name: String,
        signature: String,
        span: Span,
    },

    #[error("ambiguous call to overloaded function '{name}'")]
    AmbiguousOverload { name: String, span: Span },

    #[error("'{name}' is a member function and needs an object")]
    MethodCallWithoutObject { name: String, span: Span },

    #[error("cannot instantiate template '{name}': {reason}")]
    TemplateError {
        name: String,
        reason: String,
        span: Span,
    },

    // Type errors
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("assignment to const variable '{name}'")]
    ConstAssignment { name: String, span: Span },

    #[error("wrong argument count for '{name}': expected {expected}, found {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("'{name}' must be resolved to a concrete type before use")]
    UnresolvedAuto { name: String, span: Span },

    #[error("subscript index must be an integer")]
    NonIntegerIndex { span: Span },

    #[error("global initializer for '{name}' must be a compile-time constant")]
    NonConstantGlobal { name: String, span: Span },

    #[error("Division by zero")]
    DivisionByZero { span: Span },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::UnexpectedCharacter { span, .. }
            | CompileError::MalformedLiteral { span, .. }
            | CompileError::UnterminatedString { span }
            | CompileError::UnterminatedComment { span }
            | CompileError::UnexpectedToken { span, .. }
            | CompileError::ExpectedExpression { span, .. }
            | CompileError::ExpectedType { span, .. }
            | CompileError::MissingReturn { span, .. }
            | CompileError::IllegalStatement { span }
            | CompileError::UndefinedSymbol { span, .. }
            | CompileError::Redeclaration { span, .. }
            | CompileError::NotAccessible { span, .. }
            | CompileError::NoMatchingOverload { span, .. }
            | CompileError::AmbiguousOverload { span, .. }
            | CompileError::MethodCallWithoutObject { span, .. }
            | CompileError::TemplateError { span, .. }
            | CompileError::TypeMismatch { span, .. }
            | CompileError::ConstAssignment { span, .. }
            | CompileError::ArgumentCount { span, .. }
            | CompileError::UnresolvedAuto { span, .. }
            | CompileError::NonIntegerIndex { span }
            | CompileError::NonConstantGlobal { span, .. }
            | CompileError::DivisionByZero { span } => *span,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CompileError::UnexpectedCharacter { .. } => ErrorCode::E0001,
            CompileError::MalformedLiteral { .. } => ErrorCode::E0002,
            CompileError::UnterminatedString { .. } => ErrorCode::E0003,
            CompileError::UnterminatedComment { .. } => ErrorCode::E0004,
            CompileError::UnexpectedToken { .. } => ErrorCode::E1001,
            CompileError::ExpectedExpression { .. } => ErrorCode::E1002,
            CompileError::ExpectedType { .. } => ErrorCode::E1004,
            CompileError::MissingReturn { .. } => ErrorCode::E1005,
            CompileError::IllegalStatement { .. } => ErrorCode::E1006,
            CompileError::UndefinedSymbol { .. } => ErrorCode::E2001,
            CompileError::Redeclaration { .. } => ErrorCode::E2002,
            CompileError::NotAccessible { .. } => ErrorCode::E2003,
            CompileError::NoMatchingOverload { .. } => ErrorCode::E2004,
            CompileError::AmbiguousOverload { .. } => ErrorCode::E2005,
            CompileError::MethodCallWithoutObject { .. } => ErrorCode::E2004,
            CompileError::TemplateError { .. } => ErrorCode::E2006,
            CompileError::TypeMismatch { .. } => ErrorCode::E3001,
            CompileError::ConstAssignment { .. } => ErrorCode::E3002,
            CompileError::ArgumentCount { .. } => ErrorCode::E3003,
            CompileError::UnresolvedAuto { .. } => ErrorCode::E3007,
            CompileError::NonIntegerIndex { .. } => ErrorCode::E3005,
            CompileError::NonConstantGlobal { .. } => ErrorCode::E1006,
            CompileError::DivisionByZero { .. } => ErrorCode::E3006,
        }
    }

    /// Convert into the single user-facing diagnostic.
    pub fn into_diagnostic(self, source: &str) -> Diagnostic {
        let span = self.span();
        let code = self.code();
        Diagnostic::error(code, self.to_string(), span, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_message_is_exact() {
        let e = CompileError::DivisionByZero { span: Span::DUMMY };
        assert_eq!(e.to_string(), "Division by zero");
        assert_eq!(e.code(), ErrorCode::E3006);
    }

    #[test]
    fn diagnostic_carries_line() {
        let src = "float test(float i){\n    return x;\n}\n";
        let e = CompileError::UndefinedSymbol {
            name: "x".into(),
            span: Span::new(32, 33),
        };
        let d = e.into_diagnostic(src);
        assert_eq!(d.line, 2);
        assert!(d.message.contains("undefined symbol 'x'"));
    }
}
