//! Diagnostic and error reporting for the SNEX compiler.
//!
//! User-facing errors carry an error code, a message, and the 1-based
//! source line; they are raised as [`CompileError`] values propagated with
//! `?` and converted to a single [`Diagnostic`] at the compile entry point.

mod diagnostic;
mod error_code;
mod errors;

pub use diagnostic::{Diagnostic, Severity};
pub use error_code::ErrorCode;
pub use errors::CompileError;

/// Result alias used by every compiler pass.
pub type CompileResult<T> = Result<T, CompileError>;
