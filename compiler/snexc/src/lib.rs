//! Host-facing entry points for embedding the SNEX compiler.
//!
//! The typical host compiles once and then calls into the result every
//! audio block:
//!
//! ```
//! let mut jit = snexc::compile("int twice(int x) { return x * 2; }")
//!     .expect("compiles")
//!     .jit;
//! let out = jit
//!     .call("twice", &[snex_ir::VariableStorage::Int(21)])
//!     .expect("runs");
//! assert_eq!(out.to_int(), 42);
//! ```

use snex_diagnostic::Diagnostic;

pub use snex_codegen::{CapturePrint, JitObject, PrintHandler, StdoutPrint};
pub use snex_compiler::{CompileOutput, Compiler, CompilerSettings};

/// Compile with every optimization enabled; what a release host wants.
pub fn compile(source: &str) -> Result<CompileOutput, Diagnostic> {
    Compiler::new(CompilerSettings::all_optimizations()).compile(source)
}

/// Compile with explicit settings.
pub fn compile_with_settings(
    source: &str,
    settings: CompilerSettings,
) -> Result<CompileOutput, Diagnostic> {
    Compiler::new(settings).compile(source)
}

/// Render a diagnostic the way the CLI prints it.
pub fn render(path: &str, diagnostic: &Diagnostic) -> String {
    format!("{path}: {diagnostic}")
}
