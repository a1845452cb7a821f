//! The SNEX compilation pipeline.
//!
//! [`Compiler`] drives the fixed [`Pass`] sequence over one translation
//! unit: symbol resolution and scope building, type checking, syntax-sugar
//! replacement, the optional tree optimizations, register allocation and
//! code generation. The result is a [`snex_codegen::JitObject`] whose
//! functions the host calls by name and whose globals stay readable
//! between calls.

mod driver;
mod functions;
mod intrinsics;
mod lower;
pub mod optimize;
mod pass;
mod resolve;
mod scope;
pub mod settings;
mod sugar;
mod typecheck;

pub use driver::{CompileOutput, Compiler};
pub use functions::{CallMap, Callee, FunctionTable};
pub use intrinsics::{register_intrinsics, EventAccessors};
pub use lower::{lower_function, LowerInput};
pub use pass::Pass;
pub use resolve::{resolve, PendingWarning, ResolveCtx};
pub use scope::{
    allocate_frame, allocate_globals, DataLayout, GlobalSlot, ScopeArena, ScopeData, ScopeKind,
    VarLoc,
};
pub use settings::CompilerSettings;
pub use sugar::desugar;
pub use typecheck::{typecheck, TypecheckCtx};
