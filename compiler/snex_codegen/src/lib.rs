//! Code generation backend: register allocation primitives, the abstract
//! instruction set and emitter, the executing VM, and the `JitObject`
//! handed to the host.
//!
//! The compiler lowers each function to an [`AsmBuffer`] of abstract
//! instructions using slots from a [`RegisterPool`]. The finished program
//! is packaged as a [`JitObject`], whose calls execute on the [`Vm`].

pub mod emitter;
pub mod inst;
pub mod jit;
pub mod reg;
pub mod vm;

pub use emitter::AsmBuffer;
pub use inst::{AluOp, Bits, CallTarget, Cond, Inst, Label, MemAddr, Operand, OpTy, Slot};
pub use jit::{
    CapturePrint, CompiledFunction, GlobalEntry, JitError, JitFunction, JitObject,
    NativeFunction, PrintHandler, StdoutPrint,
};
pub use reg::{AssemblyRegister, RegId, RegState, RegisterPool};
pub use vm::{BlockHeader, NativeCtx, NativeFn, Vm, VmError};
