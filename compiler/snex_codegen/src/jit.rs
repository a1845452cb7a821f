//! The compiled program object handed back to the host.
//!
//! A `JitObject` owns everything a finished compilation produced: the
//! instruction streams for every compiled function, the native intrinsic
//! table, the global data block and the symbol entries that let the host
//! read and write globals between calls. Global state persists across
//! calls for the lifetime of the object.

use crate::emitter::AsmBuffer;
use crate::vm::{bits_to_value, value_to_bits, BlockHeader, NativeFn, Vm, VmError};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use snex_ir::{Types, VariableStorage};
use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JitError {
    #[error("no compiled function named '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' takes {expected} arguments, got {got}")]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Runtime(#[from] VmError),
}

/// Receives `Console.print` output. The default writes to stdout; hosts
/// embed their own sink for testing or UI consoles.
pub trait PrintHandler {
    fn print(&mut self, text: &str);
}

/// Default handler writing one line per print call.
#[derive(Default)]
pub struct StdoutPrint;

impl PrintHandler for StdoutPrint {
    fn print(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Print handler that collects output, used by tests. Clones share the
/// buffer, so a host can keep one handle and hand the other to
/// [`JitObject::set_print_handler`].
#[derive(Clone, Default)]
pub struct CapturePrint {
    lines: Rc<RefCell<Vec<String>>>,
}

impl CapturePrint {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.borrow_mut())
    }
}

impl PrintHandler for CapturePrint {
    fn print(&mut self, text: &str) {
        self.lines.borrow_mut().push(text.to_owned());
    }
}

/// One function's executable form.
pub struct CompiledFunction {
    /// Qualified name, e.g. `test` or `Filter::process`.
    pub name: String,
    pub return_type: Types,
    pub arg_types: SmallVec<[Types; 4]>,
    pub code: AsmBuffer,
    /// Byte size of the stack frame for locals.
    pub frame_size: u32,
}

/// Registered host intrinsic, e.g. `Math.sin` or `Console.print`.
pub struct NativeFunction {
    pub name: String,
    pub return_type: Types,
    pub arg_types: SmallVec<[Types; 4]>,
    pub func: NativeFn,
}

/// Symbol table entry for a global or class member variable.
#[derive(Clone, Debug)]
pub struct GlobalEntry {
    pub name: String,
    pub ty: Types,
    pub offset: u32,
}

/// Opaque handle to a compiled function, resolved once by name.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct JitFunction(usize);

pub struct JitObject {
    functions: Vec<CompiledFunction>,
    natives: Vec<NativeFunction>,
    globals: Vec<u8>,
    symbols: Vec<GlobalEntry>,
    function_index: FxHashMap<String, usize>,
    print: Box<dyn PrintHandler>,
}

impl std::fmt::Debug for JitObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitObject")
            .field("functions", &self.function_index.len())
            .field("globals", &self.globals.len())
            .field("symbols", &self.symbols)
            .finish_non_exhaustive()
    }
}

impl JitObject {
    pub fn new(
        functions: Vec<CompiledFunction>,
        natives: Vec<NativeFunction>,
        globals: Vec<u8>,
        symbols: Vec<GlobalEntry>,
    ) -> Self {
        let function_index = functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        JitObject {
            functions,
            natives,
            globals,
            symbols,
            function_index,
            print: Box::new(StdoutPrint),
        }
    }

    pub fn set_print_handler(&mut self, handler: Box<dyn PrintHandler>) {
        self.print = handler;
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.name.as_str())
    }

    pub fn find_function(&self, name: &str) -> Option<JitFunction> {
        self.function_index.get(name).copied().map(JitFunction)
    }

    /// Call a compiled function by name. Numeric arguments coerce to the
    /// declared parameter types before the call.
    pub fn call(
        &mut self,
        name: &str,
        args: &[VariableStorage],
    ) -> Result<VariableStorage, JitError> {
        let handle = self
            .find_function(name)
            .ok_or_else(|| JitError::UnknownFunction(name.to_owned()))?;
        self.call_function(handle, args)
    }

    pub fn call_function(
        &mut self,
        handle: JitFunction,
        args: &[VariableStorage],
    ) -> Result<VariableStorage, JitError> {
        let func = &self.functions[handle.0];
        if args.len() != func.arg_types.len() {
            return Err(JitError::ArgumentCount {
                name: func.name.clone(),
                expected: func.arg_types.len(),
                got: args.len(),
            });
        }
        let return_type = func.return_type;
        tracing::trace!(name = %func.name, args = args.len(), "jit call");
        // Block handles live in a per-call table; args register first.
        let mut blocks: Vec<BlockHeader> = Vec::new();
        let arg_bits: Vec<u64> = func
            .arg_types
            .iter()
            .zip(args)
            .map(|(&ty, v)| value_to_bits(&v.cast_to(ty), &mut blocks))
            .collect();
        let mut vm = Vm {
            globals: &mut self.globals,
            functions: &self.functions,
            natives: &self.natives,
            blocks: &mut blocks,
            print: &mut *self.print,
        };
        let result = vm.run(handle.0, &arg_bits)?;
        Ok(bits_to_value(return_type, result, &blocks))
    }

    /// Read a global variable through the symbol table. Dirty registers
    /// were flushed before the last return, so this sees every write the
    /// previous call made.
    pub fn get_variable(&self, name: &str) -> Option<VariableStorage> {
        let entry = self.symbols.iter().find(|s| s.name == name)?;
        let offset = entry.offset as usize;
        let value = match entry.ty {
            Types::Integer => {
                let mut b = [0u8; 4];
                b.copy_from_slice(&self.globals[offset..offset + 4]);
                VariableStorage::Int(i64::from(i32::from_le_bytes(b)))
            }
            Types::Float => {
                let mut b = [0u8; 4];
                b.copy_from_slice(&self.globals[offset..offset + 4]);
                VariableStorage::Float(f32::from_le_bytes(b))
            }
            Types::Double => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&self.globals[offset..offset + 8]);
                VariableStorage::Double(f64::from_le_bytes(b))
            }
            Types::Event => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&self.globals[offset..offset + 8]);
                VariableStorage::Event(crate::vm::bits_to_event(u64::from_le_bytes(b)))
            }
            _ => return None,
        };
        Some(value)
    }

    /// Write a global variable; the value coerces to the declared type.
    pub fn set_variable(&mut self, name: &str, value: VariableStorage) -> bool {
        let Some(entry) = self.symbols.iter().find(|s| s.name == name) else {
            return false;
        };
        let offset = entry.offset as usize;
        match entry.ty {
            Types::Integer => {
                let v = value.to_int() as i32;
                self.globals[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
            }
            Types::Float => {
                let v = value.to_float();
                self.globals[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
            }
            Types::Double => {
                let v = value.to_double();
                self.globals[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
            }
            Types::Event => {
                let bits = crate::vm::event_to_bits(value.to_event());
                self.globals[offset..offset + 8].copy_from_slice(&bits.to_le_bytes());
            }
            _ => return false,
        }
        true
    }

    pub fn symbols(&self) -> &[GlobalEntry] {
        &self.symbols
    }

    /// Listing of every compiled function, for dump output.
    pub fn assembly(&self) -> String {
        let mut out = String::new();
        for f in &self.functions {
            let _ = writeln!(out, "{}:", f.name);
            out.push_str(&f.code.listing());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::{Inst, OpTy, Slot};
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;

    fn identity_fn() -> CompiledFunction {
        let mut code = AsmBuffer::new();
        code.emit(Inst::Ret { src: Some(Slot(0)) });
        CompiledFunction {
            name: "test".to_owned(),
            return_type: Types::Integer,
            arg_types: smallvec![Types::Integer],
            code,
            frame_size: 0,
        }
    }

    #[test]
    fn call_by_name_round_trips_arguments() {
        let mut jit = JitObject::new(vec![identity_fn()], Vec::new(), Vec::new(), Vec::new());
        let r = jit.call("test", &[VariableStorage::Int(9)]).unwrap();
        assert_eq!(r, VariableStorage::Int(9));
    }

    #[test]
    fn unknown_function_and_bad_arity_are_errors() {
        let mut jit = JitObject::new(vec![identity_fn()], Vec::new(), Vec::new(), Vec::new());
        assert!(matches!(
            jit.call("missing", &[]),
            Err(JitError::UnknownFunction(_))
        ));
        assert!(matches!(
            jit.call("test", &[]),
            Err(JitError::ArgumentCount { expected: 1, got: 0, .. })
        ));
    }

    #[test]
    fn arguments_coerce_to_parameter_types() {
        let mut jit = JitObject::new(vec![identity_fn()], Vec::new(), Vec::new(), Vec::new());
        let r = jit.call("test", &[VariableStorage::Double(4.8)]).unwrap();
        assert_eq!(r, VariableStorage::Int(4));
    }

    #[test]
    fn globals_survive_between_calls() {
        let symbols = vec![GlobalEntry {
            name: "x".to_owned(),
            ty: Types::Float,
            offset: 0,
        }];
        let mut code = AsmBuffer::new();
        code.emit(Inst::Load {
            ty: OpTy::F32,
            dst: Slot(0),
            addr: crate::inst::MemAddr::Global(0),
        });
        code.emit(Inst::Ret { src: Some(Slot(0)) });
        let func = CompiledFunction {
            name: "read_x".to_owned(),
            return_type: Types::Float,
            arg_types: smallvec![],
            code,
            frame_size: 0,
        };
        let mut jit = JitObject::new(vec![func], Vec::new(), vec![0u8; 4], symbols);
        assert!(jit.set_variable("x", VariableStorage::Float(2.5)));
        assert_eq!(jit.get_variable("x"), Some(VariableStorage::Float(2.5)));
        let r = jit.call("read_x", &[]).unwrap();
        assert_eq!(r, VariableStorage::Float(2.5));
    }

    #[test]
    fn assembly_listing_names_functions() {
        let jit = JitObject::new(vec![identity_fn()], Vec::new(), Vec::new(), Vec::new());
        let asm = jit.assembly();
        assert!(asm.starts_with("test:\n"));
        assert!(asm.contains("ret r0"));
    }
}
