//! Function table for the whole compilation.
//!
//! Functions group into [`FunctionClass`]es by their parent namespace path,
//! so `Math::sin` and `Math::cos` share a class and overload resolution
//! only ever searches within one class. Type checking records the resolved
//! callee for every call node so later passes never repeat the lookup.

use rustc_hash::FxHashMap;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{ComplexTypeId, Name, NamespacedIdentifier, NodeId, Span, StringInterner, TypeInfo};
use snex_types::{FunctionClass, FunctionData, PureEval};

/// Every function known to the compilation, native and user-defined alike.
#[derive(Default)]
pub struct FunctionTable {
    classes: FxHashMap<Vec<Name>, FunctionClass>,
}

fn parent_path(id: &NamespacedIdentifier) -> Vec<Name> {
    id.segments()[..id.segments().len() - 1].to_vec()
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, function: FunctionData) {
        self.classes
            .entry(parent_path(&function.id))
            .or_insert_with_key(|p| {
                if p.is_empty() {
                    FunctionClass::default()
                } else {
                    FunctionClass::new(NamespacedIdentifier::from_path(p.iter().copied()))
                }
            })
            .add(function);
    }

    pub fn class_of(&self, id: &NamespacedIdentifier) -> Option<&FunctionClass> {
        self.classes.get(&parent_path(id))
    }

    /// Resolve a call to `id` with the given argument types. Errors carry
    /// the call span.
    pub fn resolve(
        &self,
        id: &NamespacedIdentifier,
        arg_types: &[TypeInfo],
        relaxed_floats: bool,
        span: Span,
        interner: &StringInterner,
    ) -> CompileResult<&FunctionData> {
        let Some(class) = self.class_of(id) else {
            return Err(CompileError::UndefinedSymbol {
                name: id.display(interner).to_string(),
                span,
            });
        };
        class.resolve_overload(id, arg_types, relaxed_floats, span, interner)
    }

    pub fn contains(&self, id: &NamespacedIdentifier) -> bool {
        self.class_of(id)
            .is_some_and(|c| c.functions().iter().any(|f| f.id.id() == id.id()))
    }
}

/// The resolved target of one call node, recorded during type checking.
#[derive(Copy, Clone, Debug)]
pub enum Callee {
    /// A user-defined function, indexed into the compiled-function list.
    Compiled {
        index: u32,
        return_type: TypeInfo,
        method_of: Option<ComplexTypeId>,
    },
    /// A native function, indexed into the native list.
    Native {
        index: u32,
        return_type: TypeInfo,
        pure_eval: Option<PureEval>,
    },
    /// `block.size()`, lowered to a length instruction.
    BlockSize,
    /// An event field getter native.
    EventGetter { index: u32 },
    /// An event field setter native. The result writes back into the
    /// receiver variable.
    EventSetter { index: u32 },
}

pub type CallMap = FxHashMap<NodeId, Callee>;
