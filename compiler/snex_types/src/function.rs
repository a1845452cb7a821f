//! Function signatures, overload sets, and resolution.

use smallvec::SmallVec;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    NamespacedIdentifier, Span, StringInterner, Symbol, TypeInfo, Types, VariableStorage,
};

/// Stateless evaluator for pure functions, used by constant folding.
pub type PureEval = fn(&[VariableStorage]) -> VariableStorage;

/// How a function is implemented at call time.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum FunctionImpl {
    /// Not yet compiled or bound.
    #[default]
    Unresolved,
    /// Index into the runtime's native-function table (intrinsics).
    Native(u32),
    /// Index into the JIT object's compiled-function table.
    Compiled(u32),
}

/// Signature plus, post-compilation, an entry point.
#[derive(Clone, Debug)]
pub struct FunctionData {
    pub id: NamespacedIdentifier,
    pub return_type: TypeInfo,
    pub args: SmallVec<[Symbol; 4]>,
    pub is_const: bool,
    pub is_inlinable: bool,
    pub implementation: FunctionImpl,
    /// Present for pure intrinsics; lets the optimizer fold calls with
    /// immediate arguments.
    pub pure_eval: Option<PureEval>,
}

impl FunctionData {
    pub fn new(id: NamespacedIdentifier, return_type: TypeInfo) -> Self {
        FunctionData {
            id,
            return_type,
            args: SmallVec::new(),
            is_const: false,
            is_inlinable: false,
            implementation: FunctionImpl::Unresolved,
            pure_eval: None,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = Symbol>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn arg_types(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        self.args.iter().map(|a| a.type_info)
    }

    /// Exact signature match: same argument count and types.
    pub fn matches_exact(&self, arg_types: &[TypeInfo]) -> bool {
        self.args.len() == arg_types.len()
            && self.arg_types().zip(arg_types).all(|(a, b)| a == *b)
    }

    /// Compatible match: argument types may coerce per numeric policy.
    pub fn matches_compatible(&self, arg_types: &[TypeInfo], relaxed_floats: bool) -> bool {
        self.args.len() == arg_types.len()
            && self.arg_types().zip(arg_types).all(|(a, b)| {
                a.register_type()
                    .matches_type(b.register_type(), relaxed_floats)
            })
    }

    /// Render the signature for diagnostics: `float sin(float)`.
    pub fn signature(&self, interner: &StringInterner) -> String {
        let args: Vec<String> = self
            .arg_types()
            .map(|t| match t {
                TypeInfo::Primitive(p) => p.as_str().to_owned(),
                TypeInfo::Complex(_) => "struct".to_owned(),
            })
            .collect();
        format!(
            "{} {}({})",
            match self.return_type {
                TypeInfo::Primitive(p) => p.as_str(),
                TypeInfo::Complex(_) => "struct",
            },
            self.id.display(interner),
            args.join(", ")
        )
    }
}

/// A named bag of overloads plus nested constants (`Math`, `Console`, a
/// compiled class's methods).
#[derive(Clone, Debug, Default)]
pub struct FunctionClass {
    pub id: Option<NamespacedIdentifier>,
    functions: Vec<FunctionData>,
}

impl FunctionClass {
    pub fn new(id: NamespacedIdentifier) -> Self {
        FunctionClass {
            id: Some(id),
            functions: Vec::new(),
        }
    }

    pub fn add(&mut self, function: FunctionData) {
        self.functions.push(function);
    }

    pub fn functions(&self) -> &[FunctionData] {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut [FunctionData] {
        &mut self.functions
    }

    /// Overload resolution: prefer an exact signature match, fall back to a
    /// unique type-compatible one.
    pub fn resolve_overload(
        &self,
        name: &NamespacedIdentifier,
        arg_types: &[TypeInfo],
        relaxed_floats: bool,
        span: Span,
        interner: &StringInterner,
    ) -> CompileResult<&FunctionData> {
        let candidates: Vec<&FunctionData> = self
            .functions
            .iter()
            .filter(|f| f.id.id() == name.id())
            .collect();
        if candidates.is_empty() {
            return Err(CompileError::UndefinedSymbol {
                name: name.display(interner).to_string(),
                span,
            });
        }

        if let Some(exact) = candidates.iter().find(|f| f.matches_exact(arg_types)) {
            return Ok(exact);
        }

        let compatible: Vec<&&FunctionData> = candidates
            .iter()
            .filter(|f| f.matches_compatible(arg_types, relaxed_floats))
            .collect();
        match compatible.len() {
            1 => Ok(compatible[0]),
            0 => Err(CompileError::NoMatchingOverload {
                name: name.display(interner).to_string(),
                signature: arg_types
                    .iter()
                    .map(|t| t.register_type().as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                span,
            }),
            _ => Err(CompileError::AmbiguousOverload {
                name: name.display(interner).to_string(),
                span,
            }),
        }
    }
}

/// Helper for building intrinsic signatures tersely.
pub fn primitive_args(
    class: &NamespacedIdentifier,
    types: &[Types],
    interner: &mut StringInterner,
) -> SmallVec<[Symbol; 4]> {
    types
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let name = interner.intern(&format!("a{i}"));
            Symbol::new(class.child(name), TypeInfo::Primitive(t))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snex_ir::Name;

    fn id(interner: &mut StringInterner, s: &str) -> NamespacedIdentifier {
        NamespacedIdentifier::new(interner.intern(s))
    }

    fn fn_with(
        interner: &mut StringInterner,
        name: &str,
        ret: Types,
        args: &[Types],
    ) -> FunctionData {
        let fid = id(interner, name);
        let args = primitive_args(&fid, args, interner);
        FunctionData::new(fid, TypeInfo::Primitive(ret)).with_args(args)
    }

    #[test]
    fn exact_match_wins_over_compatible() {
        let mut i = StringInterner::new();
        let mut class = FunctionClass::new(id(&mut i, "Math"));
        class.add(fn_with(&mut i, "abs", Types::Float, &[Types::Float]));
        class.add(fn_with(&mut i, "abs", Types::Double, &[Types::Double]));
        class.add(fn_with(&mut i, "abs", Types::Integer, &[Types::Integer]));

        let name = id(&mut i, "abs");
        let found = class
            .resolve_overload(
                &name,
                &[TypeInfo::Primitive(Types::Double)],
                true,
                Span::DUMMY,
                &i,
            )
            .expect("resolve");
        assert_eq!(found.return_type, TypeInfo::Primitive(Types::Double));
    }

    #[test]
    fn no_match_reports_signature() {
        let mut i = StringInterner::new();
        let mut class = FunctionClass::new(id(&mut i, "Math"));
        class.add(fn_with(&mut i, "sin", Types::Double, &[Types::Double]));

        let name = id(&mut i, "sin");
        let err = class
            .resolve_overload(
                &name,
                &[
                    TypeInfo::Primitive(Types::Double),
                    TypeInfo::Primitive(Types::Double),
                ],
                true,
                Span::DUMMY,
                &i,
            )
            .unwrap_err();
        assert!(err.to_string().contains("no matching overload"));
    }

    #[test]
    fn unknown_name_is_undefined() {
        let mut i = StringInterner::new();
        let class = FunctionClass::new(id(&mut i, "Math"));
        let name = id(&mut i, "nope");
        let err = class
            .resolve_overload(&name, &[], true, Span::DUMMY, &i)
            .unwrap_err();
        assert!(err.to_string().contains("undefined"));
    }

    #[test]
    fn names_are_matched_by_trailing_segment() {
        let mut i = StringInterner::new();
        let math = i.intern("Math");
        let sin: Name = i.intern("sin");
        let qualified = NamespacedIdentifier::new(math).child(sin);
        let mut class = FunctionClass::new(NamespacedIdentifier::new(math));
        class.add(
            FunctionData::new(qualified.clone(), TypeInfo::Primitive(Types::Double)).with_args(
                primitive_args(&qualified, &[Types::Double], &mut i),
            ),
        );
        class
            .resolve_overload(
                &qualified,
                &[TypeInfo::Primitive(Types::Double)],
                true,
                Span::DUMMY,
                &i,
            )
            .expect("resolve");
    }
}
