//! Template registry with lazy, memoized instantiation.
//!
//! A template declaration records its parameter list and the token range of
//! its body; nothing is compiled until concrete arguments are supplied.
//! Instantiations are memoized by (template id, argument list) so repeated
//! use of the same arguments reuses the generated type or function.

use rustc_hash::FxHashMap;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    ComplexTypeId, Name, NamespacedIdentifier, Span, StringInterner, TokenRange, TypeInfo,
};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TemplateParamKind {
    /// `typename T`
    Type,
    /// `int N`
    IntConstant,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TemplateParameter {
    pub name: Name,
    pub kind: TemplateParamKind,
}

/// A concrete argument supplied at an instantiation site.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TemplateArg {
    Type(TypeInfo),
    Constant(i64),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TemplateKind {
    Struct,
    Function,
}

/// A registered, not-yet-instantiated template.
#[derive(Clone, Debug)]
pub struct TemplateObject {
    pub id: NamespacedIdentifier,
    pub kind: TemplateKind,
    pub parameters: Vec<TemplateParameter>,
    /// Captured declaration tokens, re-parsed per instantiation with the
    /// parameters bound.
    pub body_tokens: TokenRange,
}

/// Result of one instantiation, cached by the registry.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Instantiation {
    Struct(ComplexTypeId),
    /// Index of the generated function in the program's function list.
    Function(u32),
}

#[derive(Default)]
pub struct TemplateRegistry {
    templates: FxHashMap<NamespacedIdentifier, TemplateObject>,
    instances: FxHashMap<(NamespacedIdentifier, Vec<TemplateArg>), Instantiation>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: TemplateObject) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &NamespacedIdentifier) -> Option<&TemplateObject> {
        self.templates.get(id)
    }

    pub fn is_template(&self, id: &NamespacedIdentifier) -> bool {
        self.templates.contains_key(id)
    }

    /// Validate an argument list against a template's parameter list.
    pub fn check_arguments(
        &self,
        id: &NamespacedIdentifier,
        args: &[TemplateArg],
        span: Span,
        interner: &StringInterner,
    ) -> CompileResult<&TemplateObject> {
        let Some(template) = self.templates.get(id) else {
            return Err(CompileError::TemplateError {
                name: id.display(interner).to_string(),
                reason: "not a registered template".to_owned(),
                span,
            });
        };
        if template.parameters.len() != args.len() {
            return Err(CompileError::TemplateError {
                name: id.display(interner).to_string(),
                reason: format!(
                    "expected {} template arguments, found {}",
                    template.parameters.len(),
                    args.len()
                ),
                span,
            });
        }
        for (param, arg) in template.parameters.iter().zip(args) {
            let ok = matches!(
                (param.kind, arg),
                (TemplateParamKind::Type, TemplateArg::Type(_))
                    | (TemplateParamKind::IntConstant, TemplateArg::Constant(_))
            );
            if !ok {
                return Err(CompileError::TemplateError {
                    name: id.display(interner).to_string(),
                    reason: format!(
                        "argument for '{}' has the wrong kind",
                        interner.resolve(param.name)
                    ),
                    span,
                });
            }
        }
        Ok(template)
    }

    /// Memoized instantiation lookup.
    pub fn instance(
        &self,
        id: &NamespacedIdentifier,
        args: &[TemplateArg],
    ) -> Option<Instantiation> {
        self.instances.get(&(id.clone(), args.to_vec())).copied()
    }

    /// Record the result of an instantiation the driver just performed.
    pub fn memoize(
        &mut self,
        id: NamespacedIdentifier,
        args: Vec<TemplateArg>,
        result: Instantiation,
    ) {
        self.instances.insert((id, args), result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snex_ir::Types;

    #[test]
    fn instantiations_are_memoized() {
        let mut i = StringInterner::new();
        let id = NamespacedIdentifier::new(i.intern("Wrapper"));
        let t = i.intern("T");
        let mut reg = TemplateRegistry::new();
        reg.register(TemplateObject {
            id: id.clone(),
            kind: TemplateKind::Struct,
            parameters: vec![TemplateParameter {
                name: t,
                kind: TemplateParamKind::Type,
            }],
            body_tokens: TokenRange::default(),
        });

        let args = vec![TemplateArg::Type(TypeInfo::Primitive(Types::Float))];
        assert_eq!(reg.instance(&id, &args), None);
        reg.memoize(id.clone(), args.clone(), Instantiation::Struct(ComplexTypeId(7)));
        assert_eq!(
            reg.instance(&id, &args),
            Some(Instantiation::Struct(ComplexTypeId(7)))
        );
        // Different arguments miss the cache.
        let other = vec![TemplateArg::Type(TypeInfo::Primitive(Types::Double))];
        assert_eq!(reg.instance(&id, &other), None);
    }

    #[test]
    fn argument_kind_mismatch_is_reported() {
        let mut i = StringInterner::new();
        let id = NamespacedIdentifier::new(i.intern("Buf"));
        let n = i.intern("N");
        let mut reg = TemplateRegistry::new();
        reg.register(TemplateObject {
            id: id.clone(),
            kind: TemplateKind::Struct,
            parameters: vec![TemplateParameter {
                name: n,
                kind: TemplateParamKind::IntConstant,
            }],
            body_tokens: TokenRange::default(),
        });
        let err = reg
            .check_arguments(
                &id,
                &[TemplateArg::Type(TypeInfo::Primitive(Types::Float))],
                Span::DUMMY,
                &i,
            )
            .unwrap_err();
        assert!(err.to_string().contains("wrong kind"));
    }
}
