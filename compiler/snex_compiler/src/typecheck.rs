//! Type checking and call binding.
//!
//! Assigns every node its resolved type, inserts numeric casts where the
//! coercion policy allows them, fills struct member offsets, resolves
//! `auto` and loop-iterator types, and binds every call node to a concrete
//! [`Callee`] so later passes never repeat overload resolution.
//!
//! The numeric promotion order is `int < float < double`. Mixing `float`
//! and `double` implicitly is only legal under the relaxed float policy;
//! an explicit cast always works.

use crate::functions::{CallMap, Callee, FunctionTable};
use crate::intrinsics::EventAccessors;
use smallvec::SmallVec;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    ComplexTypeId, LoopKind, NamespacedIdentifier, NodeId, NodeKind, Span, StringInterner,
    SymbolFlags, SyntaxTree, TypeInfo, Types,
};
use snex_types::{
    ComplexTypeKind, ComplexTypeRegistry, FunctionImpl, NamespaceHandler, PureEval, SymbolType,
    Visibility,
};

pub struct TypecheckCtx<'a> {
    pub tree: &'a mut SyntaxTree,
    pub interner: &'a StringInterner,
    pub namespaces: &'a mut NamespaceHandler,
    pub complex_types: &'a ComplexTypeRegistry,
    pub functions: &'a FunctionTable,
    pub calls: &'a mut CallMap,
    pub events: EventAccessors,
    pub relaxed_floats: bool,
    /// Declared return type of the function being checked.
    pub return_type: Option<TypeInfo>,
    /// Struct type when checking a method body; members and sibling
    /// methods are reachable without an explicit receiver.
    pub method_of: Option<ComplexTypeId>,
}

/// Result type of a numeric binary operation.
pub fn promote(a: Types, b: Types) -> Types {
    if a == Types::Double || b == Types::Double {
        Types::Double
    } else if a == Types::Float || b == Types::Float {
        Types::Float
    } else {
        Types::Integer
    }
}

fn mismatch(expected: impl Into<String>, found: Types, span: Span) -> CompileError {
    CompileError::TypeMismatch {
        expected: expected.into(),
        found: found.as_str().to_owned(),
        span,
    }
}

/// Extracted call-binding info, detached from the function table borrow.
struct ResolvedCall {
    return_type: TypeInfo,
    implementation: FunctionImpl,
    pure_eval: Option<PureEval>,
    param_types: SmallVec<[Types; 4]>,
}

impl TypecheckCtx<'_> {
    /// Coerce `expr` to primitive type `to`, inserting a cast node when the
    /// policy allows the conversion. Returns the node to use in place of
    /// `expr`.
    fn coerce(&mut self, expr: NodeId, to: Types, span: Span) -> CompileResult<NodeId> {
        let from = self.tree.ty(expr).register_type();
        if from == to {
            return Ok(expr);
        }
        if !from.is_numeric() || !to.is_numeric() {
            return Err(mismatch(to.as_str(), from, span));
        }
        if from.is_float() && to.is_float() && !self.relaxed_floats {
            return Err(mismatch(to.as_str(), from, span));
        }
        let cast = self.tree.add(NodeKind::Cast { target: to, expr }, span);
        self.tree.set_ty(cast, TypeInfo::Primitive(to));
        Ok(cast)
    }

    fn require_numeric(&self, expr: NodeId) -> CompileResult<Types> {
        let ty = self.tree.ty(expr).register_type();
        if !ty.is_numeric() {
            return Err(mismatch("a numeric value", ty, self.tree.node(expr).span));
        }
        Ok(ty)
    }

    /// The struct type a function belongs to, when its parent path names
    /// a registered struct.
    fn struct_owner(&self, id: &NamespacedIdentifier) -> Option<ComplexTypeId> {
        let parent = id.parent()?;
        let item = self.namespaces.get(&parent)?;
        if item.kind != SymbolType::Struct {
            return None;
        }
        match item.symbol.type_info {
            TypeInfo::Complex(type_id) => Some(type_id),
            TypeInfo::Primitive(_) => None,
        }
    }

    fn resolve_call(
        &self,
        id: &NamespacedIdentifier,
        arg_types: &[TypeInfo],
        span: Span,
    ) -> CompileResult<ResolvedCall> {
        let f = self
            .functions
            .resolve(id, arg_types, self.relaxed_floats, span, self.interner)?;
        Ok(ResolvedCall {
            return_type: f.return_type,
            implementation: f.implementation,
            pure_eval: f.pure_eval,
            param_types: f.arg_types().map(TypeInfo::register_type).collect(),
        })
    }
}

pub fn typecheck(cx: &mut TypecheckCtx<'_>, node: NodeId) -> CompileResult<TypeInfo> {
    let span = cx.tree.node(node).span;
    let ty = match cx.tree.kind(node) {
        NodeKind::Immediate(v) => TypeInfo::Primitive(v.get_type()),
        NodeKind::Noop => TypeInfo::VOID,

        NodeKind::VariableReference { symbol } => {
            let mut ty = symbol.type_info;
            // Loop iterators and `auto` locals resolve their type after
            // this reference was created; re-fetch the registered symbol.
            if ty.is_dynamic() {
                let id = symbol.id.clone();
                if let Some(item) = cx.namespaces.get(&id) {
                    ty = item.symbol.type_info;
                }
                if ty.is_dynamic() {
                    return Err(CompileError::UnresolvedAuto {
                        name: id.display(cx.interner).to_string(),
                        span,
                    });
                }
                if let NodeKind::VariableReference { symbol } = &mut cx.tree.node_mut(node).kind {
                    symbol.type_info = ty;
                }
            }
            ty
        }

        NodeKind::BinaryOp { lhs, rhs, .. } => {
            let (lhs, rhs) = (*lhs, *rhs);
            typecheck(cx, lhs)?;
            typecheck(cx, rhs)?;
            let lt = cx.require_numeric(lhs)?;
            let rt = cx.require_numeric(rhs)?;
            let common = promote(lt, rt);
            let new_lhs = cx.coerce(lhs, common, span)?;
            let new_rhs = cx.coerce(rhs, common, span)?;
            if let NodeKind::BinaryOp { lhs, rhs, .. } = &mut cx.tree.node_mut(node).kind {
                *lhs = new_lhs;
                *rhs = new_rhs;
            }
            TypeInfo::Primitive(common)
        }

        NodeKind::Compare { lhs, rhs, .. } => {
            let (lhs, rhs) = (*lhs, *rhs);
            typecheck(cx, lhs)?;
            typecheck(cx, rhs)?;
            let lt = cx.require_numeric(lhs)?;
            let rt = cx.require_numeric(rhs)?;
            let common = promote(lt, rt);
            let new_lhs = cx.coerce(lhs, common, span)?;
            let new_rhs = cx.coerce(rhs, common, span)?;
            if let NodeKind::Compare { lhs, rhs, .. } = &mut cx.tree.node_mut(node).kind {
                *lhs = new_lhs;
                *rhs = new_rhs;
            }
            TypeInfo::Primitive(Types::Integer)
        }

        NodeKind::Logical { lhs, rhs, .. } => {
            let (lhs, rhs) = (*lhs, *rhs);
            typecheck(cx, lhs)?;
            typecheck(cx, rhs)?;
            cx.require_numeric(lhs)?;
            cx.require_numeric(rhs)?;
            TypeInfo::Primitive(Types::Integer)
        }

        NodeKind::Negation { expr } => {
            let expr = *expr;
            typecheck(cx, expr)?;
            TypeInfo::Primitive(cx.require_numeric(expr)?)
        }

        NodeKind::LogicalNot { expr } => {
            let expr = *expr;
            typecheck(cx, expr)?;
            cx.require_numeric(expr)?;
            TypeInfo::Primitive(Types::Integer)
        }

        NodeKind::Cast { target, expr } => {
            let (target, expr) = (*target, *expr);
            typecheck(cx, expr)?;
            cx.require_numeric(expr)?;
            TypeInfo::Primitive(target)
        }

        NodeKind::Assignment {
            target,
            value,
            is_first,
            ..
        } => {
            let (target, value, is_first) = (*target, *value, *is_first);
            typecheck(cx, value)?;
            let target_ty = typecheck(cx, target)?;

            if let NodeKind::VariableReference { symbol } = cx.tree.kind(target) {
                if symbol.flags.contains(SymbolFlags::CONST) && !is_first {
                    return Err(CompileError::ConstAssignment {
                        name: symbol.id.display(cx.interner).to_string(),
                        span,
                    });
                }
            } else if !matches!(
                cx.tree.kind(target),
                NodeKind::Subscript { .. } | NodeKind::DotOperator { .. }
            ) {
                return Err(mismatch(
                    "an assignable expression",
                    cx.tree.ty(target).register_type(),
                    span,
                ));
            }

            let new_value = cx.coerce(value, target_ty.register_type(), span)?;
            if let NodeKind::Assignment { value, .. } = &mut cx.tree.node_mut(node).kind {
                *value = new_value;
            }
            target_ty
        }

        NodeKind::Increment { target, .. } => {
            let target = *target;
            let ty = typecheck(cx, target)?;
            if ty.register_type() != Types::Integer {
                return Err(mismatch("int", ty.register_type(), span));
            }
            TypeInfo::Primitive(Types::Integer)
        }

        NodeKind::FunctionCall { .. } => typecheck_call(cx, node, span)?,

        NodeKind::Subscript { parent, index } => {
            let (parent, index) = (*parent, *index);
            let parent_ty = typecheck(cx, parent)?;
            let Some(element) = cx.complex_types.element_type(parent_ty) else {
                return Err(mismatch(
                    "a span, dyn or block",
                    parent_ty.register_type(),
                    span,
                ));
            };
            let index_ty = typecheck(cx, index)?;
            if index_ty.register_type() != Types::Integer {
                return Err(CompileError::NonIntegerIndex { span });
            }
            element
        }

        NodeKind::DotOperator { parent, member, .. } => {
            let (parent, member) = (*parent, *member);
            let parent_ty = typecheck(cx, parent)?;
            let TypeInfo::Complex(type_id) = parent_ty else {
                return Err(mismatch(
                    "a struct value",
                    parent_ty.register_type(),
                    span,
                ));
            };
            let complex = cx.complex_types.get(type_id);
            let Some(m) = complex.member(member) else {
                return Err(CompileError::UndefinedSymbol {
                    name: cx.interner.resolve(member).to_owned(),
                    span,
                });
            };
            if m.visibility != Visibility::Public && cx.method_of != Some(type_id) {
                return Err(CompileError::NotAccessible {
                    name: cx.interner.resolve(member).to_owned(),
                    visibility: m.visibility.as_str(),
                    span,
                });
            }
            let (offset, member_ty) = (m.offset, m.ty);
            if let NodeKind::DotOperator {
                resolved_offset, ..
            } = &mut cx.tree.node_mut(node).kind
            {
                *resolved_offset = Some(offset);
            }
            member_ty
        }

        NodeKind::TernaryOp {
            cond,
            if_true,
            if_false,
        } => {
            let (cond, if_true, if_false) = (*cond, *if_true, *if_false);
            typecheck(cx, cond)?;
            cx.require_numeric(cond)?;
            typecheck(cx, if_true)?;
            typecheck(cx, if_false)?;
            let common = promote(cx.require_numeric(if_true)?, cx.require_numeric(if_false)?);
            let new_true = cx.coerce(if_true, common, span)?;
            let new_false = cx.coerce(if_false, common, span)?;
            if let NodeKind::TernaryOp {
                if_true, if_false, ..
            } = &mut cx.tree.node_mut(node).kind
            {
                *if_true = new_true;
                *if_false = new_false;
            }
            TypeInfo::Primitive(common)
        }

        NodeKind::IfStatement {
            cond,
            then_branch,
            else_branch,
        } => {
            let (cond, then_branch, else_branch) = (*cond, *then_branch, *else_branch);
            typecheck(cx, cond)?;
            cx.require_numeric(cond)?;
            typecheck(cx, then_branch)?;
            if let Some(else_branch) = else_branch {
                typecheck(cx, else_branch)?;
            }
            TypeInfo::VOID
        }

        NodeKind::Loop {
            kind,
            iterator,
            target,
            body,
        } => {
            let (kind, target, body) = (*kind, *target, *body);
            let iterator_id = iterator.id.clone();
            let target_ty = typecheck(cx, target)?;
            let element = match (kind, target_ty) {
                (LoopKind::Block, TypeInfo::Primitive(Types::Block)) => {
                    TypeInfo::Primitive(Types::Float)
                }
                (_, ty) => cx.complex_types.element_type(ty).ok_or_else(|| {
                    mismatch("an iterable value", ty.register_type(), span)
                })?,
            };
            if let Some(item) = cx.namespaces.get_mut(&iterator_id) {
                item.symbol.type_info = element;
            }
            if let NodeKind::Loop { iterator, .. } = &mut cx.tree.node_mut(node).kind {
                iterator.type_info = element;
            }
            typecheck(cx, body)?;
            TypeInfo::VOID
        }

        NodeKind::ReturnStatement { expr } => {
            let expr = *expr;
            let expected = cx.return_type.unwrap_or(TypeInfo::VOID);
            match expr {
                Some(expr) => {
                    typecheck(cx, expr)?;
                    if expected.is_void() {
                        return Err(mismatch(
                            "void",
                            cx.tree.ty(expr).register_type(),
                            span,
                        ));
                    }
                    let new_expr = cx.coerce(expr, expected.register_type(), span)?;
                    if let NodeKind::ReturnStatement { expr } = &mut cx.tree.node_mut(node).kind {
                        *expr = Some(new_expr);
                    }
                }
                None => {
                    if !expected.is_void() {
                        return Err(mismatch(expected.register_type().as_str(), Types::Void, span));
                    }
                }
            }
            TypeInfo::VOID
        }

        NodeKind::StatementBlock { statements, .. } => {
            let statements: SmallVec<[NodeId; 8]> = statements.clone();
            for stmt in statements {
                typecheck(cx, stmt)?;
            }
            TypeInfo::VOID
        }

        NodeKind::VariableDefinition { symbol, init } => {
            let id = symbol.id.clone();
            let declared = symbol.type_info;
            let init = *init;
            match init {
                Some(init) => {
                    let init_ty = typecheck(cx, init)?;
                    if declared.is_dynamic() {
                        if init_ty.is_dynamic() {
                            return Err(CompileError::UnresolvedAuto {
                                name: id.display(cx.interner).to_string(),
                                span,
                            });
                        }
                        if let NodeKind::VariableDefinition { symbol, .. } =
                            &mut cx.tree.node_mut(node).kind
                        {
                            symbol.type_info = init_ty;
                        }
                        if let Some(item) = cx.namespaces.get_mut(&id) {
                            item.symbol.type_info = init_ty;
                        }
                    } else {
                        let new_init = cx.coerce(init, declared.register_type(), span)?;
                        if let NodeKind::VariableDefinition { init, .. } =
                            &mut cx.tree.node_mut(node).kind
                        {
                            *init = Some(new_init);
                        }
                    }
                }
                None => {
                    if declared.is_dynamic() {
                        return Err(CompileError::UnresolvedAuto {
                            name: id.display(cx.interner).to_string(),
                            span,
                        });
                    }
                }
            }
            TypeInfo::VOID
        }

        NodeKind::ComplexTypeDefinition { symbol, init, .. } => {
            let declared = symbol.type_info;
            let init: SmallVec<[NodeId; 4]> = init.clone();
            let element = cx
                .complex_types
                .element_type(declared)
                .map(TypeInfo::register_type);
            for (i, expr) in init.iter().enumerate() {
                typecheck(cx, *expr)?;
                if let Some(element) = element {
                    let new_expr = cx.coerce(*expr, element, span)?;
                    if new_expr != *expr {
                        if let NodeKind::ComplexTypeDefinition { init, .. } =
                            &mut cx.tree.node_mut(node).kind
                        {
                            init[i] = new_expr;
                        }
                    }
                }
            }
            TypeInfo::VOID
        }

        NodeKind::Function(_) | NodeKind::ClassStatement { .. } => TypeInfo::VOID,
    };
    cx.tree.set_ty(node, ty);
    Ok(ty)
}

fn typecheck_call(
    cx: &mut TypecheckCtx<'_>,
    node: NodeId,
    span: Span,
) -> CompileResult<TypeInfo> {
    let NodeKind::FunctionCall { name, object, args } = cx.tree.kind(node) else {
        unreachable!("typecheck_call on a non-call node");
    };
    let name = name.clone();
    let object = *object;
    let args: SmallVec<[NodeId; 4]> = args.clone();

    for arg in &args {
        typecheck(cx, *arg)?;
    }

    if let Some(obj) = object {
        let obj_ty = typecheck(cx, obj)?;
        return typecheck_method(cx, node, span, &name, obj, obj_ty, &args);
    }

    let arg_types: Vec<TypeInfo> = args.iter().map(|a| cx.tree.ty(*a)).collect();
    let resolved = cx.resolve_call(&name, &arg_types, span)?;

    let callee = match resolved.implementation {
        FunctionImpl::Native(index) => Callee::Native {
            index,
            return_type: resolved.return_type,
            pure_eval: resolved.pure_eval,
        },
        FunctionImpl::Compiled(index) => {
            let owner = cx.struct_owner(&name);
            if let Some(owner) = owner {
                // A method named without a receiver is only legal inside
                // another method of the same struct.
                if cx.method_of != Some(owner) {
                    return Err(CompileError::MethodCallWithoutObject {
                        name: name.display(cx.interner).to_string(),
                        span,
                    });
                }
            }
            Callee::Compiled {
                index,
                return_type: resolved.return_type,
                method_of: owner,
            }
        }
        FunctionImpl::Unresolved => {
            return Err(CompileError::UndefinedSymbol {
                name: name.display(cx.interner).to_string(),
                span,
            });
        }
    };

    coerce_args(cx, node, &args, &resolved.param_types, span)?;
    cx.calls.insert(node, callee);
    Ok(resolved.return_type)
}

fn typecheck_method(
    cx: &mut TypecheckCtx<'_>,
    node: NodeId,
    span: Span,
    name: &NamespacedIdentifier,
    obj: NodeId,
    obj_ty: TypeInfo,
    args: &[NodeId],
) -> CompileResult<TypeInfo> {
    let method = cx.interner.resolve(name.id()).to_owned();

    match obj_ty {
        TypeInfo::Primitive(Types::Block) => {
            if method == "size" {
                expect_arg_count(&method, args, 0, span)?;
                cx.calls.insert(node, Callee::BlockSize);
                return Ok(TypeInfo::Primitive(Types::Integer));
            }
        }
        TypeInfo::Primitive(Types::Event) => {
            if let Some(index) = cx.events.getter(&method) {
                expect_arg_count(&method, args, 0, span)?;
                cx.calls.insert(node, Callee::EventGetter { index });
                return Ok(TypeInfo::Primitive(Types::Integer));
            }
            if let Some(index) = cx.events.setter(&method) {
                expect_arg_count(&method, args, 1, span)?;
                if !matches!(cx.tree.kind(obj), NodeKind::VariableReference { .. }) {
                    return Err(mismatch("an event variable", Types::Event, span));
                }
                let new_arg = cx.coerce(args[0], Types::Integer, span)?;
                if let NodeKind::FunctionCall { args, .. } = &mut cx.tree.node_mut(node).kind {
                    args[0] = new_arg;
                }
                cx.calls.insert(node, Callee::EventSetter { index });
                return Ok(TypeInfo::VOID);
            }
        }
        TypeInfo::Complex(type_id) => match &cx.complex_types.get(type_id).kind {
            ComplexTypeKind::Span { length, .. } => {
                if method == "size" {
                    expect_arg_count(&method, args, 0, span)?;
                    let length = *length;
                    cx.tree.replace(
                        node,
                        NodeKind::Immediate(snex_ir::VariableStorage::Int(i64::from(length))),
                        TypeInfo::Primitive(Types::Integer),
                    );
                    return Ok(TypeInfo::Primitive(Types::Integer));
                }
            }
            ComplexTypeKind::Dyn { .. } => {
                if method == "size" {
                    expect_arg_count(&method, args, 0, span)?;
                    cx.calls.insert(node, Callee::BlockSize);
                    return Ok(TypeInfo::Primitive(Types::Integer));
                }
            }
            ComplexTypeKind::Struct {
                name: struct_name, ..
            } => {
                let qualified = struct_name.child(name.id());
                let arg_types: Vec<TypeInfo> = args.iter().map(|a| cx.tree.ty(*a)).collect();
                let resolved = cx.resolve_call(&qualified, &arg_types, span)?;
                let FunctionImpl::Compiled(index) = resolved.implementation else {
                    return Err(CompileError::UndefinedSymbol {
                        name: qualified.display(cx.interner).to_string(),
                        span,
                    });
                };
                coerce_args(cx, node, args, &resolved.param_types, span)?;
                cx.calls.insert(
                    node,
                    Callee::Compiled {
                        index,
                        return_type: resolved.return_type,
                        method_of: Some(type_id),
                    },
                );
                return Ok(resolved.return_type);
            }
        },
        TypeInfo::Primitive(_) => {}
    }

    Err(CompileError::NoMatchingOverload {
        name: method,
        signature: obj_ty.register_type().as_str().to_owned(),
        span,
    })
}

fn expect_arg_count(
    name: &str,
    args: &[NodeId],
    expected: usize,
    span: Span,
) -> CompileResult<()> {
    if args.len() != expected {
        return Err(CompileError::ArgumentCount {
            name: name.to_owned(),
            expected,
            found: args.len(),
            span,
        });
    }
    Ok(())
}

fn coerce_args(
    cx: &mut TypecheckCtx<'_>,
    node: NodeId,
    args: &[NodeId],
    param_types: &[Types],
    span: Span,
) -> CompileResult<()> {
    debug_assert_eq!(args.len(), param_types.len());
    for (i, (&arg, &param)) in args.iter().zip(param_types).enumerate() {
        // Complex-typed parameters pass by pointer, no cast applies.
        if param == Types::Pointer {
            continue;
        }
        let new_arg = cx.coerce(arg, param, span)?;
        if new_arg != arg {
            if let NodeKind::FunctionCall { args, .. } = &mut cx.tree.node_mut(node).kind {
                args[i] = new_arg;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsics::register_intrinsics;
    use pretty_assertions::assert_eq;
    use rustc_hash::FxHashMap;
    use snex_ir::{Symbol, VariableStorage};

    struct Fixture {
        interner: StringInterner,
        namespaces: NamespaceHandler,
        complex_types: ComplexTypeRegistry,
        functions: FunctionTable,
        calls: CallMap,
        tree: SyntaxTree,
        events: EventAccessors,
        relaxed: bool,
        return_type: Option<TypeInfo>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut interner = StringInterner::new();
            let mut namespaces = NamespaceHandler::new();
            let mut functions = FunctionTable::new();
            let mut natives = Vec::new();
            let events =
                register_intrinsics(&mut interner, &mut namespaces, &mut functions, &mut natives)
                    .expect("intrinsics");
            Fixture {
                interner,
                namespaces,
                complex_types: ComplexTypeRegistry::new(),
                functions,
                calls: FxHashMap::default(),
                tree: SyntaxTree::new(),
                events,
                relaxed: true,
                return_type: None,
            }
        }

        fn check(&mut self, node: NodeId) -> CompileResult<TypeInfo> {
            let mut cx = TypecheckCtx {
                tree: &mut self.tree,
                interner: &self.interner,
                namespaces: &mut self.namespaces,
                complex_types: &self.complex_types,
                functions: &self.functions,
                calls: &mut self.calls,
                events: self.events,
                relaxed_floats: self.relaxed,
                return_type: self.return_type,
                method_of: None,
            };
            typecheck(&mut cx, node)
        }

        fn imm_int(&mut self, v: i64) -> NodeId {
            self.tree
                .add(NodeKind::Immediate(VariableStorage::Int(v)), Span::DUMMY)
        }

        fn imm_float(&mut self, v: f32) -> NodeId {
            self.tree
                .add(NodeKind::Immediate(VariableStorage::Float(v)), Span::DUMMY)
        }
    }

    #[test]
    fn binary_promotion_inserts_a_cast() {
        let mut f = Fixture::new();
        let a = f.imm_int(2);
        let b = f.imm_float(1.5);
        let sum = f.tree.add(
            NodeKind::BinaryOp {
                op: snex_ir::BinaryOp::Add,
                lhs: a,
                rhs: b,
            },
            Span::DUMMY,
        );
        let ty = f.check(sum).expect("check");
        assert_eq!(ty, TypeInfo::Primitive(Types::Float));
        let NodeKind::BinaryOp { lhs, .. } = f.tree.kind(sum) else {
            panic!("not a binary op");
        };
        assert!(matches!(
            f.tree.kind(*lhs),
            NodeKind::Cast {
                target: Types::Float,
                ..
            }
        ));
    }

    #[test]
    fn strict_floats_reject_implicit_mixing() {
        let mut f = Fixture::new();
        f.relaxed = false;
        let a = f.imm_float(1.0);
        let b = f
            .tree
            .add(NodeKind::Immediate(VariableStorage::Double(2.0)), Span::DUMMY);
        let sum = f.tree.add(
            NodeKind::BinaryOp {
                op: snex_ir::BinaryOp::Add,
                lhs: a,
                rhs: b,
            },
            Span::DUMMY,
        );
        let err = f.check(sum).unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn const_assignment_is_rejected() {
        let mut f = Fixture::new();
        let c = f.interner.intern("c");
        let symbol = Symbol::new(
            NamespacedIdentifier::new(c),
            TypeInfo::Primitive(Types::Integer),
        )
        .with_flags(SymbolFlags::CONST);
        let target = f
            .tree
            .add(NodeKind::VariableReference { symbol }, Span::DUMMY);
        let value = f.imm_int(4);
        let assign = f.tree.add(
            NodeKind::Assignment {
                op: snex_ir::AssignOp::Plain,
                target,
                value,
                is_first: false,
            },
            Span::DUMMY,
        );
        let err = f.check(assign).unwrap_err();
        assert!(matches!(err, CompileError::ConstAssignment { .. }));
    }

    #[test]
    fn subscript_index_must_be_an_integer() {
        let mut f = Fixture::new();
        let b = f.interner.intern("in");
        let symbol = Symbol::new(
            NamespacedIdentifier::new(b),
            TypeInfo::Primitive(Types::Block),
        );
        let parent = f
            .tree
            .add(NodeKind::VariableReference { symbol }, Span::DUMMY);
        let index = f.imm_float(1.0);
        let sub = f
            .tree
            .add(NodeKind::Subscript { parent, index }, Span::DUMMY);
        let err = f.check(sub).unwrap_err();
        assert_eq!(err, CompileError::NonIntegerIndex { span: Span::DUMMY });
    }

    #[test]
    fn block_size_binds_to_a_length_read() {
        let mut f = Fixture::new();
        let b = f.interner.intern("in");
        let size = f.interner.intern("size");
        let symbol = Symbol::new(
            NamespacedIdentifier::new(b),
            TypeInfo::Primitive(Types::Block),
        );
        let obj = f
            .tree
            .add(NodeKind::VariableReference { symbol }, Span::DUMMY);
        let call = f.tree.add(
            NodeKind::FunctionCall {
                name: NamespacedIdentifier::new(size),
                object: Some(obj),
                args: SmallVec::new(),
            },
            Span::DUMMY,
        );
        let ty = f.check(call).expect("check");
        assert_eq!(ty, TypeInfo::Primitive(Types::Integer));
        assert!(matches!(f.calls.get(&call), Some(Callee::BlockSize)));
    }

    #[test]
    fn span_size_folds_to_an_immediate() {
        let mut f = Fixture::new();
        let span_ty = f
            .complex_types
            .register_span(TypeInfo::Primitive(Types::Float), 4);
        let s = f.interner.intern("s");
        let size = f.interner.intern("size");
        let symbol = Symbol::new(NamespacedIdentifier::new(s), TypeInfo::Complex(span_ty));
        let obj = f
            .tree
            .add(NodeKind::VariableReference { symbol }, Span::DUMMY);
        let call = f.tree.add(
            NodeKind::FunctionCall {
                name: NamespacedIdentifier::new(size),
                object: Some(obj),
                args: SmallVec::new(),
            },
            Span::DUMMY,
        );
        f.check(call).expect("check");
        assert_eq!(
            f.tree.kind(call),
            &NodeKind::Immediate(VariableStorage::Int(4))
        );
    }

    #[test]
    fn math_call_binds_to_a_native() {
        let mut f = Fixture::new();
        let sin = NamespacedIdentifier::new(f.interner.intern("Math"))
            .child(f.interner.intern("sin"));
        let arg = f
            .tree
            .add(NodeKind::Immediate(VariableStorage::Double(0.25)), Span::DUMMY);
        let call = f.tree.add(
            NodeKind::FunctionCall {
                name: sin,
                object: None,
                args: smallvec::smallvec![arg],
            },
            Span::DUMMY,
        );
        let ty = f.check(call).expect("check");
        assert_eq!(ty, TypeInfo::Primitive(Types::Double));
        assert!(matches!(
            f.calls.get(&call),
            Some(Callee::Native {
                pure_eval: Some(_),
                ..
            })
        ));
    }

    #[test]
    fn return_value_coerces_to_the_declared_type() {
        let mut f = Fixture::new();
        f.return_type = Some(TypeInfo::Primitive(Types::Float));
        let v = f.imm_int(4);
        let ret = f
            .tree
            .add(NodeKind::ReturnStatement { expr: Some(v) }, Span::DUMMY);
        f.check(ret).expect("check");
        let NodeKind::ReturnStatement { expr: Some(expr) } = f.tree.kind(ret) else {
            panic!("not a return");
        };
        assert!(matches!(
            f.tree.kind(*expr),
            NodeKind::Cast {
                target: Types::Float,
                ..
            }
        ));
    }

}
