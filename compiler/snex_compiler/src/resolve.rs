//! Symbol resolution.
//!
//! Walks a statement subtree after parsing: qualifies every variable and
//! function reference against the namespace handler, folds references to
//! compile-time constants into immediates, introduces loop iterator
//! symbols, assigns scopes to statement blocks and emits shadowing
//! warnings.
//!
//! Method-style calls on a namespace (`Math.sin(x)`) parse with the
//! namespace as a receiver object; this pass rewrites them into free
//! qualified calls so overload resolution never sees a fake receiver.

use crate::scope::{ScopeArena, ScopeKind};
use smallvec::SmallVec;
use snex_diagnostic::{CompileError, CompileResult, ErrorCode};
use snex_ir::{
    NamespacedIdentifier, NodeId, NodeKind, ScopeId, Span, StringInterner, SyntaxTree, TypeInfo,
};
use snex_types::{NamespaceHandler, SymbolType, Visibility};

/// A warning collected during a pass; turned into a full `Diagnostic`
/// (with line number) once the driver has the source text at hand.
#[derive(Clone, Debug)]
pub struct PendingWarning {
    pub code: ErrorCode,
    pub message: String,
    pub span: Span,
}

pub struct ResolveCtx<'a> {
    pub tree: &'a mut SyntaxTree,
    pub interner: &'a StringInterner,
    pub namespaces: &'a mut NamespaceHandler,
    pub scopes: &'a mut ScopeArena,
    pub warnings: &'a mut Vec<PendingWarning>,
}

/// True when the registered item holds a runtime or compile-time value,
/// as opposed to a namespace-like item (function, struct, alias).
fn is_value_item(kind: SymbolType) -> bool {
    matches!(
        kind,
        SymbolType::Variable
            | SymbolType::Constant
            | SymbolType::EnumValue
            | SymbolType::TemplateConstant
    )
}

pub fn resolve(cx: &mut ResolveCtx<'_>, node: NodeId, scope: ScopeId) -> CompileResult<()> {
    let span = cx.tree.node(node).span;
    match cx.tree.kind(node) {
        NodeKind::Immediate(_) | NodeKind::Noop => {}

        NodeKind::VariableReference { symbol } => {
            if let Some(v) = symbol.constant {
                cx.tree
                    .replace(node, NodeKind::Immediate(v), TypeInfo::Primitive(v.get_type()));
                return Ok(());
            }
            let id = symbol.id.clone();
            let (qualified, item) = cx.namespaces.resolve(&id, span, cx.interner)?;
            // Block-locals are recorded on their statement block's scope;
            // a declaration from a block that does not enclose this
            // reference is out of scope even though it is still registered
            // under the function's namespace path.
            if cx.scopes.declares(&qualified) && !cx.scopes.is_visible(scope, &qualified) {
                return Err(CompileError::UndefinedSymbol {
                    name: qualified.display(cx.interner).to_string(),
                    span,
                });
            }
            if let Some(v) = item.symbol.constant {
                cx.tree
                    .replace(node, NodeKind::Immediate(v), TypeInfo::Primitive(v.get_type()));
            } else {
                let resolved = item.symbol.clone();
                if let NodeKind::VariableReference { symbol } = &mut cx.tree.node_mut(node).kind {
                    *symbol = resolved;
                }
            }
        }

        NodeKind::BinaryOp { lhs, rhs, .. }
        | NodeKind::Compare { lhs, rhs, .. }
        | NodeKind::Logical { lhs, rhs, .. } => {
            let (lhs, rhs) = (*lhs, *rhs);
            resolve(cx, lhs, scope)?;
            resolve(cx, rhs, scope)?;
        }

        NodeKind::Negation { expr } | NodeKind::LogicalNot { expr } | NodeKind::Cast { expr, .. } => {
            let expr = *expr;
            resolve(cx, expr, scope)?;
        }

        NodeKind::Assignment { target, value, .. } => {
            let (target, value) = (*target, *value);
            resolve(cx, value, scope)?;
            resolve(cx, target, scope)?;
        }

        NodeKind::Increment { target, .. } => {
            let target = *target;
            resolve(cx, target, scope)?;
        }

        NodeKind::FunctionCall { name, object, args } => {
            let name = name.clone();
            let object = *object;
            let args: SmallVec<[NodeId; 4]> = args.clone();

            if let Some(obj) = object {
                if let NodeKind::VariableReference { symbol } = cx.tree.kind(obj) {
                    let obj_id = symbol.id.clone();
                    let obj_is_value = cx
                        .namespaces
                        .lookup(&obj_id)
                        .is_some_and(|(_, item)| is_value_item(item.kind));
                    if !obj_is_value {
                        let candidate = obj_id.join(&name);
                        if let Some((qualified, item)) = cx.namespaces.lookup(&candidate) {
                            if item.kind == SymbolType::Function {
                                if let NodeKind::FunctionCall { name, object, .. } =
                                    &mut cx.tree.node_mut(node).kind
                                {
                                    *name = qualified;
                                    *object = None;
                                }
                                for arg in args {
                                    resolve(cx, arg, scope)?;
                                }
                                return Ok(());
                            }
                        }
                    }
                }
            }

            if object.is_none() {
                if let Some((qualified, item)) = cx.namespaces.lookup(&name) {
                    if item.kind == SymbolType::Function {
                        if let NodeKind::FunctionCall { name, .. } = &mut cx.tree.node_mut(node).kind
                        {
                            *name = qualified;
                        }
                    }
                }
            }

            if let Some(obj) = object {
                resolve(cx, obj, scope)?;
            }
            for arg in args {
                resolve(cx, arg, scope)?;
            }
        }

        NodeKind::Subscript { parent, index } => {
            let (parent, index) = (*parent, *index);
            resolve(cx, parent, scope)?;
            resolve(cx, index, scope)?;
        }

        NodeKind::DotOperator { parent, member, .. } => {
            let (parent, member) = (*parent, *member);
            // `Math.PI` parses as a member access on a namespace.
            if let NodeKind::VariableReference { symbol } = cx.tree.kind(parent) {
                let obj_id = symbol.id.clone();
                let obj_is_value = cx
                    .namespaces
                    .lookup(&obj_id)
                    .is_some_and(|(_, item)| is_value_item(item.kind));
                if !obj_is_value {
                    let candidate = obj_id.child(member);
                    if let Some((_, item)) = cx.namespaces.lookup(&candidate) {
                        if let Some(v) = item.symbol.constant {
                            cx.tree.replace(
                                node,
                                NodeKind::Immediate(v),
                                TypeInfo::Primitive(v.get_type()),
                            );
                            return Ok(());
                        }
                    }
                }
            }
            resolve(cx, parent, scope)?;
        }

        NodeKind::TernaryOp {
            cond,
            if_true,
            if_false,
        } => {
            let (cond, if_true, if_false) = (*cond, *if_true, *if_false);
            resolve(cx, cond, scope)?;
            resolve(cx, if_true, scope)?;
            resolve(cx, if_false, scope)?;
        }

        NodeKind::IfStatement {
            cond,
            then_branch,
            else_branch,
        } => {
            let (cond, then_branch, else_branch) = (*cond, *then_branch, *else_branch);
            resolve(cx, cond, scope)?;
            resolve(cx, then_branch, scope)?;
            if let Some(else_branch) = else_branch {
                resolve(cx, else_branch, scope)?;
            }
        }

        NodeKind::Loop {
            iterator,
            target,
            body,
            ..
        } => {
            let iterator = iterator.clone();
            let (target, body) = (*target, *body);
            resolve(cx, target, scope)?;
            // The iterator is declared by the loop head itself; its type is
            // filled in from the target during type checking.
            if cx.namespaces.get(&iterator.id).is_none() {
                cx.namespaces.register(
                    iterator,
                    SymbolType::Variable,
                    Visibility::Public,
                    span,
                    cx.interner,
                )?;
            }
            resolve(cx, body, scope)?;
        }

        NodeKind::ReturnStatement { expr } => {
            if let Some(expr) = *expr {
                resolve(cx, expr, scope)?;
            }
        }

        NodeKind::StatementBlock {
            statements,
            scope: block_scope,
        } => {
            let statements: SmallVec<[NodeId; 8]> = statements.clone();
            let inner = match block_scope {
                Some(s) => *s,
                None => {
                    let s = cx.scopes.add(scope, ScopeKind::Anonymous);
                    if let NodeKind::StatementBlock { scope, .. } = &mut cx.tree.node_mut(node).kind
                    {
                        *scope = Some(s);
                    }
                    s
                }
            };
            for stmt in statements {
                resolve(cx, stmt, inner)?;
            }
        }

        NodeKind::VariableDefinition { symbol, init } => {
            let id = symbol.id.clone();
            let init = *init;
            if let Some(init) = init {
                resolve(cx, init, scope)?;
            }
            warn_on_shadow(cx, &id, span);
            cx.scopes.record_declaration(scope, id);
        }

        NodeKind::ComplexTypeDefinition { symbol, init, .. } => {
            let id = symbol.id.clone();
            let init: SmallVec<[NodeId; 4]> = init.clone();
            for expr in init {
                resolve(cx, expr, scope)?;
            }
            cx.scopes.record_declaration(scope, id);
        }

        // Function bodies resolve on their own once parsed; class bodies
        // hold only member defaults (literals) and method definitions.
        NodeKind::Function(_) | NodeKind::ClassStatement { .. } => {}
    }
    Ok(())
}

/// Warn when a local definition's plain name also names a declaration on a
/// shorter namespace path.
fn warn_on_shadow(cx: &mut ResolveCtx<'_>, id: &NamespacedIdentifier, span: Span) {
    let segments = id.segments();
    if segments.len() < 2 {
        return;
    }
    let bare = id.id();
    for depth in (0..segments.len() - 1).rev() {
        let candidate = NamespacedIdentifier::from_path(
            segments[..depth].iter().copied().chain([bare]),
        );
        if cx.namespaces.get(&candidate).is_some() {
            cx.warnings.push(PendingWarning {
                code: ErrorCode::W0001,
                message: format!(
                    "'{}' shadows a declaration in an outer scope",
                    cx.interner.resolve(bare)
                ),
                span,
            });
            return;
        }
    }
}
