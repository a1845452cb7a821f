//! Constant folding.
//!
//! Evaluates operations whose operands are immediates, folds branches on
//! immediate conditions, and evaluates pure intrinsic calls with immediate
//! arguments. A constant zero divisor is a compile error here, before any
//! code could run with it.

use super::{OptimizationPass, OptimizeCtx};
use crate::functions::Callee;
use crate::typecheck::promote;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    BinaryOp, CompareOp, LogicalOp, NodeId, NodeKind, TypeInfo, Types, VariableStorage,
};

pub struct ConstantFolding;

fn imm(cx: &OptimizeCtx<'_>, node: NodeId) -> Option<VariableStorage> {
    match cx.tree.kind(node) {
        NodeKind::Immediate(v) => Some(*v),
        _ => None,
    }
}

fn fold_to(cx: &mut OptimizeCtx<'_>, node: NodeId, value: VariableStorage) {
    cx.tree.replace(
        node,
        NodeKind::Immediate(value),
        TypeInfo::Primitive(value.get_type()),
    );
}

fn is_zero(v: VariableStorage) -> bool {
    match v {
        VariableStorage::Int(i) => i == 0,
        VariableStorage::Float(f) => f == 0.0,
        VariableStorage::Double(d) => d == 0.0,
        _ => false,
    }
}

/// Evaluate a binary op over immediates. Both operands are numeric and a
/// zero divisor has already been rejected.
fn eval_binary(op: BinaryOp, a: VariableStorage, b: VariableStorage) -> VariableStorage {
    let common = promote(a.get_type(), b.get_type());
    match common {
        Types::Integer => {
            let (a, b) = (a.to_int(), b.to_int());
            VariableStorage::Int(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div => a.wrapping_div(b),
                BinaryOp::Mod => a.wrapping_rem(b),
            })
        }
        Types::Float => {
            let (a, b) = (a.to_float(), b.to_float());
            VariableStorage::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
            })
        }
        _ => {
            let (a, b) = (a.to_double(), b.to_double());
            VariableStorage::Double(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
            })
        }
    }
}

fn eval_compare(op: CompareOp, a: VariableStorage, b: VariableStorage) -> VariableStorage {
    let (a, b) = (a.to_double(), b.to_double());
    let result = match op {
        CompareOp::Eq => a == b,
        CompareOp::Neq => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    };
    VariableStorage::Int(i64::from(result))
}

impl OptimizationPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "ConstantFolding"
    }

    fn attempt(&self, cx: &mut OptimizeCtx<'_>, node: NodeId) -> CompileResult<bool> {
        let span = cx.tree.node(node).span;
        match cx.tree.kind(node) {
            NodeKind::BinaryOp { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let rv = imm(cx, rhs);
                if matches!(op, BinaryOp::Div | BinaryOp::Mod) && rv.is_some_and(is_zero) {
                    return Err(CompileError::DivisionByZero { span });
                }
                let (Some(a), Some(b)) = (imm(cx, lhs), rv) else {
                    return Ok(false);
                };
                if !a.get_type().is_numeric() || !b.get_type().is_numeric() {
                    return Ok(false);
                }
                fold_to(cx, node, eval_binary(op, a, b));
                Ok(true)
            }

            NodeKind::Compare { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let (Some(a), Some(b)) = (imm(cx, lhs), imm(cx, rhs)) else {
                    return Ok(false);
                };
                fold_to(cx, node, eval_compare(op, a, b));
                Ok(true)
            }

            NodeKind::Logical { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let (Some(a), Some(b)) = (imm(cx, lhs), imm(cx, rhs)) else {
                    return Ok(false);
                };
                let result = match op {
                    LogicalOp::And => a.is_truthy() && b.is_truthy(),
                    LogicalOp::Or => a.is_truthy() || b.is_truthy(),
                };
                fold_to(cx, node, VariableStorage::Int(i64::from(result)));
                Ok(true)
            }

            NodeKind::Negation { expr } => {
                let Some(v) = imm(cx, *expr) else {
                    return Ok(false);
                };
                let value = match v {
                    VariableStorage::Int(i) => VariableStorage::Int(i.wrapping_neg()),
                    VariableStorage::Float(f) => VariableStorage::Float(-f),
                    VariableStorage::Double(d) => VariableStorage::Double(-d),
                    _ => return Ok(false),
                };
                fold_to(cx, node, value);
                Ok(true)
            }

            NodeKind::LogicalNot { expr } => {
                let Some(v) = imm(cx, *expr) else {
                    return Ok(false);
                };
                fold_to(cx, node, VariableStorage::Int(i64::from(!v.is_truthy())));
                Ok(true)
            }

            NodeKind::Cast { target, expr } => {
                let (target, expr) = (*target, *expr);
                let Some(v) = imm(cx, expr) else {
                    return Ok(false);
                };
                if !v.get_type().is_numeric() || !target.is_numeric() {
                    return Ok(false);
                }
                fold_to(cx, node, v.cast_to(target));
                Ok(true)
            }

            NodeKind::TernaryOp {
                cond,
                if_true,
                if_false,
            } => {
                let (cond, if_true, if_false) = (*cond, *if_true, *if_false);
                let Some(c) = imm(cx, cond) else {
                    return Ok(false);
                };
                let chosen = if c.is_truthy() { if_true } else { if_false };
                let kind = cx.tree.kind(chosen).clone();
                let ty = cx.tree.ty(chosen);
                cx.tree.replace(node, kind, ty);
                Ok(true)
            }

            NodeKind::IfStatement {
                cond, then_branch, else_branch,
            } => {
                let (cond, then_branch, else_branch) = (*cond, *then_branch, *else_branch);
                let Some(c) = imm(cx, cond) else {
                    return Ok(false);
                };
                match (c.is_truthy(), else_branch) {
                    (true, _) => {
                        let kind = cx.tree.kind(then_branch).clone();
                        let ty = cx.tree.ty(then_branch);
                        cx.tree.replace(node, kind, ty);
                    }
                    (false, Some(else_branch)) => {
                        let kind = cx.tree.kind(else_branch).clone();
                        let ty = cx.tree.ty(else_branch);
                        cx.tree.replace(node, kind, ty);
                    }
                    (false, None) => {
                        cx.tree.replace(node, NodeKind::Noop, TypeInfo::VOID);
                    }
                }
                Ok(true)
            }

            NodeKind::FunctionCall { args, object, .. } => {
                if object.is_some() {
                    return Ok(false);
                }
                let Some(Callee::Native {
                    pure_eval: Some(eval),
                    ..
                }) = cx.calls.get(&node)
                else {
                    return Ok(false);
                };
                let eval = *eval;
                let args: Vec<NodeId> = args.iter().copied().collect();
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    match imm(cx, arg) {
                        Some(v) => values.push(v),
                        None => return Ok(false),
                    }
                }
                fold_to(cx, node, eval(&values));
                Ok(true)
            }

            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::CallMap;
    use crate::optimize::run_to_fixpoint;
    use pretty_assertions::assert_eq;
    use rustc_hash::FxHashMap;
    use snex_ir::{Span, SyntaxTree};

    fn fold(tree: &mut SyntaxTree, root: NodeId) -> CompileResult<usize> {
        let calls = CallMap::default();
        let mut cx = OptimizeCtx { tree, calls: &calls, root };
        run_to_fixpoint(&mut cx, &[&ConstantFolding])
    }

    fn int(tree: &mut SyntaxTree, v: i64) -> NodeId {
        tree.add(NodeKind::Immediate(VariableStorage::Int(v)), Span::DUMMY)
    }

    #[test]
    fn nested_arithmetic_folds_completely() {
        let mut tree = SyntaxTree::new();
        let two = int(&mut tree, 2);
        let three = int(&mut tree, 3);
        let four = int(&mut tree, 4);
        let mul = tree.add(
            NodeKind::BinaryOp { op: BinaryOp::Mul, lhs: two, rhs: three },
            Span::DUMMY,
        );
        let sum = tree.add(
            NodeKind::BinaryOp { op: BinaryOp::Add, lhs: mul, rhs: four },
            Span::DUMMY,
        );
        fold(&mut tree, sum).expect("fold");
        assert_eq!(tree.kind(sum), &NodeKind::Immediate(VariableStorage::Int(10)));
    }

    #[test]
    fn constant_zero_divisor_is_an_error() {
        let mut tree = SyntaxTree::new();
        let six = int(&mut tree, 6);
        let zero = int(&mut tree, 0);
        let div = tree.add(
            NodeKind::BinaryOp { op: BinaryOp::Div, lhs: six, rhs: zero },
            Span::DUMMY,
        );
        let err = fold(&mut tree, div).unwrap_err();
        assert_eq!(err.to_string(), "Division by zero");
    }

    #[test]
    fn zero_divisor_fires_even_with_unknown_dividend() {
        let mut tree = SyntaxTree::new();
        let x = tree.add(
            NodeKind::VariableReference {
                symbol: snex_ir::Symbol::new(
                    snex_ir::NamespacedIdentifier::new(snex_ir::StringInterner::new().intern("x")),
                    TypeInfo::Primitive(Types::Integer),
                ),
            },
            Span::DUMMY,
        );
        let zero = int(&mut tree, 0);
        let div = tree.add(
            NodeKind::BinaryOp { op: BinaryOp::Div, lhs: x, rhs: zero },
            Span::DUMMY,
        );
        let err = fold(&mut tree, div).unwrap_err();
        assert!(matches!(err, CompileError::DivisionByZero { .. }));
    }

    #[test]
    fn immediate_condition_selects_a_branch() {
        let mut tree = SyntaxTree::new();
        let cond = int(&mut tree, 0);
        let t = int(&mut tree, 1);
        let f = int(&mut tree, 2);
        let ternary = tree.add(
            NodeKind::TernaryOp { cond, if_true: t, if_false: f },
            Span::DUMMY,
        );
        fold(&mut tree, ternary).expect("fold");
        assert_eq!(
            tree.kind(ternary),
            &NodeKind::Immediate(VariableStorage::Int(2))
        );
    }

    #[test]
    fn dead_if_without_else_becomes_noop() {
        let mut tree = SyntaxTree::new();
        let cond = int(&mut tree, 0);
        let then_branch = int(&mut tree, 1);
        let stmt = tree.add(
            NodeKind::IfStatement { cond, then_branch, else_branch: None },
            Span::DUMMY,
        );
        fold(&mut tree, stmt).expect("fold");
        assert_eq!(tree.kind(stmt), &NodeKind::Noop);
    }

    #[test]
    fn pure_native_calls_fold() {
        use crate::functions::Callee;

        let mut tree = SyntaxTree::new();
        let mut interner = snex_ir::StringInterner::new();
        let abs = snex_ir::NamespacedIdentifier::new(interner.intern("Math"))
            .child(interner.intern("abs"));
        let arg = int(&mut tree, -5);
        let call = tree.add(
            NodeKind::FunctionCall {
                name: abs,
                object: None,
                args: smallvec::smallvec![arg],
            },
            Span::DUMMY,
        );
        fn abs_eval(args: &[VariableStorage]) -> VariableStorage {
            VariableStorage::Int(args[0].to_int().abs())
        }
        let mut calls: CallMap = FxHashMap::default();
        calls.insert(
            call,
            Callee::Native {
                index: 0,
                return_type: TypeInfo::Primitive(Types::Integer),
                pure_eval: Some(abs_eval),
            },
        );
        let mut cx = OptimizeCtx { tree: &mut tree, calls: &calls, root: call };
        run_to_fixpoint(&mut cx, &[&ConstantFolding]).expect("fold");
        assert_eq!(tree.kind(call), &NodeKind::Immediate(VariableStorage::Int(5)));
    }
}
