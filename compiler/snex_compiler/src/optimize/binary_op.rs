//! Arithmetic strength reduction and identity elimination.

use super::{OptimizationPass, OptimizeCtx};
use snex_diagnostic::CompileResult;
use snex_ir::{AssignOp, BinaryOp, NodeId, NodeKind, VariableStorage};

pub struct BinaryOpOptimization;

fn imm(cx: &OptimizeCtx<'_>, node: NodeId) -> Option<VariableStorage> {
    match cx.tree.kind(node) {
        NodeKind::Immediate(v) => Some(*v),
        _ => None,
    }
}

fn is_one(v: VariableStorage) -> bool {
    match v {
        VariableStorage::Int(i) => i == 1,
        VariableStorage::Float(f) => f == 1.0,
        VariableStorage::Double(d) => d == 1.0,
        _ => false,
    }
}

fn is_zero(v: VariableStorage) -> bool {
    match v {
        VariableStorage::Int(i) => i == 0,
        VariableStorage::Float(f) => f == 0.0,
        VariableStorage::Double(d) => d == 0.0,
        _ => false,
    }
}

// The reciprocal of a float is exact only for finite non-zero powers of
// two (zero mantissa); `x * (1/c)` is then bit-identical to `x / c`.
fn exact_recip_f32(f: f32) -> bool {
    f.is_finite() && f != 0.0 && f.to_bits() & 0x007f_ffff == 0
}

fn exact_recip_f64(d: f64) -> bool {
    d.is_finite() && d != 0.0 && d.to_bits() & 0x000f_ffff_ffff_ffff == 0
}

/// Replace a node with a copy of one of its children, keeping that
/// child's type.
fn collapse_to(cx: &mut OptimizeCtx<'_>, node: NodeId, child: NodeId) {
    let kind = cx.tree.kind(child).clone();
    let ty = cx.tree.ty(child);
    cx.tree.replace(node, kind, ty);
}

impl OptimizationPass for BinaryOpOptimization {
    fn name(&self) -> &'static str {
        // Matches the spelling used by the settings layer.
        "BinaryOpOptimisation"
    }

    fn attempt(&self, cx: &mut OptimizeCtx<'_>, node: NodeId) -> CompileResult<bool> {
        match cx.tree.kind(node) {
            NodeKind::BinaryOp { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let ty = cx.tree.ty(node);
                let rv = imm(cx, rhs);

                // x + 0, x * 1, x / 1 evaluate to x. x * 0 is left alone
                // so NaN operands keep their runtime result.
                if let Some(v) = rv {
                    let identity = match op {
                        BinaryOp::Add | BinaryOp::Sub => is_zero(v),
                        BinaryOp::Mul | BinaryOp::Div => is_one(v),
                        BinaryOp::Mod => false,
                    };
                    if identity {
                        collapse_to(cx, node, lhs);
                        return Ok(true);
                    }
                }

                // a - c becomes a + (-c) for float constants, which the
                // commutativity rules below can then reorder.
                if op == BinaryOp::Sub {
                    if let Some(v) = rv {
                        let negated = match v {
                            VariableStorage::Float(f) => Some(VariableStorage::Float(-f)),
                            VariableStorage::Double(d) => Some(VariableStorage::Double(-d)),
                            _ => None,
                        };
                        if let Some(negated) = negated {
                            cx.tree.node_mut(rhs).kind = NodeKind::Immediate(negated);
                            cx.tree.replace(
                                node,
                                NodeKind::BinaryOp {
                                    op: BinaryOp::Add,
                                    lhs,
                                    rhs,
                                },
                                ty,
                            );
                            return Ok(true);
                        }
                    }
                }

                // Division by a float constant becomes multiplication by
                // its reciprocal when the reciprocal is exact.
                if op == BinaryOp::Div {
                    if let Some(v) = rv {
                        let recip = match v {
                            VariableStorage::Float(f) if exact_recip_f32(f) => {
                                Some(VariableStorage::Float(1.0 / f))
                            }
                            VariableStorage::Double(d) if exact_recip_f64(d) => {
                                Some(VariableStorage::Double(1.0 / d))
                            }
                            _ => None,
                        };
                        if let Some(recip) = recip {
                            cx.tree.node_mut(rhs).kind = NodeKind::Immediate(recip);
                            cx.tree.replace(
                                node,
                                NodeKind::BinaryOp {
                                    op: BinaryOp::Mul,
                                    lhs,
                                    rhs,
                                },
                                ty,
                            );
                            return Ok(true);
                        }
                    }
                }

                // Commutative ops keep an immediate on the right so the
                // code generator can fold it into the instruction.
                if op.is_commutative() && imm(cx, lhs).is_some() && rv.is_none() {
                    cx.tree.replace(
                        node,
                        NodeKind::BinaryOp {
                            op,
                            lhs: rhs,
                            rhs: lhs,
                        },
                        ty,
                    );
                    return Ok(true);
                }

                Ok(false)
            }

            NodeKind::Assignment {
                op: AssignOp::Plain,
                target,
                value,
                is_first: false,
            } => {
                // x = x does nothing.
                let (target, value) = (*target, *value);
                let same = match (cx.tree.kind(target), cx.tree.kind(value)) {
                    (
                        NodeKind::VariableReference { symbol: a },
                        NodeKind::VariableReference { symbol: b },
                    ) => a.id == b.id,
                    _ => false,
                };
                if same {
                    cx.tree
                        .replace(node, NodeKind::Noop, snex_ir::TypeInfo::VOID);
                    return Ok(true);
                }
                Ok(false)
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
    use snex_ir::{
        NamespacedIdentifier, Span, StringInterner, Symbol, SyntaxTree, TypeInfo, Types,
    };

    fn var(tree: &mut SyntaxTree, interner: &mut StringInterner, name: &str) -> NodeId {
        let symbol = Symbol::new(
            NamespacedIdentifier::new(interner.intern(name)),
            TypeInfo::Primitive(Types::Float),
        );
        let node = tree.add(NodeKind::VariableReference { symbol }, Span::DUMMY);
        tree.set_ty(node, TypeInfo::Primitive(Types::Float));
        node
    }

    fn run(tree: &mut SyntaxTree, root: NodeId) -> usize {
        let calls = CallMap::default();
        let mut cx = OptimizeCtx {
            tree,
            calls: &calls,
            root,
        };
        run_to_fixpoint(&mut cx, &[&BinaryOpOptimization]).expect("optimize")
    }

    #[test]
    fn division_by_constant_becomes_reciprocal_multiply() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let x = var(&mut tree, &mut interner, "x");
        let c = tree.add(
            NodeKind::Immediate(VariableStorage::Float(2.0)),
            Span::DUMMY,
        );
        let div = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Div,
                lhs: x,
                rhs: c,
            },
            Span::DUMMY,
        );
        run(&mut tree, div);
        let NodeKind::BinaryOp { op, rhs, .. } = tree.kind(div) else {
            panic!("not a binary op");
        };
        assert_eq!(*op, BinaryOp::Mul);
        assert_eq!(
            tree.kind(*rhs),
            &NodeKind::Immediate(VariableStorage::Float(0.5))
        );
    }

    #[test]
    fn inexact_reciprocal_is_left_alone() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let x = var(&mut tree, &mut interner, "x");
        let c = tree.add(
            NodeKind::Immediate(VariableStorage::Float(3.0)),
            Span::DUMMY,
        );
        let div = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Div,
                lhs: x,
                rhs: c,
            },
            Span::DUMMY,
        );
        assert_eq!(run(&mut tree, div), 0);
        let NodeKind::BinaryOp { op, .. } = tree.kind(div) else {
            panic!("not a binary op");
        };
        assert_eq!(*op, BinaryOp::Div);
    }

    #[test]
    fn negative_power_of_two_divisor_rewrites() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let x = var(&mut tree, &mut interner, "x");
        let c = tree.add(
            NodeKind::Immediate(VariableStorage::Float(-4.0)),
            Span::DUMMY,
        );
        let div = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Div,
                lhs: x,
                rhs: c,
            },
            Span::DUMMY,
        );
        run(&mut tree, div);
        let NodeKind::BinaryOp { op, rhs, .. } = tree.kind(div) else {
            panic!("not a binary op");
        };
        assert_eq!(*op, BinaryOp::Mul);
        assert_eq!(
            tree.kind(*rhs),
            &NodeKind::Immediate(VariableStorage::Float(-0.25))
        );
    }

    #[test]
    fn float_subtraction_becomes_addition_of_negated_constant() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let x = var(&mut tree, &mut interner, "x");
        let c = tree.add(
            NodeKind::Immediate(VariableStorage::Float(1.5)),
            Span::DUMMY,
        );
        let sub = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Sub,
                lhs: x,
                rhs: c,
            },
            Span::DUMMY,
        );
        run(&mut tree, sub);
        let NodeKind::BinaryOp { op, rhs, .. } = tree.kind(sub) else {
            panic!("not a binary op");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(
            tree.kind(*rhs),
            &NodeKind::Immediate(VariableStorage::Float(-1.5))
        );
    }

    #[test]
    fn multiplicative_identity_collapses() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let x = var(&mut tree, &mut interner, "x");
        let one = tree.add(
            NodeKind::Immediate(VariableStorage::Float(1.0)),
            Span::DUMMY,
        );
        let mul = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Mul,
                lhs: x,
                rhs: one,
            },
            Span::DUMMY,
        );
        run(&mut tree, mul);
        assert!(matches!(
            tree.kind(mul),
            NodeKind::VariableReference { .. }
        ));
    }

    #[test]
    fn immediate_moves_to_the_right_of_commutative_ops() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let c = tree.add(
            NodeKind::Immediate(VariableStorage::Float(4.0)),
            Span::DUMMY,
        );
        let x = var(&mut tree, &mut interner, "x");
        let add = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Add,
                lhs: c,
                rhs: x,
            },
            Span::DUMMY,
        );
        run(&mut tree, add);
        let NodeKind::BinaryOp { lhs, rhs, .. } = tree.kind(add) else {
            panic!("not a binary op");
        };
        assert!(matches!(tree.kind(*lhs), NodeKind::VariableReference { .. }));
        assert!(matches!(tree.kind(*rhs), NodeKind::Immediate(_)));
    }

    #[test]
    fn self_assignment_becomes_noop() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let a = var(&mut tree, &mut interner, "x");
        let b = var(&mut tree, &mut interner, "x");
        let assign = tree.add(
            NodeKind::Assignment {
                op: AssignOp::Plain,
                target: a,
                value: b,
                is_first: false,
            },
            Span::DUMMY,
        );
        run(&mut tree, assign);
        assert_eq!(tree.kind(assign), &NodeKind::Noop);
    }
}
