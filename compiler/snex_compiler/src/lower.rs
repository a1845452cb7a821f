//! Lowers type-checked function bodies to abstract instructions.
//!
//! Every named value is memory-backed: globals in the global data block,
//! parameters and locals spilled into the stack frame at entry, struct
//! members behind the receiver pointer. Register caching happens on top
//! of that through the [`RegisterPool`] state machine; reads load lazily,
//! writes mark the register dirty, and dirty registers flush back to
//! memory before any call, branch join, or return. Cached registers are
//! dropped entirely at control-flow joins so every path agrees on where
//! values live.

use crate::functions::{CallMap, Callee};
use crate::scope::VarLoc;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use snex_codegen::{
    AluOp, AsmBuffer, Bits, CallTarget, Cond, Inst, MemAddr, OpTy, Operand, RegId, RegisterPool,
    Slot,
};
use snex_ir::{
    AssignOp, BinaryOp, CompareOp, LogicalOp, NamespacedIdentifier, NodeId, NodeKind, Symbol,
    SyntaxTree, TypeInfo, Types, VariableStorage,
};
use snex_types::{ComplexTypeKind, ComplexTypeRegistry};

/// Shared inputs for lowering every function of one compilation.
pub struct LowerInput<'a> {
    pub tree: &'a SyntaxTree,
    pub complex_types: &'a ComplexTypeRegistry,
    pub locations: &'a FxHashMap<NamespacedIdentifier, VarLoc>,
    pub calls: &'a CallMap,
}

/// A value produced by an expression: the pool register holding it and
/// whether the lowering owns it (temporaries) or borrows it (cached
/// variable registers).
#[derive(Copy, Clone)]
struct Val {
    reg: RegId,
    slot: Slot,
    owned: bool,
}

struct Lowerer<'a> {
    input: &'a LowerInput<'a>,
    /// Receiver identifier inside methods; member locations resolve
    /// against it.
    this: Option<NamespacedIdentifier>,
    pool: RegisterPool,
    buf: AsmBuffer,
    vars: FxHashMap<NamespacedIdentifier, RegId>,
    /// Loop iterators live purely in a pinned slot for the loop's extent.
    loop_vars: FxHashMap<NamespacedIdentifier, (Slot, Types)>,
}

fn alu_op(op: BinaryOp) -> AluOp {
    match op {
        BinaryOp::Add => AluOp::Add,
        BinaryOp::Sub => AluOp::Sub,
        BinaryOp::Mul => AluOp::Mul,
        BinaryOp::Div => AluOp::Div,
        BinaryOp::Mod => AluOp::Rem,
    }
}

fn cond_code(op: CompareOp) -> Cond {
    match op {
        CompareOp::Eq => Cond::Eq,
        CompareOp::Neq => Cond::Ne,
        CompareOp::Lt => Cond::Lt,
        CompareOp::Le => Cond::Le,
        CompareOp::Gt => Cond::Gt,
        CompareOp::Ge => Cond::Ge,
    }
}

/// Lower one function body. `params` lists the spilled parameters in
/// calling order, including the receiver for methods; `this` names the
/// receiver parameter when lowering a method.
pub fn lower_function(
    input: &LowerInput<'_>,
    params: &[Symbol],
    this: Option<NamespacedIdentifier>,
    body: NodeId,
) -> AsmBuffer {
    let mut lowerer = Lowerer {
        input,
        this,
        pool: RegisterPool::new(),
        buf: AsmBuffer::new(),
        vars: FxHashMap::default(),
        loop_vars: FxHashMap::default(),
    };
    lowerer.spill_params(params);
    lowerer.stmt(body);
    lowerer.flush_dirty();
    lowerer.buf.emit(Inst::Ret { src: None });
    lowerer.buf
}

impl Lowerer<'_> {
    fn tree(&self) -> &SyntaxTree {
        self.input.tree
    }

    fn op_ty(&self, node: NodeId) -> OpTy {
        OpTy::from_type(self.tree().ty(node).register_type())
    }

    fn temp(&mut self, ty: Types) -> Val {
        let reg = self.pool.create(ty);
        let slot = self.pool.materialize(reg);
        Val {
            reg,
            slot,
            owned: true,
        }
    }

    fn drop_val(&mut self, v: Val) {
        if v.owned {
            self.pool.release(v.reg);
        }
    }

    /// Arguments arrive in slots `0..n`; store them into their frame
    /// locations and keep the registers cached.
    fn spill_params(&mut self, params: &[Symbol]) {
        for param in params {
            let ty = param.type_info.register_type();
            let reg = self.pool.create(ty);
            let Some(&VarLoc::Stack { offset }) = self.input.locations.get(&param.id) else {
                debug_assert!(false, "parameter without a frame slot");
                continue;
            };
            self.pool.bind_memory(reg, MemAddr::Stack(offset));
            let slot = self.pool.materialize(reg);
            self.buf.emit(Inst::Store {
                ty: OpTy::from_type(ty),
                addr: MemAddr::Stack(offset),
                src: slot,
            });
            self.vars.insert(param.id.clone(), reg);
        }
    }

    /// Store every dirty cached register back to its memory location.
    fn flush_dirty(&mut self) {
        for reg in self.pool.dirty_registers() {
            let (Some(slot), Some(addr)) = (self.pool.slot(reg), self.pool.memory(reg)) else {
                continue;
            };
            let ty = OpTy::from_type(self.pool.get(reg).ty);
            self.buf.emit(Inst::Store {
                ty,
                addr,
                src: slot,
            });
            self.pool.clear_dirty(reg);
        }
    }

    /// Flush and drop every cached variable register. Required at every
    /// control-flow join and around calls, so register contents never
    /// depend on which path executed.
    fn sync(&mut self) {
        self.flush_dirty();
        let regs: Vec<RegId> = self.vars.drain().map(|(_, r)| r).collect();
        for reg in regs {
            self.pool.release(reg);
        }
    }

    fn binding(&mut self, id: &NamespacedIdentifier, ty: Types) -> RegId {
        if let Some(&reg) = self.vars.get(id) {
            return reg;
        }
        let reg = self.pool.create(ty);
        match self.input.locations.get(id) {
            Some(&VarLoc::Global { offset }) => {
                self.pool.bind_memory(reg, MemAddr::Global(offset));
            }
            Some(&VarLoc::Stack { offset }) => {
                self.pool.bind_memory(reg, MemAddr::Stack(offset));
            }
            _ => debug_assert!(false, "variable without a memory location"),
        }
        self.vars.insert(id.clone(), reg);
        reg
    }

    fn read_var(&mut self, id: &NamespacedIdentifier, ty: Types) -> Val {
        if let Some(&(slot, _)) = self.loop_vars.get(id) {
            // Pinned for the loop's extent; RegId is unused for pinned slots.
            return Val {
                reg: RegId(u32::MAX),
                slot,
                owned: false,
            };
        }
        if let Some(&VarLoc::Member { offset }) = self.input.locations.get(id) {
            let this = self.read_this();
            let dst = self.temp(ty);
            self.buf.emit(Inst::LoadField {
                ty: OpTy::from_type(ty),
                dst: dst.slot,
                base: this.slot,
                offset,
            });
            self.drop_val(this);
            return dst;
        }
        let reg = self.binding(id, ty);
        let slot = match self.pool.slot(reg) {
            Some(slot) => slot,
            None => {
                let slot = self.pool.materialize(reg);
                if let Some(addr) = self.pool.memory(reg) {
                    self.buf.emit(Inst::Load {
                        ty: OpTy::from_type(ty),
                        dst: slot,
                        addr,
                    });
                }
                slot
            }
        };
        Val {
            reg,
            slot,
            owned: false,
        }
    }

    fn write_var(&mut self, id: &NamespacedIdentifier, ty: Types, src: Slot) {
        if let Some(&(slot, loop_ty)) = self.loop_vars.get(id) {
            if slot != src {
                self.buf.emit(Inst::Mov {
                    ty: OpTy::from_type(loop_ty),
                    dst: slot,
                    src: Operand::Slot(src),
                });
            }
            return;
        }
        if let Some(&VarLoc::Member { offset }) = self.input.locations.get(id) {
            let this = self.read_this();
            self.buf.emit(Inst::StoreField {
                ty: OpTy::from_type(ty),
                base: this.slot,
                offset,
                src,
            });
            self.drop_val(this);
            return;
        }
        let reg = self.binding(id, ty);
        let slot = self.pool.materialize(reg);
        if slot != src {
            self.buf.emit(Inst::Mov {
                ty: OpTy::from_type(ty),
                dst: slot,
                src: Operand::Slot(src),
            });
        }
        self.pool.set_dirty(reg);
    }

    fn read_this(&mut self) -> Val {
        let Some(id) = self.this.clone() else {
            debug_assert!(false, "member access outside a method");
            return self.zero(Types::Pointer);
        };
        self.read_var(&id, Types::Pointer)
    }

    fn zero(&mut self, ty: Types) -> Val {
        let dst = self.temp(ty);
        self.buf.emit(Inst::Mov {
            ty: OpTy::from_type(ty),
            dst: dst.slot,
            src: Operand::Imm(Bits(0)),
        });
        dst
    }

    /// Address of an lvalue as an owned pointer temporary.
    fn lower_address(&mut self, node: NodeId) -> Val {
        match self.tree().kind(node) {
            NodeKind::VariableReference { symbol } => {
                let id = symbol.id.clone();
                match self.input.locations.get(&id) {
                    Some(&VarLoc::Global { offset }) => {
                        let dst = self.temp(Types::Pointer);
                        self.buf.emit(Inst::Lea {
                            dst: dst.slot,
                            addr: MemAddr::Global(offset),
                        });
                        dst
                    }
                    Some(&VarLoc::Stack { offset }) => {
                        let dst = self.temp(Types::Pointer);
                        self.buf.emit(Inst::Lea {
                            dst: dst.slot,
                            addr: MemAddr::Stack(offset),
                        });
                        dst
                    }
                    Some(&VarLoc::Member { offset }) => {
                        let this = self.read_this();
                        let dst = self.temp(Types::Pointer);
                        self.buf.emit(Inst::Mov {
                            ty: OpTy::Ptr,
                            dst: dst.slot,
                            src: Operand::Slot(this.slot),
                        });
                        self.drop_val(this);
                        if offset != 0 {
                            self.buf.emit(Inst::Bin {
                                ty: OpTy::Ptr,
                                op: AluOp::Add,
                                dst: dst.slot,
                                lhs: dst.slot,
                                rhs: Operand::Imm(Bits(u64::from(offset))),
                            });
                        }
                        dst
                    }
                    None => {
                        debug_assert!(false, "lvalue without a memory location");
                        self.zero(Types::Pointer)
                    }
                }
            }
            NodeKind::DotOperator {
                parent,
                resolved_offset,
                ..
            } => {
                let (parent, offset) = (*parent, resolved_offset.unwrap_or(0));
                let base = self.lower_address(parent);
                if offset != 0 {
                    self.buf.emit(Inst::Bin {
                        ty: OpTy::Ptr,
                        op: AluOp::Add,
                        dst: base.slot,
                        lhs: base.slot,
                        rhs: Operand::Imm(Bits(u64::from(offset))),
                    });
                }
                base
            }
            _ => {
                debug_assert!(false, "no address for this expression");
                self.zero(Types::Pointer)
            }
        }
    }

    /// Lower an expression as an instruction operand, keeping immediates
    /// immediate.
    fn operand(&mut self, node: NodeId) -> (Operand, Option<Val>) {
        if let NodeKind::Immediate(v) = self.tree().kind(node) {
            if v.get_type().is_numeric() {
                return (Operand::Imm(Bits::from_value(v)), None);
            }
        }
        let v = self.expr(node);
        (Operand::Slot(v.slot), Some(v))
    }

    fn expr(&mut self, node: NodeId) -> Val {
        match self.expr_or_void(node) {
            Some(v) => v,
            None => {
                debug_assert!(false, "void expression used as a value");
                self.zero(Types::Integer)
            }
        }
    }

    fn expr_or_void(&mut self, node: NodeId) -> Option<Val> {
        match self.tree().kind(node) {
            NodeKind::Immediate(v) => {
                let v = *v;
                let ty = v.get_type();
                let dst = self.temp(ty);
                self.buf.emit(Inst::Mov {
                    ty: OpTy::from_type(ty),
                    dst: dst.slot,
                    src: Operand::Imm(Bits::from_value(&v)),
                });
                Some(dst)
            }

            NodeKind::VariableReference { symbol } => {
                let id = symbol.id.clone();
                let ty = self.tree().ty(node).register_type();
                Some(self.read_var(&id, ty))
            }

            NodeKind::BinaryOp { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let ty = self.op_ty(node);
                let a = self.expr(lhs);
                let (rhs_op, rhs_val) = self.operand(rhs);
                let dst = self.temp(self.tree().ty(node).register_type());
                self.buf.emit(Inst::Bin {
                    ty,
                    op: alu_op(op),
                    dst: dst.slot,
                    lhs: a.slot,
                    rhs: rhs_op,
                });
                self.drop_val(a);
                if let Some(v) = rhs_val {
                    self.drop_val(v);
                }
                Some(dst)
            }

            NodeKind::Compare { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let ty = self.op_ty(lhs);
                let a = self.expr(lhs);
                let (rhs_op, rhs_val) = self.operand(rhs);
                let dst = self.temp(Types::Integer);
                self.buf.emit(Inst::Cmp {
                    ty,
                    cc: cond_code(op),
                    dst: dst.slot,
                    lhs: a.slot,
                    rhs: rhs_op,
                });
                self.drop_val(a);
                if let Some(v) = rhs_val {
                    self.drop_val(v);
                }
                Some(dst)
            }

            NodeKind::Logical { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                Some(self.lower_logical(op, lhs, rhs))
            }

            NodeKind::Negation { expr } => {
                let expr = *expr;
                let ty = self.op_ty(node);
                let src = self.expr(expr);
                let dst = self.temp(self.tree().ty(node).register_type());
                self.buf.emit(Inst::Neg {
                    ty,
                    dst: dst.slot,
                    src: src.slot,
                });
                self.drop_val(src);
                Some(dst)
            }

            NodeKind::LogicalNot { expr } => {
                let expr = *expr;
                let ty = self.op_ty(expr);
                let src = self.expr(expr);
                let dst = self.temp(Types::Integer);
                self.buf.emit(Inst::Cmp {
                    ty,
                    cc: Cond::Eq,
                    dst: dst.slot,
                    lhs: src.slot,
                    rhs: Operand::Imm(Bits(0)),
                });
                self.drop_val(src);
                Some(dst)
            }

            NodeKind::Cast { target, expr } => {
                let (target, expr) = (*target, *expr);
                let from = self.op_ty(expr);
                let to = OpTy::from_type(target);
                let src = self.expr(expr);
                let dst = self.temp(target);
                self.buf.emit(Inst::Cast {
                    from,
                    to,
                    dst: dst.slot,
                    src: src.slot,
                });
                self.drop_val(src);
                Some(dst)
            }

            NodeKind::Assignment { .. } => self.lower_assign(node),

            NodeKind::Increment { .. } => Some(self.lower_increment(node)),

            NodeKind::FunctionCall { .. } => self.lower_call(node),

            NodeKind::Subscript { parent, index } => {
                let (parent, index) = (*parent, *index);
                Some(self.load_element(node, parent, index))
            }

            NodeKind::DotOperator { parent, resolved_offset, .. } => {
                let (parent, offset) = (*parent, resolved_offset.unwrap_or(0));
                let ty = self.tree().ty(node).register_type();
                let base = self.lower_address(parent);
                let dst = self.temp(ty);
                self.buf.emit(Inst::LoadField {
                    ty: OpTy::from_type(ty),
                    dst: dst.slot,
                    base: base.slot,
                    offset,
                });
                self.drop_val(base);
                Some(dst)
            }

            NodeKind::TernaryOp {
                cond,
                if_true,
                if_false,
            } => {
                let (cond, if_true, if_false) = (*cond, *if_true, *if_false);
                let ty = self.tree().ty(node).register_type();
                let result = self.temp(ty);
                let cond_v = self.expr(cond);
                self.sync();
                let else_l = self.buf.new_label();
                let end_l = self.buf.new_label();
                self.buf.emit(Inst::JmpIfZero {
                    cond: cond_v.slot,
                    target: else_l,
                });
                self.drop_val(cond_v);

                let t = self.expr(if_true);
                self.buf.emit(Inst::Mov {
                    ty: OpTy::from_type(ty),
                    dst: result.slot,
                    src: Operand::Slot(t.slot),
                });
                self.drop_val(t);
                self.sync();
                self.buf.emit(Inst::Jmp(end_l));

                self.buf.bind(else_l);
                let f = self.expr(if_false);
                self.buf.emit(Inst::Mov {
                    ty: OpTy::from_type(ty),
                    dst: result.slot,
                    src: Operand::Slot(f.slot),
                });
                self.drop_val(f);
                self.sync();
                self.buf.bind(end_l);
                Some(result)
            }

            NodeKind::Noop => None,

            _ => {
                debug_assert!(false, "statement node in expression position");
                None
            }
        }
    }

    /// Short-circuit `&&` / `||`, result normalized to 0/1.
    fn lower_logical(&mut self, op: LogicalOp, lhs: NodeId, rhs: NodeId) -> Val {
        let result = self.temp(Types::Integer);
        let lhs_ty = self.op_ty(lhs);
        let a = self.expr(lhs);
        self.buf.emit(Inst::Cmp {
            ty: lhs_ty,
            cc: Cond::Ne,
            dst: result.slot,
            lhs: a.slot,
            rhs: Operand::Imm(Bits(0)),
        });
        self.drop_val(a);
        self.sync();
        let end_l = self.buf.new_label();
        match op {
            LogicalOp::And => self.buf.emit(Inst::JmpIfZero {
                cond: result.slot,
                target: end_l,
            }),
            LogicalOp::Or => self.buf.emit(Inst::JmpIfNonZero {
                cond: result.slot,
                target: end_l,
            }),
        }
        let rhs_ty = self.op_ty(rhs);
        let b = self.expr(rhs);
        self.buf.emit(Inst::Cmp {
            ty: rhs_ty,
            cc: Cond::Ne,
            dst: result.slot,
            lhs: b.slot,
            rhs: Operand::Imm(Bits(0)),
        });
        self.drop_val(b);
        self.sync();
        self.buf.bind(end_l);
        result
    }

    /// Lower an assignment; returns the stored value so assignments can
    /// appear in expression position.
    fn lower_assign(&mut self, node: NodeId) -> Option<Val> {
        let NodeKind::Assignment {
            op, target, value, ..
        } = self.tree().kind(node)
        else {
            return None;
        };
        debug_assert_eq!(*op, AssignOp::Plain, "compound assignment survived desugaring");
        let (target, value) = (*target, *value);
        let v = self.expr(value);

        match self.tree().kind(target) {
            NodeKind::VariableReference { symbol } => {
                let id = symbol.id.clone();
                let ty = self.tree().ty(target).register_type();
                self.write_var(&id, ty, v.slot);
            }
            NodeKind::DotOperator { parent, resolved_offset, .. } => {
                let (parent, offset) = (*parent, resolved_offset.unwrap_or(0));
                let ty = self.op_ty(target);
                let base = self.lower_address(parent);
                self.buf.emit(Inst::StoreField {
                    ty,
                    base: base.slot,
                    offset,
                    src: v.slot,
                });
                self.drop_val(base);
            }
            NodeKind::Subscript { parent, index } => {
                let (parent, index) = (*parent, *index);
                self.store_element(parent, index, &v);
            }
            _ => debug_assert!(false, "assignment to a non-lvalue"),
        }
        Some(v)
    }

    fn lower_increment(&mut self, node: NodeId) -> Val {
        let NodeKind::Increment {
            target,
            pre,
            decrement,
        } = self.tree().kind(node)
        else {
            return self.zero(Types::Integer);
        };
        let (target, pre, decrement) = (*target, *pre, *decrement);
        let op = if decrement { AluOp::Sub } else { AluOp::Add };
        let NodeKind::VariableReference { symbol } = self.tree().kind(target) else {
            debug_assert!(false, "increment on a non-variable");
            return self.zero(Types::Integer);
        };
        let id = symbol.id.clone();

        let cur = self.read_var(&id, Types::Integer);
        let result = if pre {
            None
        } else {
            let saved = self.temp(Types::Integer);
            self.buf.emit(Inst::Mov {
                ty: OpTy::I32,
                dst: saved.slot,
                src: Operand::Slot(cur.slot),
            });
            Some(saved)
        };
        self.buf.emit(Inst::Bin {
            ty: OpTy::I32,
            op,
            dst: cur.slot,
            lhs: cur.slot,
            rhs: Operand::Imm(Bits(1)),
        });
        // The updated value has to reach the backing location. For
        // cached variables the register is simply marked dirty; member
        // and pinned values store through write_var.
        if cur.owned || self.loop_vars.contains_key(&id) {
            let slot = cur.slot;
            self.write_var(&id, Types::Integer, slot);
        } else {
            self.pool.set_dirty(cur.reg);
        }
        match result {
            Some(saved) => {
                self.drop_val(cur);
                saved
            }
            None => cur,
        }
    }

    fn lower_call(&mut self, node: NodeId) -> Option<Val> {
        let NodeKind::FunctionCall { object, args, .. } = self.tree().kind(node) else {
            return None;
        };
        let (object, args) = (*object, args.clone());
        let callee = match self.input.calls.get(&node) {
            Some(c) => *c,
            None => {
                debug_assert!(false, "call without a resolved target");
                return None;
            }
        };

        match callee {
            Callee::BlockSize => {
                let obj = object?;
                let handle = self.expr(obj);
                let dst = self.temp(Types::Integer);
                self.buf.emit(Inst::BlockLen {
                    dst: dst.slot,
                    block: handle.slot,
                });
                self.drop_val(handle);
                Some(dst)
            }

            Callee::EventGetter { index } => {
                let obj = object?;
                let ev = self.expr(obj);
                let dst = self.temp(Types::Integer);
                self.sync();
                self.buf.emit(Inst::Call {
                    target: CallTarget::Native(index),
                    args: SmallVec::from_slice(&[ev.slot]),
                    ret: Some(dst.slot),
                });
                self.drop_val(ev);
                Some(dst)
            }

            Callee::EventSetter { index } => {
                let obj = object?;
                let ev = self.expr(obj);
                let arg = self.expr(args[0]);
                let updated = self.temp(Types::Event);
                self.sync();
                self.buf.emit(Inst::Call {
                    target: CallTarget::Native(index),
                    args: SmallVec::from_slice(&[ev.slot, arg.slot]),
                    ret: Some(updated.slot),
                });
                self.drop_val(arg);
                self.drop_val(ev);
                // The native returns the updated event; write it back
                // into the receiver variable.
                if let NodeKind::VariableReference { symbol } = self.tree().kind(obj) {
                    let id = symbol.id.clone();
                    self.write_var(&id, Types::Event, updated.slot);
                }
                self.drop_val(updated);
                None
            }

            Callee::Native { index, return_type, .. } => {
                let mut vals: Vec<Val> = Vec::with_capacity(args.len());
                for &arg in &args {
                    vals.push(self.expr(arg));
                }
                let slots: SmallVec<[Slot; 4]> = vals.iter().map(|v| v.slot).collect();
                let ret = if return_type.is_void() {
                    None
                } else {
                    Some(self.temp(return_type.register_type()))
                };
                self.sync();
                self.buf.emit(Inst::Call {
                    target: CallTarget::Native(index),
                    args: slots,
                    ret: ret.map(|v| v.slot),
                });
                for v in vals {
                    self.drop_val(v);
                }
                ret
            }

            Callee::Compiled {
                index,
                return_type,
                method_of,
            } => {
                let mut vals: Vec<Val> = Vec::new();
                if method_of.is_some() {
                    let receiver = match object {
                        Some(obj) => self.lower_address(obj),
                        // A sibling method call shares our receiver.
                        None => self.read_this(),
                    };
                    vals.push(receiver);
                }
                for &arg in &args {
                    vals.push(self.expr(arg));
                }
                let slots: SmallVec<[Slot; 4]> = vals.iter().map(|v| v.slot).collect();
                let ret = if return_type.is_void() {
                    None
                } else {
                    Some(self.temp(return_type.register_type()))
                };
                self.sync();
                self.buf.emit(Inst::Call {
                    target: CallTarget::Compiled(index),
                    args: slots,
                    ret: ret.map(|v| v.slot),
                });
                for v in vals {
                    self.drop_val(v);
                }
                ret
            }
        }
    }

    fn element_kind(&self, parent: NodeId) -> ElementKind {
        match self.tree().ty(parent) {
            TypeInfo::Primitive(Types::Block) => ElementKind::Block,
            TypeInfo::Complex(id) => match self.input.complex_types.get(id).kind {
                ComplexTypeKind::Span { element, .. } => {
                    ElementKind::Span(element.register_type())
                }
                ComplexTypeKind::Dyn { .. } => ElementKind::Block,
                ComplexTypeKind::Struct { .. } => {
                    debug_assert!(false, "subscript on a struct");
                    ElementKind::Block
                }
            },
            _ => {
                debug_assert!(false, "subscript on a non-indexable value");
                ElementKind::Block
            }
        }
    }

    fn load_element(&mut self, node: NodeId, parent: NodeId, index: NodeId) -> Val {
        match self.element_kind(parent) {
            ElementKind::Block => {
                let handle = self.expr(parent);
                let (idx_op, idx_val) = self.operand(index);
                let dst = self.temp(Types::Float);
                self.buf.emit(Inst::LoadBlockElem {
                    dst: dst.slot,
                    block: handle.slot,
                    index: idx_op,
                });
                self.drop_val(handle);
                if let Some(v) = idx_val {
                    self.drop_val(v);
                }
                dst
            }
            ElementKind::Span(elem) => {
                let base = self.lower_address(parent);
                let (idx_op, idx_val) = self.operand(index);
                let dst = self.temp(self.tree().ty(node).register_type());
                self.buf.emit(Inst::LoadElem {
                    ty: OpTy::from_type(elem),
                    dst: dst.slot,
                    base: base.slot,
                    index: idx_op,
                });
                self.drop_val(base);
                if let Some(v) = idx_val {
                    self.drop_val(v);
                }
                dst
            }
        }
    }

    fn store_element(&mut self, parent: NodeId, index: NodeId, value: &Val) {
        match self.element_kind(parent) {
            ElementKind::Block => {
                let handle = self.expr(parent);
                let (idx_op, idx_val) = self.operand(index);
                self.buf.emit(Inst::StoreBlockElem {
                    block: handle.slot,
                    index: idx_op,
                    src: value.slot,
                });
                self.drop_val(handle);
                if let Some(v) = idx_val {
                    self.drop_val(v);
                }
            }
            ElementKind::Span(elem) => {
                let base = self.lower_address(parent);
                let (idx_op, idx_val) = self.operand(index);
                self.buf.emit(Inst::StoreElem {
                    ty: OpTy::from_type(elem),
                    base: base.slot,
                    index: idx_op,
                    src: value.slot,
                });
                self.drop_val(base);
                if let Some(v) = idx_val {
                    self.drop_val(v);
                }
            }
        }
    }

    fn stmt(&mut self, node: NodeId) {
        match self.tree().kind(node) {
            NodeKind::StatementBlock { statements, .. } => {
                let statements: Vec<NodeId> = statements.iter().copied().collect();
                for s in statements {
                    self.stmt(s);
                }
            }

            NodeKind::VariableDefinition { symbol, init } => {
                if symbol.is_compile_time_constant() {
                    return;
                }
                let id = symbol.id.clone();
                let ty = symbol.type_info.register_type();
                let Some(init) = *init else { return };
                let v = self.expr(init);
                self.write_var(&id, ty, v.slot);
                self.drop_val(v);
            }

            NodeKind::ComplexTypeDefinition { symbol, init, .. } => {
                let id = symbol.id.clone();
                let ty = symbol.type_info;
                let inits: Vec<NodeId> = init.iter().copied().collect();
                self.init_complex(&id, ty, &inits);
            }

            NodeKind::Assignment { .. } => {
                if let Some(v) = self.lower_assign(node) {
                    self.drop_val(v);
                }
            }

            NodeKind::Increment { .. } => {
                let v = self.lower_increment(node);
                self.drop_val(v);
            }

            NodeKind::IfStatement {
                cond,
                then_branch,
                else_branch,
            } => {
                let (cond, then_branch, else_branch) = (*cond, *then_branch, *else_branch);
                let cond_v = self.expr(cond);
                self.sync();
                let else_l = self.buf.new_label();
                self.buf.emit(Inst::JmpIfZero {
                    cond: cond_v.slot,
                    target: else_l,
                });
                self.drop_val(cond_v);
                self.stmt(then_branch);
                self.sync();
                match else_branch {
                    Some(else_branch) => {
                        let end_l = self.buf.new_label();
                        self.buf.emit(Inst::Jmp(end_l));
                        self.buf.bind(else_l);
                        self.stmt(else_branch);
                        self.sync();
                        self.buf.bind(end_l);
                    }
                    None => self.buf.bind(else_l),
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
                self.lower_loop(&iterator, target, body);
            }

            NodeKind::ReturnStatement { expr } => {
                let expr = *expr;
                let v = expr.map(|e| self.expr(e));
                self.flush_dirty();
                self.buf.emit(Inst::Ret {
                    src: v.as_ref().map(|v| v.slot),
                });
                if let Some(v) = v {
                    self.drop_val(v);
                }
            }

            NodeKind::Noop => {}

            _ => {
                if let Some(v) = self.expr_or_void(node) {
                    self.drop_val(v);
                }
            }
        }
    }

    fn init_complex(&mut self, id: &NamespacedIdentifier, ty: TypeInfo, inits: &[NodeId]) {
        let TypeInfo::Complex(type_id) = ty else { return };
        match &self.input.complex_types.get(type_id).kind {
            ComplexTypeKind::Span { element, .. } => {
                let elem = element.register_type();
                if inits.is_empty() {
                    return;
                }
                let base = match self.input.locations.get(id) {
                    Some(&VarLoc::Global { offset }) => MemAddr::Global(offset),
                    Some(&VarLoc::Stack { offset }) => MemAddr::Stack(offset),
                    _ => return,
                };
                let base_v = self.temp(Types::Pointer);
                self.buf.emit(Inst::Lea {
                    dst: base_v.slot,
                    addr: base,
                });
                for (i, &init) in inits.iter().enumerate() {
                    let v = self.expr(init);
                    self.buf.emit(Inst::StoreElem {
                        ty: OpTy::from_type(elem),
                        base: base_v.slot,
                        index: Operand::Imm(Bits(i as u64)),
                        src: v.slot,
                    });
                    self.drop_val(v);
                }
                self.drop_val(base_v);
            }
            ComplexTypeKind::Struct { members, .. } => {
                let members: Vec<(Types, u32, Option<VariableStorage>)> = members
                    .iter()
                    .map(|m| (m.ty.register_type(), m.offset, m.default))
                    .collect();
                let base = match self.input.locations.get(id) {
                    Some(&VarLoc::Global { offset }) => MemAddr::Global(offset),
                    Some(&VarLoc::Stack { offset }) => MemAddr::Stack(offset),
                    _ => return,
                };
                let base_v = self.temp(Types::Pointer);
                self.buf.emit(Inst::Lea {
                    dst: base_v.slot,
                    addr: base,
                });
                for (i, (ty, offset, default)) in members.iter().enumerate() {
                    let v = match inits.get(i) {
                        Some(&init) => self.expr(init),
                        None => match default {
                            Some(value) => {
                                let t = self.temp(*ty);
                                self.buf.emit(Inst::Mov {
                                    ty: OpTy::from_type(*ty),
                                    dst: t.slot,
                                    src: Operand::Imm(Bits::from_value(value)),
                                });
                                t
                            }
                            // The frame is zeroed; nothing to write.
                            None => continue,
                        },
                    };
                    self.buf.emit(Inst::StoreField {
                        ty: OpTy::from_type(*ty),
                        base: base_v.slot,
                        offset: *offset,
                        src: v.slot,
                    });
                    self.drop_val(v);
                }
                self.drop_val(base_v);
            }
            // A dyn holds a handle assigned later; no storage to fill.
            ComplexTypeKind::Dyn { .. } => {}
        }
    }

    fn lower_loop(&mut self, iterator: &Symbol, target: NodeId, body: NodeId) {
        let elem = iterator.type_info.register_type();
        match self.element_kind(target) {
            ElementKind::Block => {
                let handle = self.expr(target);
                let blk = self.temp(Types::Pointer);
                self.buf.emit(Inst::Mov {
                    ty: OpTy::Ptr,
                    dst: blk.slot,
                    src: Operand::Slot(handle.slot),
                });
                self.drop_val(handle);
                let len = self.temp(Types::Integer);
                self.buf.emit(Inst::BlockLen {
                    dst: len.slot,
                    block: blk.slot,
                });
                self.loop_frame(
                    iterator,
                    elem,
                    Operand::Slot(len.slot),
                    body,
                    |l, cur, idx| {
                        l.buf.emit(Inst::LoadBlockElem {
                            dst: cur,
                            block: blk.slot,
                            index: Operand::Slot(idx),
                        });
                    },
                    |l, cur, idx| {
                        l.buf.emit(Inst::StoreBlockElem {
                            block: blk.slot,
                            index: Operand::Slot(idx),
                            src: cur,
                        });
                    },
                );
                self.drop_val(len);
                self.drop_val(blk);
            }
            ElementKind::Span(_) => {
                let length = self
                    .input
                    .complex_types
                    .fixed_length(self.tree().ty(target))
                    .unwrap_or(0);
                let base = self.lower_address(target);
                let elem_ty = OpTy::from_type(elem);
                self.loop_frame(
                    iterator,
                    elem,
                    Operand::Imm(Bits(u64::from(length))),
                    body,
                    |l, cur, idx| {
                        l.buf.emit(Inst::LoadElem {
                            ty: elem_ty,
                            dst: cur,
                            base: base.slot,
                            index: Operand::Slot(idx),
                        });
                    },
                    |l, cur, idx| {
                        l.buf.emit(Inst::StoreElem {
                            ty: elem_ty,
                            base: base.slot,
                            index: Operand::Slot(idx),
                            src: cur,
                        });
                    },
                );
                self.drop_val(base);
            }
        }
    }

    /// Shared loop skeleton: index register, bounds check, element load
    /// before the body and write-back after it.
    fn loop_frame(
        &mut self,
        iterator: &Symbol,
        elem: Types,
        length: Operand,
        body: NodeId,
        load: impl Fn(&mut Self, Slot, Slot),
        store: impl Fn(&mut Self, Slot, Slot),
    ) {
        let idx = self.temp(Types::Integer);
        self.buf.emit(Inst::Mov {
            ty: OpTy::I32,
            dst: idx.slot,
            src: Operand::Imm(Bits(0)),
        });
        let cur = self.temp(elem);
        self.loop_vars.insert(iterator.id.clone(), (cur.slot, elem));

        self.sync();
        let top = self.buf.new_label();
        let exit = self.buf.new_label();
        self.buf.bind(top);
        let in_bounds = self.temp(Types::Integer);
        self.buf.emit(Inst::Cmp {
            ty: OpTy::I32,
            cc: Cond::Lt,
            dst: in_bounds.slot,
            lhs: idx.slot,
            rhs: length,
        });
        self.buf.emit(Inst::JmpIfZero {
            cond: in_bounds.slot,
            target: exit,
        });
        self.drop_val(in_bounds);

        load(self, cur.slot, idx.slot);
        self.stmt(body);
        self.sync();
        store(self, cur.slot, idx.slot);
        self.buf.emit(Inst::Bin {
            ty: OpTy::I32,
            op: AluOp::Add,
            dst: idx.slot,
            lhs: idx.slot,
            rhs: Operand::Imm(Bits(1)),
        });
        self.buf.emit(Inst::Jmp(top));
        self.buf.bind(exit);

        self.loop_vars.remove(&iterator.id);
        self.drop_val(cur);
        self.drop_val(idx);
    }
}

enum ElementKind {
    Block,
    Span(Types),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;
    use snex_codegen::{CompiledFunction, GlobalEntry, JitObject};
    use snex_ir::{Span, StringInterner, SymbolFlags};

    struct Fixture {
        tree: SyntaxTree,
        interner: StringInterner,
        registry: ComplexTypeRegistry,
        locations: FxHashMap<NamespacedIdentifier, VarLoc>,
        calls: CallMap,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                tree: SyntaxTree::new(),
                interner: StringInterner::new(),
                registry: ComplexTypeRegistry::new(),
                locations: FxHashMap::default(),
                calls: CallMap::default(),
            }
        }

        fn ident(&mut self, name: &str) -> NamespacedIdentifier {
            NamespacedIdentifier::new(self.interner.intern(name))
        }

        fn var(&mut self, id: &NamespacedIdentifier, ty: Types) -> NodeId {
            let node = self.tree.add(
                NodeKind::VariableReference {
                    symbol: Symbol::new(id.clone(), TypeInfo::Primitive(ty)),
                },
                Span::DUMMY,
            );
            self.tree.set_ty(node, TypeInfo::Primitive(ty));
            node
        }

        fn int(&mut self, v: i64) -> NodeId {
            let node = self
                .tree
                .add(NodeKind::Immediate(VariableStorage::Int(v)), Span::DUMMY);
            self.tree.set_ty(node, TypeInfo::Primitive(Types::Integer));
            node
        }

        fn lower(
            &self,
            params: &[Symbol],
            body: NodeId,
            name: &str,
            return_type: Types,
            arg_types: &[Types],
            frame_size: u32,
        ) -> CompiledFunction {
            let input = LowerInput {
                tree: &self.tree,
                complex_types: &self.registry,
                locations: &self.locations,
                calls: &self.calls,
            };
            CompiledFunction {
                name: name.to_owned(),
                return_type,
                arg_types: SmallVec::from_slice(arg_types),
                code: lower_function(&input, params, None, body),
                frame_size,
            }
        }
    }

    fn param(id: &NamespacedIdentifier, ty: Types) -> Symbol {
        Symbol::new(id.clone(), TypeInfo::Primitive(ty)).with_flags(SymbolFlags::PARAMETER)
    }

    #[test]
    fn local_assignment_and_return() {
        // int test(int input) { int x = 6; return x; }
        let mut f = Fixture::new();
        let input_id = f.ident("input");
        let x_id = f.ident("x");
        f.locations.insert(input_id.clone(), VarLoc::Stack { offset: 0 });
        f.locations.insert(x_id.clone(), VarLoc::Stack { offset: 4 });

        let six = f.int(6);
        let def = f.tree.add(
            NodeKind::VariableDefinition {
                symbol: Symbol::new(x_id.clone(), TypeInfo::Primitive(Types::Integer)),
                init: Some(six),
            },
            Span::DUMMY,
        );
        let read = f.var(&x_id, Types::Integer);
        let ret = f
            .tree
            .add(NodeKind::ReturnStatement { expr: Some(read) }, Span::DUMMY);
        let body = f.tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![def, ret],
                scope: None,
            },
            Span::DUMMY,
        );

        let func = f.lower(
            &[param(&input_id, Types::Integer)],
            body,
            "test",
            Types::Integer,
            &[Types::Integer],
            8,
        );
        let mut jit = JitObject::new(vec![func], Vec::new(), Vec::new(), Vec::new());
        let r = jit.call("test", &[VariableStorage::Int(12)]).expect("run");
        assert_eq!(r, VariableStorage::Int(6));
    }

    #[test]
    fn dirty_global_flushes_before_return() {
        // int next() { counter = counter + 1; return counter; }
        let mut f = Fixture::new();
        let counter = f.ident("counter");
        f.locations
            .insert(counter.clone(), VarLoc::Global { offset: 0 });

        let read = f.var(&counter, Types::Integer);
        let one = f.int(1);
        let sum = f.tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Add,
                lhs: read,
                rhs: one,
            },
            Span::DUMMY,
        );
        f.tree.set_ty(sum, TypeInfo::Primitive(Types::Integer));
        let target = f.var(&counter, Types::Integer);
        let assign = f.tree.add(
            NodeKind::Assignment {
                op: AssignOp::Plain,
                target,
                value: sum,
                is_first: false,
            },
            Span::DUMMY,
        );
        let read_back = f.var(&counter, Types::Integer);
        let ret = f.tree.add(
            NodeKind::ReturnStatement {
                expr: Some(read_back),
            },
            Span::DUMMY,
        );
        let body = f.tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![assign, ret],
                scope: None,
            },
            Span::DUMMY,
        );

        let func = f.lower(&[], body, "next", Types::Integer, &[], 0);
        let symbols = vec![GlobalEntry {
            name: "counter".to_owned(),
            ty: Types::Integer,
            offset: 0,
        }];
        let mut jit = JitObject::new(vec![func], Vec::new(), vec![0u8; 8], symbols);
        assert_eq!(jit.call("next", &[]).expect("run"), VariableStorage::Int(1));
        assert_eq!(jit.call("next", &[]).expect("run"), VariableStorage::Int(2));
        // The flushed value is visible from outside between calls.
        assert_eq!(jit.get_variable("counter"), Some(VariableStorage::Int(2)));
    }

    #[test]
    fn branches_pick_the_right_value() {
        // int pick(int c) { if (c) return 10; else return 20; }
        let mut f = Fixture::new();
        let c = f.ident("c");
        f.locations.insert(c.clone(), VarLoc::Stack { offset: 0 });

        let cond = f.var(&c, Types::Integer);
        let ten = f.int(10);
        let ret_t = f
            .tree
            .add(NodeKind::ReturnStatement { expr: Some(ten) }, Span::DUMMY);
        let twenty = f.int(20);
        let ret_f = f
            .tree
            .add(NodeKind::ReturnStatement { expr: Some(twenty) }, Span::DUMMY);
        let branch = f.tree.add(
            NodeKind::IfStatement {
                cond,
                then_branch: ret_t,
                else_branch: Some(ret_f),
            },
            Span::DUMMY,
        );
        let body = f.tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![branch],
                scope: None,
            },
            Span::DUMMY,
        );

        let func = f.lower(
            &[param(&c, Types::Integer)],
            body,
            "pick",
            Types::Integer,
            &[Types::Integer],
            8,
        );
        let mut jit = JitObject::new(vec![func], Vec::new(), Vec::new(), Vec::new());
        assert_eq!(
            jit.call("pick", &[VariableStorage::Int(1)]).expect("run"),
            VariableStorage::Int(10)
        );
        assert_eq!(
            jit.call("pick", &[VariableStorage::Int(0)]).expect("run"),
            VariableStorage::Int(20)
        );
    }

    #[test]
    fn post_increment_returns_the_old_value() {
        // int bump(int x) { return x++; }  (the incremented x is local)
        let mut f = Fixture::new();
        let x = f.ident("x");
        f.locations.insert(x.clone(), VarLoc::Stack { offset: 0 });
        let target = f.var(&x, Types::Integer);
        let inc = f.tree.add(
            NodeKind::Increment {
                target,
                pre: false,
                decrement: false,
            },
            Span::DUMMY,
        );
        f.tree.set_ty(inc, TypeInfo::Primitive(Types::Integer));
        let ret = f
            .tree
            .add(NodeKind::ReturnStatement { expr: Some(inc) }, Span::DUMMY);
        let body = f.tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![ret],
                scope: None,
            },
            Span::DUMMY,
        );
        let func = f.lower(
            &[param(&x, Types::Integer)],
            body,
            "bump",
            Types::Integer,
            &[Types::Integer],
            8,
        );
        let mut jit = JitObject::new(vec![func], Vec::new(), Vec::new(), Vec::new());
        assert_eq!(
            jit.call("bump", &[VariableStorage::Int(41)]).expect("run"),
            VariableStorage::Int(41)
        );
    }

    #[test]
    fn block_loop_scales_every_sample() {
        // void process(block b) { for (auto& s : b) s = s * 2.0f; }
        let mut f = Fixture::new();
        let b = f.ident("b");
        let s = f.ident("s");
        f.locations.insert(b.clone(), VarLoc::Stack { offset: 0 });

        let read_s = f.var(&s, Types::Float);
        let two = f.tree.add(
            NodeKind::Immediate(VariableStorage::Float(2.0)),
            Span::DUMMY,
        );
        f.tree.set_ty(two, TypeInfo::Primitive(Types::Float));
        let scaled = f.tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Mul,
                lhs: read_s,
                rhs: two,
            },
            Span::DUMMY,
        );
        f.tree.set_ty(scaled, TypeInfo::Primitive(Types::Float));
        let target = f.var(&s, Types::Float);
        let assign = f.tree.add(
            NodeKind::Assignment {
                op: AssignOp::Plain,
                target,
                value: scaled,
                is_first: false,
            },
            Span::DUMMY,
        );
        let loop_body = f.tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![assign],
                scope: None,
            },
            Span::DUMMY,
        );
        let block_ref = f.var(&b, Types::Block);
        let lp = f.tree.add(
            NodeKind::Loop {
                kind: snex_ir::LoopKind::Block,
                iterator: Symbol::new(s.clone(), TypeInfo::Primitive(Types::Float)),
                target: block_ref,
                body: loop_body,
            },
            Span::DUMMY,
        );
        let body = f.tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![lp],
                scope: None,
            },
            Span::DUMMY,
        );

        let func = f.lower(
            &[param(&b, Types::Block)],
            body,
            "process",
            Types::Void,
            &[Types::Block],
            8,
        );
        let mut jit = JitObject::new(vec![func], Vec::new(), Vec::new(), Vec::new());
        let mut samples: Vec<f32> = (0..512).map(|i| i as f32).collect();
        let block = snex_ir::Block::from_slice(&mut samples);
        jit.call("process", &[VariableStorage::Block(block)])
            .expect("run");
        for (i, sample) in samples.iter().enumerate() {
            assert_eq!(*sample, (i as f32) * 2.0);
        }
    }
}
