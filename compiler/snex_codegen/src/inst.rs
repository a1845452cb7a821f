//! The abstract instruction set the code generator emits.
//!
//! This is the boundary to the assembler backend: instruction encoding,
//! calling-convention ABI and relocation are behind it. Instructions
//! operate on physical register slots assigned by the register allocator,
//! on memory addresses in the global data block or the current stack
//! frame, and on raw element pointers for block/span iteration.

use smallvec::SmallVec;
use snex_ir::{Types, VariableStorage};
use std::fmt;

/// Physical register slot index, assigned from the pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Slot(pub u8);

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Operand value type at the instruction level.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum OpTy {
    I32,
    F32,
    F64,
    /// Pointer-sized: block handles, element addresses, event payloads.
    Ptr,
}

impl OpTy {
    pub fn from_type(ty: Types) -> OpTy {
        match ty {
            Types::Integer => OpTy::I32,
            Types::Float => OpTy::F32,
            Types::Double => OpTy::F64,
            Types::Block | Types::Pointer | Types::Event => OpTy::Ptr,
            Types::Void | Types::Dynamic => {
                debug_assert!(false, "no operand type for {ty}");
                OpTy::I32
            }
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            OpTy::I32 => "i32",
            OpTy::F32 => "f32",
            OpTy::F64 => "f64",
            OpTy::Ptr => "ptr",
        }
    }

    /// Byte stride of one element of this type.
    pub const fn stride(self) -> u32 {
        match self {
            OpTy::I32 | OpTy::F32 => 4,
            OpTy::F64 | OpTy::Ptr => 8,
        }
    }
}

/// Raw 64-bit immediate, interpreted per the instruction's `OpTy`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct Bits(pub u64);

impl Bits {
    pub fn from_value(v: &VariableStorage) -> Bits {
        match *v {
            VariableStorage::Int(i) => Bits(i as u64),
            VariableStorage::Float(f) => Bits(u64::from(f.to_bits())),
            VariableStorage::Double(d) => Bits(d.to_bits()),
            _ => Bits(0),
        }
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0 as i32
    }

    #[inline]
    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.0 as u32)
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Register or immediate operand.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Operand {
    Slot(Slot),
    Imm(Bits),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Slot(s) => write!(f, "{s}"),
            Operand::Imm(b) => write!(f, "#0x{:x}", b.0),
        }
    }
}

/// Memory address: global data block or current stack frame, byte offset.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum MemAddr {
    Global(u32),
    Stack(u32),
}

impl fmt::Display for MemAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemAddr::Global(o) => write!(f, "[g+{o}]"),
            MemAddr::Stack(o) => write!(f, "[sp+{o}]"),
        }
    }
}

/// Arithmetic operation kinds. Integer division/modulo truncate natively.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl AluOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::Mul => "mul",
            AluOp::Div => "div",
            AluOp::Rem => "rem",
        }
    }
}

/// Comparison condition codes; result is an integer 0/1.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lt",
            Cond::Le => "le",
            Cond::Gt => "gt",
            Cond::Ge => "ge",
        }
    }
}

/// Branch target label, bound to an instruction position by the emitter.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Label(pub u32);

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Call destination: another compiled function or a native intrinsic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CallTarget {
    Compiled(u32),
    Native(u32),
}

/// One emitted instruction.
#[derive(Clone, PartialEq, Debug)]
pub enum Inst {
    /// Register/immediate move.
    Mov {
        ty: OpTy,
        dst: Slot,
        src: Operand,
    },
    /// `dst = lhs OP rhs`; `dst` may alias `lhs` (compound assignment).
    Bin {
        ty: OpTy,
        op: AluOp,
        dst: Slot,
        lhs: Slot,
        rhs: Operand,
    },
    /// Arithmetic negation. Floats negate by multiplying with -1.0, which
    /// the backend implements directly; integers use a native negate.
    Neg {
        ty: OpTy,
        dst: Slot,
        src: Slot,
    },
    Cmp {
        ty: OpTy,
        cc: Cond,
        dst: Slot,
        lhs: Slot,
        rhs: Operand,
    },
    /// Numeric conversion; int-from-float truncates toward zero.
    Cast {
        from: OpTy,
        to: OpTy,
        dst: Slot,
        src: Slot,
    },
    Load {
        ty: OpTy,
        dst: Slot,
        addr: MemAddr,
    },
    Store {
        ty: OpTy,
        addr: MemAddr,
        src: Slot,
    },
    /// Address of a memory location, for struct/span bases.
    Lea {
        dst: Slot,
        addr: MemAddr,
    },
    /// `dst = *(base + offset)` member access off a base pointer.
    LoadField {
        ty: OpTy,
        dst: Slot,
        base: Slot,
        offset: u32,
    },
    StoreField {
        ty: OpTy,
        base: Slot,
        offset: u32,
        src: Slot,
    },
    /// `dst = base[index]` with the element stride of `ty`.
    LoadElem {
        ty: OpTy,
        dst: Slot,
        base: Slot,
        index: Operand,
    },
    StoreElem {
        ty: OpTy,
        base: Slot,
        index: Operand,
        src: Slot,
    },
    /// Read the length field from a block handle's header.
    BlockLen {
        dst: Slot,
        block: Slot,
    },
    /// Read a sample from a block.
    LoadBlockElem {
        dst: Slot,
        block: Slot,
        index: Operand,
    },
    StoreBlockElem {
        block: Slot,
        index: Operand,
        src: Slot,
    },
    Jmp(Label),
    JmpIfZero {
        cond: Slot,
        target: Label,
    },
    JmpIfNonZero {
        cond: Slot,
        target: Label,
    },
    Call {
        target: CallTarget,
        args: SmallVec<[Slot; 4]>,
        ret: Option<Slot>,
    },
    Ret {
        src: Option<Slot>,
    },
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Mov { ty, dst, src } => write!(f, "mov.{} {dst}, {src}", ty.suffix()),
            Inst::Bin {
                ty,
                op,
                dst,
                lhs,
                rhs,
            } => write!(f, "{}.{} {dst}, {lhs}, {rhs}", op.mnemonic(), ty.suffix()),
            Inst::Neg { ty, dst, src } => write!(f, "neg.{} {dst}, {src}", ty.suffix()),
            Inst::Cmp {
                ty,
                cc,
                dst,
                lhs,
                rhs,
            } => write!(f, "cmp.{}.{} {dst}, {lhs}, {rhs}", cc.mnemonic(), ty.suffix()),
            Inst::Cast { from, to, dst, src } => {
                write!(f, "cvt.{}.{} {dst}, {src}", from.suffix(), to.suffix())
            }
            Inst::Load { ty, dst, addr } => write!(f, "ld.{} {dst}, {addr}", ty.suffix()),
            Inst::Store { ty, addr, src } => write!(f, "st.{} {addr}, {src}", ty.suffix()),
            Inst::Lea { dst, addr } => write!(f, "lea {dst}, {addr}"),
            Inst::LoadField {
                ty,
                dst,
                base,
                offset,
            } => write!(f, "ld.{} {dst}, [{base}+{offset}]", ty.suffix()),
            Inst::StoreField {
                ty,
                base,
                offset,
                src,
            } => write!(f, "st.{} [{base}+{offset}], {src}", ty.suffix()),
            Inst::LoadElem {
                ty,
                dst,
                base,
                index,
            } => write!(f, "ldx.{} {dst}, [{base}+{index}*{}]", ty.suffix(), ty.stride()),
            Inst::StoreElem {
                ty,
                base,
                index,
                src,
            } => write!(f, "stx.{} [{base}+{index}*{}], {src}", ty.suffix(), ty.stride()),
            Inst::BlockLen { dst, block } => write!(f, "blen {dst}, {block}"),
            Inst::LoadBlockElem { dst, block, index } => {
                write!(f, "bld {dst}, {block}[{index}]")
            }
            Inst::StoreBlockElem { block, index, src } => {
                write!(f, "bst {block}[{index}], {src}")
            }
            Inst::Jmp(l) => write!(f, "jmp {l}"),
            Inst::JmpIfZero { cond, target } => write!(f, "jz {cond}, {target}"),
            Inst::JmpIfNonZero { cond, target } => write!(f, "jnz {cond}, {target}"),
            Inst::Call { target, args, ret } => {
                write!(f, "call ")?;
                match target {
                    CallTarget::Compiled(i) => write!(f, "f{i}")?,
                    CallTarget::Native(i) => write!(f, "n{i}")?,
                }
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")?;
                if let Some(r) = ret {
                    write!(f, " -> {r}")?;
                }
                Ok(())
            }
            Inst::Ret { src } => match src {
                Some(s) => write!(f, "ret {s}"),
                None => write!(f, "ret"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip() {
        let b = Bits::from_value(&VariableStorage::Float(2.5));
        assert_eq!(b.as_f32(), 2.5);
        let b = Bits::from_value(&VariableStorage::Int(-3));
        assert_eq!(b.as_i32(), -3);
        let b = Bits::from_value(&VariableStorage::Double(-0.125));
        assert_eq!(b.as_f64(), -0.125);
    }

    #[test]
    fn display_forms() {
        let i = Inst::Bin {
            ty: OpTy::F32,
            op: AluOp::Mul,
            dst: Slot(1),
            lhs: Slot(1),
            rhs: Operand::Slot(Slot(2)),
        };
        assert_eq!(i.to_string(), "mul.f32 r1, r1, r2");
    }
}
