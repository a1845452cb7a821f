//! Executes the abstract instruction stream.
//!
//! Values occupy 64-bit register slots; narrower types live in the low
//! bits. Pointers are region-tagged offsets into the global data block or
//! the current stack frame, so span iteration works without raw addresses.
//! Audio blocks are the one exception: they wrap caller-owned sample
//! buffers, so reading and writing samples goes through raw pointers held
//! in a per-call header table.

use crate::emitter::AsmBuffer;
use crate::inst::{AluOp, Bits, CallTarget, Cond, Inst, MemAddr, Operand, OpTy};
use crate::jit::{CompiledFunction, NativeFunction, PrintHandler};
use crate::reg::SLOT_COUNT;
use snex_ir::{Block, Event, Types, VariableStorage};
use thiserror::Error;

/// Runtime failures. Compilation rules out malformed instruction streams,
/// so these cover only conditions the compiler cannot see.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("call depth limit exceeded")]
    CallDepthExceeded,
    #[error("block index {index} out of bounds (size {size})")]
    BlockOutOfBounds { index: i32, size: u32 },
}

const CALL_DEPTH_LIMIT: u32 = 256;

/// Region tag in bit 32 of a pointer value; the low 32 bits are the
/// byte offset within the region.
const PTR_STACK_TAG: u64 = 1 << 32;

pub const fn global_ptr(offset: u32) -> u64 {
    offset as u64
}

pub const fn stack_ptr(offset: u32) -> u64 {
    offset as u64 | PTR_STACK_TAG
}

/// Pack an event into its 8-byte wire layout.
pub fn event_to_bits(e: Event) -> u64 {
    u64::from(e.kind as u8)
        | u64::from(e.channel) << 8
        | u64::from(e.note_number) << 16
        | u64::from(e.velocity) << 24
        | u64::from(e.timestamp) << 32
}

pub fn bits_to_event(bits: u64) -> Event {
    Event {
        kind: snex_ir::EventType::from_raw(bits as u8),
        channel: (bits >> 8) as u8,
        note_number: (bits >> 16) as u8,
        velocity: (bits >> 24) as u8,
        timestamp: (bits >> 32) as u32,
    }
}

/// Sample buffer registered for the duration of one call. The handle
/// stored in registers and memory is an index into this table.
#[derive(Copy, Clone, Debug)]
pub struct BlockHeader {
    pub ptr: *mut f32,
    pub len: u32,
}

impl BlockHeader {
    pub fn from_block(b: &Block) -> BlockHeader {
        BlockHeader {
            ptr: b.as_ptr(),
            len: b.len() as u32,
        }
    }
}

/// Runtime services visible to native functions.
pub struct NativeCtx<'a> {
    pub print: &'a mut dyn PrintHandler,
    pub blocks: &'a [BlockHeader],
}

pub type NativeFn = fn(&mut NativeCtx<'_>, &[VariableStorage]) -> VariableStorage;

/// Convert a slot's raw bits into a typed value.
pub fn bits_to_value(ty: Types, bits: u64, blocks: &[BlockHeader]) -> VariableStorage {
    match ty {
        Types::Integer => VariableStorage::Int(i64::from(bits as u32 as i32)),
        Types::Float => VariableStorage::Float(f32::from_bits(bits as u32)),
        Types::Double => VariableStorage::Double(f64::from_bits(bits)),
        Types::Block => {
            let h = blocks
                .get(bits as usize)
                .copied()
                .unwrap_or(BlockHeader { ptr: std::ptr::null_mut(), len: 0 });
            VariableStorage::Block(Block::from_raw_parts(h.ptr, h.len as usize))
        }
        Types::Event => VariableStorage::Event(bits_to_event(bits)),
        // Raw pointers never cross the JIT boundary as values; the host
        // addresses struct data through the global symbol table instead.
        Types::Pointer | Types::Void | Types::Dynamic => VariableStorage::Void,
    }
}

/// Convert a typed value into raw slot bits. Blocks are registered in
/// the header table; the returned bits are the table index.
pub fn value_to_bits(v: &VariableStorage, blocks: &mut Vec<BlockHeader>) -> u64 {
    match *v {
        VariableStorage::Int(i) => i as i32 as u32 as u64,
        VariableStorage::Float(f) => u64::from(f.to_bits()),
        VariableStorage::Double(d) => d.to_bits(),
        VariableStorage::Block(ref b) => {
            let idx = blocks.len() as u64;
            blocks.push(BlockHeader::from_block(b));
            idx
        }
        VariableStorage::Event(e) => event_to_bits(e),
        VariableStorage::Ptr(..) | VariableStorage::Void | VariableStorage::Dynamic => 0,
    }
}

/// One execution context over a compiled program's tables.
pub struct Vm<'a> {
    pub globals: &'a mut Vec<u8>,
    pub functions: &'a [CompiledFunction],
    pub natives: &'a [NativeFunction],
    pub blocks: &'a mut Vec<BlockHeader>,
    pub print: &'a mut dyn PrintHandler,
}

impl Vm<'_> {
    /// Run `functions[index]` with arguments already converted to slot
    /// bits, returning the raw return value bits.
    pub fn run(&mut self, index: usize, args: &[u64]) -> Result<u64, VmError> {
        self.run_at_depth(index, args, 0)
    }

    fn run_at_depth(&mut self, index: usize, args: &[u64], depth: u32) -> Result<u64, VmError> {
        if depth > CALL_DEPTH_LIMIT {
            return Err(VmError::CallDepthExceeded);
        }
        let funcs = self.functions;
        let func = &funcs[index];
        let mut slots = [0u64; SLOT_COUNT as usize];
        slots[..args.len()].copy_from_slice(args);
        let mut frame = vec![0u8; func.frame_size as usize];
        self.exec(&func.code, &mut slots, &mut frame, depth)
    }

    fn exec(
        &mut self,
        code: &AsmBuffer,
        slots: &mut [u64; SLOT_COUNT as usize],
        frame: &mut [u8],
        depth: u32,
    ) -> Result<u64, VmError> {
        let insts = code.insts();
        let mut pc = 0usize;
        while pc < insts.len() {
            match &insts[pc] {
                Inst::Mov { dst, src, .. } => {
                    slots[dst.0 as usize] = self.operand(slots, *src);
                }
                Inst::Bin { ty, op, dst, lhs, rhs } => {
                    let a = slots[lhs.0 as usize];
                    let b = self.operand(slots, *rhs);
                    slots[dst.0 as usize] = alu(*ty, *op, a, b);
                }
                Inst::Neg { ty, dst, src } => {
                    let v = slots[src.0 as usize];
                    slots[dst.0 as usize] = match ty {
                        OpTy::I32 => (v as u32 as i32).wrapping_neg() as u32 as u64,
                        OpTy::F32 => {
                            u64::from((f32::from_bits(v as u32) * -1.0).to_bits())
                        }
                        OpTy::F64 => (f64::from_bits(v) * -1.0).to_bits(),
                        OpTy::Ptr => v,
                    };
                }
                Inst::Cmp { ty, cc, dst, lhs, rhs } => {
                    let a = slots[lhs.0 as usize];
                    let b = self.operand(slots, *rhs);
                    slots[dst.0 as usize] = u64::from(compare(*ty, *cc, a, b));
                }
                Inst::Cast { from, to, dst, src } => {
                    slots[dst.0 as usize] = cast(*from, *to, slots[src.0 as usize]);
                }
                Inst::Load { ty, dst, addr } => {
                    slots[dst.0 as usize] = self.read(*ty, self.resolve(*addr), frame);
                }
                Inst::Store { ty, addr, src } => {
                    let v = slots[src.0 as usize];
                    self.write(*ty, self.resolve(*addr), frame, v);
                }
                Inst::Lea { dst, addr } => {
                    slots[dst.0 as usize] = match addr {
                        MemAddr::Global(o) => global_ptr(*o),
                        MemAddr::Stack(o) => stack_ptr(*o),
                    };
                }
                Inst::LoadField { ty, dst, base, offset } => {
                    let p = slots[base.0 as usize].wrapping_add(u64::from(*offset));
                    slots[dst.0 as usize] = self.read(*ty, p, frame);
                }
                Inst::StoreField { ty, base, offset, src } => {
                    let p = slots[base.0 as usize].wrapping_add(u64::from(*offset));
                    let v = slots[src.0 as usize];
                    self.write(*ty, p, frame, v);
                }
                Inst::LoadElem { ty, dst, base, index } => {
                    let i = self.operand(slots, *index) as u32;
                    let p = slots[base.0 as usize].wrapping_add(u64::from(i * ty.stride()));
                    slots[dst.0 as usize] = self.read(*ty, p, frame);
                }
                Inst::StoreElem { ty, base, index, src } => {
                    let i = self.operand(slots, *index) as u32;
                    let p = slots[base.0 as usize].wrapping_add(u64::from(i * ty.stride()));
                    let v = slots[src.0 as usize];
                    self.write(*ty, p, frame, v);
                }
                Inst::BlockLen { dst, block } => {
                    let h = self.header(slots[block.0 as usize]);
                    slots[dst.0 as usize] = u64::from(h.len);
                }
                Inst::LoadBlockElem { dst, block, index } => {
                    let h = self.header(slots[block.0 as usize]);
                    let i = self.operand(slots, *index) as u32 as i32;
                    if i < 0 || i as u32 >= h.len {
                        return Err(VmError::BlockOutOfBounds { index: i, size: h.len });
                    }
                    // The header wraps a live caller buffer and the index
                    // has just been bounds-checked.
                    #[allow(unsafe_code, reason = "bounds-checked read through a caller-owned sample buffer")]
                    let sample = unsafe { *h.ptr.add(i as usize) };
                    slots[dst.0 as usize] = u64::from(sample.to_bits());
                }
                Inst::StoreBlockElem { block, index, src } => {
                    let h = self.header(slots[block.0 as usize]);
                    let i = self.operand(slots, *index) as u32 as i32;
                    if i < 0 || i as u32 >= h.len {
                        return Err(VmError::BlockOutOfBounds { index: i, size: h.len });
                    }
                    let sample = f32::from_bits(slots[src.0 as usize] as u32);
                    #[allow(unsafe_code, reason = "bounds-checked write through a caller-owned sample buffer")]
                    unsafe {
                        *h.ptr.add(i as usize) = sample;
                    }
                }
                Inst::Jmp(label) => {
                    pc = code.target(*label) as usize;
                    continue;
                }
                Inst::JmpIfZero { cond, target } => {
                    if slots[cond.0 as usize] as u32 == 0 {
                        pc = code.target(*target) as usize;
                        continue;
                    }
                }
                Inst::JmpIfNonZero { cond, target } => {
                    if slots[cond.0 as usize] as u32 != 0 {
                        pc = code.target(*target) as usize;
                        continue;
                    }
                }
                Inst::Call { target, args, ret } => {
                    let arg_bits: Vec<u64> =
                        args.iter().map(|s| slots[s.0 as usize]).collect();
                    let result = match target {
                        CallTarget::Compiled(i) => {
                            self.run_at_depth(*i as usize, &arg_bits, depth + 1)?
                        }
                        CallTarget::Native(i) => self.call_native(*i as usize, &arg_bits),
                    };
                    if let Some(r) = ret {
                        slots[r.0 as usize] = result;
                    }
                }
                Inst::Ret { src } => {
                    return Ok(src.map_or(0, |s| slots[s.0 as usize]));
                }
            }
            pc += 1;
        }
        Ok(0)
    }

    fn call_native(&mut self, index: usize, arg_bits: &[u64]) -> u64 {
        let natives = self.natives;
        let native = &natives[index];
        let args: Vec<VariableStorage> = native
            .arg_types
            .iter()
            .zip(arg_bits)
            .map(|(&ty, &bits)| bits_to_value(ty, bits, self.blocks.as_slice()))
            .collect();
        let mut ctx = NativeCtx {
            print: &mut *self.print,
            blocks: self.blocks.as_slice(),
        };
        let result = (native.func)(&mut ctx, &args);
        value_to_bits(&result, &mut *self.blocks)
    }

    #[inline]
    fn operand(&self, slots: &[u64; SLOT_COUNT as usize], op: Operand) -> u64 {
        match op {
            Operand::Slot(s) => slots[s.0 as usize],
            Operand::Imm(Bits(b)) => b,
        }
    }

    fn header(&self, handle: u64) -> BlockHeader {
        self.blocks
            .get(handle as usize)
            .copied()
            .unwrap_or(BlockHeader { ptr: std::ptr::null_mut(), len: 0 })
    }

    #[inline]
    fn resolve(&self, addr: MemAddr) -> u64 {
        match addr {
            MemAddr::Global(o) => global_ptr(o),
            MemAddr::Stack(o) => stack_ptr(o),
        }
    }

    fn read(&self, ty: OpTy, ptr: u64, frame: &[u8]) -> u64 {
        let offset = ptr as u32 as usize;
        let region: &[u8] = if ptr & PTR_STACK_TAG != 0 {
            frame
        } else {
            self.globals.as_slice()
        };
        read_region(region, offset, ty)
    }

    fn write(&mut self, ty: OpTy, ptr: u64, frame: &mut [u8], value: u64) {
        let offset = ptr as u32 as usize;
        let region: &mut [u8] = if ptr & PTR_STACK_TAG != 0 {
            frame
        } else {
            self.globals.as_mut_slice()
        };
        write_region(region, offset, ty, value);
    }
}

fn read_region(region: &[u8], offset: usize, ty: OpTy) -> u64 {
    match ty {
        OpTy::I32 | OpTy::F32 => {
            let mut b = [0u8; 4];
            b.copy_from_slice(&region[offset..offset + 4]);
            u64::from(u32::from_le_bytes(b))
        }
        OpTy::F64 | OpTy::Ptr => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&region[offset..offset + 8]);
            u64::from_le_bytes(b)
        }
    }
}

fn write_region(region: &mut [u8], offset: usize, ty: OpTy, value: u64) {
    match ty {
        OpTy::I32 | OpTy::F32 => {
            region[offset..offset + 4].copy_from_slice(&(value as u32).to_le_bytes());
        }
        OpTy::F64 | OpTy::Ptr => {
            region[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        }
    }
}

fn alu(ty: OpTy, op: AluOp, a: u64, b: u64) -> u64 {
    match ty {
        OpTy::I32 => {
            let (x, y) = (a as u32 as i32, b as u32 as i32);
            let r = match op {
                AluOp::Add => x.wrapping_add(y),
                AluOp::Sub => x.wrapping_sub(y),
                AluOp::Mul => x.wrapping_mul(y),
                AluOp::Div => x.checked_div(y).unwrap_or(0),
                AluOp::Rem => x.checked_rem(y).unwrap_or(0),
            };
            r as u32 as u64
        }
        OpTy::F32 => {
            let (x, y) = (f32::from_bits(a as u32), f32::from_bits(b as u32));
            let r = match op {
                AluOp::Add => x + y,
                AluOp::Sub => x - y,
                AluOp::Mul => x * y,
                AluOp::Div => x / y,
                AluOp::Rem => x % y,
            };
            u64::from(r.to_bits())
        }
        OpTy::F64 => {
            let (x, y) = (f64::from_bits(a), f64::from_bits(b));
            let r = match op {
                AluOp::Add => x + y,
                AluOp::Sub => x - y,
                AluOp::Mul => x * y,
                AluOp::Div => x / y,
                AluOp::Rem => x % y,
            };
            r.to_bits()
        }
        OpTy::Ptr => match op {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            _ => a,
        },
    }
}

fn compare(ty: OpTy, cc: Cond, a: u64, b: u64) -> u32 {
    let hit = match ty {
        OpTy::I32 => {
            let (x, y) = (a as u32 as i32, b as u32 as i32);
            apply_cond(cc, x.partial_cmp(&y))
        }
        OpTy::F32 => {
            let (x, y) = (f32::from_bits(a as u32), f32::from_bits(b as u32));
            apply_cond(cc, x.partial_cmp(&y))
        }
        OpTy::F64 => {
            let (x, y) = (f64::from_bits(a), f64::from_bits(b));
            apply_cond(cc, x.partial_cmp(&y))
        }
        OpTy::Ptr => apply_cond(cc, a.partial_cmp(&b)),
    };
    u32::from(hit)
}

fn apply_cond(cc: Cond, ord: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    // NaN comparisons are all false except `!=`.
    let Some(ord) = ord else {
        return cc == Cond::Ne;
    };
    match cc {
        Cond::Eq => ord == Equal,
        Cond::Ne => ord != Equal,
        Cond::Lt => ord == Less,
        Cond::Le => ord != Greater,
        Cond::Gt => ord == Greater,
        Cond::Ge => ord != Less,
    }
}

/// Numeric conversion; float-to-int truncates toward zero.
fn cast(from: OpTy, to: OpTy, v: u64) -> u64 {
    match (from, to) {
        (OpTy::I32, OpTy::F32) => u64::from(((v as u32 as i32) as f32).to_bits()),
        (OpTy::I32, OpTy::F64) => (f64::from(v as u32 as i32)).to_bits(),
        (OpTy::F32, OpTy::I32) => (f32::from_bits(v as u32) as i32) as u32 as u64,
        (OpTy::F32, OpTy::F64) => f64::from(f32::from_bits(v as u32)).to_bits(),
        (OpTy::F64, OpTy::I32) => (f64::from_bits(v) as i32) as u32 as u64,
        (OpTy::F64, OpTy::F32) => u64::from((f64::from_bits(v) as f32).to_bits()),
        _ => v,
    }
}
