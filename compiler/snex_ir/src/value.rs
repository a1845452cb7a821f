//! The universal runtime value: a fixed-size tagged union.
//!
//! `VariableStorage` is what crosses the JIT boundary: function arguments,
//! return values, global variable snapshots and compile-time constants are
//! all carried in this one representation. `Block` and `Ptr` variants never
//! own the memory they reference; ownership stays with the host for the
//! entire compiler invocation.
//!
//! Accessor policy: reading a value through the wrong-type accessor is a
//! soft failure. Numeric accessors convert between numeric tags; anything
//! else yields a zero/default value (debug builds assert). The compiler
//! treats a genuine mismatch as a bug to be caught at compile time, never
//! as a reason to unwind on the audio thread.

use crate::types::Types;
use std::fmt;

/// Epsilon used for float/float and double/double equality, tolerating FP
/// rounding introduced by canonicalization rewrites.
pub const FLOAT_COMPARE_EPSILON: f64 = 1e-4;

/// Non-owning reference to a runtime-length buffer of audio samples.
#[derive(Copy, Clone, Debug)]
pub struct Block {
    ptr: *mut f32,
    len: usize,
}

impl Block {
    /// Empty block referencing no samples.
    pub const fn empty() -> Self {
        Block {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Borrow a sample buffer. The block does not track the lifetime; the
    /// caller keeps the buffer alive for as long as compiled code may run.
    pub fn from_slice(samples: &mut [f32]) -> Self {
        Block {
            ptr: samples.as_mut_ptr(),
            len: samples.len(),
        }
    }

    pub const fn from_raw_parts(ptr: *mut f32, len: usize) -> Self {
        Block { ptr, len }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn as_ptr(&self) -> *mut f32 {
        self.ptr
    }
}

/// Event type discriminant, matching the host's message model.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[repr(u8)]
pub enum EventType {
    #[default]
    Empty = 0,
    NoteOn,
    NoteOff,
    Controller,
    PitchBend,
    Aftertouch,
}

impl EventType {
    /// Decode a wire discriminant; unknown values map to `Empty`.
    pub const fn from_raw(raw: u8) -> EventType {
        match raw {
            1 => EventType::NoteOn,
            2 => EventType::NoteOff,
            3 => EventType::Controller,
            4 => EventType::PitchBend,
            5 => EventType::Aftertouch,
            _ => EventType::Empty,
        }
    }
}

/// Fixed-layout record for a musical message.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[repr(C)]
pub struct Event {
    pub kind: EventType,
    pub channel: u8,
    pub note_number: u8,
    pub velocity: u8,
    pub timestamp: u32,
}

impl Event {
    pub fn note_on(channel: u8, note_number: u8, velocity: u8) -> Self {
        Event {
            kind: EventType::NoteOn,
            channel,
            note_number,
            velocity,
            timestamp: 0,
        }
    }

    pub fn note_off(channel: u8, note_number: u8) -> Self {
        Event {
            kind: EventType::NoteOff,
            channel,
            note_number,
            velocity: 0,
            timestamp: 0,
        }
    }
}

/// The fixed-size tagged union representing all runtime values.
///
/// The active tag and the active payload are consistent by construction;
/// there is no way to build a mismatched value.
#[derive(Copy, Clone, Debug, Default)]
pub enum VariableStorage {
    #[default]
    Void,
    /// Unresolved/untyped marker, distinct from `Void` for diagnostics.
    Dynamic,
    Int(i64),
    Float(f32),
    Double(f64),
    Block(Block),
    Ptr(*mut u8, usize),
    Event(Event),
}

impl VariableStorage {
    pub const fn get_type(&self) -> Types {
        match self {
            VariableStorage::Void => Types::Void,
            VariableStorage::Dynamic => Types::Dynamic,
            VariableStorage::Int(_) => Types::Integer,
            VariableStorage::Float(_) => Types::Float,
            VariableStorage::Double(_) => Types::Double,
            VariableStorage::Block(_) => Types::Block,
            VariableStorage::Ptr(..) => Types::Pointer,
            VariableStorage::Event(_) => Types::Event,
        }
    }

    /// Byte size of the active type.
    pub const fn size_in_bytes(&self) -> usize {
        self.get_type().size_in_bytes()
    }

    /// Zero value of the given type, used for default initialization.
    pub const fn zero(ty: Types) -> Self {
        match ty {
            Types::Void => VariableStorage::Void,
            Types::Dynamic => VariableStorage::Dynamic,
            Types::Integer => VariableStorage::Int(0),
            Types::Float => VariableStorage::Float(0.0),
            Types::Double => VariableStorage::Double(0.0),
            Types::Block => VariableStorage::Block(Block::empty()),
            Types::Pointer => VariableStorage::Ptr(std::ptr::null_mut(), 0),
            Types::Event => VariableStorage::Event(Event {
                kind: EventType::Empty,
                channel: 0,
                note_number: 0,
                velocity: 0,
                timestamp: 0,
            }),
        }
    }

    pub fn to_int(&self) -> i64 {
        match *self {
            VariableStorage::Int(v) => v,
            VariableStorage::Float(v) => v as i64,
            VariableStorage::Double(v) => v as i64,
            _ => {
                debug_assert!(false, "to_int on {:?}", self.get_type());
                0
            }
        }
    }

    pub fn to_float(&self) -> f32 {
        match *self {
            VariableStorage::Int(v) => v as f32,
            VariableStorage::Float(v) => v,
            VariableStorage::Double(v) => v as f32,
            _ => {
                debug_assert!(false, "to_float on {:?}", self.get_type());
                0.0
            }
        }
    }

    pub fn to_double(&self) -> f64 {
        match *self {
            VariableStorage::Int(v) => v as f64,
            VariableStorage::Float(v) => f64::from(v),
            VariableStorage::Double(v) => v,
            _ => {
                debug_assert!(false, "to_double on {:?}", self.get_type());
                0.0
            }
        }
    }

    pub fn to_block(&self) -> Block {
        match *self {
            VariableStorage::Block(b) => b,
            _ => {
                debug_assert!(false, "to_block on {:?}", self.get_type());
                Block::empty()
            }
        }
    }

    pub fn to_event(&self) -> Event {
        match *self {
            VariableStorage::Event(e) => e,
            _ => {
                debug_assert!(false, "to_event on {:?}", self.get_type());
                Event::default()
            }
        }
    }

    pub fn to_ptr(&self) -> (*mut u8, usize) {
        match *self {
            VariableStorage::Ptr(p, size) => (p, size),
            _ => {
                debug_assert!(false, "to_ptr on {:?}", self.get_type());
                (std::ptr::null_mut(), 0)
            }
        }
    }

    /// Convert to another numeric type. `Void` and non-numeric tags pass
    /// through unchanged (soft failure on accessor use instead).
    #[must_use]
    pub fn cast_to(&self, target: Types) -> VariableStorage {
        match target {
            Types::Integer => VariableStorage::Int(self.to_int()),
            Types::Float => VariableStorage::Float(self.to_float()),
            Types::Double => VariableStorage::Double(self.to_double()),
            _ => *self,
        }
    }

    /// Nonzero test used for branch conditions on immediates.
    pub fn is_truthy(&self) -> bool {
        match *self {
            VariableStorage::Int(v) => v != 0,
            VariableStorage::Float(v) => v != 0.0,
            VariableStorage::Double(v) => v != 0.0,
            _ => false,
        }
    }
}

impl PartialEq for VariableStorage {
    /* Tag-dispatched equality; floats compare with an epsilon. */
    fn eq(&self, other: &Self) -> bool {
        use VariableStorage as V;
        match (*self, *other) {
            (V::Void, V::Void) | (V::Dynamic, V::Dynamic) => true,
            (V::Int(a), V::Int(b)) => a == b,
            (V::Float(a), V::Float(b)) => {
                f64::from((a - b).abs()) < FLOAT_COMPARE_EPSILON
            }
            (V::Double(a), V::Double(b)) => (a - b).abs() < FLOAT_COMPARE_EPSILON,
            (V::Block(a), V::Block(b)) => a.as_ptr() == b.as_ptr() && a.len() == b.len(),
            (V::Ptr(a, al), V::Ptr(b, bl)) => a == b && al == bl,
            (V::Event(a), V::Event(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for VariableStorage {
    fn from(v: i64) -> Self {
        VariableStorage::Int(v)
    }
}

impl From<i32> for VariableStorage {
    fn from(v: i32) -> Self {
        VariableStorage::Int(i64::from(v))
    }
}

impl From<f32> for VariableStorage {
    fn from(v: f32) -> Self {
        VariableStorage::Float(v)
    }
}

impl From<f64> for VariableStorage {
    fn from(v: f64) -> Self {
        VariableStorage::Double(v)
    }
}

impl From<Block> for VariableStorage {
    fn from(v: Block) -> Self {
        VariableStorage::Block(v)
    }
}

impl From<Event> for VariableStorage {
    fn from(v: Event) -> Self {
        VariableStorage::Event(v)
    }
}

impl fmt::Display for VariableStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableStorage::Void => write!(f, "void"),
            VariableStorage::Dynamic => write!(f, "dynamic"),
            VariableStorage::Int(v) => write!(f, "{v}"),
            VariableStorage::Float(v) => write!(f, "{v}f"),
            VariableStorage::Double(v) => write!(f, "{v}"),
            VariableStorage::Block(b) => write!(f, "block[{}]", b.len()),
            VariableStorage::Ptr(_, size) => write!(f, "ptr[{size}]"),
            VariableStorage::Event(e) => {
                write!(f, "event({:?} n{} v{})", e.kind, e.note_number, e.velocity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_and_payload_are_consistent() {
        assert_eq!(VariableStorage::Int(3).get_type(), Types::Integer);
        assert_eq!(VariableStorage::Float(1.0).get_type(), Types::Float);
        assert_eq!(VariableStorage::Void.get_type(), Types::Void);
    }

    #[test]
    fn float_equality_uses_epsilon() {
        let a = VariableStorage::Float(1.0);
        let b = VariableStorage::Float(1.000_05);
        assert_eq!(a, b);
        let c = VariableStorage::Float(1.01);
        assert_ne!(a, c);
    }

    #[test]
    fn double_equality_uses_epsilon() {
        let a = VariableStorage::Double(2.0);
        let b = VariableStorage::Double(2.000_01);
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_accessors_convert() {
        let v = VariableStorage::Int(5);
        assert_eq!(v.to_float(), 5.0);
        assert_eq!(v.to_double(), 5.0);
        let f = VariableStorage::Double(2.75);
        assert_eq!(f.to_int(), 2); // truncate toward zero
    }

    #[test]
    fn cast_round_trip_is_lossless_for_small_ints() {
        let v = VariableStorage::Int(1 << 40);
        let back = v.cast_to(Types::Double).cast_to(Types::Integer);
        assert_eq!(back.to_int(), 1 << 40);
    }

    #[test]
    fn cast_to_own_type_is_noop() {
        let v = VariableStorage::Float(3.5);
        assert_eq!(v.cast_to(Types::Float), v);
    }

    #[test]
    fn block_is_non_owning() {
        let mut samples = vec![0.0f32; 16];
        let b = Block::from_slice(&mut samples);
        assert_eq!(b.len(), 16);
        let v = VariableStorage::from(b);
        assert_eq!(v.to_block().len(), 16);
        // samples still owned and usable here
        samples[0] = 1.0;
    }
}
