//! The closed primitive type enumeration and coercion policy helpers.

use std::fmt;

/// Primitive type of a SNEX value.
///
/// `Dynamic` marks an unresolved type (`auto` or a deferred template
/// argument) and must be resolved to a concrete type before code
/// generation; reaching codegen with `Dynamic` is an internal error.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Types {
    #[default]
    Void,
    Integer,
    Float,
    Double,
    Block,
    Pointer,
    Event,
    Dynamic,
}

impl Types {
    /// Byte size of a value of this type on the data block.
    ///
    /// The language `int` is 32 bits wide; `block` is pointer + length.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Types::Void | Types::Dynamic => 0,
            Types::Integer | Types::Float => 4,
            Types::Double | Types::Pointer => 8,
            Types::Block => 16,
            Types::Event => 16,
        }
    }

    /// Natural alignment, derived from size.
    pub const fn alignment(self) -> usize {
        match self {
            Types::Void | Types::Dynamic => 1,
            Types::Integer | Types::Float => 4,
            Types::Double | Types::Pointer | Types::Block | Types::Event => 8,
        }
    }

    pub const fn is_numeric(self) -> bool {
        matches!(self, Types::Integer | Types::Float | Types::Double)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Types::Float | Types::Double)
    }

    pub const fn is_fixed(self) -> bool {
        !matches!(self, Types::Dynamic)
    }

    /// Whether a value of `other` may appear where `self` is expected.
    ///
    /// Numeric types convert freely among each other (the cast is inserted
    /// by the type checker). `Pointer` never mixes with numerics. When
    /// `relaxed_floats` is off, `float` and `double` are distinct and only
    /// widen/narrow through an explicit cast.
    pub fn matches_type(self, other: Types, relaxed_floats: bool) -> bool {
        if self == other {
            return true;
        }
        if self.is_numeric() && other.is_numeric() {
            if self.is_float() && other.is_float() {
                return relaxed_floats;
            }
            return true;
        }
        matches!(self, Types::Dynamic) || matches!(other, Types::Dynamic)
    }

    /// Keyword spelling used in diagnostics and tree dumps.
    pub const fn as_str(self) -> &'static str {
        match self {
            Types::Void => "void",
            Types::Integer => "int",
            Types::Float => "float",
            Types::Double => "double",
            Types::Block => "block",
            Types::Pointer => "pointer",
            Types::Event => "event",
            Types::Dynamic => "auto",
        }
    }
}

impl fmt::Display for Types {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference into the complex-type registry (structs, spans, dyns).
///
/// The registry itself lives in `snex_types`; the id is defined here so
/// syntax-tree nodes can reference complex types without a crate cycle.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct ComplexTypeId(pub u32);

/// A resolved or deferred type annotation on a symbol or tree node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeInfo {
    /// One of the closed primitive types.
    Primitive(Types),
    /// A registered struct/span/dyn type.
    Complex(ComplexTypeId),
}

impl TypeInfo {
    pub const DYNAMIC: TypeInfo = TypeInfo::Primitive(Types::Dynamic);
    pub const VOID: TypeInfo = TypeInfo::Primitive(Types::Void);

    /// The primitive register type used when a value of this type is
    /// materialized. Complex types are addressed through a pointer.
    pub const fn register_type(self) -> Types {
        match self {
            TypeInfo::Primitive(t) => t,
            TypeInfo::Complex(_) => Types::Pointer,
        }
    }

    pub const fn is_dynamic(self) -> bool {
        matches!(self, TypeInfo::Primitive(Types::Dynamic))
    }

    pub const fn is_void(self) -> bool {
        matches!(self, TypeInfo::Primitive(Types::Void))
    }
}

impl Default for TypeInfo {
    fn default() -> Self {
        TypeInfo::DYNAMIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_matching_is_symmetric() {
        for &a in &[Types::Integer, Types::Float, Types::Double] {
            for &b in &[Types::Integer, Types::Float, Types::Double] {
                assert_eq!(
                    a.matches_type(b, true),
                    b.matches_type(a, true),
                    "{a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn strict_floats_reject_mixing() {
        assert!(!Types::Float.matches_type(Types::Double, false));
        assert!(Types::Float.matches_type(Types::Double, true));
        assert!(Types::Float.matches_type(Types::Integer, false));
    }

    #[test]
    fn pointer_never_coerces_with_numerics() {
        for &n in &[Types::Integer, Types::Float, Types::Double] {
            assert!(!Types::Pointer.matches_type(n, true));
            assert!(!n.matches_type(Types::Pointer, true));
        }
    }

    #[test]
    fn sizes() {
        assert_eq!(Types::Integer.size_in_bytes(), 4);
        assert_eq!(Types::Double.size_in_bytes(), 8);
        assert_eq!(Types::Void.size_in_bytes(), 0);
    }
}
