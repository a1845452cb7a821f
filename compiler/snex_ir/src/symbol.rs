//! Symbols and namespaced identifiers.

use crate::interner::{Name, StringInterner};
use crate::types::TypeInfo;
use crate::value::VariableStorage;
use smallvec::SmallVec;
use std::fmt;

bitflags::bitflags! {
    /// Modifier flags attached to a declared symbol.
    #[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
    pub struct SymbolFlags: u8 {
        /// Declared as a reference (`&`) binding.
        const REFERENCE = 1 << 0;
        /// `const`-qualified; assignment after initialization is an error.
        const CONST = 1 << 1;
        const STATIC = 1 << 2;
        /// Resolved to a compile-time constant with an attached value.
        const COMPILE_TIME_CONSTANT = 1 << 3;
        /// Function parameter; addressed by argument slot, never by offset.
        const PARAMETER = 1 << 4;
    }
}

/// A possibly-qualified identifier: `Math::sin`, `MyClass::member`, `x`.
///
/// The path holds at least one segment; the last segment is the plain name.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct NamespacedIdentifier {
    path: SmallVec<[Name; 2]>,
}

impl NamespacedIdentifier {
    pub fn new(name: Name) -> Self {
        let mut path = SmallVec::new();
        path.push(name);
        NamespacedIdentifier { path }
    }

    pub fn from_path(path: impl IntoIterator<Item = Name>) -> Self {
        let path: SmallVec<[Name; 2]> = path.into_iter().collect();
        debug_assert!(!path.is_empty(), "identifier path must not be empty");
        NamespacedIdentifier { path }
    }

    /// The unqualified trailing name.
    #[inline]
    pub fn id(&self) -> Name {
        self.path[self.path.len() - 1]
    }

    #[inline]
    pub fn is_qualified(&self) -> bool {
        self.path.len() > 1
    }

    #[inline]
    pub fn segments(&self) -> &[Name] {
        &self.path
    }

    /// The enclosing namespace path, if any.
    pub fn parent(&self) -> Option<NamespacedIdentifier> {
        if self.path.len() < 2 {
            return None;
        }
        Some(NamespacedIdentifier {
            path: self.path[..self.path.len() - 1].iter().copied().collect(),
        })
    }

    /// Qualify `name` inside this namespace.
    #[must_use]
    pub fn child(&self, name: Name) -> NamespacedIdentifier {
        let mut path = self.path.clone();
        path.push(name);
        NamespacedIdentifier { path }
    }

    /// Join a relative identifier onto this namespace.
    #[must_use]
    pub fn join(&self, relative: &NamespacedIdentifier) -> NamespacedIdentifier {
        let mut path = self.path.clone();
        path.extend(relative.path.iter().copied());
        NamespacedIdentifier { path }
    }

    pub fn display<'a>(&'a self, interner: &'a StringInterner) -> DisplayId<'a> {
        DisplayId { id: self, interner }
    }
}

/// Borrowed display adapter resolving interned segments.
pub struct DisplayId<'a> {
    id: &'a NamespacedIdentifier,
    interner: &'a StringInterner,
}

impl fmt::Display for DisplayId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.id.path.iter().enumerate() {
            if i > 0 {
                f.write_str("::")?;
            }
            f.write_str(self.interner.resolve(*seg))?;
        }
        Ok(())
    }
}

/// A declared name together with its resolved type and modifiers.
///
/// Created when a declaration is parsed; the type and constant value are
/// filled in as the resolution passes run, immutable afterward.
#[derive(Clone, PartialEq, Debug)]
pub struct Symbol {
    pub id: NamespacedIdentifier,
    pub type_info: TypeInfo,
    pub flags: SymbolFlags,
    /// Attached value once the symbol is known to be a compile-time constant.
    pub constant: Option<VariableStorage>,
}

impl Symbol {
    pub fn new(id: NamespacedIdentifier, type_info: TypeInfo) -> Self {
        Symbol {
            id,
            type_info,
            flags: SymbolFlags::empty(),
            constant: None,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: SymbolFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn name(&self) -> Name {
        self.id.id()
    }

    pub fn is_const(&self) -> bool {
        self.flags.contains(SymbolFlags::CONST)
    }

    pub fn is_compile_time_constant(&self) -> bool {
        self.flags.contains(SymbolFlags::COMPILE_TIME_CONSTANT)
    }

    /// Attach the resolved constant value and flag the symbol accordingly.
    pub fn set_constant(&mut self, value: VariableStorage) {
        self.constant = Some(value);
        self.flags.insert(SymbolFlags::COMPILE_TIME_CONSTANT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Types;

    #[test]
    fn qualification() {
        let mut i = StringInterner::new();
        let math = i.intern("Math");
        let sin = i.intern("sin");
        let id = NamespacedIdentifier::new(math).child(sin);
        assert!(id.is_qualified());
        assert_eq!(id.id(), sin);
        assert_eq!(id.parent(), Some(NamespacedIdentifier::new(math)));
        assert_eq!(format!("{}", id.display(&i)), "Math::sin");
    }

    #[test]
    fn constant_flagging() {
        let mut i = StringInterner::new();
        let x = NamespacedIdentifier::new(i.intern("x"));
        let mut sym = Symbol::new(x, TypeInfo::Primitive(Types::Integer));
        assert!(!sym.is_compile_time_constant());
        sym.set_constant(VariableStorage::Int(4));
        assert!(sym.is_compile_time_constant());
        assert_eq!(sym.constant, Some(VariableStorage::Int(4)));
    }
}
