//! String interner for identifier storage.
//!
//! Compilation is single-threaded per compile request, so the interner is a
//! plain map without sharding or locking. One interner instance is owned by
//! each compilation and threaded through the lexer and parser.

use rustc_hash::FxHashMap;
use std::fmt;

/// Interned string identifier.
///
/// 32-bit index into the owning [`StringInterner`]. Comparing two `Name`s
/// from the same interner is an integer compare.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

/// Owns every identifier string seen during one compilation.
pub struct StringInterner {
    map: FxHashMap<String, u32>,
    strings: Vec<String>,
}

impl StringInterner {
    pub fn new() -> Self {
        let mut interner = StringInterner {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(64),
        };
        // Index 0 is the pre-interned empty string.
        interner.map.insert(String::new(), 0);
        interner.strings.push(String::new());
        interner
    }

    /// Intern a string, returning its stable `Name`.
    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(&idx) = self.map.get(s) {
            return Name(idx);
        }
        let idx = u32::try_from(self.strings.len())
            .unwrap_or_else(|_| panic!("interner exceeded u32::MAX strings"));
        self.map.insert(s.to_owned(), idx);
        self.strings.push(s.to_owned());
        Name(idx)
    }

    /// Resolve a `Name` back to its string.
    ///
    /// # Panics
    /// Panics if `name` was not produced by this interner.
    #[inline]
    pub fn resolve(&self, name: Name) -> &str {
        &self.strings[name.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        // Index 0 is always present.
        self.strings.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}
