//! Complex type layout: structs, fixed-length spans, runtime-length dyns.
//!
//! Registered types are addressed by [`ComplexTypeId`]; layout (member
//! offsets, total size) is computed once during the `ComplexTypeParsing`
//! pass and is final afterward.

use rustc_hash::FxHashMap;
use snex_ir::{ComplexTypeId, Name, NamespacedIdentifier, TypeInfo, Types, VariableStorage};

use crate::Visibility;

/// One member of a struct layout.
#[derive(Clone, Debug)]
pub struct StructMember {
    pub name: Name,
    pub ty: TypeInfo,
    /// Byte offset into the struct's data block; valid once finalized.
    pub offset: u32,
    pub visibility: Visibility,
    pub default: Option<VariableStorage>,
}

/// The registered form of a complex type.
#[derive(Clone, Debug)]
pub enum ComplexTypeKind {
    Struct {
        name: NamespacedIdentifier,
        members: Vec<StructMember>,
    },
    /// `span<T, N>`: fixed, compile-time-known-length array.
    Span { element: TypeInfo, length: u32 },
    /// `dyn<T>`: runtime-length typed buffer view (pointer + length).
    Dyn { element: TypeInfo },
}

#[derive(Clone, Debug)]
pub struct ComplexType {
    pub kind: ComplexTypeKind,
    /// Total byte size; 0 until finalized for structs.
    size: u32,
    alignment: u32,
    finalized: bool,
}

impl ComplexType {
    pub fn size(&self) -> u32 {
        debug_assert!(self.finalized, "size taken before finalization");
        self.size
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Member lookup for struct types.
    pub fn member(&self, name: Name) -> Option<&StructMember> {
        match &self.kind {
            ComplexTypeKind::Struct { members, .. } => members.iter().find(|m| m.name == name),
            _ => None,
        }
    }
}

fn align_to(offset: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (offset + alignment - 1) & !(alignment - 1)
}

/// Registry owning every complex type of one compilation.
///
/// Span/dyn types are deduplicated on registration so repeated spellings of
/// the same `span<T, N>` share one id, mirroring template memoization.
#[derive(Default)]
pub struct ComplexTypeRegistry {
    types: Vec<ComplexType>,
    span_cache: FxHashMap<(TypeInfo, u32), ComplexTypeId>,
    dyn_cache: FxHashMap<TypeInfo, ComplexTypeId>,
}

impl ComplexTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ComplexTypeId) -> &ComplexType {
        &self.types[id.0 as usize]
    }

    /// Byte size of any type annotation, complex types included.
    pub fn size_of(&self, ty: TypeInfo) -> u32 {
        match ty {
            TypeInfo::Primitive(p) => p.size_in_bytes() as u32,
            TypeInfo::Complex(id) => self.get(id).size(),
        }
    }

    pub fn alignment_of(&self, ty: TypeInfo) -> u32 {
        match ty {
            TypeInfo::Primitive(p) => p.alignment() as u32,
            TypeInfo::Complex(id) => self.get(id).alignment(),
        }
    }

    /// Register (or reuse) a `span<element, length>` type.
    pub fn register_span(&mut self, element: TypeInfo, length: u32) -> ComplexTypeId {
        if let Some(&id) = self.span_cache.get(&(element, length)) {
            return id;
        }
        let elem_size = self.size_of(element);
        let alignment = self.alignment_of(element).max(1);
        let id = ComplexTypeId(self.types.len() as u32);
        self.types.push(ComplexType {
            kind: ComplexTypeKind::Span { element, length },
            size: elem_size * length,
            alignment,
            finalized: true,
        });
        self.span_cache.insert((element, length), id);
        id
    }

    /// Register (or reuse) a `dyn<element>` type. Layout is pointer+length,
    /// like a block header.
    pub fn register_dyn(&mut self, element: TypeInfo) -> ComplexTypeId {
        if let Some(&id) = self.dyn_cache.get(&element) {
            return id;
        }
        let id = ComplexTypeId(self.types.len() as u32);
        self.types.push(ComplexType {
            kind: ComplexTypeKind::Dyn { element },
            size: Types::Block.size_in_bytes() as u32,
            alignment: 8,
            finalized: true,
        });
        self.dyn_cache.insert(element, id);
        id
    }

    /// Start a struct type; members are added before `finalize_struct`.
    pub fn register_struct(&mut self, name: NamespacedIdentifier) -> ComplexTypeId {
        let id = ComplexTypeId(self.types.len() as u32);
        self.types.push(ComplexType {
            kind: ComplexTypeKind::Struct {
                name,
                members: Vec::new(),
            },
            size: 0,
            alignment: 1,
            finalized: false,
        });
        id
    }

    pub fn add_struct_member(
        &mut self,
        id: ComplexTypeId,
        name: Name,
        ty: TypeInfo,
        visibility: Visibility,
        default: Option<VariableStorage>,
    ) {
        let ty_align = self.alignment_of(ty);
        let t = &mut self.types[id.0 as usize];
        debug_assert!(!t.finalized, "member added after finalization");
        t.alignment = t.alignment.max(ty_align);
        if let ComplexTypeKind::Struct { members, .. } = &mut t.kind {
            members.push(StructMember {
                name,
                ty,
                offset: 0,
                visibility,
                default,
            });
        }
    }

    /// Compute member offsets and total size. Must run before any member
    /// offset is taken as final.
    pub fn finalize_struct(&mut self, id: ComplexTypeId) {
        // Sizes of nested complex members must be read before the mutable
        // borrow; collect them first.
        let member_info: Vec<(u32, u32)> = match &self.types[id.0 as usize].kind {
            ComplexTypeKind::Struct { members, .. } => members
                .iter()
                .map(|m| (self.size_of(m.ty), self.alignment_of(m.ty)))
                .collect(),
            _ => Vec::new(),
        };

        let t = &mut self.types[id.0 as usize];
        let ComplexTypeKind::Struct { members, .. } = &mut t.kind else {
            t.finalized = true;
            return;
        };
        let mut offset = 0u32;
        for (member, (size, alignment)) in members.iter_mut().zip(member_info) {
            offset = align_to(offset, alignment);
            member.offset = offset;
            offset += size;
        }
        t.size = align_to(offset.max(1), t.alignment);
        t.finalized = true;
    }

    /// All registered types, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ComplexTypeId, &ComplexType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (ComplexTypeId(i as u32), t))
    }

    /// Element type for subscript access, if `ty` is subscriptable.
    pub fn element_type(&self, ty: TypeInfo) -> Option<TypeInfo> {
        match ty {
            TypeInfo::Primitive(Types::Block) => Some(TypeInfo::Primitive(Types::Float)),
            TypeInfo::Complex(id) => match self.get(id).kind {
                ComplexTypeKind::Span { element, .. } | ComplexTypeKind::Dyn { element } => {
                    Some(element)
                }
                ComplexTypeKind::Struct { .. } => None,
            },
            _ => None,
        }
    }

    /// Compile-time length for span types.
    pub fn fixed_length(&self, ty: TypeInfo) -> Option<u32> {
        match ty {
            TypeInfo::Complex(id) => match self.get(id).kind {
                ComplexTypeKind::Span { length, .. } => Some(length),
                _ => None,
            },
            _ => None,
        }
    }
}
