//! Resolved types and capability queries.
//!
//! Types are never inferred here. The host registers every type a tree
//! mentions and nodes carry the resulting [`TypeId`]. Reductions consult the
//! pool for capabilities such as "is this enumerable" or "does this
//! enumerator need disposing", at reduction time rather than at construction.

use std::fmt::Write as _;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::known::KnownNames;
use crate::{Name, SharedInterner};

/// Interned type identifier.
///
/// Primitive types are pre-interned at fixed indices; constructed and
/// nominal types start at [`TypeId::FIRST_COMPOUND`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub const UNIT: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const INT: TypeId = TypeId(2);
    pub const FLOAT: TypeId = TypeId(3);
    pub const STR: TypeId = TypeId(4);
    /// Top type; every type is assignable to it.
    pub const OBJECT: TypeId = TypeId(5);
    /// Type of type literals.
    pub const TYPE: TypeId = TypeId(6);
    /// Base of every thrown value type.
    pub const EXCEPTION: TypeId = TypeId(7);
    /// Type of expressions that never complete (goto, throw).
    pub const NEVER: TypeId = TypeId(8);
    /// Marker interface for types with a `dispose` capability.
    pub const DISPOSABLE: TypeId = TypeId(9);

    /// First ID for constructed and nominal types.
    pub const FIRST_COMPOUND: u32 = 10;

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::FIRST_COMPOUND
    }
}

impl std::fmt::Debug for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            TypeId::UNIT => write!(f, "TypeId::UNIT"),
            TypeId::BOOL => write!(f, "TypeId::BOOL"),
            TypeId::INT => write!(f, "TypeId::INT"),
            TypeId::FLOAT => write!(f, "TypeId::FLOAT"),
            TypeId::STR => write!(f, "TypeId::STR"),
            TypeId::OBJECT => write!(f, "TypeId::OBJECT"),
            TypeId::TYPE => write!(f, "TypeId::TYPE"),
            TypeId::EXCEPTION => write!(f, "TypeId::EXCEPTION"),
            TypeId::NEVER => write!(f, "TypeId::NEVER"),
            TypeId::DISPOSABLE => write!(f, "TypeId::DISPOSABLE"),
            TypeId(raw) => write!(f, "TypeId({raw})"),
        }
    }
}

bitflags! {
    /// Pre-computed type properties, set once when the type is registered.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TypeFlags: u16 {
        /// Values are references and may be null.
        const REFERENCE = 1 << 0;
        /// Int or Float.
        const NUMERIC = 1 << 1;
        /// Has an element type through a built-in collection or a `Sequence` interface.
        const ENUMERABLE = 1 << 2;
        /// Exposes a disposal capability.
        const DISPOSABLE = 1 << 3;
        /// Can be thrown.
        const EXCEPTION = 1 << 4;
        /// Compiler-introduced pass-through record (query transparent identifier).
        const TRANSPARENT = 1 << 5;
    }
}

/// How a member of a nominal type is accessed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field(TypeId),
    Property(TypeId),
    Method { params: Vec<TypeId>, ret: TypeId },
}

/// A member of a nominal type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Member {
    pub name: Name,
    pub kind: MemberKind,
}

impl Member {
    pub fn field(name: Name, ty: TypeId) -> Self {
        Member {
            name,
            kind: MemberKind::Field(ty),
        }
    }

    pub fn property(name: Name, ty: TypeId) -> Self {
        Member {
            name,
            kind: MemberKind::Property(ty),
        }
    }

    pub fn method(name: Name, params: Vec<TypeId>, ret: TypeId) -> Self {
        Member {
            name,
            kind: MemberKind::Method { params, ret },
        }
    }

    /// Value type for fields and properties, return type for methods.
    pub fn ty(&self) -> TypeId {
        match &self.kind {
            MemberKind::Field(ty) | MemberKind::Property(ty) => *ty,
            MemberKind::Method { ret, .. } => *ret,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, MemberKind::Method { .. })
    }
}

/// A nominal type declared by the host.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamedType {
    pub name: Name,
    pub members: Vec<Member>,
    /// Implemented interfaces (`Sequence<T>`, `DISPOSABLE`, `EXCEPTION`, ...).
    pub interfaces: Vec<TypeId>,
}

/// Structure of a type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Object,
    Type,
    Exception,
    Never,
    Disposable,
    /// Fixed-length indexable array.
    Array(TypeId),
    /// Growable list (query results, buffers).
    List(TypeId),
    /// The generic enumerable capability.
    Sequence(TypeId),
    /// The generic enumerator produced by `get_enumerator` on built-in collections.
    Enumerator(TypeId),
    /// Multi-map from key to elements, enumerated as groupings.
    Lookup { key: TypeId, element: TypeId },
    Grouping { key: TypeId, element: TypeId },
    Tuple(Vec<TypeId>),
    Function { params: Vec<TypeId>, ret: TypeId },
    Named(NamedType),
}

/// Where a `foreach` gets its enumerator from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EnumeratorSource {
    /// The collection type declares a compatible `get_enumerator()` member.
    Direct,
    /// Fallback through the generic enumerable capability.
    Generic,
}

/// How an enumerator exposes its current element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CurrentAccess {
    Member,
    Method,
}

/// Result of enumerator discovery for a collection type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EnumeratorShape {
    pub enumerator: TypeId,
    pub element: TypeId,
    pub source: EnumeratorSource,
    pub current: CurrentAccess,
}

/// Registry of resolved types.
#[derive(Clone, Debug)]
pub struct TypePool {
    data: Vec<TypeData>,
    flags: Vec<TypeFlags>,
    /// Structural dedup for constructed types. Named types are nominal and never deduped.
    dedup: FxHashMap<TypeData, TypeId>,
    interner: SharedInterner,
    names: KnownNames,
}

impl TypePool {
    /// Create a pool with the primitive types pre-registered.
    pub fn new(interner: SharedInterner) -> Self {
        let names = KnownNames::new(&interner);
        let mut pool = TypePool {
            data: Vec::new(),
            flags: Vec::new(),
            dedup: FxHashMap::default(),
            interner,
            names,
        };
        for data in [
            TypeData::Unit,
            TypeData::Bool,
            TypeData::Int,
            TypeData::Float,
            TypeData::Str,
            TypeData::Object,
            TypeData::Type,
            TypeData::Exception,
            TypeData::Never,
            TypeData::Disposable,
        ] {
            pool.intern(data);
        }
        debug_assert_eq!(pool.data.len(), TypeId::FIRST_COMPOUND as usize);
        pool
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    /// Register a structural type, returning the existing id for a repeat.
    pub fn intern(&mut self, data: TypeData) -> TypeId {
        if !matches!(data, TypeData::Named(_)) {
            if let Some(&id) = self.dedup.get(&data) {
                return id;
            }
        }
        let id = TypeId(crate::ids::to_u32(self.data.len(), "types"));
        let flags = self.compute_flags(&data);
        if !matches!(data, TypeData::Named(_)) {
            self.dedup.insert(data.clone(), id);
        }
        self.data.push(data);
        self.flags.push(flags);
        id
    }

    pub fn array(&mut self, element: TypeId) -> TypeId {
        self.intern(TypeData::Array(element))
    }

    pub fn list(&mut self, element: TypeId) -> TypeId {
        self.intern(TypeData::List(element))
    }

    pub fn sequence(&mut self, element: TypeId) -> TypeId {
        self.intern(TypeData::Sequence(element))
    }

    pub fn enumerator(&mut self, element: TypeId) -> TypeId {
        self.intern(TypeData::Enumerator(element))
    }

    pub fn lookup(&mut self, key: TypeId, element: TypeId) -> TypeId {
        // Enumerating a lookup yields groupings, so the grouping must exist.
        self.grouping(key, element);
        self.intern(TypeData::Lookup { key, element })
    }

    pub fn grouping(&mut self, key: TypeId, element: TypeId) -> TypeId {
        self.intern(TypeData::Grouping { key, element })
    }

    pub fn tuple(&mut self, elements: &[TypeId]) -> TypeId {
        self.intern(TypeData::Tuple(elements.to_vec()))
    }

    pub fn function(&mut self, params: &[TypeId], ret: TypeId) -> TypeId {
        self.intern(TypeData::Function {
            params: params.to_vec(),
            ret,
        })
    }

    /// Declare a nominal type.
    pub fn declare_named(
        &mut self,
        name: Name,
        members: Vec<Member>,
        interfaces: Vec<TypeId>,
    ) -> TypeId {
        self.intern(TypeData::Named(NamedType {
            name,
            members,
            interfaces,
        }))
    }

    /// Declare a compiler-introduced pass-through record with the given fields.
    pub fn declare_transparent_record(&mut self, name: Name, fields: &[(Name, TypeId)]) -> TypeId {
        let members = fields
            .iter()
            .map(|&(field, ty)| Member::field(field, ty))
            .collect();
        let id = self.declare_named(name, members, Vec::new());
        self.flags[id.0 as usize] |= TypeFlags::TRANSPARENT;
        id
    }

    #[inline]
    pub fn get(&self, id: TypeId) -> &TypeData {
        &self.data[id.0 as usize]
    }

    #[inline]
    pub fn flags(&self, id: TypeId) -> TypeFlags {
        self.flags[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        self.flags(id).contains(TypeFlags::NUMERIC)
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        self.flags(id).contains(TypeFlags::REFERENCE)
    }

    pub fn is_transparent(&self, id: TypeId) -> bool {
        self.flags(id).contains(TypeFlags::TRANSPARENT)
    }

    fn compute_flags(&self, data: &TypeData) -> TypeFlags {
        match data {
            TypeData::Int | TypeData::Float => TypeFlags::NUMERIC,
            TypeData::Unit | TypeData::Bool | TypeData::Type | TypeData::Never => {
                TypeFlags::empty()
            }
            TypeData::Str | TypeData::Object | TypeData::Function { .. } | TypeData::Tuple(_) => {
                TypeFlags::REFERENCE
            }
            TypeData::Exception => TypeFlags::REFERENCE | TypeFlags::EXCEPTION,
            TypeData::Disposable => TypeFlags::REFERENCE | TypeFlags::DISPOSABLE,
            TypeData::Array(_)
            | TypeData::List(_)
            | TypeData::Sequence(_)
            | TypeData::Lookup { .. }
            | TypeData::Grouping { .. } => TypeFlags::REFERENCE | TypeFlags::ENUMERABLE,
            TypeData::Enumerator(_) => TypeFlags::REFERENCE | TypeFlags::DISPOSABLE,
            TypeData::Named(named) => {
                let mut flags = TypeFlags::REFERENCE;
                for &iface in &named.interfaces {
                    let iface_flags = self.flags(iface);
                    flags |= iface_flags
                        & (TypeFlags::ENUMERABLE | TypeFlags::DISPOSABLE | TypeFlags::EXCEPTION);
                }
                let has_dispose = named
                    .members
                    .iter()
                    .any(|m| m.name == self.names.dispose && is_nullary_method(m));
                if has_dispose {
                    flags |= TypeFlags::DISPOSABLE;
                }
                flags
            }
        }
    }

    /// Find a member of a nominal type, searching implemented interfaces too.
    pub fn member(&self, ty: TypeId, name: Name) -> Option<&Member> {
        let TypeData::Named(named) = self.get(ty) else {
            return None;
        };
        named
            .members
            .iter()
            .find(|m| m.name == name)
            .or_else(|| named.interfaces.iter().find_map(|&i| self.member(i, name)))
    }

    /// Element type of an enumerable type, if it has one.
    pub fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.get(ty) {
            TypeData::Array(e) | TypeData::List(e) | TypeData::Sequence(e) => Some(*e),
            TypeData::Grouping { element, .. } => Some(*element),
            TypeData::Lookup { key, element } => self.find(&TypeData::Grouping {
                key: *key,
                element: *element,
            }),
            TypeData::Named(named) => named
                .interfaces
                .iter()
                .find_map(|&iface| self.element_type(iface)),
            _ => None,
        }
    }

    /// Look up an already-registered structural type without registering it.
    pub fn find(&self, data: &TypeData) -> Option<TypeId> {
        self.dedup.get(data).copied()
    }

    /// Whether `ty` has an element type through any enumerable capability.
    pub fn is_enumerable(&self, ty: TypeId) -> bool {
        self.flags(ty).contains(TypeFlags::ENUMERABLE) || self.direct_enumerator(ty).is_some()
    }

    /// Discover how to enumerate `ty`.
    ///
    /// A directly declared `get_enumerator()` whose result has `move_next()`
    /// and `current` wins; otherwise the generic enumerable capability is used,
    /// producing the built-in `Enumerator<T>`.
    pub fn enumerator_shape(&mut self, ty: TypeId) -> Option<EnumeratorShape> {
        if let Some(shape) = self.direct_enumerator(ty) {
            return Some(shape);
        }
        let element = self.element_type(ty)?;
        let enumerator = self.enumerator(element);
        Some(EnumeratorShape {
            enumerator,
            element,
            source: EnumeratorSource::Generic,
            current: CurrentAccess::Member,
        })
    }

    fn direct_enumerator(&self, ty: TypeId) -> Option<EnumeratorShape> {
        let get = self.member(ty, self.names.get_enumerator)?;
        if !is_nullary_method(get) {
            return None;
        }
        let enumerator = get.ty();
        if let TypeData::Enumerator(element) = self.get(enumerator) {
            return Some(EnumeratorShape {
                enumerator,
                element: *element,
                source: EnumeratorSource::Direct,
                current: CurrentAccess::Member,
            });
        }
        let move_next = self.member(enumerator, self.names.move_next)?;
        if !is_nullary_method(move_next) || move_next.ty() != TypeId::BOOL {
            return None;
        }
        let current = self.member(enumerator, self.names.current)?;
        let access = match &current.kind {
            MemberKind::Field(_) | MemberKind::Property(_) => CurrentAccess::Member,
            MemberKind::Method { params, .. } if params.is_empty() => CurrentAccess::Method,
            MemberKind::Method { .. } => return None,
        };
        Some(EnumeratorShape {
            enumerator,
            element: current.ty(),
            source: EnumeratorSource::Direct,
            current: access,
        })
    }

    /// Whether values of `ty` expose a disposal capability.
    pub fn is_disposable(&self, ty: TypeId) -> bool {
        self.flags(ty).contains(TypeFlags::DISPOSABLE)
    }

    /// Whether a value of type `from` can be stored where `to` is expected.
    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        if from == to || to == TypeId::OBJECT || from == TypeId::NEVER {
            return true;
        }
        match (self.get(from), self.get(to)) {
            (TypeData::Array(e) | TypeData::List(e), TypeData::Sequence(t))
            | (TypeData::Grouping { element: e, .. }, TypeData::Sequence(t)) => e == t,
            (TypeData::Lookup { key, element }, TypeData::Sequence(t)) => {
                matches!(self.get(*t), TypeData::Grouping { key: k, element: e } if k == key && e == element)
            }
            (TypeData::Enumerator(_), TypeData::Disposable) => true,
            (TypeData::Named(named), _) => {
                (to == TypeId::DISPOSABLE && self.is_disposable(from))
                    || named
                        .interfaces
                        .iter()
                        .any(|&iface| self.is_assignable(iface, to))
            }
            _ => false,
        }
    }

    /// Field names and types of a tuple or record type, in declaration order.
    pub fn fields(&self, ty: TypeId) -> Option<Vec<(Name, TypeId)>> {
        match self.get(ty) {
            TypeData::Tuple(elements) => Some(
                elements
                    .iter()
                    .enumerate()
                    .map(|(i, &e)| (self.interner.intern(&format!("item{}", i + 1)), e))
                    .collect(),
            ),
            TypeData::Named(named) => Some(
                named
                    .members
                    .iter()
                    .filter(|m| !m.is_method())
                    .map(|m| (m.name, m.ty()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Human-readable rendering for diagnostics.
    pub fn display(&self, ty: TypeId) -> String {
        let mut out = String::new();
        self.write_type(&mut out, ty);
        out
    }

    fn write_type(&self, out: &mut String, ty: TypeId) {
        let list = |pool: &Self, out: &mut String, items: &[TypeId]| {
            for (i, &item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                pool.write_type(out, item);
            }
        };
        match self.get(ty) {
            TypeData::Unit => out.push_str("unit"),
            TypeData::Bool => out.push_str("bool"),
            TypeData::Int => out.push_str("int"),
            TypeData::Float => out.push_str("float"),
            TypeData::Str => out.push_str("str"),
            TypeData::Object => out.push_str("object"),
            TypeData::Type => out.push_str("type"),
            TypeData::Exception => out.push_str("exception"),
            TypeData::Never => out.push_str("never"),
            TypeData::Disposable => out.push_str("disposable"),
            TypeData::Array(e) => {
                self.write_type(out, *e);
                out.push_str("[]");
            }
            TypeData::List(e) => self.write_generic(out, "List", &[*e]),
            TypeData::Sequence(e) => self.write_generic(out, "Sequence", &[*e]),
            TypeData::Enumerator(e) => self.write_generic(out, "Enumerator", &[*e]),
            TypeData::Lookup { key, element } => self.write_generic(out, "Lookup", &[*key, *element]),
            TypeData::Grouping { key, element } => {
                self.write_generic(out, "Grouping", &[*key, *element]);
            }
            TypeData::Tuple(elements) => {
                out.push('(');
                list(self, out, elements);
                out.push(')');
            }
            TypeData::Function { params, ret } => {
                out.push_str("fn(");
                list(self, out, params);
                out.push_str(") -> ");
                self.write_type(out, *ret);
            }
            TypeData::Named(named) => out.push_str(self.interner.lookup(named.name)),
        }
    }

    fn write_generic(&self, out: &mut String, head: &str, args: &[TypeId]) {
        let _ = write!(out, "{head}<");
        for (i, &arg) in args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_type(out, arg);
        }
        out.push('>');
    }
}

fn is_nullary_method(member: &Member) -> bool {
    matches!(&member.kind, MemberKind::Method { params, .. } if params.is_empty())
}
