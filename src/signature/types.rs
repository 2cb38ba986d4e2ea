//! Interned type signatures.
//!
//! A [`TypeSignature`] names a type by its fully qualified name and a [`TypeKind`]. Signatures are
//! module independent: two modules that both reference `Game.Player` share one signature, and
//! every lookup for a name returns the same [`Arc`]-backed handle. The intern table is created on
//! first use and lives for the rest of the process.
//!
//! The built-in types are interned up-front and can be fetched infallibly through
//! [`TypeSignature::builtin`].

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use dashmap::{mapref::entry::Entry, DashMap};
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    metadata::typesig::TypeSig,
    signature::{CallingConvention, FieldSignature, MethodSignature},
    Error, Result,
};

/// The kind of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A reference type (`ELEMENT_TYPE_CLASS`)
    Class,
    /// A value type (`ELEMENT_TYPE_VALUETYPE`)
    Value,
    /// One of the [`Primitive`] types with a dedicated element type
    BuiltIn,
}

/// Types with a dedicated ECMA-335 element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum Primitive {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    TypedReference,
    I,
    U,
    Object,
}

impl Primitive {
    /// The fully qualified runtime name.
    #[must_use]
    pub fn full_name(self) -> &'static str {
        match self {
            Primitive::Void => "System.Void",
            Primitive::Boolean => "System.Boolean",
            Primitive::Char => "System.Char",
            Primitive::I1 => "System.SByte",
            Primitive::U1 => "System.Byte",
            Primitive::I2 => "System.Int16",
            Primitive::U2 => "System.UInt16",
            Primitive::I4 => "System.Int32",
            Primitive::U4 => "System.UInt32",
            Primitive::I8 => "System.Int64",
            Primitive::U8 => "System.UInt64",
            Primitive::R4 => "System.Single",
            Primitive::R8 => "System.Double",
            Primitive::String => "System.String",
            Primitive::TypedReference => "System.TypedReference",
            Primitive::I => "System.IntPtr",
            Primitive::U => "System.UIntPtr",
            Primitive::Object => "System.Object",
        }
    }

    /// The ECMA-335 II.23.1.16 element type.
    #[must_use]
    pub fn element_type(self) -> u8 {
        match self {
            Primitive::Void => 0x01,
            Primitive::Boolean => 0x02,
            Primitive::Char => 0x03,
            Primitive::I1 => 0x04,
            Primitive::U1 => 0x05,
            Primitive::I2 => 0x06,
            Primitive::U2 => 0x07,
            Primitive::I4 => 0x08,
            Primitive::U4 => 0x09,
            Primitive::I8 => 0x0A,
            Primitive::U8 => 0x0B,
            Primitive::R4 => 0x0C,
            Primitive::R8 => 0x0D,
            Primitive::String => 0x0E,
            Primitive::TypedReference => 0x16,
            Primitive::I => 0x18,
            Primitive::U => 0x19,
            Primitive::Object => 0x1C,
        }
    }

    /// Maps an element type back to its primitive, if it has one.
    #[must_use]
    pub fn from_element_type(element_type: u8) -> Option<Primitive> {
        Primitive::iter().find(|p| p.element_type() == element_type)
    }

    /// Looks a primitive up by its fully qualified name.
    #[must_use]
    pub fn from_full_name(name: &str) -> Option<Primitive> {
        Primitive::iter().find(|p| p.full_name() == name)
    }
}

#[derive(Debug)]
struct Data {
    full_name: String,
    kind: TypeKind,
    primitive: Option<Primitive>,
}

/// Canonical, interned identifier of a named type.
///
/// Equality, hashing and ordering go by full name only, so signatures compare equal across
/// modules.
#[derive(Clone)]
pub struct TypeSignature(Arc<Data>);

fn table() -> &'static DashMap<String, TypeSignature> {
    static TABLE: OnceLock<DashMap<String, TypeSignature>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let table = DashMap::new();
        for builtin in builtins() {
            table.insert(builtin.0.full_name.clone(), builtin.clone());
        }
        table
    })
}

fn builtins() -> &'static [TypeSignature] {
    static BUILTINS: OnceLock<Vec<TypeSignature>> = OnceLock::new();
    BUILTINS.get_or_init(|| {
        Primitive::iter()
            .map(|primitive| {
                TypeSignature(Arc::new(Data {
                    full_name: primitive.full_name().to_string(),
                    kind: TypeKind::BuiltIn,
                    primitive: Some(primitive),
                }))
            })
            .collect()
    })
}

impl TypeSignature {
    /// Returns the canonical signature for `full_name`, interning it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the name was previously interned with a
    /// different kind. A built-in is returned as is regardless of the requested kind.
    pub fn get(full_name: &str, kind: TypeKind) -> Result<TypeSignature> {
        if let Some(existing) = table().get(full_name) {
            return Self::check_kind(existing.value(), kind);
        }

        match table().entry(full_name.to_string()) {
            Entry::Occupied(entry) => Self::check_kind(entry.get(), kind),
            Entry::Vacant(entry) => {
                let signature = TypeSignature(Arc::new(Data {
                    full_name: full_name.to_string(),
                    kind,
                    primitive: None,
                }));
                entry.insert(signature.clone());
                Ok(signature)
            }
        }
    }

    fn check_kind(existing: &TypeSignature, kind: TypeKind) -> Result<TypeSignature> {
        if existing.0.kind == kind || existing.0.kind == TypeKind::BuiltIn {
            Ok(existing.clone())
        } else {
            Err(Error::Configuration(format!(
                "type {} was interned as {:?}, requested as {:?}",
                existing.0.full_name, existing.0.kind, kind
            )))
        }
    }

    /// Shorthand for [`TypeSignature::get`] with [`TypeKind::Class`].
    ///
    /// # Errors
    ///
    /// See [`TypeSignature::get`].
    pub fn class(full_name: &str) -> Result<TypeSignature> {
        Self::get(full_name, TypeKind::Class)
    }

    /// Shorthand for [`TypeSignature::get`] with [`TypeKind::Value`].
    ///
    /// # Errors
    ///
    /// See [`TypeSignature::get`].
    pub fn value(full_name: &str) -> Result<TypeSignature> {
        Self::get(full_name, TypeKind::Value)
    }

    /// Returns the process-wide singleton for a built-in type.
    #[must_use]
    pub fn builtin(primitive: Primitive) -> TypeSignature {
        builtins()[primitive as usize].clone()
    }

    /// Number of built-in types.
    #[must_use]
    pub fn builtin_count() -> usize {
        Primitive::COUNT
    }

    /// The fully qualified name, e.g. `Game.Player/Inventory`.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.0.full_name
    }

    /// The kind the signature was interned with.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    /// The primitive behind a built-in signature.
    #[must_use]
    pub fn primitive(&self) -> Option<Primitive> {
        self.0.primitive
    }

    /// Returns `true` for value types and value-like built-ins.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self.0.primitive {
            Some(Primitive::String | Primitive::Object) => false,
            Some(_) => true,
            None => self.0.kind == TypeKind::Value,
        }
    }

    /// The namespace part of the name, empty for the global namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        let outer = self.outermost();
        match outer.rfind('.') {
            Some(index) => &outer[..index],
            None => "",
        }
    }

    /// The simple name, the part after the last `.` or `/`.
    #[must_use]
    pub fn name(&self) -> &str {
        let full = &self.0.full_name;
        match full.rfind('/') {
            Some(index) => &full[index + 1..],
            None => match full.rfind('.') {
                Some(index) => &full[index + 1..],
                None => full,
            },
        }
    }

    /// Returns the enclosing type name for a nested type (`Outer/Inner`).
    #[must_use]
    pub fn enclosing_name(&self) -> Option<&str> {
        self.0.full_name.rfind('/').map(|i| &self.0.full_name[..i])
    }

    fn outermost(&self) -> &str {
        match self.0.full_name.find('/') {
            Some(index) => &self.0.full_name[..index],
            None => &self.0.full_name,
        }
    }

    /// Builds a field signature declared on this type.
    #[must_use]
    pub fn field(&self, name: &str, field_type: TypeSig) -> FieldSignature {
        FieldSignature::new(self.clone(), name, field_type)
    }

    /// Builds a method signature declared on this type.
    #[must_use]
    pub fn method(
        &self,
        name: &str,
        call_conv: CallingConvention,
        parameters: Vec<TypeSig>,
    ) -> MethodSignature {
        MethodSignature::new(self.clone(), name, call_conv, parameters)
    }
}

impl PartialEq for TypeSignature {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.full_name == other.0.full_name
    }
}

impl Eq for TypeSignature {}

impl Hash for TypeSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.full_name.hash(state);
    }
}

impl PartialOrd for TypeSignature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeSignature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.full_name.cmp(&other.0.full_name)
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.full_name)
    }
}

impl fmt::Debug for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeSignature({}, {:?})", self.0.full_name, self.0.kind)
    }
}
