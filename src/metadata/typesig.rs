//! Wrapped type shapes.
//!
//! [`TypeSig`] describes the type of a field, parameter, local or return value the way an
//! ECMA-335 signature blob does: a named or generic-parameter *leaf*, wrapped in any number of
//! arrays, pointers, by-refs, custom modifiers or generic instantiations. Substitution only ever
//! touches leaves; the wrapper chain is rebuilt around the replacement.
//!
//! # Examples
//!
//! ```rust
//! use cilmixin::metadata::typesig::TypeSig;
//! use cilmixin::signature::TypeSignature;
//!
//! let player = TypeSignature::class("Game.Player")?;
//! let list = TypeSignature::class("System.Collections.Generic.List`1")?;
//!
//! let sig = TypeSig::GenericInst(
//!     Box::new(TypeSig::Named(list)),
//!     vec![TypeSig::SzArray(Box::new(TypeSig::Named(player)))],
//! );
//! assert_eq!(sig.to_string(), "System.Collections.Generic.List`1<Game.Player[]>");
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::fmt;

use crate::signature::{Primitive, TypeSignature};

/// Shape of a general (multi-dimensional) array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayShape {
    /// Number of dimensions
    pub rank: u32,
    /// Declared sizes of the leading dimensions
    pub sizes: Vec<u32>,
    /// Declared lower bounds of the leading dimensions
    pub lower_bounds: Vec<i32>,
}

/// A type as it appears in a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeSig {
    /// A named type
    Named(TypeSignature),
    /// Generic type parameter `!n`
    Var(u32),
    /// Generic method parameter `!!n`
    MVar(u32),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSig>),
    /// General array
    Array(Box<TypeSig>, ArrayShape),
    /// Fixed-size inline value array
    ValueArray(Box<TypeSig>, u32),
    /// Unmanaged pointer
    Ptr(Box<TypeSig>),
    /// Managed reference
    ByRef(Box<TypeSig>),
    /// Pinned local
    Pinned(Box<TypeSig>),
    /// Required custom modifier
    ModReqd(TypeSignature, Box<TypeSig>),
    /// Optional custom modifier
    ModOpt(TypeSignature, Box<TypeSig>),
    /// Generic instantiation: generic type plus arguments
    GenericInst(Box<TypeSig>, Vec<TypeSig>),
}

impl TypeSig {
    /// A built-in type.
    #[must_use]
    pub fn primitive(primitive: Primitive) -> TypeSig {
        TypeSig::Named(TypeSignature::builtin(primitive))
    }

    /// `System.Void`
    #[must_use]
    pub fn void() -> TypeSig {
        Self::primitive(Primitive::Void)
    }

    /// `System.Int32`
    #[must_use]
    pub fn int32() -> TypeSig {
        Self::primitive(Primitive::I4)
    }

    /// `System.String`
    #[must_use]
    pub fn string() -> TypeSig {
        Self::primitive(Primitive::String)
    }

    /// `System.Object`
    #[must_use]
    pub fn object() -> TypeSig {
        Self::primitive(Primitive::Object)
    }

    /// Returns the named leaf, following the wrapper chain inward. For a generic
    /// instantiation this is the generic type itself. Generic parameters have no named leaf.
    #[must_use]
    pub fn leaf(&self) -> Option<&TypeSignature> {
        match self {
            TypeSig::Named(signature) => Some(signature),
            TypeSig::Var(_) | TypeSig::MVar(_) => None,
            TypeSig::SzArray(inner)
            | TypeSig::Array(inner, _)
            | TypeSig::ValueArray(inner, _)
            | TypeSig::Ptr(inner)
            | TypeSig::ByRef(inner)
            | TypeSig::Pinned(inner)
            | TypeSig::ModReqd(_, inner)
            | TypeSig::ModOpt(_, inner)
            | TypeSig::GenericInst(inner, _) => inner.leaf(),
        }
    }

    /// Returns the shape with custom modifiers and `pinned` removed from the outside.
    #[must_use]
    pub fn strip_modifiers(&self) -> &TypeSig {
        match self {
            TypeSig::ModReqd(_, inner) | TypeSig::ModOpt(_, inner) | TypeSig::Pinned(inner) => {
                inner.strip_modifiers()
            }
            other => other,
        }
    }

    /// Rebuilds the shape with every named leaf, including generic arguments, passed through
    /// `map`. Modifier types are kept as they are.
    #[must_use]
    pub fn map_leaves<F>(&self, map: &F) -> TypeSig
    where
        F: Fn(&TypeSignature) -> TypeSignature,
    {
        match self {
            TypeSig::Named(signature) => TypeSig::Named(map(signature)),
            TypeSig::Var(index) => TypeSig::Var(*index),
            TypeSig::MVar(index) => TypeSig::MVar(*index),
            TypeSig::SzArray(inner) => TypeSig::SzArray(Box::new(inner.map_leaves(map))),
            TypeSig::Array(inner, shape) => {
                TypeSig::Array(Box::new(inner.map_leaves(map)), shape.clone())
            }
            TypeSig::ValueArray(inner, size) => {
                TypeSig::ValueArray(Box::new(inner.map_leaves(map)), *size)
            }
            TypeSig::Ptr(inner) => TypeSig::Ptr(Box::new(inner.map_leaves(map))),
            TypeSig::ByRef(inner) => TypeSig::ByRef(Box::new(inner.map_leaves(map))),
            TypeSig::Pinned(inner) => TypeSig::Pinned(Box::new(inner.map_leaves(map))),
            TypeSig::ModReqd(modifier, inner) => {
                TypeSig::ModReqd(modifier.clone(), Box::new(inner.map_leaves(map)))
            }
            TypeSig::ModOpt(modifier, inner) => {
                TypeSig::ModOpt(modifier.clone(), Box::new(inner.map_leaves(map)))
            }
            TypeSig::GenericInst(generic, arguments) => TypeSig::GenericInst(
                Box::new(generic.map_leaves(map)),
                arguments.iter().map(|arg| arg.map_leaves(map)).collect(),
            ),
        }
    }

    /// Compares two shapes: wrappers must be identical, custom modifiers and `pinned` are
    /// ignored, and named leaves are compared with `leaf_eq`.
    #[must_use]
    pub fn matches<F>(&self, other: &TypeSig, leaf_eq: &F) -> bool
    where
        F: Fn(&TypeSignature, &TypeSignature) -> bool,
    {
        match (self.strip_modifiers(), other.strip_modifiers()) {
            (TypeSig::Named(a), TypeSig::Named(b)) => leaf_eq(a, b),
            (TypeSig::Var(a), TypeSig::Var(b)) | (TypeSig::MVar(a), TypeSig::MVar(b)) => a == b,
            (TypeSig::SzArray(a), TypeSig::SzArray(b))
            | (TypeSig::Ptr(a), TypeSig::Ptr(b))
            | (TypeSig::ByRef(a), TypeSig::ByRef(b)) => a.matches(b, leaf_eq),
            (TypeSig::Array(a, shape_a), TypeSig::Array(b, shape_b)) => {
                shape_a == shape_b && a.matches(b, leaf_eq)
            }
            (TypeSig::ValueArray(a, size_a), TypeSig::ValueArray(b, size_b)) => {
                size_a == size_b && a.matches(b, leaf_eq)
            }
            (TypeSig::GenericInst(a, args_a), TypeSig::GenericInst(b, args_b)) => {
                args_a.len() == args_b.len()
                    && a.matches(b, leaf_eq)
                    && args_a
                        .iter()
                        .zip(args_b.iter())
                        .all(|(x, y)| x.matches(y, leaf_eq))
            }
            _ => false,
        }
    }

    /// Returns `true` for `System.Void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Named(s) if s.primitive() == Some(Primitive::Void))
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Named(signature) => write!(f, "{signature}"),
            TypeSig::Var(index) => write!(f, "!{index}"),
            TypeSig::MVar(index) => write!(f, "!!{index}"),
            TypeSig::SzArray(inner) => write!(f, "{inner}[]"),
            TypeSig::Array(inner, shape) => {
                write!(f, "{inner}[")?;
                for _ in 1..shape.rank {
                    f.write_str(",")?;
                }
                f.write_str("]")
            }
            TypeSig::ValueArray(inner, size) => write!(f, "{inner}[{size}]"),
            TypeSig::Ptr(inner) => write!(f, "{inner}*"),
            TypeSig::ByRef(inner) => write!(f, "{inner}&"),
            TypeSig::Pinned(inner) => write!(f, "{inner} pinned"),
            TypeSig::ModReqd(modifier, inner) => write!(f, "{inner} modreq({modifier})"),
            TypeSig::ModOpt(modifier, inner) => write!(f, "{inner} modopt({modifier})"),
            TypeSig::GenericInst(generic, arguments) => {
                write!(f, "{generic}<")?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(">")
            }
        }
    }
}

impl From<TypeSignature> for TypeSig {
    fn from(signature: TypeSignature) -> Self {
        TypeSig::Named(signature)
    }
}
