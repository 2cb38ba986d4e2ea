//! Descriptors: what a patch requires of a signature.
//!
//! A descriptor pairs a signature with the minimum visibility the patch needs, plus
//! member-specific requirements: a field's read-only state, a method's return type and the way
//! each parameter is used. Descriptors are immutable and built through builders with an explicit
//! `build()`.
//!
//! # Examples
//!
//! ```rust
//! use cilmixin::signature::{
//!     AccessLevel, AccessMode, CallingConvention, MethodDescriptor, TypeSignature,
//! };
//! use cilmixin::metadata::typesig::TypeSig;
//!
//! let player = TypeSignature::class("Game.Player")?;
//! let method = player.method("Heal", CallingConvention::HAS_THIS, vec![TypeSig::int32()]);
//!
//! let descriptor = MethodDescriptor::builder(method)
//!     .access(AccessLevel::Assembly)
//!     .return_type(TypeSig::void())
//!     .parameter(0, AccessMode::READ)
//!     .build()?;
//!
//! assert_eq!(descriptor.access(), AccessLevel::Assembly);
//! assert_eq!(descriptor.parameter_mode(0), Some(AccessMode::READ));
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::collections::BTreeMap;

use crate::{
    metadata::typesig::TypeSig,
    signature::{AccessLevel, AccessMode, FieldSignature, MethodSignature, TypeSignature},
    Error, Result,
};

/// Requirements on a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    signature: TypeSignature,
    access: AccessLevel,
}

impl TypeDescriptor {
    /// Starts a builder for `signature`.
    #[must_use]
    pub fn builder(signature: TypeSignature) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            signature,
            access: AccessLevel::Private,
        }
    }

    /// The described type.
    #[must_use]
    pub fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    /// The minimum required visibility.
    #[must_use]
    pub fn access(&self) -> AccessLevel {
        self.access
    }
}

/// Builder for [`TypeDescriptor`].
pub struct TypeDescriptorBuilder {
    signature: TypeSignature,
    access: AccessLevel,
}

impl TypeDescriptorBuilder {
    /// Sets the minimum required visibility.
    pub fn access(&mut self, access: AccessLevel) -> &mut Self {
        self.access = access;
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(&self) -> TypeDescriptor {
        TypeDescriptor {
            signature: self.signature.clone(),
            access: self.access,
        }
    }
}

/// Requirements on a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    signature: FieldSignature,
    access: AccessLevel,
    read_only: Option<bool>,
}

impl FieldDescriptor {
    /// Starts a builder for `signature`.
    #[must_use]
    pub fn builder(signature: FieldSignature) -> FieldDescriptorBuilder {
        FieldDescriptorBuilder {
            signature,
            access: AccessLevel::Private,
            read_only: None,
        }
    }

    /// The described field.
    #[must_use]
    pub fn signature(&self) -> &FieldSignature {
        &self.signature
    }

    /// The minimum required visibility.
    #[must_use]
    pub fn access(&self) -> AccessLevel {
        self.access
    }

    /// The declared read-only state, `None` if the patch does not care.
    #[must_use]
    pub fn read_only(&self) -> Option<bool> {
        self.read_only
    }
}

/// Builder for [`FieldDescriptor`].
pub struct FieldDescriptorBuilder {
    signature: FieldSignature,
    access: AccessLevel,
    read_only: Option<bool>,
}

impl FieldDescriptorBuilder {
    /// Sets the minimum required visibility.
    pub fn access(&mut self, access: AccessLevel) -> &mut Self {
        self.access = access;
        self
    }

    /// Declares whether the patch treats the field as read-only.
    pub fn read_only(&mut self, read_only: bool) -> &mut Self {
        self.read_only = Some(read_only);
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(&self) -> FieldDescriptor {
        FieldDescriptor {
            signature: self.signature.clone(),
            access: self.access,
            read_only: self.read_only,
        }
    }
}

/// Requirements on a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    signature: MethodSignature,
    access: AccessLevel,
    return_type: Option<TypeSig>,
    parameters: BTreeMap<usize, AccessMode>,
}

impl MethodDescriptor {
    /// Starts a builder for `signature`.
    #[must_use]
    pub fn builder(signature: MethodSignature) -> MethodDescriptorBuilder {
        MethodDescriptorBuilder {
            signature,
            access: AccessLevel::Private,
            return_type: None,
            parameters: BTreeMap::new(),
        }
    }

    /// The described method.
    #[must_use]
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// The minimum required visibility.
    #[must_use]
    pub fn access(&self) -> AccessLevel {
        self.access
    }

    /// The declared return type, if one was declared.
    #[must_use]
    pub fn return_type(&self) -> Option<&TypeSig> {
        self.return_type.as_ref()
    }

    /// The access mode declared for the parameter at `index`.
    #[must_use]
    pub fn parameter_mode(&self, index: usize) -> Option<AccessMode> {
        self.parameters.get(&index).copied()
    }

    /// All declared parameter modes in index order.
    pub fn parameters(&self) -> impl Iterator<Item = (usize, AccessMode)> + '_ {
        self.parameters.iter().map(|(index, mode)| (*index, *mode))
    }
}

/// Builder for [`MethodDescriptor`].
pub struct MethodDescriptorBuilder {
    signature: MethodSignature,
    access: AccessLevel,
    return_type: Option<TypeSig>,
    parameters: BTreeMap<usize, AccessMode>,
}

impl MethodDescriptorBuilder {
    /// Sets the minimum required visibility.
    pub fn access(&mut self, access: AccessLevel) -> &mut Self {
        self.access = access;
        self
    }

    /// Declares the expected return type.
    pub fn return_type(&mut self, return_type: TypeSig) -> &mut Self {
        self.return_type = Some(return_type);
        self
    }

    /// Declares how the parameter at `index` is used. The first declaration for an index wins.
    pub fn parameter(&mut self, index: usize, mode: AccessMode) -> &mut Self {
        self.parameters.entry(index).or_insert(mode);
        self
    }

    /// Finishes the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if a parameter index is out of range for the
    /// method signature.
    pub fn build(&self) -> Result<MethodDescriptor> {
        if let Some(index) = self
            .parameters
            .keys()
            .find(|index| **index >= self.signature.parameters.len())
        {
            return Err(Error::Configuration(format!(
                "parameter {} out of range for {}",
                index, self.signature
            )));
        }

        Ok(MethodDescriptor {
            signature: self.signature.clone(),
            access: self.access,
            return_type: self.return_type.clone(),
            parameters: self.parameters.clone(),
        })
    }
}
