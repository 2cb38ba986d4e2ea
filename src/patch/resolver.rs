//! Symbol resolution against a module.
//!
//! [`ModuleResolver`] binds signatures to definitions of one module. Every lookup substitutes
//! first: a signature declared against the mixin's stand-in types is translated into the
//! target universe, then matched by name and shape.
//!
//! Member lookups start at the declaring type and walk its base types as long as they are
//! defined in the same module, so a field inherited from a local base class is found through
//! the derived type. Types are compared by their (substituted) full names only; wrapper shapes
//! must match exactly while custom modifiers are ignored.
//!
//! # Examples
//!
//! ```rust
//! use cilmixin::{
//!     metadata::{
//!         flags::{FieldAttributes, TypeAttributes},
//!         module::{FieldDef, Module, TypeDef},
//!         typesig::TypeSig,
//!     },
//!     patch::{ModuleResolver, Substitutions},
//!     signature::TypeSignature,
//! };
//!
//! let player = TypeSignature::class("Game.Player")?;
//! let mut module = Module::new("Game");
//! let id = module.add_type(TypeDef::new(player.clone(), TypeAttributes::PUBLIC));
//! module.add_field(id, FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::int32()));
//!
//! let substitutions = Substitutions::default();
//! let resolver = ModuleResolver::new(&substitutions);
//! assert!(resolver.try_resolve_field(&module, &player.field("health", TypeSig::int32())).is_some());
//! assert!(resolver.resolve_type(&module, &TypeSignature::class("Game.Enemy")?).is_err());
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::collections::HashSet;

use log::debug;

use crate::{
    metadata::{
        flags::ParamAttributes,
        module::{FieldId, MethodId, Module, ParamDef, TypeId},
        typesig::TypeSig,
    },
    patch::substitution::Substitutions,
    signature::{FieldSignature, MethodSignature, ParameterSignature, TypeSignature},
    Error, Result, SymbolKind,
};

/// Resolves signatures to definitions, substituting first.
#[derive(Debug, Clone, Copy)]
pub struct ModuleResolver<'a> {
    substitutions: &'a Substitutions,
}

impl<'a> ModuleResolver<'a> {
    /// Creates a resolver over the given substitution tables.
    #[must_use]
    pub fn new(substitutions: &'a Substitutions) -> Self {
        ModuleResolver { substitutions }
    }

    /// The substitution tables used.
    #[must_use]
    pub fn substitutions(&self) -> &'a Substitutions {
        self.substitutions
    }

    /// Finds the type definition for `signature` among the module's own types.
    #[must_use]
    pub fn try_resolve_type(&self, module: &Module, signature: &TypeSignature) -> Option<TypeId> {
        let target = self.substitutions.substitute_type(signature);
        module.find_type(target.full_name())
    }

    /// As [`ModuleResolver::try_resolve_type`], failing if the type is missing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unresolved`] if the module does not define the type.
    pub fn resolve_type(&self, module: &Module, signature: &TypeSignature) -> Result<TypeId> {
        let id = self
            .try_resolve_type(module, signature)
            .ok_or_else(|| unresolved(SymbolKind::Type, signature))?;
        debug!("Resolved type {} in {}", signature, module.name);
        Ok(id)
    }

    /// Finds the field definition for `signature`, searching the declaring type and then its
    /// local base types.
    #[must_use]
    pub fn try_resolve_field(&self, module: &Module, signature: &FieldSignature) -> Option<FieldId> {
        let field = self.substitutions.fields.resolve(signature);
        let declaring = self.try_resolve_type(module, &field.declaring)?;

        self.hierarchy(module, declaring).into_iter().find_map(|id| {
            module.type_def(id).fields.iter().copied().find(|candidate| {
                let def = module.field(*candidate);
                def.name == field.name && self.type_matches(&def.field_type, &field.field_type)
            })
        })
    }

    /// As [`ModuleResolver::try_resolve_field`], failing if the field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unresolved`] if no matching field exists.
    pub fn resolve_field(&self, module: &Module, signature: &FieldSignature) -> Result<FieldId> {
        let id = self
            .try_resolve_field(module, signature)
            .ok_or_else(|| unresolved(SymbolKind::Field, signature))?;
        debug!("Resolved field {} in {}", signature, module.name);
        Ok(id)
    }

    /// Finds the method definition for `signature`, searching the declaring type and then its
    /// local base types.
    #[must_use]
    pub fn try_resolve_method(
        &self,
        module: &Module,
        signature: &MethodSignature,
    ) -> Option<MethodId> {
        let method = self.substitutions.methods.resolve(signature);
        let declaring = self.try_resolve_type(module, &method.declaring)?;

        self.hierarchy(module, declaring).into_iter().find_map(|id| {
            module.type_def(id).methods.iter().copied().find(|candidate| {
                let def = module.method(*candidate);
                def.name == method.name
                    && def.parameters.len() == method.parameters.len()
                    && def
                        .parameters
                        .iter()
                        .zip(method.parameters.iter())
                        .all(|(param, expected)| self.type_matches(&param.param_type, expected))
            })
        })
    }

    /// As [`ModuleResolver::try_resolve_method`], failing if the method is missing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unresolved`] if no matching method exists.
    pub fn resolve_method(&self, module: &Module, signature: &MethodSignature) -> Result<MethodId> {
        let id = self
            .try_resolve_method(module, signature)
            .ok_or_else(|| unresolved(SymbolKind::Method, signature))?;
        debug!("Resolved method {} in {}", signature, module.name);
        Ok(id)
    }

    /// Finds the parameter for `signature`, creating its metadata record (named `A_{index}`)
    /// if the method has none. Returns the method and the parameter index.
    pub fn try_resolve_parameter(
        &self,
        module: &mut Module,
        signature: &ParameterSignature,
    ) -> Option<(MethodId, usize)> {
        let method = self.try_resolve_method(module, &signature.method)?;
        let parameter = module.method_mut(method).parameters.get_mut(signature.index)?;
        if parameter.def.is_none() {
            parameter.def = Some(ParamDef {
                name: format!("A_{}", signature.index),
                flags: ParamAttributes::empty(),
            });
        }
        Some((method, signature.index))
    }

    /// As [`ModuleResolver::try_resolve_parameter`], failing if the parameter is missing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unresolved`] if the method or the parameter index is missing.
    pub fn resolve_parameter(
        &self,
        module: &mut Module,
        signature: &ParameterSignature,
    ) -> Result<(MethodId, usize)> {
        let resolved = self
            .try_resolve_parameter(module, signature)
            .ok_or_else(|| unresolved(SymbolKind::Parameter, signature))?;
        debug!("Resolved parameter {} in {}", signature, module.name);
        Ok(resolved)
    }

    /// Compares two type shapes: wrappers must be identical, modifiers are ignored and leaves
    /// are equal if their substituted names are.
    #[must_use]
    pub fn type_matches(&self, a: &TypeSig, b: &TypeSig) -> bool {
        a.matches(b, &|x, y| {
            self.substitutions.substitute_type(x).full_name()
                == self.substitutions.substitute_type(y).full_name()
        })
    }

    /// Returns `true` if a value of type `actual` can be used where `expected` is declared.
    #[must_use]
    pub fn is_assignable(&self, expected: &TypeSig, actual: &TypeSig) -> bool {
        self.type_matches(expected, actual)
    }

    /// `start` followed by its base types, as long as they are defined in `module`.
    fn hierarchy(&self, module: &Module, start: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(start);

        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            chain.push(id);
            current = module
                .type_def(id)
                .base
                .as_ref()
                .and_then(TypeSig::leaf)
                .and_then(|base| self.try_resolve_type(module, base));
        }
        chain
    }
}

fn unresolved(kind: SymbolKind, signature: &impl std::fmt::Display) -> Error {
    Error::Unresolved {
        kind,
        signature: signature.to_string(),
    }
}
