//! Substitution tables.
//!
//! A mixin module is compiled against its own stand-in types and members. Substitutions map
//! those signatures onto the signatures of the target module: `Patch.PlayerMixin` becomes
//! `Game.Player`, `Patch.PlayerMixin::hp` becomes `Game.Player::health`, and so on.
//!
//! Entries chain: if `A -> B` and `B -> C` are both registered, `A` resolves to `C`. A table
//! never holds a cycle, [`SubstitutionTable::add`] rejects the registration that would close one,
//! so every chain ends at a signature that is not a key.
//!
//! Type substitutions only ever touch the *leaves* of wrapped type shapes, see
//! [`Substitutions::substitute_sig`]. Once a patch has been merged, [`Substitutions::collapse`]
//! computes the final destination of every relevant signature and
//! [`CollapsedSubstitutions::apply`] rewrites the definitions of a module in one pass.
//!
//! # Examples
//!
//! ```rust
//! use cilmixin::patch::Substitutions;
//! use cilmixin::signature::TypeSignature;
//!
//! let mut substitutions = Substitutions::default();
//! let mixin = TypeSignature::class("Patch.PlayerMixin")?;
//! let stub = TypeSignature::class("Patch.PlayerStub")?;
//! let player = TypeSignature::class("Game.Player")?;
//!
//! substitutions.types.add(mixin.clone(), stub.clone())?;
//! substitutions.types.add(stub, player.clone())?;
//! assert_eq!(substitutions.substitute_type(&mixin), player);
//!
//! // Closing the chain would make it endless
//! assert!(substitutions.types.add(player, mixin).is_err());
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    hash::Hash,
};

use log::{debug, warn};

use crate::{
    metadata::{
        module::{FieldId, MethodId, Module},
        typesig::TypeSig,
    },
    signature::{FieldSignature, MethodSignature, TypeSignature},
    Error, Result,
};

/// A chained `original -> replacement` table.
#[derive(Debug, Clone)]
pub struct SubstitutionTable<K> {
    entries: HashMap<K, K>,
}

impl<K> Default for SubstitutionTable<K> {
    fn default() -> Self {
        SubstitutionTable {
            entries: HashMap::new(),
        }
    }
}

impl<K> SubstitutionTable<K>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Registers a substitution. Registering `k -> k` does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if `original` already has a replacement, or if
    /// the entry would close a cycle.
    pub fn add(&mut self, original: K, replacement: K) -> Result<()> {
        if original == replacement {
            return Ok(());
        }
        if let Some(existing) = self.entries.get(&original) {
            return Err(Error::Configuration(format!(
                "duplicate substitution for {original}: {existing} and {replacement}"
            )));
        }

        let mut current = &replacement;
        for _ in 0..=self.entries.len() {
            if *current == original {
                return Err(Error::Configuration(format!(
                    "substitution {original} -> {replacement} closes a cycle"
                )));
            }
            match self.entries.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }

        self.entries.insert(original, replacement);
        Ok(())
    }

    /// The direct replacement of `original`, if any.
    #[must_use]
    pub fn get(&self, original: &K) -> Option<&K> {
        self.entries.get(original)
    }

    /// Follows the chain from `original` to its end. Signatures without an entry resolve to
    /// themselves.
    #[must_use]
    pub fn resolve(&self, original: &K) -> K {
        let mut current = original;
        for _ in 0..self.entries.len() {
            match self.entries.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.clone()
    }

    /// Returns `true` if `original` has a replacement.
    #[must_use]
    pub fn contains(&self, original: &K) -> bool {
        self.entries.contains_key(original)
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the direct entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &K)> {
        self.entries.iter()
    }

    /// Moves every entry of `other` into this table.
    ///
    /// # Errors
    ///
    /// See [`SubstitutionTable::add`]. Entries added before the failing one stay registered.
    pub fn extend(&mut self, other: SubstitutionTable<K>) -> Result<()> {
        for (original, replacement) in other.entries {
            self.add(original, replacement)?;
        }
        Ok(())
    }
}

/// The type, field and method substitution tables of a patch.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    /// Type substitutions
    pub types: SubstitutionTable<TypeSignature>,
    /// Field substitutions
    pub fields: SubstitutionTable<FieldSignature>,
    /// Method substitutions
    pub methods: SubstitutionTable<MethodSignature>,
}

impl Substitutions {
    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len() + self.fields.len() + self.methods.len()
    }

    /// Returns `true` if no table has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves all entries of `other` into these tables.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for duplicate keys and cycles.
    pub fn extend(&mut self, other: Substitutions) -> Result<()> {
        self.types.extend(other.types)?;
        self.fields.extend(other.fields)?;
        self.methods.extend(other.methods)
    }

    /// The final destination of a type.
    #[must_use]
    pub fn substitute_type(&self, signature: &TypeSignature) -> TypeSignature {
        self.types.resolve(signature)
    }

    /// Substitutes every named leaf of a type shape, generic arguments included, keeping the
    /// wrapper chain.
    #[must_use]
    pub fn substitute_sig(&self, sig: &TypeSig) -> TypeSig {
        if self.types.is_empty() {
            return sig.clone();
        }
        sig.map_leaves(&|leaf| self.types.resolve(leaf))
    }

    /// The final destination of a field: the field table is followed first, then the declaring
    /// type and the field type are substituted.
    #[must_use]
    pub fn substitute_field(&self, signature: &FieldSignature) -> FieldSignature {
        let field = self.fields.resolve(signature);
        FieldSignature::new(
            self.substitute_type(&field.declaring),
            &field.name,
            self.substitute_sig(&field.field_type),
        )
    }

    /// The final destination of a method: the method table is followed first, then the
    /// declaring type and the parameter types are substituted.
    #[must_use]
    pub fn substitute_method(&self, signature: &MethodSignature) -> MethodSignature {
        let method = self.methods.resolve(signature);
        MethodSignature::new(
            self.substitute_type(&method.declaring),
            &method.name,
            method.call_conv,
            method
                .parameters
                .iter()
                .map(|param| self.substitute_sig(param))
                .collect(),
        )
    }

    /// Computes the final destination of every table key and every definition of `module`,
    /// dropping signatures that map to themselves.
    #[must_use]
    pub fn collapse(&self, module: &Module) -> CollapsedSubstitutions {
        let mut collapsed = CollapsedSubstitutions::default();

        let types: HashSet<TypeSignature> = self
            .types
            .iter()
            .map(|(key, _)| key.clone())
            .chain(module.types.iter().map(|def| def.signature.clone()))
            .collect();
        for signature in types {
            let destination = self.substitute_type(&signature);
            if destination != signature {
                collapsed.types.insert(signature, destination);
            }
        }

        let fields: HashSet<FieldSignature> = self
            .fields
            .iter()
            .map(|(key, _)| key.clone())
            .chain((0..module.fields.len()).map(|id| module.field_signature(FieldId(id))))
            .collect();
        for signature in fields {
            let destination = self.substitute_field(&signature);
            if destination != signature {
                collapsed.fields.insert(signature, destination);
            }
        }

        let methods: HashSet<MethodSignature> = self
            .methods
            .iter()
            .map(|(key, _)| key.clone())
            .chain(module.method_ids().map(|id| module.method_signature(id)))
            .collect();
        for signature in methods {
            let destination = self.substitute_method(&signature);
            if destination != signature {
                collapsed.methods.insert(signature, destination);
            }
        }

        debug!(
            "Collapsed substitutions for {}: {} types, {} fields, {} methods",
            module.name,
            collapsed.types.len(),
            collapsed.fields.len(),
            collapsed.methods.len()
        );
        collapsed
    }

    /// Collapses the tables against `module` and applies them. Returns the number of rewritten
    /// definitions.
    pub fn apply(&self, module: &mut Module) -> usize {
        self.collapse(module).apply(module)
    }
}

/// Substitution tables reduced to one lookup per signature.
#[derive(Debug, Clone, Default)]
pub struct CollapsedSubstitutions {
    /// Final type destinations
    pub types: HashMap<TypeSignature, TypeSignature>,
    /// Final field destinations
    pub fields: HashMap<FieldSignature, FieldSignature>,
    /// Final method destinations
    pub methods: HashMap<MethodSignature, MethodSignature>,
}

impl CollapsedSubstitutions {
    /// Returns `true` if nothing would be rewritten.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.fields.is_empty() && self.methods.is_empty()
    }

    fn sig(&self, sig: &TypeSig) -> TypeSig {
        sig.map_leaves(&|leaf| self.types.get(leaf).cloned().unwrap_or_else(|| leaf.clone()))
    }

    /// Rewrites every field, method and local of `module`.
    ///
    /// A definition whose own signature is a key takes the name and shape of its destination.
    /// Afterwards every field type, parameter type, return type and local type has its leaves
    /// substituted. The declaring type of a definition never changes. Returns the number of
    /// definitions that changed.
    pub fn apply(&self, module: &mut Module) -> usize {
        if self.is_empty() {
            return 0;
        }
        let mut rewritten = 0;

        for index in 0..module.fields.len() {
            let own = module.field_signature(FieldId(index));
            let def = &mut module.fields[index];
            let before = (def.name.clone(), def.field_type.clone());

            if let Some(destination) = self.fields.get(&own) {
                def.name.clone_from(&destination.name);
                def.field_type = destination.field_type.clone();
            }
            def.field_type = self.sig(&def.field_type);

            if before != (def.name.clone(), def.field_type.clone()) {
                rewritten += 1;
            }
        }

        for index in 0..module.methods.len() {
            let own = module.method_signature(MethodId(index));
            let def = &mut module.methods[index];
            let before = (
                def.name.clone(),
                def.call_conv,
                def.parameter_types(),
                def.return_type.clone(),
            );

            if let Some(destination) = self.methods.get(&own) {
                def.name.clone_from(&destination.name);
                def.call_conv = destination.call_conv;
                for (parameter, param_type) in
                    def.parameters.iter_mut().zip(destination.parameters.iter())
                {
                    parameter.param_type = param_type.clone();
                }
            }
            for parameter in &mut def.parameters {
                parameter.param_type = self.sig(&parameter.param_type);
            }
            def.return_type = self.sig(&def.return_type);
            if let Some(body) = &mut def.body {
                for local in &mut body.locals {
                    *local = self.sig(local);
                }
            }

            if before
                != (
                    def.name.clone(),
                    def.call_conv,
                    def.parameter_types(),
                    def.return_type.clone(),
                )
            {
                rewritten += 1;
            }
        }

        report_collisions(module);
        rewritten
    }
}

fn report_collisions(module: &Module) {
    for def in &module.types {
        let mut seen = HashSet::new();
        for id in &def.methods {
            let signature = module.method_signature(*id);
            if !seen.insert(signature.clone()) {
                warn!("Substitution left two definitions of {signature}");
            }
        }
        let mut names = HashSet::new();
        for id in &def.fields {
            let name = &module.field(*id).name;
            if !names.insert(name) {
                warn!("Substitution left two fields named {}::{}", def.signature, name);
            }
        }
    }
}
