//! Patch configurations.
//!
//! A [`PatchConfiguration`] is everything one patch unit asks of its target module:
//!
//! - **dependencies**: types, fields, methods and parameters the patch uses, with the
//!   visibility and shape it requires of them;
//! - **mixins**: replacement bodies to splice into existing methods, in declaration order;
//! - **injects**: members to add to the target, with bodies built from scratch;
//! - **substitutions**: how the patch's own signatures map onto the target's.
//!
//! Configurations are usually produced by [`crate::mixin::PatchLoader`] but can be assembled
//! by hand.

use crate::{
    metadata::{
        body::RawBody,
        flags::{FieldAttributes, MethodAttributes, TypeAttributes},
        module::MethodId,
        typesig::TypeSig,
    },
    mixin::source::SourceModule,
    patch::substitution::Substitutions,
    signature::{
        FieldDescriptor, MethodDescriptor, MethodSignature, TypeDescriptor, TypeSignature,
    },
    Error, Result,
};

/// What a patch requires of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    descriptor: TypeDescriptor,
    fields: Vec<FieldDescriptor>,
    methods: Vec<MethodDescriptor>,
    originals: Vec<MethodSignature>,
}

impl Dependency {
    /// Creates a dependency on a type without member requirements.
    #[must_use]
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Dependency {
            descriptor,
            fields: Vec::new(),
            methods: Vec::new(),
            originals: Vec::new(),
        }
    }

    /// The type requirement.
    #[must_use]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The required type.
    #[must_use]
    pub fn signature(&self) -> &TypeSignature {
        self.descriptor.signature()
    }

    /// Field requirements.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Method requirements.
    #[must_use]
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Signatures (in the patch's own universe) that call through to the pre-patch body.
    #[must_use]
    pub fn originals(&self) -> &[MethodSignature] {
        &self.originals
    }

    /// Adds a field requirement. The first requirement for a signature wins; returns `false`
    /// for later ones.
    pub fn add_field(&mut self, descriptor: FieldDescriptor) -> bool {
        if self.fields.iter().any(|f| f.signature() == descriptor.signature()) {
            return false;
        }
        self.fields.push(descriptor);
        true
    }

    /// Adds a method requirement. The first requirement for a signature wins; returns `false`
    /// for later ones.
    pub fn add_method(&mut self, descriptor: MethodDescriptor) -> bool {
        if self.has_method(descriptor.signature()) {
            return false;
        }
        self.methods.push(descriptor);
        true
    }

    /// Declares a base-dependency signature.
    pub fn add_original(&mut self, signature: MethodSignature) {
        if !self.originals.contains(&signature) {
            self.originals.push(signature);
        }
    }

    /// Returns `true` if `signature` is a required method.
    #[must_use]
    pub fn has_method(&self, signature: &MethodSignature) -> bool {
        self.methods.iter().any(|m| m.signature() == signature)
    }

    /// Folds another dependency on the same type into this one. The stronger type visibility
    /// wins; member requirements are first-wins.
    pub fn merge(&mut self, other: Dependency) {
        if other.descriptor.access() > self.descriptor.access() {
            self.descriptor = other.descriptor;
        }
        for field in other.fields {
            self.add_field(field);
        }
        for method in other.methods {
            self.add_method(method);
        }
        for original in other.originals {
            self.add_original(original);
        }
    }
}

/// A method body from the mixin module, kept in encoded form until it is merged.
#[derive(Debug, Clone)]
pub struct ReplacementBody {
    /// The module the body's tokens refer to
    pub source: SourceModule,
    /// The encoded body
    pub raw: RawBody,
    /// Local variable types
    pub locals: Vec<TypeSig>,
}

impl ReplacementBody {
    /// Takes the body of a method of the source module.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the method has no body, and
    /// [`crate::Error::Encode`] if it cannot be encoded.
    pub fn from_method(source: &SourceModule, method: MethodId) -> Result<Self> {
        let module = source.module();
        let def = module
            .methods
            .get(method.0)
            .ok_or_else(|| Error::Configuration(format!("method {method} does not exist")))?;
        let body = def.body.as_ref().ok_or_else(|| {
            Error::Configuration(format!("{} has no body", module.method_signature(method)))
        })?;

        Ok(ReplacementBody {
            source: source.clone(),
            raw: body.encode(module)?,
            locals: body.locals.clone(),
        })
    }
}

/// Replacement of one method body.
#[derive(Debug, Clone)]
pub struct MergeAction {
    /// The replaced method, in the target's universe
    pub method: MethodSignature,
    /// For constructors: keep the replacement's base call instead of the original's
    pub rewrite_base: bool,
    /// The replacement
    pub body: ReplacementBody,
}

/// Merge actions in declaration order, grouped by method.
#[derive(Debug, Clone, Default)]
pub struct MixinSet {
    entries: Vec<(MethodSignature, Vec<MergeAction>)>,
}

impl MixinSet {
    /// Appends an action to the method's list, creating the list if needed.
    pub fn push(&mut self, action: MergeAction) {
        match self.entries.iter_mut().find(|(method, _)| *method == action.method) {
            Some((_, actions)) => actions.push(action),
            None => self.entries.push((action.method.clone(), vec![action])),
        }
    }

    /// Methods and their actions, in order of first declaration.
    pub fn iter(&self) -> impl Iterator<Item = (&MethodSignature, &[MergeAction])> {
        self.entries
            .iter()
            .map(|(method, actions)| (method, actions.as_slice()))
    }

    /// Number of methods with actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A type-level mixin: a dependency plus the bodies to merge into it.
#[derive(Debug, Clone)]
pub struct Mixin {
    dependency: Dependency,
    actions: MixinSet,
    interfaces: Vec<TypeSig>,
}

impl Mixin {
    /// Creates a mixin for the dependency's type.
    #[must_use]
    pub fn new(dependency: Dependency) -> Self {
        Mixin {
            dependency,
            actions: MixinSet::default(),
            interfaces: Vec::new(),
        }
    }

    /// The dependency of the mixin.
    #[must_use]
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    /// The merge actions.
    #[must_use]
    pub fn actions(&self) -> &MixinSet {
        &self.actions
    }

    /// Interfaces to add to the target type.
    #[must_use]
    pub fn interfaces(&self) -> &[TypeSig] {
        &self.interfaces
    }

    /// Adds a merge action.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the action's method is not one of the
    /// dependency's methods.
    pub fn push(&mut self, action: MergeAction) -> Result<()> {
        if !self.dependency.has_method(&action.method) {
            return Err(Error::Configuration(format!(
                "mixin {} is not a dependency",
                action.method
            )));
        }
        self.actions.push(action);
        Ok(())
    }

    /// Adds an interface to implement.
    pub fn add_interface(&mut self, interface: TypeSig) {
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
    }
}

/// A field to add to the target.
#[derive(Debug, Clone)]
pub struct InjectedField {
    /// Signature and visibility
    pub descriptor: FieldDescriptor,
    /// Attribute flags; the access bits are taken from the descriptor
    pub flags: FieldAttributes,
}

/// A method to add to the target.
#[derive(Debug, Clone)]
pub struct InjectedMethod {
    /// Signature, visibility and return type
    pub descriptor: MethodDescriptor,
    /// Attribute flags; the access bits are taken from the descriptor
    pub flags: MethodAttributes,
    /// Body, `None` for abstract methods
    pub body: Option<ReplacementBody>,
}

/// Members to add to a type, which is created if the target does not define it.
#[derive(Debug, Clone)]
pub struct Inject {
    descriptor: TypeDescriptor,
    flags: TypeAttributes,
    base: Option<TypeSig>,
    fields: Vec<InjectedField>,
    methods: Vec<InjectedMethod>,
}

impl Inject {
    /// Creates an inject for a type. A created type is a non-public class deriving from
    /// `System.Object` unless configured otherwise.
    #[must_use]
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Inject {
            descriptor,
            flags: TypeAttributes::NOT_PUBLIC,
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Sets the flags of a created type.
    #[must_use]
    pub fn with_flags(mut self, flags: TypeAttributes) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the base type of a created type.
    #[must_use]
    pub fn with_base(mut self, base: TypeSig) -> Self {
        self.base = Some(base);
        self
    }

    /// The type requirement.
    #[must_use]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Flags of a created type.
    #[must_use]
    pub fn flags(&self) -> TypeAttributes {
        self.flags
    }

    /// Base type of a created type.
    #[must_use]
    pub fn base(&self) -> Option<&TypeSig> {
        self.base.as_ref()
    }

    /// Fields to add.
    #[must_use]
    pub fn fields(&self) -> &[InjectedField] {
        &self.fields
    }

    /// Methods to add.
    #[must_use]
    pub fn methods(&self) -> &[InjectedMethod] {
        &self.methods
    }

    /// Adds a field.
    pub fn add_field(&mut self, field: InjectedField) {
        self.fields.push(field);
    }

    /// Adds a method.
    pub fn add_method(&mut self, method: InjectedMethod) {
        self.methods.push(method);
    }
}

/// One patch unit.
#[derive(Debug, Clone, Default)]
pub struct PatchConfiguration {
    name: String,
    target: String,
    required: Vec<String>,
    dependencies: Vec<Dependency>,
    injects: Vec<Inject>,
    mixins: Vec<Mixin>,
    substitutions: Substitutions,
}

impl PatchConfiguration {
    /// Creates an empty configuration for the target module `target`.
    #[must_use]
    pub fn new(name: &str, target: &str) -> Self {
        PatchConfiguration {
            name: name.to_string(),
            target: target.to_string(),
            ..PatchConfiguration::default()
        }
    }

    /// Name of the patch unit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the target module.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Names of the modules searched after the target.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Plain dependencies, without those of mixins.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Every dependency: plain ones first, then those of the mixins.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .chain(self.mixins.iter().map(Mixin::dependency))
    }

    /// Members to inject.
    #[must_use]
    pub fn injects(&self) -> &[Inject] {
        &self.injects
    }

    /// Type-level mixins.
    #[must_use]
    pub fn mixins(&self) -> &[Mixin] {
        &self.mixins
    }

    /// Substitution tables.
    #[must_use]
    pub fn substitutions(&self) -> &Substitutions {
        &self.substitutions
    }

    /// Mutable substitution tables.
    pub fn substitutions_mut(&mut self) -> &mut Substitutions {
        &mut self.substitutions
    }

    /// Adds a module to search after the target.
    pub fn add_required(&mut self, module: &str) {
        if !self.required.iter().any(|r| r == module) {
            self.required.push(module.to_string());
        }
    }

    /// Adds a dependency, folding it into an existing one on the same type.
    pub fn add_dependency(&mut self, dependency: Dependency) {
        match self
            .dependencies
            .iter_mut()
            .find(|d| d.signature() == dependency.signature())
        {
            Some(existing) => existing.merge(dependency),
            None => self.dependencies.push(dependency),
        }
    }

    /// Adds members to inject.
    pub fn add_inject(&mut self, inject: Inject) {
        self.injects.push(inject);
    }

    /// Adds a type-level mixin.
    pub fn add_mixin(&mut self, mixin: Mixin) {
        self.mixins.push(mixin);
    }

    /// Total number of merge actions.
    #[must_use]
    pub fn merge_count(&self) -> usize {
        self.mixins
            .iter()
            .flat_map(|m| m.actions().iter())
            .map(|(_, actions)| actions.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{AccessLevel, CallingConvention};
    use std::sync::Arc;

    fn player() -> TypeSignature {
        TypeSignature::class("Tests.Config.Player").unwrap()
    }

    fn update() -> MethodSignature {
        player().method("Update", CallingConvention::HAS_THIS, vec![])
    }

    fn action(method: MethodSignature) -> MergeAction {
        MergeAction {
            method,
            rewrite_base: false,
            body: ReplacementBody {
                source: SourceModule::new(Arc::new(crate::Module::new("Patch"))),
                raw: RawBody::default(),
                locals: Vec::new(),
            },
        }
    }

    #[test]
    fn duplicate_method_dependencies_collapse() {
        let mut dependency = Dependency::new(TypeDescriptor::builder(player()).build());
        assert!(dependency.add_method(
            MethodDescriptor::builder(update())
                .access(AccessLevel::Assembly)
                .build()
                .unwrap()
        ));
        assert!(!dependency.add_method(
            MethodDescriptor::builder(update())
                .access(AccessLevel::Public)
                .build()
                .unwrap()
        ));
        assert_eq!(dependency.methods().len(), 1);
        assert_eq!(dependency.methods()[0].access(), AccessLevel::Assembly);
    }

    #[test]
    fn mixins_must_be_dependencies() {
        let mut dependency = Dependency::new(TypeDescriptor::builder(player()).build());
        dependency.add_method(MethodDescriptor::builder(update()).build().unwrap());
        let mut mixin = Mixin::new(dependency);

        mixin.push(action(update())).unwrap();
        mixin.push(action(update())).unwrap();
        assert_eq!(mixin.actions().len(), 1);

        let other = player().method("Draw", CallingConvention::HAS_THIS, vec![]);
        assert!(matches!(mixin.push(action(other)), Err(Error::Configuration(_))));
    }

    #[test]
    fn dependencies_on_one_type_fold() {
        let mut config = PatchConfiguration::new("Patch", "Game");
        config.add_dependency(Dependency::new(TypeDescriptor::builder(player()).build()));
        let mut second = Dependency::new(
            TypeDescriptor::builder(player())
                .access(AccessLevel::Public)
                .build(),
        );
        second.add_original(update());
        config.add_dependency(second);

        assert_eq!(config.dependencies().len(), 1);
        assert_eq!(config.dependencies()[0].descriptor().access(), AccessLevel::Public);
        assert_eq!(config.dependencies()[0].originals(), &[update()]);
    }
}
