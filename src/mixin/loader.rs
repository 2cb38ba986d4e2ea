//! Building patch configurations from annotated mixin modules.
//!
//! [`PatchLoader`] reads the intent attributes of a mixin module (see [`crate::mixin::intent`])
//! and produces the [`PatchConfiguration`] the [`crate::Patcher`] applies. Loading happens in
//! three phases:
//!
//! 1. the module-level `Patch` and `Required` intents give the configuration's target and
//!    fallback modules;
//! 2. every `Mixin`, `Dependency` and `Inject` type registers its rename, sequentially, so that
//!    the target-universe signature of any member can be computed afterwards;
//! 3. the members of those types are read, one type per task, and the per-type results are
//!    folded into the configuration in type order.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::{path::Path, sync::Arc};
//! use cilmixin::{Module, PatchLoader, Patcher};
//!
//! let patch = Arc::new(Module::from_file(Path::new("Patch.cmim"))?);
//! let config = PatchLoader::new().load(patch)?;
//!
//! let mut game = Module::from_file(Path::new("Game.cmim"))?;
//! let report = Patcher::default().apply(&config, &mut game, &mut [])?;
//! println!("{report}");
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};
use rayon::prelude::*;
use strum::Display;

use crate::{
    metadata::{
        attribute::CustomAttribute,
        flags::{FieldAttributes, ParamAttributes},
        module::{FieldId, MethodId, Module, TypeId},
        typesig::TypeSig,
    },
    mixin::{
        intent::{Intent, IntentKind, Intents},
        source::SourceModule,
    },
    patch::{
        config::{
            Dependency, Inject, InjectedField, InjectedMethod, MergeAction, Mixin,
            PatchConfiguration, ReplacementBody,
        },
        substitution::Substitutions,
    },
    signature::{
        AccessMode, FieldDescriptor, FieldSignature, MethodDescriptor, MethodSignature,
        TypeDescriptor, TypeSignature,
    },
    Error, Result,
};

/// What a mixin type does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
enum Role {
    Mixin,
    Dependency,
    Inject,
}

/// A type that takes part in the patch.
struct TypePlan {
    id: TypeId,
    role: Role,
    target: TypeSignature,
}

/// Everything one type contributes to the configuration.
#[derive(Default)]
struct TypeOutcome {
    dependency: Option<Dependency>,
    actions: Vec<MergeAction>,
    interfaces: Vec<TypeSig>,
    inject: Option<Inject>,
    substitutions: Substitutions,
}

/// Loads [`PatchConfiguration`]s from mixin modules.
#[derive(Debug, Clone, Copy)]
pub struct PatchLoader {
    parallel: bool,
}

impl Default for PatchLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchLoader {
    /// Creates a loader that reads types in parallel.
    #[must_use]
    pub fn new() -> Self {
        PatchLoader { parallel: true }
    }

    /// Reads types on the calling thread only if `parallel` is `false`. The result is the
    /// same either way.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Builds the configuration declared by `module`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the module has no `Patch` intent, if intents
    /// conflict, if two members map onto the same substitution key, or if a merged method has
    /// no body.
    pub fn load(&self, module: Arc<Module>) -> Result<PatchConfiguration> {
        let intents = Intents::parse(&module.attributes)?;
        let target = intents.patch().ok_or_else(|| {
            Error::Configuration(format!("module {} declares no Patch target", module.name))
        })?;

        let mut config = PatchConfiguration::new(&module.name, target);
        for required in intents.required() {
            config.add_required(required);
        }

        let plans = plan(&module, config.substitutions_mut())?;
        let renames = config.substitutions().clone();
        let source = SourceModule::new(Arc::clone(&module));

        let outcomes = DashMap::with_capacity(plans.len());
        let load_type = |plan: &TypePlan| -> Result<()> {
            let loader = TypeLoader {
                module: &module,
                source: &source,
                renames: &renames,
                plan,
            };
            outcomes.insert(plan.id, loader.load()?);
            Ok(())
        };
        if self.parallel {
            plans.par_iter().try_for_each(load_type)?;
        } else {
            plans.iter().try_for_each(load_type)?;
        }

        for plan in &plans {
            let Some((_, outcome)) = outcomes.remove(&plan.id) else {
                continue;
            };
            config.substitutions_mut().extend(outcome.substitutions)?;

            if let Some(dependency) = outcome.dependency {
                if plan.role == Role::Mixin {
                    let mut mixin = Mixin::new(dependency);
                    for action in outcome.actions {
                        mixin.push(action)?;
                    }
                    for interface in outcome.interfaces {
                        mixin.add_interface(interface);
                    }
                    config.add_mixin(mixin);
                } else {
                    config.add_dependency(dependency);
                }
            }
            if let Some(inject) = outcome.inject {
                config.add_inject(inject);
            }
        }

        info!(
            "Loaded patch {} for {}: {} dependencies, {} mixins with {} merges, {} injects",
            config.name(),
            config.target(),
            config.dependencies().len(),
            config.mixins().len(),
            config.merge_count(),
            config.injects().len()
        );
        Ok(config)
    }
}

/// Picks the types that take part and registers their renames.
fn plan(module: &Module, substitutions: &mut Substitutions) -> Result<Vec<TypePlan>> {
    let mut plans = Vec::new();
    for id in module.type_ids() {
        let def = module.type_def(id);
        let intents = Intents::parse(&def.attributes)?;
        if intents.has(IntentKind::Transparent) {
            continue;
        }

        let owner = &def.signature;
        intents.exclusive(IntentKind::Mixin, IntentKind::Dependency, owner)?;
        intents.exclusive(IntentKind::Inject, IntentKind::Dependency, owner)?;
        intents.exclusive(IntentKind::Mixin, IntentKind::Inject, owner)?;

        let role = if intents.has(IntentKind::Mixin) {
            Role::Mixin
        } else if intents.has(IntentKind::Dependency) {
            Role::Dependency
        } else if intents.has(IntentKind::Inject) {
            Role::Inject
        } else {
            continue;
        };

        let target = match intents.name() {
            Some(name) => TypeSignature::get(name, def.signature.kind())?,
            None => def.signature.clone(),
        };
        substitutions.types.add(def.signature.clone(), target.clone())?;
        debug!("{} {} targets {}", role, def.signature, target);

        plans.push(TypePlan { id, role, target });
    }
    Ok(plans)
}

/// How a mixin parameter is used: `[In]` reads, `[Out]` writes, no direction does both.
fn parameter_mode(flags: ParamAttributes) -> AccessMode {
    let mut mode = AccessMode::empty();
    if !flags.contains(ParamAttributes::IN) {
        mode |= AccessMode::WRITE;
    }
    if !flags.contains(ParamAttributes::OUT) {
        mode |= AccessMode::READ;
    }
    mode
}

/// Reads the members of one type.
struct TypeLoader<'a> {
    module: &'a Module,
    source: &'a SourceModule,
    renames: &'a Substitutions,
    plan: &'a TypePlan,
}

impl TypeLoader<'_> {
    fn load(&self) -> Result<TypeOutcome> {
        let def = self.module.type_def(self.plan.id);
        let descriptor = TypeDescriptor::builder(self.plan.target.clone())
            .access(def.flags.visibility())
            .build();

        let mut outcome = TypeOutcome::default();
        let mut dependency = Dependency::new(descriptor.clone());
        let mut inject = if self.plan.role == Role::Inject {
            let inject = Inject::new(descriptor).with_flags(def.flags);
            match &def.base {
                Some(base) => inject.with_base(self.renames.substitute_sig(base)),
                None => inject,
            }
        } else {
            // Members injected into an existing type leave its visibility alone
            Inject::new(TypeDescriptor::builder(self.plan.target.clone()).build())
        };

        for field in &def.fields {
            self.load_field(*field, &mut dependency, &mut inject, &mut outcome)?;
        }
        for method in &def.methods {
            self.load_method(*method, &mut dependency, &mut inject, &mut outcome)?;
        }

        if self.plan.role == Role::Mixin {
            outcome.interfaces.clone_from(&def.interfaces);
        }
        if self.plan.role != Role::Inject {
            outcome.dependency = Some(dependency);
        }
        if self.plan.role == Role::Inject
            || !inject.fields().is_empty()
            || !inject.methods().is_empty()
        {
            outcome.inject = Some(inject);
        }

        debug!(
            "Read {} {}: {} merges, {} substitutions",
            self.plan.role,
            def.signature,
            outcome.actions.len(),
            outcome.substitutions.len()
        );
        Ok(outcome)
    }

    /// The intents of a member, `None` if it is transparent. Members of an inject type are
    /// injects themselves.
    fn member_intents(
        &self,
        attributes: &[CustomAttribute],
        owner: &dyn std::fmt::Display,
    ) -> Result<Option<Intents>> {
        let mut intents = Intents::parse(attributes)?;
        if intents.has(IntentKind::Transparent) {
            return Ok(None);
        }
        if intents.has(IntentKind::BaseDependency) && self.plan.role != Role::Mixin {
            return Err(Error::Configuration(format!(
                "{owner} is a BaseDependency outside a mixin type"
            )));
        }
        if self.plan.role == Role::Inject {
            intents.push(Intent::Inject);
        }

        intents.exclusive(IntentKind::Mixin, IntentKind::Dependency, owner)?;
        intents.exclusive(IntentKind::Inject, IntentKind::Dependency, owner)?;
        intents.exclusive(IntentKind::BaseDependency, IntentKind::Mixin, owner)?;
        intents.exclusive(IntentKind::BaseDependency, IntentKind::Inject, owner)?;
        Ok(Some(intents))
    }

    fn load_field(
        &self,
        id: FieldId,
        dependency: &mut Dependency,
        inject: &mut Inject,
        outcome: &mut TypeOutcome,
    ) -> Result<()> {
        let field = self.module.field(id);
        let own = self.module.field_signature(id);
        let Some(intents) = self.member_intents(&field.attributes, &own)? else {
            return Ok(());
        };

        let target = FieldSignature::new(
            self.plan.target.clone(),
            intents.name().unwrap_or(&field.name),
            self.renames.substitute_sig(&field.field_type),
        );
        outcome.substitutions.fields.add(own, target.clone())?;

        let descriptor = FieldDescriptor::builder(target)
            .access(field.flags.access().unwrap_or_default())
            .read_only(field.flags.contains(FieldAttributes::INIT_ONLY))
            .build();
        if intents.has(IntentKind::Inject) {
            inject.add_field(InjectedField {
                descriptor,
                flags: field.flags,
            });
        } else {
            dependency.add_field(descriptor);
        }
        Ok(())
    }

    fn load_method(
        &self,
        id: MethodId,
        dependency: &mut Dependency,
        inject: &mut Inject,
        outcome: &mut TypeOutcome,
    ) -> Result<()> {
        let method = self.module.method(id);
        let own = self.module.method_signature(id);
        let Some(intents) = self.member_intents(&method.attributes, &own)? else {
            return Ok(());
        };

        if intents.has(IntentKind::BaseDependency) {
            dependency.add_original(own);
            return Ok(());
        }
        if intents.has(IntentKind::RewriteBase) && !own.is_constructor() {
            return Err(Error::Configuration(format!(
                "{own} is not a constructor and cannot rewrite its base call"
            )));
        }

        let target = MethodSignature::new(
            self.plan.target.clone(),
            intents.name().unwrap_or(&method.name),
            method.call_conv,
            own.parameters
                .iter()
                .map(|parameter| self.renames.substitute_sig(parameter))
                .collect(),
        );
        outcome.substitutions.methods.add(own, target.clone())?;

        let mut builder = MethodDescriptor::builder(target.clone());
        builder
            .access(method.flags.access().unwrap_or_default())
            .return_type(self.renames.substitute_sig(&method.return_type));
        for (index, parameter) in method.parameters.iter().enumerate() {
            builder.parameter(index, parameter_mode(parameter.flags()));
        }
        let descriptor = builder.build()?;

        if intents.has(IntentKind::Inject) {
            let body = match method.body {
                Some(_) => Some(ReplacementBody::from_method(self.source, id)?),
                None => None,
            };
            inject.add_method(InjectedMethod {
                descriptor,
                flags: method.flags,
                body,
            });
            return Ok(());
        }

        dependency.add_method(descriptor);
        if self.plan.role == Role::Mixin && !intents.has(IntentKind::Dependency) {
            outcome.actions.push(MergeAction {
                method: target,
                rewrite_base: intents.has(IntentKind::RewriteBase),
                body: ReplacementBody::from_method(self.source, id)?,
            });
        }
        Ok(())
    }
}
