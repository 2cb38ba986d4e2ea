//! Patch application.
//!
//! [`Patcher::apply`] runs one [`PatchConfiguration`] against a target module and the required
//! modules it names. The steps run in a fixed order and the first error aborts the unit:
//!
//! 1. **Dependencies** are resolved first-match-wins across the target and the listed required
//!    modules, then promoted to the visibility and shape the patch declared.
//! 2. **Injected members** are declared in the target.
//! 3. **Mixins** are merged, and their interfaces added.
//! 4. **Injected bodies** are spliced into the declared methods.
//! 5. **Hooks** run for every module of the set.
//! 6. **Substitutions** are collapsed and applied to every module of the set.
//! 7. **Validation** fails the unit if anything declared stayed unresolved.
//!
//! [`Patcher::patch_images`] wraps the pipeline for raw module images and serializes only after
//! every step succeeded.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cilmixin::{Module, PatchLoader, PatchOptions, Patcher};
//!
//! let mixins = Arc::new(Module::from_file("Patch.cmim".as_ref())?);
//! let config = PatchLoader::new().load(mixins)?;
//!
//! let mut target = Module::from_file("Game.cmim".as_ref())?;
//! let report = Patcher::new(PatchOptions::default()).apply(&config, &mut target, &mut [])?;
//! println!("{report}");
//! target.to_file("Game.patched.cmim".as_ref())?;
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use log::{debug, info, warn};

use crate::{
    metadata::{
        flags::FieldAttributes,
        module::{FieldDef, MethodDef, MethodId, Module, TypeDef, TypeId},
        typesig::TypeSig,
    },
    patch::{
        access::{promote_field, promote_method, promote_parameter, promote_type},
        config::{Dependency, Inject, PatchConfiguration, ReplacementBody},
        merge::{Merger, Scopes},
        options::PatchOptions,
        resolver::ModuleResolver,
    },
    signature::MethodSignature,
    Error, Result, SymbolKind,
};

/// Custom processing run on every module of a patch set after merging, before substitution.
pub trait ModuleHook {
    /// Processes one module.
    ///
    /// # Errors
    ///
    /// Any error aborts the patch unit.
    fn patch_module(&self, module: &mut Module, resolver: &ModuleResolver) -> Result<()>;
}

impl<F> ModuleHook for F
where
    F: Fn(&mut Module, &ModuleResolver) -> Result<()>,
{
    fn patch_module(&self, module: &mut Module, resolver: &ModuleResolver) -> Result<()> {
        self(module, resolver)
    }
}

/// What a patch unit changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Name of the patch unit
    pub patch: String,
    /// Definitions whose visibility or shape was relaxed
    pub promoted: usize,
    /// Merged method bodies
    pub merged: usize,
    /// Preserved originals synthesized by merges
    pub preserved: usize,
    /// Injected types, fields and methods
    pub injected: usize,
    /// Interfaces added to mixin targets
    pub interfaces: usize,
    /// Definitions rewritten by substitution
    pub substituted: usize,
    /// Symbols that stayed unresolved, empty unless validation is disabled
    pub unresolved: Vec<String>,
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} merged ({} originals preserved), {} injected, {} promoted, {} interfaces, {} substituted",
            self.patch,
            self.merged,
            self.preserved,
            self.injected,
            self.promoted,
            self.interfaces,
            self.substituted
        )?;
        if !self.unresolved.is_empty() {
            write!(f, ", {} unresolved", self.unresolved.len())?;
        }
        Ok(())
    }
}

/// Serialized result of [`Patcher::patch_images`].
#[derive(Debug, Clone)]
pub struct PatchedImages {
    /// The patched target image
    pub target: Vec<u8>,
    /// The required images, in the order they were given
    pub required: Vec<Vec<u8>>,
    /// What was changed
    pub report: PatchReport,
}

/// Applies patch configurations.
pub struct Patcher {
    options: PatchOptions,
    hooks: Vec<Box<dyn ModuleHook>>,
}

impl fmt::Debug for Patcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patcher")
            .field("options", &self.options)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Default for Patcher {
    fn default() -> Self {
        Self::new(PatchOptions::default())
    }
}

impl Patcher {
    /// Creates a patcher without hooks.
    #[must_use]
    pub fn new(options: PatchOptions) -> Self {
        Patcher {
            options,
            hooks: Vec::new(),
        }
    }

    /// Adds a hook. Hooks run in the order they were added.
    #[must_use]
    pub fn with_hook(mut self, hook: impl ModuleHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// The options in use.
    #[must_use]
    pub fn options(&self) -> &PatchOptions {
        &self.options
    }

    /// Applies `config` to `target`. `required` may hold any number of modules; those the
    /// configuration lists by name are searched after the target and patched alongside it.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Incompatible`] if a dependency declares a return type the resolved
    ///   method does not have
    /// - [`crate::Error::Configuration`] if an injected member collides with an existing one
    /// - [`crate::Error::Decode`], [`crate::Error::Import`] or [`crate::Error::Merge`] if a
    ///   replacement body cannot be merged
    /// - [`crate::Error::Validation`] if dependencies or mixins stayed unresolved
    /// - Errors of hooks are passed through
    pub fn apply(
        &self,
        config: &PatchConfiguration,
        target: &mut Module,
        required: &mut [Module],
    ) -> Result<PatchReport> {
        let mut modules = self.module_set(config, target, required);
        let resolver = ModuleResolver::new(config.substitutions());
        let mut report = PatchReport {
            patch: config.name().to_string(),
            ..PatchReport::default()
        };

        let mut scopes = Scopes::new();
        for dependency in config.all_dependencies() {
            self.resolve_dependency(&mut modules, resolver, dependency, &mut scopes, &mut report)?;
        }
        let merger = Merger::new(resolver, &self.options).with_scopes(&scopes);

        let mut bodies = Vec::new();
        for inject in config.injects() {
            self.declare_inject(&mut *modules[0], resolver, inject, &mut bodies, &mut report)?;
        }

        for mixin in config.mixins() {
            let signature = mixin.dependency().signature();
            let Some((index, declaring)) = locate(&modules, |m| resolver.try_resolve_type(m, signature))
            else {
                // already listed as an unresolved dependency
                continue;
            };
            let module = &mut *modules[index];

            for (method, actions) in mixin.actions().iter() {
                let Some(id) = resolver.try_resolve_method(module, method) else {
                    report.unresolved.push(method.to_string());
                    continue;
                };
                for action in actions {
                    if merger.merge(module, id, action, mixin.dependency().originals())?.is_some() {
                        report.preserved += 1;
                    }
                    report.merged += 1;
                }
            }
            report.interfaces += merger.add_interfaces(module, declaring, mixin.interfaces());
        }

        let originals: Vec<MethodSignature> = config
            .all_dependencies()
            .flat_map(|d| d.originals().iter().cloned())
            .collect();
        for (id, body) in bodies {
            merger.inject_body(&mut *modules[0], id, body, &originals)?;
        }

        for module in &mut modules {
            for hook in &self.hooks {
                hook.patch_module(module, &resolver)?;
            }
        }

        for module in &mut modules {
            report.substituted += config.substitutions().apply(module);
        }

        let mut seen = HashSet::new();
        report.unresolved.retain(|symbol| seen.insert(symbol.clone()));
        if !report.unresolved.is_empty() {
            if self.options.fail_on_unresolved {
                return Err(Error::Validation {
                    patch: config.name().to_string(),
                    unresolved: report.unresolved,
                });
            }
            warn!(
                "Patch {} left {} symbol(s) unresolved",
                config.name(),
                report.unresolved.len()
            );
        }

        info!("{report}");
        Ok(report)
    }

    /// Parses the images, applies `config` and serializes the results.
    ///
    /// # Errors
    ///
    /// Image parse and serialization errors, plus everything [`Patcher::apply`] returns.
    pub fn patch_images(
        &self,
        config: &PatchConfiguration,
        target: &[u8],
        required: &[&[u8]],
    ) -> Result<PatchedImages> {
        let mut target = Module::from_mem(target)?;
        let mut required = required
            .iter()
            .map(|data| Module::from_mem(data))
            .collect::<Result<Vec<_>>>()?;

        let report = self.apply(config, &mut target, &mut required)?;

        Ok(PatchedImages {
            target: target.to_bytes()?,
            required: required
                .iter()
                .map(Module::to_bytes)
                .collect::<Result<Vec<_>>>()?,
            report,
        })
    }

    /// The target followed by the required modules the configuration lists, in listed order.
    fn module_set<'m>(
        &self,
        config: &PatchConfiguration,
        target: &'m mut Module,
        required: &'m mut [Module],
    ) -> Vec<&'m mut Module> {
        let mut modules = vec![target];
        if !self.options.resolve_in_required {
            return modules;
        }

        let mut supplied: HashMap<String, &'m mut Module> = required
            .iter_mut()
            .map(|module| (module.name.clone(), module))
            .collect();
        for name in config.required() {
            match supplied.remove(name) {
                Some(module) => modules.push(module),
                None => warn!("Required module {} of patch {} was not supplied", name, config.name()),
            }
        }
        modules
    }

    fn resolve_dependency(
        &self,
        modules: &mut [&mut Module],
        resolver: ModuleResolver,
        dependency: &Dependency,
        scopes: &mut Scopes,
        report: &mut PatchReport,
    ) -> Result<()> {
        let signature = dependency.signature();
        let Some((index, id)) = locate(modules, |m| resolver.try_resolve_type(m, signature)) else {
            report.unresolved.push(signature.to_string());
            return Ok(());
        };
        let module = &mut *modules[index];
        debug!("Dependency {} found in {}", signature, module.name);
        scopes.insert(
            resolver.substitutions().substitute_type(signature),
            module.name.clone(),
        );

        if promote_type(module, id, dependency.descriptor().access()) {
            report.promoted += 1;
        }

        for field in dependency.fields() {
            let Some(id) = resolver.try_resolve_field(module, field.signature()) else {
                report.unresolved.push(field.signature().to_string());
                continue;
            };
            let mut changed = promote_field(module, id, field.access());
            if field.read_only() == Some(false) {
                let def = module.field_mut(id);
                if def.flags.contains(FieldAttributes::INIT_ONLY) {
                    def.flags.remove(FieldAttributes::INIT_ONLY);
                    debug!("Cleared read-only of {}", field.signature());
                    changed = true;
                }
            }
            if changed {
                report.promoted += 1;
            }
        }

        for method in dependency.methods() {
            let Some(id) = resolver.try_resolve_method(module, method.signature()) else {
                report.unresolved.push(method.signature().to_string());
                continue;
            };
            if let Some(expected) = method.return_type() {
                let actual = &module.method(id).return_type;
                if !resolver.is_assignable(expected, actual) {
                    return Err(Error::Incompatible {
                        signature: method.signature().to_string(),
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
            }

            let mut changed = promote_method(module, id, method.access());
            for (index, mode) in method.parameters() {
                let parameter = method.signature().parameter(index).ok_or_else(|| {
                    Error::Unresolved {
                        kind: SymbolKind::Parameter,
                        signature: format!("[{index}] in {}", method.signature()),
                    }
                })?;
                let (id, index) = resolver.resolve_parameter(module, &parameter)?;
                changed |= promote_parameter(module, id, index, mode);
            }
            if changed {
                report.promoted += 1;
            }
        }
        Ok(())
    }

    fn declare_inject<'c>(
        &self,
        module: &mut Module,
        resolver: ModuleResolver,
        inject: &'c Inject,
        bodies: &mut Vec<(MethodId, &'c ReplacementBody)>,
        report: &mut PatchReport,
    ) -> Result<()> {
        let substitutions = resolver.substitutions();
        let signature = inject.descriptor().signature();
        let declaring = match resolver.try_resolve_type(module, signature) {
            Some(id) => {
                if promote_type(module, id, inject.descriptor().access()) {
                    report.promoted += 1;
                }
                id
            }
            None => {
                let id = self.create_type(module, resolver, inject);
                report.injected += 1;
                id
            }
        };

        for field in inject.fields() {
            let target = substitutions.substitute_field(field.descriptor.signature());
            let collides = module
                .type_def(declaring)
                .fields
                .iter()
                .any(|id| module.field(*id).name == target.name);
            if collides {
                return Err(Error::Configuration(format!(
                    "injected field {target} collides with an existing field"
                )));
            }

            let flags = field.flags.with_access(field.descriptor.access());
            module.add_field(declaring, FieldDef::new(&target.name, flags, target.field_type.clone()));
            debug!("Injected field {}", target);
            report.injected += 1;
        }

        for method in inject.methods() {
            let target = substitutions.substitute_method(method.descriptor.signature());
            let collides = module
                .type_def(declaring)
                .methods
                .iter()
                .any(|id| same_method(resolver, module, *id, &target));
            if collides {
                return Err(Error::Configuration(format!(
                    "injected method {target} collides with an existing method"
                )));
            }

            let return_type = method
                .descriptor
                .return_type()
                .map_or_else(TypeSig::void, |ret| substitutions.substitute_sig(ret));
            let def = MethodDef::new(
                &target.name,
                method.flags.with_access(method.descriptor.access()),
                target.call_conv,
                return_type,
                target.parameters.clone(),
            );
            let id = module.add_method(declaring, def);
            debug!("Injected method {}", target);
            report.injected += 1;

            if let Some(body) = &method.body {
                bodies.push((id, body));
            }
        }
        Ok(())
    }

    fn create_type(&self, module: &mut Module, resolver: ModuleResolver, inject: &Inject) -> TypeId {
        let substitutions = resolver.substitutions();
        let signature = substitutions.substitute_type(inject.descriptor().signature());
        let mut def = TypeDef::new(signature, inject.flags());
        def.base = Some(
            inject
                .base()
                .map_or_else(TypeSig::object, |base| substitutions.substitute_sig(base)),
        );
        debug!("Injected type {}", def.signature);

        let id = module.add_type(def);
        promote_type(module, id, inject.descriptor().access());
        id
    }
}

fn same_method(resolver: ModuleResolver, module: &Module, id: MethodId, signature: &MethodSignature) -> bool {
    let def = module.method(id);
    def.name == signature.name
        && def.parameters.len() == signature.parameters.len()
        && def
            .parameters
            .iter()
            .zip(&signature.parameters)
            .all(|(parameter, expected)| resolver.type_matches(&parameter.param_type, expected))
}

/// The first module (and its hit) for which `find` succeeds.
fn locate<T>(modules: &[&mut Module], find: impl Fn(&Module) -> Option<T>) -> Option<(usize, T)> {
    modules
        .iter()
        .enumerate()
        .find_map(|(index, module)| find(module).map(|hit| (index, hit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        metadata::flags::{MethodAttributes, ParamAttributes, TypeAttributes},
        patch::config::{InjectedField, InjectedMethod, Mixin},
        signature::{
            AccessLevel, AccessMode, CallingConvention, FieldDescriptor, MethodDescriptor,
            TypeDescriptor, TypeSignature,
        },
        test::{class, mixin_method, target_module, MixinBuilder, HIDDEN, PLAYER},
    };

    fn hidden_dependency() -> Dependency {
        let hidden = class(HIDDEN);
        let mut dependency = Dependency::new(
            TypeDescriptor::builder(hidden.clone())
                .access(AccessLevel::Assembly)
                .build(),
        );
        dependency.add_field(
            FieldDescriptor::builder(hidden.field("secret", TypeSig::string()))
                .access(AccessLevel::Assembly)
                .build(),
        );
        dependency
    }

    #[test]
    fn dependencies_are_promoted() {
        let mut target = target_module();
        let mut config = PatchConfiguration::new("Promote", "Game");
        config.add_dependency(hidden_dependency());

        let report = Patcher::default().apply(&config, &mut target, &mut []).unwrap();
        assert_eq!(report.promoted, 1);

        let hidden = target.find_type(HIDDEN).unwrap();
        let secret = target.type_def(hidden).fields[0];
        assert_eq!(target.field(secret).flags.access(), Some(AccessLevel::Assembly));
        assert!(target.field(secret).flags.contains(FieldAttributes::INIT_ONLY));
    }

    #[test]
    fn read_only_can_be_lifted() {
        let mut target = target_module();
        let hidden = class(HIDDEN);
        let mut dependency = Dependency::new(TypeDescriptor::builder(hidden.clone()).build());
        dependency.add_field(
            FieldDescriptor::builder(hidden.field("secret", TypeSig::string()))
                .read_only(false)
                .build(),
        );
        let mut config = PatchConfiguration::new("Writable", "Game");
        config.add_dependency(dependency);

        Patcher::default().apply(&config, &mut target, &mut []).unwrap();
        let id = target.type_def(target.find_type(HIDDEN).unwrap()).fields[0];
        assert!(!target.field(id).flags.contains(FieldAttributes::INIT_ONLY));
    }

    #[test]
    fn incompatible_return_type_fails() {
        let mut target = target_module();
        let hidden = class(HIDDEN);
        let mut dependency = Dependency::new(TypeDescriptor::builder(hidden.clone()).build());
        dependency.add_method(
            MethodDescriptor::builder(hidden.method("Reveal", CallingConvention::HAS_THIS, vec![]))
                .return_type(TypeSig::int32())
                .build()
                .unwrap(),
        );
        let mut config = PatchConfiguration::new("Mismatch", "Game");
        config.add_dependency(dependency);

        let error = Patcher::default().apply(&config, &mut target, &mut []).unwrap_err();
        assert!(matches!(error, Error::Incompatible { .. }));
    }

    #[test]
    fn parameters_are_relaxed() {
        let mut target = target_module();
        let player = class(PLAYER);
        let mut dependency = Dependency::new(TypeDescriptor::builder(player.clone()).build());
        dependency.add_method(
            MethodDescriptor::builder(player.method(
                "TryGet",
                CallingConvention::HAS_THIS,
                vec![TypeSig::ByRef(Box::new(TypeSig::int32()))],
            ))
            .parameter(0, AccessMode::READ | AccessMode::WRITE)
            .build()
            .unwrap(),
        );
        let mut config = PatchConfiguration::new("Relax", "Game");
        config.add_dependency(dependency);

        let report = Patcher::default().apply(&config, &mut target, &mut []).unwrap();
        assert_eq!(report.promoted, 1);
        let owner = target.find_type(PLAYER).unwrap();
        let try_get = target.find_method(owner, "TryGet").unwrap();
        assert!(!target.method(try_get).parameters[0]
            .flags()
            .contains(ParamAttributes::OUT));
    }

    #[test]
    fn unresolved_symbols_fail_validation() {
        let mut target = target_module();
        let mut config = PatchConfiguration::new("Missing", "Game");
        config.add_dependency(Dependency::new(
            TypeDescriptor::builder(class("Tests.Game.Absent")).build(),
        ));

        match Patcher::default().apply(&config, &mut target, &mut []) {
            Err(Error::Validation { patch, unresolved }) => {
                assert_eq!(patch, "Missing");
                assert_eq!(unresolved, vec!["Tests.Game.Absent".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let report = Patcher::new(PatchOptions::permissive())
            .apply(&config, &mut target, &mut [])
            .unwrap();
        assert_eq!(report.unresolved.len(), 1);
    }

    #[test]
    fn required_modules_are_searched_in_order() {
        let mut target = target_module();
        let mut first = Module::new("Engine");
        let shared = class("Tests.Engine.Shared");
        first.add_type(TypeDef::new(shared.clone(), TypeAttributes::NOT_PUBLIC));
        let mut second = Module::new("Engine2");
        second.add_type(TypeDef::new(shared.clone(), TypeAttributes::NOT_PUBLIC));
        let mut unlisted = Module::new("Other");
        unlisted.add_type(TypeDef::new(shared.clone(), TypeAttributes::NOT_PUBLIC));

        let mut config = PatchConfiguration::new("Fallback", "Game");
        config.add_required("Engine");
        config.add_required("Engine2");
        config.add_dependency(Dependency::new(
            TypeDescriptor::builder(shared.clone())
                .access(AccessLevel::Public)
                .build(),
        ));

        let mut required = vec![unlisted, second, first];
        Patcher::default().apply(&config, &mut target, &mut required).unwrap();
        assert_eq!(required[2].types[0].flags.visibility(), AccessLevel::Public);
        assert_eq!(required[1].types[0].flags.visibility(), AccessLevel::Assembly);
        assert_eq!(required[0].types[0].flags.visibility(), AccessLevel::Assembly);

        let strict = Patcher::new(PatchOptions::strict()).apply(&config, &mut target, &mut required);
        assert!(matches!(strict, Err(Error::Validation { .. })));
    }

    #[test]
    fn mixins_merge_and_hooks_run() {
        let mut target = target_module();
        let mut builder = MixinBuilder::new();
        let action = builder.replace_update(|b, _| {
            b.op(OpCode::NOP).op(OpCode::RET);
        });

        let player = class(PLAYER);
        let mut dependency = Dependency::new(TypeDescriptor::builder(player.clone()).build());
        dependency.add_method(
            MethodDescriptor::builder(MixinBuilder::update_signature())
                .build()
                .unwrap(),
        );
        let mut mixin = Mixin::new(dependency);
        mixin.push(action).unwrap();
        mixin.add_interface(TypeSig::Named(TypeSignature::class("System.IDisposable").unwrap()));

        let mut config = PatchConfiguration::new("Merge", "Game");
        config.add_mixin(mixin);
        *config.substitutions_mut() = builder.substitutions();

        let seen = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = seen.clone();
        let patcher = Patcher::default().with_hook(move |module: &mut Module, _: &ModuleResolver| {
            counter.set(counter.get() + module.types.len());
            Ok(())
        });
        let report = patcher.apply(&config, &mut target, &mut []).unwrap();

        assert_eq!(report.merged, 1);
        assert_eq!(report.interfaces, 1);
        assert_eq!(seen.get(), 3);
        let update = target.find_method(target.find_type(PLAYER).unwrap(), "Update").unwrap();
        assert_eq!(target.method(update).body.as_ref().unwrap().instructions.len(), 2);
    }

    #[test]
    fn injects_create_members() {
        let mut target = target_module();
        let mut builder = MixinBuilder::new();
        let text = builder.string("injected");
        let body = mixin_method(&mut builder, |b, _| {
            b.member(OpCode::LDSTR, text.clone()).op(OpCode::POP).op(OpCode::RET);
        });

        let tracker = class("Tests.Game.Tracker");
        let mut inject = Inject::new(
            TypeDescriptor::builder(tracker.clone())
                .access(AccessLevel::Public)
                .build(),
        );
        inject.add_field(InjectedField {
            descriptor: FieldDescriptor::builder(tracker.field("count", TypeSig::int32()))
                .access(AccessLevel::Private)
                .build(),
            flags: FieldAttributes::STATIC,
        });
        inject.add_method(InjectedMethod {
            descriptor: MethodDescriptor::builder(tracker.method(
                "Track",
                CallingConvention::HAS_THIS,
                vec![],
            ))
            .access(AccessLevel::Public)
            .build()
            .unwrap(),
            flags: MethodAttributes::HIDE_BY_SIG,
            body: Some(body),
        });

        let mut config = PatchConfiguration::new("Inject", "Game");
        config.add_inject(inject.clone());
        let report = Patcher::default().apply(&config, &mut target, &mut []).unwrap();
        assert_eq!(report.injected, 3);

        let id = target.find_type("Tests.Game.Tracker").unwrap();
        let def = target.type_def(id);
        assert_eq!(def.flags.visibility(), AccessLevel::Public);
        assert_eq!(def.base, Some(TypeSig::object()));
        let track = target.find_method(id, "Track").unwrap();
        assert_eq!(target.method(track).flags.access(), Some(AccessLevel::Public));
        assert!(target.method(track).body.as_ref().unwrap().is_consistent());

        // declaring the same members again collides
        let mut again = PatchConfiguration::new("Inject", "Game");
        again.add_inject(inject);
        assert!(matches!(
            Patcher::default().apply(&again, &mut target, &mut []),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn images_are_serialized_after_success() {
        let target = target_module().to_bytes().unwrap();
        let mut config = PatchConfiguration::new("Images", "Game");
        config.add_dependency(hidden_dependency());

        let patched = Patcher::default().patch_images(&config, &target, &[]).unwrap();
        let module = Module::from_mem(&patched.target).unwrap();
        let hidden = module.find_type(HIDDEN).unwrap();
        assert_eq!(module.type_def(hidden).flags.visibility(), AccessLevel::Assembly);

        config.add_dependency(Dependency::new(
            TypeDescriptor::builder(class("Tests.Game.Absent")).build(),
        ));
        assert!(Patcher::default().patch_images(&config, &target, &[]).is_err());
    }
}
