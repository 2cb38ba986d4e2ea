//! Splicing replacement bodies into target methods.
//!
//! A merge replaces the body of a target method with a replacement decoded from the mixin
//! module. Replacement operands are symbolic ([`SourceMember`]) and are bound one by one to the
//! target: definitions found by the [`ModuleResolver`] are used directly, everything else is
//! imported as a type or member reference. A reference is scoped to the home module of its
//! type when the patcher located one (see [`Scopes`]), to the module it came from otherwise.
//!
//! # Preserved Originals
//!
//! A replacement may call the method it replaces through a base dependency. The first such
//! call synthesizes a compiler-controlled copy of the target, named after it with the
//! configured suffix and the first unused counter (`Update<Base>$0`), which receives the
//! pre-merge body. All base-dependency calls of the replacement go to that copy.
//!
//! # Constructors
//!
//! Constructor bodies start with a prologue ending at the first call, normally the call to the
//! base or another constructor. Exactly one prologue survives the merge: the original's by
//! default, the replacement's when the action asks to rewrite the base call. Both bodies lose
//! their prologue. A body without any call keeps everything and contributes a relabeled copy
//! of itself as the prologue. Locals an original prologue uses are appended after the
//! replacement's locals and the prologue is renumbered to match.
//!
//! # Labels
//!
//! Replacement instructions are decoded with the target's label allocator continued, so the
//! original prologue, the replacement and the preserved original never share labels.

use std::collections::HashMap;

use log::debug;

use crate::{
    assembly::{Instruction, Label, Labels, Operand},
    metadata::{
        body::{ExceptionHandler, MethodBody},
        flags::MethodAttributes,
        module::{
            FieldHandle, Member, MemberRef, MemberRefSignature, MethodDef, MethodHandle, MethodId,
            Module, TypeId,
        },
        typesig::TypeSig,
    },
    mixin::source::SourceMember,
    patch::{
        config::{MergeAction, ReplacementBody},
        options::PatchOptions,
        resolver::ModuleResolver,
    },
    signature::{MethodSignature, TypeSignature},
    Error, Result,
};

const PRESERVED_MASK: MethodAttributes = MethodAttributes::REQUIRE_SEC_OBJECT
    .union(MethodAttributes::HIDE_BY_SIG)
    .union(MethodAttributes::STATIC);

/// Home modules of types, keyed by their target-universe signature.
pub type Scopes = HashMap<TypeSignature, String>;

/// Binds replacement bodies into a target module.
#[derive(Debug, Clone, Copy)]
pub struct Merger<'a> {
    resolver: ModuleResolver<'a>,
    options: &'a PatchOptions,
    scopes: Option<&'a Scopes>,
}

impl<'a> Merger<'a> {
    /// Creates a merger resolving through `resolver`.
    #[must_use]
    pub fn new(resolver: ModuleResolver<'a>, options: &'a PatchOptions) -> Self {
        Merger {
            resolver,
            options,
            scopes: None,
        }
    }

    /// Scopes references to the listed types to their home module instead of the module the
    /// replacement came from.
    #[must_use]
    pub fn with_scopes(mut self, scopes: &'a Scopes) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Replaces the body of `target` with the action's replacement.
    ///
    /// `originals` are the base-dependency signatures of the mixin, in the mixin's own
    /// universe. Returns the preserved original, if one was synthesized.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if the replacement cannot be decoded,
    /// [`crate::Error::Import`] if one of its operands cannot be bound to the target and
    /// [`crate::Error::Merge`] if the merged body refers to labels, locals or arguments it does
    /// not have.
    pub fn merge(
        &self,
        module: &mut Module,
        target: MethodId,
        action: &MergeAction,
        originals: &[MethodSignature],
    ) -> Result<Option<MethodId>> {
        let method = module.method_signature(target).to_string();
        let arguments = module.method(target).argument_count();
        let snapshot = module.method(target).body.clone().unwrap_or_default();
        let replacement = self.decode(&action.body, Labels::starting_at(snapshot.labels.peek()))?;
        let mut labels = replacement.labels;
        let mut locals = replacement.locals;

        let mut original_rest = snapshot.instructions.clone();
        let mut replacement_rest = replacement.instructions;
        let mut prologue = Vec::new();
        let mut replacement_prologue = Vec::new();
        if action.method.is_constructor() {
            let original_prologue = split_prologue(&mut original_rest, &mut labels);
            let mixin_prologue = split_prologue(&mut replacement_rest, &mut labels);
            if action.rewrite_base {
                replacement_prologue = mixin_prologue;
            } else {
                prologue = original_prologue;
            }
        }
        let keeps_original_prologue = !prologue.is_empty();
        carry_locals(&mut prologue, &snapshot.locals, &mut locals, &method)?;

        let mut binder = Binder {
            module,
            resolver: self.resolver,
            originals,
            scopes: self.scopes,
            preserve: Some((target, self.options.base_suffix.as_str())),
            preserved: None,
        };

        let mut instructions = prologue;
        for instruction in replacement_prologue.into_iter().chain(replacement_rest) {
            instructions.push(instruction.try_map_member(|member| binder.bind(&member))?);
        }
        let mut exception_handlers = Vec::with_capacity(replacement.exception_handlers.len());
        for handler in replacement.exception_handlers {
            exception_handlers.push(handler.try_map_catch(|member| binder.bind(&member))?);
        }
        let preserved = binder.preserved;

        if let Some(copy) = preserved {
            let mut body = MethodBody {
                init_locals: snapshot.init_locals,
                max_stack: snapshot.max_stack,
                locals: snapshot.locals,
                instructions: original_rest,
                exception_handlers: snapshot.exception_handlers,
                labels: snapshot.labels,
            };
            if self.options.optimize_branches {
                body.optimize_branches();
            }
            module.method_mut(copy).body = Some(body);
        }

        let max_stack = if keeps_original_prologue {
            replacement.max_stack.max(snapshot.max_stack)
        } else {
            replacement.max_stack
        };
        let mut body = MethodBody {
            init_locals: replacement.init_locals,
            max_stack,
            locals,
            instructions,
            exception_handlers,
            labels,
        };
        validate(&body, arguments, &method)?;
        if self.options.optimize_branches {
            body.optimize_branches();
        }
        module.method_mut(target).body = Some(body);

        debug!(
            "Merged {} into {}{}",
            action.method,
            module.name,
            preserved.map_or_else(String::new, |id| format!(", original kept as {}", module.method(id).name))
        );
        Ok(preserved)
    }

    /// Gives an injected method its body. There is no original to call, so base dependencies
    /// cannot be referenced.
    ///
    /// # Errors
    ///
    /// As [`Merger::merge`], plus [`crate::Error::Import`] for base-dependency references.
    pub fn inject_body(
        &self,
        module: &mut Module,
        target: MethodId,
        body: &ReplacementBody,
        originals: &[MethodSignature],
    ) -> Result<()> {
        let arguments = module.method(target).argument_count();
        let replacement = self.decode(body, Labels::default())?;
        let mut binder = Binder {
            module,
            resolver: self.resolver,
            originals,
            scopes: self.scopes,
            preserve: None,
            preserved: None,
        };

        let mut instructions = Vec::with_capacity(replacement.instructions.len());
        for instruction in replacement.instructions {
            instructions.push(instruction.try_map_member(|member| binder.bind(&member))?);
        }
        let mut exception_handlers: Vec<ExceptionHandler<Member>> =
            Vec::with_capacity(replacement.exception_handlers.len());
        for handler in replacement.exception_handlers {
            exception_handlers.push(handler.try_map_catch(|member| binder.bind(&member))?);
        }

        let mut body = MethodBody {
            init_locals: replacement.init_locals,
            max_stack: replacement.max_stack,
            locals: replacement.locals,
            instructions,
            exception_handlers,
            labels: replacement.labels,
        };
        validate(&body, arguments, &module.method_signature(target).to_string())?;
        if self.options.optimize_branches {
            body.optimize_branches();
        }
        module.method_mut(target).body = Some(body);
        Ok(())
    }

    /// Adds the interfaces a mixin type implements to the target type. Returns how many were
    /// missing.
    pub fn add_interfaces(&self, module: &mut Module, target: TypeId, interfaces: &[TypeSig]) -> usize {
        let def = module.type_def_mut(target);
        let mut added = 0;
        for interface in interfaces {
            let interface = self.resolver.substitutions().substitute_sig(interface);
            if !def.interfaces.contains(&interface) {
                debug!("Added interface {} to {}", interface, def.signature);
                def.interfaces.push(interface);
                added += 1;
            }
        }
        added
    }

    fn decode(&self, body: &ReplacementBody, labels: Labels) -> Result<MethodBody<SourceMember>> {
        let substitutions = self.resolver.substitutions();
        let locals = body
            .locals
            .iter()
            .map(|local| substitutions.substitute_sig(local))
            .collect();
        MethodBody::decode_with_labels(&body.raw, locals, &body.source, labels)
    }
}

/// Binds symbolic operands in one module.
struct Binder<'a, 'm> {
    module: &'m mut Module,
    resolver: ModuleResolver<'a>,
    originals: &'m [MethodSignature],
    scopes: Option<&'a Scopes>,
    /// Method whose original may be preserved, and the name suffix to use
    preserve: Option<(MethodId, &'m str)>,
    preserved: Option<MethodId>,
}

impl Binder<'_, '_> {
    /// The module a reference to `sig` is scoped to.
    fn scope_of(&self, sig: &TypeSig, source: &str) -> String {
        sig.leaf()
            .and_then(|leaf| self.scopes.and_then(|scopes| scopes.get(leaf)))
            .map_or_else(|| source.to_string(), String::clone)
    }

    fn bind(&mut self, member: &SourceMember) -> Result<Member> {
        let substitutions = self.resolver.substitutions();
        match member {
            SourceMember::Type(sig, scope) => {
                let sig = substitutions.substitute_sig(sig);
                let scope = self.scope_of(&sig, scope);
                Ok(self.module.import_type(&sig, &scope))
            }
            SourceMember::Field(signature, scope) => {
                if let Some(id) = self.resolver.try_resolve_field(self.module, signature) {
                    return Ok(Member::Field(FieldHandle::Def(id)));
                }
                let field = substitutions.substitute_field(signature);
                let parent = TypeSig::Named(field.declaring);
                let scope = self.scope_of(&parent, scope);
                let reference = MemberRef {
                    parent,
                    name: field.name,
                    signature: MemberRefSignature::Field(field.field_type),
                };
                let id = self.module.import_member_ref(reference, &scope);
                Ok(Member::Field(FieldHandle::Ref(id)))
            }
            SourceMember::Method(signature, return_type, scope) => {
                if self.originals.contains(signature) {
                    let copy = self.preserved_original(signature)?;
                    return Ok(Member::Method(MethodHandle::Def(copy)));
                }
                if let Some(id) = self.resolver.try_resolve_method(self.module, signature) {
                    return Ok(Member::Method(MethodHandle::Def(id)));
                }
                let method = substitutions.substitute_method(signature);
                let parent = TypeSig::Named(method.declaring);
                let scope = self.scope_of(&parent, scope);
                let reference = MemberRef {
                    parent,
                    name: method.name,
                    signature: MemberRefSignature::Method {
                        call_conv: method.call_conv,
                        return_type: substitutions.substitute_sig(return_type),
                        parameters: method.parameters,
                    },
                };
                let id = self.module.import_member_ref(reference, &scope);
                Ok(Member::Method(MethodHandle::Ref(id)))
            }
            SourceMember::String(value) => Ok(Member::String(self.module.intern_string(value))),
            SourceMember::Blob(_) => Err(Error::Import {
                signature: member.to_string(),
                message: "standalone signatures cannot be imported".to_string(),
            }),
            SourceMember::Ambiguous(description) => Err(Error::Import {
                signature: description.clone(),
                message: "member has no module-independent identity".to_string(),
            }),
        }
    }

    /// The preserved copy of the merged method, created on first use.
    fn preserved_original(&mut self, reference: &MethodSignature) -> Result<MethodId> {
        if let Some(copy) = self.preserved {
            return Ok(copy);
        }
        let Some((original, suffix)) = self.preserve else {
            return Err(Error::Import {
                signature: reference.to_string(),
                message: "base dependencies are only available to mixins".to_string(),
            });
        };

        let source = self.module.method(original);
        let declaring = source.declaring;
        let name = self
            .module
            .unused_method_name(declaring, &format!("{}{}", source.name, suffix));
        let copy = MethodDef {
            declaring,
            name,
            flags: ((source.flags & PRESERVED_MASK) | MethodAttributes::SPECIAL_NAME)
                .compiler_controlled(),
            impl_flags: source.impl_flags,
            call_conv: source.call_conv,
            return_type: source.return_type.clone(),
            parameters: source.parameters.clone(),
            attributes: Vec::new(),
            body: None,
        };

        let id = self.module.add_method(declaring, copy);
        debug!(
            "Preserved original of {} as {}",
            self.module.method_signature(original),
            self.module.method(id).name
        );
        self.preserved = Some(id);
        Ok(id)
    }
}

/// Appends the `original` locals used by `prologue` to `locals` and renumbers the prologue.
fn carry_locals<M>(
    prologue: &mut [Instruction<M>],
    original: &[TypeSig],
    locals: &mut Vec<TypeSig>,
    method: &str,
) -> Result<()> {
    let mut moved: HashMap<u16, u16> = HashMap::new();
    for instruction in prologue {
        let Some(index) = instruction.local() else {
            continue;
        };
        let slot = match moved.get(&index) {
            Some(slot) => *slot,
            None => {
                let local = original.get(usize::from(index)).ok_or_else(|| Error::Merge {
                    method: method.to_string(),
                    message: format!("constructor prologue uses undeclared local {index}"),
                })?;
                let slot = u16::try_from(locals.len()).map_err(|_| Error::Merge {
                    method: method.to_string(),
                    message: "too many locals".to_string(),
                })?;
                locals.push(local.clone());
                moved.insert(index, slot);
                slot
            }
        };
        instruction.set_local(slot);
    }
    Ok(())
}

fn validate(body: &MethodBody<Member>, arguments: usize, method: &str) -> Result<()> {
    match body.inconsistency(Some(arguments)) {
        Some(message) => Err(Error::Merge {
            method: method.to_string(),
            message,
        }),
        None => Ok(()),
    }
}

/// Removes and returns the instructions up to and including the first call. Without a call the
/// list is kept and a relabeled copy of it is returned.
fn split_prologue<M: Clone>(instructions: &mut Vec<Instruction<M>>, labels: &mut Labels) -> Vec<Instruction<M>> {
    match instructions.iter().position(Instruction::is_call) {
        Some(call) => instructions.drain(..=call).collect(),
        None => relabel(instructions, labels),
    }
}

fn relabel<M: Clone>(instructions: &[Instruction<M>], labels: &mut Labels) -> Vec<Instruction<M>> {
    let renamed: HashMap<Label, Label> = instructions
        .iter()
        .map(|instruction| (instruction.label, labels.fresh()))
        .collect();
    let rename = |label: Label| renamed.get(&label).copied().unwrap_or(label);

    instructions
        .iter()
        .cloned()
        .map(|mut instruction| {
            instruction.label = rename(instruction.label);
            instruction.operand = match instruction.operand {
                Operand::Target(label) => Operand::Target(rename(label)),
                Operand::Switch(targets) => Operand::Switch(targets.into_iter().map(rename).collect()),
                other => other,
            };
            instruction
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{BodyBuilder, OpCode},
        metadata::{body::ExceptionHandler, flags::ExceptionHandlerFlags},
        patch::substitution::Substitutions,
        test::{mixin_method, target_module, MixinBuilder},
    };

    fn merged_names(module: &Module, id: MethodId) -> Vec<String> {
        let body = module.method(id).body.as_ref().unwrap();
        body.instructions
            .iter()
            .map(|i| match &i.operand {
                Operand::Member(member) => format!("{} {}", i.opcode, module.describe(member)),
                _ => i.opcode.to_string(),
            })
            .collect()
    }

    #[test]
    fn replacement_operands_bind_to_target() {
        let mut target = target_module();
        let mut mixin = MixinBuilder::new();
        let action = mixin.replace_update(|b, m| {
            b.op(OpCode::LDARG_0)
                .member(OpCode::LDFLD, m.health())
                .member(OpCode::CALL, m.console_write_line())
                .member(OpCode::LDSTR, m.string("patched"))
                .op(OpCode::POP)
                .op(OpCode::RET);
        });
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);
        let update = target
            .find_method(target.find_type("Tests.Game.Player").unwrap(), "Update")
            .unwrap();

        let preserved = merger.merge(&mut target, update, &action, &[]).unwrap();
        assert!(preserved.is_none());
        assert_eq!(
            merged_names(&target, update),
            vec![
                "ldarg.0".to_string(),
                "ldfld Tests.Game.Player::health".to_string(),
                "call System.Console::WriteLine(System.String)".to_string(),
                "ldstr \"patched\"".to_string(),
                "pop".to_string(),
                "ret".to_string(),
            ]
        );
        assert!(target.method(update).body.as_ref().unwrap().is_consistent());
        assert!(target
            .type_refs
            .iter()
            .any(|r| r.signature.full_name() == "System.Console" && r.scope == "mscorlib"));
    }

    #[test]
    fn references_take_home_module_scope() {
        let mut target = target_module();
        let mut mixin = MixinBuilder::new();
        let action = mixin.replace_update(|b, m| {
            b.member(OpCode::CALL, m.console_write_line())
                .op(OpCode::RET);
        });
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let mut scopes = Scopes::new();
        scopes.insert(
            TypeSignature::class("System.Console").unwrap(),
            "System.Console".to_string(),
        );
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options).with_scopes(&scopes);
        let update = target
            .find_method(target.find_type("Tests.Game.Player").unwrap(), "Update")
            .unwrap();

        merger.merge(&mut target, update, &action, &[]).unwrap();
        let console = target
            .type_refs
            .iter()
            .find(|r| r.signature.full_name() == "System.Console")
            .unwrap();
        assert_eq!(console.scope, "System.Console");
    }

    #[test]
    fn base_dependency_preserves_the_original() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let update = target.find_method(player, "Update").unwrap();
        let before = target.method(update).body.clone().unwrap();

        let mut mixin = MixinBuilder::new();
        let original = mixin.base_update();
        let action = mixin.replace_update(|b, _| {
            b.op(OpCode::LDARG_0)
                .member(OpCode::CALL, original.clone())
                .op(OpCode::RET);
        });
        let originals = vec![mixin.base_update_signature()];
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);

        let copy = merger.merge(&mut target, update, &action, &originals).unwrap().unwrap();
        let def = target.method(copy);
        assert_eq!(def.name, "Update<Base>$0");
        assert!(def.flags.contains(MethodAttributes::SPECIAL_NAME));
        assert_eq!(def.flags.access(), None);
        assert_eq!(def.body.as_ref().unwrap().instructions, before.instructions);
        assert_eq!(
            merged_names(&target, update)[1],
            "call Tests.Game.Player::Update<Base>$0()"
        );

        // a second merge picks the next free name
        let action = mixin.replace_update(|b, _| {
            b.op(OpCode::LDARG_0).member(OpCode::CALL, original.clone()).op(OpCode::RET);
        });
        let second = merger.merge(&mut target, update, &action, &originals).unwrap().unwrap();
        assert_eq!(target.method(second).name, "Update<Base>$1");
    }

    #[test]
    fn constructor_keeps_original_base_call() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let ctor = target.find_method(player, ".ctor").unwrap();

        let mut mixin = MixinBuilder::new();
        let action = mixin.replace_ctor(false, |b, m| {
            b.op(OpCode::LDARG_0)
                .member(OpCode::CALL, m.object_ctor())
                .op(OpCode::LDARG_0)
                .ldc_i4(100)
                .member(OpCode::STFLD, m.health())
                .op(OpCode::RET);
        });
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);
        merger.merge(&mut target, ctor, &action, &[]).unwrap();

        let names = merged_names(&target, ctor);
        let calls: Vec<&String> = names.iter().filter(|n| n.starts_with("call")).collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], "call Tests.Game.Entity::.ctor(System.Int32, System.Int32)");
        assert_eq!(names.last().unwrap(), "ret");
        assert!(target.method(ctor).body.as_ref().unwrap().is_consistent());
    }

    #[test]
    fn constructor_rewrites_base_call() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let ctor = target.find_method(player, ".ctor").unwrap();

        let mut mixin = MixinBuilder::new();
        let action = mixin.replace_ctor(true, |b, m| {
            b.op(OpCode::LDARG_0)
                .member(OpCode::CALL, m.object_ctor())
                .op(OpCode::RET);
        });
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);
        merger.merge(&mut target, ctor, &action, &[]).unwrap();

        assert_eq!(
            merged_names(&target, ctor),
            vec![
                "ldarg.0".to_string(),
                "call System.Object::.ctor()".to_string(),
                "ret".to_string(),
            ]
        );
    }

    #[test]
    fn constructor_prologue_locals_follow_replacement_locals() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let entity = target.find_type("Tests.Game.Entity").unwrap();
        let ctor = target.find_method(player, ".ctor").unwrap();
        let base = Member::Method(MethodHandle::Def(target.find_method(entity, ".ctor").unwrap()));

        // ldnull; stloc.0; ldarg.0; ldarg.1; ldarg.2; call Entity::.ctor; ret
        let mut builder = BodyBuilder::new();
        builder
            .op(OpCode::LDNULL)
            .local(OpCode::STLOC_0, 0)
            .op(OpCode::LDARG_0)
            .op(OpCode::LDARG_1)
            .op(OpCode::LDARG_2)
            .member(OpCode::CALL, base)
            .op(OpCode::RET);
        let (instructions, labels) = builder.build().unwrap();
        target.method_mut(ctor).body = Some(MethodBody {
            locals: vec![TypeSig::string()],
            instructions,
            labels,
            ..MethodBody::default()
        });

        let mut mixin = MixinBuilder::new();
        let mut action = mixin.replace_ctor(false, |b, m| {
            b.op(OpCode::LDARG_0)
                .member(OpCode::CALL, m.object_ctor())
                .op(OpCode::LDC_I4_1)
                .local(OpCode::STLOC_0, 0)
                .op(OpCode::LDARG_0)
                .local(OpCode::LDLOC_0, 0)
                .member(OpCode::STFLD, m.health())
                .op(OpCode::RET);
        });
        action.body.locals = vec![TypeSig::int32()];
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);
        merger.merge(&mut target, ctor, &action, &[]).unwrap();

        assert_eq!(
            merged_names(&target, ctor),
            vec![
                "ldnull".to_string(),
                "stloc.1".to_string(),
                "ldarg.0".to_string(),
                "ldarg.1".to_string(),
                "ldarg.2".to_string(),
                "call Tests.Game.Entity::.ctor(System.Int32, System.Int32)".to_string(),
                "ldc.i4.1".to_string(),
                "stloc.0".to_string(),
                "ldarg.0".to_string(),
                "ldloc.0".to_string(),
                "stfld Tests.Game.Player::health".to_string(),
                "ret".to_string(),
            ]
        );
        let body = target.method(ctor).body.as_ref().unwrap();
        assert_eq!(body.locals, vec![TypeSig::int32(), TypeSig::string()]);
        assert_eq!(body.inconsistency(Some(3)), None);
    }

    #[test]
    fn constructor_without_replacement_locals_keeps_prologue_slot() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let ctor = target.find_method(player, ".ctor").unwrap();
        {
            let body = target.method_mut(ctor).body.as_mut().unwrap();
            let label = body.labels.fresh();
            body.locals = vec![TypeSig::int32()];
            body.instructions
                .insert(0, Instruction::new(label, OpCode::STLOC_S, Operand::Local(0)));
            let label = body.labels.fresh();
            body.instructions
                .insert(0, Instruction::new(label, OpCode::LDC_I4_7, Operand::None));
        }

        let mut mixin = MixinBuilder::new();
        let action = mixin.replace_ctor(false, |b, m| {
            b.op(OpCode::LDARG_0)
                .member(OpCode::CALL, m.object_ctor())
                .op(OpCode::RET);
        });
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);
        merger.merge(&mut target, ctor, &action, &[]).unwrap();

        let body = target.method(ctor).body.as_ref().unwrap();
        assert_eq!(body.locals, vec![TypeSig::int32()]);
        assert_eq!(body.instructions[1].opcode, OpCode::STLOC_0);
        assert_eq!(body.instructions[1].local(), Some(0));
        assert!(body.is_consistent());
    }

    #[test]
    fn branch_into_dropped_prologue_fails() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let ctor = target.find_method(player, ".ctor").unwrap();
        let before = target.method(ctor).body.clone();

        let mut mixin = MixinBuilder::new();
        let action = mixin.replace_ctor(false, |b, m| {
            let start = b.label();
            b.mark(start)
                .op(OpCode::LDARG_0)
                .member(OpCode::CALL, m.object_ctor())
                .op(OpCode::LDC_I4_0)
                .branch(OpCode::BRTRUE, start)
                .op(OpCode::RET);
        });
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);

        match merger.merge(&mut target, ctor, &action, &[]) {
            Err(Error::Merge { method, message }) => {
                assert_eq!(method, "Tests.Game.Player::.ctor(System.Int32, System.Int32)");
                assert!(message.contains("branches to missing"), "{message}");
            }
            other => panic!("expected a merge error, got {other:?}"),
        }
        assert_eq!(target.method(ctor).body, before);
    }

    #[test]
    fn injected_body_argument_out_of_range_fails() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let update = target.find_method(player, "Update").unwrap();

        let mut mixin = MixinBuilder::new();
        let body = mixin_method(&mut mixin, |b, _| {
            b.op(OpCode::LDARG_1).op(OpCode::POP).op(OpCode::RET);
        });
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);

        let error = merger.inject_body(&mut target, update, &body, &[]).unwrap_err();
        assert!(matches!(error, Error::Merge { .. }));
        assert!(error.to_string().ends_with("uses argument 1 of 1"), "{error}");
    }

    #[test]
    fn prologue_without_call_is_copied() {
        let mut labels = Labels::default();
        let mut builder = BodyBuilder::<Member>::with_labels(labels);
        let end = builder.label();
        builder.branch(OpCode::BR, end).op(OpCode::NOP).mark(end).op(OpCode::RET);
        let (mut instructions, next) = builder.build().unwrap();
        labels = next;

        let prologue = split_prologue(&mut instructions, &mut labels);
        assert_eq!(instructions.len(), 3);
        assert_eq!(prologue.len(), 3);
        assert!(prologue.iter().all(|p| instructions.iter().all(|i| i.label != p.label)));
        assert_eq!(prologue[0].targets(), vec![prologue[2].label]);
    }

    #[test]
    fn handlers_follow_the_replacement() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let update = target.find_method(player, "Update").unwrap();

        let mut mixin = MixinBuilder::new();
        let exception = mixin.type_ref("System.Exception", "mscorlib");
        let action = mixin.replace_update_with(|b, _| {
            let try_start = b.label();
            let handler = b.label();
            let end = b.label();
            b.mark(try_start)
                .op(OpCode::NOP)
                .branch(OpCode::LEAVE, end)
                .mark(handler)
                .op(OpCode::POP)
                .branch(OpCode::LEAVE, end)
                .mark(end)
                .op(OpCode::RET);
            vec![ExceptionHandler {
                flags: ExceptionHandlerFlags::EXCEPTION,
                try_start,
                try_end: Some(handler),
                handler_start: handler,
                handler_end: Some(end),
                catch_type: Some(exception.clone()),
                filter_start: None,
            }]
        });
        let substitutions = Substitutions::default();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);
        merger.merge(&mut target, update, &action, &[]).unwrap();

        let body = target.method(update).body.as_ref().unwrap();
        assert_eq!(body.exception_handlers.len(), 1);
        assert!(body.is_consistent());
        let catch = body.exception_handlers[0].catch_type.as_ref().unwrap();
        assert_eq!(target.describe(catch), "System.Exception");
        assert_eq!(body.locals.len(), action.body.locals.len());
    }

    #[test]
    fn injected_bodies_reject_base_dependencies() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let update = target.find_method(player, "Update").unwrap();

        let mut mixin = MixinBuilder::new();
        let original = mixin.base_update();
        let body = mixin_method(&mut mixin, |b, _| {
            b.op(OpCode::LDARG_0).member(OpCode::CALL, original.clone()).op(OpCode::RET);
        });
        let originals = vec![mixin.base_update_signature()];
        let substitutions = mixin.substitutions();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);

        assert!(matches!(
            merger.inject_body(&mut target, update, &body, &originals),
            Err(Error::Import { .. })
        ));
    }

    #[test]
    fn interfaces_are_added_once() {
        let mut target = target_module();
        let player = target.find_type("Tests.Game.Player").unwrap();
        let substitutions = Substitutions::default();
        let options = PatchOptions::default();
        let merger = Merger::new(ModuleResolver::new(&substitutions), &options);
        let disposable = TypeSig::Named(crate::signature::TypeSignature::class("System.IDisposable").unwrap());

        assert_eq!(merger.add_interfaces(&mut target, player, &[disposable.clone()]), 1);
        assert_eq!(merger.add_interfaces(&mut target, player, &[disposable]), 0);
    }
}
