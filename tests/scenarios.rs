//! End-to-end patch scenarios against a small game module.
//!
//! Each test builds an annotated patch module, loads it into a configuration and applies it to
//! a fresh copy of the game, then inspects the patched definitions.

mod common;

use std::sync::Arc;

use cilmixin::{metadata::flags::ExceptionHandlerFlags, prelude::*};
use common::*;

fn apply(patch: Module, target: &mut Module) -> Result<PatchReport> {
    let config = PatchLoader::new().load(Arc::new(patch))?;
    Patcher::default().apply(&config, target, &mut [])
}

fn calls(body: &MethodBody<Member>) -> Vec<Member> {
    body.instructions
        .iter()
        .filter(|i| i.opcode == OpCode::CALL)
        .filter_map(|i| match &i.operand {
            Operand::Member(member) => Some(member.clone()),
            _ => None,
        })
        .collect()
}

/// A private field required at assembly visibility becomes assembly-visible and stays
/// read-only.
#[test]
fn test_private_field_becomes_assembly_visible() -> Result<()> {
    let mut game = game();
    let vault = class(VAULT);

    let mut dependency = Dependency::new(TypeDescriptor::builder(vault.clone()).build());
    dependency.add_field(
        FieldDescriptor::builder(vault.field("code", TypeSig::int32()))
            .access(AccessLevel::Assembly)
            .build(),
    );
    let mut config = PatchConfiguration::new("Scenario", GAME);
    config.add_dependency(dependency);

    let report = Patcher::default().apply(&config, &mut game, &mut [])?;
    assert_eq!(report.promoted, 1);

    let code = game.field(field_of(&game, VAULT, "code"));
    assert_eq!(code.flags.access(), Some(AccessLevel::Assembly));
    assert!(code.flags.contains(FieldAttributes::INIT_ONLY));
    Ok(())
}

/// Requirements that are already met leave the definitions untouched.
#[test]
fn test_met_requirements_change_nothing() -> Result<()> {
    let mut game = game();
    let before = game.clone();
    let player = class(PLAYER);

    let mut dependency = Dependency::new(
        TypeDescriptor::builder(player.clone())
            .access(AccessLevel::Assembly)
            .build(),
    );
    dependency.add_method(
        MethodDescriptor::builder(player.method("Tick", CallingConvention::HAS_THIS, vec![]))
            .access(AccessLevel::Family)
            .return_type(TypeSig::void())
            .build()?,
    );
    let mut config = PatchConfiguration::new("Scenario", GAME);
    config.add_dependency(dependency);

    let report = Patcher::default().apply(&config, &mut game, &mut [])?;
    assert_eq!(report.promoted, 0);
    assert_eq!(game, before);
    Ok(())
}

fn ctor_patch(rewrite_base: bool) -> Module {
    let mut patch = patch();
    let (mixin, health) = player_mixin(&mut patch);
    let base = object_ctor(&mut patch);

    let mut replacement = body(ctor(vec![TypeSig::int32(), TypeSig::int32()]), vec![], |b| {
        b.op(OpCode::LDARG_0)
            .member(OpCode::CALL, base)
            .op(OpCode::LDARG_0)
            .ldc_i4(100)
            .member(OpCode::STFLD, health)
            .op(OpCode::RET);
    });
    if rewrite_base {
        replacement.attributes.push(Intent::RewriteBase.to_attribute());
    }
    patch.add_method(mixin, replacement);
    patch
}

/// A mixin constructor keeps the original `base(x, y)` call unless it rewrites the base.
#[test]
fn test_constructor_keeps_original_base_call() -> Result<()> {
    let mut game = game();
    let entity_ctor = method_of(&game, ENTITY, ".ctor");
    let health = field_of(&game, PLAYER, "health");

    let report = apply(ctor_patch(false), &mut game)?;
    assert_eq!(report.merged, 1);
    assert_eq!(report.preserved, 0);

    let ctor = game.method(method_of(&game, PLAYER, ".ctor"));
    let body = ctor.body.as_ref().unwrap();
    assert_eq!(
        calls(body),
        vec![Member::Method(MethodHandle::Def(entity_ctor))]
    );
    assert_eq!(body.instructions[0].opcode, OpCode::LDARG_0);
    assert_eq!(body.instructions[1].opcode, OpCode::LDARG_1);
    assert_eq!(body.instructions[2].opcode, OpCode::LDARG_2);
    assert!(body.instructions.iter().any(|i| {
        i.opcode == OpCode::STFLD
            && i.operand == Operand::Member(Member::Field(FieldHandle::Def(health)))
    }));
    assert!(body.instructions.iter().any(|i| {
        i.operand == Operand::Immediate(cilmixin::assembly::Immediate::Int8(100))
    }));
    Ok(())
}

#[test]
fn test_constructor_rewrites_base_call() -> Result<()> {
    let mut game = game();
    apply(ctor_patch(true), &mut game)?;

    let ctor = game.method(method_of(&game, PLAYER, ".ctor"));
    let calls = calls(ctor.body.as_ref().unwrap());
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Member::Method(MethodHandle::Ref(id)) => {
            let reference = &game.member_refs[id.0];
            assert_eq!(reference.parent, TypeSig::object());
            assert_eq!(reference.name, ".ctor");
        }
        other => panic!("unexpected base call {other:?}"),
    }
    Ok(())
}

fn base_dependency_patch() -> Module {
    let mut patch = patch();
    let (mixin, _) = player_mixin(&mut patch);

    let mut base = instance("base_Tick", MethodAttributes::PUBLIC, TypeSig::void());
    base.attributes
        .push(Intent::BaseDependency.to_attribute());
    let base = Member::Method(MethodHandle::Def(patch.add_method(mixin, base)));

    patch.add_method(
        mixin,
        body(
            instance("Tick", MethodAttributes::PUBLIC, TypeSig::void()),
            vec![],
            |b| {
                b.op(OpCode::LDARG_0)
                    .member(OpCode::CALL, base.clone())
                    .op(OpCode::LDARG_0)
                    .member(OpCode::CALL, base)
                    .op(OpCode::RET);
            },
        ),
    );
    patch
}

/// Calling the base dependency preserves the pre-merge body under a fresh name.
#[test]
fn test_base_dependency_preserves_original() -> Result<()> {
    let mut game = game();
    let tick = method_of(&game, PLAYER, "Tick");
    let original = game.method(tick).body.clone().unwrap();

    let report = apply(base_dependency_patch(), &mut game)?;
    assert_eq!(report.preserved, 1);

    let preserved = method_of(&game, PLAYER, "Tick<Base>$0");
    let copy = game.method(preserved);
    assert_eq!(shape(copy.body.as_ref().unwrap()), shape(&original));
    assert!(copy.flags.contains(MethodAttributes::SPECIAL_NAME));
    assert_eq!(copy.flags.access(), None);

    let merged = game.method(tick).body.clone().unwrap();
    assert_eq!(
        calls(&merged),
        vec![Member::Method(MethodHandle::Def(preserved)); 2]
    );

    // a second patch preserves the merged body under the next free name
    apply(base_dependency_patch(), &mut game)?;
    let second = method_of(&game, PLAYER, "Tick<Base>$1");
    assert_eq!(shape(game.method(second).body.as_ref().unwrap()), shape(&merged));
    Ok(())
}

/// The merged body takes the replacement's locals and exception handlers.
#[test]
fn test_merge_takes_replacement_locals_and_handlers() -> Result<()> {
    let mut patch = patch();
    let (mixin, health) = player_mixin(&mut patch);

    let mut builder = BodyBuilder::new();
    let try_start = builder.label();
    let handler = builder.label();
    let end = builder.label();
    builder
        .mark(try_start)
        .op(OpCode::LDARG_0)
        .member(OpCode::LDFLD, health)
        .op(OpCode::STLOC_0)
        .branch(OpCode::LEAVE, end)
        .mark(handler)
        .op(OpCode::ENDFINALLY)
        .mark(end)
        .op(OpCode::RET);
    let (instructions, labels) = builder.build()?;

    let mut tick = instance("Tick", MethodAttributes::PUBLIC, TypeSig::void());
    tick.body = Some(MethodBody {
        init_locals: true,
        locals: vec![TypeSig::int32()],
        instructions,
        exception_handlers: vec![ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start,
            try_end: Some(handler),
            handler_start: handler,
            handler_end: Some(end),
            catch_type: None,
            filter_start: None,
        }],
        labels,
        ..MethodBody::default()
    });
    patch.add_method(mixin, tick);

    let mut game = game();
    apply(patch, &mut game)?;

    let body = game
        .method(method_of(&game, PLAYER, "Tick"))
        .body
        .as_ref()
        .unwrap();
    assert_eq!(body.locals, vec![TypeSig::int32()]);
    assert_eq!(body.exception_handlers.len(), 1);
    assert!(body.is_consistent());
    Ok(())
}

/// Dependencies on the same method from two stand-in types collapse into one requirement.
#[test]
fn test_duplicate_dependencies_collapse() -> Result<()> {
    let mut patch = patch();
    for name in ["GamePatch.PlayerView", "GamePatch.PlayerControl"] {
        let mut view = TypeDef::new(class(name), TypeAttributes::PUBLIC);
        view.attributes.push(Intent::Dependency.to_attribute());
        view.attributes
            .push(Intent::Name(PLAYER.to_string()).to_attribute());
        let view = patch.add_type(view);
        patch.add_method(
            view,
            instance("Tick", MethodAttributes::PUBLIC, TypeSig::void()),
        );
    }

    let config = PatchLoader::new().load(Arc::new(patch))?;
    assert_eq!(config.dependencies().len(), 1);
    assert_eq!(config.dependencies()[0].methods().len(), 1);

    let mut dependency = config.dependencies()[0].clone();
    assert!(!dependency.add_method(config.dependencies()[0].methods()[0].clone()));

    let mut game = game();
    Patcher::default().apply(&config, &mut game, &mut [])?;
    Ok(())
}

/// A dependency on a type nobody defines fails the unit with the symbol listed.
#[test]
fn test_missing_type_fails_validation() -> Result<()> {
    let mut patch = patch();
    let mut missing = TypeDef::new(class("GamePatch.Missing"), TypeAttributes::PUBLIC);
    missing.attributes.push(Intent::Dependency.to_attribute());
    missing
        .attributes
        .push(Intent::Name("Game.Absent".to_string()).to_attribute());
    patch.add_type(missing);

    let mut game = game();
    match apply(patch, &mut game) {
        Err(Error::Validation { patch, unresolved }) => {
            assert_eq!(patch, PATCH);
            assert!(!unresolved.is_empty());
            assert!(unresolved.iter().any(|symbol| symbol.contains("Game.Absent")));
        }
        other => panic!("expected a validation failure, got {other:?}"),
    }
    Ok(())
}
