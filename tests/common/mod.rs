//! Modules shared by the integration tests: a small game module and annotated patch modules
//! written against it.

#![allow(dead_code)]

use cilmixin::prelude::*;

pub const GAME: &str = "Game";
pub const PATCH: &str = "GamePatch";
pub const ENTITY: &str = "Game.Entity";
pub const PLAYER: &str = "Game.Player";
pub const VAULT: &str = "Game.Vault";
pub const PLAYER_MIXIN: &str = "GamePatch.PlayerMixin";

pub fn class(name: &str) -> TypeSignature {
    TypeSignature::class(name).unwrap()
}

pub fn body<F>(mut def: MethodDef, locals: Vec<TypeSig>, build: F) -> MethodDef
where
    F: FnOnce(&mut BodyBuilder<Member>),
{
    let mut builder = BodyBuilder::new();
    build(&mut builder);
    let (instructions, labels) = builder.build().unwrap();
    def.body = Some(MethodBody {
        init_locals: !locals.is_empty(),
        locals,
        instructions,
        labels,
        ..MethodBody::default()
    });
    def
}

pub fn ctor_flags() -> MethodAttributes {
    MethodAttributes::PUBLIC
        | MethodAttributes::HIDE_BY_SIG
        | MethodAttributes::SPECIAL_NAME
        | MethodAttributes::RT_SPECIAL_NAME
}

pub fn ctor(parameters: Vec<TypeSig>) -> MethodDef {
    MethodDef::new(
        ".ctor",
        ctor_flags(),
        CallingConvention::HAS_THIS,
        TypeSig::void(),
        parameters,
    )
}

pub fn instance(name: &str, flags: MethodAttributes, return_type: TypeSig) -> MethodDef {
    MethodDef::new(name, flags, CallingConvention::HAS_THIS, return_type, vec![])
}

pub fn object_ctor(module: &mut Module) -> Member {
    let reference = MemberRef {
        parent: TypeSig::object(),
        name: ".ctor".to_string(),
        signature: MemberRefSignature::Method {
            call_conv: CallingConvention::HAS_THIS,
            return_type: TypeSig::void(),
            parameters: vec![],
        },
    };
    Member::Method(MethodHandle::Ref(module.import_member_ref(reference, "mscorlib")))
}

pub fn field_of(module: &Module, type_name: &str, name: &str) -> FieldId {
    let owner = module.find_type(type_name).unwrap();
    module
        .type_def(owner)
        .fields
        .iter()
        .copied()
        .find(|id| module.field(*id).name == name)
        .unwrap()
}

pub fn method_of(module: &Module, type_name: &str, name: &str) -> MethodId {
    let owner = module.find_type(type_name).unwrap();
    module.find_method(owner, name).unwrap()
}

/// The game:
///
/// - `Game.Entity` with a constructor `(int, int)`;
/// - `Game.Player : Entity` with a private `health`, a constructor `(int, int)` that chains to
///   `base(x, y)` and sets `health = 50`, and `Tick()` that decrements `health`;
/// - `Game.Vault`, not public, with a private read-only `code` and a private `Open()`.
pub fn game() -> Module {
    let mut module = Module::new(GAME);
    let object_ctor = object_ctor(&mut module);

    let mut entity = TypeDef::new(class(ENTITY), TypeAttributes::PUBLIC);
    entity.base = Some(TypeSig::object());
    let entity = module.add_type(entity);
    let entity_ctor = module.add_method(
        entity,
        body(ctor(vec![TypeSig::int32(), TypeSig::int32()]), vec![], |b| {
            b.op(OpCode::LDARG_0)
                .member(OpCode::CALL, object_ctor)
                .op(OpCode::RET);
        }),
    );

    let mut player = TypeDef::new(class(PLAYER), TypeAttributes::PUBLIC);
    player.base = Some(TypeSig::Named(class(ENTITY)));
    let player = module.add_type(player);
    let health = Member::Field(FieldHandle::Def(module.add_field(
        player,
        FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::int32()),
    )));
    module.add_method(
        player,
        body(ctor(vec![TypeSig::int32(), TypeSig::int32()]), vec![], |b| {
            b.op(OpCode::LDARG_0)
                .op(OpCode::LDARG_1)
                .op(OpCode::LDARG_2)
                .member(OpCode::CALL, Member::Method(MethodHandle::Def(entity_ctor)))
                .op(OpCode::LDARG_0)
                .ldc_i4(50)
                .member(OpCode::STFLD, health.clone())
                .op(OpCode::RET);
        }),
    );
    module.add_method(
        player,
        body(
            instance("Tick", MethodAttributes::PUBLIC, TypeSig::void()),
            vec![],
            |b| {
                b.op(OpCode::LDARG_0)
                    .op(OpCode::LDARG_0)
                    .member(OpCode::LDFLD, health.clone())
                    .op(OpCode::LDC_I4_1)
                    .op(OpCode::SUB)
                    .member(OpCode::STFLD, health)
                    .op(OpCode::RET);
            },
        ),
    );

    let vault = module.add_type(TypeDef::new(class(VAULT), TypeAttributes::NOT_PUBLIC));
    module.add_field(
        vault,
        FieldDef::new(
            "code",
            FieldAttributes::PRIVATE | FieldAttributes::INIT_ONLY,
            TypeSig::int32(),
        ),
    );
    module.add_method(
        vault,
        body(
            instance("Open", MethodAttributes::PRIVATE, TypeSig::primitive(Primitive::Boolean)),
            vec![],
            |b| {
                b.op(OpCode::LDC_I4_1).op(OpCode::RET);
            },
        ),
    );

    module
}

/// An empty patch module targeting the game.
pub fn patch() -> Module {
    let mut module = Module::new(PATCH);
    module
        .attributes
        .push(Intent::Patch(GAME.to_string()).to_attribute());
    module
}

/// Adds `[Mixin, Name(Game.Player)] PlayerMixin` with a `health` field to `module`.
pub fn player_mixin(module: &mut Module) -> (TypeId, Member) {
    let mut mixin = TypeDef::new(class(PLAYER_MIXIN), TypeAttributes::PUBLIC);
    mixin.attributes.push(Intent::Mixin.to_attribute());
    mixin
        .attributes
        .push(Intent::Name(PLAYER.to_string()).to_attribute());
    let mixin = module.add_type(mixin);
    let health = module.add_field(
        mixin,
        FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::int32()),
    );
    (mixin, Member::Field(FieldHandle::Def(health)))
}

/// Instructions of a body as `(opcode, operand)` pairs, without labels and offsets.
pub fn shape(body: &MethodBody<Member>) -> Vec<(OpCode, Operand<Member>)> {
    body.instructions
        .iter()
        .map(|i| (i.opcode, i.operand.clone()))
        .collect()
}
