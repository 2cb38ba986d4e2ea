//! Shared fixtures for unit tests: a small target module and a builder for mixin modules whose
//! types stand in for it.

use std::sync::Arc;

use crate::{
    assembly::{BodyBuilder, OpCode},
    metadata::{
        body::{ExceptionHandler, MethodBody},
        flags::{FieldAttributes, MethodAttributes, ParamAttributes, TypeAttributes},
        module::{
            FieldDef, FieldHandle, FieldId, Member, MemberRef, MemberRefSignature, MethodDef,
            MethodHandle, MethodId, Module, ParamDef, TypeDef, TypeId,
        },
        typesig::TypeSig,
    },
    mixin::{intent::Intent, source::SourceModule},
    patch::{
        config::{MergeAction, ReplacementBody},
        substitution::Substitutions,
    },
    signature::{CallingConvention, MethodSignature, Primitive, TypeSignature},
};

pub const TARGET: &str = "Game";
pub const PATCH: &str = "Patch";
pub const ENTITY: &str = "Tests.Game.Entity";
pub const PLAYER: &str = "Tests.Game.Player";
pub const HIDDEN: &str = "Tests.Game.Hidden";
pub const PLAYER_MIXIN: &str = "Tests.Patch.PlayerMixin";

pub fn class(name: &str) -> TypeSignature {
    TypeSignature::class(name).unwrap()
}

fn object_ctor_ref() -> MemberRef {
    MemberRef {
        parent: TypeSig::object(),
        name: ".ctor".to_string(),
        signature: MemberRefSignature::Method {
            call_conv: CallingConvention::HAS_THIS,
            return_type: TypeSig::void(),
            parameters: vec![],
        },
    }
}

fn with_body<F>(mut def: MethodDef, locals: Vec<TypeSig>, build: F) -> MethodDef
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

/// The target module:
///
/// - `Tests.Game.Entity` with a private `id` and a constructor taking two ints;
/// - `Tests.Game.Player : Entity` with a private `health`, a constructor chaining to the base,
///   `Update()` and `TryGet(out int)`;
/// - `Tests.Game.Hidden`, not public, with a private read-only `secret` and a private
///   `Reveal()`.
pub fn target_module() -> Module {
    let mut module = Module::new(TARGET);
    let object_ctor = Member::Method(MethodHandle::Ref(
        module.import_member_ref(object_ctor_ref(), "mscorlib"),
    ));
    let ctor_flags = MethodAttributes::PUBLIC
        | MethodAttributes::HIDE_BY_SIG
        | MethodAttributes::SPECIAL_NAME
        | MethodAttributes::RT_SPECIAL_NAME;

    let mut entity = TypeDef::new(class(ENTITY), TypeAttributes::PUBLIC);
    entity.base = Some(TypeSig::object());
    let entity = module.add_type(entity);
    module.add_field(entity, FieldDef::new("id", FieldAttributes::PRIVATE, TypeSig::int32()));
    let entity_ctor = module.add_method(
        entity,
        with_body(
            MethodDef::new(
                ".ctor",
                ctor_flags,
                CallingConvention::HAS_THIS,
                TypeSig::void(),
                vec![TypeSig::int32(), TypeSig::int32()],
            ),
            vec![],
            |b| {
                b.op(OpCode::LDARG_0).member(OpCode::CALL, object_ctor).op(OpCode::RET);
            },
        ),
    );

    let mut player = TypeDef::new(class(PLAYER), TypeAttributes::PUBLIC);
    player.base = Some(TypeSig::Named(class(ENTITY)));
    let player = module.add_type(player);
    let health = Member::Field(FieldHandle::Def(module.add_field(
        player,
        FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::int32()),
    )));
    let base_ctor = Member::Method(MethodHandle::Def(entity_ctor));
    module.add_method(
        player,
        with_body(
            MethodDef::new(
                ".ctor",
                ctor_flags,
                CallingConvention::HAS_THIS,
                TypeSig::void(),
                vec![TypeSig::int32(), TypeSig::int32()],
            ),
            vec![],
            |b| {
                b.op(OpCode::LDARG_0)
                    .op(OpCode::LDARG_1)
                    .op(OpCode::LDARG_2)
                    .member(OpCode::CALL, base_ctor)
                    .op(OpCode::LDARG_0)
                    .ldc_i4(50)
                    .member(OpCode::STFLD, health.clone())
                    .op(OpCode::RET);
            },
        ),
    );
    module.add_method(
        player,
        with_body(
            MethodDef::new(
                "Update",
                MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
                CallingConvention::HAS_THIS,
                TypeSig::void(),
                vec![],
            ),
            vec![],
            |b| {
                b.op(OpCode::LDARG_0)
                    .op(OpCode::LDARG_0)
                    .member(OpCode::LDFLD, health.clone())
                    .op(OpCode::LDC_I4_1)
                    .op(OpCode::SUB)
                    .member(OpCode::STFLD, health.clone())
                    .op(OpCode::RET);
            },
        ),
    );
    let mut try_get = with_body(
        MethodDef::new(
            "TryGet",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            CallingConvention::HAS_THIS,
            TypeSig::primitive(Primitive::Boolean),
            vec![TypeSig::ByRef(Box::new(TypeSig::int32()))],
        ),
        vec![],
        |b| {
            b.op(OpCode::LDARG_1)
                .op(OpCode::LDC_I4_0)
                .op(OpCode::STIND_I4)
                .op(OpCode::LDC_I4_0)
                .op(OpCode::RET);
        },
    );
    try_get.parameters[0].def = Some(ParamDef {
        name: "value".to_string(),
        flags: ParamAttributes::OUT,
    });
    module.add_method(player, try_get);

    let hidden = module.add_type(TypeDef::new(class(HIDDEN), TypeAttributes::NOT_PUBLIC));
    module.add_field(
        hidden,
        FieldDef::new(
            "secret",
            FieldAttributes::PRIVATE | FieldAttributes::INIT_ONLY,
            TypeSig::string(),
        ),
    );
    let text = Member::String(module.intern_string("hidden"));
    module.add_method(
        hidden,
        with_body(
            MethodDef::new(
                "Reveal",
                MethodAttributes::PRIVATE | MethodAttributes::HIDE_BY_SIG,
                CallingConvention::HAS_THIS,
                TypeSig::string(),
                vec![],
            ),
            vec![],
            |b| {
                b.member(OpCode::LDSTR, text).op(OpCode::RET);
            },
        ),
    );

    module
}

/// Builds a mixin module whose `Tests.Patch.PlayerMixin` stands in for `Tests.Game.Player`.
pub struct MixinBuilder {
    pub module: Module,
    pub mixin: TypeId,
    health: FieldId,
    base_update: Option<MethodId>,
    helpers: usize,
}

impl MixinBuilder {
    pub fn new() -> Self {
        let mut module = Module::new(PATCH);
        let mixin = module.add_type(TypeDef::new(class(PLAYER_MIXIN), TypeAttributes::PUBLIC));
        let health = module.add_field(
            mixin,
            FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::int32()),
        );
        MixinBuilder {
            module,
            mixin,
            health,
            base_update: None,
            helpers: 0,
        }
    }

    /// `PlayerMixin` renamed to `Player`.
    pub fn substitutions(&self) -> Substitutions {
        let mut substitutions = Substitutions::default();
        substitutions
            .types
            .add(class(PLAYER_MIXIN), class(PLAYER))
            .unwrap();
        substitutions
    }

    pub fn health(&self) -> Member {
        Member::Field(FieldHandle::Def(self.health))
    }

    pub fn string(&mut self, value: &str) -> Member {
        Member::String(self.module.intern_string(value))
    }

    pub fn type_ref(&mut self, name: &str, scope: &str) -> Member {
        self.module.import_type(&TypeSig::Named(class(name)), scope)
    }

    pub fn console_write_line(&mut self) -> Member {
        let reference = MemberRef {
            parent: TypeSig::Named(class("System.Console")),
            name: "WriteLine".to_string(),
            signature: MemberRefSignature::Method {
                call_conv: CallingConvention::DEFAULT,
                return_type: TypeSig::void(),
                parameters: vec![TypeSig::string()],
            },
        };
        Member::Method(MethodHandle::Ref(
            self.module.import_member_ref(reference, "mscorlib"),
        ))
    }

    pub fn object_ctor(&mut self) -> Member {
        Member::Method(MethodHandle::Ref(
            self.module.import_member_ref(object_ctor_ref(), "mscorlib"),
        ))
    }

    /// The base-dependency stand-in for `Player::Update`.
    pub fn base_update(&mut self) -> Member {
        let id = match self.base_update {
            Some(id) => id,
            None => {
                let id = self.module.add_method(
                    self.mixin,
                    MethodDef::new(
                        "base_Update",
                        MethodAttributes::PUBLIC,
                        CallingConvention::HAS_THIS,
                        TypeSig::void(),
                        vec![],
                    ),
                );
                self.base_update = Some(id);
                id
            }
        };
        Member::Method(MethodHandle::Def(id))
    }

    pub fn base_update_signature(&mut self) -> MethodSignature {
        self.base_update();
        self.module.method_signature(self.base_update.unwrap_or(MethodId(0)))
    }

    /// Adds a method with a body to the mixin type and takes its body.
    pub fn body<F>(&mut self, name: &str, signature: MethodDef, locals: Vec<TypeSig>, build: F) -> ReplacementBody
    where
        F: FnOnce(&mut BodyBuilder<Member>, &mut MixinBuilder) -> Vec<ExceptionHandler<Member>>,
    {
        let mut builder = BodyBuilder::new();
        let handlers = build(&mut builder, self);
        let (instructions, labels) = builder.build().unwrap();

        let mut def = signature;
        def.name = name.to_string();
        def.body = Some(MethodBody {
            init_locals: !locals.is_empty(),
            locals,
            instructions,
            exception_handlers: handlers,
            labels,
            ..MethodBody::default()
        });
        let id = self.module.add_method(self.mixin, def);
        let source = SourceModule::new(Arc::new(self.module.clone()));
        ReplacementBody::from_method(&source, id).unwrap()
    }

    fn update_def() -> MethodDef {
        MethodDef::new(
            "Update",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            CallingConvention::HAS_THIS,
            TypeSig::void(),
            vec![],
        )
    }

    pub fn update_signature() -> MethodSignature {
        class(PLAYER).method("Update", CallingConvention::HAS_THIS, vec![])
    }

    pub fn ctor_signature() -> MethodSignature {
        class(PLAYER).method(
            ".ctor",
            CallingConvention::HAS_THIS,
            vec![TypeSig::int32(), TypeSig::int32()],
        )
    }

    /// A replacement for `Player::Update`.
    pub fn replace_update<F>(&mut self, build: F) -> MergeAction
    where
        F: FnOnce(&mut BodyBuilder<Member>, &mut MixinBuilder),
    {
        let body = self.body("Update", Self::update_def(), vec![], |b, m| {
            build(b, m);
            vec![]
        });
        MergeAction {
            method: Self::update_signature(),
            rewrite_base: false,
            body,
        }
    }

    /// A replacement for `Player::Update` with exception handlers and one local.
    pub fn replace_update_with<F>(&mut self, build: F) -> MergeAction
    where
        F: FnOnce(&mut BodyBuilder<Member>, &mut MixinBuilder) -> Vec<ExceptionHandler<Member>>,
    {
        let body = self.body("Update", Self::update_def(), vec![TypeSig::int32()], build);
        MergeAction {
            method: Self::update_signature(),
            rewrite_base: false,
            body,
        }
    }

    /// A replacement for `Player::.ctor(int, int)`.
    pub fn replace_ctor<F>(&mut self, rewrite_base: bool, build: F) -> MergeAction
    where
        F: FnOnce(&mut BodyBuilder<Member>, &mut MixinBuilder),
    {
        let def = MethodDef::new(
            ".ctor",
            MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME,
            CallingConvention::HAS_THIS,
            TypeSig::void(),
            vec![TypeSig::int32(), TypeSig::int32()],
        );
        let body = self.body(".ctor", def, vec![], |b, m| {
            build(b, m);
            vec![]
        });
        MergeAction {
            method: Self::ctor_signature(),
            rewrite_base,
            body,
        }
    }
}

/// A body for an arbitrary helper method of the mixin type.
pub fn mixin_method<F>(mixin: &mut MixinBuilder, build: F) -> ReplacementBody
where
    F: FnOnce(&mut BodyBuilder<Member>, &mut MixinBuilder),
{
    mixin.helpers += 1;
    let name = format!("Helper{}", mixin.helpers);
    let def = MethodDef::new(
        &name,
        MethodAttributes::PRIVATE,
        CallingConvention::HAS_THIS,
        TypeSig::void(),
        vec![],
    );
    mixin.body(&name, def, vec![], |b, m| {
        build(b, m);
        vec![]
    })
}

pub const HIDDEN_ACCESS: &str = "Tests.Patch.HiddenAccess";
pub const TRACKER: &str = "Tests.Patch.Tracker";

/// A mixin module for [`target_module`] that declares its intents through attributes:
///
/// - `[Patch("Game")]` on the module;
/// - `[Mixin, Name(Player)] PlayerMixin` with `health`, an `Update()` that calls
///   `[BaseDependency] base_Update()`, zeroes `health` and bumps the tracker, a
///   `[Dependency] TryGet(out int)` and a `[Transparent] Log()`;
/// - `[Dependency, Name(Hidden)] HiddenAccess`, asking for a public `Hidden` with a public,
///   writable `secret` and a public `Reveal()`;
/// - `[Inject] Tracker` with a static `count` and a static `Bump()`.
pub fn annotated_patch() -> Module {
    let mut module = Module::new(PATCH);
    module.attributes.push(Intent::Patch(TARGET.to_string()).to_attribute());

    let mut tracker = TypeDef::new(class(TRACKER), TypeAttributes::PUBLIC);
    tracker.base = Some(TypeSig::object());
    tracker.attributes.push(Intent::Inject.to_attribute());
    let tracker = module.add_type(tracker);
    let count = Member::Field(FieldHandle::Def(module.add_field(
        tracker,
        FieldDef::new(
            "count",
            FieldAttributes::PUBLIC | FieldAttributes::STATIC,
            TypeSig::int32(),
        ),
    )));
    let bump = module.add_method(
        tracker,
        with_body(
            MethodDef::new(
                "Bump",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                CallingConvention::DEFAULT,
                TypeSig::void(),
                vec![],
            ),
            vec![],
            |b| {
                b.member(OpCode::LDSFLD, count.clone())
                    .op(OpCode::LDC_I4_1)
                    .op(OpCode::ADD)
                    .member(OpCode::STSFLD, count)
                    .op(OpCode::RET);
            },
        ),
    );

    let mut mixin = TypeDef::new(class(PLAYER_MIXIN), TypeAttributes::PUBLIC);
    mixin.attributes.push(Intent::Mixin.to_attribute());
    mixin.attributes.push(Intent::Name(PLAYER.to_string()).to_attribute());
    let mixin = module.add_type(mixin);
    let health = Member::Field(FieldHandle::Def(module.add_field(
        mixin,
        FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::int32()),
    )));

    let mut base_update = MethodDef::new(
        "base_Update",
        MethodAttributes::PUBLIC,
        CallingConvention::HAS_THIS,
        TypeSig::void(),
        vec![],
    );
    base_update.attributes.push(Intent::BaseDependency.to_attribute());
    let base_update = Member::Method(MethodHandle::Def(module.add_method(mixin, base_update)));

    module.add_method(
        mixin,
        with_body(
            MethodDef::new(
                "Update",
                MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
                CallingConvention::HAS_THIS,
                TypeSig::void(),
                vec![],
            ),
            vec![],
            |b| {
                b.op(OpCode::LDARG_0)
                    .member(OpCode::CALL, base_update)
                    .op(OpCode::LDARG_0)
                    .op(OpCode::LDC_I4_0)
                    .member(OpCode::STFLD, health)
                    .member(OpCode::CALL, Member::Method(MethodHandle::Def(bump)))
                    .op(OpCode::RET);
            },
        ),
    );

    let mut try_get = MethodDef::new(
        "TryGet",
        MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
        CallingConvention::HAS_THIS,
        TypeSig::primitive(Primitive::Boolean),
        vec![TypeSig::ByRef(Box::new(TypeSig::int32()))],
    );
    try_get.parameters[0].def = Some(ParamDef {
        name: "value".to_string(),
        flags: ParamAttributes::OUT,
    });
    try_get.attributes.push(Intent::Dependency.to_attribute());
    module.add_method(mixin, try_get);

    let mut log = with_body(
        MethodDef::new(
            "Log",
            MethodAttributes::PRIVATE,
            CallingConvention::HAS_THIS,
            TypeSig::void(),
            vec![],
        ),
        vec![],
        |b| {
            b.op(OpCode::RET);
        },
    );
    log.attributes.push(Intent::Transparent.to_attribute());
    module.add_method(mixin, log);

    let mut access = TypeDef::new(class(HIDDEN_ACCESS), TypeAttributes::PUBLIC);
    access.attributes.push(Intent::Dependency.to_attribute());
    access.attributes.push(Intent::Name(HIDDEN.to_string()).to_attribute());
    let access = module.add_type(access);
    module.add_field(
        access,
        FieldDef::new("secret", FieldAttributes::PUBLIC, TypeSig::string()),
    );
    module.add_method(
        access,
        MethodDef::new(
            "Reveal",
            MethodAttributes::PUBLIC,
            CallingConvention::HAS_THIS,
            TypeSig::string(),
            vec![],
        ),
    );

    module
}
