//! Visibility promotion.
//!
//! A dependency states the minimum visibility a mixin needs. Promotion joins the current level
//! with the required one, so `Family` plus `Assembly` yields `FamilyOrAssembly` rather than
//! dropping either audience. Top-level types only know `NotPublic` and `Public`; anything above
//! `Assembly` makes them public.
//!
//! All functions return `true` if the definition was changed.

use log::debug;

use crate::{
    metadata::{
        flags::ParamAttributes,
        module::{FieldId, MethodId, Module, TypeId},
    },
    signature::{AccessLevel, AccessMode},
};

/// Raises the visibility of a type to at least `level`.
pub fn promote_type(module: &mut Module, id: TypeId, level: AccessLevel) -> bool {
    let def = module.type_def_mut(id);
    let current = def.flags.visibility();
    if current.satisfies(level) {
        return false;
    }

    let promoted = current.join(level);
    def.flags = def.flags.with_visibility(promoted, def.enclosing.is_some());
    debug!("Promoted type {} from {:?} to {:?}", def.signature, current, promoted);
    true
}

/// Raises the access of a field to at least `level`.
pub fn promote_field(module: &mut Module, id: FieldId, level: AccessLevel) -> bool {
    let def = module.field_mut(id);
    let current = def.flags.access().unwrap_or(AccessLevel::Private);
    if current.satisfies(level) {
        return false;
    }

    let promoted = current.join(level);
    def.flags = def.flags.with_access(promoted);
    debug!("Promoted field {} from {:?} to {:?}", def.name, current, promoted);
    true
}

/// Raises the access of a method to at least `level`.
pub fn promote_method(module: &mut Module, id: MethodId, level: AccessLevel) -> bool {
    let def = module.method_mut(id);
    let current = def.flags.access().unwrap_or(AccessLevel::Private);
    if current.satisfies(level) {
        return false;
    }

    let promoted = current.join(level);
    def.flags = def.flags.with_access(promoted);
    debug!("Promoted method {} from {:?} to {:?}", def.name, current, promoted);
    true
}

/// Clears `OUT` from a parameter that is read and `IN` from one that is written.
pub fn promote_parameter(module: &mut Module, id: MethodId, index: usize, mode: AccessMode) -> bool {
    let Some(def) = module
        .method_mut(id)
        .parameters
        .get_mut(index)
        .and_then(|parameter| parameter.def.as_mut())
    else {
        return false;
    };

    let before = def.flags;
    if mode.contains(AccessMode::READ) {
        def.flags.remove(ParamAttributes::OUT);
    }
    if mode.contains(AccessMode::WRITE) {
        def.flags.remove(ParamAttributes::IN);
    }
    before != def.flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            flags::{FieldAttributes, MethodAttributes, TypeAttributes},
            module::{FieldDef, MethodDef, ParamDef, TypeDef},
            typesig::TypeSig,
        },
        signature::{CallingConvention, TypeSignature},
    };

    fn fixture() -> (Module, TypeId) {
        let mut module = Module::new("Tests");
        let owner = module.add_type(TypeDef::new(
            TypeSignature::class("Tests.Access.Owner").unwrap(),
            TypeAttributes::NOT_PUBLIC,
        ));
        (module, owner)
    }

    #[test]
    fn family_and_assembly_join() {
        let (mut module, owner) = fixture();
        let field = module.add_field(
            owner,
            FieldDef::new("value", FieldAttributes::FAMILY, TypeSig::int32()),
        );

        assert!(promote_field(&mut module, field, AccessLevel::Assembly));
        assert_eq!(module.field(field).flags.access(), Some(AccessLevel::FamilyOrAssembly));
        assert!(!promote_field(&mut module, field, AccessLevel::Family));
    }

    #[test]
    fn satisfied_levels_are_untouched() {
        let (mut module, owner) = fixture();
        let flags = MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG;
        let method = module.add_method(
            owner,
            MethodDef::new("Run", flags, CallingConvention::HAS_THIS, TypeSig::void(), vec![]),
        );

        assert!(!promote_method(&mut module, method, AccessLevel::Assembly));
        assert_eq!(module.method(method).flags, flags);
    }

    #[test]
    fn top_level_types_become_public() {
        let (mut module, owner) = fixture();
        assert!(!promote_type(&mut module, owner, AccessLevel::Assembly));
        assert!(promote_type(&mut module, owner, AccessLevel::Family));
        assert_eq!(
            module.type_def(owner).flags & TypeAttributes::from_bits_retain(0x7),
            TypeAttributes::PUBLIC
        );
    }

    #[test]
    fn nested_types_use_full_encoding() {
        let (mut module, owner) = fixture();
        let mut nested = TypeDef::new(
            TypeSignature::class("Tests.Access.Owner/Inner").unwrap(),
            TypeAttributes::NESTED_PRIVATE,
        );
        nested.enclosing = Some(owner);
        let nested = module.add_type(nested);

        assert!(promote_type(&mut module, nested, AccessLevel::Family));
        assert_eq!(module.type_def(nested).flags.visibility(), AccessLevel::Family);
    }

    #[test]
    fn parameter_modes() {
        let (mut module, owner) = fixture();
        let mut def = MethodDef::new(
            "TryGet",
            MethodAttributes::PUBLIC,
            CallingConvention::HAS_THIS,
            TypeSig::void(),
            vec![TypeSig::ByRef(Box::new(TypeSig::int32()))],
        );
        def.parameters[0].def = Some(ParamDef {
            name: "value".to_string(),
            flags: ParamAttributes::OUT,
        });
        let method = module.add_method(owner, def);

        assert!(!promote_parameter(&mut module, method, 0, AccessMode::WRITE));
        assert!(promote_parameter(&mut module, method, 0, AccessMode::READ));
        assert!(module.method(method).parameters[0].flags().is_empty());
        assert!(!promote_parameter(&mut module, method, 4, AccessMode::READ));
    }
}
