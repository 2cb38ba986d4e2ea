//! Symbolic view of a mixin module's tokens.
//!
//! Instructions of a replacement body are decoded against the mixin module, but they end up in
//! the target module. Handles of the mixin module mean nothing there, so [`SourceModule`]
//! resolves every token to a [`SourceMember`]: a module-independent signature plus the scope
//! (module name) it is defined in. The merge engine then binds each of them in the target.

use std::{fmt, sync::Arc};

use crate::{
    assembly::{TokenKind, TokenResolver},
    metadata::{
        module::{FieldHandle, Member, MemberRefSignature, MethodHandle, Module},
        token::Token,
        typesig::TypeSig,
    },
    signature::{FieldSignature, MethodSignature},
    Result,
};

/// A metadata operand of a mixin body, independent of the mixin module.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceMember {
    /// A type and the scope it is defined in
    Type(TypeSig, String),
    /// A field and the scope it is defined in
    Field(FieldSignature, String),
    /// A method, its return type and the scope it is defined in
    Method(MethodSignature, TypeSig, String),
    /// A string literal
    String(String),
    /// A standalone signature blob
    Blob(Vec<u8>),
    /// A member that has no module-independent identity, such as a member of a generic
    /// instantiation
    Ambiguous(String),
}

impl fmt::Display for SourceMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMember::Type(sig, _) => write!(f, "{sig}"),
            SourceMember::Field(signature, _) => write!(f, "{signature}"),
            SourceMember::Method(signature, _, _) => write!(f, "{signature}"),
            SourceMember::String(value) => write!(f, "{value:?}"),
            SourceMember::Blob(blob) => write!(f, "<signature blob of {} bytes>", blob.len()),
            SourceMember::Ambiguous(description) => f.write_str(description),
        }
    }
}

/// A mixin module as a source of replacement bodies.
#[derive(Debug, Clone)]
pub struct SourceModule {
    module: Arc<Module>,
}

impl SourceModule {
    /// Wraps a mixin module.
    #[must_use]
    pub fn new(module: Arc<Module>) -> Self {
        SourceModule { module }
    }

    /// The wrapped module.
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// The module name, the scope of everything it defines.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.module.name
    }

    /// Scope of a type: the referenced module for type references, this module otherwise.
    fn scope_of(&self, sig: &TypeSig) -> String {
        if let Some(leaf) = sig.leaf() {
            if self.module.find_type(leaf.full_name()).is_none() {
                if let Some(reference) = self.module.type_refs.iter().find(|r| r.signature == *leaf)
                {
                    return reference.scope.clone();
                }
            }
        }
        self.module.name.clone()
    }

    /// Converts a handle of the wrapped module into its symbolic form.
    ///
    /// # Panics
    ///
    /// Panics if `member` is not a valid handle of the wrapped module.
    #[must_use]
    pub fn to_source(&self, member: &Member) -> SourceMember {
        let module = &*self.module;
        match member {
            Member::Type(sig) => SourceMember::Type(sig.clone(), self.scope_of(sig)),
            Member::Field(FieldHandle::Def(id)) => {
                SourceMember::Field(module.field_signature(*id), module.name.clone())
            }
            Member::Method(MethodHandle::Def(id)) => SourceMember::Method(
                module.method_signature(*id),
                module.method(*id).return_type.clone(),
                module.name.clone(),
            ),
            Member::Field(FieldHandle::Ref(id)) | Member::Method(MethodHandle::Ref(id)) => {
                let reference = &module.member_refs[id.0];
                let TypeSig::Named(parent) = &reference.parent else {
                    return SourceMember::Ambiguous(reference.to_string());
                };
                let scope = self.scope_of(&reference.parent);
                match &reference.signature {
                    MemberRefSignature::Field(field_type) => SourceMember::Field(
                        FieldSignature::new(parent.clone(), &reference.name, field_type.clone()),
                        scope,
                    ),
                    MemberRefSignature::Method {
                        call_conv,
                        return_type,
                        parameters,
                    } => SourceMember::Method(
                        MethodSignature::new(
                            parent.clone(),
                            &reference.name,
                            *call_conv,
                            parameters.clone(),
                        ),
                        return_type.clone(),
                        scope,
                    ),
                }
            }
            Member::String(id) => SourceMember::String(module.user_strings[id.0].clone()),
            Member::Signature(id) => SourceMember::Blob(module.signatures[id.0].clone()),
        }
    }
}

impl TokenResolver for SourceModule {
    type Member = SourceMember;

    fn resolve(&self, token: Token, kind: TokenKind) -> Result<SourceMember> {
        let member = self.module.member_for_token(token, kind)?;
        Ok(self.to_source(&member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            flags::{FieldAttributes, TypeAttributes},
            module::{FieldDef, MemberRef, TypeDef, TypeRef},
            token::TokenTable,
        },
        signature::{CallingConvention, TypeSignature},
    };

    fn source() -> SourceModule {
        let mut module = Module::new("Patch");
        let mixin = module.add_type(TypeDef::new(
            TypeSignature::class("Tests.Source.Mixin").unwrap(),
            TypeAttributes::PUBLIC,
        ));
        module.add_field(
            mixin,
            FieldDef::new("hp", FieldAttributes::PRIVATE, TypeSig::int32()),
        );
        let console = TypeSignature::class("Tests.Source.Console").unwrap();
        module.type_refs.push(TypeRef {
            signature: console.clone(),
            scope: "mscorlib".to_string(),
        });
        module.member_refs.push(MemberRef {
            parent: TypeSig::Named(console),
            name: "WriteLine".to_string(),
            signature: MemberRefSignature::Method {
                call_conv: CallingConvention::DEFAULT,
                return_type: TypeSig::void(),
                parameters: vec![TypeSig::string()],
            },
        });
        module.intern_string("hello");
        SourceModule::new(Arc::new(module))
    }

    #[test]
    fn definitions_are_scoped_to_the_module() {
        let source = source();
        let field = source
            .resolve(Token::from_parts(TokenTable::Field, 1), TokenKind::Field)
            .unwrap();
        match field {
            SourceMember::Field(signature, scope) => {
                assert_eq!(signature.to_string(), "Tests.Source.Mixin::hp");
                assert_eq!(scope, "Patch");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn references_keep_their_scope() {
        let source = source();
        let method = source
            .resolve(Token::from_parts(TokenTable::MemberRef, 1), TokenKind::Method)
            .unwrap();
        match method {
            SourceMember::Method(signature, return_type, scope) => {
                assert_eq!(signature.to_string(), "Tests.Source.Console::WriteLine(System.String)");
                assert!(return_type.is_void());
                assert_eq!(scope, "mscorlib");
            }
            other => panic!("unexpected {other:?}"),
        }

        let text = source
            .resolve(Token::from_parts(TokenTable::UserString, 1), TokenKind::String)
            .unwrap();
        assert_eq!(text, SourceMember::String("hello".to_string()));
    }

    #[test]
    fn generic_parents_are_ambiguous() {
        let mut module = Module::new("Patch");
        module.member_refs.push(MemberRef {
            parent: TypeSig::SzArray(Box::new(TypeSig::int32())),
            name: "Get".to_string(),
            signature: MemberRefSignature::Method {
                call_conv: CallingConvention::HAS_THIS,
                return_type: TypeSig::int32(),
                parameters: vec![TypeSig::int32()],
            },
        });
        let source = SourceModule::new(Arc::new(module));
        let member = source
            .resolve(Token::from_parts(TokenTable::MemberRef, 1), TokenKind::Method)
            .unwrap();
        assert!(matches!(member, SourceMember::Ambiguous(_)));
    }
}
