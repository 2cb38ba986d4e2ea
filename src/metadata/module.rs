//! The module model.
//!
//! A [`Module`] is an arena of definitions: types, fields and methods live in flat vectors and
//! refer to each other through typed indices ([`TypeId`], [`FieldId`], [`MethodId`]). Everything
//! the module refers to but does not define is kept in reference tables: type references,
//! type specifications, member references, user strings and standalone signatures.
//!
//! Signatures inside the model are symbolic. A field type is a [`TypeSig`] naming its leaf type
//! by full name, never by token, so renaming or substituting a type only touches the places
//! that mention it. Tokens appear only at the instruction level: method bodies hold [`Member`]
//! operands, and [`Module::token_of`] and [`Module::member_for_token`] translate between the two
//! when a body is encoded or decoded.
//!
//! # Examples
//!
//! ```rust
//! use cilmixin::{
//!     metadata::{
//!         flags::{FieldAttributes, TypeAttributes},
//!         module::{FieldDef, Module, TypeDef},
//!         typesig::TypeSig,
//!     },
//!     signature::TypeSignature,
//! };
//!
//! let mut module = Module::new("Game");
//! let player = module.add_type(TypeDef::new(
//!     TypeSignature::class("Game.Player")?,
//!     TypeAttributes::PUBLIC,
//! ));
//! let health = module.add_field(
//!     player,
//!     FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::int32()),
//! );
//!
//! assert_eq!(module.find_type("Game.Player"), Some(player));
//! assert_eq!(module.field_signature(health).to_string(), "Game.Player::health");
//! # Ok::<(), cilmixin::Error>(())
//! ```

use std::{collections::HashSet, fmt, path::Path};

use crate::{
    assembly::{TokenEncoder, TokenKind, TokenResolver},
    metadata::{
        attribute::CustomAttribute,
        body::MethodBody,
        flags::{FieldAttributes, MethodAttributes, MethodImplAttributes, ParamAttributes, TypeAttributes},
        image,
        token::{Token, TokenTable},
        typesig::TypeSig,
    },
    signature::{CallingConvention, FieldSignature, MethodSignature, TypeSignature},
    Error::Encode,
    File, Result,
};

macro_rules! arena_id {
    ($(#[$doc:meta] $name:ident),* $(,)?) => {
        $(
            #[$doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub usize);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

arena_id!(
    /// Index of a type definition
    TypeId,
    /// Index of a field definition
    FieldId,
    /// Index of a method definition
    MethodId,
    /// Index of a member reference
    MemberRefId,
    /// Index of a user string
    StringId,
    /// Index of a standalone signature
    SignatureId,
);

/// A type defined in the module.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Full name and kind
    pub signature: TypeSignature,
    /// Attribute flags, visibility included
    pub flags: TypeAttributes,
    /// Enclosing type of a nested type
    pub enclosing: Option<TypeId>,
    /// Base type
    pub base: Option<TypeSig>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeSig>,
    /// Fields, in declaration order
    pub fields: Vec<FieldId>,
    /// Methods, in declaration order
    pub methods: Vec<MethodId>,
    /// Custom attributes
    pub attributes: Vec<CustomAttribute>,
}

impl TypeDef {
    /// Creates a type without base, members or attributes.
    #[must_use]
    pub fn new(signature: TypeSignature, flags: TypeAttributes) -> Self {
        TypeDef {
            signature,
            flags,
            enclosing: None,
            base: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Returns `true` for nested types.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.enclosing.is_some()
    }
}

/// A field defined in the module.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Declaring type, set when the field is added
    pub declaring: TypeId,
    /// Name
    pub name: String,
    /// Attribute flags, access included
    pub flags: FieldAttributes,
    /// Field type
    pub field_type: TypeSig,
    /// Custom attributes
    pub attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// Creates a field, to be added with [`Module::add_field`].
    #[must_use]
    pub fn new(name: &str, flags: FieldAttributes, field_type: TypeSig) -> Self {
        FieldDef {
            declaring: TypeId(0),
            name: name.to_string(),
            flags,
            field_type,
            attributes: Vec::new(),
        }
    }
}

/// Parameter metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    /// Name
    pub name: String,
    /// Attribute flags
    pub flags: ParamAttributes,
}

/// A method parameter. `def` is only present if the module carries metadata for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter type
    pub param_type: TypeSig,
    /// Metadata record
    pub def: Option<ParamDef>,
}

impl Parameter {
    /// Flags of the parameter, empty without a metadata record.
    #[must_use]
    pub fn flags(&self) -> ParamAttributes {
        self.def
            .as_ref()
            .map_or(ParamAttributes::empty(), |def| def.flags)
    }
}

/// A method defined in the module.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Declaring type, set when the method is added
    pub declaring: TypeId,
    /// Name
    pub name: String,
    /// Attribute flags, access included
    pub flags: MethodAttributes,
    /// Implementation flags
    pub impl_flags: MethodImplAttributes,
    /// Calling convention
    pub call_conv: CallingConvention,
    /// Return type
    pub return_type: TypeSig,
    /// Parameters, `this` excluded
    pub parameters: Vec<Parameter>,
    /// Custom attributes
    pub attributes: Vec<CustomAttribute>,
    /// Decoded body, `None` for abstract and runtime-implemented methods
    pub body: Option<MethodBody<Member>>,
}

impl MethodDef {
    /// Creates a method without parameter metadata, attributes or body.
    #[must_use]
    pub fn new(
        name: &str,
        flags: MethodAttributes,
        call_conv: CallingConvention,
        return_type: TypeSig,
        parameters: Vec<TypeSig>,
    ) -> Self {
        MethodDef {
            declaring: TypeId(0),
            name: name.to_string(),
            flags,
            impl_flags: MethodImplAttributes::IL,
            call_conv,
            return_type,
            parameters: parameters
                .into_iter()
                .map(|param_type| Parameter {
                    param_type,
                    def: None,
                })
                .collect(),
            attributes: Vec::new(),
            body: None,
        }
    }

    /// The parameter types.
    #[must_use]
    pub fn parameter_types(&self) -> Vec<TypeSig> {
        self.parameters.iter().map(|p| p.param_type.clone()).collect()
    }

    /// Number of argument slots of the body, `this` included.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        let implicit_this = self.call_conv.contains(CallingConvention::HAS_THIS)
            && !self.call_conv.contains(CallingConvention::EXPLICIT_THIS);
        self.parameters.len() + usize::from(implicit_this)
    }
}

/// A reference to a type defined in another module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Full name and kind
    pub signature: TypeSignature,
    /// Name of the defining module
    pub scope: String,
}

/// Signature part of a member reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRefSignature {
    /// A field of the given type
    Field(TypeSig),
    /// A method
    Method {
        /// Calling convention
        call_conv: CallingConvention,
        /// Return type
        return_type: TypeSig,
        /// Parameter types
        parameters: Vec<TypeSig>,
    },
}

/// A reference to a field or method defined in another module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Declaring type
    pub parent: TypeSig,
    /// Member name
    pub name: String,
    /// Field type or method signature
    pub signature: MemberRefSignature,
}

impl MemberRef {
    /// Returns `true` for method references.
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(self.signature, MemberRefSignature::Method { .. })
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.parent, self.name)?;
        if let MemberRefSignature::Method { parameters, .. } = &self.signature {
            f.write_str("(")?;
            for (index, parameter) in parameters.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{parameter}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// A field operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldHandle {
    /// Defined in this module
    Def(FieldId),
    /// Defined elsewhere
    Ref(MemberRefId),
}

/// A method operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodHandle {
    /// Defined in this module
    Def(MethodId),
    /// Defined elsewhere
    Ref(MemberRefId),
}

/// A metadata operand of an instruction in this module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Member {
    /// A type, defined, referenced or specified
    Type(TypeSig),
    /// A field
    Field(FieldHandle),
    /// A method
    Method(MethodHandle),
    /// A user string
    String(StringId),
    /// A standalone signature
    Signature(SignatureId),
}

/// A module: definitions plus the references they need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Module name, used as the scope of references into this module
    pub name: String,
    /// Module-level custom attributes
    pub attributes: Vec<CustomAttribute>,
    /// Type definitions
    pub types: Vec<TypeDef>,
    /// Field definitions
    pub fields: Vec<FieldDef>,
    /// Method definitions
    pub methods: Vec<MethodDef>,
    /// Type references
    pub type_refs: Vec<TypeRef>,
    /// Type specifications
    pub type_specs: Vec<TypeSig>,
    /// Member references
    pub member_refs: Vec<MemberRef>,
    /// User strings
    pub user_strings: Vec<String>,
    /// Standalone signature blobs
    pub signatures: Vec<Vec<u8>>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            ..Module::default()
        }
    }

    /// Reads a module image from memory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for invalid images,
    /// and [`crate::Error::Decode`] for invalid method bodies.
    pub fn from_mem(data: &[u8]) -> Result<Module> {
        image::reader::read(data)
    }

    /// Reads a module image from a file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be mapped, otherwise as
    /// [`Module::from_mem`].
    pub fn from_file(path: &Path) -> Result<Module> {
        let file = File::from_file(path)?;
        Self::from_mem(file.data())
    }

    /// Serializes the module image.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encode`] if a method body cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        image::writer::write(self)
    }

    /// Serializes the module image to a file.
    ///
    /// # Errors
    ///
    /// As [`Module::to_bytes`], plus [`crate::Error::FileError`] on write failure.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let data = self.to_bytes()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Adds a type.
    pub fn add_type(&mut self, def: TypeDef) -> TypeId {
        self.types.push(def);
        TypeId(self.types.len() - 1)
    }

    /// Adds a field to `declaring`.
    ///
    /// # Panics
    ///
    /// Panics if `declaring` is not a type of this module.
    pub fn add_field(&mut self, declaring: TypeId, mut def: FieldDef) -> FieldId {
        def.declaring = declaring;
        self.fields.push(def);
        let id = FieldId(self.fields.len() - 1);
        self.types[declaring.0].fields.push(id);
        id
    }

    /// Adds a method to `declaring`.
    ///
    /// # Panics
    ///
    /// Panics if `declaring` is not a type of this module.
    pub fn add_method(&mut self, declaring: TypeId, mut def: MethodDef) -> MethodId {
        def.declaring = declaring;
        self.methods.push(def);
        let id = MethodId(self.methods.len() - 1);
        self.types[declaring.0].methods.push(id);
        id
    }

    /// All type ids.
    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId)
    }

    /// All method ids.
    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> {
        (0..self.methods.len()).map(MethodId)
    }

    /// The type definition behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this module.
    #[must_use]
    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0]
    }

    /// Mutable access to a type definition.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this module.
    pub fn type_def_mut(&mut self, id: TypeId) -> &mut TypeDef {
        &mut self.types[id.0]
    }

    /// The field definition behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this module.
    #[must_use]
    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.0]
    }

    /// Mutable access to a field definition.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this module.
    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldDef {
        &mut self.fields[id.0]
    }

    /// The method definition behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this module.
    #[must_use]
    pub fn method(&self, id: MethodId) -> &MethodDef {
        &self.methods[id.0]
    }

    /// Mutable access to a method definition.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this module.
    pub fn method_mut(&mut self, id: MethodId) -> &mut MethodDef {
        &mut self.methods[id.0]
    }

    /// Finds a type definition by full name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<TypeId> {
        self.types
            .iter()
            .position(|def| def.signature.full_name() == full_name)
            .map(TypeId)
    }

    /// Finds a method of `declaring` by name.
    #[must_use]
    pub fn find_method(&self, declaring: TypeId, name: &str) -> Option<MethodId> {
        self.type_def(declaring)
            .methods
            .iter()
            .copied()
            .find(|id| self.method(*id).name == name)
    }

    /// The signature of a field.
    #[must_use]
    pub fn field_signature(&self, id: FieldId) -> FieldSignature {
        let def = self.field(id);
        FieldSignature::new(
            self.type_def(def.declaring).signature.clone(),
            &def.name,
            def.field_type.clone(),
        )
    }

    /// The signature of a method.
    #[must_use]
    pub fn method_signature(&self, id: MethodId) -> MethodSignature {
        let def = self.method(id);
        MethodSignature::new(
            self.type_def(def.declaring).signature.clone(),
            &def.name,
            def.call_conv,
            def.parameter_types(),
        )
    }

    /// Returns a method name for `declaring` made of `base` and the first unused decimal suffix.
    #[must_use]
    pub fn unused_method_name(&self, declaring: TypeId, base: &str) -> String {
        let taken: HashSet<&str> = self
            .type_def(declaring)
            .methods
            .iter()
            .map(|id| self.method(*id).name.as_str())
            .collect();

        (0_u32..)
            .map(|suffix| format!("{base}{suffix}"))
            .find(|name| !taken.contains(name.as_str()))
            .unwrap_or_else(|| base.to_string())
    }

    /// Makes a type usable as an instruction operand of this module, adding a type reference or
    /// specification if needed.
    pub fn import_type(&mut self, sig: &TypeSig, scope: &str) -> Member {
        match sig {
            TypeSig::Named(signature) => {
                if self.find_type(signature.full_name()).is_none()
                    && !self.type_refs.iter().any(|r| r.signature == *signature)
                {
                    self.type_refs.push(TypeRef {
                        signature: signature.clone(),
                        scope: scope.to_string(),
                    });
                }
            }
            _ => {
                if !self.type_specs.contains(sig) {
                    self.type_specs.push(sig.clone());
                }
            }
        }
        Member::Type(sig.clone())
    }

    /// Adds a member reference, reusing an identical one.
    pub fn import_member_ref(&mut self, member: MemberRef, scope: &str) -> MemberRefId {
        if let Some(index) = self.member_refs.iter().position(|r| *r == member) {
            return MemberRefId(index);
        }
        self.import_type(&member.parent, scope);
        self.member_refs.push(member);
        MemberRefId(self.member_refs.len() - 1)
    }

    /// Adds a user string, reusing an identical one.
    pub fn intern_string(&mut self, value: &str) -> StringId {
        if let Some(index) = self.user_strings.iter().position(|s| s == value) {
            return StringId(index);
        }
        self.user_strings.push(value.to_string());
        StringId(self.user_strings.len() - 1)
    }

    /// Adds a standalone signature blob.
    pub fn add_signature(&mut self, blob: Vec<u8>) -> SignatureId {
        self.signatures.push(blob);
        SignatureId(self.signatures.len() - 1)
    }

    /// The token an operand is encoded as.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Encode`] if the operand has no row in this module. Types that are
    /// neither defined, referenced nor specified have to be imported first.
    pub fn token_of(&self, member: &Member) -> Result<Token> {
        let row = |index: usize, len: usize, table: TokenTable| -> Result<Token> {
            if index < len {
                Ok(Token::from_parts(table, index as u32 + 1))
            } else {
                Err(Encode(format!("{:?} row {} does not exist", table, index + 1)))
            }
        };

        match member {
            Member::Type(sig) => {
                if let TypeSig::Named(signature) = sig {
                    if let Some(id) = self.find_type(signature.full_name()) {
                        return row(id.0, self.types.len(), TokenTable::TypeDef);
                    }
                    if let Some(index) =
                        self.type_refs.iter().position(|r| r.signature == *signature)
                    {
                        return row(index, self.type_refs.len(), TokenTable::TypeRef);
                    }
                }
                match self.type_specs.iter().position(|spec| spec == sig) {
                    Some(index) => row(index, self.type_specs.len(), TokenTable::TypeSpec),
                    None => Err(Encode(format!("type {sig} has no token in {}", self.name))),
                }
            }
            Member::Field(FieldHandle::Def(id)) => row(id.0, self.fields.len(), TokenTable::Field),
            Member::Method(MethodHandle::Def(id)) => {
                row(id.0, self.methods.len(), TokenTable::MethodDef)
            }
            Member::Field(FieldHandle::Ref(id)) | Member::Method(MethodHandle::Ref(id)) => {
                row(id.0, self.member_refs.len(), TokenTable::MemberRef)
            }
            Member::String(id) => row(id.0, self.user_strings.len(), TokenTable::UserString),
            Member::Signature(id) => {
                row(id.0, self.signatures.len(), TokenTable::StandAloneSig)
            }
        }
    }

    /// The operand a token refers to, checked against the kind the opcode expects.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for unknown tables, rows out of range and tokens of
    /// the wrong kind.
    pub fn member_for_token(&self, token: Token, kind: TokenKind) -> Result<Member> {
        let table = token
            .kind()
            .ok_or_else(|| malformed_error!("Token {} refers to an unknown table", token))?;
        let index = token
            .index()
            .ok_or_else(|| malformed_error!("Token {} has a null row", token))?;
        let check = |len: usize| -> Result<usize> {
            if index < len {
                Ok(index)
            } else {
                Err(malformed_error!("Token {} is out of range", token))
            }
        };

        let member = match table {
            TokenTable::TypeDef => Member::Type(TypeSig::Named(
                self.types[check(self.types.len())?].signature.clone(),
            )),
            TokenTable::TypeRef => Member::Type(TypeSig::Named(
                self.type_refs[check(self.type_refs.len())?].signature.clone(),
            )),
            TokenTable::TypeSpec => {
                Member::Type(self.type_specs[check(self.type_specs.len())?].clone())
            }
            TokenTable::Field => Member::Field(FieldHandle::Def(FieldId(check(self.fields.len())?))),
            TokenTable::MethodDef => {
                Member::Method(MethodHandle::Def(MethodId(check(self.methods.len())?)))
            }
            TokenTable::MemberRef => {
                let index = check(self.member_refs.len())?;
                if self.member_refs[index].is_method() {
                    Member::Method(MethodHandle::Ref(MemberRefId(index)))
                } else {
                    Member::Field(FieldHandle::Ref(MemberRefId(index)))
                }
            }
            TokenTable::UserString => Member::String(StringId(check(self.user_strings.len())?)),
            TokenTable::StandAloneSig => {
                Member::Signature(SignatureId(check(self.signatures.len())?))
            }
        };

        let matches = match (kind, &member) {
            (TokenKind::Type, Member::Type(_))
            | (TokenKind::Field, Member::Field(_))
            | (TokenKind::Method, Member::Method(_))
            | (TokenKind::String, Member::String(_))
            | (TokenKind::Signature, Member::Signature(_))
            | (TokenKind::Member, Member::Type(_) | Member::Field(_) | Member::Method(_)) => true,
            _ => false,
        };
        if !matches {
            return Err(malformed_error!(
                "Token {} is not a valid {:?} operand",
                token,
                kind
            ));
        }

        Ok(member)
    }

    /// Human-readable form of an operand.
    #[must_use]
    pub fn describe(&self, member: &Member) -> String {
        match member {
            Member::Type(sig) => sig.to_string(),
            Member::Field(FieldHandle::Def(id)) => match self.fields.get(id.0) {
                Some(_) => self.field_signature(*id).to_string(),
                None => format!("<field {id}>"),
            },
            Member::Method(MethodHandle::Def(id)) => match self.methods.get(id.0) {
                Some(_) => self.method_signature(*id).to_string(),
                None => format!("<method {id}>"),
            },
            Member::Field(FieldHandle::Ref(id)) | Member::Method(MethodHandle::Ref(id)) => self
                .member_refs
                .get(id.0)
                .map_or_else(|| format!("<memberref {id}>"), ToString::to_string),
            Member::String(id) => self
                .user_strings
                .get(id.0)
                .map_or_else(|| format!("<string {id}>"), |s| format!("{s:?}")),
            Member::Signature(id) => format!("<signature {id}>"),
        }
    }
}

impl TokenResolver for Module {
    type Member = Member;

    fn resolve(&self, token: Token, kind: TokenKind) -> Result<Member> {
        self.member_for_token(token, kind)
    }
}

impl TokenEncoder<Member> for Module {
    fn token(&self, member: &Member) -> Result<Token> {
        self.token_of(member)
    }
}
