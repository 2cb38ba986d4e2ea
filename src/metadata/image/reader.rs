//! Module image parsing.
//!
//! Method bodies may refer to any table, including those stored after the methods, so bodies
//! are parsed in two steps: the raw bytes are kept while the tables are read, and decoded once
//! the whole module is in place.

use crate::{
    file::parser::Parser,
    metadata::{
        body::{MethodBody, RawBody},
        flags::{FieldAttributes, MethodAttributes, MethodImplAttributes, ParamAttributes, TypeAttributes},
        image::{
            blob::{read_attributes, read_count, read_kind, read_type_sig, read_user_string},
            MAGIC, VERSION,
        },
        module::{
            FieldDef, FieldId, MemberRef, MemberRefSignature, MethodDef, MethodId, Module,
            ParamDef, Parameter, TypeDef, TypeId, TypeRef,
        },
        typesig::TypeSig,
    },
    signature::{CallingConvention, TypeSignature},
    Result,
};

struct PendingBody {
    method: usize,
    locals: Vec<TypeSig>,
    raw: RawBody,
}

/// Parses a module image.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for a bad header, inconsistent tables or invalid blobs,
/// [`crate::Error::OutOfBounds`] for truncated data, and [`crate::Error::Decode`] for invalid
/// method bodies.
pub fn read(data: &[u8]) -> Result<Module> {
    let mut parser = Parser::new(data);

    if parser.read_bytes(MAGIC.len())? != MAGIC {
        return Err(malformed_error!("Not a module image"));
    }
    let version = parser.read_le::<u16>()?;
    if version != VERSION {
        return Err(malformed_error!("Unsupported image version - {}", version));
    }
    let _reserved = parser.read_le::<u16>()?;

    let mut module = Module::new(&parser.read_string()?);
    module.attributes = read_attributes(&mut parser)?;

    for _ in 0..read_count(&mut parser)? {
        let name = parser.read_string()?;
        let kind = read_kind(&mut parser)?;
        module.type_refs.push(TypeRef {
            signature: TypeSignature::get(&name, kind)?,
            scope: parser.read_string()?,
        });
    }

    for _ in 0..read_count(&mut parser)? {
        module.type_specs.push(read_type_sig(&mut parser)?);
    }

    let type_count = read_count(&mut parser)?;
    for _ in 0..type_count {
        let name = parser.read_string()?;
        let kind = read_kind(&mut parser)?;
        let mut def = TypeDef::new(
            TypeSignature::get(&name, kind)?,
            TypeAttributes::from_bits_retain(parser.read_le::<u32>()?),
        );

        def.enclosing = match parser.read_compressed_uint()? as usize {
            0 => None,
            index if index <= type_count => Some(TypeId(index - 1)),
            index => return Err(malformed_error!("Type {} encloses unknown type {}", name, index)),
        };
        def.base = match parser.read_le::<u8>()? {
            0 => None,
            _ => Some(read_type_sig(&mut parser)?),
        };
        for _ in 0..read_count(&mut parser)? {
            def.interfaces.push(read_type_sig(&mut parser)?);
        }
        for _ in 0..read_count(&mut parser)? {
            def.fields.push(FieldId(parser.read_compressed_uint()? as usize));
        }
        for _ in 0..read_count(&mut parser)? {
            def.methods.push(MethodId(parser.read_compressed_uint()? as usize));
        }
        def.attributes = read_attributes(&mut parser)?;
        module.types.push(def);
    }

    for _ in 0..read_count(&mut parser)? {
        let name = parser.read_string()?;
        let flags = FieldAttributes::from_bits_retain(parser.read_le::<u16>()?);
        let mut def = FieldDef::new(&name, flags, read_type_sig(&mut parser)?);
        def.attributes = read_attributes(&mut parser)?;
        module.fields.push(def);
    }

    let mut pending = Vec::new();
    for index in 0..read_count(&mut parser)? {
        let name = parser.read_string()?;
        let flags = MethodAttributes::from_bits_retain(parser.read_le::<u16>()?);
        let impl_flags = MethodImplAttributes::from_bits_retain(parser.read_le::<u16>()?);
        let call_conv = CallingConvention::from_bits_retain(parser.read_le::<u8>()?);
        let return_type = read_type_sig(&mut parser)?;

        let mut def = MethodDef::new(&name, flags, call_conv, return_type, Vec::new());
        def.impl_flags = impl_flags;
        for _ in 0..read_count(&mut parser)? {
            let param_type = read_type_sig(&mut parser)?;
            let param = match parser.read_le::<u8>()? {
                0 => None,
                _ => Some(ParamDef {
                    name: parser.read_string()?,
                    flags: ParamAttributes::from_bits_retain(parser.read_le::<u16>()?),
                }),
            };
            def.parameters.push(Parameter {
                param_type,
                def: param,
            });
        }
        def.attributes = read_attributes(&mut parser)?;

        if parser.read_le::<u8>()? != 0 {
            let mut locals = Vec::new();
            for _ in 0..read_count(&mut parser)? {
                locals.push(read_type_sig(&mut parser)?);
            }
            let length = read_count(&mut parser)?;
            let raw = RawBody::parse(parser.read_bytes(length)?)?;
            pending.push(PendingBody {
                method: index,
                locals,
                raw,
            });
        }
        module.methods.push(def);
    }

    for _ in 0..read_count(&mut parser)? {
        let parent = read_type_sig(&mut parser)?;
        let name = parser.read_string()?;
        let signature = match parser.read_le::<u8>()? {
            0 => MemberRefSignature::Field(read_type_sig(&mut parser)?),
            1 => {
                let call_conv = CallingConvention::from_bits_retain(parser.read_le::<u8>()?);
                let return_type = read_type_sig(&mut parser)?;
                let mut parameters = Vec::new();
                for _ in 0..read_count(&mut parser)? {
                    parameters.push(read_type_sig(&mut parser)?);
                }
                MemberRefSignature::Method {
                    call_conv,
                    return_type,
                    parameters,
                }
            }
            other => return Err(malformed_error!("Unknown member reference kind - {}", other)),
        };
        module.member_refs.push(MemberRef {
            parent,
            name,
            signature,
        });
    }

    for _ in 0..read_count(&mut parser)? {
        module.user_strings.push(read_user_string(&mut parser)?);
    }

    for _ in 0..read_count(&mut parser)? {
        let length = read_count(&mut parser)?;
        module.signatures.push(parser.read_bytes(length)?.to_vec());
    }

    link_members(&mut module)?;

    for body in pending {
        let decoded = MethodBody::decode(&body.raw, body.locals, &module)?;
        module.methods[body.method].body = Some(decoded);
    }

    Ok(module)
}

/// Sets the declaring type of every field and method, checking each is owned exactly once.
fn link_members(module: &mut Module) -> Result<()> {
    let mut field_owner = vec![None; module.fields.len()];
    let mut method_owner = vec![None; module.methods.len()];

    for (index, def) in module.types.iter().enumerate() {
        for field in &def.fields {
            match field_owner.get_mut(field.0) {
                Some(owner @ None) => *owner = Some(TypeId(index)),
                Some(Some(_)) => return Err(malformed_error!("Field {} owned twice", field.0)),
                None => return Err(malformed_error!("Type {} lists unknown field {}", index, field.0)),
            }
        }
        for method in &def.methods {
            match method_owner.get_mut(method.0) {
                Some(owner @ None) => *owner = Some(TypeId(index)),
                Some(Some(_)) => return Err(malformed_error!("Method {} owned twice", method.0)),
                None => {
                    return Err(malformed_error!("Type {} lists unknown method {}", index, method.0))
                }
            }
        }
    }

    for (def, owner) in module.fields.iter_mut().zip(field_owner) {
        def.declaring = owner.ok_or_else(|| malformed_error!("Field {} has no owner", def.name))?;
    }
    for (def, owner) in module.methods.iter_mut().zip(method_owner) {
        def.declaring = owner.ok_or_else(|| malformed_error!("Method {} has no owner", def.name))?;
    }
    Ok(())
}
