//! Module image serialization.

use crate::{
    file::io::write_le,
    metadata::{
        image::{
            blob::{
                kind_to_byte, write_attributes, write_count, write_string, write_type_sig,
                write_user_string,
            },
            MAGIC, VERSION,
        },
        module::{MemberRefSignature, Module},
    },
    Result,
};

/// Serializes `module`. Method bodies are re-encoded from their decoded form.
///
/// # Errors
///
/// Returns [`crate::Error::Encode`] if a method body cannot be encoded, and
/// [`crate::Error::Malformed`] if a count or string is too long to encode.
pub fn write(module: &Module) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(4096);

    buffer.extend_from_slice(MAGIC);
    write_le(&mut buffer, VERSION);
    write_le(&mut buffer, 0_u16);

    write_string(&mut buffer, &module.name)?;
    write_attributes(&mut buffer, &module.attributes)?;

    write_count(&mut buffer, module.type_refs.len())?;
    for type_ref in &module.type_refs {
        write_string(&mut buffer, type_ref.signature.full_name())?;
        buffer.push(kind_to_byte(type_ref.signature.kind()));
        write_string(&mut buffer, &type_ref.scope)?;
    }

    write_count(&mut buffer, module.type_specs.len())?;
    for spec in &module.type_specs {
        write_type_sig(&mut buffer, spec)?;
    }

    write_count(&mut buffer, module.types.len())?;
    for def in &module.types {
        write_string(&mut buffer, def.signature.full_name())?;
        buffer.push(kind_to_byte(def.signature.kind()));
        write_le(&mut buffer, def.flags.bits());
        write_count(&mut buffer, def.enclosing.map_or(0, |id| id.0 + 1))?;
        match &def.base {
            Some(base) => {
                buffer.push(1);
                write_type_sig(&mut buffer, base)?;
            }
            None => buffer.push(0),
        }
        write_count(&mut buffer, def.interfaces.len())?;
        for interface in &def.interfaces {
            write_type_sig(&mut buffer, interface)?;
        }
        write_count(&mut buffer, def.fields.len())?;
        for field in &def.fields {
            write_count(&mut buffer, field.0)?;
        }
        write_count(&mut buffer, def.methods.len())?;
        for method in &def.methods {
            write_count(&mut buffer, method.0)?;
        }
        write_attributes(&mut buffer, &def.attributes)?;
    }

    write_count(&mut buffer, module.fields.len())?;
    for def in &module.fields {
        write_string(&mut buffer, &def.name)?;
        write_le(&mut buffer, def.flags.bits());
        write_type_sig(&mut buffer, &def.field_type)?;
        write_attributes(&mut buffer, &def.attributes)?;
    }

    write_count(&mut buffer, module.methods.len())?;
    for def in &module.methods {
        write_string(&mut buffer, &def.name)?;
        write_le(&mut buffer, def.flags.bits());
        write_le(&mut buffer, def.impl_flags.bits());
        buffer.push(def.call_conv.bits());
        write_type_sig(&mut buffer, &def.return_type)?;

        write_count(&mut buffer, def.parameters.len())?;
        for parameter in &def.parameters {
            write_type_sig(&mut buffer, &parameter.param_type)?;
            match &parameter.def {
                Some(param) => {
                    buffer.push(1);
                    write_string(&mut buffer, &param.name)?;
                    write_le(&mut buffer, param.flags.bits());
                }
                None => buffer.push(0),
            }
        }
        write_attributes(&mut buffer, &def.attributes)?;

        match &def.body {
            Some(body) => {
                buffer.push(1);
                write_count(&mut buffer, body.locals.len())?;
                for local in &body.locals {
                    write_type_sig(&mut buffer, local)?;
                }
                let raw = body.encode(module)?;
                let bytes = raw.to_bytes_with_locals(body.locals.len())?;
                write_count(&mut buffer, bytes.len())?;
                buffer.extend_from_slice(&bytes);
            }
            None => buffer.push(0),
        }
    }

    write_count(&mut buffer, module.member_refs.len())?;
    for member in &module.member_refs {
        write_type_sig(&mut buffer, &member.parent)?;
        write_string(&mut buffer, &member.name)?;
        match &member.signature {
            MemberRefSignature::Field(field_type) => {
                buffer.push(0);
                write_type_sig(&mut buffer, field_type)?;
            }
            MemberRefSignature::Method {
                call_conv,
                return_type,
                parameters,
            } => {
                buffer.push(1);
                buffer.push(call_conv.bits());
                write_type_sig(&mut buffer, return_type)?;
                write_count(&mut buffer, parameters.len())?;
                for parameter in parameters {
                    write_type_sig(&mut buffer, parameter)?;
                }
            }
        }
    }

    write_count(&mut buffer, module.user_strings.len())?;
    for value in &module.user_strings {
        write_user_string(&mut buffer, value)?;
    }

    write_count(&mut buffer, module.signatures.len())?;
    for blob in &module.signatures {
        write_count(&mut buffer, blob.len())?;
        buffer.extend_from_slice(blob);
    }

    Ok(buffer)
}
