//! Blob encodings shared by the image reader and writer.
//!
//! Type signatures use the ECMA-335 II.23.2.12 element type encoding, except that named types
//! carry their full name inline instead of a `TypeDefOrRef` coded index. Strings are compressed
//! lengths followed by UTF-8; user strings are compressed lengths (in code units) followed by
//! UTF-16LE.

use widestring::U16String;

use crate::{
    file::{
        io::{write_compressed_int, write_compressed_uint, write_le},
        parser::Parser,
    },
    metadata::{
        attribute::CustomAttribute,
        typesig::{ArrayShape, TypeSig},
    },
    signature::{Primitive, TypeKind, TypeSignature},
    Result,
};

/// Element types used by type signature blobs
#[allow(missing_docs)]
pub mod element {
    pub const PTR: u8 = 0x0F;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const VALUEARRAY: u8 = 0x17;
    pub const SZARRAY: u8 = 0x1D;
    pub const MVAR: u8 = 0x1E;
    pub const CMOD_REQD: u8 = 0x1F;
    pub const CMOD_OPT: u8 = 0x20;
    pub const PINNED: u8 = 0x45;
}

/// Nesting depth beyond which a type signature is rejected
const MAX_DEPTH: usize = 64;

/// Writes a compressed-length UTF-8 string.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the string is too long to encode.
pub fn write_string(buffer: &mut Vec<u8>, value: &str) -> Result<()> {
    write_compressed_uint(value.len() as u32, buffer)?;
    buffer.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Writes a count or index as a compressed unsigned integer.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the value exceeds `0x1FFF_FFFF`.
pub fn write_count(buffer: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| malformed_error!("Count {} too large", count))?;
    write_compressed_uint(count, buffer)
}

/// Reads a count, rejecting counts that cannot possibly fit in the remaining data.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for implausible counts.
pub fn read_count(parser: &mut Parser) -> Result<usize> {
    let count = parser.read_compressed_uint()? as usize;
    if count > parser.remaining() {
        return Err(malformed_error!(
            "Count {} exceeds the {} remaining bytes",
            count,
            parser.remaining()
        ));
    }
    Ok(count)
}

/// Writes a user string as UTF-16.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the string is too long to encode.
pub fn write_user_string(buffer: &mut Vec<u8>, value: &str) -> Result<()> {
    let wide = U16String::from_str(value);
    write_count(buffer, wide.len())?;
    for unit in wide.as_slice() {
        write_le(buffer, *unit);
    }
    Ok(())
}

/// Reads a user string.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for truncated data or invalid UTF-16.
pub fn read_user_string(parser: &mut Parser) -> Result<String> {
    let units = read_count(parser)?;
    let mut wide = Vec::with_capacity(units);
    for _ in 0..units {
        wide.push(parser.read_le::<u16>()?);
    }
    U16String::from_vec(wide)
        .to_string()
        .map_err(|_| malformed_error!("Invalid UTF-16 user string"))
}

/// The byte a type kind is stored as.
#[must_use]
pub fn kind_to_byte(kind: TypeKind) -> u8 {
    match kind {
        TypeKind::Class => 0,
        TypeKind::Value => 1,
        TypeKind::BuiltIn => 2,
    }
}

/// Reads a type kind byte.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for unknown values.
pub fn read_kind(parser: &mut Parser) -> Result<TypeKind> {
    match parser.read_le::<u8>()? {
        0 => Ok(TypeKind::Class),
        1 => Ok(TypeKind::Value),
        2 => Ok(TypeKind::BuiltIn),
        other => Err(malformed_error!("Unknown type kind - {}", other)),
    }
}

/// Writes a type signature blob.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if a count or name is too long to encode.
pub fn write_type_sig(buffer: &mut Vec<u8>, sig: &TypeSig) -> Result<()> {
    match sig {
        TypeSig::Named(signature) => match (signature.primitive(), signature.kind()) {
            (Some(primitive), _) => buffer.push(primitive.element_type()),
            (None, TypeKind::Value) => {
                buffer.push(element::VALUETYPE);
                write_string(buffer, signature.full_name())?;
            }
            (None, _) => {
                buffer.push(element::CLASS);
                write_string(buffer, signature.full_name())?;
            }
        },
        TypeSig::Var(index) => {
            buffer.push(element::VAR);
            write_compressed_uint(*index, buffer)?;
        }
        TypeSig::MVar(index) => {
            buffer.push(element::MVAR);
            write_compressed_uint(*index, buffer)?;
        }
        TypeSig::SzArray(inner) => {
            buffer.push(element::SZARRAY);
            write_type_sig(buffer, inner)?;
        }
        TypeSig::Array(inner, shape) => {
            buffer.push(element::ARRAY);
            write_type_sig(buffer, inner)?;
            write_compressed_uint(shape.rank, buffer)?;
            write_count(buffer, shape.sizes.len())?;
            for size in &shape.sizes {
                write_compressed_uint(*size, buffer)?;
            }
            write_count(buffer, shape.lower_bounds.len())?;
            for bound in &shape.lower_bounds {
                write_compressed_int(*bound, buffer)?;
            }
        }
        TypeSig::ValueArray(inner, size) => {
            buffer.push(element::VALUEARRAY);
            write_type_sig(buffer, inner)?;
            write_compressed_uint(*size, buffer)?;
        }
        TypeSig::Ptr(inner) => {
            buffer.push(element::PTR);
            write_type_sig(buffer, inner)?;
        }
        TypeSig::ByRef(inner) => {
            buffer.push(element::BYREF);
            write_type_sig(buffer, inner)?;
        }
        TypeSig::Pinned(inner) => {
            buffer.push(element::PINNED);
            write_type_sig(buffer, inner)?;
        }
        TypeSig::ModReqd(modifier, inner) | TypeSig::ModOpt(modifier, inner) => {
            buffer.push(if matches!(sig, TypeSig::ModReqd(..)) {
                element::CMOD_REQD
            } else {
                element::CMOD_OPT
            });
            write_string(buffer, modifier.full_name())?;
            write_type_sig(buffer, inner)?;
        }
        TypeSig::GenericInst(generic, arguments) => {
            buffer.push(element::GENERICINST);
            write_type_sig(buffer, generic)?;
            write_count(buffer, arguments.len())?;
            for argument in arguments {
                write_type_sig(buffer, argument)?;
            }
        }
    }
    Ok(())
}

/// Reads a type signature blob.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for unknown element types and overly deep nesting, and
/// [`crate::Error::OutOfBounds`] for truncated data.
pub fn read_type_sig(parser: &mut Parser) -> Result<TypeSig> {
    read_type_sig_at(parser, 0)
}

fn read_type_sig_at(parser: &mut Parser, depth: usize) -> Result<TypeSig> {
    if depth > MAX_DEPTH {
        return Err(malformed_error!("Type signature nested deeper than {}", MAX_DEPTH));
    }
    let inner = |parser: &mut Parser| -> Result<Box<TypeSig>> {
        Ok(Box::new(read_type_sig_at(parser, depth + 1)?))
    };

    let element_type = parser.read_le::<u8>()?;
    if let Some(primitive) = Primitive::from_element_type(element_type) {
        return Ok(TypeSig::primitive(primitive));
    }

    Ok(match element_type {
        element::CLASS => TypeSig::Named(TypeSignature::get(&parser.read_string()?, TypeKind::Class)?),
        element::VALUETYPE => {
            TypeSig::Named(TypeSignature::get(&parser.read_string()?, TypeKind::Value)?)
        }
        element::VAR => TypeSig::Var(parser.read_compressed_uint()?),
        element::MVAR => TypeSig::MVar(parser.read_compressed_uint()?),
        element::SZARRAY => TypeSig::SzArray(inner(parser)?),
        element::ARRAY => {
            let item = inner(parser)?;
            let rank = parser.read_compressed_uint()?;
            let mut sizes = Vec::new();
            for _ in 0..read_count(parser)? {
                sizes.push(parser.read_compressed_uint()?);
            }
            let mut lower_bounds = Vec::new();
            for _ in 0..read_count(parser)? {
                lower_bounds.push(parser.read_compressed_int()?);
            }
            TypeSig::Array(
                item,
                ArrayShape {
                    rank,
                    sizes,
                    lower_bounds,
                },
            )
        }
        element::VALUEARRAY => {
            let item = inner(parser)?;
            TypeSig::ValueArray(item, parser.read_compressed_uint()?)
        }
        element::PTR => TypeSig::Ptr(inner(parser)?),
        element::BYREF => TypeSig::ByRef(inner(parser)?),
        element::PINNED => TypeSig::Pinned(inner(parser)?),
        element::CMOD_REQD => {
            let modifier = TypeSignature::class(&parser.read_string()?)?;
            TypeSig::ModReqd(modifier, inner(parser)?)
        }
        element::CMOD_OPT => {
            let modifier = TypeSignature::class(&parser.read_string()?)?;
            TypeSig::ModOpt(modifier, inner(parser)?)
        }
        element::GENERICINST => {
            let generic = inner(parser)?;
            let mut arguments = Vec::new();
            for _ in 0..read_count(parser)? {
                arguments.push(read_type_sig_at(parser, depth + 1)?);
            }
            TypeSig::GenericInst(generic, arguments)
        }
        other => {
            return Err(malformed_error!("Unsupported element type - 0x{:02X}", other));
        }
    })
}

/// Writes a list of custom attributes.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if a count or string is too long to encode.
pub fn write_attributes(buffer: &mut Vec<u8>, attributes: &[CustomAttribute]) -> Result<()> {
    write_count(buffer, attributes.len())?;
    for attribute in attributes {
        write_string(buffer, &attribute.type_name)?;
        write_count(buffer, attribute.arguments.len())?;
        for argument in &attribute.arguments {
            write_string(buffer, argument)?;
        }
    }
    Ok(())
}

/// Reads a list of custom attributes.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for invalid data.
pub fn read_attributes(parser: &mut Parser) -> Result<Vec<CustomAttribute>> {
    let count = read_count(parser)?;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let type_name = parser.read_string()?;
        let mut arguments = Vec::new();
        for _ in 0..read_count(parser)? {
            arguments.push(parser.read_string()?);
        }
        attributes.push(CustomAttribute {
            type_name,
            arguments,
        });
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reencode(sig: &TypeSig) -> Vec<u8> {
        let mut buffer = Vec::new();
        write_type_sig(&mut buffer, sig).unwrap();
        buffer
    }

    #[test]
    fn primitive_is_single_byte() {
        assert_eq!(reencode(&TypeSig::int32()), vec![0x08]);
        assert_eq!(reencode(&TypeSig::object()), vec![0x1C]);
    }

    #[test]
    fn nested_shapes() {
        let list = TypeSignature::class("Tests.Blob.List`1").unwrap();
        let point = TypeSignature::value("Tests.Blob.Point").unwrap();
        let sig = TypeSig::GenericInst(
            Box::new(TypeSig::Named(list)),
            vec![TypeSig::Array(
                Box::new(TypeSig::Named(point)),
                ArrayShape {
                    rank: 2,
                    sizes: vec![4],
                    lower_bounds: vec![-1, 0],
                },
            )],
        );

        let bytes = reencode(&sig);
        assert_eq!(bytes[0], element::GENERICINST);
        let mut parser = Parser::new(&bytes);
        assert_eq!(read_type_sig(&mut parser).unwrap(), sig);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn rejects_unknown_and_deep() {
        assert!(read_type_sig(&mut Parser::new(&[0x42])).is_err());

        let deep = vec![element::SZARRAY; 100];
        assert!(matches!(
            read_type_sig(&mut Parser::new(&deep)),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn user_strings_are_utf16() {
        let mut buffer = Vec::new();
        write_user_string(&mut buffer, "Hé").unwrap();
        assert_eq!(buffer, vec![2, b'H', 0, 0xE9, 0]);
        assert_eq!(read_user_string(&mut Parser::new(&buffer)).unwrap(), "Hé");
    }

    #[test]
    fn attributes() {
        let attributes = vec![
            CustomAttribute::with_argument("Vial.Mixins.Patch", "Game"),
            CustomAttribute::new("Vial.Mixins.Mixin"),
        ];
        let mut buffer = Vec::new();
        write_attributes(&mut buffer, &attributes).unwrap();
        assert_eq!(read_attributes(&mut Parser::new(&buffer)).unwrap(), attributes);
    }
}
