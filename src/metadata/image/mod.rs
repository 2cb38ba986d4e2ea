//! The module image format.
//!
//! A module image is a compact binary container for exactly what the patch engine needs from a
//! module: its definitions, the references they make, and method bodies in genuine ECMA-335
//! encoding. Tokens inside method bodies use the ECMA-335 table numbers with 1-based rows into
//! the module's arenas (see [`crate::metadata::token::TokenTable`]).
//!
//! # Layout
//!
//! All integers are little-endian; counts, lengths and indices are ECMA-335 compressed unsigned
//! integers.
//!
//! | Section | Contents |
//! |---------|----------|
//! | Header | `"CMIM"`, `u16` version, `u16` reserved |
//! | Module | name, attributes |
//! | Type references | name, kind, scope |
//! | Type specifications | type signature blob |
//! | Types | name, kind, `u32` flags, enclosing index + 1, base, interfaces, field ids, method ids, attributes |
//! | Fields | name, `u16` flags, type, attributes |
//! | Methods | name, `u16` flags, `u16` impl flags, `u8` calling convention, return type, parameters, attributes, body |
//! | Member references | parent, name, field type or method signature |
//! | User strings | UTF-16 |
//! | Standalone signatures | raw blobs |
//!
//! A method body is stored as its local types followed by the length-prefixed method body
//! bytes: tiny or fat header, instruction stream, exception-handling sections.
//!
//! The writer is deterministic, so reading an image and writing it back yields the same bytes.
//!
//! # Examples
//!
//! ```rust
//! use cilmixin::metadata::module::Module;
//!
//! let module = Module::new("Empty");
//! let bytes = module.to_bytes()?;
//! assert_eq!(&bytes[..4], b"CMIM");
//! assert_eq!(Module::from_mem(&bytes)?, module);
//! # Ok::<(), cilmixin::Error>(())
//! ```

pub mod blob;
pub mod reader;
pub mod writer;

/// Image signature
pub const MAGIC: &[u8; 4] = b"CMIM";
/// Image format version
pub const VERSION: u16 = 1;

#[cfg(test)]
mod tests {
    use crate::{
        metadata::{flags::ParamAttributes, module::Module},
        test::target_module,
    };

    #[test]
    fn write_read_write_is_stable() {
        let module = target_module();
        let first = module.to_bytes().unwrap();
        let reread = Module::from_mem(&first).unwrap();
        assert_eq!(reread.types, module.types);
        assert_eq!(reread.fields, module.fields);
        assert_eq!(reread.to_bytes().unwrap(), first);
    }

    #[test]
    fn parameters_and_bodies_survive() {
        let module = target_module();
        let reread = Module::from_mem(&module.to_bytes().unwrap()).unwrap();

        assert!(reread
            .methods
            .iter()
            .flat_map(|m| m.parameters.iter())
            .any(|p| p.flags().contains(ParamAttributes::OUT)));
        assert!(reread.methods.iter().any(|m| m.body.is_some()));
    }

    #[test]
    fn rejects_bad_header() {
        assert!(Module::from_mem(b"XXXX\x01\x00\x00\x00").is_err());
        assert!(Module::from_mem(b"CMIM\x02\x00\x00\x00").is_err());
        assert!(Module::from_mem(b"CMIM").is_err());
    }

    #[test]
    fn rejects_unowned_members() {
        let mut module = Module::new("Broken");
        module.fields.push(crate::metadata::module::FieldDef::new(
            "orphan",
            crate::metadata::flags::FieldAttributes::PRIVATE,
            crate::metadata::typesig::TypeSig::int32(),
        ));
        let bytes = module.to_bytes().unwrap();
        assert!(Module::from_mem(&bytes).is_err());
    }
}
