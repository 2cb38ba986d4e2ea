use strum::Display;
use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! decode_error {
    ($offset:expr, $fmt:expr) => {
        crate::Error::Decode {
            offset: $offset,
            message: $fmt.to_string(),
        }
    };

    ($offset:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Decode {
            offset: $offset,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The kind of symbol an [`Error::Unresolved`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    /// A type definition
    Type,
    /// A field definition
    Field,
    /// A method definition
    Method,
    /// A parameter of a method definition
    Parameter,
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant is fatal to the patch unit it occurs in: the driver never commits a partially
/// patched module. Variants that concern a symbol carry the symbol's display form (declaring type,
/// name and parameter shapes) so failures can be traced back to the declaring patch.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Corrupted or invalid module image
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a buffer
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Instruction Stream Errors
/// - [`Error::Decode`] - Unknown opcode, unsupported operand, branch into an instruction
/// - [`Error::Encode`] - An instruction sequence that cannot be serialized
///
/// ## Patch Errors
/// - [`Error::Unresolved`] - A declared symbol is missing from the module
/// - [`Error::Incompatible`] - A dependency's declared return type does not match
/// - [`Error::Configuration`] - The patch configuration itself is inconsistent
/// - [`Error::Import`] - A replacement body references something that cannot be imported
/// - [`Error::Validation`] - Dependencies or mixins remained unresolved after patching
///
/// # Examples
///
/// ```rust,no_run
/// use cilmixin::{Error, Module};
/// use std::path::Path;
///
/// match Module::from_file(Path::new("Game.cmim")) {
///     Ok(module) => println!("loaded {}", module.name),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed image: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The module image is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A declared symbol could not be found in the module it was resolved against.
    #[error("missing {kind} {signature}")]
    Unresolved {
        /// What kind of symbol was looked up
        kind: SymbolKind,
        /// Display form of the signature
        signature: String,
    },

    /// A dependency declared a return type that the resolved method does not have.
    #[error("incompatible signature {signature}: declared {expected}, found {actual}")]
    Incompatible {
        /// Display form of the method signature
        signature: String,
        /// The return type the dependency declared
        expected: String,
        /// The return type of the resolved definition
        actual: String,
    },

    /// The patch configuration is inconsistent.
    ///
    /// Raised for duplicate or cyclic substitutions, mixins targeting a method that is not a
    /// declared dependency, conflicting intents, kind mismatches in the signature intern table
    /// and injected members colliding with existing ones.
    #[error("configuration error - {0}")]
    Configuration(String),

    /// An instruction stream could not be decoded.
    ///
    /// Decoding stops at the first error, the stream cannot be safely continued.
    #[error("decode error at IL_{offset:04x}: {message}")]
    Decode {
        /// Byte offset within the instruction stream
        offset: u32,
        /// What went wrong
        message: String,
    },

    /// An instruction sequence could not be serialized.
    #[error("encode error - {0}")]
    Encode(String),

    /// A replacement body references a member that cannot be brought into the target module.
    #[error("cannot import {signature}: {message}")]
    Import {
        /// Display form of the offending member
        signature: String,
        /// Why the import failed
        message: String,
    },

    /// A merged or injected body does not form a valid method body.
    #[error("cannot merge into {method}: {message}")]
    Merge {
        /// The target method
        method: String,
        /// What is wrong with the result
        message: String,
    },

    /// One or more declared dependencies or mixins remained unresolved.
    #[error("patch {patch} left {} symbol(s) unresolved: {}", .unresolved.len(), .unresolved.join(", "))]
    Validation {
        /// Name of the patch unit
        patch: String,
        /// Display forms of every unresolved symbol
        unresolved: Vec<String>,
    },
}
