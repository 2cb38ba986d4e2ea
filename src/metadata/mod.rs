//! Metadata model of managed-code modules.
//!
//! This module contains everything needed to represent a module the patch engine operates on:
//! the definition arena, attribute flags, tokens, symbolic type shapes, method bodies and the
//! binary image format modules are read from and written to.
//!
//! # Key Components
//!
//! - [`module`] - [`module::Module`], the arena of type, field and method definitions plus the
//!   reference tables they need
//! - [`typesig`] - [`typesig::TypeSig`], wrapped type shapes with named leaves
//! - [`body`] - Method bodies in raw (ECMA-335 II.25.4) and decoded form
//! - [`flags`] - Attribute flags and the translation of access bits to access levels
//! - [`token`] - Metadata tokens as used by instruction operands
//! - [`attribute`] - Custom attributes, as read by the intent loader
//! - [`image`] - The module image container format
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilmixin::metadata::module::Module;
//!
//! let module = Module::from_file("target.cmim".as_ref())?;
//! for def in &module.types {
//!     println!("{} ({} fields, {} methods)", def.signature, def.fields.len(), def.methods.len());
//! }
//! # Ok::<(), cilmixin::Error>(())
//! ```

/// Custom attributes
pub mod attribute;
/// Method bodies and exception handlers
pub mod body;
/// Attribute flags
pub mod flags;
/// The module image format
pub mod image;
/// The module arena
pub mod module;
/// Metadata tokens
pub mod token;
/// Wrapped type shapes
pub mod typesig;
