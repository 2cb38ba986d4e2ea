//! Module-independent signatures and descriptors.
//!
//! The patch engine works on two type universes at once: the mixin module, compiled against its
//! own stand-in types, and the target module the patch binds into. Signatures are how members are
//! identified across both. They carry no module identity, compare structurally, and for types are
//! interned process-wide.
//!
//! # Key Components
//!
//! - [`TypeSignature`] - Interned full name plus [`TypeKind`]
//! - [`FieldSignature`], [`MethodSignature`], [`ParameterSignature`] - Structural member ids
//! - [`CallingConvention`], [`AccessLevel`], [`AccessMode`] - Flags and the visibility lattice
//! - [`descriptor`] - What a patch requires of a signature
//!
//! # Usage Examples
//!
//! ```rust
//! use cilmixin::signature::{CallingConvention, Primitive, TypeSignature};
//! use cilmixin::metadata::typesig::TypeSig;
//!
//! let player = TypeSignature::class("Game.Player")?;
//! let health = player.field("health", TypeSig::Named(TypeSignature::builtin(Primitive::I4)));
//! assert_eq!(health.to_string(), "Game.Player::health");
//!
//! let update = player.method("Update", CallingConvention::HAS_THIS, vec![]);
//! assert_eq!(update.to_string(), "Game.Player::Update()");
//! # Ok::<(), cilmixin::Error>(())
//! ```

pub mod descriptor;
mod members;
mod types;

pub use descriptor::{
    FieldDescriptor, FieldDescriptorBuilder, MethodDescriptor, MethodDescriptorBuilder,
    TypeDescriptor, TypeDescriptorBuilder,
};
pub use members::{
    AccessLevel, AccessMode, CallingConvention, FieldSignature, MethodSignature,
    ParameterSignature,
};
pub use types::{Primitive, TypeKind, TypeSignature};
