//! # cilmixin Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the cilmixin library. Import this module to get quick access to everything needed to
//! load a patch module, apply it to a target and inspect the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilmixin operations
pub use crate::Error;

/// The result type used throughout cilmixin
pub use crate::Result;

/// Kinds of symbols reported as unresolved
pub use crate::SymbolKind;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The in-memory module model
pub use crate::Module;

/// Loading patch configurations from declared intents
pub use crate::mixin::{Intent, PatchLoader};

/// The patch driver and its options
pub use crate::patch::{ModuleHook, PatchOptions, PatchReport, PatchedImages, Patcher};

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Patch Configuration
// ================================================================================================

/// What a patch requires and provides
pub use crate::patch::{
    Dependency, Inject, InjectedField, InjectedMethod, MergeAction, Mixin, PatchConfiguration,
    ReplacementBody,
};

/// Signature substitution
pub use crate::patch::{SubstitutionTable, Substitutions};

// ================================================================================================
// Signatures
// ================================================================================================

/// Module-independent identifiers
pub use crate::signature::{
    FieldSignature, MethodSignature, ParameterSignature, Primitive, TypeKind, TypeSignature,
};

/// Visibility and usage requirements
pub use crate::signature::{
    AccessLevel, AccessMode, CallingConvention, FieldDescriptor, MethodDescriptor,
    TypeDescriptor,
};

// ================================================================================================
// Metadata Model
// ================================================================================================

/// Definitions and references of a module
pub use crate::metadata::module::{
    FieldDef, FieldHandle, FieldId, Member, MemberRef, MemberRefSignature, MethodDef,
    MethodHandle, MethodId, TypeDef, TypeId,
};

/// Type shapes
pub use crate::metadata::typesig::TypeSig;

/// Method bodies
pub use crate::metadata::body::{ExceptionHandler, MethodBody};

/// Attribute flags
pub use crate::metadata::flags::{
    FieldAttributes, MethodAttributes, ParamAttributes, TypeAttributes,
};

/// Custom attributes
pub use crate::metadata::attribute::CustomAttribute;

/// Metadata tokens
pub use crate::metadata::token::Token;

// ================================================================================================
// Instructions
// ================================================================================================

/// Instruction model and construction
pub use crate::assembly::{BodyBuilder, Instruction, Label, OpCode, Operand};
