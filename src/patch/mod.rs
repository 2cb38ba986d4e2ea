//! The patch engine.
//!
//! Everything that changes a target module lives here. A [`PatchConfiguration`] states what a
//! patch needs and provides; the [`Patcher`] resolves it against the target, relaxes
//! visibility, merges replacement bodies, injects new members and finally rewrites the
//! patch's stand-in signatures into the target's.
//!
//! # Architecture
//!
//! - [`config`] - Patch configurations: dependencies, mixins, injects
//! - [`options`] - [`PatchOptions`] with presets
//! - [`substitution`] - Signature substitution tables and their module-wide application
//! - [`resolver`] - [`ModuleResolver`], binding signatures to definitions
//! - [`access`] - Visibility and parameter direction promotion
//! - [`merge`] - [`Merger`], splicing replacement bodies into target methods
//! - [`patcher`] - [`Patcher`], the ordered application pipeline
//!
//! # Universes
//!
//! A mixin module is compiled against stand-ins of the target's types. Signatures in a
//! configuration may therefore name either the stand-in (the patch universe) or the real
//! definition (the target universe). The [`Substitutions`] map the former onto the latter, and
//! every lookup substitutes before it compares.

pub mod access;
pub mod config;
pub mod merge;
pub mod options;
pub mod patcher;
pub mod resolver;
pub mod substitution;

pub use config::{
    Dependency, Inject, InjectedField, InjectedMethod, MergeAction, Mixin, MixinSet,
    PatchConfiguration, ReplacementBody,
};
pub use merge::{Merger, Scopes};
pub use options::PatchOptions;
pub use patcher::{ModuleHook, PatchReport, PatchedImages, Patcher};
pub use resolver::ModuleResolver;
pub use substitution::{CollapsedSubstitutions, SubstitutionTable, Substitutions};
