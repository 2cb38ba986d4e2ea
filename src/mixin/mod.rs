//! Patch configurations from declared intents.
//!
//! A mixin module is ordinary compiled code whose types stand in for the target's: a mixin
//! type `PlayerMixin` marked `[Mixin, Name("Game.Player")]` is written as if it were
//! `Game.Player`, and its methods become the new bodies of `Game.Player`'s methods. This
//! module reads those declarations and hands the patch engine a
//! [`crate::patch::PatchConfiguration`].
//!
//! # Key Components
//!
//! - [`intent`] - The attribute vocabulary: [`Intent`] and per-member [`intent::Intents`]
//! - [`loader`] - [`PatchLoader`], turning a module's intents into a configuration
//! - [`source`] - [`SourceModule`], resolving mixin tokens to module-independent
//!   [`SourceMember`]s
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use std::{path::Path, sync::Arc};
//! use cilmixin::{mixin::PatchLoader, Module};
//!
//! let patch = Module::from_file(Path::new("Patch.cmim"))?;
//! let config = PatchLoader::new().load(Arc::new(patch))?;
//!
//! for mixin in config.mixins() {
//!     println!("{}: {} merges", mixin.dependency().signature(), mixin.actions().len());
//! }
//! # Ok::<(), cilmixin::Error>(())
//! ```

pub mod intent;
pub mod loader;
pub mod source;

pub use intent::{Intent, IntentKind, Intents};
pub use loader::PatchLoader;
pub use source::{SourceMember, SourceModule};
