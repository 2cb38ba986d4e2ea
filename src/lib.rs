// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/mod.rs' uses mmap to map a module image into memory

//! # cilmixin
//!
//! A binary-level mixin patch engine for compiled CIL (Common Intermediate Language) modules.
//! Given a target module and a patch module that declares *mixins*, `cilmixin` rewrites the
//! target in place: it promotes the visibility of members the patch depends on, splices
//! replacement method bodies into existing methods, injects new members, and substitutes
//! type/field/method references so that code written against the patch's own types binds to
//! the target's types.
//!
//! ## Features
//!
//! - **Symbolic signatures** - Module-independent, structurally compared identifiers for types,
//!   fields, methods and parameters, backed by a process-wide intern table
//! - **Complete CIL decoding** - Every ECMA-335 opcode, two-pass branch linking, exact re-encoding
//! - **Body splicing** - Local remapping, operand import, constructor prologue handling,
//!   call-through to the preserved original, exception handler remapping
//! - **Chained substitutions** - Type/field/method rewrite tables with cycle detection and
//!   module-wide application on leaf types
//! - **Declarative patches** - Patch configurations built from `Vial.Mixins` style attributes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilmixin::prelude::*;
//! use std::{path::Path, sync::Arc};
//!
//! let mixins = Arc::new(Module::from_file(Path::new("Patch.cmim"))?);
//! let config = PatchLoader::new().load(mixins)?;
//!
//! let mut target = Module::from_file(Path::new("Game.cmim"))?;
//! let report = Patcher::new(PatchOptions::default()).apply(&config, &mut target, &mut [])?;
//! println!("merged {} method bodies", report.merged);
//!
//! target.to_file(Path::new("Game.patched.cmim"))?;
//! # Ok::<(), cilmixin::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`signature`] - Interned type signatures, member signatures, access levels and descriptors
//! - [`metadata`] - The in-memory module model, method bodies and the module image format
//! - [`assembly`] - Opcode tables, the instruction decoder, encoder and body builder
//! - [`patch`] - Substitutions, resolution, the merge engine and the patch driver
//! - [`mixin`] - Loading patch configurations from declared intents
//! - [`Error`] and [`Result`] - Error handling
//!
//! ### Patch Pipeline
//!
//! [`patch::Patcher::apply`] processes one [`patch::PatchConfiguration`] against a target module
//! and its required modules. Dependencies are resolved and promoted first, injected members are
//! declared, mixin bodies are merged, the optional [`patch::ModuleHook`] runs, and finally the
//! collapsed substitution tables are applied module-wide. Any unresolved dependency or mixin fails
//! the whole unit with [`Error::Validation`].

#[macro_use]
pub(crate) mod error;

pub mod assembly;
pub mod file;
pub mod metadata;
pub mod mixin;
pub mod patch;
pub mod prelude;
pub mod signature;

#[cfg(test)]
pub(crate) mod test;

pub use error::{Error, SymbolKind};

/// The generic Result type used throughout `cilmixin`.
pub type Result<T> = std::result::Result<T, Error>;

pub use file::{parser::Parser, File};
pub use metadata::module::Module;
pub use mixin::PatchLoader;
pub use patch::{PatchConfiguration, PatchOptions, Patcher};
