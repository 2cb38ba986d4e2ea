use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// cilmixin - apply mixin patch modules to compiled CIL modules
#[derive(Debug, Parser)]
#[command(name = "cilmixin", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Raise the log level (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply a mixin patch module to a target module.
    Patch {
        /// The module to patch.
        #[arg(long, value_name = "IMG")]
        target: PathBuf,

        /// The annotated patch module.
        #[arg(long, value_name = "IMG")]
        mixins: PathBuf,

        /// Modules searched for dependencies the target does not define. Repeatable.
        #[arg(long, value_name = "IMG")]
        required: Vec<PathBuf>,

        /// Where the patched target is written.
        #[arg(short, long, value_name = "IMG")]
        output: PathBuf,

        /// Directory for the patched required modules (skipped if absent).
        #[arg(long, value_name = "DIR")]
        required_output: Option<PathBuf>,

        /// Resolve dependencies in the target only.
        #[arg(long)]
        strict: bool,

        /// Keep long branch forms in rewritten bodies.
        #[arg(long)]
        no_optimize: bool,
    },

    /// Print types, fields and method bodies of a module.
    Disasm {
        /// Path to the module image.
        #[arg(value_name = "IMG")]
        path: PathBuf,

        /// Only the type with this full name.
        #[arg(long, value_name = "NAME")]
        r#type: Option<String>,
    },

    /// Display module counts and, for patch modules, the intent summary.
    Info {
        /// Path to the module image.
        #[arg(value_name = "IMG")]
        path: PathBuf,
    },
}
