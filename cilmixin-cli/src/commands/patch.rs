use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use cilmixin::{
    mixin::PatchLoader,
    patch::{PatchOptions, Patcher},
};
use log::info;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_module, read_image, write_image},
    output::print_output,
};

/// Arguments of the `patch` subcommand.
pub struct PatchArgs<'a> {
    pub target: &'a Path,
    pub mixins: &'a Path,
    pub required: &'a [PathBuf],
    pub output: &'a Path,
    pub required_output: Option<&'a Path>,
    pub strict: bool,
    pub optimize: bool,
}

#[derive(Debug, Serialize)]
pub struct PatchSummary {
    pub patch: String,
    pub target: String,
    pub output: String,
    pub merged: usize,
    pub preserved: usize,
    pub injected: usize,
    pub promoted: usize,
    pub interfaces: usize,
    pub substituted: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_written: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

pub fn run(args: &PatchArgs<'_>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let mixins = load_module(args.mixins)?;
    let config = PatchLoader::new()
        .load(Arc::new(mixins))
        .with_context(|| format!("invalid patch module: {}", args.mixins.display()))?;
    info!(
        "loaded {} ({} mixins, {} dependencies, {} injects)",
        config.name(),
        config.mixins().len(),
        config.dependencies().len(),
        config.injects().len()
    );

    let target = read_image(args.target)?;
    let required = args
        .required
        .iter()
        .map(|path| read_image(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let required_refs: Vec<&[u8]> = required.iter().map(Vec::as_slice).collect();

    let options = if args.strict {
        PatchOptions::strict()
    } else {
        PatchOptions::default()
    };
    let options = options.with_optimize_branches(args.optimize);

    let patched = Patcher::new(options)
        .patch_images(&config, &target, &required_refs)
        .with_context(|| format!("failed to patch {}", args.target.display()))?;

    write_image(args.output, &patched.target)?;

    let mut required_written = Vec::new();
    if let Some(dir) = args.required_output {
        for (path, image) in args.required.iter().zip(&patched.required) {
            let destination = dir.join(file_display_name(path));
            write_image(&destination, image)?;
            required_written.push(destination.display().to_string());
        }
    }

    let report = patched.report;
    let summary = PatchSummary {
        patch: report.patch.clone(),
        target: config.target().to_string(),
        output: args.output.display().to_string(),
        merged: report.merged,
        preserved: report.preserved,
        injected: report.injected,
        promoted: report.promoted,
        interfaces: report.interfaces,
        substituted: report.substituted,
        required_written,
        unresolved: report.unresolved.clone(),
    };

    print_output(&summary, opts, |summary| {
        println!("{report}");
        println!("Written:  {}", summary.output);
        for path in &summary.required_written {
            println!("Written:  {path}");
        }
        if !summary.unresolved.is_empty() {
            println!("\nUnresolved:");
            for symbol in &summary.unresolved {
                println!("  {symbol}");
            }
        }
    })
}
