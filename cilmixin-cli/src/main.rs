mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // warn by default, each --verbose raises the level; RUST_LOG overrides
    if !cli.global.json {
        let level = match cli.global.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        env_logger::Builder::new()
            .filter_module("cilmixin", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Patch {
            target,
            mixins,
            required,
            output,
            required_output,
            strict,
            no_optimize,
        } => commands::patch::run(
            &commands::patch::PatchArgs {
                target,
                mixins,
                required,
                output,
                required_output: required_output.as_deref(),
                strict: *strict,
                optimize: !*no_optimize,
            },
            &cli.global,
        ),
        Command::Disasm { path, r#type } => commands::disasm::run(path, r#type.as_deref()),
        Command::Info { path } => commands::info::run(path, &cli.global),
    }
}
