//! Command implementations for the shardex CLI.

use log::info;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::error::Result;
use crate::parallel_index::engine::ParallelIndexEngine;
use crate::verify::verify_index;

/// Execute a CLI command.
pub fn execute_command(args: ShardexArgs) -> Result<()> {
    match &args.command {
        Command::Build(build_args) => build_index(build_args, &args),
        Command::Verify(verify_args) => verify(verify_args, &args),
    }
}

/// Build an index.
fn build_index(args: &BuildArgs, cli_args: &ShardexArgs) -> Result<()> {
    let config = args.to_config()?;
    let engine = ParallelIndexEngine::new(config)?;
    info!(
        "Building index of {} into {} with {} workers",
        args.input.display(),
        args.outdir.display(),
        engine.config().concurrency
    );

    let outcome = engine.build(&args.input, &args.outdir)?;
    if let Some(warning) = &outcome.report_warning {
        eprintln!("Warning: {warning}");
    }

    output_result("Index built successfully", &outcome.summary, cli_args)
}

/// Verify the shards of an index.
fn verify(args: &VerifyArgs, cli_args: &ShardexArgs) -> Result<()> {
    let report = verify_index(&args.dir, &args.basename)?;
    output_result("Index is consistent", &report, cli_args)
}
