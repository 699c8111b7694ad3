// src/lib.rs

pub mod cli;
pub mod config;
pub mod console;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod signal;
pub mod types;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ResolvedCommands, resolve_commands};
use crate::errors::Result;
use crate::exec::{PipelineExecutor, ProcessLauncher, SupervisionTimings, SystemLauncher};
use crate::logging::Logger;
use crate::signal::{ShutdownHandle, spawn_signal_bridge};
use crate::types::{PipelineOutcome, RunConfig};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - command resolution (profile or direct pipe)
/// - interactive stdin detachment
/// - the signal bridge and the shared shutdown flag
/// - the pipeline executor
pub async fn run(args: CliArgs, logger: &Logger) -> Result<PipelineOutcome> {
    info!(
        run_id = logger.run_id(),
        started = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        profile = %args.profile,
        "pipewrap starting"
    );

    let run = RunConfig::new(args.profile)
        .with_timeout(args.timeout)
        .with_args(args.placeholders)
        .strict_pipe_probe(args.strict_pipe_probe);
    let commands = resolve_commands(&run, args.config_dir.as_deref())?;

    if args.dry_run {
        print_dry_run(&run, &commands);
        return Ok(PipelineOutcome::Success);
    }

    let interactive = console::prepare_stdin()?;
    let run = run.interactive(interactive);

    let shutdown = ShutdownHandle::new();
    let bridge = spawn_signal_bridge(shutdown.clone())?;

    let outcome = run_pipeline(
        run,
        commands,
        logger,
        SystemLauncher,
        shutdown,
        SupervisionTimings::default(),
    )
    .await;

    bridge.abort();
    outcome
}

/// Build an executor for `commands` and drive it to completion.
pub async fn run_pipeline<L: ProcessLauncher>(
    run: RunConfig,
    commands: ResolvedCommands,
    logger: &Logger,
    launcher: L,
    shutdown: ShutdownHandle,
    timings: SupervisionTimings,
) -> Result<PipelineOutcome> {
    let mut executor =
        PipelineExecutor::build(run, commands, logger, launcher, shutdown)?.with_timings(timings);
    executor.execute().await
}

/// Simple dry-run output: print the resolved command lines.
fn print_dry_run(run: &RunConfig, commands: &ResolvedCommands) {
    println!("pipewrap dry-run");
    println!("  profile = {}", run.profile_name);
    println!("  timeout = {}s", run.timeout_seconds);
    println!("  pipe mode = {}", commands.pipe_mode());
    if let Some(producer) = &commands.producer {
        println!("  producer: {producer}");
    }
    println!("  consumer: {}", commands.consumer);

    debug!("dry-run complete (no execution)");
}
