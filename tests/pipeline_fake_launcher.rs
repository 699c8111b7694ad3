// tests/pipeline_fake_launcher.rs

use std::error::Error;
use std::time::{Duration, Instant};

use pipewrap::cli::LogMode;
use pipewrap::config::ResolvedCommands;
use pipewrap::errors::PipewrapError;
use pipewrap::exec::{PipelineExecutor, PipelineState, TerminationPath};
use pipewrap::logging::Logger;
use pipewrap::signal::{ShutdownHandle, ShutdownReason};
use pipewrap::types::{PipelineOutcome, Role, RunConfig};
use pipewrap_test_utils::builders::fast_timings;
use pipewrap_test_utils::fake_launcher::{ChildScript, ScriptedLauncher, StreamKind};
use pipewrap_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn pipe_commands() -> ResolvedCommands {
    ResolvedCommands {
        producer: Some("decode in.flac".to_string()),
        consumer: "encode out.m4a".to_string(),
    }
}

fn consumer_only() -> ResolvedCommands {
    ResolvedCommands {
        producer: None,
        consumer: "encode out.m4a".to_string(),
    }
}

fn build(
    run: RunConfig,
    commands: ResolvedCommands,
    launcher: ScriptedLauncher,
    shutdown: &ShutdownHandle,
) -> Result<PipelineExecutor<ScriptedLauncher>, PipewrapError> {
    let logger = Logger::detached("test");
    Ok(
        PipelineExecutor::build(run, commands, &logger, launcher, shutdown.clone())?
            .with_timings(fast_timings()),
    )
}

#[tokio::test]
async fn producer_is_launched_before_consumer_with_write_end_closed() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new();
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let mut executor = build(RunConfig::new("p"), pipe_commands(), launcher, &shutdown)?;
    assert!(executor.pipe_mode());
    let outcome = with_timeout(executor.execute()).await?;

    assert_eq!(outcome, PipelineOutcome::Success);
    assert_eq!(executor.state(), PipelineState::Done(PipelineOutcome::Success));
    assert_eq!(log.launched_roles(), vec![Role::Producer, Role::Consumer]);

    let producer = log.launch_of(Role::Producer).unwrap();
    assert_eq!(producer.command_line, "decode in.flac");
    assert_eq!(producer.stdin, StreamKind::Inherit);
    assert_eq!(producer.stdout, StreamKind::Fd);

    let consumer = log.launch_of(Role::Consumer).unwrap();
    assert_eq!(consumer.stdin, StreamKind::Fd);
    assert_eq!(consumer.stdout, StreamKind::Inherit);
    // Every writer was gone before the consumer started.
    assert!(consumer.stdin_hung_up);
    Ok(())
}

#[tokio::test]
async fn producer_spawn_failure_never_launches_consumer() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new().script(Role::Producer, ChildScript::FailsToSpawn);
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let mut executor = build(RunConfig::new("p"), pipe_commands(), launcher, &shutdown)?;
    let err = with_timeout(executor.execute()).await.unwrap_err();

    assert!(matches!(err, PipewrapError::ProducerSpawnFailed(_)));
    assert_eq!(err.exit_code(), 31);
    assert_eq!(log.launched_roles(), vec![Role::Producer]);

    let pipe = executor.pipe().unwrap();
    assert!(!pipe.is_read_open());
    assert!(!pipe.is_write_open());
    Ok(())
}

#[tokio::test]
async fn consumer_spawn_failure_terminates_producer() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new()
        .script(Role::Producer, ChildScript::NeverExits)
        .script(Role::Consumer, ChildScript::FailsToSpawn);
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let mut executor = build(RunConfig::new("p"), pipe_commands(), launcher, &shutdown)?;
    let err = with_timeout(executor.execute()).await.unwrap_err();

    assert_eq!(err.exit_code(), 41);
    assert_eq!(log.kills(), vec![Role::Producer]);
    let producer = executor.descriptor(Role::Producer).unwrap();
    assert_eq!(producer.exit_code(), Some(99));
    assert_eq!(producer.termination_path(), Some(TerminationPath::Forced));
    Ok(())
}

#[tokio::test]
async fn early_consumer_exit_skips_the_timeout() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new()
        .script(Role::Producer, ChildScript::NeverExits)
        .script(Role::Consumer, ChildScript::ExitsAfter(Duration::from_millis(10), 3));
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let started = Instant::now();
    let mut executor = build(RunConfig::new("p"), pipe_commands(), launcher, &shutdown)?;
    let outcome = with_timeout(executor.execute()).await?;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(shutdown.reason(), Some(ShutdownReason::UnhealthyStart));
    assert_eq!(outcome, PipelineOutcome::AtLeastOneChildFailed);
    assert_eq!(log.kills(), vec![Role::Producer]);
    Ok(())
}

#[tokio::test]
async fn single_process_success() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new()
        .script(Role::Consumer, ChildScript::ExitsAfter(Duration::from_millis(250), 0));
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let mut executor = build(RunConfig::new("p"), consumer_only(), launcher, &shutdown)?;
    assert!(!executor.pipe_mode());
    let outcome = with_timeout(executor.execute()).await?;

    assert_eq!(outcome, PipelineOutcome::Success);
    assert_eq!(log.launched_roles(), vec![Role::Consumer]);
    assert_eq!(log.launch_of(Role::Consumer).unwrap().stdin, StreamKind::Inherit);
    assert!(log.kills().is_empty());
    let consumer = executor.descriptor(Role::Consumer).unwrap();
    assert_eq!(consumer.termination_path(), Some(TerminationPath::Exited));
    // Exited after the health probe: no early shutdown.
    assert_eq!(shutdown.reason(), None);
    Ok(())
}

#[tokio::test]
async fn timeout_forces_both_children_down() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new()
        .script(Role::Producer, ChildScript::NeverExits)
        .script(Role::Consumer, ChildScript::NeverExits);
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let run = RunConfig::new("p").with_timeout(1);
    let mut executor = build(run, pipe_commands(), launcher, &shutdown)?;
    let outcome = with_timeout(executor.execute()).await?;

    assert_eq!(outcome, PipelineOutcome::ChildKilled);
    assert_eq!(shutdown.reason(), Some(ShutdownReason::Timeout));
    assert_eq!(log.kills(), vec![Role::Producer, Role::Consumer]);
    Ok(())
}

#[tokio::test]
async fn cancellation_ends_an_unbounded_run() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new()
        .script(Role::Producer, ChildScript::NeverExits)
        .script(Role::Consumer, ChildScript::NeverExits);
    let shutdown = ShutdownHandle::new();

    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        canceller.request(ShutdownReason::Signal);
    });

    let started = Instant::now();
    let run = RunConfig::new("p").with_timeout(0);
    let mut executor = build(run, pipe_commands(), launcher, &shutdown)?;
    let outcome = with_timeout(executor.execute()).await?;

    let timings = fast_timings();
    let bound = Duration::from_millis(400)
        + timings.poll_increment
        + timings.producer_grace
        + timings.consumer_grace
        + Duration::from_millis(500);
    assert!(started.elapsed() < bound, "took {:?}", started.elapsed());
    assert_eq!(outcome, PipelineOutcome::ChildKilled);
    assert_eq!(shutdown.reason(), Some(ShutdownReason::Signal));
    Ok(())
}

#[tokio::test]
async fn failure_outranks_kill() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new()
        .script(Role::Producer, ChildScript::ExitsAfter(Duration::from_millis(200), 2))
        .script(Role::Consumer, ChildScript::NeverExits);
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let mut executor = build(RunConfig::new("p"), pipe_commands(), launcher, &shutdown)?;
    let outcome = with_timeout(executor.execute()).await?;

    assert_eq!(outcome, PipelineOutcome::AtLeastOneChildFailed);
    assert_eq!(log.kills(), vec![Role::Consumer]);
    assert_eq!(executor.descriptor(Role::Producer).unwrap().exit_code(), Some(2));
    assert_eq!(executor.descriptor(Role::Consumer).unwrap().exit_code(), Some(99));
    Ok(())
}

#[tokio::test]
async fn interactive_session_feeds_decoy_input() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new();
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let run = RunConfig::new("p").interactive(true);
    let mut executor = build(run, pipe_commands(), launcher, &shutdown)?;
    with_timeout(executor.execute()).await?;

    let producer = log.launch_of(Role::Producer).unwrap();
    assert_eq!(producer.stdin, StreamKind::Fd);
    // The decoy's write end is closed before launch.
    assert!(producer.stdin_hung_up);
    Ok(())
}

#[tokio::test]
async fn single_process_interactive_session_feeds_decoy_input() -> TestResult {
    init_tracing();
    let launcher = ScriptedLauncher::new();
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let run = RunConfig::new("p").interactive(true);
    let mut executor = build(run, consumer_only(), launcher, &shutdown)?;
    let outcome = with_timeout(executor.execute()).await?;

    assert_eq!(outcome, PipelineOutcome::Success);
    assert_eq!(log.launched_roles(), vec![Role::Consumer]);
    let consumer = log.launch_of(Role::Consumer).unwrap();
    assert_eq!(consumer.stdin, StreamKind::Fd);
    assert!(consumer.stdin_hung_up);
    Ok(())
}

#[tokio::test]
async fn child_exiting_during_kill_keeps_its_own_code() -> TestResult {
    init_tracing();
    let launcher =
        ScriptedLauncher::new().script(Role::Consumer, ChildScript::ExitsDuringKill(0));
    let log = launcher.log();
    let shutdown = ShutdownHandle::new();

    let run = RunConfig::new("p").with_timeout(1);
    let mut executor = build(run, consumer_only(), launcher, &shutdown)?;
    let outcome = with_timeout(executor.execute()).await?;

    assert_eq!(log.kills(), vec![Role::Consumer]);
    assert_eq!(outcome, PipelineOutcome::Success);
    let consumer = executor.descriptor(Role::Consumer).unwrap();
    assert_eq!(consumer.exit_code(), Some(0));
    assert_eq!(consumer.termination_path(), Some(TerminationPath::Graceful));
    Ok(())
}

#[tokio::test]
async fn file_logging_redirects_child_stderr() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let logger = Logger::open(LogMode::File, dir.path(), "RUN")?;
    let launcher = ScriptedLauncher::new();
    let log = launcher.log();

    let mut executor = PipelineExecutor::build(
        RunConfig::new("p"),
        pipe_commands(),
        &logger,
        launcher,
        ShutdownHandle::new(),
    )?
    .with_timings(fast_timings());
    with_timeout(executor.execute()).await?;

    assert_eq!(log.launch_of(Role::Producer).unwrap().stderr, StreamKind::Fd);
    assert_eq!(log.launch_of(Role::Consumer).unwrap().stderr, StreamKind::Fd);
    logger.close();
    Ok(())
}
