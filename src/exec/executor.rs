// src/exec/executor.rs

//! Process pipeline executor: wiring, spawning, supervision, termination.
//!
//! One executor drives exactly one run:
//!
//! 1. [`PipelineExecutor::build`] creates the pipe (pipe mode) and binds each
//!    child's stdio. Any failure releases what was already acquired.
//! 2. [`PipelineExecutor::execute`] spawns the producer, then the consumer,
//!    probes both for an early death, and polls them until one exits, the
//!    timeout elapses or a shutdown is requested.
//! 3. Every spawned child is then terminated (grace period, then kill) and
//!    the exit codes are reconciled into one [`PipelineOutcome`].
//!
//! The loop polls with bounded waits; it never blocks on a single child
//! indefinitely.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ResolvedCommands;
use crate::errors::{PipewrapError, Result};
use crate::exec::descriptor::{ProcessDescriptor, StdioBinding, TerminationPath};
use crate::exec::launcher::{ChildStdio, ProcessLauncher};
use crate::exec::pipe::{PipeEndpoints, PipeHealth, create_pipe, decoy_input, probe_readable};
use crate::logging::Logger;
use crate::signal::{ShutdownHandle, ShutdownReason};
use crate::types::{CHILD_PROCESS_WAS_KILLED, PipelineOutcome, Role, RunConfig};

/// Wait and poll durations used while supervising a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionTimings {
    /// How long to wait for an early consumer exit after spawning it.
    pub health_probe: Duration,
    /// How long to wait for the pipe read end to become readable.
    pub pipe_probe: Duration,
    /// Duration of one supervision loop iteration.
    pub poll_increment: Duration,
    pub producer_grace: Duration,
    pub consumer_grace: Duration,
    /// Producer grace period when the consumer could not be spawned.
    pub producer_grace_on_consumer_failure: Duration,
    pub progress_interval: Duration,
}

impl Default for SupervisionTimings {
    fn default() -> Self {
        Self {
            health_probe: Duration::from_secs(3),
            pipe_probe: Duration::from_secs(1),
            poll_increment: Duration::from_secs(5),
            producer_grace: Duration::from_secs(1),
            consumer_grace: Duration::from_secs(5),
            producer_grace_on_consumer_failure: Duration::from_secs(2),
            progress_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    ProducerSpawning,
    ProducerRunning,
    ConsumerSpawning,
    Running,
    Draining,
    Terminating,
    Done(PipelineOutcome),
}

pub struct PipelineExecutor<L: ProcessLauncher> {
    run: RunConfig,
    timings: SupervisionTimings,
    launcher: L,
    shutdown: ShutdownHandle,
    pipe: Option<PipeEndpoints>,
    producer: Option<ProcessDescriptor>,
    consumer: ProcessDescriptor,
    state: PipelineState,
}

impl<L: ProcessLauncher> PipelineExecutor<L> {
    /// Wire a run. Nothing is spawned yet.
    pub fn build(
        run: RunConfig,
        commands: ResolvedCommands,
        logger: &Logger,
        launcher: L,
        shutdown: ShutdownHandle,
    ) -> Result<Self> {
        let mut pipe = if commands.pipe_mode() {
            Some(create_pipe()?)
        } else {
            None
        };

        match wire_descriptors(&run, commands, logger) {
            Ok((producer, consumer)) => {
                info!(
                    pipe_mode = producer.is_some(),
                    interactive = run.is_interactive_no_stdin_session,
                    "executor built"
                );
                Ok(Self {
                    run,
                    timings: SupervisionTimings::default(),
                    launcher,
                    shutdown,
                    pipe,
                    producer,
                    consumer,
                    state: PipelineState::Init,
                })
            }
            Err(e) => {
                error!(error = %e, "error when building executor");
                if let Some(pipe) = pipe.as_mut() {
                    pipe.close_all();
                }
                Err(e)
            }
        }
    }

    pub fn with_timings(mut self, timings: SupervisionTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn pipe_mode(&self) -> bool {
        self.producer.is_some()
    }

    pub fn descriptor(&self, role: Role) -> Option<&ProcessDescriptor> {
        match role {
            Role::Producer => self.producer.as_ref(),
            Role::Consumer => Some(&self.consumer),
        }
    }

    pub fn pipe(&self) -> Option<&PipeEndpoints> {
        self.pipe.as_ref()
    }

    /// Run the pipeline to completion.
    ///
    /// Children are terminated and handles released on every path.
    pub async fn execute(&mut self) -> Result<PipelineOutcome> {
        let supervised = self.spawn_and_supervise().await;

        self.set_state(PipelineState::Terminating);
        let terminated = self.terminate_all().await;
        self.cleanup();

        supervised?;
        terminated?;

        let outcome = self.reconcile();
        info!(?outcome, exit_code = outcome.exit_code(), "pipeline finished");
        self.set_state(PipelineState::Done(outcome));
        Ok(outcome)
    }

    async fn spawn_and_supervise(&mut self) -> Result<()> {
        if self.producer.is_some() {
            self.spawn_producer()?;
        }
        self.spawn_consumer().await?;
        self.probe_health().await?;

        self.set_state(PipelineState::Running);
        self.supervise().await?;
        self.set_state(PipelineState::Draining);
        Ok(())
    }

    fn spawn_producer(&mut self) -> Result<()> {
        self.set_state(PipelineState::ProducerSpawning);
        let Some(producer) = self.producer.as_mut() else {
            return Ok(());
        };

        let launched = child_stdio(producer, self.pipe.as_ref()).and_then(|stdio| {
            self.launcher
                .launch(Role::Producer, &producer.command_line, stdio)
        });

        match launched {
            Ok(child) => {
                producer.attach(child);
                info!(pid = ?producer.pid(), cmd = %producer.command_line, "PRODUCER started");
                producer.release_stdin();
                if let Some(pipe) = self.pipe.as_mut() {
                    pipe.close_write();
                }
                self.set_state(PipelineState::ProducerRunning);
                Ok(())
            }
            Err(e) => {
                error!(cmd = %producer.command_line, error = %e, "PRODUCER could not be created");
                if let Some(pipe) = self.pipe.as_mut() {
                    pipe.close_all();
                }
                Err(PipewrapError::ProducerSpawnFailed(format!(
                    "{}: {e}",
                    producer.command_line
                )))
            }
        }
    }

    async fn spawn_consumer(&mut self) -> Result<()> {
        self.set_state(PipelineState::ConsumerSpawning);
        let consumer = &mut self.consumer;

        let launched = child_stdio(consumer, self.pipe.as_ref()).and_then(|stdio| {
            self.launcher
                .launch(Role::Consumer, &consumer.command_line, stdio)
        });

        match launched {
            Ok(child) => {
                consumer.attach(child);
                info!(pid = ?consumer.pid(), cmd = %consumer.command_line, "CONSUMER started");
                Ok(())
            }
            Err(e) => {
                error!(cmd = %consumer.command_line, error = %e, "CONSUMER could not be created");
                let err = PipewrapError::ConsumerSpawnFailed(format!(
                    "{}: {e}",
                    consumer.command_line
                ));
                if let Some(pipe) = self.pipe.as_mut() {
                    pipe.close_all();
                }
                let grace = self.timings.producer_grace_on_consumer_failure;
                if let Some(producer) = self.producer.as_mut() {
                    if let Err(term) = terminate_child(producer, grace).await {
                        warn!(error = %term, "terminating PRODUCER after CONSUMER failure");
                    }
                }
                Err(err)
            }
        }
    }

    /// Early-death detection right after both children exist.
    async fn probe_health(&mut self) -> Result<()> {
        let consumer_exited = self.poll(Role::Consumer, self.timings.health_probe).await?;
        if consumer_exited {
            warn!("CONSUMER exited during the health probe");
        } else {
            info!("CONSUMER is running");
        }

        let mut pipe_unhealthy = false;
        if let Some(read) = self.pipe.as_ref().and_then(PipeEndpoints::read_end) {
            let health = match read.try_clone() {
                Ok(fd) => {
                    let timeout = self.timings.pipe_probe;
                    tokio::task::spawn_blocking(move || probe_readable(&fd, timeout))
                        .await
                        .unwrap_or(PipeHealth::Invalid)
                }
                Err(e) => {
                    warn!(error = %e, "could not duplicate pipe read end for probing");
                    PipeHealth::Invalid
                }
            };
            match health {
                PipeHealth::Ready => debug!("pipe has data or is closed"),
                PipeHealth::Idle => warn!(
                    strict = self.run.strict_pipe_probe,
                    "no data on the pipe within the probe window"
                ),
                PipeHealth::Invalid => warn!("pipe read end looks invalid"),
            }
            pipe_unhealthy = health.is_unhealthy(self.run.strict_pipe_probe);
        }

        // The consumer has its own copy now.
        self.consumer.release_stdin();
        if let Some(pipe) = self.pipe.as_mut() {
            pipe.close_read();
        }

        if consumer_exited || pipe_unhealthy {
            self.shutdown.request(ShutdownReason::UnhealthyStart);
        }
        Ok(())
    }

    async fn supervise(&mut self) -> Result<()> {
        let limit = (self.run.timeout_seconds > 0)
            .then(|| Duration::from_secs(self.run.timeout_seconds));
        match limit {
            Some(limit) => info!(timeout = ?limit, "supervising children"),
            None => info!("supervising children without timeout"),
        }

        let increment = self.timings.poll_increment;
        let mut elapsed = Duration::ZERO;
        let mut next_progress = self.timings.progress_interval;

        while limit.is_none_or(|limit| elapsed < limit) && !self.shutdown.is_requested() {
            let exited = if self.pipe_mode() {
                self.poll(Role::Consumer, increment / 2).await?
                    || self.poll(Role::Producer, increment / 2).await?
            } else {
                self.poll(Role::Consumer, increment).await?
            };
            if exited {
                break;
            }

            elapsed += increment;
            if elapsed >= next_progress {
                info!(minutes = elapsed.as_secs() / 60, "children still running");
                next_progress += self.timings.progress_interval;
            }
        }

        if let Some(reason) = self.shutdown.reason() {
            info!(%reason, "shutdown requested");
        } else if limit.is_some_and(|limit| elapsed >= limit) {
            self.shutdown.request(ShutdownReason::Timeout);
            warn!(elapsed = ?elapsed, "timeout reached");
        }
        Ok(())
    }

    /// Wait up to `timeout` for `role` to exit. Returns whether it has.
    async fn poll(&mut self, role: Role, timeout: Duration) -> Result<bool> {
        let Some(desc) = self.descriptor_mut(role) else {
            return Ok(false);
        };
        if desc.exit_code().is_some() {
            return Ok(true);
        }
        let Some(child) = desc.child_mut() else {
            return Ok(false);
        };

        match child.wait_timeout(timeout).await {
            Ok(Some(code)) => {
                info!(%role, exit_code = code, "child exited");
                desc.record_exit(code, TerminationPath::Exited);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(PipewrapError::ExecutableState {
                role,
                message: e.to_string(),
            }),
        }
    }

    async fn terminate_all(&mut self) -> Result<()> {
        let mut first_error = None;

        if let Some(producer) = self.producer.as_mut() {
            if let Err(e) = terminate_child(producer, self.timings.producer_grace).await {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = terminate_child(&mut self.consumer, self.timings.consumer_grace).await {
            first_error.get_or_insert(e);
        }

        first_error.map_or(Ok(()), Err)
    }

    fn reconcile(&self) -> PipelineOutcome {
        let codes: Vec<i32> = self
            .producer
            .iter()
            .chain(std::iter::once(&self.consumer))
            .filter_map(ProcessDescriptor::exit_code)
            .collect();
        PipelineOutcome::reconcile(&codes)
    }

    /// Release every handle still held. Idempotent.
    pub fn cleanup(&mut self) {
        if let Some(pipe) = self.pipe.as_mut() {
            pipe.close_all();
        }
        if let Some(producer) = self.producer.as_mut() {
            producer.close_handles();
        }
        self.consumer.close_handles();
    }

    fn descriptor_mut(&mut self, role: Role) -> Option<&mut ProcessDescriptor> {
        match role {
            Role::Producer => self.producer.as_mut(),
            Role::Consumer => Some(&mut self.consumer),
        }
    }

    fn set_state(&mut self, state: PipelineState) {
        debug!(from = ?self.state, to = ?state, "pipeline state");
        self.state = state;
    }
}

impl<L: ProcessLauncher> Drop for PipelineExecutor<L> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn wire_descriptors(
    run: &RunConfig,
    commands: ResolvedCommands,
    logger: &Logger,
) -> Result<(Option<ProcessDescriptor>, ProcessDescriptor)> {
    let producer = match commands.producer {
        Some(cmd) => Some(
            ProcessDescriptor::new(Role::Producer, cmd)
                .stdin(stdin_binding(run)?)
                .stdout(StdioBinding::PipeWrite)
                .stderr(error_sink(logger, Role::Producer)?),
        ),
        None => None,
    };

    let consumer_stdin = if producer.is_some() {
        StdioBinding::PipeRead
    } else {
        stdin_binding(run)?
    };
    let consumer = ProcessDescriptor::new(Role::Consumer, commands.consumer)
        .stdin(consumer_stdin)
        .stdout(StdioBinding::Inherit)
        .stderr(error_sink(logger, Role::Consumer)?);

    Ok((producer, consumer))
}

fn stdin_binding(run: &RunConfig) -> Result<StdioBinding> {
    if run.is_interactive_no_stdin_session {
        Ok(StdioBinding::Owned(decoy_input()?))
    } else {
        Ok(StdioBinding::Inherit)
    }
}

fn error_sink(logger: &Logger, role: Role) -> Result<StdioBinding> {
    Ok(logger
        .error_sink(role)?
        .map_or(StdioBinding::Inherit, StdioBinding::Owned))
}

fn child_stdio(desc: &ProcessDescriptor, pipe: Option<&PipeEndpoints>) -> std::io::Result<ChildStdio> {
    Ok(ChildStdio {
        stdin: desc.stdin.to_child_stream(pipe)?,
        stdout: desc.stdout.to_child_stream(pipe)?,
        stderr: desc.stderr.to_child_stream(pipe)?,
    })
}

/// Grace period, then forced kill. A child already recorded as exited is
/// left alone.
async fn terminate_child(desc: &mut ProcessDescriptor, grace: Duration) -> Result<()> {
    let role = desc.role;
    if desc.exit_code().is_some() {
        debug!(%role, "child already exited, nothing to terminate");
        return Ok(());
    }
    let Some(child) = desc.child_mut() else {
        return Ok(());
    };

    let state_error = |e: std::io::Error| PipewrapError::ExecutableState {
        role,
        message: e.to_string(),
    };

    match child.wait_timeout(grace).await.map_err(state_error)? {
        Some(code) => {
            info!(%role, exit_code = code, "child exited within its grace period");
            desc.record_exit(code, TerminationPath::Graceful);
        }
        None => {
            warn!(%role, grace = ?grace, "child still running after grace period, killing it");
            let code = child.kill().await.map_err(state_error)?;
            if code == CHILD_PROCESS_WAS_KILLED {
                desc.record_exit(code, TerminationPath::Forced);
                info!(%role, exit_code = code, "child was killed");
            } else {
                // It exited between the grace wait and the kill.
                desc.record_exit(code, TerminationPath::Graceful);
                info!(%role, exit_code = code, "child exited before the kill landed");
            }
        }
    }
    Ok(())
}
