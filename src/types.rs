// src/types.rs

use std::fmt;

// Process exit codes. `0` is full success; every other value names one
// distinct fatal condition or a reconciled pipeline outcome.
pub const SUCCESSFUL_RETURN: i32 = 0;
pub const INVALID_ARGUMENTS: i32 = 3;
pub const COMMAND_LINE_PARSING_ERROR: i32 = 4;
pub const REQUESTED_CONFIGURATION_ABSENT: i32 = 5;
pub const CANNOT_GET_EXECUTABLE_DIRECTORY: i32 = 7;
pub const CONFIGURATION_CONSUMER_ABSENT: i32 = 8;
pub const DESERIALIZATION_JSON_FAILED: i32 = 9;
pub const CREATE_MAIN_LOGGER_FAILED: i32 = 11;
pub const CREATE_EXECUTABLE_LOGGER_FAILED: i32 = 14;
pub const CREATE_PIPE_FAILED: i32 = 21;
pub const PRODUCER_CREATION_FAILED: i32 = 31;
pub const CONSUMER_CREATION_FAILED: i32 = 41;
pub const ERROR_SETUP_CONSOLE_STATE: i32 = 88;
pub const GENERAL_ERROR: i32 = 89;
pub const AT_LEAST_ONE_CHILD_FAILED: i32 = 97;
pub const EXECUTABLE_STATE_ERROR: i32 = 98;
/// Exit code recorded for a child that had to be force-killed. Also the
/// process exit code when the run is classified as [`PipelineOutcome::ChildKilled`].
pub const CHILD_PROCESS_WAS_KILLED: i32 = 99;

/// Profile name that selects direct two-argument pipe mode.
pub const NULL_PROFILE_NAME: &str = "NUL";

/// Default overall run timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60 * 5;

/// Position of an executable in the pipeline.
///
/// The consumer is always present; the producer only in pipe mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Producer,
    Consumer,
}

impl Role {
    /// Both roles in spawn order.
    pub const ALL: [Role; 2] = [Role::Producer, Role::Consumer];

    /// Lowercase name, used for config and log file names.
    pub fn name(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_uppercase())
    }
}

/// Immutable per-invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub profile_name: String,
    /// Parent stdin was a terminal and has been detached; children get a
    /// decoy input source instead of the real stdin.
    pub is_interactive_no_stdin_session: bool,
    /// Overall run timeout in seconds; `0` means no timeout.
    pub timeout_seconds: u64,
    /// Values substituted for `%1..%N` placeholders.
    pub positional_args: Vec<String>,
    /// Treat "no data on the pipe yet" as an unhealthy pipe.
    pub strict_pipe_probe: bool,
}

impl RunConfig {
    pub fn new(profile_name: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            is_interactive_no_stdin_session: false,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            positional_args: Vec::new(),
            strict_pipe_probe: false,
        }
    }

    /// True when the reserved direct-pipe profile was requested.
    pub fn is_direct_pipe(&self) -> bool {
        self.profile_name == NULL_PROFILE_NAME
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positional_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn interactive(mut self, value: bool) -> Self {
        self.is_interactive_no_stdin_session = value;
        self
    }

    pub fn strict_pipe_probe(mut self, value: bool) -> Self {
        self.strict_pipe_probe = value;
        self
    }
}

/// Final classification of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Success,
    /// At least one child was forcibly terminated and none failed on its own.
    ChildKilled,
    /// At least one child exited with a code other than success or "killed".
    AtLeastOneChildFailed,
}

impl PipelineOutcome {
    /// Classify a run from the exit codes of the children that were spawned.
    ///
    /// A failure takes precedence over a kill.
    pub fn reconcile(exit_codes: &[i32]) -> Self {
        let failed = exit_codes
            .iter()
            .any(|&code| code != SUCCESSFUL_RETURN && code != CHILD_PROCESS_WAS_KILLED);
        if failed {
            return PipelineOutcome::AtLeastOneChildFailed;
        }
        if exit_codes.contains(&CHILD_PROCESS_WAS_KILLED) {
            return PipelineOutcome::ChildKilled;
        }
        PipelineOutcome::Success
    }

    pub fn exit_code(self) -> i32 {
        match self {
            PipelineOutcome::Success => SUCCESSFUL_RETURN,
            PipelineOutcome::ChildKilled => CHILD_PROCESS_WAS_KILLED,
            PipelineOutcome::AtLeastOneChildFailed => AT_LEAST_ONE_CHILD_FAILED,
        }
    }
}
