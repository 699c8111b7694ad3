// src/exec/launcher.rs

//! Pluggable process launcher abstraction.
//!
//! The executor talks to a `ProcessLauncher` instead of `tokio::process`
//! directly. This makes it easy to swap in a scripted fake in tests while
//! keeping the production implementation here.
//!
//! - [`SystemLauncher`] splits the command line into words and executes the
//!   first word directly (no shell), in its own process group unless it
//!   writes straight to the wrapper's terminal.
//! - Tests can provide their own launcher that records launch order and
//!   hands back children with scripted lifetimes.

use std::future::Future;
use std::io::{self, IsTerminal};
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::types::{CHILD_PROCESS_WAS_KILLED, Role};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where one standard stream of a child is connected.
#[derive(Debug)]
pub enum ChildStream {
    /// Same stream as the wrapper.
    Inherit,
    /// The null device.
    Null,
    /// A descriptor owned by the launch; closed in the wrapper once spawned.
    Fd(OwnedFd),
}

impl ChildStream {
    fn into_stdio(self) -> Stdio {
        match self {
            ChildStream::Inherit => Stdio::inherit(),
            ChildStream::Null => Stdio::null(),
            ChildStream::Fd(fd) => Stdio::from(fd),
        }
    }
}

/// Standard streams for one launch.
#[derive(Debug)]
pub struct ChildStdio {
    pub stdin: ChildStream,
    pub stdout: ChildStream,
    pub stderr: ChildStream,
}

/// A running child as seen by the supervision loop.
pub trait SupervisedChild: Send {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Wait up to `timeout` for the child to exit.
    ///
    /// `Ok(None)` means it is still running. Once the child has exited every
    /// further call returns the same code immediately.
    fn wait_timeout(&mut self, timeout: Duration) -> BoxFuture<'_, io::Result<Option<i32>>>;

    /// Forcibly terminate the child, reap it and return its exit code.
    ///
    /// A child that died from the kill reports [`CHILD_PROCESS_WAS_KILLED`];
    /// one that exited on its own just before reports its real code.
    fn kill(&mut self) -> BoxFuture<'_, io::Result<i32>>;
}

/// Trait abstracting how children are created.
pub trait ProcessLauncher: Send {
    fn launch(
        &mut self,
        role: Role,
        command_line: &str,
        stdio: ChildStdio,
    ) -> io::Result<Box<dyn SupervisedChild>>;
}

/// Launcher used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(
        &mut self,
        role: Role,
        command_line: &str,
        stdio: ChildStdio,
    ) -> io::Result<Box<dyn SupervisedChild>> {
        let words = split_command_line(command_line)?;
        let Some((program, args)) = words.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command line"));
        };

        let own_group = !writes_to_terminal(
            &stdio,
            std::io::stdout().is_terminal(),
            std::io::stderr().is_terminal(),
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(stdio.stdin.into_stdio())
            .stdout(stdio.stdout.into_stdio())
            .stderr(stdio.stderr.into_stdio())
            .kill_on_drop(true);
        if own_group {
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!(%role, ?pid, own_group, program = %program, "spawned child process");
        Ok(Box::new(SystemChild {
            child,
            pid,
            own_group,
        }))
    }
}

/// Whether the child would write to the wrapper's terminal.
///
/// Such a child stays in the foreground process group: in a background
/// group a terminal with `tostop` set would stop it with `SIGTTOU` on its
/// first write.
fn writes_to_terminal(stdio: &ChildStdio, stdout_is_tty: bool, stderr_is_tty: bool) -> bool {
    (matches!(stdio.stdout, ChildStream::Inherit) && stdout_is_tty)
        || (matches!(stdio.stderr, ChildStream::Inherit) && stderr_is_tty)
}

struct SystemChild {
    child: Child,
    pid: Option<u32>,
    /// Leader of its own process group.
    own_group: bool,
}

impl SupervisedChild for SystemChild {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn wait_timeout(&mut self, timeout: Duration) -> BoxFuture<'_, io::Result<Option<i32>>> {
        Box::pin(async move {
            match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(status) => Ok(Some(exit_code_of(status?))),
                Err(_elapsed) => Ok(None),
            }
        })
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<i32>> {
        Box::pin(async move {
            // The whole group goes: helpers the child forked must not keep
            // the pipe open. A child sharing our group is killed alone.
            let pgid = self
                .pid
                .filter(|_| self.own_group)
                .and_then(|pid| i32::try_from(pid).ok());
            if let Some(pgid) = pgid {
                match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => warn!(pgid, error = %e, "killing process group failed"),
                }
            }
            if let Err(e) = self.child.start_kill() {
                debug!(error = %e, "child already gone when killing");
            }
            let status = self.child.wait().await?;
            Ok(killed_exit_code(status))
        })
    }
}

/// Exit code of a finished child; `128 + signal` if it was killed by a signal.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

/// Exit code recorded after a forced kill: the reserved code if `SIGKILL`
/// ended the child, its real code otherwise.
fn killed_exit_code(status: ExitStatus) -> i32 {
    if status.signal() == Some(Signal::SIGKILL as i32) {
        CHILD_PROCESS_WAS_KILLED
    } else {
        exit_code_of(status)
    }
}

/// Split a command line into words.
///
/// Whitespace separates words; single and double quotes group; a backslash
/// outside single quotes takes the next character literally.
pub fn split_command_line(line: &str) -> io::Result<Vec<String>> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (&quote, c) {
            (Quote::Single, '\'') => quote = Quote::None,
            (Quote::Single, c) => current.push(c),
            (Quote::Double, '"') => quote = Quote::None,
            (_, '\\') => {
                let escaped = chars.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "trailing backslash in command line")
                })?;
                current.push(escaped);
                in_word = true;
            }
            (Quote::Double, c) => current.push(c),
            (Quote::None, '\'') => {
                quote = Quote::Single;
                in_word = true;
            }
            (Quote::None, '"') => {
                quote = Quote::Double;
                in_word = true;
            }
            (Quote::None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (Quote::None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote != Quote::None {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "unterminated quote in command line",
        ));
    }
    if in_word {
        words.push(current);
    }
    if words.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command line"));
    }
    Ok(words)
}
