use std::collections::BTreeMap;
use std::io;
use std::os::fd::AsFd;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use pipewrap::exec::launcher::BoxFuture;
use pipewrap::exec::{ChildStdio, ChildStream, ProcessLauncher, SupervisedChild};
use pipewrap::types::{CHILD_PROCESS_WAS_KILLED, Role};
use tokio::time::Instant;

/// Scripted lifetime of a fake child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildScript {
    /// Exits on its own with `code` after the given delay.
    ExitsAfter(Duration, i32),
    /// Runs until killed.
    NeverExits,
    /// Outlives every wait, then turns out to have exited with `code` by
    /// the time it is killed.
    ExitsDuringKill(i32),
    /// `launch` returns `NotFound`.
    FailsToSpawn,
}

/// Kind of stream a fake child was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Inherit,
    Null,
    Fd,
}

impl StreamKind {
    fn of(stream: &ChildStream) -> Self {
        match stream {
            ChildStream::Inherit => StreamKind::Inherit,
            ChildStream::Null => StreamKind::Null,
            ChildStream::Fd(_) => StreamKind::Fd,
        }
    }
}

/// What the launcher saw for one launch attempt.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub role: Role,
    pub command_line: String,
    pub stdin: StreamKind,
    pub stdout: StreamKind,
    pub stderr: StreamKind,
    /// stdin was a descriptor whose writers were all gone at launch time.
    pub stdin_hung_up: bool,
    pub spawned: bool,
}

/// Shared record of everything the fake launcher and its children did.
#[derive(Debug, Clone, Default)]
pub struct LaunchLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    launches: Vec<LaunchRecord>,
    kills: Vec<Role>,
}

impl LaunchLog {
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.inner.lock().unwrap().launches.clone()
    }

    pub fn launched_roles(&self) -> Vec<Role> {
        self.launches().iter().map(|l| l.role).collect()
    }

    pub fn launch_of(&self, role: Role) -> Option<LaunchRecord> {
        self.launches().into_iter().find(|l| l.role == role)
    }

    pub fn kills(&self) -> Vec<Role> {
        self.inner.lock().unwrap().kills.clone()
    }
}

/// A fake launcher that:
/// - records every launch (order, command line, stdio wiring)
/// - hands back children whose lifetime follows a per-role script
pub struct ScriptedLauncher {
    scripts: BTreeMap<Role, ChildScript>,
    log: LaunchLog,
}

impl ScriptedLauncher {
    /// Both roles default to exiting successfully right away.
    pub fn new() -> Self {
        Self {
            scripts: BTreeMap::new(),
            log: LaunchLog::default(),
        }
    }

    pub fn script(mut self, role: Role, script: ChildScript) -> Self {
        self.scripts.insert(role, script);
        self
    }

    pub fn log(&self) -> LaunchLog {
        self.log.clone()
    }
}

impl Default for ScriptedLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(
        &mut self,
        role: Role,
        command_line: &str,
        stdio: ChildStdio,
    ) -> io::Result<Box<dyn SupervisedChild>> {
        let script = self
            .scripts
            .get(&role)
            .copied()
            .unwrap_or(ChildScript::ExitsAfter(Duration::ZERO, 0));
        let spawned = script != ChildScript::FailsToSpawn;

        self.log.inner.lock().unwrap().launches.push(LaunchRecord {
            role,
            command_line: command_line.to_string(),
            stdin: StreamKind::of(&stdio.stdin),
            stdout: StreamKind::of(&stdio.stdout),
            stderr: StreamKind::of(&stdio.stderr),
            stdin_hung_up: hung_up(&stdio.stdin),
            spawned,
        });
        // The fake child holds none of its streams.
        drop(stdio);

        if !spawned {
            return Err(io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"));
        }

        let exit_at = match script {
            ChildScript::ExitsAfter(delay, code) => Some((Instant::now() + delay, code)),
            _ => None,
        };
        let kill_code = match script {
            ChildScript::ExitsDuringKill(code) => code,
            _ => CHILD_PROCESS_WAS_KILLED,
        };
        Ok(Box::new(FakeChild {
            role,
            exit_at,
            exit: None,
            kill_code,
            log: self.log.clone(),
        }))
    }
}

fn hung_up(stream: &ChildStream) -> bool {
    let ChildStream::Fd(fd) = stream else {
        return false;
    };
    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(n) if n > 0 => fds[0]
            .revents()
            .is_some_and(|r| r.contains(PollFlags::POLLHUP)),
        _ => false,
    }
}

struct FakeChild {
    role: Role,
    exit_at: Option<(Instant, i32)>,
    exit: Option<i32>,
    /// Code reported by `kill` when the child is still running.
    kill_code: i32,
    log: LaunchLog,
}

impl SupervisedChild for FakeChild {
    fn id(&self) -> Option<u32> {
        Some(match self.role {
            Role::Producer => 1001,
            Role::Consumer => 1002,
        })
    }

    fn wait_timeout(&mut self, timeout: Duration) -> BoxFuture<'_, io::Result<Option<i32>>> {
        Box::pin(async move {
            if let Some(code) = self.exit {
                return Ok(Some(code));
            }
            let give_up = Instant::now() + timeout;
            match self.exit_at {
                Some((at, code)) if at <= give_up => {
                    tokio::time::sleep_until(at).await;
                    self.exit = Some(code);
                    Ok(Some(code))
                }
                _ => {
                    tokio::time::sleep_until(give_up).await;
                    Ok(None)
                }
            }
        })
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<i32>> {
        Box::pin(async move {
            self.log.inner.lock().unwrap().kills.push(self.role);
            Ok(*self.exit.get_or_insert(self.kill_code))
        })
    }
}
