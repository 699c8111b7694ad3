// src/exec/descriptor.rs

//! Per-child bookkeeping: command line, stdio wiring, live child, exit code.

use std::fmt;
use std::io;
use std::os::fd::OwnedFd;

use crate::exec::launcher::{ChildStream, SupervisedChild};
use crate::exec::pipe::{PipeEndpoints, close_fd};
use crate::types::Role;

/// How one standard stream of a child is wired.
#[derive(Debug)]
pub enum StdioBinding {
    Inherit,
    /// Read end of the producer -> consumer pipe.
    PipeRead,
    /// Write end of the producer -> consumer pipe.
    PipeWrite,
    /// A descriptor owned by this descriptor (decoy input, error sink).
    Owned(OwnedFd),
    /// Released; the child gets the null device if launched afterwards.
    Closed,
}

impl StdioBinding {
    /// Materialize a stream for a launch, duplicating any descriptor.
    pub fn to_child_stream(&self, pipe: Option<&PipeEndpoints>) -> io::Result<ChildStream> {
        let fd = match self {
            StdioBinding::Inherit => return Ok(ChildStream::Inherit),
            StdioBinding::Closed => return Ok(ChildStream::Null),
            StdioBinding::Owned(fd) => fd,
            StdioBinding::PipeRead => pipe.and_then(PipeEndpoints::read_end).ok_or_else(closed_pipe)?,
            StdioBinding::PipeWrite => pipe.and_then(PipeEndpoints::write_end).ok_or_else(closed_pipe)?,
        };
        Ok(ChildStream::Fd(fd.try_clone()?))
    }

    fn release(&mut self, what: &str) {
        if let StdioBinding::Owned(fd) = std::mem::replace(self, StdioBinding::Closed) {
            close_fd(fd, what);
        }
    }
}

fn closed_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe end already closed")
}

/// Which way a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPath {
    /// Observed to exit during supervision.
    Exited,
    /// Exited within its grace period.
    Graceful,
    /// Killed after the grace period ran out.
    Forced,
}

impl fmt::Display for TerminationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationPath::Exited => "exited",
            TerminationPath::Graceful => "graceful",
            TerminationPath::Forced => "forced",
        })
    }
}

pub struct ProcessDescriptor {
    pub role: Role,
    pub command_line: String,
    pub stdin: StdioBinding,
    pub stdout: StdioBinding,
    pub stderr: StdioBinding,
    child: Option<Box<dyn SupervisedChild>>,
    pid: Option<u32>,
    exit: Option<(i32, TerminationPath)>,
}

impl fmt::Debug for ProcessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDescriptor")
            .field("role", &self.role)
            .field("command_line", &self.command_line)
            .field("stdin", &self.stdin)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("pid", &self.pid)
            .field("exit", &self.exit)
            .finish()
    }
}

impl ProcessDescriptor {
    pub fn new(role: Role, command_line: impl Into<String>) -> Self {
        Self {
            role,
            command_line: command_line.into(),
            stdin: StdioBinding::Inherit,
            stdout: StdioBinding::Inherit,
            stderr: StdioBinding::Inherit,
            child: None,
            pid: None,
            exit: None,
        }
    }

    pub fn stdin(mut self, binding: StdioBinding) -> Self {
        self.stdin = binding;
        self
    }

    pub fn stdout(mut self, binding: StdioBinding) -> Self {
        self.stdout = binding;
        self
    }

    pub fn stderr(mut self, binding: StdioBinding) -> Self {
        self.stderr = binding;
        self
    }

    pub fn attach(&mut self, child: Box<dyn SupervisedChild>) {
        self.pid = child.id();
        self.child = Some(child);
    }

    pub fn child_mut(&mut self) -> Option<&mut (dyn SupervisedChild + 'static)> {
        self.child.as_deref_mut()
    }

    pub fn is_spawned(&self) -> bool {
        self.child.is_some() || self.exit.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn record_exit(&mut self, code: i32, path: TerminationPath) {
        self.exit.get_or_insert((code, path));
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit.map(|(code, _)| code)
    }

    pub fn termination_path(&self) -> Option<TerminationPath> {
        self.exit.map(|(_, path)| path)
    }

    /// Close the wrapper's copy of the child's stdin, once the child has it.
    pub fn release_stdin(&mut self) {
        self.stdin.release("child stdin");
    }

    /// Close every handle this descriptor owns. Safe to call repeatedly.
    pub fn close_handles(&mut self) {
        self.stdin.release("child stdin");
        self.stdout.release("child stdout");
        self.stderr.release("child stderr");
        // Dropping a still-running child kills it.
        self.child = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::pipe::{create_pipe, decoy_input};

    #[test]
    fn closing_handles_twice_is_safe() {
        let mut desc = ProcessDescriptor::new(Role::Producer, "dec")
            .stdin(StdioBinding::Owned(decoy_input().unwrap()))
            .stdout(StdioBinding::PipeWrite);
        desc.close_handles();
        desc.close_handles();
        assert!(matches!(desc.stdin, StdioBinding::Closed));
        assert!(matches!(desc.stdout, StdioBinding::PipeWrite));
    }

    #[test]
    fn pipe_bindings_duplicate_the_open_end() {
        let mut pipe = create_pipe().unwrap();
        let stream = StdioBinding::PipeRead.to_child_stream(Some(&pipe)).unwrap();
        assert!(matches!(stream, ChildStream::Fd(_)));

        pipe.close_write();
        let err = StdioBinding::PipeWrite.to_child_stream(Some(&pipe)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn released_stdin_becomes_null() {
        let mut desc = ProcessDescriptor::new(Role::Consumer, "enc")
            .stdin(StdioBinding::Owned(decoy_input().unwrap()));
        desc.release_stdin();
        let stream = desc.stdin.to_child_stream(None).unwrap();
        assert!(matches!(stream, ChildStream::Null));
    }

    #[test]
    fn first_recorded_exit_wins() {
        let mut desc = ProcessDescriptor::new(Role::Consumer, "enc");
        assert!(!desc.is_spawned());
        desc.record_exit(0, TerminationPath::Exited);
        desc.record_exit(99, TerminationPath::Forced);
        assert_eq!(desc.exit_code(), Some(0));
        assert_eq!(desc.termination_path(), Some(TerminationPath::Exited));
    }
}
