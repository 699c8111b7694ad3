// src/exec/pipe.rs

//! Anonymous pipes and descriptor housekeeping.
//!
//! Every descriptor created here has `FD_CLOEXEC` set: a child only ever sees
//! the ends that were explicitly wired to its stdio.

use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, IntoRawFd, OwnedFd};
use std::time::Duration;

use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout};
use tracing::{debug, info, warn};

use crate::errors::{PipewrapError, Result};

/// Byte written into the decoy input before its write end is closed.
const DECOY_SENTINEL: u8 = 0x00;

/// Both ends of the producer -> consumer pipe, as held by the wrapper.
///
/// `None` means that end has already been closed on the wrapper side.
#[derive(Debug)]
pub struct PipeEndpoints {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

impl PipeEndpoints {
    pub fn read_end(&self) -> Option<&OwnedFd> {
        self.read.as_ref()
    }

    pub fn write_end(&self) -> Option<&OwnedFd> {
        self.write.as_ref()
    }

    pub fn is_read_open(&self) -> bool {
        self.read.is_some()
    }

    pub fn is_write_open(&self) -> bool {
        self.write.is_some()
    }

    /// Close the wrapper's read end. No-op if already closed.
    pub fn close_read(&mut self) {
        if let Some(fd) = self.read.take() {
            close_fd(fd, "pipe read end");
        }
    }

    /// Close the wrapper's write end. No-op if already closed.
    pub fn close_write(&mut self) {
        if let Some(fd) = self.write.take() {
            close_fd(fd, "pipe write end");
        }
    }

    pub fn close_all(&mut self) {
        self.close_write();
        self.close_read();
    }
}

/// Create the producer -> consumer pipe with the default OS buffer size.
pub fn create_pipe() -> Result<PipeEndpoints> {
    let (read, write) = new_cloexec_pipe()
        .map_err(|e| PipewrapError::PipeCreationFailed(e.to_string()))?;
    debug!(
        read = read.as_raw_fd(),
        write = write.as_raw_fd(),
        "created anonymous pipe"
    );
    Ok(PipeEndpoints {
        read: Some(read),
        write: Some(write),
    })
}

/// Build a decoy stdin: a pipe holding one sentinel byte, write end closed.
///
/// A child that insists on reading stdin sees one byte and then EOF instead
/// of blocking on a terminal forever.
pub fn decoy_input() -> Result<OwnedFd> {
    let (read, write) = new_cloexec_pipe()
        .map_err(|e| PipewrapError::PipeCreationFailed(e.to_string()))?;

    let mut writer = File::from(write);
    match writer.write_all(&[DECOY_SENTINEL]) {
        Ok(()) => info!("sent one zero byte into decoy child stdin"),
        Err(e) => warn!(error = %e, "failed to write sentinel byte into decoy child stdin"),
    }
    close_fd(OwnedFd::from(writer), "decoy write end");

    Ok(read)
}

fn new_cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

/// Close a descriptor, logging (never returning) a failure.
pub fn close_fd(fd: OwnedFd, what: &str) {
    let raw = fd.into_raw_fd();
    match nix::unistd::close(raw) {
        Ok(()) => debug!(fd = raw, what, "closed handle"),
        Err(e) => warn!(fd = raw, what, error = %e, "closing handle failed"),
    }
}

/// Result of waiting on the pipe's read end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeHealth {
    /// Data or end-of-stream is available.
    Ready,
    /// Nothing arrived within the probe window.
    Idle,
    /// The descriptor is invalid or reported an error.
    Invalid,
}

impl PipeHealth {
    /// Whether this result should stop the run early.
    pub fn is_unhealthy(self, strict: bool) -> bool {
        match self {
            PipeHealth::Ready => false,
            PipeHealth::Idle => strict,
            PipeHealth::Invalid => true,
        }
    }
}

/// Wait up to `timeout` for the read end to become readable. Blocking.
///
/// Heuristic only: the wrapper never reads payload bytes.
pub fn probe_readable(fd: &impl AsFd, timeout: Duration) -> PipeHealth {
    let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
    let timeout = PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX);
    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];

    match nix::poll::poll(&mut fds, timeout) {
        Ok(0) => PipeHealth::Idle,
        Ok(_) => {
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.intersects(PollFlags::POLLNVAL | PollFlags::POLLERR) {
                PipeHealth::Invalid
            } else {
                PipeHealth::Ready
            }
        }
        Err(e) => {
            warn!(error = %e, "polling pipe read end failed");
            PipeHealth::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn pipe_ends_are_close_on_exec() {
        let pipe = create_pipe().unwrap();
        for fd in [pipe.read_end().unwrap(), pipe.write_end().unwrap()] {
            let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
            assert!(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let mut pipe = create_pipe().unwrap();
        pipe.close_write();
        pipe.close_write();
        pipe.close_all();
        assert!(!pipe.is_read_open());
        assert!(!pipe.is_write_open());
    }

    #[test]
    fn decoy_yields_one_byte_then_eof() {
        let mut reader = File::from(decoy_input().unwrap());
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![DECOY_SENTINEL]);
    }

    #[test]
    fn empty_pipe_probes_idle_then_ready_after_write() {
        let pipe = create_pipe().unwrap();
        let read = pipe.read_end().unwrap();
        assert_eq!(probe_readable(read, Duration::from_millis(20)), PipeHealth::Idle);

        let mut writer = File::from(pipe.write_end().unwrap().try_clone().unwrap());
        writer.write_all(b"x").unwrap();
        assert_eq!(probe_readable(read, Duration::from_millis(20)), PipeHealth::Ready);
    }

    #[test]
    fn closed_writer_probes_ready() {
        let mut pipe = create_pipe().unwrap();
        pipe.close_write();
        let health = probe_readable(pipe.read_end().unwrap(), Duration::from_millis(20));
        assert_eq!(health, PipeHealth::Ready);
    }

    #[test]
    fn idle_is_only_unhealthy_when_strict() {
        assert!(!PipeHealth::Idle.is_unhealthy(false));
        assert!(PipeHealth::Idle.is_unhealthy(true));
        assert!(PipeHealth::Invalid.is_unhealthy(false));
        assert!(!PipeHealth::Ready.is_unhealthy(true));
    }
}
