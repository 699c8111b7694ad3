// src/console.rs

//! Interactive stdin handling.
//!
//! When the wrapper is started from a terminal its stdin is a TTY. Children
//! that read stdin would then block on keyboard input, so the wrapper points
//! its own fd 0 at `/dev/null` and hands children a decoy input instead.

use std::fs::File;
use std::io::IsTerminal;
use std::os::fd::AsRawFd;

use nix::libc::STDIN_FILENO;
use tracing::{info, warn};

use crate::errors::{PipewrapError, Result};

const NULL_DEVICE: &str = "/dev/null";

/// Detect an interactive session and detach stdin if so.
///
/// Returns whether the session is interactive.
pub fn prepare_stdin() -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(false);
    }

    detach_stdin()?;
    warn!(
        "pipewrap runs in a text terminal and expects binary pipe data exchange only; \
         stdin is redirected to {NULL_DEVICE} for this process and its children"
    );
    Ok(true)
}

/// Re-point fd 0 at the null device.
pub fn detach_stdin() -> Result<()> {
    let null = File::open(NULL_DEVICE)
        .map_err(|e| PipewrapError::ConsoleSetup(format!("could not open {NULL_DEVICE}: {e}")))?;

    nix::unistd::dup2(null.as_raw_fd(), STDIN_FILENO)
        .map_err(|e| PipewrapError::ConsoleSetup(format!("attaching stdin to {NULL_DEVICE}: {e}")))?;

    info!("stdin successfully redirected to {NULL_DEVICE}");
    Ok(())
}
