// src/signal/mod.rs

//! Cancellation plumbing.
//!
//! - [`shutdown`] holds the run's shutdown flag behind the shared lock. It is
//!   created once per process and handed to everything that reads or sets it.
//! - [`bridge`] turns OS termination signals into shutdown requests. It runs
//!   on its own Tokio task and never touches child processes directly.

pub mod bridge;
pub mod shutdown;

pub use bridge::spawn_signal_bridge;
pub use shutdown::{ShutdownHandle, ShutdownReason};
