// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`pipe`] creates the producer -> consumer pipe and the decoy input, and
//!   probes the pipe's read end.
//! - [`descriptor`] holds one child's command line, stdio wiring and exit.
//! - [`launcher`] provides the `ProcessLauncher` trait and the production
//!   `SystemLauncher`, which tests can replace with a fake implementation.
//! - [`executor`] owns one run: spawn order, supervision loop, termination
//!   and reconciliation.

pub mod descriptor;
pub mod executor;
pub mod launcher;
pub mod pipe;

pub use descriptor::{ProcessDescriptor, StdioBinding, TerminationPath};
pub use executor::{PipelineExecutor, PipelineState, SupervisionTimings};
pub use launcher::{ChildStdio, ChildStream, ProcessLauncher, SupervisedChild, SystemLauncher};
pub use pipe::{PipeEndpoints, PipeHealth, create_pipe, decoy_input};
