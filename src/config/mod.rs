// src/config/mod.rs

//! Configuration loading and command resolution for pipewrap.
//!
//! Responsibilities:
//! - Define the JSON-backed per-executable model (`model.rs`).
//! - Load a profile's `producer.json` / `consumer.json` from disk (`loader.rs`).
//! - Turn configuration plus placeholder arguments into final command lines
//!   (`resolve.rs`).

pub mod loader;
pub mod model;
pub mod resolve;

pub use loader::{ProfileConfig, resolve_config_root};
pub use model::ExecutableSpec;
pub use resolve::{ResolvedCommands, resolve, resolve_commands, substitute_placeholders};
