use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pipewrap::exec::SupervisionTimings;
use pipewrap::types::Role;
use serde_json::{Map, Value};
use tempfile::TempDir;

/// Builder for an on-disk profile directory (`<root>/<profile>/<role>.json`).
///
/// The temporary root lives as long as the builder.
pub struct ProfileDirBuilder {
    root: TempDir,
    profile: String,
}

impl ProfileDirBuilder {
    pub fn new(profile: &str) -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp config root");
        fs::create_dir_all(root.path().join(profile)).expect("Failed to create profile dir");
        Self {
            root,
            profile: profile.to_string(),
        }
    }

    /// Write `<role>.json` with the given path and ordered params.
    pub fn with_executable(self, role: Role, path: &str, params: &[(&str, &str)]) -> Self {
        let mut params_obj = Map::new();
        for (flag, value) in params {
            params_obj.insert(flag.to_string(), Value::String(value.to_string()));
        }
        let mut doc = Map::new();
        doc.insert("path".into(), Value::String(path.to_string()));
        doc.insert("params".into(), Value::Object(params_obj));

        let contents =
            serde_json::to_string_pretty(&Value::Object(doc)).expect("Failed to encode profile");
        self.with_raw(role, &contents)
    }

    pub fn with_producer(self, path: &str, params: &[(&str, &str)]) -> Self {
        self.with_executable(Role::Producer, path, params)
    }

    pub fn with_consumer(self, path: &str, params: &[(&str, &str)]) -> Self {
        self.with_executable(Role::Consumer, path, params)
    }

    /// Write `<role>.json` verbatim, e.g. to test malformed input.
    pub fn with_raw(self, role: Role, contents: &str) -> Self {
        let path = self.profile_dir().join(format!("{}.json", role.name()));
        fs::write(&path, contents).expect("Failed to write executable config");
        self
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.root.path().join(&self.profile)
    }
}

/// Supervision timings scaled down so tests finish in well under a second.
pub fn fast_timings() -> SupervisionTimings {
    SupervisionTimings {
        health_probe: Duration::from_millis(100),
        pipe_probe: Duration::from_millis(50),
        poll_increment: Duration::from_millis(100),
        producer_grace: Duration::from_millis(100),
        consumer_grace: Duration::from_millis(150),
        producer_grace_on_consumer_failure: Duration::from_millis(100),
        progress_interval: Duration::from_secs(60),
    }
}
