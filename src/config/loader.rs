// src/config/loader.rs

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::model::ExecutableSpec;
use crate::errors::{PipewrapError, Result};
use crate::types::Role;

/// Environment variable overriding the directory that holds profiles.
pub const CONFIG_DIR_ENV: &str = "PIPEWRAP_CONFIG_DIR";

/// All executable configs found for one profile.
///
/// Both role files are read eagerly. A missing file means "no config for that
/// role"; an unreadable or malformed file is an error.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    profile: String,
    specs: BTreeMap<Role, ExecutableSpec>,
}

impl ProfileConfig {
    /// Load `<root>/<profile>/<role>.json` for every role.
    pub fn load(root: impl AsRef<Path>, profile: &str) -> Result<Self> {
        let dir = root.as_ref().join(profile);
        info!(path = %dir.display(), "reading configuration");

        let mut specs = BTreeMap::new();
        for role in Role::ALL {
            let path = dir.join(format!("{}.json", role.name()));
            if let Some(spec) = load_spec(&path, role)? {
                specs.insert(role, spec);
            }
        }

        Ok(Self {
            profile: profile.to_string(),
            specs,
        })
    }

    /// Build a profile from in-memory specs.
    pub fn from_specs(
        profile: impl Into<String>,
        specs: impl IntoIterator<Item = (Role, ExecutableSpec)>,
    ) -> Self {
        Self {
            profile: profile.into(),
            specs: specs.into_iter().collect(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn config_exists(&self, role: Role) -> bool {
        self.specs.contains_key(&role)
    }

    pub fn get(&self, role: Role) -> Result<&ExecutableSpec> {
        self.specs
            .get(&role)
            .ok_or(PipewrapError::RequestedConfigurationAbsent(role))
    }
}

fn load_spec(path: &Path, role: Role) -> Result<Option<ExecutableSpec>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(%role, path = %path.display(), "command line configuration is absent");
            return Ok(None);
        }
        Err(source) => {
            return Err(PipewrapError::ConfigRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let spec = serde_json::from_str::<ExecutableSpec>(&contents).map_err(|source| {
        PipewrapError::ConfigDeserialization {
            path: path.to_path_buf(),
            source,
        }
    })?;

    Ok(Some(spec))
}

/// Directory that holds the profile directories.
///
/// Priority: explicit CLI value, then `PIPEWRAP_CONFIG_DIR`, then the
/// directory of the running executable.
pub fn resolve_config_root(cli_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = cli_dir {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let exe = std::env::current_exe()
        .map_err(|e| PipewrapError::ExecutableDirectory(e.to_string()))?;
    let dir = exe
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| PipewrapError::ExecutableDirectory(format!("{exe:?} has no parent")))?;
    info!(dir = %dir.display(), "identified executable directory");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn loads_both_roles() {
        let root = tempfile::tempdir().unwrap();
        let profile = root.path().join("aac");
        write(&profile, "producer.json", r#"{"path": "dec", "params": {}}"#);
        write(&profile, "consumer.json", r#"{"path": "enc", "params": {"-o": "%1"}}"#);

        let cfg = ProfileConfig::load(root.path(), "aac").unwrap();
        assert!(cfg.config_exists(Role::Producer));
        assert_eq!(cfg.get(Role::Consumer).unwrap().path, "enc");
    }

    #[test]
    fn missing_producer_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("solo"), "consumer.json", r#"{"path": "enc"}"#);

        let cfg = ProfileConfig::load(root.path(), "solo").unwrap();
        assert!(!cfg.config_exists(Role::Producer));
        assert!(matches!(
            cfg.get(Role::Producer),
            Err(PipewrapError::RequestedConfigurationAbsent(Role::Producer))
        ));
    }

    #[test]
    fn malformed_json_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("bad"), "consumer.json", "{ path: ");

        let err = ProfileConfig::load(root.path(), "bad").unwrap_err();
        assert!(matches!(err, PipewrapError::ConfigDeserialization { .. }));
        assert_eq!(err.exit_code(), crate::types::DESERIALIZATION_JSON_FAILED);
    }

    #[test]
    fn explicit_config_root_wins() {
        let dir = PathBuf::from("/opt/profiles");
        assert_eq!(resolve_config_root(Some(&dir)).unwrap(), dir);
    }
}
