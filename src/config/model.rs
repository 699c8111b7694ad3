// src/config/model.rs

use serde::{Deserialize, Deserializer};

/// One executable's configuration, as read from `<role>.json`.
///
/// ```json
/// {
///   "path": "/opt/tools/qaac",
///   "params": {
///     "--tvbr": "127",
///     "-o": "%2",
///     "-": ""
///   }
/// }
/// ```
///
/// `params` keeps file order: each entry becomes `flag` followed by the
/// value (if non-empty) on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutableSpec {
    pub path: String,

    #[serde(default, deserialize_with = "ordered_params")]
    pub params: Vec<(String, String)>,
}

impl ExecutableSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((flag.into(), value.into()));
        self
    }
}

fn ordered_params<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(flag, value)| match value {
            serde_json::Value::String(s) => Ok((flag, s)),
            other => Err(serde::de::Error::custom(format!(
                "param '{flag}' must be a string, got {other}"
            ))),
        })
        .collect()
}
