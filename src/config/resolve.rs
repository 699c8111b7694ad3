// src/config/resolve.rs

//! Command resolution: configuration + placeholder arguments -> command lines.
//!
//! Pure functions, no OS interaction. The only IO happens in
//! [`resolve_commands`], which loads the profile unless the direct-pipe
//! profile was requested.

use std::borrow::Cow;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::config::loader::{ProfileConfig, resolve_config_root};
use crate::config::model::ExecutableSpec;
use crate::errors::{PipewrapError, Result};
use crate::types::{NULL_PROFILE_NAME, Role, RunConfig};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%(\d+)").expect("placeholder pattern is a valid regex")
});

/// Replace every `%i` (1-indexed) with the i-th positional argument.
///
/// Tokens with no matching argument (`%0`, or `%3` with two arguments) are
/// left as written.
pub fn substitute_placeholders<'a>(value: &'a str, args: &[String]) -> Cow<'a, str> {
    PLACEHOLDER.replace_all(value, |caps: &Captures<'_>| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| args.get(index))
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    })
}

/// Build the command line for one executable spec.
pub fn command_line(spec: &ExecutableSpec, args: &[String]) -> String {
    let mut line = spec.path.clone();
    for (flag, value) in &spec.params {
        line.push(' ');
        line.push_str(flag);
        if !value.is_empty() {
            line.push(' ');
            line.push_str(&substitute_placeholders(value, args));
        }
    }
    line
}

/// Resolve the command line of `role` from a loaded profile.
///
/// A missing consumer config is fatal ([`PipewrapError::ConfigurationMissing`]);
/// a missing producer config yields [`PipewrapError::RequestedConfigurationAbsent`].
pub fn resolve(role: Role, run: &RunConfig, profile: &ProfileConfig) -> Result<String> {
    if role == Role::Consumer && !profile.config_exists(Role::Consumer) {
        return Err(PipewrapError::ConfigurationMissing(Role::Consumer));
    }
    let spec = profile.get(role)?;
    Ok(command_line(spec, &run.positional_args))
}

/// Command lines for one run. Pipe mode is active iff `producer` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommands {
    pub producer: Option<String>,
    pub consumer: String,
}

impl ResolvedCommands {
    pub fn pipe_mode(&self) -> bool {
        self.producer.is_some()
    }

    /// Direct-pipe form: the two positional arguments are the command lines.
    pub fn direct_pipe(args: &[String]) -> Result<Self> {
        match args {
            [producer, consumer] if !producer.is_empty() && !consumer.is_empty() => Ok(Self {
                producer: Some(producer.clone()),
                consumer: consumer.clone(),
            }),
            [_, _] => Err(PipewrapError::InvalidArguments(format!(
                "'{NULL_PROFILE_NAME}' profile requires two non-empty command lines"
            ))),
            _ => Err(PipewrapError::InvalidArguments(format!(
                "'{NULL_PROFILE_NAME}' profile requires exactly two arguments, got {}",
                args.len()
            ))),
        }
    }

    /// Resolve from a loaded profile.
    pub fn from_profile(run: &RunConfig, profile: &ProfileConfig) -> Result<Self> {
        let consumer = resolve(Role::Consumer, run, profile)?;
        let producer = if profile.config_exists(Role::Producer) {
            Some(resolve(Role::Producer, run, profile)?)
        } else {
            None
        };
        Ok(Self { producer, consumer })
    }
}

/// Resolve both command lines for a run.
///
/// The profile directory is only looked up when a real profile is used;
/// `config_dir` overrides the default lookup (see [`resolve_config_root`]).
pub fn resolve_commands(run: &RunConfig, config_dir: Option<&Path>) -> Result<ResolvedCommands> {
    let commands = if run.is_direct_pipe() {
        ResolvedCommands::direct_pipe(&run.positional_args)?
    } else {
        let root = resolve_config_root(config_dir)?;
        let profile = ProfileConfig::load(root, &run.profile_name)?;
        ResolvedCommands::from_profile(run, &profile)?
    };
    debug!(pipe_mode = commands.pipe_mode(), "resolved command lines");
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn substitutes_positional_arguments() {
        let out = substitute_placeholders("-i %1 -o %2", &args(&["in.wav", "out.wav"]));
        assert_eq!(out, "-i in.wav -o out.wav");
    }

    #[test]
    fn unmatched_tokens_stay_literal() {
        let out = substitute_placeholders("%1 %3 %0", &args(&["a", "b"]));
        assert_eq!(out, "a %3 %0");
    }

    #[test]
    fn multi_digit_tokens_are_not_split() {
        let out = substitute_placeholders("%10", &args(&["one"]));
        assert_eq!(out, "%10");
    }

    #[test]
    fn command_line_skips_empty_values() {
        let spec = ExecutableSpec::new("qaac")
            .param("--tvbr", "127")
            .param("-", "")
            .param("-o", "%1");
        assert_eq!(
            command_line(&spec, &args(&["out.m4a"])),
            "qaac --tvbr 127 - -o out.m4a"
        );
    }

    #[test]
    fn missing_consumer_is_configuration_missing() {
        let profile =
            ProfileConfig::from_specs("p", [(Role::Producer, ExecutableSpec::new("dec"))]);
        let err = ResolvedCommands::from_profile(&RunConfig::new("p"), &profile).unwrap_err();
        assert!(matches!(err, PipewrapError::ConfigurationMissing(Role::Consumer)));
    }

    #[test]
    fn producer_config_enables_pipe_mode() {
        let profile = ProfileConfig::from_specs(
            "p",
            [
                (Role::Producer, ExecutableSpec::new("dec").param("-i", "%1")),
                (Role::Consumer, ExecutableSpec::new("enc")),
            ],
        );
        let run = RunConfig::new("p").with_args(["x.flac"]);
        let cmds = ResolvedCommands::from_profile(&run, &profile).unwrap();
        assert!(cmds.pipe_mode());
        assert_eq!(cmds.producer.as_deref(), Some("dec -i x.flac"));
        assert_eq!(cmds.consumer, "enc");
    }

    #[test]
    fn direct_pipe_uses_arguments_verbatim() {
        let cmds = ResolvedCommands::direct_pipe(&args(&["gen --n %1", "sink -"])).unwrap();
        assert_eq!(cmds.producer.as_deref(), Some("gen --n %1"));
        assert_eq!(cmds.consumer, "sink -");
    }

    #[test]
    fn direct_pipe_rejects_bad_argument_lists() {
        for bad in [args(&[]), args(&["only"]), args(&["a", ""]), args(&["a", "b", "c"])] {
            let err = ResolvedCommands::direct_pipe(&bad).unwrap_err();
            assert_eq!(err.exit_code(), crate::types::INVALID_ARGUMENTS);
        }
    }

    proptest! {
        #[test]
        fn tokens_beyond_argument_count_are_untouched(n in 3usize..50, extra in "[a-z ]{0,8}") {
            let value = format!("{extra}%{n}");
            let out = substitute_placeholders(&value, &args(&["a", "b"]));
            prop_assert_eq!(out.into_owned(), value);
        }

        #[test]
        fn text_without_percent_is_unchanged(value in "[^%]{0,32}") {
            let out = substitute_placeholders(&value, &args(&["x"]));
            prop_assert_eq!(out.into_owned(), value);
        }
    }
}
