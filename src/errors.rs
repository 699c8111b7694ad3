// src/errors.rs

//! Crate-wide error type and exit-code mapping.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{
    CANNOT_GET_EXECUTABLE_DIRECTORY, CONFIGURATION_CONSUMER_ABSENT, CONSUMER_CREATION_FAILED,
    CREATE_EXECUTABLE_LOGGER_FAILED, CREATE_MAIN_LOGGER_FAILED, CREATE_PIPE_FAILED,
    DESERIALIZATION_JSON_FAILED, ERROR_SETUP_CONSOLE_STATE, EXECUTABLE_STATE_ERROR, GENERAL_ERROR,
    INVALID_ARGUMENTS, PRODUCER_CREATION_FAILED, REQUESTED_CONFIGURATION_ABSENT, Role,
};

#[derive(Error, Debug)]
pub enum PipewrapError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Configuration for {0} is absent")]
    RequestedConfigurationAbsent(Role),

    #[error("{0} configuration is mandatory but was not found")]
    ConfigurationMissing(Role),

    #[error("Cannot read configuration {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration {path:?}: {source}")]
    ConfigDeserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot determine executable directory: {0}")]
    ExecutableDirectory(String),

    #[error("Failed to create main logger: {0}")]
    MainLoggerFailed(String),

    #[error("Failed to create error log for {role}: {source}")]
    ExecutableLoggerFailed {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    #[error("Create pipe failed: {0}")]
    PipeCreationFailed(String),

    #[error("Create PRODUCER failed: {0}")]
    ProducerSpawnFailed(String),

    #[error("Create CONSUMER failed: {0}")]
    ConsumerSpawnFailed(String),

    #[error("Console setup failed: {0}")]
    ConsoleSetup(String),

    #[error("Unexpected state of executable {role}: {message}")]
    ExecutableState { role: Role, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipewrapError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipewrapError::InvalidArguments(_) => INVALID_ARGUMENTS,
            PipewrapError::RequestedConfigurationAbsent(_) => REQUESTED_CONFIGURATION_ABSENT,
            PipewrapError::ConfigurationMissing(_) => CONFIGURATION_CONSUMER_ABSENT,
            PipewrapError::ConfigRead { .. } | PipewrapError::ConfigDeserialization { .. } => {
                DESERIALIZATION_JSON_FAILED
            }
            PipewrapError::ExecutableDirectory(_) => CANNOT_GET_EXECUTABLE_DIRECTORY,
            PipewrapError::MainLoggerFailed(_) => CREATE_MAIN_LOGGER_FAILED,
            PipewrapError::ExecutableLoggerFailed { .. } => CREATE_EXECUTABLE_LOGGER_FAILED,
            PipewrapError::PipeCreationFailed(_) => CREATE_PIPE_FAILED,
            PipewrapError::ProducerSpawnFailed(_) => PRODUCER_CREATION_FAILED,
            PipewrapError::ConsumerSpawnFailed(_) => CONSUMER_CREATION_FAILED,
            PipewrapError::ConsoleSetup(_) => ERROR_SETUP_CONSOLE_STATE,
            PipewrapError::ExecutableState { .. } => EXECUTABLE_STATE_ERROR,
            PipewrapError::Other(_) => GENERAL_ERROR,
        }
    }

    /// Errors without a dedicated exit code get full diagnostic logging.
    pub fn is_unexpected(&self) -> bool {
        self.exit_code() == GENERAL_ERROR
    }
}

pub type Result<T> = std::result::Result<T, PipewrapError>;
