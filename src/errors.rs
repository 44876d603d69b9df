// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Supervision results never travel through this type: `exec_command_blocking`
//! and `run_until_file_deployed` fold their failures into `ExecResult`. These
//! errors cover everything that has to succeed before a backend exists
//! (config, session setup) and the collaborators around it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("Test results check failed: {0}")]
    ResultsError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TargetError>;
