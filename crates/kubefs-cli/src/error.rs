//! CLI error type with exit-code handling.

use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Option(String),

    #[error("mount failed: {0}")]
    Mount(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Option(_) => exit_codes::OPTION_ERROR,
            CliError::Mount(_) => exit_codes::MOUNT_ERROR,
        }
    }

    pub fn option(message: impl Into<String>) -> Self {
        CliError::Option(message.into())
    }

    pub fn mount(message: impl Into<String>) -> Self {
        CliError::Mount(message.into())
    }
}

impl From<kubefs_kube::KubeError> for CliError {
    fn from(err: kubefs_kube::KubeError) -> Self {
        CliError::Mount(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Mount(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
