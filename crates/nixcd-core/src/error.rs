use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("command '{command}' could not be run: {source}")]
    ToolSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command '{command}' fails with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    ToolFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command '{command}' timed out after {}s and was killed", .timeout.as_secs())]
    ToolTimeout { command: String, timeout: Duration },

    #[error("command '{command}' returned unparseable output: {source}")]
    ToolOutput {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no derivation returned for '{installable}'")]
    DerivationNotFound { installable: String },

    #[error(
        "skip deployment because the expected machine id '{expected}' is not equal to the actual machine id '{actual}'"
    )]
    IdentityMismatch { expected: String, actual: String },

    #[error("can not read machine id file '{}': {source}", .path.display())]
    IdentityRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem operation on '{}' failed: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown operation '{0}': expected switch, boot, test or dry-activate")]
    UnknownOperation(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DeployError>;

/// Coarse classification reported in status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ToolInvocation,
    IdentityMismatch,
    IdentityRead,
    Filesystem,
    Config,
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::ToolSpawn { .. }
            | DeployError::ToolFailed { .. }
            | DeployError::ToolTimeout { .. }
            | DeployError::ToolOutput { .. }
            | DeployError::DerivationNotFound { .. } => ErrorKind::ToolInvocation,
            DeployError::IdentityMismatch { .. } => ErrorKind::IdentityMismatch,
            DeployError::IdentityRead { .. } => ErrorKind::IdentityRead,
            DeployError::Filesystem { .. } => ErrorKind::Filesystem,
            DeployError::InvalidConfig(_)
            | DeployError::UnknownOperation(_)
            | DeployError::Yaml(_)
            | DeployError::Json(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit status {c}"),
        None => "termination by signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
