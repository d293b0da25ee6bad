//! Error types shared across the crate

use thiserror::Error;

/// Failure of an external build-tool invocation
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// The program is not on PATH
    #[error("{program} is not installed")]
    NotFound { program: String },

    /// The program ran but exited with a non-zero status
    ///
    /// Whatever was captured on stdout is kept so builders can still
    /// parse partial output.
    #[error("`{command}` exited with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Spawning or reading from the child process failed
    #[error("failed to run `{command}`: {message}")]
    Io { command: String, message: String },
}

impl CommandError {
    /// Stdout captured before the failure, if any
    pub fn partial_stdout(&self) -> Option<&str> {
        match self {
            CommandError::Failed { stdout, .. } if !stdout.trim().is_empty() => Some(stdout),
            _ => None,
        }
    }
}

/// Marker attached to a project root that could not be fully built
///
/// Builders never return these as errors. They are stored on the root
/// node so the project stays visible even when it could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("dependencies are not installed: {0}")]
    NotInstalled(String),
    #[error("could not parse build tool output: {0}")]
    ParseError(String),
}

/// Errors surfaced by a workspace refresh
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a workspace scan is already in progress")]
    AlreadyInProgress,

    /// User-triggered cancellation; not reported as a failure
    #[error("scan cancelled")]
    Cancelled,

    #[error("remote scan failed: {0}")]
    Remote(#[source] anyhow::Error),
}

impl ScanError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }
}
