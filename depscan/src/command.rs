//! Build-tool invocation
//!
//! Builders never spawn processes themselves. They describe the commands
//! they need and a [`CommandRunner`] executes them, which keeps every
//! parser testable against canned output.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::CommandError;

/// Executes external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args...` in `cwd` and return its stdout
    ///
    /// A non-zero exit yields [`CommandError::Failed`] with whatever was
    /// captured on stdout and stderr.
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<String, CommandError>;

    /// Check that a program is installed by running a cheap version command
    async fn probe(&self, program: &str, args: &[&str]) -> bool {
        let cwd = std::env::temp_dir();
        self.run(program, args, &cwd).await.is_ok()
    }
}

/// Render a command line for logs and error messages
pub fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Runs commands with `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<String, CommandError> {
        let command = display_command(program, args);
        tracing::debug!(command = %command, cwd = %cwd.display(), "Running build tool");

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CommandError::NotFound {
                    program: program.to_string(),
                },
                _ => CommandError::Io {
                    command: command.clone(),
                    message: e.to_string(),
                },
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(CommandError::Failed {
                command,
                code: output.status.code(),
                stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}
