//! External command execution.
//!
//! Every OS interaction goes through [`CommandRunner`], so the ports can
//! be exercised without touching the host.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{CommandError, CommandResult};

/// Output of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

impl CommandOutput {
    /// Turn a non-zero exit into [`CommandError::Exit`].
    pub fn check(self, program: &str) -> CommandResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(CommandError::Exit {
                program: program.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs an argv vector, optionally feeding `stdin`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], stdin: Option<&str>) -> CommandResult<CommandOutput>;
}

/// Real runner backed by `tokio::process`.
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, argv: &[String], stdin: Option<&str>) -> CommandResult<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CommandError::Empty(argv.join(" ")))?;
        let spawn_err = |source| CommandError::Spawn {
            program: program.clone(),
            source,
        };

        debug!(%program, ?args, "running command");
        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes()).await.map_err(spawn_err)?;
            // Close stdin so the child sees EOF.
            drop(pipe);
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output.map_err(spawn_err)?.into()),
            Err(_) => Err(CommandError::Timeout {
                program: program.clone(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}
