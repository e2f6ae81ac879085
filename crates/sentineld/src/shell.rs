//! External command execution for the neighbor table sources.
//!
//! Commands are spawned directly (no `/bin/sh -c`), so arguments coming from
//! the configuration file are never interpreted by a shell.
//!
//! # Example
//!
//! ```ignore
//! use sentineld::shell;
//!
//! let result = shell::exec("arp", &["-an".to_string()]).await?;
//! if result.success() {
//!     println!("{}", result.stdout);
//! }
//! ```

use std::process::Stdio;
use tokio::process::Command;

use crate::error::{Result, SentinelError};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success, -1 = killed by signal).
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Renders a program and its arguments for log and error messages.
pub fn display_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Executes a command asynchronously and captures its output.
///
/// # Returns
///
/// * `Ok(ExecResult)` - The command ran (successfully or not)
/// * `Err(SentinelError::ShellExec)` - The command could not be spawned
pub async fn exec(program: &str, args: &[String]) -> Result<ExecResult> {
    let command = display_command(program, args);
    tracing::debug!(command = %command, "Executing command");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SentinelError::ShellExec {
            command: command.clone(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %command, "Command succeeded");
    } else {
        tracing::warn!(
            command = %command,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a command and returns its stdout, failing on non-zero exit.
pub async fn exec_checked(program: &str, args: &[String]) -> Result<String> {
    let result = exec(program, args).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(SentinelError::CommandFailed {
            command: display_command(program, args),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}
