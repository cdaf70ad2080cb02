//! Shell command execution.
//!
//! Every external step of the build (patches, `bin/magento`, composer, the
//! static content fan-out) goes through a [`CommandRunner`]. The production
//! runner is [`ShellRunner`]; tests substitute a recording double.
//!
//! # Logging contract
//!
//! `execute` writes exactly three build log lines per invocation, whether or
//! not the command succeeds:
//!
//! ```text
//! Command:<command>
//! Status:<exit status>
//! Output:[<captured stdout lines>]
//! ```

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::build_log::BuildLog;
use crate::error::{BuildError, Result};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};

/// Runs shell commands on behalf of the pipeline
pub trait CommandRunner {
    /// Run `command` to completion and return its stdout lines.
    ///
    /// Non-zero exit is `BuildError::CommandFailed` carrying the status.
    fn execute(&mut self, command: &str) -> Result<Vec<String>>;

    /// Start `command` detached and return immediately. Output is discarded,
    /// the exit status is never observed, and spawn failures are only logged.
    fn background_execute(&mut self, command: &str);
}

/// `bash -c` runner rooted at the deployment directory
#[derive(Debug, Clone)]
pub struct ShellRunner {
    workdir: PathBuf,
    log: BuildLog,
}

impl ShellRunner {
    pub fn new(workdir: impl Into<PathBuf>, log: BuildLog) -> Self {
        Self {
            workdir: workdir.into(),
            log,
        }
    }

    fn log_result(&self, status: Option<i32>, output: &[String]) {
        match status {
            Some(code) => self.log.log(format!("Status:{code}")),
            None => self.log.log("Status:terminated by signal"),
        }
        self.log.log(format!("Output:{output:?}"));
    }
}

impl CommandRunner for ShellRunner {
    fn execute(&mut self, command: &str) -> Result<Vec<String>> {
        self.log.log(format!("Command:{command}"));

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .in_new_process_group()
            .spawn()
            .map_err(|source| {
                self.log_result(None, &[]);
                BuildError::Spawn {
                    command: command.to_string(),
                    source,
                }
            })?;
        let pid = child.id();
        ChildRegistry::lock_global().register(pid, command);

        let mut output = Vec::new();
        let mut read_error = None;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => output.push(line),
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                }
            }
        }

        // Always reap the child, even if reading its output failed
        let waited = child.wait();
        ChildRegistry::lock_global().unregister(pid);

        let status = match waited {
            Ok(status) => status,
            Err(source) => {
                self.log_result(None, &output);
                return Err(BuildError::Spawn {
                    command: command.to_string(),
                    source,
                });
            }
        };

        let code = status.code();
        self.log_result(code, &output);

        if let Some(e) = read_error {
            tracing::warn!("Output of `{}` was cut short: {}", command, e);
        }

        if status.success() {
            Ok(output)
        } else {
            Err(BuildError::CommandFailed {
                command: command.to_string(),
                status: code,
            })
        }
    }

    fn background_execute(&mut self, command: &str) {
        self.log
            .log(format!("Execute command in background: nohup {command} 1>/dev/null 2>&1 &"));

        let spawned = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .detached()
            .spawn();

        match spawned {
            Ok(child) => tracing::debug!("Background command started as PID {}", child.id()),
            Err(e) => tracing::warn!("Failed to start background command `{}`: {}", command, e),
        }
    }
}

/// Quote `value` for safe interpolation into a `bash -c` string
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,@%+".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
