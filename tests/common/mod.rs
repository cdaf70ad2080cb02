//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use magecloud_build::build_log::{BuildLog, LogCapture};
use magecloud_build::environment::{Environment, VARIABLES_ENV, encode_json};
use magecloud_build::error::{BuildError, Result};
use magecloud_build::shell::CommandRunner;
use magecloud_build::{Build, BuildProgress};
use serde_json::Value;
use tempfile::TempDir;

/// Command runner double: records every command, answers from a script and
/// fails on request. Nothing is executed.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub commands: Vec<String>,
    pub background: Vec<String>,
    responses: Vec<(String, Vec<String>)>,
    failures: Vec<(String, i32)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `needle` with `output`
    pub fn respond(mut self, needle: &str, output: &str) -> Self {
        self.responses.push((
            needle.to_string(),
            output.lines().map(str::to_string).collect(),
        ));
        self
    }

    /// Fail commands containing `needle` with `status`
    pub fn fail_on(mut self, needle: &str, status: i32) -> Self {
        self.failures.push((needle.to_string(), status));
        self
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.contains(needle))
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.position(needle).is_some()
    }
}

impl CommandRunner for RecordingRunner {
    fn execute(&mut self, command: &str) -> Result<Vec<String>> {
        self.commands.push(command.to_string());

        if let Some((_, status)) = self.failures.iter().find(|(n, _)| command.contains(n)) {
            return Err(BuildError::CommandFailed {
                command: command.to_string(),
                status: Some(*status),
            });
        }
        Ok(self
            .responses
            .iter()
            .find(|(n, _)| command.contains(n))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }

    fn background_execute(&mut self, command: &str) {
        self.background.push(command.to_string());
    }
}

/// A checked-out codebase in a temporary directory
pub struct Project {
    pub dir: TempDir,
    vars: Vec<(String, String)>,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            vars: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` at `relative`, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    pub fn is_empty_dir(&self, relative: &str) -> bool {
        let path = self.root().join(relative);
        path.is_dir() && fs::read_dir(path).unwrap().next().is_none()
    }

    /// Set the project's custom variables
    pub fn variables(mut self, variables: Value) -> Self {
        self.vars.push((VARIABLES_ENV.to_string(), encode_json(&variables)));
        self
    }

    pub fn env_var(mut self, name: &str, value: &str) -> Self {
        self.vars.push((name.to_string(), value.to_string()));
        self
    }

    pub fn environment(&self) -> Environment {
        Environment::with_vars(self.root(), self.vars.clone())
    }

    /// Run the whole pipeline with `runner`
    pub fn build(&self, runner: RecordingRunner) -> BuildOutcome {
        let (log, capture) = BuildLog::capture();
        let mut build = Build::new(self.environment(), runner, log);
        let result = build.run();
        let progress = build.progress().clone();
        BuildOutcome {
            result,
            progress,
            runner: build.into_runner(),
            log: capture,
        }
    }
}

pub struct BuildOutcome {
    pub result: Result<()>,
    pub progress: BuildProgress,
    pub runner: RecordingRunner,
    pub log: LogCapture,
}

/// Snapshot with two websites, one store view and a German default locale
pub const STORE_CONFIG_JSON: &str = r#"{
  "modules": {"Magento_Store": 1, "Magento_Theme": 1},
  "scopes": {
    "websites": {"admin": {"code": "admin"}, "base": {"code": "base"}},
    "stores": {"default": {"code": "default"}}
  },
  "system": {"default": {"general": {"locale": {"code": "de_DE"}}}}
}"#;

/// Snapshot with modules but no website/store scopes
pub const NO_SCOPES_CONFIG_JSON: &str = r#"{"modules": {"Magento_Store": 1}}"#;

/// Runner that dumps `config_json` when the snapshot is loaded through php
pub fn runner_with_config(config_json: &str) -> RecordingRunner {
    RecordingRunner::new().respond("php -r", config_json)
}
