//! Run parameters derived from platform variables and the raw environment.

use serde_json::Value;
use std::fmt;

use crate::environment::{Environment, PlatformVariables};
use crate::error::Result;
use crate::options::split_list;

pub const CLEAN_STATIC_FILES: &str = "CLEAN_STATIC_FILES";
pub const STATIC_CONTENT_STASH_LOCATION: &str = "STATIC_CONTENT_STASH_LOCATION";
pub const STATIC_CONTENT_EXCLUDE_THEMES: &str = "STATIC_CONTENT_EXCLUDE_THEMES";
pub const STATIC_CONTENT_THREADS: &str = "STATIC_CONTENT_THREADS";
pub const VERBOSE_COMMANDS: &str = "VERBOSE_COMMANDS";
pub const PLATFORM_MODE: &str = "PLATFORM_MODE";

/// Threads used on enterprise (dedicated) infrastructure
pub const ENTERPRISE_THREADS: u32 = 3;
/// Threads used everywhere else
pub const DEFAULT_THREADS: u32 = 1;

/// Which input decided the static deploy thread count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSource {
    CustomVariable,
    ProcessEnvironment,
    EnterpriseMode,
    Default,
}

/// Parameters of one build run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    /// Remove stale static view files before generating new ones
    pub clean_static_files: bool,
    /// Where the platform stashes static content between deploys
    pub static_content_stash: Option<String>,
    pub excluded_themes: Vec<String>,
    pub static_deploy_threads: u32,
    pub thread_source: ThreadSource,
    /// Pass `-vv` to `bin/magento`
    pub verbose: bool,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            clean_static_files: true,
            static_content_stash: None,
            excluded_themes: Vec::new(),
            static_deploy_threads: DEFAULT_THREADS,
            thread_source: ThreadSource::Default,
            verbose: false,
        }
    }
}

impl RunParameters {
    /// Decode `PLATFORM_VARIABLES` and derive the parameters
    pub fn load(env: &Environment) -> Result<Self> {
        let variables = env.variables()?;
        Ok(Self::derive(&variables, env))
    }

    pub fn derive(variables: &PlatformVariables, env: &Environment) -> Self {
        let (static_deploy_threads, thread_source) = resolve_threads(variables, env);

        Self {
            clean_static_files: variable_str(variables, CLEAN_STATIC_FILES).as_deref()
                != Some("disabled"),
            static_content_stash: variable_str(variables, STATIC_CONTENT_STASH_LOCATION)
                .filter(|s| !s.is_empty()),
            excluded_themes: variable_str(variables, STATIC_CONTENT_EXCLUDE_THEMES)
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            static_deploy_threads,
            thread_source,
            verbose: variable_str(variables, VERBOSE_COMMANDS).as_deref() == Some("enabled"),
        }
    }

    /// Verbosity flag appended to `bin/magento` commands
    pub fn verbosity_flag(&self) -> Option<&'static str> {
        self.verbose.then_some("-vv")
    }
}

impl fmt::Display for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "clean_static_files={} stash={} exclude_themes=[{}] threads={} ({:?}) verbose={}",
            self.clean_static_files,
            self.static_content_stash.as_deref().unwrap_or("-"),
            self.excluded_themes.join(","),
            self.static_deploy_threads,
            self.thread_source,
            self.verbose
        )
    }
}

/// Custom variable > process variable > enterprise mode (3) > 1.
/// A level whose value is not a non-negative integer is skipped.
fn resolve_threads(variables: &PlatformVariables, env: &Environment) -> (u32, ThreadSource) {
    if let Some(raw) = variables.get(STATIC_CONTENT_THREADS) {
        match value_as_threads(raw) {
            Some(n) => return (n, ThreadSource::CustomVariable),
            None => tracing::warn!(
                "Ignoring custom variable {}={} (not a thread count)",
                STATIC_CONTENT_THREADS,
                raw
            ),
        }
    }

    if let Some(raw) = env.var(STATIC_CONTENT_THREADS) {
        match raw.trim().parse() {
            Ok(n) => return (n, ThreadSource::ProcessEnvironment),
            Err(_) => tracing::warn!(
                "Ignoring environment {}={:?} (not a thread count)",
                STATIC_CONTENT_THREADS,
                raw
            ),
        }
    }

    if env.var(PLATFORM_MODE) == Some("enterprise") {
        return (ENTERPRISE_THREADS, ThreadSource::EnterpriseMode);
    }

    (DEFAULT_THREADS, ThreadSource::Default)
}

fn value_as_threads(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String form of a scalar custom variable
fn variable_str(variables: &PlatformVariables, name: &str) -> Option<String> {
    match variables.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
