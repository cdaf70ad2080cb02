//! Build options read from `build_options.ini` at the deployment root.
//!
//! The file is optional and every key has a default, so a project that never
//! creates it gets the full build. Values are validated when the file is
//! loaded rather than when a stage first looks at them.

use ini::Ini;
use std::fs;
use std::path::Path;

use crate::error::{BuildError, IoContext, Result};

/// File name of the options file, relative to the deployment root
pub const OPTIONS_FILE: &str = "build_options.ini";

pub const SKIP_DI_COMPILATION: &str = "skip_di_compilation";
pub const SKIP_DI_CLEARING: &str = "skip_di_clearing";
pub const EXCLUDE_THEMES: &str = "exclude_themes";
pub const SCD_THREADS: &str = "scd_threads";
pub const SKIP_SCD: &str = "skip_scd";

const KNOWN_KEYS: [&str; 5] = [
    SKIP_DI_COMPILATION,
    SKIP_DI_CLEARING,
    EXCLUDE_THEMES,
    SCD_THREADS,
    SKIP_SCD,
];

/// Typed contents of `build_options.ini`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Do not run `setup:di:compile` (generated code is still cleared)
    pub skip_di_compilation: bool,
    /// Recognized for compatibility with existing option files; generated
    /// code is cleared regardless
    pub skip_di_clearing: bool,
    /// Themes passed to the static content generator as `--exclude-theme`
    pub exclude_themes: Vec<String>,
    /// Parallelism of the static content fan-out; `None` lets the tool decide
    pub scd_threads: Option<u32>,
    /// Skip static content generation entirely
    pub skip_scd: bool,
}

impl BuildOptions {
    /// Load options from `path`. A missing file yields the defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).at_path(path)?;
        Self::parse(&content)
    }

    /// Parse INI content. Keys from the global section and from every named
    /// section are merged; a later occurrence wins. Unknown keys are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| BuildError::config(format!("{OPTIONS_FILE}: {e}")))?;

        let mut options = Self::default();
        for (_section, properties) in ini.iter() {
            for (key, value) in properties.iter() {
                options.apply(key.trim(), unquote(value.trim()))?;
            }
        }
        Ok(options)
    }

    /// Fan-out parallelism handed to `xargs -P`; 0 means "as many as possible"
    pub fn scd_thread_count(&self) -> u32 {
        self.scd_threads.unwrap_or(0)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key.to_ascii_lowercase().as_str() {
            SKIP_DI_COMPILATION => self.skip_di_compilation = parse_flag(key, value)?,
            SKIP_DI_CLEARING => self.skip_di_clearing = parse_flag(key, value)?,
            SKIP_SCD => self.skip_scd = parse_flag(key, value)?,
            EXCLUDE_THEMES => self.exclude_themes = split_list(value),
            SCD_THREADS => {
                self.scd_threads = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|_| {
                        BuildError::config(format!(
                            "{SCD_THREADS} must be a non-negative integer, got {value:?}"
                        ))
                    })?)
                };
            }
            _ => tracing::warn!(
                "Ignoring unknown key {:?} in {} (known keys: {})",
                key,
                OPTIONS_FILE,
                KNOWN_KEYS.join(", ")
            ),
        }
        Ok(())
    }
}

/// INI-style boolean: `1/true/on/yes` or `0/false/off/no/none/""`
fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "" | "0" | "false" | "off" | "no" | "none" => Ok(false),
        _ => Err(BuildError::config(format!(
            "{key} must be a boolean (true/false), got {value:?}"
        ))),
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Comma-separated list; surrounding whitespace and empty items are dropped
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
