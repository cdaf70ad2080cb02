//! Access to what the hosting platform injects into the build container.
//!
//! Routes, relationships and custom variables arrive as base64-encoded JSON
//! in `PLATFORM_*` environment variables. The process environment is
//! snapshotted once so the whole run sees one consistent view, and tests can
//! inject their own.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

pub const VARIABLES_ENV: &str = "PLATFORM_VARIABLES";
pub const ROUTES_ENV: &str = "PLATFORM_ROUTES";
pub const RELATIONSHIPS_ENV: &str = "PLATFORM_RELATIONSHIPS";

/// Directories that must stay writable after the image is mounted read-only,
/// in the order they are staged.
pub const WRITABLE_DIRS: [&str; 3] = ["app/etc", "pub/media", "generated"];

/// Custom variables decoded from `PLATFORM_VARIABLES`
pub type PlatformVariables = Map<String, Value>;

/// Snapshot of the build environment rooted at the deployment directory
#[derive(Debug, Clone)]
pub struct Environment {
    root: PathBuf,
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot the current process environment
    pub fn from_process(root: impl Into<PathBuf>) -> Self {
        Self::with_vars(root, std::env::vars())
    }

    /// Build an environment from explicit variables
    pub fn with_vars<I, K, V>(root: impl Into<PathBuf>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            root: root.into(),
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Deployment root every relative path is resolved against
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw process variable
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Custom variables configured for the project.
    ///
    /// An absent `PLATFORM_VARIABLES` yields an empty map so the hook can run
    /// outside the platform; a present but undecodable value is an error.
    pub fn variables(&self) -> Result<PlatformVariables> {
        self.decode_object(VARIABLES_ENV)
    }

    /// Route table of the environment
    pub fn routes(&self) -> Result<PlatformVariables> {
        self.decode_object(ROUTES_ENV)
    }

    /// Service relationships (databases, caches, search)
    pub fn relationships(&self) -> Result<PlatformVariables> {
        self.decode_object(RELATIONSHIPS_ENV)
    }

    fn decode_object(&self, name: &str) -> Result<PlatformVariables> {
        match self.var(name) {
            None => Ok(Map::new()),
            Some(encoded) => match decode_json(name, encoded)? {
                Value::Object(map) => Ok(map),
                other => Err(BuildError::decode(
                    name,
                    format!("expected a JSON object, found {}", json_kind(&other)),
                )),
            },
        }
    }
}

/// Decode a base64-wrapped JSON document
pub fn decode_json(name: &str, encoded: &str) -> Result<Value> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| BuildError::decode(name, e))?;
    serde_json::from_slice(&bytes).map_err(|e| BuildError::decode(name, e))
}

/// Encode a JSON document the way the platform does
pub fn encode_json(value: &Value) -> String {
    STANDARD.encode(value.to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
