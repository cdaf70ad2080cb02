//! Error handling module for the build hook
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every failure carries enough context (command, status, path) to be logged
//! before it propagates, and maps onto the process exit code the platform sees.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::build_stage::StageTransitionError;

/// Exit code reserved for failures inside the static content stage.
pub const STATIC_CONTENT_EXIT_CODE: i32 = 5;

/// Main error type for the build hook
#[derive(Error, Debug)]
pub enum BuildError {
    /// An external command exited non-zero (or was killed by a signal)
    #[error("Command {command} returned code {}", describe_status(.status))]
    CommandFailed {
        command: String,
        status: Option<i32>,
    },

    /// An external command could not be started at all
    #[error("Failed to spawn command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors (options file, unexpected values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encoded platform variables that cannot be decoded
    #[error("Failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },

    /// Filesystem errors with the path that was being touched
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything that went wrong while generating static content
    #[error("Static content deployment failed: {0}")]
    StaticContent(#[source] Box<BuildError>),

    /// Pipeline stage ordering violation
    #[error("Stage transition error: {0}")]
    Transition(#[from] StageTransitionError),
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

// Convenient error constructors
impl BuildError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a decode error for the named variable
    pub fn decode(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an IO error bound to a path
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wrap an error raised inside the static content stage
    pub fn static_content(inner: BuildError) -> Self {
        match inner {
            already @ Self::StaticContent(_) => already,
            other => Self::StaticContent(Box::new(other)),
        }
    }

    /// Process exit code for this failure.
    ///
    /// A failing command propagates its own status (clamped to 1..=255),
    /// the static content stage always exits with 5, everything else with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed {
                status: Some(code), ..
            } if (1..=255).contains(code) => *code,
            Self::StaticContent(_) => STATIC_CONTENT_EXIT_CODE,
            _ => 1,
        }
    }
}

/// Extension for attaching a path to `std::io::Result`
pub trait IoContext<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| BuildError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuildError::config("scd_threads must be an integer");
        assert_eq!(
            err.to_string(),
            "Configuration error: scd_threads must be an integer"
        );

        let err = BuildError::CommandFailed {
            command: "git apply a.patch".to_string(),
            status: Some(128),
        };
        assert_eq!(err.to_string(), "Command git apply a.patch returned code 128");
    }

    #[test]
    fn test_exit_code_propagates_command_status() {
        let err = BuildError::CommandFailed {
            command: "composer dump-autoload -o".to_string(),
            status: Some(2),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_for_signal_or_out_of_range_status() {
        let killed = BuildError::CommandFailed {
            command: "sleep 60".to_string(),
            status: None,
        };
        assert_eq!(killed.exit_code(), 1);

        let weird = BuildError::CommandFailed {
            command: "x".to_string(),
            status: Some(-1),
        };
        assert_eq!(weird.exit_code(), 1);
    }

    #[test]
    fn test_static_content_exit_code_overrides_inner_status() {
        let inner = BuildError::CommandFailed {
            command: "xargs".to_string(),
            status: Some(123),
        };
        let err = BuildError::static_content(inner);
        assert_eq!(err.exit_code(), STATIC_CONTENT_EXIT_CODE);
    }

    #[test]
    fn test_static_content_wrapping_is_not_nested() {
        let err = BuildError::static_content(BuildError::static_content(BuildError::config("x")));
        match err {
            BuildError::StaticContent(inner) => assert!(matches!(*inner, BuildError::Config(_))),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_io_context_keeps_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result.at_path("/tmp/nowhere").unwrap_err();
        assert!(err.to_string().contains("/tmp/nowhere"));
        assert_eq!(err.exit_code(), 1);
    }
}
