//! magecloud-build library
//!
//! Build hook pipeline that turns a freshly checked out Magento 2 codebase
//! into an image that can run from a read-only filesystem.

pub mod build;
pub mod build_log;
pub mod build_stage;
pub mod cli;
pub mod config_snapshot;
pub mod environment;
pub mod error;
pub mod fs_ops;
pub mod options;
pub mod params;
pub mod process_guard;
pub mod sample_data;
pub mod shell;
pub mod static_content;

// Re-export main types for convenience
pub use build::{Build, BuildPaths};
pub use build_log::{BuildLog, LogCapture};
pub use build_stage::{BuildProgress, BuildStage, StageTransitionError};
pub use config_snapshot::ConfigSnapshot;
pub use environment::Environment;
pub use error::{BuildError, STATIC_CONTENT_EXIT_CODE};
pub use options::BuildOptions;
pub use params::{RunParameters, ThreadSource};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use sample_data::marshal_sample_data;
pub use shell::{CommandRunner, ShellRunner};
pub use static_content::StaticContentPlan;
