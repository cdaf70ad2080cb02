//! Build Stage State Machine
//!
//! The pipeline is a fixed chain of stages. `BuildProgress` owns the current
//! stage and only allows stepping to the immediate successor, so a refactor
//! of the orchestrator cannot silently reorder or skip a step.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! LoadOptions → LoadVariables → VendorPatches → CommittedPatches
//!     ↓
//! CompileDi → DumpAutoload → DeployStaticContent → StageStaticAssets
//!     ↓
//! ClearInitDir → RemoveSnapshots → StageWritableDirs
//!     ↓
//! Completed
//!
//! (Any stage can transition to Failed)
//! ```

use std::fmt;
use strum::{EnumIter, IntoEnumIterator};
use thiserror::Error;

/// Build stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
#[repr(u8)]
pub enum BuildStage {
    /// Nothing has run yet
    NotStarted = 0,

    /// Stage 1: read `build_options.ini`
    LoadOptions = 1,

    /// Stage 2: decode platform variables and derive run parameters
    LoadVariables = 2,

    /// Stage 3: run the vendor patch tool
    VendorPatches = 3,

    /// Stage 4: `git apply` everything under the hotfix directory
    CommittedPatches = 4,

    /// Stage 5: clear generated code and compile DI
    CompileDi = 5,

    /// Stage 6: regenerate the composer autoloader
    DumpAutoload = 6,

    /// Stage 7: generate static content for every configured locale
    DeployStaticContent = 7,

    /// Stage 8: copy generated static assets into the init directory
    StageStaticAssets = 8,

    /// Stage 9: drop stale entries from the init directory
    ClearInitDir = 9,

    /// Stage 10: delete env.php / config.php snapshots
    RemoveSnapshots = 10,

    /// Stage 11: move writable directories into the init directory
    StageWritableDirs = 11,

    /// Build finished (terminal state)
    Completed = 12,

    /// Build aborted (terminal state)
    Failed = 255,
}

impl BuildStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Completed or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the next stage in the sequence, or None if at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::LoadOptions),
            Self::LoadOptions => Some(Self::LoadVariables),
            Self::LoadVariables => Some(Self::VendorPatches),
            Self::VendorPatches => Some(Self::CommittedPatches),
            Self::CommittedPatches => Some(Self::CompileDi),
            Self::CompileDi => Some(Self::DumpAutoload),
            Self::DumpAutoload => Some(Self::DeployStaticContent),
            Self::DeployStaticContent => Some(Self::StageStaticAssets),
            Self::StageStaticAssets => Some(Self::ClearInitDir),
            Self::ClearInitDir => Some(Self::RemoveSnapshots),
            Self::RemoveSnapshots => Some(Self::StageWritableDirs),
            Self::StageWritableDirs => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Human-readable description, used as the stage banner in the build log
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::LoadOptions => "Loading build options",
            Self::LoadVariables => "Loading environment variables",
            Self::VendorPatches => "Applying patches",
            Self::CommittedPatches => "Applying committed patches",
            Self::CompileDi => "Compiling dependency injection",
            Self::DumpAutoload => "Regenerating autoloader",
            Self::DeployStaticContent => "Deploying static content",
            Self::StageStaticAssets => "Moving static content to init directory",
            Self::ClearInitDir => "Clearing temporary directory",
            Self::RemoveSnapshots => "Removing generated configuration snapshots",
            Self::StageWritableDirs => "Copying writable directories to temp directory",
            Self::Completed => "Build complete",
            Self::Failed => "Build failed",
        }
    }

    /// Every stage from NotStarted to Completed, in order
    pub fn pipeline() -> impl Iterator<Item = Self> {
        Self::iter().filter(|stage| *stage != Self::Failed)
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    /// Attempted to jump over one or more stages
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: BuildStage, to: BuildStage },

    /// Attempted to go back to an earlier stage
    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: BuildStage, to: BuildStage },

    /// Attempted to move on from Completed or Failed
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: BuildStage },
}

/// Tracks where a single build run currently is.
#[derive(Debug, Clone)]
pub struct BuildProgress {
    current: BuildStage,

    /// Stage that was running when the build failed
    failed_at: Option<BuildStage>,

    /// Entered stages with unix timestamps
    history: Vec<(BuildStage, i64)>,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildProgress {
    pub fn new() -> Self {
        Self {
            current: BuildStage::NotStarted,
            failed_at: None,
            history: Vec::with_capacity(BuildStage::pipeline().count()),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> BuildStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<BuildStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == BuildStage::Completed
    }

    pub fn history(&self) -> &[(BuildStage, i64)] {
        &self.history
    }

    /// Step to `target`, which must be the immediate successor of the current stage.
    pub fn transition_to(&mut self, target: BuildStage) -> Result<BuildStage, StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }

        // Failed is only reachable through fail()
        if target == BuildStage::Failed {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        if target.order() <= self.current.order() {
            return Err(StageTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }

        if self.current.next() != Some(target) {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.record(target);
        self.current = target;
        Ok(target)
    }

    /// Mark the run as failed at the current stage.
    pub fn fail(&mut self) -> Result<(), StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }

        self.failed_at = Some(self.current);
        self.record(BuildStage::Failed);
        self.current = BuildStage::Failed;
        Ok(())
    }

    fn record(&mut self, stage: BuildStage) {
        let timestamp = chrono::Utc::now().timestamp();

        self.history.push((stage, timestamp));
    }
}
