//! Build hook orchestrator.
//!
//! Runs the fixed pipeline described in [`BuildStage`] against one
//! deployment root. Stages run strictly in order; the first error aborts the
//! rest of the build with no retry and no rollback. The static content stage
//! converts its own failures into [`BuildError::StaticContent`] so the
//! process exits with a distinct code.

use std::fs;
use std::path::{Path, PathBuf};

use crate::build_log::BuildLog;
use crate::build_stage::{BuildProgress, BuildStage};
use crate::config_snapshot::ConfigSnapshot;
use crate::environment::{Environment, WRITABLE_DIRS};
use crate::error::{BuildError, IoContext, Result};
use crate::fs_ops;
use crate::options::{BuildOptions, OPTIONS_FILE};
use crate::params::RunParameters;
use crate::shell::{CommandRunner, shell_quote};
use crate::static_content::{MAGENTO_CLI, StaticContentPlan};

/// Patch tool shipped with the platform configuration package
pub const VENDOR_PATCH_TOOL: &str = "vendor/platformsh/magento2-configuration/patch.php";
/// Project-level patches applied on top of the vendor ones
pub const HOTFIX_DIR: &str = "m2-hotfixes";
/// Holding area for writable directories and staged static content
pub const INIT_DIR: &str = "init";
/// Marker recording that static content was generated during the build
pub const STATIC_CONTENT_DEPLOY_FLAG: &str = ".static_content_deploy";
pub const CONFIG_SNAPSHOT: &str = "app/etc/config.php";
pub const ENV_SNAPSHOT: &str = "app/etc/env.php";
pub const COMPOSER_DUMP_AUTOLOAD: &str = "composer dump-autoload -o";

/// Every location the build touches, resolved against the deployment root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    pub root: PathBuf,
    pub options_file: PathBuf,
    pub hotfix_dir: PathBuf,
    pub config_snapshot: PathBuf,
    pub env_snapshot: PathBuf,
    pub generated_code: PathBuf,
    pub generated_metadata: PathBuf,
    pub pub_static: PathBuf,
    pub view_preprocessed: PathBuf,
    pub var_dir: PathBuf,
    pub init_dir: PathBuf,
    pub init_static: PathBuf,
    pub deploy_flag: PathBuf,
    pub init_deploy_flag: PathBuf,
    pub sample_data_media: PathBuf,
    pub pub_media: PathBuf,
}

impl BuildPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let init_dir = root.join(INIT_DIR);
        Self {
            options_file: root.join(OPTIONS_FILE),
            hotfix_dir: root.join(HOTFIX_DIR),
            config_snapshot: root.join(CONFIG_SNAPSHOT),
            env_snapshot: root.join(ENV_SNAPSHOT),
            generated_code: root.join("generated/code"),
            generated_metadata: root.join("generated/metadata"),
            pub_static: root.join("pub/static"),
            view_preprocessed: root.join("var/view_preprocessed"),
            var_dir: root.join("var"),
            init_static: init_dir.join("pub/static"),
            deploy_flag: root.join(STATIC_CONTENT_DEPLOY_FLAG),
            init_deploy_flag: init_dir.join(STATIC_CONTENT_DEPLOY_FLAG),
            sample_data_media: root.join("vendor/magento/sample-data-media"),
            pub_media: root.join("pub/media"),
            init_dir,
            root,
        }
    }

    /// `(live, holding)` pairs for every writable directory, in staging order
    pub fn writable_dirs(&self) -> Vec<(PathBuf, PathBuf)> {
        WRITABLE_DIRS
            .iter()
            .map(|dir| (self.root.join(dir), self.init_dir.join(dir)))
            .collect()
    }
}

/// Regular files in the hotfix directory, sorted by file name.
///
/// The order is what makes patch application reproducible, so it is purely
/// lexicographic and independent of creation time or directory order.
pub fn committed_patches(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut patches = Vec::new();
    for entry in fs::read_dir(dir).at_path(dir)? {
        let entry = entry.at_path(dir)?;
        if entry.file_type().at_path(entry.path())?.is_file() {
            patches.push(entry.path());
        }
    }
    patches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(patches)
}

/// One build run
pub struct Build<R: CommandRunner> {
    env: Environment,
    paths: BuildPaths,
    runner: R,
    log: BuildLog,
    progress: BuildProgress,
    options: BuildOptions,
    params: RunParameters,
    /// Entries of the init directory produced by this run
    staged: Vec<PathBuf>,
}

impl<R: CommandRunner> Build<R> {
    pub fn new(env: Environment, runner: R, log: BuildLog) -> Self {
        let paths = BuildPaths::new(env.root());
        Self {
            env,
            paths,
            runner,
            log,
            progress: BuildProgress::new(),
            options: BuildOptions::default(),
            params: RunParameters::default(),
            staged: Vec::new(),
        }
    }

    pub fn paths(&self) -> &BuildPaths {
        &self.paths
    }

    pub fn progress(&self) -> &BuildProgress {
        &self.progress
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Run every stage. On failure the stage that failed is recorded and
    /// logged, and the error is returned for the caller to turn into an exit
    /// code.
    pub fn run(&mut self) -> Result<()> {
        self.log.log("Start build.");

        match self.run_stages() {
            Ok(()) => {
                self.log.log("Build complete.");
                Ok(())
            }
            Err(e) => {
                let stage = self.progress.current_stage();
                self.log
                    .log(format!("Build failed during \"{stage}\": {e} (exit code {})", e.exit_code()));
                if let Err(transition) = self.progress.fail() {
                    tracing::debug!("Could not mark build as failed: {}", transition);
                }
                Err(e)
            }
        }
    }

    fn run_stages(&mut self) -> Result<()> {
        self.enter(BuildStage::LoadOptions)?;
        self.load_options()?;

        self.enter(BuildStage::LoadVariables)?;
        self.load_variables()?;

        self.enter(BuildStage::VendorPatches)?;
        self.apply_vendor_patches()?;

        self.enter(BuildStage::CommittedPatches)?;
        self.apply_committed_patches()?;

        self.enter(BuildStage::CompileDi)?;
        self.compile_di()?;

        self.enter(BuildStage::DumpAutoload)?;
        self.runner.execute(COMPOSER_DUMP_AUTOLOAD)?;

        self.enter(BuildStage::DeployStaticContent)?;
        if let Err(e) = self.deploy_static_content() {
            self.log.log(e.to_string());
            return Err(BuildError::static_content(e));
        }

        self.enter(BuildStage::StageStaticAssets)?;
        self.stage_static_assets()?;

        self.enter(BuildStage::ClearInitDir)?;
        let removed = fs_ops::clear_dir_except(&self.paths.init_dir, &self.staged)?;
        tracing::debug!("Removed {} stale entries from the init directory", removed);

        self.enter(BuildStage::RemoveSnapshots)?;
        self.remove_snapshots()?;

        self.enter(BuildStage::StageWritableDirs)?;
        self.stage_writable_dirs()?;

        self.progress.transition_to(BuildStage::Completed)?;
        Ok(())
    }

    fn enter(&mut self, stage: BuildStage) -> Result<()> {
        self.progress.transition_to(stage)?;
        self.log.log(format!("{stage}."));
        Ok(())
    }

    fn load_options(&mut self) -> Result<()> {
        self.options = BuildOptions::load_from_file(&self.paths.options_file)?;
        if self.paths.options_file.exists() {
            self.log
                .log(format!("Loaded build options from {OPTIONS_FILE}: {:?}", self.options));
        } else {
            self.log.log(format!("No {OPTIONS_FILE} found, using default build options."));
        }
        Ok(())
    }

    fn load_variables(&mut self) -> Result<()> {
        self.params = RunParameters::load(&self.env)?;
        self.log.log(format!("Run parameters: {}", self.params));
        Ok(())
    }

    fn apply_vendor_patches(&mut self) -> Result<()> {
        self.runner.execute(&format!("php {VENDOR_PATCH_TOOL}"))?;
        Ok(())
    }

    fn apply_committed_patches(&mut self) -> Result<()> {
        self.log.log(format!(
            "Checking if patches exist under {}",
            self.paths.hotfix_dir.display()
        ));

        for patch in committed_patches(&self.paths.hotfix_dir)? {
            let relative = patch.strip_prefix(&self.paths.root).unwrap_or(patch.as_path());
            let command = format!("git apply {}", shell_quote(&relative.display().to_string()));
            self.runner.execute(&command)?;
        }
        Ok(())
    }

    fn compile_di(&mut self) -> Result<()> {
        if self.options.skip_di_clearing {
            self.log
                .log("skip_di_clearing is set; generated code is cleared before compilation regardless.");
        }
        fs_ops::clear_dir_contents(&self.paths.generated_code)?;
        fs_ops::clear_dir_contents(&self.paths.generated_metadata)?;

        if self.options.skip_di_compilation {
            self.log.log("Skip running DI compilation");
            return Ok(());
        }

        self.log.log("Enabling all modules");
        self.runner.execute(&self.magento_command("module:enable --all"))?;

        self.log.log("Running DI compilation");
        self.runner.execute(&self.magento_command("setup:di:compile"))?;
        Ok(())
    }

    /// `bin/magento <args>` with the run's verbosity flag
    fn magento_command(&self, args: &str) -> String {
        match self.params.verbosity_flag() {
            Some(flag) => format!("{MAGENTO_CLI} {args} {flag}"),
            None => format!("{MAGENTO_CLI} {args}"),
        }
    }

    fn deploy_static_content(&mut self) -> Result<()> {
        // A marker left over from an earlier build must not claim this one generated content
        fs_ops::remove_path(&self.paths.deploy_flag)?;

        if self.options.skip_scd {
            self.log.log("Skipping static content deployment: skip_scd is set.");
            return Ok(());
        }

        if !self.paths.config_snapshot.exists() {
            self.log.log(format!(
                "Skipping static content deployment: {CONFIG_SNAPSHOT} not found."
            ));
            return Ok(());
        }

        let snapshot = ConfigSnapshot::load(&self.paths.config_snapshot, &mut self.runner)?;
        if !snapshot.has_scopes() {
            self.log.log("No stores/website/locales found in config.php");
            return Ok(());
        }

        let excluded_themes = if self.options.exclude_themes.is_empty() {
            self.params.excluded_themes.clone()
        } else {
            self.options.exclude_themes.clone()
        };
        let plan = StaticContentPlan {
            locales: snapshot.locales(),
            excluded_themes,
            threads: self.options.scd_thread_count(),
            verbosity: self.params.verbosity_flag(),
        };

        if self.params.clean_static_files {
            self.clean_static_files()?;
        }

        self.log.log(format!(
            "Generating static content for locales: {}",
            plan.locales.join(" ")
        ));
        self.runner.execute(&plan.fan_out_command())?;

        fs::write(&self.paths.deploy_flag, "").at_path(&self.paths.deploy_flag)?;
        Ok(())
    }

    /// Move the visible contents of `pub/static` aside and delete them in
    /// the background. Dotfiles such as `.htaccess` stay in place.
    fn clean_static_files(&mut self) -> Result<()> {
        fs_ops::clear_dir_contents(&self.paths.view_preprocessed)?;

        let entries = match fs::read_dir(&self.paths.pub_static) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BuildError::io(&self.paths.pub_static, e)),
        };

        let timestamp = chrono::Utc::now().timestamp();
        let old_location = self.paths.var_dir.join(format!("static_old_{timestamp}"));

        let mut moved = 0;
        for entry in entries {
            let entry = entry.at_path(&self.paths.pub_static)?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            fs_ops::ensure_dir(&old_location)?;
            let target = old_location.join(entry.file_name());
            fs::rename(entry.path(), &target).at_path(&target)?;
            moved += 1;
        }

        if moved > 0 {
            self.log.log(format!(
                "Moved {moved} old static content entries to {}",
                old_location.display()
            ));
            self.runner.background_execute(&format!(
                "rm -rf {}",
                shell_quote(&old_location.display().to_string())
            ));
        }
        Ok(())
    }

    fn stage_static_assets(&mut self) -> Result<()> {
        if !self.paths.deploy_flag.exists() {
            self.log.log("Static content was not generated during build; nothing to move.");
            return Ok(());
        }

        fs_ops::ensure_dir(&self.paths.init_dir.join("pub"))?;
        if fs_ops::remove_path(&self.paths.init_static)? {
            self.log.log(format!("Removed {}", self.paths.init_static.display()));
        }

        fs_ops::ensure_dir(&self.paths.pub_static)?;
        let copied = fs_ops::copy_dir_contents(&self.paths.pub_static, &self.paths.init_static)?;
        fs::copy(&self.paths.deploy_flag, &self.paths.init_deploy_flag)
            .at_path(&self.paths.init_deploy_flag)?;
        self.log.log(format!("Copied {copied} static files to {}", self.paths.init_static.display()));

        self.staged.push(self.paths.init_static.clone());
        self.staged.push(self.paths.init_deploy_flag.clone());
        Ok(())
    }

    fn remove_snapshots(&mut self) -> Result<()> {
        for snapshot in [&self.paths.env_snapshot, &self.paths.config_snapshot] {
            if fs_ops::remove_path(snapshot)? {
                self.log.log(format!("Removed {}", snapshot.display()));
            }
        }
        Ok(())
    }

    fn stage_writable_dirs(&mut self) -> Result<()> {
        for (live, holding) in self.paths.writable_dirs() {
            let copied = fs_ops::stage_directory(&live, &holding)?;
            self.log.log(format!(
                "Staged {} ({copied} files) into {}",
                live.display(),
                holding.display()
            ));
        }
        Ok(())
    }
}
