use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// magecloud-build - Magento build hook for Platform.sh
#[derive(Parser, Debug)]
#[command(name = "magecloud-build")]
#[command(about = "Prepares a Magento 2 codebase for deployment on a read-only filesystem")]
#[command(version)]
pub struct Cli {
    /// Deployment root (the application checkout)
    #[arg(long, global = true, env = "MAGECLOUD_ROOT", default_value = ".")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the build hook pipeline (default)
    Build,
    /// Copy sample data media into pub/media
    MarshalSampleData,
    /// Print the decoded platform variables, routes and relationships
    Environment,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Subcommand to run, `build` when none was given
    pub fn subcommand(&self) -> Commands {
        self.command.unwrap_or(Commands::Build)
    }
}
