// ============================================================================
// options.rs — command-line arguments (CLI)
// ============================================================================

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "overrun")]
#[command(about = "overrun - a workspace-aware task orchestrator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Explicit config file path (overridden by $OVERRUN_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose output (debug-level logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode: only warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the overrun version
    Version,

    /// Print config validity, discovered directories, and the effective config
    Doctor,

    /// Emit the effective config as TOML
    Config,

    /// Inspect known targets
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },

    /// Inspect the component-type catalog
    Component {
        #[command(subcommand)]
        action: ComponentAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum TargetAction {
    /// List known target names and their defining file paths
    List,
    /// Run a target's transitive dependency closure through its lifecycle
    Run {
        /// Name of the target to run
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ComponentAction {
    /// List registered component types
    List,
}

impl Cli {
    /// If both verbose and quiet are set, quiet takes precedence (clap
    /// already rejects this combination via `conflicts_with`, but callers
    /// that construct `Cli` directly in tests may not go through `parse`).
    pub fn show_verbose_output(&self) -> bool {
        self.verbose && !self.quiet
    }
}
