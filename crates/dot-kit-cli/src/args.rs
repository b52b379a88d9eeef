use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "dot-kit")]
#[command(about = "Sync reusable agent plugins into Claude Code configuration")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Base directory (default: ~/.dot-kit)
    #[arg(long, global = true, env = "DOT_KIT_HOME")]
    pub base_dir: Option<PathBuf>,

    /// Plugin source tree (overrides source.root)
    #[arg(long, global = true, env = "DOT_KIT_SOURCE")]
    pub source: Option<PathBuf>,

    /// Global scope base directory (default: ~/.claude)
    #[arg(long, global = true, env = "DOT_KIT_HOST_DIR")]
    pub host_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install plugins into a project (default: current directory) or globally
    Install {
        /// Target project directory (default: current directory)
        #[arg(long, conflicts_with = "global")]
        path: Option<PathBuf>,

        /// Install into the global scope (~/.claude)
        #[arg(short, long)]
        global: bool,

        /// Install the plugins listed by a profile
        #[arg(short, long, conflicts_with = "plugin")]
        profile: Option<String>,

        /// Install specific plugins (repeatable)
        #[arg(long)]
        plugin: Vec<String>,

        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove everything dot-kit installed into a scope
    Uninstall {
        /// Target project directory (default: current directory)
        #[arg(long, conflicts_with = "global")]
        path: Option<PathBuf>,

        /// Uninstall from the global scope
        #[arg(short, long)]
        global: bool,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Check installed references for broken links
    Update {
        /// Check a project instead of the global scope
        #[arg(long)]
        path: Option<PathBuf>,

        /// Fast-forward the source tree with git first
        #[arg(long)]
        pull: bool,
    },

    /// List plugins and profiles in the source tree
    List,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., source.root)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., global.host_dir)
        key: String,

        /// Value to set (empty string resets to default)
        value: String,
    },

    /// List all config values
    #[command(alias = "show")]
    List,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init,
}
