use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// idereset: reset extension identity artifacts of installed IDEs
#[derive(Parser, Debug)]
#[command(
    name = "idereset",
    version,
    about = "Reset extension identity artifacts of VS Code-family and JetBrains IDEs",
    long_about = "idereset finds installed VS Code-family and JetBrains IDEs, regenerates their\n\
                   telemetry identifiers and removes the extension's cached state.\n\
                   Every file is backed up before it is touched.",
    after_help = "EXAMPLES:\n  \
        idereset detect                        List installed IDEs\n  \
        idereset telemetry --ide cursor        New identifiers for Cursor only\n  \
        idereset database                      Purge extension rows from every IDE\n  \
        idereset storage --global              Clean global storage only\n  \
        idereset all                           Every cleaning step, no restarts\n  \
        idereset auto -y                       Stop, clean and restart every IDE\n  \
        idereset auto --no-restart             Leave IDEs closed afterwards\n  \
        idereset backups list                  Show backups next to IDE state\n  \
        idereset status                        Show recent runs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Only act on this IDE (slug or display name, e.g. `cursor`, `PyCharm`)
    #[arg(long, short, global = true, value_name = "NAME")]
    pub ide: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode, minimal output
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List installed IDEs and the state files found for each
    Detect {
        /// Show every detected path
        #[arg(long)]
        detailed: bool,
    },

    /// Regenerate telemetry and device identifiers
    Telemetry {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Delete extension rows from the editor state database
    Database {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Remove extension entries from workspace storage
    Workspace {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Remove extension entries from global storage
    GlobalStorage {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Clean workspace and global storage together
    Storage {
        /// Only workspace storage
        #[arg(long, conflicts_with = "global")]
        workspace: bool,

        /// Only global storage
        #[arg(long)]
        global: bool,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Run telemetry, database and storage cleaning on each IDE
    All {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Stop IDEs, clean them, prepare sign-in and restart them
    Auto {
        /// Do not stop running IDEs first
        #[arg(long)]
        no_signout: bool,

        /// Skip the cleaning steps
        #[arg(long)]
        no_cleaning: bool,

        /// Skip sign-in preparation
        #[arg(long)]
        no_signin: bool,

        /// Leave IDEs closed afterwards
        #[arg(long)]
        no_restart: bool,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Close running IDE processes
    Stop,

    /// Launch IDEs
    Start,

    /// List or restore backups
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show recent runs
    Status {
        /// Number of runs to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
pub enum BackupsAction {
    /// List backups of detected IDEs
    List,

    /// Copy a backup back over its original
    Restore {
        /// Backup file or directory
        path: PathBuf,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset to default configuration
    Reset,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g. `vendor_marker`, `automation.include_restart`)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Initialize idereset directories and default config
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
