use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "localstore",
    about = "Persistent key/value settings store with optional encryption at rest",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Which store to open. Each flag overrides the config file.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetArgs {
    /// Storage file name.
    #[arg(long, global = true)]
    pub file: Option<String>,
    /// Storage id used to namespace the storage directory.
    #[arg(long, global = true)]
    pub storage_id: Option<String>,
    /// Root directory instead of the per-user application data directory.
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,
    /// Open the encrypted kind of store.
    #[arg(long, global = true)]
    pub encrypted: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Apply one `key=value` line (`key=null` removes the key).
    Set { entry: String },
    /// Print the value stored under a key.
    Get { key: String },
    /// List records as a table.
    Ls {
        /// Only keys starting with this prefix.
        #[arg(long)]
        prefix: Option<String>,
        /// Aligned columns without borders.
        #[arg(long)]
        plain: bool,
        /// Print a JSON object instead of a table.
        #[arg(long, conflicts_with = "plain")]
        json: bool,
    },
    /// Remove a key.
    Rm { key: String },
    /// Remove every key starting with a prefix.
    RmGroup { prefix: String },
    /// Merge records from a file written by the same kind of store.
    Import { path: PathBuf },
    /// Write all records to a file in this store's on-disk form.
    Export { path: PathBuf },
    /// Delete the storage file, its keys, and the directory if left empty.
    Delete,
    /// Run a write/read/remove round trip against the store.
    Health,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
