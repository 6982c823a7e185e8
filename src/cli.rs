use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Path to the config file. Defaults to `./lockstep.toml`
    #[clap(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Log every step of a run
    #[clap(short, long, global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: LockstepCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum LockstepCommand {
    /// Creates an empty `lockstep.toml`
    Init,
    /// Adds an application to the `lockstep.toml`. Nothing is downloaded!
    Add {
        name: String,
        /// Version token committed after a successful update
        #[clap(long)]
        version: String,
        /// URL of the JSON manifest listing files and hashes
        #[clap(long)]
        manifest_url: String,
        /// Prefix every manifest path is appended to for downloading
        #[clap(long = "download-url")]
        download_url: String,
        /// Installed root. Defaults to the platform data directory
        #[clap(long)]
        path: Option<PathBuf>,
    },
    /// Removes an application from the `lockstep.toml`. Installed files are kept
    Remove {
        name: String,
    },
    /// List all applications with their installed and target versions
    List,
    /// Show installed vs. target version of one application
    Status {
        name: String,
    },
    /// Fetch the manifest and show which files differ, without downloading
    Verify {
        name: String,
    },
    /// Bring applications up to date. Defaults to one named application
    Update {
        name: Option<String>,
        /// Update every configured application
        #[clap(long, conflicts_with = "name")]
        all: bool,
    },
}
