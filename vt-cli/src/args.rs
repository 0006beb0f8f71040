//! CLI surface (§6): each subcommand maps to exactly one `SyncOp`.

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// A CLI for syncing a local directory with a remote val.
#[derive(Parser, Debug)]
#[command(name = "vt", version, about, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PrivacyArg {
    Public,
    Private,
    Unlisted,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Materialize a val's branch into a local working directory.
    Clone {
        val_id: Uuid,
        target_dir: Option<String>,
        branch_name: Option<String>,
        /// Allow cloning into a non-empty directory that isn't yet a working tree.
        #[arg(long)]
        upload_existing: bool,
    },
    /// Fetch and apply remote changes.
    Pull {
        #[arg(short = 'f', long)]
        force: bool,
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Apply local changes to the remote.
    Push {
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Show pending local changes without applying them.
    Status,
    /// Switch to another branch, or create one with `-b`.
    Checkout {
        branch: Option<String>,
        #[arg(short = 'b')]
        new_branch: Option<String>,
        #[arg(short = 'f', long)]
        force: bool,
    },
    /// Watch the working tree and push on every debounced change.
    Watch {
        #[arg(long = "debounce-delay", default_value_t = 500)]
        debounce_delay: u64,
    },
    /// List branches, or delete one with `-D`.
    Branch {
        #[arg(short = 'D')]
        delete: Option<String>,
    },
    /// Create a new val.
    Create {
        name: String,
        target_dir: Option<String>,
        #[arg(value_enum, long, default_value_t = PrivacyArg::Private)]
        privacy: PrivacyArg,
        #[arg(long)]
        org: Option<String>,
    },
    /// Delete the working tree's binding, and optionally the remote val.
    Delete {
        #[arg(short = 'f', long)]
        force: bool,
        #[arg(long)]
        remote: bool,
    },
}
