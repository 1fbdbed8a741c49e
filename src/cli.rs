//! CLI struct definitions for the Frontdesk command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "frontdesk",
    version = env!("CARGO_PKG_VERSION"),
    about = "Versioned, lock-protected state shared by receptionist agents: atomic writes, optimistic concurrency, snapshot rollback and handoffs."
)]
pub(crate) struct Cli {
    /// Store root directory (defaults to $FRONTDESK_ROOT, then the nearest `.frontdesk/`).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, global = true, default_value = "text")]
    pub format: String,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create the state document if missing, otherwise sanity-check it
    #[clap(name = "init")]
    Init,

    /// Print the current state (repairing it first if corrupt)
    #[clap(name = "show", visible_alias = "s")]
    Show,

    /// Write a new state document as the next version
    #[clap(name = "write", visible_alias = "w")]
    Write {
        /// JSON document to write ('-' reads stdin).
        #[clap(long)]
        file: PathBuf,
        /// Agent id recorded as `updated_by`.
        #[clap(long)]
        by: String,
        /// Refuse the write unless the current version equals this.
        #[clap(long)]
        expect: Option<u64>,
    },

    /// Validate business invariants, rolling back on failure
    #[clap(name = "check", visible_alias = "c")]
    Check {
        /// Agent performing the check.
        #[clap(long, default_value = "main")]
        agent: String,
    },

    /// Record a handoff between two agents
    #[clap(name = "handoff", visible_alias = "h")]
    Handoff {
        #[clap(long)]
        from: String,
        #[clap(long)]
        to: String,
        /// JSON object with status, deliverables, blockers, next_steps ('-' reads stdin).
        #[clap(long)]
        summary: PathBuf,
    },

    /// List retained snapshots, newest first
    #[clap(name = "history")]
    History,

    /// Restore the newest valid snapshot as the live state
    #[clap(name = "rollback")]
    Rollback {
        /// Agent id recorded in the audit log.
        #[clap(long, default_value = "operator")]
        by: String,
    },
}
