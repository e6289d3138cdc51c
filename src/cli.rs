//! CLI struct definitions for the statute command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use crate::core::lease::{EVALUATION_LEASE, RESOLUTION_LEASE};
use crate::core::lifecycle::ApplyOkStamp;
use crate::plugins::hooks::HookCli;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "statute",
    version = env!("CARGO_PKG_VERSION"),
    about = "Lifecycle kernel for a constitutional record set: amendments, founding record and derived LAW, kept consistent across concurrent workers."
)]
pub(crate) struct Cli {
    /// Output machine-readable JSON envelopes.
    #[clap(long, global = true)]
    pub json: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create `.constitution/` and an active LAW matching the accepted set.
    Init,
    /// Promote a reviewed record to accepted and mark LAW resolving.
    Promote {
        /// Path to the draft/review record.
        #[clap(long)]
        article: PathBuf,
    },
    /// Set `apply_ok_at` to pending or to the current body hash.
    Stamp {
        #[clap(long)]
        article: PathBuf,
        #[clap(long, value_enum)]
        state: StampState,
    },
    /// Record a suitability verdict on a draft/review record.
    Suitability {
        #[clap(long)]
        article: PathBuf,
        #[clap(long, value_enum)]
        result: SuitabilityResult,
        /// Required with NEEDS_INPUT.
        #[clap(long, default_value = "")]
        reason_code: String,
        /// Required with NEEDS_INPUT.
        #[clap(long, default_value = "")]
        request: String,
    },
    /// Rename a draft/review record so its decoration matches its status.
    Sync {
        #[clap(long)]
        article: PathBuf,
    },
    /// Rewrite LAW's fingerprint to match the accepted set.
    Reconcile,
    /// Check LAW against the accepted set (exit 1 on failure).
    Verify,
    /// Move an out-of-date active LAW to resolving.
    CheckDrift,
    /// Manage evaluation/resolution leases.
    Lease(LeaseCli),
    /// Manage reconciliation grants.
    Grant(GrantCli),
    /// Host integration hooks.
    Hook(HookCli),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum StampState {
    Pending,
    Ok,
}

impl From<StampState> for ApplyOkStamp {
    fn from(s: StampState) -> Self {
        match s {
            StampState::Pending => ApplyOkStamp::Pending,
            StampState::Ok => ApplyOkStamp::Ok,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum SuitabilityResult {
    #[value(name = "APPLY_OK")]
    ApplyOk,
    #[value(name = "NEEDS_INPUT")]
    NeedsInput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LeaseField {
    Evaluation,
    Resolution,
}

impl LeaseField {
    pub fn header_key(self) -> &'static str {
        match self {
            Self::Evaluation => EVALUATION_LEASE,
            Self::Resolution => RESOLUTION_LEASE,
        }
    }
}

#[derive(clap::Args, Debug)]
pub(crate) struct LeaseCli {
    #[clap(subcommand)]
    pub command: LeaseCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum LeaseCommand {
    /// Try to claim a lease without blocking.
    Acquire {
        #[clap(long)]
        article: PathBuf,
        #[clap(long, value_enum)]
        field: LeaseField,
    },
    /// Clear a lease (idempotent).
    Release {
        #[clap(long)]
        article: PathBuf,
        #[clap(long, value_enum)]
        field: LeaseField,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct GrantCli {
    #[clap(subcommand)]
    pub command: GrantCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum GrantCommand {
    /// Mint a one-shot grant for the next resolving-LAW editor.
    Mint {
        #[clap(long, default_value = "reconcile")]
        purpose: String,
    },
    /// Drop the grant bound to an invocation.
    Revoke {
        #[clap(long)]
        invocation: String,
    },
}
