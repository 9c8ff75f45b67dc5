use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rent-warden")]
#[command(about = "Discovers and reclaims rent deposits locked in operator-sponsored accounts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the operator's history and refresh account statuses
    Scan {
        /// Show per-account details
        #[arg(short, long)]
        verbose: bool,

        /// Re-verify all active accounts, not just stale ones
        #[arg(long)]
        force_verify: bool,

        /// Stop the historical fill after this many transactions
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Reclaim verified-reclaimable accounts (or one specific account)
    Reclaim {
        /// Account public key; omit to reclaim everything eligible
        pubkey: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Simulate without sending transactions
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the scan → reclaim → sweep cycle on an interval
    Auto {
        /// Seconds between cycles
        #[arg(short, long, default_value = "3600")]
        interval: u64,

        /// Simulate without sending transactions
        #[arg(long)]
        dry_run: bool,
    },

    /// Show account and reclaim statistics
    Stats {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Manage the reclaim exemption whitelist
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },

    /// Initialize the database and echo the effective configuration
    Init,
}

#[derive(Subcommand)]
pub enum WhitelistAction {
    /// Exempt an address from reclamation
    Add {
        address: String,

        #[arg(short, long)]
        label: Option<String>,
    },

    /// Remove an exemption
    Remove { address: String },

    /// List exempted addresses
    List,
}
