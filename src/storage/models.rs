use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate or confirmed reclaimable account, keyed by address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SponsoredAccount {
    pub address: String,
    pub operator: String,
    /// Owning user, best-effort from instruction decoding.
    pub owner: Option<String>,
    pub mint: Option<String>,
    pub kind: ResourceKind,

    pub discovery_signature: Option<String>,
    pub discovery_slot: Option<u64>,
    pub first_seen_at: DateTime<Utc>,
    pub source: String,
    pub memo: Option<String>,

    pub deposit_lamports: u64,

    pub status: AccountStatus,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub reclaimable_since: Option<DateTime<Utc>>,
    pub reclaimed_at: Option<DateTime<Utc>>,
    pub reclaim_signature: Option<String>,
    pub reclaimed_lamports: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Reclaimable,
    Locked,
    Closed,
    Reclaimed,
    Error,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountStatus::Active => "Active",
            AccountStatus::Reclaimable => "Reclaimable",
            AccountStatus::Locked => "Locked",
            AccountStatus::Closed => "Closed",
            AccountStatus::Reclaimed => "Reclaimed",
            AccountStatus::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Active" => Ok(AccountStatus::Active),
            "Reclaimable" => Ok(AccountStatus::Reclaimable),
            "Locked" => Ok(AccountStatus::Locked),
            "Closed" => Ok(AccountStatus::Closed),
            "Reclaimed" => Ok(AccountStatus::Reclaimed),
            "Error" => Ok(AccountStatus::Error),
            _ => Err(()),
        }
    }
}

/// Resource kinds the crawler resolves; anything else is discarded at
/// extraction time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceKind {
    AssociatedTokenAccount,
    TokenAccount,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::AssociatedTokenAccount => "AssociatedTokenAccount",
            ResourceKind::TokenAccount => "TokenAccount",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AssociatedTokenAccount" => Ok(ResourceKind::AssociatedTokenAccount),
            "TokenAccount" => Ok(ResourceKind::TokenAccount),
            _ => Err(()),
        }
    }
}

/// A position in an operator's transaction history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub signature: String,
    pub slot: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanStatus {
    Pending,
    Scanning,
    Complete,
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanStatus::Pending => "Pending",
            ScanStatus::Scanning => "Scanning",
            ScanStatus::Complete => "Complete",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ScanStatus::Pending),
            "Scanning" => Ok(ScanStatus::Scanning),
            "Complete" => Ok(ScanStatus::Complete),
            _ => Err(()),
        }
    }
}

/// Persisted crawl progress, one row per operator. The window
/// `[oldest, newest]` only ever grows; rows are never deleted.
#[derive(Debug, Clone)]
pub struct ScanCheckpoint {
    pub operator: String,
    pub oldest: Option<Cursor>,
    pub newest: Option<Cursor>,
    pub status: ScanStatus,
    pub first_scan_complete: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub total_accounts: u64,
    pub reclaimable_count: u64,
    pub reclaimable_lamports: u64,
}

/// Partial checkpoint write. Cursor fields only ever extend the window:
/// an oldest cursor with a higher slot than the stored one is ignored,
/// as is a newest cursor with a lower slot.
#[derive(Debug, Clone, Default)]
pub struct CheckpointUpdate {
    pub oldest: Option<Cursor>,
    pub newest: Option<Cursor>,
    pub status: Option<ScanStatus>,
    pub first_scan_complete: Option<bool>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Extra fields carried along a status transition.
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
    pub verified_at: Option<DateTime<Utc>>,
    pub reclaim_signature: Option<String>,
    pub reclaimed_lamports: Option<u64>,
    pub error: Option<String>,
}

impl StatusChange {
    pub fn verified_now() -> Self {
        Self {
            verified_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            verified_at: Some(Utc::now()),
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Append-only fee/cost ledger entry for an operator-paid transaction.
#[derive(Debug, Clone)]
pub struct FeeRecord {
    pub signature: String,
    pub operator: String,
    pub slot: u64,
    pub fee_lamports: u64,
    pub block_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct WhitelistEntry {
    pub address: String,
    pub label: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Per-operator rollup backing the stats command and checkpoint totals.
#[derive(Debug, Clone, Serialize)]
pub struct OperatorStats {
    pub total_accounts: u64,
    pub active: u64,
    pub reclaimable: u64,
    pub locked: u64,
    pub closed: u64,
    pub reclaimed: u64,
    pub error: u64,
    pub reclaimable_lamports: u64,
    pub reclaimed_lamports: u64,
    pub fee_lamports: u64,
}
