use chrono::{DateTime, Utc};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

/// One confirmed transaction, reduced to the shape the pipeline needs
/// regardless of which provider produced it.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub fee: u64,
    pub fee_payer: Option<Pubkey>,
    pub memo: Option<String>,
    pub balance_changes: Vec<BalanceChange>,
    pub instructions: Vec<InstructionRecord>,
}

/// Native balance movement of one account within a transaction.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    pub account: Pubkey,
    pub before: u64,
    pub after: u64,
}

impl BalanceChange {
    pub fn delta(&self) -> i128 {
        self.after as i128 - self.before as i128
    }
}

/// One decoded (or partially decoded) instruction.
///
/// `parsed` carries the provider's JSON payload for instructions the RPC
/// node could decode; `accounts` carries the referenced keys for those it
/// could not. Pattern matchers in discovery consume both forms.
#[derive(Debug, Clone)]
pub struct InstructionRecord {
    pub program: String,
    pub program_id: Pubkey,
    pub accounts: Vec<Pubkey>,
    pub parsed: Option<Value>,
}

/// Current on-chain state of an account.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub address: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
    pub owner: Pubkey,
}

/// Narrow event-type filter hint; providers that cannot filter server-side
/// are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTypeHint {
    AccountCreation,
}

/// Page request for `LedgerClient::fetch_history`.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Fetch transactions strictly older than this signature.
    pub before: Option<String>,
    pub limit: usize,
    pub type_hint: Option<EventTypeHint>,
}

impl HistoryQuery {
    pub fn page(before: Option<String>, limit: usize) -> Self {
        Self {
            before,
            limit,
            type_hint: None,
        }
    }
}
