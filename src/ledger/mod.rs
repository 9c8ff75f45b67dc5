pub mod client;
pub mod provider;
pub mod retry;
pub mod rpc;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use client::LedgerClient;
pub use rpc::RpcLedgerClient;
pub use types::{
    AccountState, BalanceChange, EventTypeHint, HistoryQuery, InstructionRecord, TransactionRecord,
};
