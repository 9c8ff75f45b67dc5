use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::Result;
use crate::ledger::types::{AccountState, HistoryQuery, TransactionRecord};

/// Uniform access to a remote ledger provider.
///
/// One implementation per provider, selected once at startup; business
/// logic only ever sees this trait. Implementations must surface rate
/// limiting as `WardenError::RateLimited` and report a missing account on
/// a read as `Ok(None)` rather than an error.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch a page of confirmed transactions for `address`, newest first.
    async fn fetch_history(
        &self,
        address: &Pubkey,
        query: HistoryQuery,
    ) -> Result<Vec<TransactionRecord>>;

    async fn fetch_account_state(&self, address: &Pubkey) -> Result<Option<AccountState>>;

    /// Batched variant of `fetch_account_state`; result order matches input.
    async fn fetch_account_states(&self, addresses: &[Pubkey])
        -> Result<Vec<Option<AccountState>>>;

    /// Submit a signed transaction and await confirmation.
    async fn submit_mutation(&self, transaction: &Transaction) -> Result<Signature>;

    /// Rent-exempt minimum for an account of `data_len` bytes.
    async fn minimum_rent_deposit(&self, data_len: usize) -> Result<u64>;

    async fn latest_blockhash(&self) -> Result<Hash>;

    async fn balance(&self, address: &Pubkey) -> Result<u64>;
}
