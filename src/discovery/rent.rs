use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::ledger::LedgerClient;

/// Byte size of an SPL token account.
pub const TOKEN_ACCOUNT_SIZE: usize = 165;

/// Slack allowed when matching a balance delta against the deposit,
/// covering fee rounding in provider-reported balances.
pub const DEPOSIT_TOLERANCE_LAMPORTS: u64 = 5_000;

/// Caches the rent-exempt deposit for a token account.
///
/// The value is fetched from the ledger once per process rather than
/// hard-coded, so the crawler keeps working across rent parameter
/// changes.
pub struct RentCache {
    ledger: Arc<dyn LedgerClient>,
    token_account_deposit: Mutex<Option<u64>>,
}

impl RentCache {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            token_account_deposit: Mutex::new(None),
        }
    }

    /// Rent-exempt deposit for a token account, fetched once and cached.
    pub async fn token_account_deposit(&self) -> Result<u64> {
        let mut cached = self.token_account_deposit.lock().await;
        if let Some(deposit) = *cached {
            return Ok(deposit);
        }

        let deposit = self.ledger.minimum_rent_deposit(TOKEN_ACCOUNT_SIZE).await?;
        debug!("token account rent-exempt deposit: {} lamports", deposit);
        *cached = Some(deposit);
        Ok(deposit)
    }
}

/// Whether a positive balance delta looks like the sponsorship deposit.
pub fn matches_deposit(delta: u64, deposit: u64) -> bool {
    delta.abs_diff(deposit) <= DEPOSIT_TOLERANCE_LAMPORTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_matching_window() {
        let deposit = 2_039_280;
        assert!(matches_deposit(deposit, deposit));
        assert!(matches_deposit(deposit - 5_000, deposit));
        assert!(matches_deposit(deposit + 5_000, deposit));
        assert!(!matches_deposit(deposit + 5_001, deposit));
        assert!(!matches_deposit(deposit / 2, deposit));
    }
}
