use std::sync::Arc;

use solana_program::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::Result;
use crate::ledger::types::AccountState;
use crate::ledger::LedgerClient;
use crate::storage::models::AccountStatus;

/// Accounts fetched per provider round-trip.
pub const VERIFY_BATCH_SIZE: usize = 100;

/// Authoritative classification of one candidate from current chain
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAccount {
    pub address: Pubkey,
    pub status: VerifiedStatus,
    pub lamports: u64,
    pub can_reclaim: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedStatus {
    /// Account no longer exists on chain.
    Closed,
    /// Empty token account whose close authority is the operator.
    Reclaimable,
    /// Empty token account the operator cannot close.
    Locked,
    /// Token balance is non-zero; the value still belongs to the user.
    Active,
    /// Exists but is not a recognized resource kind; excluded from the
    /// reclaim set.
    Unrecognized,
}

impl VerifiedStatus {
    /// Stored status for this verification result. Unrecognized shapes
    /// persist as Locked so they drop out of both the reclaim set and
    /// the hourly refresh.
    pub fn storage_status(self) -> AccountStatus {
        match self {
            VerifiedStatus::Closed => AccountStatus::Closed,
            VerifiedStatus::Reclaimable => AccountStatus::Reclaimable,
            VerifiedStatus::Locked | VerifiedStatus::Unrecognized => AccountStatus::Locked,
            VerifiedStatus::Active => AccountStatus::Active,
        }
    }
}

/// Stateless reconciliation of candidate accounts against current chain
/// state. Safe to call redundantly; both the discovery and reclaim
/// engines share it.
pub struct Verifier {
    ledger: Arc<dyn LedgerClient>,
    operator: Pubkey,
}

impl Verifier {
    pub fn new(ledger: Arc<dyn LedgerClient>, operator: Pubkey) -> Self {
        Self { ledger, operator }
    }

    pub async fn verify(&self, candidates: &[Pubkey]) -> Result<Vec<VerifiedAccount>> {
        let mut results = Vec::with_capacity(candidates.len());

        for chunk in candidates.chunks(VERIFY_BATCH_SIZE) {
            debug!("verifying batch of {} accounts", chunk.len());
            let states = self.ledger.fetch_account_states(chunk).await?;

            for (address, state) in chunk.iter().zip(states) {
                results.push(classify(address, state.as_ref(), &self.operator));
            }
        }

        Ok(results)
    }
}

/// Classify one account from its current state. Pure function; the
/// verifier and the reclaim double-tap both go through here.
pub fn classify(
    address: &Pubkey,
    state: Option<&AccountState>,
    operator: &Pubkey,
) -> VerifiedAccount {
    let Some(state) = state else {
        return VerifiedAccount {
            address: *address,
            status: VerifiedStatus::Closed,
            lamports: 0,
            can_reclaim: false,
        };
    };

    let token_account = if state.owner == spl_token::id() {
        spl_token::state::Account::unpack(&state.data).ok()
    } else {
        None
    };

    let Some(token_account) = token_account else {
        return VerifiedAccount {
            address: *address,
            status: VerifiedStatus::Unrecognized,
            lamports: state.lamports,
            can_reclaim: false,
        };
    };

    if token_account.amount > 0 {
        return VerifiedAccount {
            address: *address,
            status: VerifiedStatus::Active,
            lamports: state.lamports,
            can_reclaim: false,
        };
    }

    // Close authority falls back to the token owner when unset.
    let closer = token_account
        .close_authority
        .unwrap_or(token_account.owner);

    if closer == *operator {
        VerifiedAccount {
            address: *address,
            status: VerifiedStatus::Reclaimable,
            lamports: state.lamports,
            can_reclaim: true,
        }
    } else {
        VerifiedAccount {
            address: *address,
            status: VerifiedStatus::Locked,
            lamports: state.lamports,
            can_reclaim: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::{token_account_state, MockLedger, TOKEN_ACCOUNT_RENT};

    #[test]
    fn missing_account_is_closed() {
        let address = Pubkey::new_unique();
        let operator = Pubkey::new_unique();

        let result = classify(&address, None, &operator);
        assert_eq!(result.status, VerifiedStatus::Closed);
        assert!(!result.can_reclaim);
    }

    #[test]
    fn empty_account_with_operator_close_authority_is_reclaimable() {
        let address = Pubkey::new_unique();
        let operator = Pubkey::new_unique();
        let user = Pubkey::new_unique();

        let state = token_account_state(
            address,
            Pubkey::new_unique(),
            user,
            0,
            Some(operator),
            TOKEN_ACCOUNT_RENT,
        );

        let result = classify(&address, Some(&state), &operator);
        assert_eq!(result.status, VerifiedStatus::Reclaimable);
        assert!(result.can_reclaim);
        assert_eq!(result.lamports, TOKEN_ACCOUNT_RENT);
    }

    #[test]
    fn close_authority_defaults_to_token_owner() {
        let address = Pubkey::new_unique();
        let operator = Pubkey::new_unique();

        let state = token_account_state(
            address,
            Pubkey::new_unique(),
            operator,
            0,
            None,
            TOKEN_ACCOUNT_RENT,
        );

        let result = classify(&address, Some(&state), &operator);
        assert_eq!(result.status, VerifiedStatus::Reclaimable);
    }

    #[test]
    fn empty_account_with_foreign_authority_is_locked() {
        let address = Pubkey::new_unique();
        let operator = Pubkey::new_unique();
        let user = Pubkey::new_unique();

        let state = token_account_state(
            address,
            Pubkey::new_unique(),
            user,
            0,
            Some(user),
            TOKEN_ACCOUNT_RENT,
        );

        let result = classify(&address, Some(&state), &operator);
        assert_eq!(result.status, VerifiedStatus::Locked);
        assert!(!result.can_reclaim);
    }

    #[test]
    fn funded_account_stays_active_regardless_of_authority() {
        let address = Pubkey::new_unique();
        let operator = Pubkey::new_unique();

        let state = token_account_state(
            address,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            1_000,
            Some(operator),
            TOKEN_ACCOUNT_RENT,
        );

        let result = classify(&address, Some(&state), &operator);
        assert_eq!(result.status, VerifiedStatus::Active);
        assert!(!result.can_reclaim);
    }

    #[test]
    fn unrecognized_shape_is_reported_not_reclaimable() {
        let address = Pubkey::new_unique();
        let operator = Pubkey::new_unique();

        let state = crate::ledger::types::AccountState {
            address,
            lamports: 1_000_000,
            data: vec![1, 2, 3],
            owner: Pubkey::new_unique(),
        };

        let result = classify(&address, Some(&state), &operator);
        assert_eq!(result.status, VerifiedStatus::Unrecognized);
        assert!(!result.can_reclaim);
        assert_eq!(result.status.storage_status(), AccountStatus::Locked);
    }

    #[tokio::test]
    async fn verify_is_idempotent_over_batches() {
        let ledger = std::sync::Arc::new(MockLedger::new());
        let operator = Pubkey::new_unique();
        let address = Pubkey::new_unique();

        ledger.set_account(token_account_state(
            address,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            0,
            Some(operator),
            TOKEN_ACCOUNT_RENT,
        ));

        let verifier = Verifier::new(ledger, operator);
        let first = verifier.verify(&[address]).await.unwrap();
        let second = verifier.verify(&[address]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].status, VerifiedStatus::Reclaimable);
    }
}
