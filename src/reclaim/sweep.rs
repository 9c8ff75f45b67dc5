use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use tracing::{debug, info};

use crate::error::Result;
use crate::ledger::LedgerClient;

/// Post-cycle sweep of the operator's spendable balance to a forwarding
/// destination, keeping a reserve back for future fees.
pub struct TreasurySweeper {
    ledger: Arc<dyn LedgerClient>,
    signer: Keypair,
    destination: Pubkey,
    reserve_lamports: u64,
}

impl TreasurySweeper {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Keypair,
        destination: Pubkey,
        reserve_lamports: u64,
    ) -> Self {
        Self {
            ledger,
            signer,
            destination,
            reserve_lamports,
        }
    }

    /// Transfer the surplus above the reserve floor, if any. Returns the
    /// signature and amount moved, or `None` when there is nothing to
    /// sweep.
    pub async fn sweep(&self) -> Result<Option<(Signature, u64)>> {
        let operator = self.signer.pubkey();
        let balance = self.ledger.balance(&operator).await?;

        if balance <= self.reserve_lamports {
            debug!(
                "operator balance {} at or below reserve {}, nothing to sweep",
                balance, self.reserve_lamports
            );
            return Ok(None);
        }

        let surplus = balance - self.reserve_lamports;
        let blockhash = self.ledger.latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &[system_instruction::transfer(
                &operator,
                &self.destination,
                surplus,
            )],
            Some(&operator),
            &[&self.signer],
            blockhash,
        );

        let signature = self.ledger.submit_mutation(&transaction).await?;
        info!(
            "swept {} lamports to {} | {}",
            surplus, self.destination, signature
        );

        Ok(Some((signature, surplus)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;

    #[tokio::test]
    async fn sweeps_surplus_above_reserve() {
        let ledger = Arc::new(MockLedger::new());
        let signer = Keypair::new();
        let operator = signer.pubkey();
        ledger.set_balance(operator, 5_000_000_000);

        let sweeper = TreasurySweeper::new(
            ledger.clone(),
            signer,
            Pubkey::new_unique(),
            2_000_000_000,
        );

        let swept = sweeper.sweep().await.unwrap();
        let (_, amount) = swept.unwrap();
        assert_eq!(amount, 3_000_000_000);
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[tokio::test]
    async fn leaves_balance_at_or_below_reserve_alone() {
        let ledger = Arc::new(MockLedger::new());
        let signer = Keypair::new();
        let operator = signer.pubkey();
        ledger.set_balance(operator, 1_500_000_000);

        let sweeper = TreasurySweeper::new(
            ledger.clone(),
            signer,
            Pubkey::new_unique(),
            2_000_000_000,
        );

        assert!(sweeper.sweep().await.unwrap().is_none());
        assert!(ledger.submissions().is_empty());
    }
}
