use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::ledger::LedgerClient;
use crate::notify::{Notifier, ReclaimCompleted};
use crate::storage::models::{AccountStatus, StatusChange};
use crate::storage::Database;
use crate::verify::{self, VerifiedStatus, VERIFY_BATCH_SIZE};

/// Safety limits applied to every reclaim run.
#[derive(Debug, Clone)]
pub struct ReclaimPolicy {
    /// Close instructions per transaction.
    pub batch_size: usize,
    /// Circuit breaker ceiling on a single batch's summed value.
    pub max_batch_lamports: u64,
    /// Cool-down: minimum age since an account was classified
    /// reclaimable.
    pub min_reclaimable_age: Duration,
    pub priority_fee_micro_lamports: u64,
    pub dry_run: bool,
}

impl ReclaimPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.reclaim.batch_size,
            max_batch_lamports: crate::utils::sol_to_lamports(config.reclaim.max_batch_sol),
            min_reclaimable_age: Duration::hours(config.reclaim.min_reclaimable_age_hours as i64),
            priority_fee_micro_lamports: config.reclaim.priority_fee_micro_lamports,
            dry_run: config.reclaim.dry_run,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReclaimSummary {
    /// Accounts that passed the double-tap and entered batching.
    pub attempted: usize,
    pub reclaimed: usize,
    pub failed: usize,
    /// Accounts whose balance came back between classification and
    /// execution; reverted to Active.
    pub revived: usize,
    /// Accounts that disappeared before we got to them.
    pub already_closed: usize,
    pub skipped_whitelisted: usize,
    pub skipped_cooldown: usize,
    pub lamports_recovered: u64,
    pub signatures: Vec<String>,
    pub dry_run: bool,
}

/// Executes account-closing mutations against confirmed-eligible
/// accounts, with a hard ceiling on the value any single batch may
/// move. Batches run strictly sequentially.
pub struct ReclaimEngine {
    ledger: Arc<dyn LedgerClient>,
    db: Arc<Database>,
    signer: Keypair,
    treasury: Pubkey,
    policy: ReclaimPolicy,
    notifier: Option<Arc<Notifier>>,
}

impl ReclaimEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        db: Arc<Database>,
        signer: Keypair,
        treasury: Pubkey,
        policy: ReclaimPolicy,
        notifier: Option<Arc<Notifier>>,
    ) -> Self {
        Self {
            ledger,
            db,
            signer,
            treasury,
            policy,
            notifier,
        }
    }

    pub fn operator(&self) -> Pubkey {
        self.signer.pubkey()
    }

    /// Reclaim every account currently marked reclaimable, minus the
    /// whitelist and anything still inside the cool-down window.
    pub async fn reclaim_eligible(&self) -> Result<ReclaimSummary> {
        let operator = self.operator();
        let rows = self
            .db
            .get_by_status(Some(&operator.to_string()), AccountStatus::Reclaimable)?;
        let whitelist: HashSet<String> = self
            .db
            .get_whitelist()?
            .into_iter()
            .map(|entry| entry.address)
            .collect();

        let now = Utc::now();
        let mut addresses = Vec::new();
        let mut skipped_whitelisted = 0;
        let mut skipped_cooldown = 0;

        for row in rows {
            if whitelist.contains(&row.address) {
                skipped_whitelisted += 1;
                continue;
            }

            // Age is measured from the moment verification first marked
            // the row reclaimable; rows missing the stamp wait for the
            // next verification pass.
            let age = row
                .reclaimable_since
                .map(|since| now - since)
                .unwrap_or_else(Duration::zero);
            if age < self.policy.min_reclaimable_age {
                skipped_cooldown += 1;
                continue;
            }

            addresses.push(Pubkey::from_str(&row.address)?);
        }

        let mut summary = self.reclaim_accounts(&addresses).await?;
        summary.skipped_whitelisted = skipped_whitelisted;
        summary.skipped_cooldown = skipped_cooldown;
        Ok(summary)
    }

    /// Close the given accounts, re-confirming eligibility directly
    /// against the chain immediately before any mutation.
    pub async fn reclaim_accounts(&self, addresses: &[Pubkey]) -> Result<ReclaimSummary> {
        let operator = self.operator();
        let mut summary = ReclaimSummary {
            dry_run: self.policy.dry_run,
            ..Default::default()
        };

        // Double-tap: fresh state, not the cached classification.
        let mut eligible: Vec<(Pubkey, u64)> = Vec::new();
        for chunk in addresses.chunks(VERIFY_BATCH_SIZE) {
            let states = self.ledger.fetch_account_states(chunk).await?;
            for (address, state) in chunk.iter().zip(states) {
                let checked = verify::classify(address, state.as_ref(), &operator);
                match checked.status {
                    VerifiedStatus::Reclaimable => eligible.push((*address, checked.lamports)),
                    VerifiedStatus::Active => {
                        info!("{} revived since classification, skipping", address);
                        summary.revived += 1;
                        self.db.update_account_status(
                            &address.to_string(),
                            AccountStatus::Active,
                            &StatusChange::verified_now(),
                        )?;
                    }
                    VerifiedStatus::Closed => {
                        summary.already_closed += 1;
                        self.db.update_account_status(
                            &address.to_string(),
                            AccountStatus::Closed,
                            &StatusChange::verified_now(),
                        )?;
                    }
                    VerifiedStatus::Locked | VerifiedStatus::Unrecognized => {
                        self.db.update_account_status(
                            &address.to_string(),
                            checked.status.storage_status(),
                            &StatusChange::verified_now(),
                        )?;
                    }
                }
            }
        }

        summary.attempted = eligible.len();
        if eligible.is_empty() {
            return Ok(summary);
        }

        info!(
            "reclaiming {} accounts in batches of {}",
            eligible.len(),
            self.policy.batch_size
        );

        for batch in eligible.chunks(self.policy.batch_size) {
            self.reclaim_batch(batch, &mut summary).await?;
        }

        Ok(summary)
    }

    /// Execute one batch: circuit breaker, then an atomic submit, then a
    /// per-account fallback if the batch as a whole is rejected.
    async fn reclaim_batch(
        &self,
        batch: &[(Pubkey, u64)],
        summary: &mut ReclaimSummary,
    ) -> Result<()> {
        let total: u64 = batch.iter().map(|(_, lamports)| lamports).sum();

        if total > self.policy.max_batch_lamports {
            warn!(
                "circuit breaker: batch value {} exceeds ceiling {}, aborting batch",
                total, self.policy.max_batch_lamports
            );
            for (address, _) in batch {
                self.db.update_account_status(
                    &address.to_string(),
                    AccountStatus::Error,
                    &StatusChange::with_error(format!(
                        "circuit breaker: batch value {} lamports exceeds ceiling {}",
                        total, self.policy.max_batch_lamports
                    )),
                )?;
            }
            summary.failed += batch.len();
            return Ok(());
        }

        if self.policy.dry_run {
            info!(
                "DRY RUN: would close {} accounts for {} lamports",
                batch.len(),
                total
            );
            summary.reclaimed += batch.len();
            summary.lamports_recovered += total;
            return Ok(());
        }

        match self.submit_close_batch(batch).await {
            Ok(signature) => {
                for (address, lamports) in batch {
                    self.mark_reclaimed(address, *lamports, &signature)?;
                }
                summary.reclaimed += batch.len();
                summary.lamports_recovered += total;
                summary.signatures.push(signature.to_string());
                self.notify(total, batch.len(), &signature);
            }
            Err(e) => {
                warn!(
                    "batch submission failed ({}), retrying {} accounts individually",
                    e,
                    batch.len()
                );
                for (address, lamports) in batch {
                    match self.submit_close_batch(&[(*address, *lamports)]).await {
                        Ok(signature) => {
                            self.mark_reclaimed(address, *lamports, &signature)?;
                            summary.reclaimed += 1;
                            summary.lamports_recovered += lamports;
                            summary.signatures.push(signature.to_string());
                            self.notify(*lamports, 1, &signature);
                        }
                        Err(e) => {
                            warn!("failed to reclaim {}: {}", address, e);
                            self.db.update_account_status(
                                &address.to_string(),
                                AccountStatus::Error,
                                &StatusChange::with_error(e.to_string()),
                            )?;
                            summary.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn submit_close_batch(&self, batch: &[(Pubkey, u64)]) -> Result<Signature> {
        let mut instructions = vec![ComputeBudgetInstruction::set_compute_unit_price(
            self.policy.priority_fee_micro_lamports,
        )];

        for (address, _) in batch {
            instructions.push(spl_token::instruction::close_account(
                &spl_token::id(),
                address,
                &self.treasury,
                &self.signer.pubkey(),
                &[],
            )?);
        }

        let blockhash = self.ledger.latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.signer.pubkey()),
            &[&self.signer],
            blockhash,
        );

        self.ledger.submit_mutation(&transaction).await
    }

    fn mark_reclaimed(&self, address: &Pubkey, lamports: u64, signature: &Signature) -> Result<()> {
        info!(
            "reclaimed {} lamports from {} | {}",
            lamports, address, signature
        );
        self.db.update_account_status(
            &address.to_string(),
            AccountStatus::Reclaimed,
            &StatusChange {
                verified_at: Some(Utc::now()),
                reclaim_signature: Some(signature.to_string()),
                reclaimed_lamports: Some(lamports),
                error: None,
            },
        )
    }

    fn notify(&self, lamports: u64, count: usize, signature: &Signature) {
        if let Some(notifier) = &self.notifier {
            notifier.reclaim_completed(ReclaimCompleted {
                lamports_recovered: lamports,
                account_count: count,
                signature: signature.to_string(),
            });
        }
    }
}
