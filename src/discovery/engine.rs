use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::discovery::classify::extract_candidates;
use crate::discovery::rent::RentCache;
use crate::error::Result;
use crate::ledger::retry::with_backoff;
use crate::ledger::types::{EventTypeHint, HistoryQuery, TransactionRecord};
use crate::ledger::LedgerClient;
use crate::storage::models::{
    CheckpointUpdate, Cursor, FeeRecord, ScanCheckpoint, ScanStatus, SponsoredAccount,
    StatusChange,
};
use crate::storage::Database;
use crate::verify::{VerifiedAccount, Verifier};

/// Transactions per history page.
pub const PAGE_LIMIT: usize = 100;

/// Candidates accumulated before a verify-and-persist flush.
pub const FLUSH_THRESHOLD: usize = 50;

/// Active accounts re-verified per staleness round.
pub const STALE_BATCH_SIZE: usize = 100;

/// Cap on staleness rounds per cycle.
pub const MAX_REFRESH_ROUNDS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Run the update cycle inline instead of in the background.
    pub wait_for_sync: bool,
    /// Re-verify all Active accounts now, not just stale ones.
    pub force_verify: bool,
    /// Stop the historical fill after roughly this many transactions.
    pub max_items: Option<usize>,
}

/// Snapshot returned to callers: current cached records plus checkpoint
/// progress.
#[derive(Debug)]
pub struct ScanReport {
    pub operator: Pubkey,
    pub accounts: Vec<SponsoredAccount>,
    pub checkpoint: Option<ScanCheckpoint>,
    /// True when another cycle for this operator was already running and
    /// this call only observed it.
    pub sync_in_flight: bool,
}

/// Removes the operator from the in-flight set when the cycle ends,
/// however it ends.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Pubkey>>>,
    operator: Pubkey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.operator);
    }
}

/// Incremental, bidirectional crawler over an operator's transaction
/// history. Progress is bounded by the persisted checkpoint so a cycle
/// never re-reads covered ranges, and any abort leaves the checkpoint
/// at the last fully processed transaction.
#[derive(Clone)]
pub struct DiscoveryEngine {
    ledger: Arc<dyn LedgerClient>,
    db: Arc<Database>,
    rent: Arc<RentCache>,
    in_flight: Arc<Mutex<HashSet<Pubkey>>>,
}

impl DiscoveryEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        db: Arc<Database>,
        in_flight: Arc<Mutex<HashSet<Pubkey>>>,
    ) -> Self {
        let rent = Arc::new(RentCache::new(ledger.clone()));
        Self {
            ledger,
            db,
            rent,
            in_flight,
        }
    }

    /// Return current cached records and schedule (or run) an update
    /// cycle. At most one cycle per operator is in flight at a time; a
    /// concurrent caller gets the cached view back immediately.
    pub async fn scan(&self, operator: Pubkey, options: ScanOptions) -> Result<ScanReport> {
        let Some(guard) = self.try_begin(operator) else {
            debug!("scan already in flight for {}", operator);
            return self.cached_report(&operator, true);
        };

        if options.wait_for_sync {
            let result = self.run_cycle(&operator, &options).await;
            drop(guard);
            if let Err(e) = result {
                warn!("discovery cycle for {} aborted: {}", operator, e);
            }
        } else {
            let engine = self.clone();
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(e) = engine.run_cycle(&operator, &options).await {
                    warn!("discovery cycle for {} aborted: {}", operator, e);
                }
            });
        }

        self.cached_report(&operator, false)
    }

    /// Real-time ingestion path: apply the historical extraction and
    /// persistence pipeline to transactions pushed by an external
    /// listener. Checkpoint cursors are left alone since pushed events
    /// carry no pagination position.
    pub async fn handle_external_event(
        &self,
        transactions: &[TransactionRecord],
        operators: &HashSet<Pubkey>,
    ) -> Result<usize> {
        let deposit = self.rent.token_account_deposit().await?;
        let mut total = 0;

        for operator in operators {
            let mut pending = Vec::new();
            let mut fees = Vec::new();

            for tx in transactions {
                self.collect(tx, operator, deposit, "webhook", &mut pending, &mut fees);
            }

            total += pending.len();
            self.flush(operator, &mut pending, &mut fees, None, None).await?;
        }

        Ok(total)
    }

    fn try_begin(&self, operator: Pubkey) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().unwrap();
        if !set.insert(operator) {
            return None;
        }
        Some(InFlightGuard {
            set: self.in_flight.clone(),
            operator,
        })
    }

    fn cached_report(&self, operator: &Pubkey, sync_in_flight: bool) -> Result<ScanReport> {
        let op_key = operator.to_string();
        Ok(ScanReport {
            operator: *operator,
            accounts: self.db.get_accounts_for_operator(&op_key)?,
            checkpoint: self.db.get_checkpoint(&op_key)?,
            sync_in_flight,
        })
    }

    async fn run_cycle(&self, operator: &Pubkey, options: &ScanOptions) -> Result<()> {
        let op_key = operator.to_string();
        info!("starting discovery cycle for {}", operator);

        self.db.update_checkpoint(
            &op_key,
            &CheckpointUpdate {
                status: Some(ScanStatus::Scanning),
                ..Default::default()
            },
        )?;

        let first_scan_complete = self
            .db
            .get_checkpoint(&op_key)?
            .map(|c| c.first_scan_complete)
            .unwrap_or(false);

        if !first_scan_complete {
            self.historical_fill(operator, options).await?;
        }
        self.incremental_fill(operator).await?;
        self.refresh_stale(operator, options.force_verify).await?;

        self.db.update_checkpoint(
            &op_key,
            &CheckpointUpdate {
                status: Some(ScanStatus::Complete),
                synced_at: Some(Utc::now()),
                ..Default::default()
            },
        )?;

        info!("discovery cycle complete for {}", operator);
        Ok(())
    }

    /// Walk history backward from the oldest known cursor until the
    /// provider runs out of pages or the item cap is hit. Every abort
    /// path flushes what was processed first, so the checkpoint always
    /// reflects real progress.
    async fn historical_fill(&self, operator: &Pubkey, options: &ScanOptions) -> Result<()> {
        let op_key = operator.to_string();
        let deposit = self.rent.token_account_deposit().await?;

        let checkpoint = self.db.get_checkpoint(&op_key)?;
        let mut before = checkpoint
            .as_ref()
            .and_then(|c| c.oldest.as_ref())
            .map(|c| c.signature.clone());
        let bootstrap_newest = checkpoint.as_ref().and_then(|c| c.newest.as_ref()).is_none();

        let mut pending: Vec<SponsoredAccount> = Vec::new();
        let mut fees: Vec<FeeRecord> = Vec::new();
        let mut cursor: Option<Cursor> = None;
        let mut processed = 0usize;

        loop {
            let query = HistoryQuery {
                before: before.clone(),
                limit: PAGE_LIMIT,
                type_hint: Some(EventTypeHint::AccountCreation),
            };
            let page = match with_backoff("fetch_history", || {
                self.ledger.fetch_history(operator, query.clone())
            })
            .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.flush(operator, &mut pending, &mut fees, cursor.as_ref(), None)
                        .await?;
                    return Err(e);
                }
            };

            if page.is_empty() {
                self.flush(operator, &mut pending, &mut fees, cursor.as_ref(), None)
                    .await?;
                self.db.update_checkpoint(
                    &op_key,
                    &CheckpointUpdate {
                        first_scan_complete: Some(true),
                        ..Default::default()
                    },
                )?;
                info!(
                    "history exhausted for {} after {} transactions",
                    operator, processed
                );
                return Ok(());
            }

            // The first page of the first ever fill also fixes the upper
            // boundary for later incremental runs.
            if bootstrap_newest && processed == 0 {
                if let Some(head) = page.first() {
                    self.db.update_checkpoint(
                        &op_key,
                        &CheckpointUpdate {
                            newest: Some(Cursor {
                                signature: head.signature.clone(),
                                slot: head.slot,
                            }),
                            ..Default::default()
                        },
                    )?;
                }
            }

            for tx in &page {
                self.collect(tx, operator, deposit, "historical-scan", &mut pending, &mut fees);
                cursor = Some(Cursor {
                    signature: tx.signature.clone(),
                    slot: tx.slot,
                });
                if pending.len() >= FLUSH_THRESHOLD {
                    self.flush(operator, &mut pending, &mut fees, cursor.as_ref(), None)
                        .await?;
                }
            }

            processed += page.len();
            before = page.last().map(|tx| tx.signature.clone());
            self.flush(operator, &mut pending, &mut fees, cursor.as_ref(), None)
                .await?;

            if let Some(cap) = options.max_items {
                if processed >= cap {
                    // Explicit partial stop; the completion flag stays
                    // false so the next cycle keeps digging.
                    info!(
                        "historical fill for {} stopped at item cap ({})",
                        operator, processed
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Walk newer history until a page contains the previously recorded
    /// newest signature, keeping only transactions above that seam.
    async fn incremental_fill(&self, operator: &Pubkey) -> Result<()> {
        let op_key = operator.to_string();
        let Some(seam) = self.db.get_checkpoint(&op_key)?.and_then(|c| c.newest) else {
            return Ok(());
        };
        let deposit = self.rent.token_account_deposit().await?;

        let mut before: Option<String> = None;
        let mut boundary: Option<Cursor> = None;
        let mut pending: Vec<SponsoredAccount> = Vec::new();
        let mut fees: Vec<FeeRecord> = Vec::new();

        loop {
            let query = HistoryQuery {
                before: before.clone(),
                limit: PAGE_LIMIT,
                type_hint: Some(EventTypeHint::AccountCreation),
            };
            let page = match with_backoff("fetch_history", || {
                self.ledger.fetch_history(operator, query.clone())
            })
            .await
            {
                Ok(page) => page,
                Err(e) => {
                    // Persist what we have; the boundary is deliberately
                    // not advanced so the gap is retried next cycle.
                    self.flush(operator, &mut pending, &mut fees, None, None).await?;
                    return Err(e);
                }
            };

            if page.is_empty() {
                break;
            }

            if boundary.is_none() {
                boundary = page.first().map(|head| Cursor {
                    signature: head.signature.clone(),
                    slot: head.slot,
                });
            }

            let mut seam_found = false;
            for tx in &page {
                if tx.signature == seam.signature {
                    seam_found = true;
                    break;
                }
                self.collect(tx, operator, deposit, "incremental-scan", &mut pending, &mut fees);
                if pending.len() >= FLUSH_THRESHOLD {
                    self.flush(operator, &mut pending, &mut fees, None, None).await?;
                }
            }

            if seam_found {
                break;
            }
            before = page.last().map(|tx| tx.signature.clone());
        }

        self.flush(operator, &mut pending, &mut fees, None, boundary.as_ref())
            .await?;
        Ok(())
    }

    /// Re-verify Active accounts whose last check has gone stale, plus
    /// Error rows from earlier cycles, in capped rounds.
    async fn refresh_stale(&self, operator: &Pubkey, force: bool) -> Result<()> {
        let op_key = operator.to_string();
        let cutoff = if force {
            Utc::now()
        } else {
            Utc::now() - Duration::hours(1)
        };
        let verifier = Verifier::new(self.ledger.clone(), *operator);

        for round in 0..MAX_REFRESH_ROUNDS {
            let batch = self.db.get_stale_verifiable(&op_key, cutoff, STALE_BATCH_SIZE)?;
            if batch.is_empty() {
                break;
            }

            let addresses: Vec<Pubkey> = batch
                .iter()
                .filter_map(|account| Pubkey::from_str(&account.address).ok())
                .collect();
            let verified = verifier.verify(&addresses).await?;
            self.apply_verification(&verified)?;
            debug!("staleness round {}: re-verified {} accounts", round, batch.len());

            if batch.len() < STALE_BATCH_SIZE {
                break;
            }
        }

        Ok(())
    }

    fn collect(
        &self,
        tx: &TransactionRecord,
        operator: &Pubkey,
        deposit: u64,
        source: &str,
        pending: &mut Vec<SponsoredAccount>,
        fees: &mut Vec<FeeRecord>,
    ) {
        if tx.fee_payer == Some(*operator) {
            fees.push(FeeRecord {
                signature: tx.signature.clone(),
                operator: operator.to_string(),
                slot: tx.slot,
                fee_lamports: tx.fee,
                block_time: tx.block_time,
            });
        }

        for candidate in extract_candidates(tx, operator, deposit) {
            pending.push(candidate.into_account(operator, source));
        }
    }

    /// Persist accumulated fees and candidates, verify the candidates,
    /// and write an intermediate checkpoint.
    async fn flush(
        &self,
        operator: &Pubkey,
        pending: &mut Vec<SponsoredAccount>,
        fees: &mut Vec<FeeRecord>,
        oldest: Option<&Cursor>,
        newest: Option<&Cursor>,
    ) -> Result<()> {
        if !fees.is_empty() {
            self.db.record_fees(fees)?;
            fees.clear();
        }

        if !pending.is_empty() {
            let addresses: Vec<Pubkey> = pending
                .iter()
                .filter_map(|account| Pubkey::from_str(&account.address).ok())
                .collect();

            self.db.upsert_accounts(pending)?;

            let verifier = Verifier::new(self.ledger.clone(), *operator);
            let verified = verifier.verify(&addresses).await?;
            self.apply_verification(&verified)?;

            debug!("flushed {} candidates for {}", pending.len(), operator);
            pending.clear();
        }

        self.db.update_checkpoint(
            &operator.to_string(),
            &CheckpointUpdate {
                oldest: oldest.cloned(),
                newest: newest.cloned(),
                ..Default::default()
            },
        )?;

        Ok(())
    }

    fn apply_verification(&self, verified: &[VerifiedAccount]) -> Result<()> {
        for result in verified {
            self.db.update_account_status(
                &result.address.to_string(),
                result.status.storage_status(),
                &StatusChange::verified_now(),
            )?;
        }
        Ok(())
    }
}
