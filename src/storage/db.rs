use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::error::Result;
use crate::storage::models::{
    AccountStatus, CheckpointUpdate, Cursor, FeeRecord, OperatorStats, ResourceKind,
    ScanCheckpoint, ScanStatus, SponsoredAccount, StatusChange, WhitelistEntry,
};

/// SQLite-backed repository for accounts, checkpoints, fees and the
/// whitelist. All writes are idempotent upserts; the connection is
/// serialized behind a mutex so the repository can be shared across
/// tasks.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sponsored_accounts (
                address TEXT PRIMARY KEY,
                operator TEXT NOT NULL,
                owner TEXT,
                mint TEXT,
                kind TEXT NOT NULL,
                discovery_signature TEXT,
                discovery_slot INTEGER,
                first_seen_at TEXT NOT NULL,
                source TEXT NOT NULL,
                memo TEXT,
                deposit_lamports INTEGER NOT NULL,
                status TEXT NOT NULL,
                last_verified_at TEXT,
                reclaimable_since TEXT,
                reclaimed_at TEXT,
                reclaim_signature TEXT,
                reclaimed_lamports INTEGER,
                last_error TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_accounts_operator_status
             ON sponsored_accounts(operator, status)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS scan_checkpoints (
                operator TEXT PRIMARY KEY,
                oldest_signature TEXT,
                oldest_slot INTEGER,
                newest_signature TEXT,
                newest_slot INTEGER,
                status TEXT NOT NULL,
                first_scan_complete INTEGER NOT NULL DEFAULT 0,
                last_synced_at TEXT,
                total_accounts INTEGER NOT NULL DEFAULT 0,
                reclaimable_count INTEGER NOT NULL DEFAULT 0,
                reclaimable_lamports INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS fee_records (
                signature TEXT PRIMARY KEY,
                operator TEXT NOT NULL,
                slot INTEGER NOT NULL,
                fee_lamports INTEGER NOT NULL,
                block_time TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fees_operator ON fee_records(operator)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS whitelist (
                address TEXT PRIMARY KEY,
                label TEXT,
                added_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Insert new candidates or refresh provenance on existing rows.
    ///
    /// Lifecycle columns (status and everything downstream of it) are
    /// never touched here, so replaying a page after a crash cannot
    /// regress a row to a less-informed state.
    pub fn upsert_accounts(&self, accounts: &[SponsoredAccount]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for account in accounts {
            tx.execute(
                "INSERT INTO sponsored_accounts (
                    address, operator, owner, mint, kind,
                    discovery_signature, discovery_slot, first_seen_at, source, memo,
                    deposit_lamports, status
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(address) DO UPDATE SET
                    owner = COALESCE(sponsored_accounts.owner, excluded.owner),
                    mint = COALESCE(sponsored_accounts.mint, excluded.mint),
                    memo = COALESCE(sponsored_accounts.memo, excluded.memo),
                    discovery_signature =
                        COALESCE(sponsored_accounts.discovery_signature, excluded.discovery_signature),
                    discovery_slot =
                        COALESCE(sponsored_accounts.discovery_slot, excluded.discovery_slot),
                    deposit_lamports = excluded.deposit_lamports",
                params![
                    account.address,
                    account.operator,
                    account.owner,
                    account.mint,
                    account.kind.to_string(),
                    account.discovery_signature,
                    account.discovery_slot,
                    account.first_seen_at.to_rfc3339(),
                    account.source,
                    account.memo,
                    account.deposit_lamports,
                    account.status.to_string(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_account(&self, address: &str) -> Result<Option<SponsoredAccount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM sponsored_accounts WHERE address = ?1",
        )?;
        let mut rows = stmt.query_map([address], row_to_account)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_accounts_for_operator(&self, operator: &str) -> Result<Vec<SponsoredAccount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM sponsored_accounts WHERE operator = ?1 ORDER BY discovery_slot",
        )?;
        let accounts = stmt
            .query_map([operator], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn get_by_status(
        &self,
        operator: Option<&str>,
        status: AccountStatus,
    ) -> Result<Vec<SponsoredAccount>> {
        let conn = self.conn.lock().unwrap();
        let accounts = match operator {
            Some(op) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM sponsored_accounts WHERE operator = ?1 AND status = ?2",
                )?;
                let rows = stmt
                    .query_map(params![op, status.to_string()], row_to_account)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM sponsored_accounts WHERE status = ?1")?;
                let rows = stmt
                    .query_map([status.to_string()], row_to_account)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(accounts)
    }

    /// Accounts due for a verification pass: Active rows whose last check
    /// is older than `cutoff`, plus Error rows from earlier cycles.
    pub fn get_stale_verifiable(
        &self,
        operator: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SponsoredAccount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM sponsored_accounts
             WHERE operator = ?1
               AND (
                    status = 'Error'
                    OR (status = 'Active'
                        AND (last_verified_at IS NULL OR last_verified_at < ?2))
               )
             ORDER BY last_verified_at
             LIMIT ?3",
        )?;
        let accounts = stmt
            .query_map(
                params![operator, cutoff.to_rfc3339(), limit as i64],
                row_to_account,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Apply a status transition plus its side fields.
    ///
    /// `reclaimable_since` is stamped on the transition into Reclaimable
    /// and cleared when a row is revived to Active; `reclaimed_at` is
    /// stamped on the transition into Reclaimed.
    pub fn update_account_status(
        &self,
        address: &str,
        status: AccountStatus,
        change: &StatusChange,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = change
            .verified_at
            .unwrap_or_else(Utc::now)
            .to_rfc3339();

        conn.execute(
            "UPDATE sponsored_accounts SET
                status = ?2,
                last_verified_at = CASE WHEN ?3 IS NULL THEN last_verified_at ELSE ?3 END,
                reclaimable_since = CASE
                    WHEN ?2 = 'Reclaimable' THEN COALESCE(reclaimable_since, ?7)
                    WHEN ?2 = 'Active' THEN NULL
                    ELSE reclaimable_since END,
                reclaimed_at = CASE
                    WHEN ?2 = 'Reclaimed' THEN COALESCE(reclaimed_at, ?7)
                    ELSE reclaimed_at END,
                reclaim_signature = COALESCE(?4, reclaim_signature),
                reclaimed_lamports = COALESCE(?5, reclaimed_lamports),
                last_error = CASE
                    WHEN ?2 = 'Reclaimed' THEN NULL
                    ELSE COALESCE(?6, last_error) END
             WHERE address = ?1",
            params![
                address,
                status.to_string(),
                change.verified_at.map(|t| t.to_rfc3339()),
                change.reclaim_signature,
                change.reclaimed_lamports,
                change.error,
                now,
            ],
        )?;

        Ok(())
    }

    pub fn get_checkpoint(&self, operator: &str) -> Result<Option<ScanCheckpoint>> {
        let conn = self.conn.lock().unwrap();
        Self::read_checkpoint(&conn, operator)
    }

    fn read_checkpoint(conn: &Connection, operator: &str) -> Result<Option<ScanCheckpoint>> {
        let mut stmt = conn.prepare("SELECT * FROM scan_checkpoints WHERE operator = ?1")?;
        let mut rows = stmt.query_map([operator], row_to_checkpoint)?;
        Ok(rows.next().transpose()?)
    }

    /// Merge a partial checkpoint update.
    ///
    /// The oldest cursor only moves to a strictly lower slot and the
    /// newest only to a strictly higher one; `first_scan_complete` is
    /// sticky. Rolling totals are recomputed from the accounts table on
    /// every write.
    pub fn update_checkpoint(&self, operator: &str, update: &CheckpointUpdate) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let mut checkpoint =
            Self::read_checkpoint(&conn, operator)?.unwrap_or_else(|| ScanCheckpoint {
                operator: operator.to_string(),
                oldest: None,
                newest: None,
                status: ScanStatus::Pending,
                first_scan_complete: false,
                last_synced_at: None,
                total_accounts: 0,
                reclaimable_count: 0,
                reclaimable_lamports: 0,
            });

        if let Some(oldest) = &update.oldest {
            let extends = checkpoint
                .oldest
                .as_ref()
                .map(|cur| oldest.slot < cur.slot)
                .unwrap_or(true);
            if extends {
                checkpoint.oldest = Some(oldest.clone());
            } else {
                debug!(
                    "ignoring non-extending oldest cursor for {} (slot {})",
                    operator, oldest.slot
                );
            }
        }

        if let Some(newest) = &update.newest {
            let extends = checkpoint
                .newest
                .as_ref()
                .map(|cur| newest.slot > cur.slot)
                .unwrap_or(true);
            if extends {
                checkpoint.newest = Some(newest.clone());
            } else {
                debug!(
                    "ignoring non-extending newest cursor for {} (slot {})",
                    operator, newest.slot
                );
            }
        }

        if let Some(status) = update.status {
            checkpoint.status = status;
        }
        if update.first_scan_complete == Some(true) {
            checkpoint.first_scan_complete = true;
        }
        if let Some(synced_at) = update.synced_at {
            checkpoint.last_synced_at = Some(synced_at);
        }

        let (total, reclaimable_count, reclaimable_lamports) = conn.query_row(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE status = 'Reclaimable'),
                    COALESCE(SUM(deposit_lamports) FILTER (WHERE status = 'Reclaimable'), 0)
             FROM sponsored_accounts WHERE operator = ?1",
            [operator],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
        )?;

        conn.execute(
            "INSERT OR REPLACE INTO scan_checkpoints (
                operator, oldest_signature, oldest_slot, newest_signature, newest_slot,
                status, first_scan_complete, last_synced_at,
                total_accounts, reclaimable_count, reclaimable_lamports
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                operator,
                checkpoint.oldest.as_ref().map(|c| c.signature.clone()),
                checkpoint.oldest.as_ref().map(|c| c.slot),
                checkpoint.newest.as_ref().map(|c| c.signature.clone()),
                checkpoint.newest.as_ref().map(|c| c.slot),
                checkpoint.status.to_string(),
                checkpoint.first_scan_complete,
                checkpoint.last_synced_at.map(|t| t.to_rfc3339()),
                total as u64,
                reclaimable_count as u64,
                reclaimable_lamports as u64,
            ],
        )?;

        Ok(())
    }

    /// Append operator fee costs; replays of the same page are no-ops.
    pub fn record_fees(&self, fees: &[FeeRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for fee in fees {
            tx.execute(
                "INSERT OR IGNORE INTO fee_records
                    (signature, operator, slot, fee_lamports, block_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    fee.signature,
                    fee.operator,
                    fee.slot,
                    fee.fee_lamports,
                    fee.block_time.map(|t| t.to_rfc3339()),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn add_whitelist(&self, address: &str, label: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO whitelist (address, label, added_at) VALUES (?1, ?2, ?3)",
            params![address, label, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn remove_whitelist(&self, address: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM whitelist WHERE address = ?1", [address])?;
        Ok(removed > 0)
    }

    pub fn get_whitelist(&self) -> Result<Vec<WhitelistEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT address, label, added_at FROM whitelist")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(WhitelistEntry {
                    address: row.get(0)?,
                    label: row.get(1)?,
                    added_at: ts_req(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_stats(&self, operator: &str) -> Result<OperatorStats> {
        let conn = self.conn.lock().unwrap();

        let mut stats = OperatorStats {
            total_accounts: 0,
            active: 0,
            reclaimable: 0,
            locked: 0,
            closed: 0,
            reclaimed: 0,
            error: 0,
            reclaimable_lamports: 0,
            reclaimed_lamports: 0,
            fee_lamports: 0,
        };

        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*),
                    COALESCE(SUM(deposit_lamports), 0),
                    COALESCE(SUM(reclaimed_lamports), 0)
             FROM sponsored_accounts WHERE operator = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map([operator], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        for row in rows {
            let (status, count, deposits, reclaimed) = row?;
            let count = count as u64;
            stats.total_accounts += count;
            match AccountStatus::from_str(&status) {
                Ok(AccountStatus::Active) => stats.active = count,
                Ok(AccountStatus::Reclaimable) => {
                    stats.reclaimable = count;
                    stats.reclaimable_lamports = deposits as u64;
                }
                Ok(AccountStatus::Locked) => stats.locked = count,
                Ok(AccountStatus::Closed) => stats.closed = count,
                Ok(AccountStatus::Reclaimed) => {
                    stats.reclaimed = count;
                    stats.reclaimed_lamports = reclaimed as u64;
                }
                Ok(AccountStatus::Error) => stats.error = count,
                Err(()) => {}
            }
        }

        stats.fee_lamports = conn.query_row(
            "SELECT COALESCE(SUM(fee_lamports), 0) FROM fee_records WHERE operator = ?1",
            [operator],
            |row| row.get::<_, i64>(0),
        )? as u64;

        Ok(stats)
    }

    /// Most recent reclaim outcomes, newest first.
    pub fn recent_reclaims(&self, operator: &str, limit: usize) -> Result<Vec<SponsoredAccount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM sponsored_accounts
             WHERE operator = ?1 AND status = 'Reclaimed'
             ORDER BY reclaimed_at DESC LIMIT ?2",
        )?;
        let accounts = stmt
            .query_map(params![operator, limit as i64], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }
}

fn ts_req(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: chrono::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn ts_opt(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|e: chrono::ParseError| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

fn row_to_account(row: &Row) -> rusqlite::Result<SponsoredAccount> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;

    Ok(SponsoredAccount {
        address: row.get("address")?,
        operator: row.get("operator")?,
        owner: row.get("owner")?,
        mint: row.get("mint")?,
        kind: ResourceKind::from_str(&kind).unwrap_or(ResourceKind::TokenAccount),
        discovery_signature: row.get("discovery_signature")?,
        discovery_slot: row.get("discovery_slot")?,
        first_seen_at: ts_req(row, 7)?,
        source: row.get("source")?,
        memo: row.get("memo")?,
        deposit_lamports: row.get("deposit_lamports")?,
        status: AccountStatus::from_str(&status).unwrap_or(AccountStatus::Active),
        last_verified_at: ts_opt(row, 12)?,
        reclaimable_since: ts_opt(row, 13)?,
        reclaimed_at: ts_opt(row, 14)?,
        reclaim_signature: row.get("reclaim_signature")?,
        reclaimed_lamports: row.get("reclaimed_lamports")?,
        last_error: row.get("last_error")?,
    })
}

fn row_to_checkpoint(row: &Row) -> rusqlite::Result<ScanCheckpoint> {
    let status: String = row.get("status")?;

    let oldest = match (
        row.get::<_, Option<String>>("oldest_signature")?,
        row.get::<_, Option<u64>>("oldest_slot")?,
    ) {
        (Some(signature), Some(slot)) => Some(Cursor { signature, slot }),
        _ => None,
    };
    let newest = match (
        row.get::<_, Option<String>>("newest_signature")?,
        row.get::<_, Option<u64>>("newest_slot")?,
    ) {
        (Some(signature), Some(slot)) => Some(Cursor { signature, slot }),
        _ => None,
    };

    Ok(ScanCheckpoint {
        operator: row.get("operator")?,
        oldest,
        newest,
        status: ScanStatus::from_str(&status).unwrap_or(ScanStatus::Pending),
        first_scan_complete: row.get("first_scan_complete")?,
        last_synced_at: ts_opt(row, 7)?,
        total_accounts: row.get::<_, i64>("total_accounts")? as u64,
        reclaimable_count: row.get::<_, i64>("reclaimable_count")? as u64,
        reclaimable_lamports: row.get::<_, i64>("reclaimable_lamports")? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account(address: &str, operator: &str) -> SponsoredAccount {
        SponsoredAccount {
            address: address.to_string(),
            operator: operator.to_string(),
            owner: Some("owner111".to_string()),
            mint: Some("mint111".to_string()),
            kind: ResourceKind::AssociatedTokenAccount,
            discovery_signature: Some("sig111".to_string()),
            discovery_slot: Some(100),
            first_seen_at: Utc::now(),
            source: "historical-scan".to_string(),
            memo: None,
            deposit_lamports: 2_039_280,
            status: AccountStatus::Active,
            last_verified_at: None,
            reclaimable_since: None,
            reclaimed_at: None,
            reclaim_signature: None,
            reclaimed_lamports: None,
            last_error: None,
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let account = sample_account("acct1", "op1");

        db.upsert_accounts(&[account.clone()]).unwrap();
        db.upsert_accounts(&[account.clone()]).unwrap();

        let stored = db.get_accounts_for_operator("op1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].address, "acct1");
        assert_eq!(stored[0].deposit_lamports, 2_039_280);
    }

    #[test]
    fn upsert_never_regresses_status() {
        let db = Database::open_in_memory().unwrap();
        let account = sample_account("acct1", "op1");
        db.upsert_accounts(&[account.clone()]).unwrap();

        db.update_account_status(
            "acct1",
            AccountStatus::Reclaimed,
            &StatusChange {
                verified_at: Some(Utc::now()),
                reclaim_signature: Some("closesig".to_string()),
                reclaimed_lamports: Some(2_039_280),
                error: None,
            },
        )
        .unwrap();

        // A replayed discovery page must not reset lifecycle state.
        db.upsert_accounts(&[account]).unwrap();

        let stored = db.get_account("acct1").unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Reclaimed);
        assert_eq!(stored.reclaim_signature.as_deref(), Some("closesig"));
        assert!(stored.reclaimed_at.is_some());
    }

    #[test]
    fn reclaimable_since_is_stamped_and_cleared() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_accounts(&[sample_account("acct1", "op1")]).unwrap();

        db.update_account_status(
            "acct1",
            AccountStatus::Reclaimable,
            &StatusChange::verified_now(),
        )
        .unwrap();
        let stored = db.get_account("acct1").unwrap().unwrap();
        let stamped = stored.reclaimable_since.expect("stamped on transition");

        // Re-verification keeps the original eligibility time.
        db.update_account_status(
            "acct1",
            AccountStatus::Reclaimable,
            &StatusChange::verified_now(),
        )
        .unwrap();
        let stored = db.get_account("acct1").unwrap().unwrap();
        assert_eq!(stored.reclaimable_since, Some(stamped));

        // A revived account loses it.
        db.update_account_status("acct1", AccountStatus::Active, &StatusChange::verified_now())
            .unwrap();
        let stored = db.get_account("acct1").unwrap().unwrap();
        assert_eq!(stored.reclaimable_since, None);
    }

    #[test]
    fn checkpoint_cursors_only_extend() {
        let db = Database::open_in_memory().unwrap();

        let cursor = |sig: &str, slot: u64| Cursor {
            signature: sig.to_string(),
            slot,
        };

        db.update_checkpoint(
            "op1",
            &CheckpointUpdate {
                oldest: Some(cursor("a", 100)),
                newest: Some(cursor("b", 200)),
                status: Some(ScanStatus::Scanning),
                ..Default::default()
            },
        )
        .unwrap();

        // Shrinking writes are ignored.
        db.update_checkpoint(
            "op1",
            &CheckpointUpdate {
                oldest: Some(cursor("c", 150)),
                newest: Some(cursor("d", 180)),
                ..Default::default()
            },
        )
        .unwrap();

        let cp = db.get_checkpoint("op1").unwrap().unwrap();
        assert_eq!(cp.oldest.as_ref().unwrap().slot, 100);
        assert_eq!(cp.newest.as_ref().unwrap().slot, 200);

        // Extending writes land.
        db.update_checkpoint(
            "op1",
            &CheckpointUpdate {
                oldest: Some(cursor("e", 50)),
                newest: Some(cursor("f", 300)),
                ..Default::default()
            },
        )
        .unwrap();

        let cp = db.get_checkpoint("op1").unwrap().unwrap();
        assert_eq!(cp.oldest.as_ref().unwrap().slot, 50);
        assert_eq!(cp.oldest.as_ref().unwrap().signature, "e");
        assert_eq!(cp.newest.as_ref().unwrap().slot, 300);
    }

    #[test]
    fn first_scan_complete_is_sticky() {
        let db = Database::open_in_memory().unwrap();

        db.update_checkpoint(
            "op1",
            &CheckpointUpdate {
                first_scan_complete: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        db.update_checkpoint(
            "op1",
            &CheckpointUpdate {
                first_scan_complete: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

        let cp = db.get_checkpoint("op1").unwrap().unwrap();
        assert!(cp.first_scan_complete);
    }

    #[test]
    fn checkpoint_totals_follow_accounts() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_accounts(&[sample_account("acct1", "op1"), sample_account("acct2", "op1")])
            .unwrap();
        db.update_account_status(
            "acct1",
            AccountStatus::Reclaimable,
            &StatusChange::verified_now(),
        )
        .unwrap();

        db.update_checkpoint("op1", &CheckpointUpdate::default()).unwrap();

        let cp = db.get_checkpoint("op1").unwrap().unwrap();
        assert_eq!(cp.total_accounts, 2);
        assert_eq!(cp.reclaimable_count, 1);
        assert_eq!(cp.reclaimable_lamports, 2_039_280);
    }

    #[test]
    fn fee_ledger_ignores_replays() {
        let db = Database::open_in_memory().unwrap();
        let fee = FeeRecord {
            signature: "sig1".to_string(),
            operator: "op1".to_string(),
            slot: 10,
            fee_lamports: 5000,
            block_time: Some(Utc::now()),
        };

        db.record_fees(&[fee.clone()]).unwrap();
        db.record_fees(&[fee]).unwrap();

        let stats = db.get_stats("op1").unwrap();
        assert_eq!(stats.fee_lamports, 5000);
    }

    #[test]
    fn whitelist_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        db.add_whitelist("addr1", Some("ops wallet")).unwrap();
        db.add_whitelist("addr1", None).unwrap();

        let entries = db.get_whitelist().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label.as_deref(), Some("ops wallet"));

        assert!(db.remove_whitelist("addr1").unwrap());
        assert!(!db.remove_whitelist("addr1").unwrap());
    }

    #[test]
    fn stale_query_includes_error_rows() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_accounts(&[sample_account("fresh", "op1"), sample_account("failed", "op1")])
            .unwrap();

        let now = Utc::now();
        db.update_account_status(
            "fresh",
            AccountStatus::Active,
            &StatusChange {
                verified_at: Some(now),
                ..Default::default()
            },
        )
        .unwrap();
        db.update_account_status("failed", AccountStatus::Error, &StatusChange::with_error("rpc"))
            .unwrap();

        // Cutoff in the past: only never-verified and Error rows match.
        let stale = db
            .get_stale_verifiable("op1", now - chrono::Duration::hours(1), 10)
            .unwrap();
        let addresses: Vec<_> = stale.iter().map(|a| a.address.as_str()).collect();
        assert!(addresses.contains(&"failed"));
        assert!(!addresses.contains(&"fresh"));
    }

    #[test]
    fn opens_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.db");
        let db = Database::new(path.to_str().unwrap()).unwrap();
        db.upsert_accounts(&[sample_account("acct1", "op1")]).unwrap();

        drop(db);
        let db = Database::new(path.to_str().unwrap()).unwrap();
        assert_eq!(db.get_accounts_for_operator("op1").unwrap().len(), 1);
    }
}
