//! Embedded SQLite storage
//!
//! Single connection behind a mutex. Ledger mutations run in
//! `BEGIN IMMEDIATE` transactions so the write lock is taken before any
//! balance is read. Used for local runs and tests.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::info;
use uuid::Uuid;

use crate::claim::{Claim, ClaimRequest, ClaimStatus, ClaimStatusStats, Resolution};
use crate::contributor::{Contributor, PointsEvent, PointsReason, Role};
use crate::error::{LedgerError, Result};
use crate::ledger::{
    applied_delta, check_claim, new_claim, plan_resolution, validate_claim_request,
    BalanceEffect, LedgerStore, PointsChange,
};

const SCHEMA: &str = include_str!("../migrations/sqlite/001_schema.sql");

const CLAIM_COLUMNS: &str = "id, contributor_id, points, amount, payment_method, payment_details, \
     status, transaction_id, notes, processed_by, processed_at, created_at";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        info!("Opened SQLite ledger at {}", path.as_ref().display());
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn upsert_contributor_sync(&self, id: &str, role: Role, overwrite_role: bool) -> Result<Contributor> {
        let conn = self.conn.lock();
        let now = timestamp(Utc::now());
        let sql = if overwrite_role {
            "INSERT INTO contributors (id, role, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at"
        } else {
            "INSERT INTO contributors (id, role, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO NOTHING"
        };
        conn.execute(sql, params![id, role, now])?;
        load_contributor(&conn, id)?.ok_or_else(|| LedgerError::ContributorNotFound(id.to_string()))
    }

    fn adjust_points_sync(
        &self,
        contributor_id: &str,
        delta: i32,
        reason: PointsReason,
        reference: Option<&str>,
    ) -> Result<PointsChange> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let contributor = load_contributor(&tx, contributor_id)?
            .ok_or_else(|| LedgerError::ContributorNotFound(contributor_id.to_string()))?;
        let applied = applied_delta(contributor.points, delta);

        if applied != 0 {
            let now = Utc::now();
            tx.execute(
                "UPDATE contributors SET points = points + ?2, updated_at = ?3 WHERE id = ?1",
                params![contributor_id, applied, timestamp(now)],
            )?;
            insert_event(&tx, contributor_id, applied, reason, reference, now)?;
        }
        tx.commit()?;

        Ok(PointsChange {
            contributor_id: contributor_id.to_string(),
            delta: applied,
            points: contributor.points + applied,
        })
    }

    fn create_claim_sync(&self, contributor_id: &str, request: &ClaimRequest) -> Result<Claim> {
        let milestone = validate_claim_request(request)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let contributor = load_contributor(&tx, contributor_id)?
            .ok_or_else(|| LedgerError::ContributorNotFound(contributor_id.to_string()))?;
        let has_pending = load_pending_claim(&tx, contributor_id)?.is_some();
        check_claim(&contributor, has_pending, milestone)?;

        let now = Utc::now();
        let claim = new_claim(contributor_id, milestone, request, now);
        let details = serde_json::to_string(&claim.payment_details)?;

        tx.execute(
            &format!(
                "INSERT INTO claims ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, NULL, NULL, ?8)",
                CLAIM_COLUMNS
            ),
            params![
                claim.id.to_string(),
                claim.contributor_id,
                claim.points,
                claim.amount,
                claim.payment_method,
                details,
                claim.status,
                timestamp(now),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::ClaimAlreadyPending
            } else {
                LedgerError::from(e)
            }
        })?;

        tx.execute(
            "UPDATE contributors SET points = points - ?2, updated_at = ?3 WHERE id = ?1",
            params![contributor_id, claim.points, timestamp(now)],
        )?;
        tx.execute(
            "INSERT INTO claimed_milestones (contributor_id, milestone) VALUES (?1, ?2)",
            params![contributor_id, claim.points],
        )?;
        insert_event(
            &tx,
            contributor_id,
            -claim.points,
            PointsReason::ClaimRequested,
            Some(&claim.id.to_string()),
            now,
        )?;

        tx.commit()?;
        Ok(claim)
    }

    fn resolve_claim_sync(&self, claim_id: Uuid, resolution: &Resolution) -> Result<Claim> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let claim = load_claim(&tx, claim_id)?.ok_or(LedgerError::ClaimNotFound(claim_id))?;
        let effect = plan_resolution(&claim, resolution.status)?;
        let now = Utc::now();

        tx.execute(
            "UPDATE claims SET status = ?2, processed_by = ?3, processed_at = ?4,
                 transaction_id = COALESCE(?5, transaction_id),
                 notes = COALESCE(?6, notes)
             WHERE id = ?1",
            params![
                claim_id.to_string(),
                resolution.status,
                resolution.processed_by,
                timestamp(now),
                resolution.transaction_id,
                resolution.notes,
            ],
        )?;

        match effect {
            BalanceEffect::None => {}
            BalanceEffect::CreditEarnings { amount } => {
                tx.execute(
                    "UPDATE contributors SET total_earnings = total_earnings + ?2, updated_at = ?3
                     WHERE id = ?1",
                    params![claim.contributor_id, amount, timestamp(now)],
                )?;
            }
            BalanceEffect::Refund { points } => {
                tx.execute(
                    "UPDATE contributors SET points = points + ?2, updated_at = ?3 WHERE id = ?1",
                    params![claim.contributor_id, points, timestamp(now)],
                )?;
                tx.execute(
                    "DELETE FROM claimed_milestones WHERE contributor_id = ?1 AND milestone = ?2",
                    params![claim.contributor_id, claim.points],
                )?;
                insert_event(
                    &tx,
                    &claim.contributor_id,
                    points,
                    PointsReason::ClaimRefunded,
                    Some(&claim_id.to_string()),
                    now,
                )?;
            }
        }

        let updated = load_claim(&tx, claim_id)?.ok_or(LedgerError::ClaimNotFound(claim_id))?;
        tx.commit()?;
        Ok(updated)
    }

    fn query_claims(&self, sql: &str, param: &dyn ToSql) -> Result<Vec<Claim>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let claims = stmt
            .query_map(&[param], claim_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(claims)
    }
}

#[async_trait]
impl LedgerStore for SqliteStorage {
    async fn upsert_contributor(&self, id: &str, role: Role) -> Result<Contributor> {
        self.upsert_contributor_sync(id, role, true)
    }

    async fn ensure_contributor(&self, id: &str, role: Role) -> Result<Contributor> {
        self.upsert_contributor_sync(id, role, false)
    }

    async fn get_contributor(&self, id: &str) -> Result<Option<Contributor>> {
        let conn = self.conn.lock();
        Ok(load_contributor(&conn, id)?)
    }

    async fn adjust_points(
        &self,
        contributor_id: &str,
        delta: i32,
        reason: PointsReason,
        reference: Option<&str>,
    ) -> Result<PointsChange> {
        self.adjust_points_sync(contributor_id, delta, reason, reference)
    }

    async fn create_claim(&self, contributor_id: &str, request: &ClaimRequest) -> Result<Claim> {
        self.create_claim_sync(contributor_id, request)
    }

    async fn resolve_claim(&self, claim_id: Uuid, resolution: &Resolution) -> Result<Claim> {
        self.resolve_claim_sync(claim_id, resolution)
    }

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>> {
        let conn = self.conn.lock();
        Ok(load_claim(&conn, claim_id)?)
    }

    async fn pending_claim(&self, contributor_id: &str) -> Result<Option<Claim>> {
        let conn = self.conn.lock();
        Ok(load_pending_claim(&conn, contributor_id)?)
    }

    async fn list_claims_by_contributor(&self, contributor_id: &str) -> Result<Vec<Claim>> {
        self.query_claims(
            &format!(
                "SELECT {} FROM claims WHERE contributor_id = ?1 ORDER BY created_at DESC, rowid DESC",
                CLAIM_COLUMNS
            ),
            &contributor_id,
        )
    }

    async fn list_claims(&self, status: Option<ClaimStatus>) -> Result<Vec<Claim>> {
        self.query_claims(
            &format!(
                "SELECT {} FROM claims WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY created_at DESC, rowid DESC",
                CLAIM_COLUMNS
            ),
            &status,
        )
    }

    async fn claim_stats(&self) -> Result<Vec<ClaimStatusStats>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*), COALESCE(SUM(amount), 0) FROM claims GROUP BY status",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(ClaimStatusStats {
                    status: row.get(0)?,
                    count: row.get(1)?,
                    total_amount: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    async fn points_events(&self, contributor_id: &str) -> Result<Vec<PointsEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, contributor_id, delta, reason, reference, created_at
             FROM points_events WHERE contributor_id = ?1 ORDER BY id ASC",
        )?;
        let events = stmt
            .query_map(params![contributor_id], |row| {
                Ok(PointsEvent {
                    id: row.get(0)?,
                    contributor_id: row.get(1)?,
                    delta: row.get(2)?,
                    reason: row.get(3)?,
                    reference: row.get(4)?,
                    created_at: parse_timestamp(5, row.get(5)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

// ============================================================================
// ROW HELPERS
// ============================================================================

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn load_contributor(conn: &Connection, id: &str) -> rusqlite::Result<Option<Contributor>> {
    let row = conn
        .query_row(
            "SELECT id, role, points, total_earnings, created_at, updated_at
             FROM contributors WHERE id = ?1",
            params![id],
            |row| {
                Ok(Contributor {
                    id: row.get(0)?,
                    role: row.get(1)?,
                    points: row.get(2)?,
                    total_earnings: row.get(3)?,
                    claimed_milestones: BTreeSet::new(),
                    created_at: parse_timestamp(4, row.get(4)?)?,
                    updated_at: parse_timestamp(5, row.get(5)?)?,
                })
            },
        )
        .optional()?;

    let Some(mut contributor) = row else {
        return Ok(None);
    };

    let mut stmt =
        conn.prepare("SELECT milestone FROM claimed_milestones WHERE contributor_id = ?1")?;
    contributor.claimed_milestones = stmt
        .query_map(params![id], |row| row.get::<_, i32>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;

    Ok(Some(contributor))
}

fn load_claim(conn: &Connection, claim_id: Uuid) -> rusqlite::Result<Option<Claim>> {
    conn.query_row(
        &format!("SELECT {} FROM claims WHERE id = ?1", CLAIM_COLUMNS),
        params![claim_id.to_string()],
        claim_from_row,
    )
    .optional()
}

fn load_pending_claim(conn: &Connection, contributor_id: &str) -> rusqlite::Result<Option<Claim>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM claims WHERE contributor_id = ?1 AND status = 'pending'",
            CLAIM_COLUMNS
        ),
        params![contributor_id],
        claim_from_row,
    )
    .optional()
}

fn claim_from_row(row: &Row<'_>) -> rusqlite::Result<Claim> {
    let id: String = row.get(0)?;
    let details: String = row.get(5)?;
    let processed_at: Option<String> = row.get(10)?;

    Ok(Claim {
        id: Uuid::parse_str(&id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        contributor_id: row.get(1)?,
        points: row.get(2)?,
        amount: row.get(3)?,
        payment_method: row.get(4)?,
        payment_details: serde_json::from_str(&details)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        status: row.get(6)?,
        transaction_id: row.get(7)?,
        notes: row.get(8)?,
        processed_by: row.get(9)?,
        processed_at: processed_at.map(|t| parse_timestamp(10, t)).transpose()?,
        created_at: parse_timestamp(11, row.get(11)?)?,
    })
}

/// Unique violations on `claims` come from the one-pending-claim index.
/// Primary key, foreign key and check failures report other extended codes.
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn insert_event(
    conn: &Connection,
    contributor_id: &str,
    delta: i32,
    reason: PointsReason,
    reference: Option<&str>,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO points_events (contributor_id, delta, reason, reference, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![contributor_id, delta, reason, reference, timestamp(at)],
    )?;
    Ok(())
}

// ============================================================================
// TEXT COLUMN MAPPINGS
// ============================================================================

fn parse_text<T>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T: std::str::FromStr<Err = LedgerError>,
{
    value
        .as_str()?
        .parse()
        .map_err(|e: LedgerError| FromSqlError::Other(Box::new(e)))
}

impl ToSql for ClaimStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ClaimStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

impl ToSql for PointsReason {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PointsReason {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contributor::fold_balance;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn request(points: i32) -> ClaimRequest {
        ClaimRequest {
            points,
            payment_method: "bank_transfer".to_string(),
            payment_details: serde_json::json!({ "account": "0001", "ifsc": "TEST0001" }),
        }
    }

    fn resolution(status: ClaimStatus) -> Resolution {
        Resolution {
            status,
            processed_by: "admin-1".to_string(),
            transaction_id: None,
            notes: None,
        }
    }

    async fn storage_with(id: &str, points: i32) -> SqliteStorage {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.upsert_contributor(id, Role::Contributor).await.unwrap();
        if points > 0 {
            storage
                .adjust_points(id, points, PointsReason::ContentCreated, None)
                .await
                .unwrap();
        }
        storage
    }

    async fn assert_balance_matches_log(storage: &SqliteStorage, id: &str) {
        let contributor = storage.get_contributor(id).await.unwrap().unwrap();
        let events = storage.points_events(id).await.unwrap();
        assert_eq!(contributor.points, fold_balance(&events));
        assert!(contributor.points >= 0);
    }

    #[tokio::test]
    async fn test_claim_deducts_points_and_records_milestone() {
        let storage = storage_with("c1", 30).await;

        let claim = storage.create_claim("c1", &request(25)).await.unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.amount, 30);
        assert_eq!(claim.payment_details["ifsc"], "TEST0001");

        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 5);
        assert_eq!(contributor.claimed_milestones, BTreeSet::from([25]));

        let pending = storage.pending_claim("c1").await.unwrap().unwrap();
        assert_eq!(pending.id, claim.id);
        assert_balance_matches_log(&storage, "c1").await;
    }

    #[tokio::test]
    async fn test_second_claim_while_pending_is_rejected() {
        let storage = storage_with("c1", 30).await;
        assert_ok!(storage.create_claim("c1", &request(25)).await);

        let err = storage.create_claim("c1", &request(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::ClaimAlreadyPending), "got {:?}", err);

        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 5);
        assert_eq!(storage.list_claims_by_contributor("c1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_refunds_and_releases_milestone() {
        let storage = storage_with("c1", 30).await;
        let claim = storage.create_claim("c1", &request(25)).await.unwrap();

        let mut reject = resolution(ClaimStatus::Rejected);
        reject.notes = Some("payment details invalid".to_string());
        let rejected = storage.resolve_claim(claim.id, &reject).await.unwrap();
        assert_eq!(rejected.status, ClaimStatus::Rejected);
        assert_eq!(rejected.processed_by.as_deref(), Some("admin-1"));
        assert!(rejected.processed_at.is_some());
        assert_eq!(rejected.notes.as_deref(), Some("payment details invalid"));

        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 30);
        assert!(contributor.claimed_milestones.is_empty());
        assert_eq!(contributor.total_earnings, 0);

        // Milestone is claimable again
        assert_ok!(storage.create_claim("c1", &request(25)).await);
        assert_balance_matches_log(&storage, "c1").await;
    }

    #[tokio::test]
    async fn test_paid_credits_earnings_once() {
        let storage = storage_with("c1", 30).await;
        let claim = storage.create_claim("c1", &request(25)).await.unwrap();

        assert_ok!(storage.resolve_claim(claim.id, &resolution(ClaimStatus::Processing)).await);
        let mut pay = resolution(ClaimStatus::Paid);
        pay.transaction_id = Some("TXN-42".to_string());
        let paid = storage.resolve_claim(claim.id, &pay).await.unwrap();
        assert_eq!(paid.transaction_id.as_deref(), Some("TXN-42"));

        let err = storage.resolve_claim(claim.id, &pay).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.total_earnings, 30);
        assert_eq!(contributor.points, 5);
        assert_eq!(contributor.claimed_milestones, BTreeSet::from([25]));

        // Milestone stays spent after payout
        let err = storage.create_claim("c1", &request(25)).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyClaimed(25)));
    }

    #[tokio::test]
    async fn test_processing_has_no_balance_effect() {
        let storage = storage_with("c1", 10).await;
        let claim = storage.create_claim("c1", &request(10)).await.unwrap();
        let before = storage.get_contributor("c1").await.unwrap().unwrap();

        let processing = storage
            .resolve_claim(claim.id, &resolution(ClaimStatus::Processing))
            .await
            .unwrap();
        assert_eq!(processing.status, ClaimStatus::Processing);

        let after = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(before.points, after.points);
        assert_eq!(before.total_earnings, after.total_earnings);
        assert_eq!(before.claimed_milestones, after.claimed_milestones);

        // No longer pending, so another milestone may be requested
        assert!(storage.pending_claim("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejecting_processing_claim_refunds_alongside_new_claim() {
        let storage = storage_with("c1", 35).await;
        let first = storage.create_claim("c1", &request(25)).await.unwrap();
        assert_ok!(storage.resolve_claim(first.id, &resolution(ClaimStatus::Processing)).await);

        // The first claim is no longer pending, so a second one may open
        let second = storage.create_claim("c1", &request(10)).await.unwrap();
        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 0);
        assert_eq!(contributor.claimed_milestones, BTreeSet::from([10, 25]));

        let rejected = storage
            .resolve_claim(first.id, &resolution(ClaimStatus::Rejected))
            .await
            .unwrap();
        assert_eq!(rejected.status, ClaimStatus::Rejected);

        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 25);
        assert_eq!(contributor.claimed_milestones, BTreeSet::from([10]));
        assert_eq!(contributor.total_earnings, 0);

        let pending = storage.pending_claim("c1").await.unwrap().unwrap();
        assert_eq!(pending.id, second.id);

        let events = storage.points_events("c1").await.unwrap();
        let first_ref = first.id.to_string();
        let refunds: Vec<_> = events
            .iter()
            .filter(|e| e.reason == PointsReason::ClaimRefunded)
            .collect();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].delta, 25);
        assert_eq!(refunds[0].reference.as_deref(), Some(first_ref.as_str()));
        assert_balance_matches_log(&storage, "c1").await;
    }

    #[test]
    fn test_only_unique_violations_count_as_pending_conflicts() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (k TEXT UNIQUE, n INTEGER CHECK (n >= 0));
             INSERT INTO t (k, n) VALUES ('a', 1);",
        )
        .unwrap();

        let duplicate = conn
            .execute("INSERT INTO t (k, n) VALUES ('a', 2)", [])
            .unwrap_err();
        assert!(is_unique_violation(&duplicate));

        let negative = conn
            .execute("INSERT INTO t (k, n) VALUES ('b', -1)", [])
            .unwrap_err();
        assert!(!is_unique_violation(&negative));
        assert!(matches!(LedgerError::from(negative), LedgerError::Internal(_)));
    }

    #[tokio::test]
    async fn test_unknown_claim_and_contributor() {
        let storage = SqliteStorage::in_memory().unwrap();
        let missing = Uuid::new_v4();
        let err = storage
            .resolve_claim(missing, &resolution(ClaimStatus::Paid))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ClaimNotFound(id) if id == missing));

        let err = storage.create_claim("ghost", &request(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::ContributorNotFound(_)));
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_state_untouched() {
        let storage = storage_with("c1", 9).await;
        let err = storage.create_claim("c1", &request(10)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                required: 10,
                available: 9
            }
        ));
        assert!(storage.list_claims(None).await.unwrap().is_empty());
        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 9);
        assert!(contributor.claimed_milestones.is_empty());
    }

    #[tokio::test]
    async fn test_adjust_points_floors_at_zero() {
        let storage = storage_with("c1", 1).await;

        let change = storage
            .adjust_points("c1", -1, PointsReason::ContentDeleted, Some("blog"))
            .await
            .unwrap();
        assert_eq!(change.delta, -1);
        assert_eq!(change.points, 0);

        let change = storage
            .adjust_points("c1", -1, PointsReason::ContentDeleted, Some("blog"))
            .await
            .unwrap();
        assert_eq!(change.delta, 0);
        assert_eq!(change.points, 0);

        // Floored adjustment is not logged
        assert_eq!(storage.points_events("c1").await.unwrap().len(), 2);
        assert_balance_matches_log(&storage, "c1").await;
    }

    #[tokio::test]
    async fn test_upsert_keeps_balances() {
        let storage = storage_with("c1", 12).await;
        let updated = storage.upsert_contributor("c1", Role::Admin).await.unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.points, 12);

        let ensured = storage.ensure_contributor("c1", Role::User).await.unwrap();
        assert_eq!(ensured.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_listing_and_stats() {
        let storage = storage_with("c1", 200).await;
        storage.upsert_contributor("c2", Role::Contributor).await.unwrap();
        storage
            .adjust_points("c2", 10, PointsReason::ContentCreated, None)
            .await
            .unwrap();

        let first = storage.create_claim("c1", &request(100)).await.unwrap();
        storage.resolve_claim(first.id, &resolution(ClaimStatus::Paid)).await.unwrap();
        let second = storage.create_claim("c1", &request(50)).await.unwrap();
        storage.create_claim("c2", &request(10)).await.unwrap();

        let mine = storage.list_claims_by_contributor("c1").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, second.id, "newest first");

        let pending = storage.list_claims(Some(ClaimStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(storage.list_claims(None).await.unwrap().len(), 3);

        let mut stats = storage.claim_stats().await.unwrap();
        stats.sort_by_key(|s| s.status.as_str());
        assert_eq!(
            stats,
            vec![
                ClaimStatusStats {
                    status: ClaimStatus::Paid,
                    count: 1,
                    total_amount: 120
                },
                ClaimStatusStats {
                    status: ClaimStatus::Pending,
                    count: 2,
                    total_amount: 75
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_allow_one_pending_claim() {
        let storage = Arc::new(storage_with("c1", 30).await);

        let attempts = (0..8).map(|i| {
            let storage = storage.clone();
            let points = if i % 2 == 0 { 10 } else { 25 };
            tokio::spawn(async move { storage.create_claim("c1", &request(points)).await })
        });
        let results = futures::future::join_all(attempts).await;

        let succeeded = results
            .into_iter()
            .map(|r| r.expect("task panicked"))
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(succeeded, 1);

        let claims = storage.list_claims_by_contributor("c1").await.unwrap();
        assert_eq!(claims.len(), 1);
        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 30 - claims[0].points);
        assert_balance_matches_log(&storage, "c1").await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rejections_refund_once() {
        let storage = Arc::new(storage_with("c1", 50).await);
        let claim = storage.create_claim("c1", &request(50)).await.unwrap();

        let attempts = (0..6).map(|_| {
            let storage = storage.clone();
            tokio::spawn(async move {
                storage
                    .resolve_claim(claim.id, &resolution(ClaimStatus::Rejected))
                    .await
            })
        });
        let results = futures::future::join_all(attempts).await;
        let succeeded = results
            .into_iter()
            .map(|r| r.expect("task panicked"))
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(succeeded, 1);

        let contributor = storage.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 50);
        assert_balance_matches_log(&storage, "c1").await;
    }

    #[tokio::test]
    async fn test_file_backed_storage_persists() {
        let path = std::env::temp_dir().join(format!("ledger-{}.db", Uuid::new_v4()));
        {
            let storage = SqliteStorage::new(&path).unwrap();
            storage.upsert_contributor("c1", Role::Contributor).await.unwrap();
            storage
                .adjust_points("c1", 3, PointsReason::ContentCreated, Some("job"))
                .await
                .unwrap();
        }
        let reopened = SqliteStorage::new(&path).unwrap();
        let contributor = reopened.get_contributor("c1").await.unwrap().unwrap();
        assert_eq!(contributor.points, 3);
        assert_err!(reopened.create_claim("c1", &request(10)).await);
        let _ = std::fs::remove_file(&path);
    }
}
