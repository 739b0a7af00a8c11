//! PostgreSQL storage for the contributor ledger
//!
//! Connects with DATABASE_URL. Ledger mutations run in a transaction that
//! takes `SELECT ... FOR UPDATE` on the contributor or claim row first, and
//! the `claims_one_pending` partial index backs the one-pending-claim rule.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::{GenericClient, NoTls, Row};
use tracing::info;
use uuid::Uuid;

use crate::claim::{Claim, ClaimRequest, ClaimStatus, ClaimStatusStats, Resolution};
use crate::config::DatabaseConfig;
use crate::contributor::{Contributor, PointsEvent, PointsReason, Role};
use crate::error::{LedgerError, Result};
use crate::ledger::{
    applied_delta, check_claim, new_claim, plan_resolution, validate_claim_request,
    BalanceEffect, LedgerStore, PointsChange,
};

const CONTRIBUTOR_COLUMNS: &str =
    "id, role, points, total_earnings, claimed_milestones, created_at, updated_at";

const CLAIM_COLUMNS: &str = "id, contributor_id, points, amount, payment_method, payment_details, \
     status, transaction_id, notes, processed_by, processed_at, created_at";

// ============================================================================
// PG STORAGE
// ============================================================================

#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    /// Create storage from a connection URL
    pub async fn new(database_url: &str, settings: &DatabaseConfig) -> anyhow::Result<Self> {
        let mut config = Config::new();
        config.url = Some(database_url.to_string());
        config.options = Some(format!(
            "-c statement_timeout={}",
            settings.query_timeout_secs * 1000
        ));

        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        config.pool = Some(PoolConfig {
            max_size: settings.pool_max_size,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(Duration::from_secs(settings.query_timeout_secs)),
                create: Some(Duration::from_secs(10)),
                recycle: Some(Duration::from_secs(30)),
            },
            ..Default::default()
        });

        let pool = config.create_pool(Some(Runtime::Tokio1), NoTls)?;

        // Test connection
        let client = pool.get().await?;
        client.execute("SELECT 1", &[]).await?;

        info!(
            "Connected to PostgreSQL (pool_size: {}, query_timeout: {}s)",
            settings.pool_max_size, settings.query_timeout_secs
        );

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create storage from DATABASE_URL environment variable
    pub async fn from_env(settings: &DatabaseConfig) -> anyhow::Result<Self> {
        let url =
            std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
        Self::new(&url, settings).await
    }

    /// Run embedded migrations
    async fn run_migrations(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await?;

        let exists: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = 'schema_migrations')",
                &[],
            )
            .await?
            .get(0);

        let applied = if exists {
            client
                .query_one(
                    "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = 1)",
                    &[],
                )
                .await?
                .get(0)
        } else {
            false
        };

        if !applied {
            let migration_sql = include_str!("../migrations/postgres/001_schema.sql");
            client.batch_execute(migration_sql).await?;
            info!("Applied migration 001_schema");
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStorage {
    async fn upsert_contributor(&self, id: &str, role: Role) -> Result<Contributor> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO contributors (id, role) VALUES ($1, $2)
                     ON CONFLICT (id) DO UPDATE SET role = EXCLUDED.role, updated_at = NOW()
                     RETURNING {}",
                    CONTRIBUTOR_COLUMNS
                ),
                &[&id, &role.as_str()],
            )
            .await?;
        contributor_from_row(&row)
    }

    async fn ensure_contributor(&self, id: &str, role: Role) -> Result<Contributor> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO contributors (id, role) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
                &[&id, &role.as_str()],
            )
            .await?;
        load_contributor(&**client, id, false)
            .await?
            .ok_or_else(|| LedgerError::ContributorNotFound(id.to_string()))
    }

    async fn get_contributor(&self, id: &str) -> Result<Option<Contributor>> {
        let client = self.pool.get().await?;
        load_contributor(&**client, id, false).await
    }

    async fn adjust_points(
        &self,
        contributor_id: &str,
        delta: i32,
        reason: PointsReason,
        reference: Option<&str>,
    ) -> Result<PointsChange> {
        let mut conn = self.pool.get().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await?;

        let contributor = load_contributor(&tx, contributor_id, true)
            .await?
            .ok_or_else(|| LedgerError::ContributorNotFound(contributor_id.to_string()))?;
        let applied = applied_delta(contributor.points, delta);

        if applied != 0 {
            tx.execute(
                "UPDATE contributors SET points = points + $2, updated_at = NOW() WHERE id = $1",
                &[&contributor_id, &applied],
            )
            .await?;
            insert_event(&tx, contributor_id, applied, reason, reference).await?;
        }
        tx.commit().await?;

        Ok(PointsChange {
            contributor_id: contributor_id.to_string(),
            delta: applied,
            points: contributor.points + applied,
        })
    }

    async fn create_claim(&self, contributor_id: &str, request: &ClaimRequest) -> Result<Claim> {
        let milestone = validate_claim_request(request)?;

        let mut conn = self.pool.get().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await?;

        let contributor = load_contributor(&tx, contributor_id, true)
            .await?
            .ok_or_else(|| LedgerError::ContributorNotFound(contributor_id.to_string()))?;
        let has_pending = load_pending_claim(&tx, contributor_id).await?.is_some();
        check_claim(&contributor, has_pending, milestone)?;

        let claim = new_claim(contributor_id, milestone, request, Utc::now());

        tx.execute(
            &format!(
                "INSERT INTO claims ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, NULL, NULL, NULL, $8)",
                CLAIM_COLUMNS
            ),
            &[
                &claim.id,
                &claim.contributor_id,
                &claim.points,
                &claim.amount,
                &claim.payment_method,
                &claim.payment_details,
                &claim.status,
                &claim.created_at,
            ],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                LedgerError::ClaimAlreadyPending
            } else {
                LedgerError::from(e)
            }
        })?;

        tx.execute(
            "UPDATE contributors
             SET points = points - $2,
                 claimed_milestones = array_append(claimed_milestones, $3),
                 updated_at = NOW()
             WHERE id = $1",
            &[&contributor_id, &claim.points, &claim.points],
        )
        .await?;
        insert_event(
            &tx,
            contributor_id,
            -claim.points,
            PointsReason::ClaimRequested,
            Some(&claim.id.to_string()),
        )
        .await?;

        tx.commit().await?;
        Ok(claim)
    }

    async fn resolve_claim(&self, claim_id: Uuid, resolution: &Resolution) -> Result<Claim> {
        let mut conn = self.pool.get().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                &format!("SELECT {} FROM claims WHERE id = $1 FOR UPDATE", CLAIM_COLUMNS),
                &[&claim_id],
            )
            .await?
            .ok_or(LedgerError::ClaimNotFound(claim_id))?;
        let claim = claim_from_row(&row)?;
        let effect = plan_resolution(&claim, resolution.status)?;

        let row = tx
            .query_one(
                &format!(
                    "UPDATE claims SET status = $2, processed_by = $3, processed_at = NOW(),
                         transaction_id = COALESCE($4, transaction_id),
                         notes = COALESCE($5, notes)
                     WHERE id = $1
                     RETURNING {}",
                    CLAIM_COLUMNS
                ),
                &[
                    &claim_id,
                    &resolution.status,
                    &resolution.processed_by,
                    &resolution.transaction_id,
                    &resolution.notes,
                ],
            )
            .await?;
        let updated = claim_from_row(&row)?;

        match effect {
            BalanceEffect::None => {}
            BalanceEffect::CreditEarnings { amount } => {
                tx.execute(
                    "UPDATE contributors SET total_earnings = total_earnings + $2, updated_at = NOW()
                     WHERE id = $1",
                    &[&claim.contributor_id, &amount],
                )
                .await?;
            }
            BalanceEffect::Refund { points } => {
                tx.execute(
                    "UPDATE contributors
                     SET points = points + $2,
                         claimed_milestones = array_remove(claimed_milestones, $3),
                         updated_at = NOW()
                     WHERE id = $1",
                    &[&claim.contributor_id, &points, &claim.points],
                )
                .await?;
                insert_event(
                    &tx,
                    &claim.contributor_id,
                    points,
                    PointsReason::ClaimRefunded,
                    Some(&claim_id.to_string()),
                )
                .await?;
            }
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM claims WHERE id = $1", CLAIM_COLUMNS),
                &[&claim_id],
            )
            .await?;
        row.as_ref().map(claim_from_row).transpose()
    }

    async fn pending_claim(&self, contributor_id: &str) -> Result<Option<Claim>> {
        let client = self.pool.get().await?;
        load_pending_claim(&**client, contributor_id).await
    }

    async fn list_claims_by_contributor(&self, contributor_id: &str) -> Result<Vec<Claim>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM claims WHERE contributor_id = $1 ORDER BY created_at DESC",
                    CLAIM_COLUMNS
                ),
                &[&contributor_id],
            )
            .await?;
        rows.iter().map(claim_from_row).collect()
    }

    async fn list_claims(&self, status: Option<ClaimStatus>) -> Result<Vec<Claim>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM claims
                     WHERE $1::claim_status IS NULL OR status = $1
                     ORDER BY created_at DESC",
                    CLAIM_COLUMNS
                ),
                &[&status],
            )
            .await?;
        rows.iter().map(claim_from_row).collect()
    }

    async fn claim_stats(&self) -> Result<Vec<ClaimStatusStats>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT status, COUNT(*), COALESCE(SUM(amount), 0)::BIGINT
                 FROM claims GROUP BY status",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ClaimStatusStats {
                status: row.get(0),
                count: row.get(1),
                total_amount: row.get(2),
            })
            .collect())
    }

    async fn points_events(&self, contributor_id: &str) -> Result<Vec<PointsEvent>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, contributor_id, delta, reason, reference, created_at
                 FROM points_events WHERE contributor_id = $1 ORDER BY id ASC",
                &[&contributor_id],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<PointsEvent> {
                Ok(PointsEvent {
                    id: row.get(0),
                    contributor_id: row.get(1),
                    delta: row.get(2),
                    reason: row.get::<_, String>(3).parse()?,
                    reference: row.get(4),
                    created_at: row.get(5),
                })
            })
            .collect()
    }
}

// ============================================================================
// ROW HELPERS
// ============================================================================

async fn load_contributor<C: GenericClient>(
    client: &C,
    id: &str,
    for_update: bool,
) -> Result<Option<Contributor>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = client
        .query_opt(
            &format!(
                "SELECT {} FROM contributors WHERE id = $1{}",
                CONTRIBUTOR_COLUMNS, lock
            ),
            &[&id],
        )
        .await?;
    row.as_ref().map(contributor_from_row).transpose()
}

async fn load_pending_claim<C: GenericClient>(
    client: &C,
    contributor_id: &str,
) -> Result<Option<Claim>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {} FROM claims WHERE contributor_id = $1 AND status = 'pending'",
                CLAIM_COLUMNS
            ),
            &[&contributor_id],
        )
        .await?;
    row.as_ref().map(claim_from_row).transpose()
}

async fn insert_event<C: GenericClient>(
    client: &C,
    contributor_id: &str,
    delta: i32,
    reason: PointsReason,
    reference: Option<&str>,
) -> Result<()> {
    client
        .execute(
            "INSERT INTO points_events (contributor_id, delta, reason, reference)
             VALUES ($1, $2, $3, $4)",
            &[&contributor_id, &delta, &reason.as_str(), &reference],
        )
        .await?;
    Ok(())
}

fn contributor_from_row(row: &Row) -> Result<Contributor> {
    let milestones: Vec<i32> = row.get(4);
    Ok(Contributor {
        id: row.get(0),
        role: row.get::<_, String>(1).parse()?,
        points: row.get(2),
        total_earnings: row.get(3),
        claimed_milestones: milestones.into_iter().collect::<BTreeSet<_>>(),
        created_at: row.get(5),
        updated_at: row.get(6),
    })
}

fn claim_from_row(row: &Row) -> Result<Claim> {
    Ok(Claim {
        id: row.get(0),
        contributor_id: row.get(1),
        points: row.get(2),
        amount: row.get(3),
        payment_method: row.get(4),
        payment_details: row.get(5),
        status: row.get(6),
        transaction_id: row.get(7),
        notes: row.get(8),
        processed_by: row.get(9),
        processed_at: row.get(10),
        created_at: row.get(11),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contributor::fold_balance;
    use std::sync::Arc;

    /// Tests run against TEST_DATABASE_URL and are skipped without it
    async fn storage() -> Option<PgStorage> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(
            PgStorage::new(&url, &DatabaseConfig::default())
                .await
                .expect("connect to TEST_DATABASE_URL"),
        )
    }

    async fn funded(storage: &PgStorage, points: i32) -> String {
        let id = format!("pg-{}", Uuid::new_v4());
        storage.upsert_contributor(&id, Role::Contributor).await.unwrap();
        storage
            .adjust_points(&id, points, PointsReason::ContentCreated, None)
            .await
            .unwrap();
        id
    }

    fn request(points: i32) -> ClaimRequest {
        ClaimRequest {
            points,
            payment_method: "upi".to_string(),
            payment_details: serde_json::json!({ "upi_id": "someone@bank" }),
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

    #[tokio::test]
    async fn test_claim_lifecycle() {
        let Some(storage) = storage().await else {
            return;
        };
        let id = funded(&storage, 30).await;

        let claim = storage.create_claim(&id, &request(25)).await.unwrap();
        let contributor = storage.get_contributor(&id).await.unwrap().unwrap();
        assert_eq!(contributor.points, 5);
        assert_eq!(contributor.claimed_milestones, BTreeSet::from([25]));

        let err = storage.create_claim(&id, &request(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::ClaimAlreadyPending));

        storage
            .resolve_claim(claim.id, &resolution(ClaimStatus::Rejected))
            .await
            .unwrap();
        let contributor = storage.get_contributor(&id).await.unwrap().unwrap();
        assert_eq!(contributor.points, 30);
        assert!(contributor.claimed_milestones.is_empty());

        let claim = storage.create_claim(&id, &request(25)).await.unwrap();
        let paid = storage
            .resolve_claim(claim.id, &resolution(ClaimStatus::Paid))
            .await
            .unwrap();
        assert_eq!(paid.status, ClaimStatus::Paid);
        let err = storage
            .resolve_claim(claim.id, &resolution(ClaimStatus::Paid))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        let contributor = storage.get_contributor(&id).await.unwrap().unwrap();
        assert_eq!(contributor.total_earnings, 30);
        let events = storage.points_events(&id).await.unwrap();
        assert_eq!(fold_balance(&events), contributor.points);

        let pending = storage.list_claims(Some(ClaimStatus::Paid)).await.unwrap();
        assert!(pending.iter().any(|c| c.id == claim.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_allow_one_pending_claim() {
        let Some(storage) = storage().await else {
            return;
        };
        let storage = Arc::new(storage);
        let id = funded(&storage, 30).await;

        let attempts = (0..8).map(|_| {
            let storage = storage.clone();
            let id = id.clone();
            tokio::spawn(async move { storage.create_claim(&id, &request(10)).await })
        });
        let succeeded = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.expect("task panicked"))
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(succeeded, 1);

        let contributor = storage.get_contributor(&id).await.unwrap().unwrap();
        assert_eq!(contributor.points, 20);
    }
}
