//! Points ledger and claim workflow
//!
//! The decision logic lives in plain functions ([`check_claim`],
//! [`plan_resolution`], [`applied_delta`]) so every store backend runs the
//! same rules inside its own transaction. [`Ledger`] layers the access policy
//! on top and is what the HTTP server talks to.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::claim::{
    complete_stats, Claim, ClaimRequest, ClaimStatus, ClaimStatusStats, Resolution,
    ResolveClaimRequest,
};
use crate::contributor::{
    ContentKind, Contributor, MilestoneProgress, PointsEvent, PointsReason, PointsSummary, Role,
};
use crate::error::{LedgerError, Result};
use crate::milestone::Milestone;
use crate::policy::{AccessPolicy, Actor};

/// Persistence for contributors, claims and the points log.
///
/// `create_claim`, `resolve_claim` and `adjust_points` must each run as one
/// transaction holding a lock on the rows they read, so that concurrent
/// calls for the same contributor or claim serialize.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert with zero balances, or update the role of an existing row
    async fn upsert_contributor(&self, id: &str, role: Role) -> Result<Contributor>;

    /// Insert with zero balances if missing; existing rows are left alone
    async fn ensure_contributor(&self, id: &str, role: Role) -> Result<Contributor>;

    async fn get_contributor(&self, id: &str) -> Result<Option<Contributor>>;

    /// Apply `delta` floored at zero and log the applied amount
    async fn adjust_points(
        &self,
        contributor_id: &str,
        delta: i32,
        reason: PointsReason,
        reference: Option<&str>,
    ) -> Result<PointsChange>;

    async fn create_claim(&self, contributor_id: &str, request: &ClaimRequest) -> Result<Claim>;

    async fn resolve_claim(&self, claim_id: Uuid, resolution: &Resolution) -> Result<Claim>;

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>>;

    async fn pending_claim(&self, contributor_id: &str) -> Result<Option<Claim>>;

    /// Newest first
    async fn list_claims_by_contributor(&self, contributor_id: &str) -> Result<Vec<Claim>>;

    /// Newest first
    async fn list_claims(&self, status: Option<ClaimStatus>) -> Result<Vec<Claim>>;

    /// Rows only for statuses that have claims; see [`complete_stats`]
    async fn claim_stats(&self) -> Result<Vec<ClaimStatusStats>>;

    /// Oldest first
    async fn points_events(&self, contributor_id: &str) -> Result<Vec<PointsEvent>>;
}

/// Result of a points adjustment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsChange {
    pub contributor_id: String,
    /// Amount actually applied after flooring
    pub delta: i32,
    pub points: i32,
}

/// Side effect of a status change on the contributor's record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    None,
    /// Add the payout to total earnings
    CreditEarnings { amount: i64 },
    /// Give the points back and release the milestone
    Refund { points: i32 },
}

/// Validate the parts of a claim request that need no stored state
pub fn validate_claim_request(request: &ClaimRequest) -> Result<Milestone> {
    let milestone = Milestone::from_points(request.points)?;
    if request.payment_method.trim().is_empty() {
        return Err(LedgerError::InvalidRequest(
            "payment_method is required".to_string(),
        ));
    }
    match request.payment_details.as_object() {
        Some(details) if !details.is_empty() => {}
        _ => {
            return Err(LedgerError::InvalidRequest(
                "payment_details must be a non-empty object".to_string(),
            ))
        }
    }
    Ok(milestone)
}

/// Precondition checks for redeeming `milestone`, in reporting order
pub fn check_claim(contributor: &Contributor, has_pending: bool, milestone: Milestone) -> Result<()> {
    let cost = milestone.points();
    if contributor.claimed_milestones.contains(&cost) {
        return Err(LedgerError::AlreadyClaimed(cost));
    }
    if has_pending {
        return Err(LedgerError::ClaimAlreadyPending);
    }
    if contributor.points < cost {
        return Err(LedgerError::InsufficientBalance {
            required: cost,
            available: contributor.points,
        });
    }
    Ok(())
}

/// Build the pending claim record for an accepted request
pub fn new_claim(
    contributor_id: &str,
    milestone: Milestone,
    request: &ClaimRequest,
    now: DateTime<Utc>,
) -> Claim {
    Claim {
        id: Uuid::new_v4(),
        contributor_id: contributor_id.to_string(),
        points: milestone.points(),
        amount: milestone.payout(),
        payment_method: request.payment_method.trim().to_string(),
        payment_details: request.payment_details.clone(),
        status: ClaimStatus::Pending,
        transaction_id: None,
        notes: None,
        processed_by: None,
        processed_at: None,
        created_at: now,
    }
}

/// Validate a status change and work out its balance effect
pub fn plan_resolution(claim: &Claim, next: ClaimStatus) -> Result<BalanceEffect> {
    if !claim.status.can_transition_to(next) {
        return Err(LedgerError::InvalidTransition {
            from: claim.status,
            to: next,
        });
    }
    Ok(match next {
        ClaimStatus::Paid => BalanceEffect::CreditEarnings {
            amount: claim.amount,
        },
        ClaimStatus::Rejected => BalanceEffect::Refund {
            points: claim.points,
        },
        ClaimStatus::Processing | ClaimStatus::Pending => BalanceEffect::None,
    })
}

/// Portion of `delta` that can be applied without going below zero
pub fn applied_delta(current: i32, delta: i32) -> i32 {
    if current + delta < 0 {
        -current
    } else {
        delta
    }
}

/// Ledger service: access policy plus store
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    policy: Arc<dyn AccessPolicy>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    fn require_processor(&self, actor: &Actor) -> Result<()> {
        if self.policy.can_resolve_claims(actor) {
            Ok(())
        } else {
            Err(LedgerError::unauthorized(format!(
                "role {} cannot manage claims",
                actor.role
            )))
        }
    }

    pub async fn request_claim(&self, actor: &Actor, request: ClaimRequest) -> Result<Claim> {
        if !self.policy.can_request_claim(actor) {
            return Err(LedgerError::unauthorized(format!(
                "role {} cannot request claims",
                actor.role
            )));
        }
        validate_claim_request(&request)?;

        match self.store.create_claim(&actor.id, &request).await {
            Ok(claim) => {
                info!(
                    "Claim {} created by {} for {} points ({} payout)",
                    claim.id, claim.contributor_id, claim.points, claim.amount
                );
                Ok(claim)
            }
            Err(e) => {
                debug!("Claim request from {} rejected: {}", actor.id, e);
                Err(e)
            }
        }
    }

    pub async fn resolve_claim(
        &self,
        actor: &Actor,
        claim_id: Uuid,
        request: ResolveClaimRequest,
    ) -> Result<Claim> {
        self.require_processor(actor)?;

        let resolution = Resolution {
            status: request.status,
            processed_by: actor.id.clone(),
            transaction_id: request.transaction_id.filter(|t| !t.trim().is_empty()),
            notes: request.notes.filter(|n| !n.trim().is_empty()),
        };

        match self.store.resolve_claim(claim_id, &resolution).await {
            Ok(claim) => {
                info!(
                    "Claim {} moved to {} by {} (contributor {})",
                    claim.id, claim.status, actor.id, claim.contributor_id
                );
                Ok(claim)
            }
            Err(e) => {
                debug!("Resolution of claim {} rejected: {}", claim_id, e);
                Err(e)
            }
        }
    }

    pub async fn get_claim(&self, actor: &Actor, claim_id: Uuid) -> Result<Claim> {
        let claim = self
            .store
            .get_claim(claim_id)
            .await?
            .ok_or(LedgerError::ClaimNotFound(claim_id))?;

        if !self.policy.can_read_claim(actor, &claim) {
            return Err(LedgerError::unauthorized("claim belongs to another contributor"));
        }
        Ok(claim)
    }

    pub async fn list_my_claims(&self, actor: &Actor) -> Result<Vec<Claim>> {
        self.store.list_claims_by_contributor(&actor.id).await
    }

    pub async fn list_claims_for(&self, actor: &Actor, contributor_id: &str) -> Result<Vec<Claim>> {
        if actor.id != contributor_id {
            self.require_processor(actor)?;
        }
        self.store.list_claims_by_contributor(contributor_id).await
    }

    pub async fn list_all_claims(
        &self,
        actor: &Actor,
        status: Option<ClaimStatus>,
    ) -> Result<Vec<Claim>> {
        self.require_processor(actor)?;
        self.store.list_claims(status).await
    }

    pub async fn claim_stats(&self, actor: &Actor) -> Result<Vec<ClaimStatusStats>> {
        self.require_processor(actor)?;
        Ok(complete_stats(self.store.claim_stats().await?))
    }

    pub async fn points_summary(&self, actor: &Actor) -> Result<PointsSummary> {
        let contributor = self
            .store
            .get_contributor(&actor.id)
            .await?
            .ok_or_else(|| LedgerError::ContributorNotFound(actor.id.clone()))?;
        let pending_claim = self.store.pending_claim(&actor.id).await?;

        let milestones = Milestone::ALL
            .into_iter()
            .map(|m| MilestoneProgress {
                points: m.points(),
                amount: m.payout(),
                claimed: contributor.claimed_milestones.contains(&m.points()),
                eligible: check_claim(&contributor, pending_claim.is_some(), m).is_ok(),
            })
            .collect();

        Ok(PointsSummary {
            contributor_id: contributor.id,
            role: contributor.role,
            points: contributor.points,
            total_earnings: contributor.total_earnings,
            claimed_milestones: contributor.claimed_milestones,
            pending_claim,
            milestones,
        })
    }

    pub async fn points_history(&self, actor: &Actor) -> Result<Vec<PointsEvent>> {
        self.store.points_events(&actor.id).await
    }

    pub async fn register_contributor(
        &self,
        actor: &Actor,
        id: &str,
        role: Role,
    ) -> Result<Contributor> {
        self.require_processor(actor)?;
        if id.trim().is_empty() {
            return Err(LedgerError::InvalidRequest("contributor id is required".to_string()));
        }
        let contributor = self.store.upsert_contributor(id.trim(), role).await?;
        info!("Registered contributor {} as {}", contributor.id, contributor.role);
        Ok(contributor)
    }

    /// The actor created a content entry
    pub async fn record_content_created(
        &self,
        actor: &Actor,
        kind: ContentKind,
    ) -> Result<PointsChange> {
        let contributor = self.store.ensure_contributor(&actor.id, actor.role).await?;

        if actor.role.is_exempt_from_points() || !kind.earns_points() {
            return Ok(PointsChange {
                contributor_id: contributor.id,
                delta: 0,
                points: contributor.points,
            });
        }

        let change = self
            .store
            .adjust_points(&actor.id, 1, PointsReason::ContentCreated, Some(kind.as_str()))
            .await?;
        debug!("Credited {} for new {} ({} points)", actor.id, kind.as_str(), change.points);
        Ok(change)
    }

    /// The actor deleted an entry authored by `author_id`
    pub async fn record_content_deleted(
        &self,
        actor: &Actor,
        author_id: &str,
        kind: ContentKind,
    ) -> Result<PointsChange> {
        if !actor.role.is_admin() && actor.id != author_id {
            return Err(LedgerError::unauthorized(
                "only the author or an administrator can delete this entry",
            ));
        }

        let author = self.store.get_contributor(author_id).await?;
        let unchanged = |points| PointsChange {
            contributor_id: author_id.to_string(),
            delta: 0,
            points,
        };

        let Some(author) = author else {
            return Ok(unchanged(0));
        };
        if actor.role.is_admin() || author.role.is_exempt_from_points() || !kind.earns_points() {
            return Ok(unchanged(author.points));
        }

        let change = self
            .store
            .adjust_points(author_id, -1, PointsReason::ContentDeleted, Some(kind.as_str()))
            .await?;
        debug!("Debited {} for deleted {} ({} points)", author_id, kind.as_str(), change.points);
        Ok(change)
    }
}
