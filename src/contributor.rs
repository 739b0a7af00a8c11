//! Contributors, roles and the points event log

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claim::Claim;
use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Contributor,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Contributor => "contributor",
            Role::User => "user",
        }
    }

    /// `super_admin` never earns or loses points
    pub fn is_exempt_from_points(self) -> bool {
        self == Role::SuperAdmin
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "contributor" => Ok(Role::Contributor),
            "user" => Ok(Role::User),
            other => Err(LedgerError::InvalidRequest(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub id: String,
    pub role: Role,
    pub points: i32,
    pub total_earnings: i64,
    pub claimed_milestones: BTreeSet<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Job,
    Blog,
    Resource,
    Course,
    MockTest,
    DigitalProduct,
}

impl ContentKind {
    pub const ALL: [ContentKind; 6] = [
        ContentKind::Job,
        ContentKind::Blog,
        ContentKind::Resource,
        ContentKind::Course,
        ContentKind::MockTest,
        ContentKind::DigitalProduct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Job => "job",
            ContentKind::Blog => "blog",
            ContentKind::Resource => "resource",
            ContentKind::Course => "course",
            ContentKind::MockTest => "mock_test",
            ContentKind::DigitalProduct => "digital_product",
        }
    }

    /// Courses and mock tests are admin-curated and carry no points
    pub fn earns_points(self) -> bool {
        matches!(
            self,
            ContentKind::Job | ContentKind::Blog | ContentKind::Resource | ContentKind::DigitalProduct
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentAction {
    Created,
    Deleted,
}

/// Notification from the content store about an entry's lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEvent {
    pub kind: ContentKind,
    pub action: ContentAction,
    /// Author of the entry; defaults to the acting user
    #[serde(default)]
    pub author_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterContributor {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsReason {
    ContentCreated,
    ContentDeleted,
    ClaimRequested,
    ClaimRefunded,
}

impl PointsReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PointsReason::ContentCreated => "content_created",
            PointsReason::ContentDeleted => "content_deleted",
            PointsReason::ClaimRequested => "claim_requested",
            PointsReason::ClaimRefunded => "claim_refunded",
        }
    }
}

impl FromStr for PointsReason {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content_created" => Ok(PointsReason::ContentCreated),
            "content_deleted" => Ok(PointsReason::ContentDeleted),
            "claim_requested" => Ok(PointsReason::ClaimRequested),
            "claim_refunded" => Ok(PointsReason::ClaimRefunded),
            other => Err(LedgerError::internal(format!("unknown points reason '{}'", other))),
        }
    }
}

/// One applied balance change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsEvent {
    pub id: i64,
    pub contributor_id: String,
    pub delta: i32,
    pub reason: PointsReason,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Balance implied by an event history
pub fn fold_balance(events: &[PointsEvent]) -> i32 {
    events.iter().map(|e| e.delta).sum()
}

/// Per-milestone view for a contributor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneProgress {
    pub points: i32,
    pub amount: i64,
    pub claimed: bool,
    pub eligible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsSummary {
    pub contributor_id: String,
    pub role: Role,
    pub points: i32,
    pub total_earnings: i64,
    pub claimed_milestones: BTreeSet<i32>,
    pub pending_claim: Option<Claim>,
    pub milestones: Vec<MilestoneProgress>,
}
