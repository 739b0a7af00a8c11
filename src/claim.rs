//! Claims and the payout state machine
//!
//! ```text
//! pending ──► processing ──► paid
//!    │             │
//!    ├─────────────┼──────► paid
//!    └─────────────┴──────► rejected
//! ```
//!
//! `paid` and `rejected` are terminal. Nothing moves back to `pending`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "claim_status")]
pub enum ClaimStatus {
    #[postgres(name = "pending")]
    Pending,
    #[postgres(name = "processing")]
    Processing,
    #[postgres(name = "paid")]
    Paid,
    #[postgres(name = "rejected")]
    Rejected,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 4] = [
        ClaimStatus::Pending,
        ClaimStatus::Processing,
        ClaimStatus::Paid,
        ClaimStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Processing => "processing",
            ClaimStatus::Paid => "paid",
            ClaimStatus::Rejected => "rejected",
        }
    }

    /// Legal next states from this one
    pub fn successors(self) -> &'static [ClaimStatus] {
        match self {
            ClaimStatus::Pending => &[
                ClaimStatus::Processing,
                ClaimStatus::Paid,
                ClaimStatus::Rejected,
            ],
            ClaimStatus::Processing => &[ClaimStatus::Paid, ClaimStatus::Rejected],
            ClaimStatus::Paid | ClaimStatus::Rejected => &[],
        }
    }

    pub fn can_transition_to(self, next: ClaimStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ClaimStatus::Pending),
            "processing" => Ok(ClaimStatus::Processing),
            "paid" => Ok(ClaimStatus::Paid),
            "rejected" => Ok(ClaimStatus::Rejected),
            other => Err(LedgerError::InvalidRequest(format!(
                "unknown claim status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub contributor_id: String,
    pub points: i32,
    pub amount: i64,
    pub payment_method: String,
    pub payment_details: serde_json::Value,
    pub status: ClaimStatus,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Body of a contributor's claim request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub points: i32,
    pub payment_method: String,
    pub payment_details: serde_json::Value,
}

/// Body of a processor's status update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveClaimRequest {
    pub status: ClaimStatus,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Resolution as handed to the store, with the processor attached
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: ClaimStatus,
    pub processed_by: String,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimStatusStats {
    pub status: ClaimStatus,
    pub count: i64,
    pub total_amount: i64,
}

/// Fill in zero rows so every status is reported, in table order
pub fn complete_stats(rows: Vec<ClaimStatusStats>) -> Vec<ClaimStatusStats> {
    ClaimStatus::ALL
        .into_iter()
        .map(|status| {
            rows.iter()
                .find(|r| r.status == status)
                .cloned()
                .unwrap_or(ClaimStatusStats {
                    status,
                    count: 0,
                    total_amount: 0,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ClaimStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Processing.can_transition_to(Paid));
        assert!(Processing.can_transition_to(Rejected));

        for from in ClaimStatus::ALL {
            assert!(!from.can_transition_to(Pending), "{} -> pending", from);
        }
        for to in ClaimStatus::ALL {
            assert!(!Paid.can_transition_to(to), "paid -> {}", to);
            assert!(!Rejected.can_transition_to(to), "rejected -> {}", to);
        }
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ClaimStatus::Paid.is_terminal());
        assert!(ClaimStatus::Rejected.is_terminal());
        assert!(!ClaimStatus::Pending.is_terminal());
        assert!(!ClaimStatus::Processing.is_terminal());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!("PAID".parse::<ClaimStatus>().unwrap(), ClaimStatus::Paid);
        assert_eq!(" rejected ".parse::<ClaimStatus>().unwrap(), ClaimStatus::Rejected);
        assert!("approved".parse::<ClaimStatus>().is_err());
    }

    #[test]
    fn test_resolve_request_defaults() {
        let req: ResolveClaimRequest = serde_json::from_str(r#"{"status":"processing"}"#).unwrap();
        assert_eq!(req.status, ClaimStatus::Processing);
        assert!(req.transaction_id.is_none());
        assert!(req.notes.is_none());
    }

    #[test]
    fn test_complete_stats_fills_missing_statuses() {
        let stats = complete_stats(vec![ClaimStatusStats {
            status: ClaimStatus::Paid,
            count: 2,
            total_amount: 45,
        }]);
        assert_eq!(stats.len(), 4);
        assert_eq!(stats[0].status, ClaimStatus::Pending);
        assert_eq!(stats[0].count, 0);
        assert_eq!(stats[2].count, 2);
        assert_eq!(stats[2].total_amount, 45);
    }
}
