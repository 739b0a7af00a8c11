//! Ledger error kinds
//!
//! Every variant except `Internal` is a rejected precondition and is
//! returned to the caller as-is. `Internal` wraps store faults.

use thiserror::Error;
use uuid::Uuid;

use crate::claim::ClaimStatus;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} is not a claimable milestone (expected one of 10, 25, 50, 100)")]
    InvalidMilestone(i32),

    #[error("milestone {0} has already been claimed")]
    AlreadyClaimed(i32),

    #[error("insufficient points: {required} required, {available} available")]
    InsufficientBalance { required: i32, available: i32 },

    #[error("a claim is already pending for this contributor")]
    ClaimAlreadyPending,

    #[error("claim {0} not found")]
    ClaimNotFound(Uuid),

    #[error("contributor {0} not found")]
    ContributorNotFound(String),

    #[error("cannot move claim from {from} to {to}")]
    InvalidTransition { from: ClaimStatus, to: ClaimStatus },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidMilestone(_) => "INVALID_MILESTONE",
            LedgerError::AlreadyClaimed(_) => "ALREADY_CLAIMED",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::ClaimAlreadyPending => "CLAIM_ALREADY_PENDING",
            LedgerError::ClaimNotFound(_) => "CLAIM_NOT_FOUND",
            LedgerError::ContributorNotFound(_) => "CONTRIBUTOR_NOT_FOUND",
            LedgerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LedgerError::Unauthorized(_) => "UNAUTHORIZED",
            LedgerError::InvalidRequest(_) => "INVALID_REQUEST",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        LedgerError::Unauthorized(message.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        LedgerError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::internal(err)
    }
}

impl From<tokio_postgres::Error> for LedgerError {
    fn from(err: tokio_postgres::Error) -> Self {
        LedgerError::internal(err)
    }
}

impl From<deadpool_postgres::PoolError> for LedgerError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        LedgerError::internal(err)
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::internal(err)
    }
}
