//! Contributor Ledger - Points, milestone claims and payouts
//!
//! Contributors earn points for publishing content and redeem them at fixed
//! milestones for cash payouts that administrators process.
//!
//! # How it works
//!
//! 1. The content store reports created and deleted entries; authors gain
//!    one point per earning entry and lose one when they delete it
//! 2. A contributor redeems a milestone (10, 25, 50 or 100 points); the
//!    points are deducted and a pending claim is opened
//! 3. An administrator moves the claim to processing, paid or rejected
//! 4. Paid claims add to the contributor's earnings; rejected claims give the
//!    points back and release the milestone
//!
//! # Guarantees
//!
//! - Balances never go negative
//! - At most one pending claim per contributor, even under concurrent requests
//! - Every balance change is recorded in the points event log
//! - A milestone stays spent once paid

pub mod claim;
pub mod config;
pub mod contributor;
pub mod error;
pub mod ledger;
pub mod milestone;
pub mod pg_storage;
pub mod policy;
pub mod server;
pub mod storage;

pub use claim::{Claim, ClaimRequest, ClaimStatus, ClaimStatusStats, ResolveClaimRequest};
pub use config::Config;
pub use contributor::{ContentKind, Contributor, PointsEvent, PointsSummary, Role};
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerStore, PointsChange};
pub use milestone::Milestone;
pub use pg_storage::PgStorage;
pub use policy::{AccessPolicy, Actor, RolePolicy};
pub use storage::SqliteStorage;
