//! Milestone table
//!
//! Contributors redeem fixed point thresholds for fixed cash payouts.
//! The table is compiled in and is not configurable at runtime.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Milestone {
    Ten,
    TwentyFive,
    Fifty,
    Hundred,
}

impl Milestone {
    pub const ALL: [Milestone; 4] = [
        Milestone::Ten,
        Milestone::TwentyFive,
        Milestone::Fifty,
        Milestone::Hundred,
    ];

    /// Point cost of redeeming this milestone
    pub fn points(self) -> i32 {
        match self {
            Milestone::Ten => 10,
            Milestone::TwentyFive => 25,
            Milestone::Fifty => 50,
            Milestone::Hundred => 100,
        }
    }

    /// Payout in whole currency units
    pub fn payout(self) -> i64 {
        match self {
            Milestone::Ten => 15,
            Milestone::TwentyFive => 30,
            Milestone::Fifty => 60,
            Milestone::Hundred => 120,
        }
    }

    pub fn from_points(points: i32) -> Result<Self, LedgerError> {
        Self::ALL
            .into_iter()
            .find(|m| m.points() == points)
            .ok_or(LedgerError::InvalidMilestone(points))
    }
}

impl TryFrom<i32> for Milestone {
    type Error = LedgerError;

    fn try_from(points: i32) -> Result<Self, Self::Error> {
        Self::from_points(points)
    }
}

impl From<Milestone> for i32 {
    fn from(milestone: Milestone) -> Self {
        milestone.points()
    }
}

impl std::fmt::Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} points", self.points())
    }
}

/// One row of the public milestone table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneInfo {
    pub points: i32,
    pub amount: i64,
}

pub fn milestone_table() -> Vec<MilestoneInfo> {
    Milestone::ALL
        .into_iter()
        .map(|m| MilestoneInfo {
            points: m.points(),
            amount: m.payout(),
        })
        .collect()
}
