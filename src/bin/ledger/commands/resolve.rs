//! Resolve command - move a claim through the payout workflow

use crate::client::LedgerClient;
use crate::style::*;
use anyhow::{Context, Result};
use contributor_ledger::claim::{ClaimStatus, ResolveClaimRequest};
use uuid::Uuid;

pub async fn run(
    client: &LedgerClient,
    id: &str,
    status: &str,
    transaction_id: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let id = Uuid::parse_str(id.trim()).context("Claim id must be a full UUID")?;
    let status: ClaimStatus = status.parse()?;

    if status == ClaimStatus::Paid && transaction_id.is_none() {
        print_warning("Marking as paid without a --transaction-id");
    }

    let claim = client
        .resolve_claim(
            id,
            &ResolveClaimRequest {
                status,
                transaction_id,
                notes,
            },
        )
        .await?;

    print_success(&format!(
        "Claim {} is now {}",
        short_id(&claim.id),
        style_status(claim.status)
    ));
    println!();
    println!("Contributor:      {}", claim.contributor_id);
    println!("Milestone:        {} points", claim.points);
    println!("Amount:           {}", claim.amount);
    if let Some(tx) = &claim.transaction_id {
        println!("Transaction:      {}", style_cyan(tx));
    }
    if let Some(notes) = &claim.notes {
        println!("Notes:            {}", notes);
    }

    Ok(())
}
