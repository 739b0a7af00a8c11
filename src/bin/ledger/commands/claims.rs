//! Claims command - list claims

use crate::client::LedgerClient;
use crate::style::*;
use anyhow::Result;
use contributor_ledger::claim::{Claim, ClaimStatus};

pub async fn run(client: &LedgerClient, all: bool, status: Option<&str>) -> Result<()> {
    let claims = if all {
        let status = status.map(str::parse::<ClaimStatus>).transpose()?;
        print_header("All Claims");
        client.all_claims(status).await?
    } else {
        if status.is_some() {
            print_warning("--status only applies with --all");
        }
        print_header("My Claims");
        client.my_claims().await?
    };

    if claims.is_empty() {
        print_info("No claims found.");
        return Ok(());
    }

    print_table(&claims, all);
    Ok(())
}

fn print_table(claims: &[Claim], show_contributor: bool) {
    println!();
    if show_contributor {
        println!(
            "{:<8}  {:<16}  {:>6}  {:>6}  {:<12}  {:<10}  Created",
            "Id", "Contributor", "Points", "Amount", "Method", "Status"
        );
    } else {
        println!(
            "{:<8}  {:>6}  {:>6}  {:<12}  {:<10}  Created",
            "Id", "Points", "Amount", "Method", "Status"
        );
    }
    println!("{}", "─".repeat(if show_contributor { 90 } else { 72 }));

    for claim in claims {
        // Pad before styling so escape codes don't break alignment
        let status = style_status(claim.status);
        let pad = " ".repeat(10usize.saturating_sub(claim.status.as_str().len()));
        let created = claim.created_at.format("%Y-%m-%d %H:%M");

        if show_contributor {
            println!(
                "{:<8}  {:<16}  {:>6}  {:>6}  {:<12}  {}{}  {}",
                short_id(&claim.id),
                claim.contributor_id,
                claim.points,
                claim.amount,
                claim.payment_method,
                status,
                pad,
                created
            );
        } else {
            println!(
                "{:<8}  {:>6}  {:>6}  {:<12}  {}{}  {}",
                short_id(&claim.id),
                claim.points,
                claim.amount,
                claim.payment_method,
                status,
                pad,
                created
            );
        }
    }

    println!();
    println!("Total claims: {}", claims.len());
}
