//! Stats command - claim totals by status

use crate::client::LedgerClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(client: &LedgerClient) -> Result<()> {
    print_header("Claim Statistics");

    let stats = client.claim_stats().await?;

    println!();
    println!("{:<12}  {:>8}  {:>12}", "Status", "Claims", "Amount");
    println!("{}", "─".repeat(36));
    for row in &stats {
        let pad = " ".repeat(12usize.saturating_sub(row.status.as_str().len()));
        println!(
            "{}{}  {:>8}  {:>12}",
            style_status(row.status),
            pad,
            row.count,
            row.total_amount
        );
    }

    let total: i64 = stats.iter().map(|s| s.count).sum();
    println!();
    println!("Total claims: {}", style_bold(&total.to_string()));
    Ok(())
}
