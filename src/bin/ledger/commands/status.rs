//! Status command - points, earnings and milestone progress

use crate::client::LedgerClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(client: &LedgerClient) -> Result<()> {
    print_header("Contributor Status");

    let summary = client.points_summary().await?;

    println!();
    println!("Contributor:      {}", style_cyan(&summary.contributor_id));
    println!("Role:             {}", summary.role);
    println!("Points:           {}", style_bold(&summary.points.to_string()));
    println!(
        "Total Earnings:   {}",
        style_green(&summary.total_earnings.to_string())
    );

    println!();
    println!("{}", style_bold("Milestones:"));
    for m in &summary.milestones {
        let state = if m.claimed {
            style_dim("claimed")
        } else if m.eligible {
            style_green("available")
        } else if summary.points < m.points {
            style_dim(&format!("{} more points", m.points - summary.points))
        } else {
            style_yellow("blocked")
        };
        println!("  {:>3} points -> {:>4}   {}", m.points, m.amount, state);
    }

    if let Some(claim) = &summary.pending_claim {
        println!();
        print_warning(&format!(
            "Claim {} for {} points is pending review",
            short_id(&claim.id),
            claim.points
        ));
        println!("  New claims can be made once it is processed.");
    } else if summary.milestones.iter().any(|m| m.eligible) {
        println!();
        print_info("You can redeem a milestone. Run: ledger claim");
    }

    Ok(())
}

pub async fn history(client: &LedgerClient) -> Result<()> {
    print_header("Points History");

    let events = client.points_history().await?;
    if events.is_empty() {
        print_info("No points recorded yet.");
        return Ok(());
    }

    println!();
    println!("{:<20}  {:>6}  {:<16}  Reference", "When", "Change", "Reason");
    println!("{}", "─".repeat(70));

    let mut balance = 0;
    for event in &events {
        balance += event.delta;
        let delta = if event.delta > 0 {
            style_green(&format!("{:>+6}", event.delta))
        } else {
            style_red(&format!("{:>+6}", event.delta))
        };
        println!(
            "{:<20}  {}  {:<16}  {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            delta,
            event.reason.as_str(),
            style_dim(event.reference.as_deref().unwrap_or("-"))
        );
    }

    println!();
    println!("Balance: {}", style_bold(&balance.to_string()));
    Ok(())
}
