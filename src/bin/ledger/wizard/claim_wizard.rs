//! Claim Wizard - Interactive milestone redemption
//!
//! Shows the contributor's balance, lets them pick an eligible milestone and
//! collects payment details before submitting the claim.

use anyhow::Result;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::time::Duration;

use contributor_ledger::claim::ClaimRequest;
use contributor_ledger::contributor::MilestoneProgress;

use crate::client::LedgerClient;

/// Payment methods offered by the wizard as (wire name, label)
const PAYMENT_METHODS: [(&str, &str); 3] = [
    ("upi", "UPI"),
    ("bank_transfer", "Bank transfer"),
    ("paypal", "PayPal"),
];

pub async fn run_claim_wizard(client: &LedgerClient) -> Result<()> {
    crate::print_banner();
    println!("{}", style("  Interactive Claim Wizard").cyan().bold());
    println!("  {}", style("Redeem your points for a payout").dim());
    println!();

    // Step 1: Load balance
    let pb = spinner("Loading your balance...");
    let summary = client.points_summary().await;
    pb.finish_and_clear();
    let summary = summary?;

    println!(
        "  {} Points: {}   Earnings: {}",
        style("✓").green(),
        style(summary.points).cyan().bold(),
        style(summary.total_earnings).green()
    );

    if let Some(claim) = &summary.pending_claim {
        println!();
        println!(
            "  {} A claim for {} points is already pending ({})",
            style("✗").red(),
            claim.points,
            claim.id
        );
        println!("  {}", style("Wait for it to be processed before claiming again.").dim());
        return Ok(());
    }

    let eligible: Vec<&MilestoneProgress> =
        summary.milestones.iter().filter(|m| m.eligible).collect();
    if eligible.is_empty() {
        println!();
        println!("  {} No milestone is available yet", style("✗").yellow());
        if let Some(next) = summary
            .milestones
            .iter()
            .find(|m| !m.claimed && m.points > summary.points)
        {
            println!(
                "  {}",
                style(format!(
                    "{} more points to unlock {} points -> {}",
                    next.points - summary.points,
                    next.points,
                    next.amount
                ))
                .dim()
            );
        }
        return Ok(());
    }

    // Step 2: Pick milestone
    println!();
    println!("  {}", style("Step 1: Choose a Milestone").bold());
    println!();

    let labels: Vec<String> = eligible
        .iter()
        .map(|m| format!("{} points -> payout {}", m.points, m.amount))
        .collect();
    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("  Milestone")
        .items(&labels)
        .default(0)
        .interact()?;
    let milestone = eligible[choice];

    // Step 3: Payment details
    println!();
    println!("  {}", style("Step 2: Payment Details").bold());
    println!();

    let method_labels: Vec<&str> = PAYMENT_METHODS.iter().map(|(_, label)| *label).collect();
    let method_idx = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("  Payment method")
        .items(&method_labels)
        .default(0)
        .interact()?;
    let (method, method_label) = PAYMENT_METHODS[method_idx];
    let details = collect_payment_details(method)?;

    // Step 4: Review and confirm
    println!();
    println!("  {}", style("Review Claim").bold());
    println!("  {}", style("─".repeat(40)).dim());
    println!();
    println!("  Milestone:  {} points", milestone.points);
    println!("  Payout:     {}", style(milestone.amount).green());
    println!("  Method:     {}", method_label);
    println!(
        "  Balance:    {} -> {}",
        summary.points,
        summary.points - milestone.points
    );
    println!();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("  Submit this claim?")
        .default(true)
        .interact()?;

    if !confirmed {
        println!();
        println!("  {} Claim cancelled", style("✗").red());
        return Ok(());
    }

    // Step 5: Submit
    println!();
    let pb = spinner("Submitting claim...");
    let result = client
        .request_claim(&ClaimRequest {
            points: milestone.points,
            payment_method: method.to_string(),
            payment_details: details,
        })
        .await;
    pb.finish_and_clear();

    match result {
        Ok(claim) => {
            println!("  {}", style("═".repeat(50)).dim());
            println!();
            println!("  {} Claim submitted!", style("✓").green().bold());
            println!();
            println!("  Claim id:   {}", style(claim.id).cyan());
            println!("  Status:     {}", style(claim.status).yellow());
            println!();
            println!("  Check progress:");
            println!("    {}", style("ledger claims").yellow());
            println!();
        }
        Err(e) => {
            println!("  {} Claim failed: {}", style("✗").red(), e);
        }
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn required(prompt: &str) -> Result<String> {
    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("  {}", prompt))
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                return Err("This field is required");
            }
            Ok(())
        })
        .interact_text()?;
    Ok(value.trim().to_string())
}

fn collect_payment_details(method: &str) -> Result<Value> {
    Ok(match method {
        "upi" => json!({ "upi_id": required("UPI id")? }),
        "bank_transfer" => json!({
            "account_holder": required("Account holder")?,
            "account_number": required("Account number")?,
            "ifsc": required("IFSC code")?,
        }),
        _ => {
            let email: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("  PayPal email")
                .validate_with(|input: &String| -> Result<(), &str> {
                    if !input.contains('@') {
                        return Err("Enter a valid email address");
                    }
                    Ok(())
                })
                .interact_text()?;
            json!({ "email": email.trim() })
        }
    })
}
