//! Config command - show the milestone table and server configuration

use crate::client::LedgerClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(client: &LedgerClient) -> Result<()> {
    print_header("Ledger Configuration");

    let health = client.health().await?;
    let config = client.config().await?;

    println!();
    println!("Version:          {}", style_cyan(&config.version));
    println!("Store:            {}", health.backend);
    println!("Uptime:           {}s", health.uptime_secs);
    println!(
        "Processors:       {}",
        config
            .processor_roles
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    println!();
    println!("{}", style_bold("Milestones:"));
    for m in &config.milestones {
        println!("  {:>3} points -> {}", m.points, style_green(&m.amount.to_string()));
    }

    println!();
    println!("{}", style_bold("Earning content:"));
    println!("  {}", config.earning_content.join(", "));
    println!("  +1 point per entry published, -1 when you delete your own entry");

    Ok(())
}
