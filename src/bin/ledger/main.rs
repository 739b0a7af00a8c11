//! Contributor Ledger CLI
//!
//! Command-line client for the Contributor Ledger.

mod client;
mod commands;
mod style;
mod wizard;

use clap::{Parser, Subcommand};
use contributor_ledger::contributor::Role;
use style::*;

use crate::client::{Identity, LedgerClient};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "ledger")]
#[command(version)]
#[command(about = "Contributor Ledger - Redeem content points for payouts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Ledger server URL
    #[arg(
        short,
        long,
        env = "LEDGER_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    url: String,

    /// Your user id, as the gateway would pass it
    #[arg(short, long, env = "LEDGER_ACTOR", global = true)]
    actor: Option<String>,

    /// Your role (super_admin, admin, contributor, user)
    #[arg(short, long, env = "LEDGER_ROLE", default_value = "contributor", global = true)]
    role: Role,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive claim wizard - redeem a milestone (default)
    #[command(visible_aliases = ["w", "wizard"])]
    Claim,

    /// Run the ledger server
    #[command(visible_alias = "s")]
    Server {
        /// Host to bind
        #[arg(long, env = "LEDGER_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "LEDGER_PORT")]
        port: Option<u16>,
    },

    /// Show your points, earnings and milestones
    #[command(visible_alias = "st")]
    Status,

    /// Show your points history
    History,

    /// List claims (your own, or all with --all)
    #[command(visible_alias = "ls")]
    Claims {
        /// List every contributor's claims (admins)
        #[arg(long)]
        all: bool,

        /// Only claims in this status (with --all)
        #[arg(long)]
        status: Option<String>,
    },

    /// Move a claim to processing, paid or rejected (admins)
    Resolve {
        /// Claim id
        id: String,

        /// New status
        status: String,

        /// Payment reference for paid claims
        #[arg(long)]
        transaction_id: Option<String>,

        /// Note for the contributor
        #[arg(long)]
        notes: Option<String>,
    },

    /// Claim counts and totals by status (admins)
    Stats,

    /// Show the milestone table and server configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let identity = cli.actor.clone().map(|id| Identity {
        id,
        role: cli.role,
    });
    let client = LedgerClient::new(&cli.url, identity);

    // Default to wizard if no command specified
    let command = cli.command.unwrap_or(Commands::Claim);

    let result = match command {
        Commands::Claim => wizard::run_claim_wizard(&client).await,
        Commands::Server { host, port } => {
            print_banner();
            commands::server::run(host, port).await
        }
        Commands::Status => commands::status::run(&client).await,
        Commands::History => commands::status::history(&client).await,
        Commands::Claims { all, status } => {
            commands::claims::run(&client, all, status.as_deref()).await
        }
        Commands::Resolve {
            id,
            status,
            transaction_id,
            notes,
        } => commands::resolve::run(&client, &id, &status, transaction_id, notes).await,
        Commands::Stats => commands::stats::run(&client).await,
        Commands::Config => commands::config::run(&client).await,
    };

    if let Err(e) = result {
        print_error(&format!("{}", e));
        std::process::exit(1);
    }
}

pub fn print_banner() {
    println!();
    println!("  {}", style_cyan(&style_bold("CONTRIBUTOR LEDGER")));
    println!(
        "  {} {}",
        style_dim("Points, milestones and payouts"),
        style_dim(&format!("v{}", VERSION))
    );
    println!();
}
