//! PubPoll demo
//!
//! Runs a complete polling session over an in-memory network:
//! 1. The host announces a poll
//! 2. Attendees vote and everyone sees the live tally
//! 3. A late attendee restores the session from channel history
//! 4. The host closes the poll
//!
//! Usage:
//!   pubpoll-demo --question "Lunch?" --responses Pizza,Sushi --votes 0,1,1

use anyhow::{Context, Result};
use clap::Parser;
use pubpoll_demo::{load_config, run_session, DemoOptions};
use pubpoll_sync::SessionConfig;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "pubpoll-demo")]
#[command(about = "Run a PubPoll session over an in-memory network")]
struct Args {
    /// Poll question
    #[arg(short, long, default_value = "Ship it?")]
    question: String,

    /// Comma-separated response variants
    #[arg(short, long, value_delimiter = ',', default_value = "Yes,No")]
    responses: Vec<String>,

    /// Comma-separated response orders to vote for
    #[arg(long, value_delimiter = ',', default_value = "0,0,1")]
    votes: Vec<u32>,

    /// Number of attendees present before the poll
    #[arg(short, long, default_value = "2")]
    attendees: usize,

    /// Session config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Messages fetched per channel when restoring a session
    #[arg(long)]
    history_depth: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SessionConfig::default(),
    };
    if let Some(depth) = args.history_depth {
        config.history_depth = depth;
    }
    info!("Session channels: {:?}", config.channels());

    let options = DemoOptions {
        question: args.question,
        responses: args.responses,
        votes: args.votes,
        attendees: args.attendees,
    };
    let report = run_session(config, &options).await?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        println!("{json}");
        return Ok(());
    }

    println!("\n========================================");
    println!("  {}", report.poll.question());
    println!("========================================");
    for stat in &report.host_tally {
        println!("  {:>3}  {}", stat.votes_count(), stat.response());
    }
    println!("----------------------------------------");
    println!("  Present:         {}", report.attendees);
    println!(
        "  Late attendee:   {} ({})",
        if report.late_attendee_tally == report.host_tally {
            "in sync"
        } else {
            "out of sync"
        },
        if report.late_attendee_restored {
            "restored from history"
        } else {
            "live only"
        }
    );
    println!("========================================\n");
    Ok(())
}
