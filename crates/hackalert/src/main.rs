mod health;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use hackalert_core::config::gate_policy_from_lookup;
use hackalert_core::formatter::entry_embed;
use hackalert_core::{
    format_row, AccessGate, GatePolicy, MessageStyle, PollLoop, RelayConfig, SheetWatcher,
    SheetsConfig,
};
use hackalert_discord::DiscordClient;
use hackalert_sheets::GoogleSheetsClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Announces new hackathon sheet entries on Discord", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the sheet and post new entries until interrupted
    Run,
    /// Print the announcements for every entry currently in the sheet without sending
    Preview(PreviewArgs),
}

#[derive(Args, Debug, Default)]
struct PreviewArgs {
    /// Print embeds as JSON instead of the text announcement
    #[arg(long)]
    embed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run => run().await,
        Command::Preview(args) => preview(args).await,
    }
}

async fn run() -> Result<()> {
    let config = RelayConfig::from_env().context("invalid configuration")?;
    info!(
        interval_ms = config.poll_interval.as_millis() as u64,
        style = ?config.message_style,
        "starting hackalert relay"
    );

    let listener = health::bind(config.port).await?;
    let health_task = tokio::spawn(health::serve(listener));

    let discord =
        DiscordClient::new(config.discord.token.clone()).context("failed to build Discord client")?;
    discord.login().await.context("failed to log in to Discord")?;
    let channel = discord
        .channel(&config.discord.channel_id)
        .await
        .context("could not resolve the announcement channel")?;

    let watcher = connect_sheet(&config.sheets, config.gate).await?;

    let poll = Arc::new(PollLoop::new(
        watcher,
        Arc::new(channel),
        config.message_style,
        config.poll_interval,
    ));
    poll.run(shutdown_signal()).await;

    health_task.abort();
    info!("hackalert relay stopped");
    Ok(())
}

async fn preview(args: PreviewArgs) -> Result<()> {
    let lookup = |key: &str| std::env::var(key).ok();
    let sheets = SheetsConfig::from_lookup(lookup).context("invalid Google Sheets configuration")?;
    let policy = gate_policy_from_lookup(lookup).context("invalid rate limit configuration")?;

    let mut watcher = connect_sheet(&sheets, policy).await?;
    let outcome = watcher
        .scan_new_rows()
        .await
        .context("failed to read sheet rows")?;

    let style = if args.embed {
        MessageStyle::Embed
    } else {
        MessageStyle::Text
    };
    let now = Utc::now();
    for row in &outcome.accepted {
        match style {
            MessageStyle::Text => println!("--- row {}\n{}\n", row.row_index, format_row(row)),
            MessageStyle::Embed => {
                println!("{}", serde_json::to_string_pretty(&entry_embed(row, now))?)
            }
        }
    }

    info!(
        accepted = outcome.accepted.len(),
        skipped = outcome.skipped.len(),
        "preview complete"
    );
    Ok(())
}

async fn connect_sheet(config: &SheetsConfig, policy: GatePolicy) -> Result<SheetWatcher> {
    let client =
        GoogleSheetsClient::new(config.clone()).context("failed to build Google Sheets client")?;
    SheetWatcher::initialize(Arc::new(client), AccessGate::new(policy))
        .await
        .context("failed to initialize Google Sheets")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
