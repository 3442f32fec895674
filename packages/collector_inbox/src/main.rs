use anyhow::Result;
use clap::{Parser, Subcommand};
use collector_inbox::CollectorConfig;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod cli;

#[derive(Parser)]
#[command(name = "collector-inbox")]
#[command(about = "Live conversation inbox and notification feed for Collector.shop")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.collector)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stay connected and report unread counts (default)
    Watch,

    /// List conversations
    Conversations(ListArgs),

    /// List notifications
    Notifications(NotificationsArgs),

    /// Store session credentials in config.toml
    Login(LoginArgs),
}

#[derive(Parser)]
struct LoginArgs {
    /// Bearer token issued by the auth service
    #[arg(long)]
    token: String,

    /// Id of the signed-in user
    #[arg(long)]
    user_id: String,
}

#[derive(Parser)]
struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct NotificationsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Mark every notification read before listing
    #[arg(long)]
    mark_all_read: bool,

    /// Show one page (1-based), `[feed] page_size` items per page
    #[arg(long)]
    page: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "collector_inbox=debug,info"
    } else {
        "collector_inbox=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = CollectorConfig::new(cli.data_dir)?;

    match cli.command {
        None | Some(Commands::Watch) => cli::watch_command(&config).await,
        Some(Commands::Conversations(args)) => cli::conversations_command(&config, args.json).await,
        Some(Commands::Notifications(args)) => {
            cli::notifications_command(&config, args.json, args.mark_all_read, args.page).await
        }
        Some(Commands::Login(args)) => config.save_session(&args.token, &args.user_id),
    }
}
