use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use chatsweep::config::Config;
use chatsweep::{db, logging, runtime};
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SERVICE_ENV_VAR: &str = "CHATSWEEP_SERVICE";
const LONG_ABOUT: &str = concat!(
    "\x1b[1mChatSweep v",
    env!("CARGO_PKG_VERSION"),
    "\x1b[22m\n",
    "Telegram group bot that deletes recent messages on request and on a daily schedule.\n",
    "\n",
    "\x1b[1mQuick Start:\x1b[22m\n",
    "  1) write chatsweep.config.yaml (telegram_bot_token, cleanup_time)\n",
    "  2) chatsweep check\n",
    "  3) chatsweep start",
);

#[derive(Debug, Parser)]
#[command(
    name = "chatsweep",
    version = VERSION,
    about = LONG_ABOUT
)]
struct Cli {
    #[command(subcommand)]
    command: Option<MainCommand>,
}

#[derive(Debug, Subcommand)]
enum MainCommand {
    /// Start the bot (long polling, or a webhook when configured)
    Start,
    /// Validate config and open the database, then exit
    Check,
    /// Show version
    Version,
}

fn print_version() {
    println!("chatsweep {VERSION}");
}

fn run_check() -> anyhow::Result<()> {
    let config = Config::load()?;
    let runtime_data_dir = config.runtime_data_dir();
    let database = db::Database::new(&runtime_data_dir)?;
    let active = database.active_chat_ids()?;
    let tracked = database.tracked_chat_ids()?;

    println!("Config OK");
    println!("Runtime data: {runtime_data_dir}");
    match config.daily_cleanup_time() {
        Some(at) => println!("Daily cleanup: {} UTC", at.format("%H:%M")),
        None => println!("Daily cleanup: disabled"),
    }
    match &config.webhook {
        Some(webhook) => println!("Updates: webhook on {}", webhook.socket_addr()?),
        None => println!("Updates: long polling"),
    }
    println!("Active chats: {}", active.len());
    println!("Chats with tracked messages: {}", tracked.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(MainCommand::Start) => {}
        Some(MainCommand::Check) => return run_check(),
        Some(MainCommand::Version) => {
            print_version();
            return Ok(());
        }
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
            return Ok(());
        }
    }

    let config = Config::load()?;
    let runtime_data_dir = config.runtime_data_dir();
    std::fs::create_dir_all(&runtime_data_dir)
        .with_context(|| format!("Failed to create runtime dir {runtime_data_dir}"))?;

    if std::env::var(SERVICE_ENV_VAR).is_ok() {
        logging::init_logging(&runtime_data_dir)?;
    } else {
        logging::init_console_logging();
    }
    info!("Starting ChatSweep bot...");

    let database = db::Database::new(&runtime_data_dir)?;
    info!("Database initialized at {runtime_data_dir}");

    runtime::run(config, database).await
}
