use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use chatsweep_channels::transport::Transport;

use crate::channels::telegram::start_telegram_bot;
use crate::channels::TelegramTransport;
use crate::cleanup::CleanupEngine;
use crate::config::Config;
use crate::db::Database;
use crate::lifecycle::ChatLifecycle;
use crate::scheduler::spawn_daily_cleanup;

pub struct AppState {
    pub config: Config,
    pub db: Arc<Database>,
    pub lifecycle: ChatLifecycle,
    pub engine: CleanupEngine,
    pub transport: Arc<dyn Transport>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<Database>, transport: Arc<dyn Transport>) -> Self {
        let lifecycle = ChatLifecycle::new(db.clone());
        let engine = CleanupEngine::new(db.clone(), lifecycle.clone(), transport.clone());
        AppState {
            config,
            db,
            lifecycle,
            engine,
            transport,
        }
    }
}

pub async fn run(config: Config, db: Database) -> anyhow::Result<()> {
    let db = Arc::new(db);
    let bot = Bot::new(&config.telegram_bot_token);
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));
    let state = Arc::new(AppState::new(config, db, transport));

    let active = state.lifecycle.snapshot().await?;
    info!("Tracking {} active chat(s)", active.len());

    spawn_daily_cleanup(state.engine.clone(), state.config.daily_cleanup_time())?;

    start_telegram_bot(state, bot).await
}
