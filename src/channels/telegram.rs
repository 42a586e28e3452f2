use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::{MessageId, UserId};
use teloxide::update_listeners::webhooks;
use teloxide::{ApiError, RequestError};
use tracing::{error, info, warn};

use chatsweep_channels::transport::{
    FailureClass, SendOptions, SentMessage, Transport, TransportError,
};
use chatsweep_storage::db::call_blocking;
use chatsweep_storage::ledger::TrackedMessage;

use crate::chat_commands::{self, ChatCommand};
use crate::lifecycle::{migration_pair, LifecycleEvent};
use crate::runtime::AppState;
use crate::scheduler::schedule_chat_cleanup;

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        TelegramTransport { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> Result<SentMessage, TransportError> {
        let sent = self
            .bot
            .send_message(ChatId(chat_id), text)
            .disable_notification(options.disable_notification)
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(SentMessage {
            chat_id: sent.chat.id.0,
            message_id: i64::from(sent.id.0),
            timestamp: sent.date,
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool, TransportError> {
        let id = i32::try_from(message_id).map_err(|_| {
            TransportError::BadRequest(format!("message id {message_id} out of range"))
        })?;
        self.bot
            .delete_message(ChatId(chat_id), MessageId(id))
            .await
            .map(|_| true)
            .map_err(|e| classify_request_error(&e))
    }
}

/// Maps a Bot API failure onto the transport error taxonomy.
pub fn classify_request_error(err: &RequestError) -> TransportError {
    match err {
        RequestError::Api(api) => classify_api_error(api),
        RequestError::MigrateToChatId(new_chat_id) => TransportError::ChatMigrated {
            new_chat_id: new_chat_id.0,
        },
        RequestError::RetryAfter(secs) => TransportError::RetryAfter(u64::from(secs.seconds())),
        RequestError::Network(e) if e.is_timeout() => TransportError::TimedOut,
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        RequestError::Io(e) => TransportError::Network(e.to_string()),
        _ => TransportError::Other(err.to_string()),
    }
}

fn classify_api_error(api: &ApiError) -> TransportError {
    match api {
        ApiError::BotBlocked
        | ApiError::BotKicked
        | ApiError::BotKickedFromSupergroup
        | ApiError::BotKickedFromChannel
        | ApiError::UserDeactivated
        | ApiError::CantInitiateConversation
        | ApiError::CantTalkWithBots
        | ApiError::InvalidToken => TransportError::Forbidden(api.to_string()),
        ApiError::Unknown(msg) if is_forbidden_description(msg) => {
            TransportError::Forbidden(msg.clone())
        }
        _ => TransportError::BadRequest(api.to_string()),
    }
}

fn is_forbidden_description(msg: &str) -> bool {
    msg.starts_with("Forbidden") || msg.starts_with("Unauthorized")
}

/// Identity of the running bot, resolved once at startup.
#[derive(Clone)]
pub struct TelegramRuntimeContext {
    pub bot_user_id: UserId,
    pub bot_username: String,
}

pub async fn start_telegram_bot(state: Arc<AppState>, bot: Bot) -> anyhow::Result<()> {
    let me = bot.get_me().await?;
    let ctx = TelegramRuntimeContext {
        bot_user_id: me.user.id,
        bot_username: me.username().to_string(),
    };
    let username = ctx.bot_username.clone();
    let webhook = state.config.webhook.clone();
    let token = state.config.telegram_bot_token.clone();

    let handler = Update::filter_message().endpoint(handle_message);

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .default_handler(|_| async {})
        .dependencies(dptree::deps![state, ctx])
        .enable_ctrlc_handler()
        .build();

    match webhook {
        Some(webhook) => {
            let address = webhook.socket_addr()?;
            let url = webhook.url(&token).parse()?;
            let listener = webhooks::axum(bot, webhooks::Options::new(address, url)).await?;
            info!("Telegram bot @{username} started (webhook on {address})");
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("Webhook update listener error"),
                )
                .await;
        }
        None => {
            info!("Telegram bot @{username} started (polling)");
            dispatcher.dispatch().await;
        }
    }

    Ok(())
}

fn is_group_chat(msg: &Message) -> bool {
    msg.chat.is_group() || msg.chat.is_supergroup()
}

/// Lifecycle transition carried by a group message, if any. The bot is
/// recognised by user id only.
pub fn classify_update(msg: &Message, bot_id: UserId) -> Option<LifecycleEvent> {
    if !is_group_chat(msg) {
        return None;
    }
    let chat_id = msg.chat.id.0;
    if let Some((from, to)) = migration_pair(
        chat_id,
        msg.migrate_to_chat_id().map(|c| c.0),
        msg.migrate_from_chat_id().map(|c| c.0),
    ) {
        return Some(LifecycleEvent::Migrated { from, to });
    }
    if msg.left_chat_member().is_some_and(|user| user.id == bot_id) {
        return Some(LifecycleEvent::Left(chat_id));
    }
    let created = msg.group_chat_created().is_some() || msg.super_group_chat_created().is_some();
    let added = msg
        .new_chat_members()
        .is_some_and(|members| members.iter().any(|u| u.id == bot_id));
    if created || added {
        return Some(LifecycleEvent::Joined(chat_id));
    }
    None
}

/// Group messages go to the ledger, except the service messages that end
/// the bot's presence under this chat id.
pub fn should_retain(msg: &Message, bot_id: UserId) -> bool {
    is_group_chat(msg)
        && !matches!(
            classify_update(msg, bot_id),
            Some(LifecycleEvent::Migrated { .. } | LifecycleEvent::Left(_))
        )
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    tg_ctx: TelegramRuntimeContext,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let chat_id = msg.chat.id.0;
    let is_group = is_group_chat(&msg);

    match classify_update(&msg, tg_ctx.bot_user_id) {
        Some(event @ LifecycleEvent::Migrated { .. }) => {
            state.lifecycle.apply(event, msg.date).await?;
            return Ok(());
        }
        Some(event @ LifecycleEvent::Left(_)) => {
            info!("Bot removed from chat {chat_id}");
            state.lifecycle.apply(event, msg.date).await?;
            return Ok(());
        }
        Some(event @ LifecycleEvent::Joined(_)) => {
            info!(
                "Bot joined chat {chat_id} ({})",
                msg.chat.title().unwrap_or("untitled")
            );
            state.lifecycle.apply(event, msg.date).await?;
            reply(&state, chat_id, chat_commands::GREETING, true).await?;
        }
        None => {}
    }

    // Retained before the command runs, so an abandonment triggered by the
    // command also clears it.
    if should_retain(&msg, tg_ctx.bot_user_id) {
        retain_message(&state, &msg).await?;
    }

    if let Some(command) = msg
        .text()
        .and_then(|text| chat_commands::parse_command(text, &tg_ctx.bot_username))
    {
        handle_command(&bot, &msg, &state, command, is_group).await?;
    }
    Ok(())
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    command: ChatCommand,
    is_group: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let chat_id = msg.chat.id.0;
    match command {
        ChatCommand::Start => {
            reply(state, chat_id, chat_commands::START_TEXT, is_group).await?;
        }
        ChatCommand::Help => {
            reply(state, chat_id, chat_commands::HELP_TEXT, is_group).await?;
        }
        ChatCommand::Version => {
            reply(state, chat_id, &chat_commands::version_text(), is_group).await?;
        }
        ChatCommand::Restrictions => {
            reply(state, chat_id, chat_commands::RESTRICTIONS_TEXT, is_group).await?;
        }
        ChatCommand::Cleanup => {
            if !is_group {
                reply(state, chat_id, chat_commands::GROUP_ONLY_TEXT, false).await?;
                return Ok(());
            }
            if state.config.cleanup_requires_admin {
                match sender_is_admin(bot, state, msg).await? {
                    Some(true) => {}
                    Some(false) => {
                        reply(state, chat_id, chat_commands::ADMIN_ONLY_TEXT, true).await?;
                        return Ok(());
                    }
                    None => return Ok(()),
                }
            }
            info!("Cleanup requested for chat {chat_id}");
            schedule_chat_cleanup(state.engine.clone(), chat_id, state.config.cleanup_delay());
        }
        ChatCommand::SetupJoinConfig(name) => {
            if !is_group {
                reply(state, chat_id, chat_commands::GROUP_ONLY_TEXT, false).await?;
                return Ok(());
            }
            let Some(name) = name else {
                reply(state, chat_id, chat_commands::NOT_ENOUGH_ARGUMENTS_TEXT, true).await?;
                return Ok(());
            };
            let name_for_db = name.clone();
            let update = call_blocking(state.db.clone(), move |db| {
                db.set_join_name(chat_id, &name_for_db)
            })
            .await?;
            let text = chat_commands::join_config_response(&name, update);
            reply(state, chat_id, &text, true).await?;
        }
        ChatCommand::Join(name) => {
            let Some(name) = name else {
                reply(state, chat_id, chat_commands::NOT_ENOUGH_ARGUMENTS_TEXT, is_group).await?;
                return Ok(());
            };
            let target =
                call_blocking(state.db.clone(), move |db| db.chat_for_join_name(&name)).await?;
            let Some(target) = target else {
                reply(state, chat_id, chat_commands::UNKNOWN_JOIN_NAME_TEXT, is_group).await?;
                return Ok(());
            };
            let expire = Utc::now()
                + chrono::Duration::from_std(state.config.join_link_ttl())
                    .unwrap_or_else(|_| chrono::Duration::seconds(60));
            let text = match bot
                .create_chat_invite_link(ChatId(target))
                .expire_date(expire)
                .await
            {
                Ok(link) => chat_commands::invite_link_response(&link.invite_link),
                Err(e) => {
                    let classified = classify_request_error(&e);
                    error!("Failed to create invite link for chat {target}: {classified}");
                    handle_chat_failure(state, target, &classified).await?;
                    chat_commands::JOIN_LINK_FAILED_TEXT.to_string()
                }
            };
            reply(state, chat_id, &text, is_group).await?;
        }
    }
    Ok(())
}

/// `None` when the lookup showed the bot can no longer act in this chat
/// under its current id; the failure has already been applied.
async fn sender_is_admin(
    bot: &Bot,
    state: &AppState,
    msg: &Message,
) -> Result<Option<bool>, Box<dyn std::error::Error + Send + Sync>> {
    // Anonymous admins post on behalf of the group itself.
    if msg
        .sender_chat
        .as_ref()
        .is_some_and(|sender| sender.id == msg.chat.id)
    {
        return Ok(Some(true));
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(Some(false));
    };
    match bot.get_chat_member(msg.chat.id, user.id).await {
        Ok(member) => Ok(Some(member.is_privileged())),
        Err(e) => {
            let err = classify_request_error(&e);
            warn!(
                "Failed to look up chat member {} in {}: {err}",
                user.id, msg.chat.id
            );
            match handle_chat_failure(state, msg.chat.id.0, &err).await? {
                FailureClass::Transient => Ok(Some(false)),
                FailureClass::AccessLost | FailureClass::Migrated(_) => Ok(None),
            }
        }
    }
}

/// Applies a failed call against `chat_id`: lost access abandons the chat,
/// a migration notice re-keys it, anything else is left alone.
async fn handle_chat_failure(
    state: &AppState,
    chat_id: i64,
    err: &TransportError,
) -> Result<FailureClass, Box<dyn std::error::Error + Send + Sync>> {
    let class = err.classify();
    match class {
        FailureClass::AccessLost => {
            warn!("Lost access to chat {chat_id}: {err}");
            state.lifecycle.abandon(chat_id).await?;
        }
        FailureClass::Migrated(to) => {
            state.lifecycle.migrate(chat_id, to).await?;
        }
        FailureClass::Transient => {}
    }
    Ok(class)
}

/// Sends a reply and, for group chats, records it for later cleanup.
async fn reply(
    state: &AppState,
    chat_id: i64,
    text: &str,
    track: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match state
        .transport
        .send_text(chat_id, text, SendOptions::default())
        .await
    {
        Ok(sent) => {
            if track {
                state
                    .engine
                    .retain(TrackedMessage::new(sent.chat_id, sent.message_id, sent.timestamp))
                    .await?;
            }
        }
        Err(e) => {
            if handle_chat_failure(state, chat_id, &e).await? == FailureClass::Transient {
                warn!("Reply to chat {chat_id} failed: {e}");
            }
        }
    }
    Ok(())
}

async fn retain_message(
    state: &AppState,
    msg: &Message,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    state
        .engine
        .retain(TrackedMessage::new(
            msg.chat.id.0,
            i64::from(msg.id.0),
            msg.date,
        ))
        .await?;
    Ok(())
}
