use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use gptbot::bot::telegram::event_from_callback;
use gptbot::bot::{Command, Context, Event, SessionStore, TelegramClient, dispatch};
use gptbot::config::Config;
use gptbot::openai::Client as OpenAiClient;

struct BotState {
    ctx: Context<OpenAiClient>,
    sessions: SessionStore,
    telegram: TelegramClient,
    bot_username: Option<String>,
}

impl BotState {
    /// Run one event for `user` and send the result, all under the user's
    /// session lock so that their replies go out in order.
    async fn handle(&self, user: UserId, chat_id: ChatId, event: Event, callback: Option<teloxide::types::CallbackQueryId>) {
        let slot = self.sessions.slot(user);
        let mut session = slot.lock().await;
        let reply = dispatch(&self.ctx, user, &mut session, event).await;
        self.telegram.deliver(chat_id, reply, callback).await;
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    std::fs::create_dir_all(&config.log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&config.log_dir, "gptbot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting gptbot...");
    match config_path {
        Some(ref path) => info!("Loaded config from {}", path.display()),
        None => info!("Loaded config from defaults and environment"),
    }
    if config.openai.proxy.is_some() {
        info!("Routing AI requests through the configured proxy");
    }

    let assistant = match OpenAiClient::new(config.openai.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build AI client: {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            Some(me.username().to_string())
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}");
            None
        }
    };

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register commands: {e}");
    }

    let state = Arc::new(BotState {
        ctx: Context::new(assistant, &config),
        sessions: SessionStore::new(),
        telegram: TelegramClient::new(bot.clone(), config.catalog.clone()),
        bot_username,
    });

    spawn_cleanup(state.clone(), config.session_ttl);

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/// Drop rate-limit history and sessions of users who have gone quiet.
fn spawn_cleanup(state: Arc<BotState>, session_ttl: Duration) {
    let period = state.ctx.limiter.window();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = state.ctx.limiter.purge_idle();
            if purged > 0 {
                info!("Purged rate-limit history for {purged} idle user(s)");
            }
            let dropped = state.sessions.purge_idle(session_ttl);
            if dropped > 0 {
                info!("Dropped {dropped} idle session(s), {} left", state.sessions.len());
            }
        }
    });
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    // Private chats only
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(ref user) = msg.from else {
        return Ok(());
    };

    let username = user.username.as_deref().unwrap_or(&user.first_name);
    let event = state.telegram.event_from_message(&msg, state.bot_username.as_deref());
    info!("📨 {event:?} from {username} ({})", user.id);

    state.handle(user.id, msg.chat.id, event, None).await;
    Ok(())
}

async fn handle_callback(q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let user = &q.from;
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(user.id.0 as i64));

    let event = event_from_callback(q.data.as_deref());
    info!("🔘 {event:?} from {} ({})", user.username.as_deref().unwrap_or(&user.first_name), user.id);

    state.handle(user.id, chat_id, event, Some(q.id.clone())).await;
    Ok(())
}
