use std::process::ExitCode;
use std::sync::Arc;

use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use relaybot::commands::{BotState, Command, HandlerError, Request};
use relaybot::config::Config;
use relaybot::i18n::Text;
use relaybot::relay::{
    AudioMessage, Ledger, LedgerError, RetryingInvoker, RuntimeState, TelegramTransport, Transport,
    TransportExhausted,
};
use relaybot::supervisor::{self, Exit};
use relaybot::telegram_log::AlertLayer;

type State = BotState<TelegramTransport>;

/// A run of the bot could not get off the ground.
#[derive(Debug, Error)]
enum StartupError {
    #[error("ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),
    #[error("telegram unreachable: {0}")]
    Transport(#[from] TransportExhausted),
}

fn init_logging(config: &Config) -> std::io::Result<WorkerGuard> {
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("relaybot.log"))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter()),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let alerts = AlertLayer::new(Bot::new(&config.telegram_bot_token), log_chat_id);
        registry.with(alerts).init();
    } else {
        registry.init();
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "relaybot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("🚀 Starting relaybot...");
    info!("Loaded config from {config_path}");
    info!(
        "Relaying audio from {} to {}",
        config.source_chat_id, config.destination_chat_id
    );

    match supervisor::supervise(config.max_restarts, |_| run(config.clone())).await {
        Exit::Clean => ExitCode::SUCCESS,
        Exit::GaveUp { .. } => ExitCode::FAILURE,
    }
}

/// One lifetime of the bot: returns `Ok` on Ctrl-C, `Err` if startup fails.
async fn run(config: Arc<Config>) -> Result<(), StartupError> {
    let bot = Bot::new(&config.telegram_bot_token);
    let runtime = Arc::new(RuntimeState::new(config.default_language));
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let invoker = Arc::new(RetryingInvoker::new(config.retry_policy, runtime.clone()));
    let ledger = Arc::new(Ledger::open(&config.database_path, config.database_timeout)?);

    let me = {
        let transport = &transport;
        invoker.invoke("get_me", move || transport.get_me()).await?
    };
    info!("Bot user ID: {}, username: @{}", me.id, me.username);

    let state = Arc::new(BotState::new(
        transport,
        invoker,
        ledger,
        runtime,
        config.route(),
        config.activity_timeout,
    ));

    let health = state.health();
    let watchdog = health
        .clone()
        .spawn_watchdog(config.watchdog_first_tick, config.watchdog_interval);
    let startup_sync = health.spawn_startup_sync(config.startup_sync_delay);

    if let Some(owner) = config.owner_id
        && let Err(e) = state.reply(owner.0, Text::BotRunning).await
    {
        warn!("Failed to notify owner: {e}");
    }

    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::filter(|msg: Message| msg.audio().is_some()).endpoint(handle_audio));

    info!("✅ Bot is running...");
    let listener = Polling::builder(bot.clone()).drop_pending_updates().build();
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    watchdog.abort();
    startup_sync.abort();
    Ok(())
}

async fn handle_command(msg: Message, cmd: Command, state: Arc<State>) -> ResponseResult<()> {
    info!("Command {:?} in chat {}", cmd, msg.chat.id);

    if let Err(e) = state.on_command(&Request::from_telegram(&msg), cmd).await {
        report_failure(&state, &msg, e).await;
    }
    Ok(())
}

async fn handle_audio(msg: Message, state: Arc<State>) -> ResponseResult<()> {
    if let Err(e) = state.on_audio(&AudioMessage::from_telegram(&msg)).await {
        report_failure(&state, &msg, e).await;
    }
    Ok(())
}

/// Last-resort handler: log and tell the chat something went wrong.
async fn report_failure(state: &State, msg: &Message, e: HandlerError) {
    error!("Update {} in chat {} failed: {}", msg.id.0, msg.chat.id, e);
    if let Err(e) = state.reply(msg.chat.id.0, Text::GenericError).await {
        error!("Error in error handler: {}", e);
    }
}
