//! Operator commands and the update handlers behind the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use teloxide::types::Message;
use teloxide::utils::command::{BotCommands, ParseError};
use thiserror::Error;
use tracing::{info, warn};

use crate::i18n::{self, Text};
use crate::relay::{
    AudioMessage, ForwardEngine, ForwardResult, HealthMonitor, Ledger, RetryingInvoker, Route, RuntimeState,
    Transport, TransportExhausted,
};

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Bot status")]
    Status,
    #[command(description = "View forwarding stats")]
    Stats,
    #[command(description = "Pause forwarding")]
    Pause,
    #[command(description = "Resume forwarding")]
    Resume,
    #[command(description = "Change language: /language <code>", parse_with = raw_argument)]
    Language(String),
    #[command(description = "Forward the replied-to message")]
    Forward,
    #[command(description = "Check bot health")]
    Healthcheck,
}

/// Accepts an empty argument so `/language` alone lists the codes.
fn raw_argument(input: String) -> Result<(String,), ParseError> {
    Ok((input,))
}

/// A command handler could not finish.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("reply failed: {0}")]
    Reply(#[from] TransportExhausted),
}

/// The parts of an incoming command message the handlers look at.
#[derive(Debug, Clone)]
pub struct Request {
    pub chat_id: i64,
    pub user_id: Option<u64>,
    /// The message this one replies to, if any.
    pub reply_to: Option<AudioMessage>,
}

impl Request {
    pub fn from_telegram(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id.0,
            user_id: msg.from.as_ref().map(|u| u.id.0),
            reply_to: msg.reply_to_message().map(AudioMessage::from_telegram),
        }
    }
}

/// Everything an update handler needs, shared through the dispatcher.
pub struct BotState<T> {
    runtime: Arc<RuntimeState>,
    transport: Arc<T>,
    invoker: Arc<RetryingInvoker>,
    ledger: Arc<Ledger>,
    engine: ForwardEngine<T>,
    health: Arc<HealthMonitor<T>>,
}

impl<T: Transport> BotState<T> {
    pub fn new(
        transport: Arc<T>,
        invoker: Arc<RetryingInvoker>,
        ledger: Arc<Ledger>,
        runtime: Arc<RuntimeState>,
        route: Route,
        activity_timeout: Duration,
    ) -> Self {
        let engine = ForwardEngine::new(
            transport.clone(),
            invoker.clone(),
            ledger.clone(),
            runtime.clone(),
            route,
        );
        let health = Arc::new(HealthMonitor::new(
            transport.clone(),
            invoker.clone(),
            runtime.clone(),
            activity_timeout,
            route.source_chat,
        ));
        Self {
            runtime,
            transport,
            invoker,
            ledger,
            engine,
            health,
        }
    }

    pub fn health(&self) -> Arc<HealthMonitor<T>> {
        self.health.clone()
    }

    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    /// Send a localized text to `chat_id` through the retrying invoker.
    pub async fn reply(&self, chat_id: i64, text: Text) -> Result<(), HandlerError> {
        let body = text.render(self.runtime.language());
        let transport = &self.transport;
        let body = body.as_str();
        self.invoker
            .invoke("send_message", move || transport.send_message(chat_id, body))
            .await?;
        Ok(())
    }

    /// Owner or administrator of the chat the request came from.
    async fn is_admin(&self, req: &Request) -> bool {
        let Some(user_id) = req.user_id else {
            return false;
        };
        let transport = &self.transport;
        let chat_id = req.chat_id;
        match self
            .invoker
            .invoke("get_chat_member", move || transport.get_chat_member(chat_id, user_id))
            .await
        {
            Ok(status) => status.is_admin(),
            Err(e) => {
                warn!("Admin check failed for {}: {}", user_id, e);
                false
            }
        }
    }

    /// Admin of the source group, replying with the reason when not.
    async fn admin_in_source_group(&self, req: &Request) -> Result<bool, HandlerError> {
        if !self.is_admin(req).await {
            self.reply(req.chat_id, Text::AdminOnly).await?;
            return Ok(false);
        }
        if req.chat_id != self.engine.route().source_chat {
            self.reply(req.chat_id, Text::GroupOnly).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Run an operator command.
    ///
    /// Activity is refreshed after the command, so `/healthcheck` judges the
    /// idle time from before this update.
    pub async fn on_command(&self, req: &Request, cmd: Command) -> Result<(), HandlerError> {
        let result = self.run_command(req, cmd).await;
        self.runtime.touch();
        result
    }

    /// Automatic path for audio posted to a chat. Only forwards and failed
    /// forwards are announced.
    pub async fn on_audio(&self, audio: &AudioMessage) -> Result<Option<ForwardResult>, HandlerError> {
        self.runtime.touch();
        let Some(result) = self.engine.handle_inbound_audio(audio).await else {
            return Ok(None);
        };
        if result.worth_announcing() {
            self.reply(audio.chat_id, Text::for_forward(result)).await?;
        }
        Ok(Some(result))
    }

    async fn run_command(&self, req: &Request, cmd: Command) -> Result<(), HandlerError> {
        let chat = req.chat_id;
        let runtime = &self.runtime;

        match cmd {
            Command::Start => self.reply(chat, Text::Welcome).await,
            Command::Help => self.reply(chat, Text::Help).await,
            Command::Status => {
                let text = Text::Status {
                    paused: runtime.is_paused(),
                    uptime: runtime.uptime(),
                    count: self.ledger.count(),
                };
                self.reply(chat, text).await
            }
            Command::Stats => {
                let text = Text::Stats {
                    count: self.ledger.count(),
                    last: self.ledger.last_forwarded_at(),
                };
                self.reply(chat, text).await
            }
            Command::Pause => {
                if !self.admin_in_source_group(req).await? {
                    return Ok(());
                }
                runtime.set_paused(true);
                info!("⏸ Forwarding paused by {:?}", req.user_id);
                self.reply(chat, Text::Paused).await
            }
            Command::Resume => {
                if !self.admin_in_source_group(req).await? {
                    return Ok(());
                }
                runtime.set_paused(false);
                info!("▶️ Forwarding resumed by {:?}", req.user_id);
                self.reply(chat, Text::Resumed).await
            }
            Command::Language(code) => {
                if !self.is_admin(req).await {
                    return self.reply(chat, Text::AdminOnly).await;
                }
                match i18n::Language::from_code(&code) {
                    Some(lang) => {
                        runtime.set_language(lang);
                        info!("🌐 Language set to {}", lang);
                        self.reply(chat, Text::LanguageSet).await
                    }
                    None => self.reply(chat, Text::Languages).await,
                }
            }
            Command::Forward => {
                let Some(target) = req.reply_to.as_ref() else {
                    return self.reply(chat, Text::ReplyRequired).await;
                };
                let result = self.engine.forward_audio(target).await;
                self.reply(chat, Text::for_forward(result)).await
            }
            Command::Healthcheck => {
                let report = self.health.health_check().await;
                if report.is_healthy() {
                    self.reply(chat, Text::HealthGood { idle_minutes: report.idle_minutes() })
                        .await
                } else {
                    self.reply(chat, Text::HealthBad).await
                }
            }
        }
    }
}
