//! Chat transport capability and its Telegram implementation.

use std::future::Future;

use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, MessageId};
use thiserror::Error;
use tracing::{debug, info};

/// A failed call into the chat platform.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The platform answered with an error.
    #[error("api error: {0}")]
    Api(String),
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),
}

impl From<RequestError> for TransportError {
    fn from(e: RequestError) -> Self {
        match &e {
            RequestError::Network(_) | RequestError::Io(_) => Self::Network(e.to_string()),
            _ => Self::Api(e.to_string()),
        }
    }
}

/// Role of a user inside a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    /// Owners and administrators may run operator commands.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator)
    }
}

/// Who the bot is logged in as.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct ChatInfo {
    pub id: i64,
    pub title: Option<String>,
}

/// Operations the relay needs from the chat platform.
///
/// Every call is fallible and is expected to be wrapped by the
/// [`RetryingInvoker`](super::retry::RetryingInvoker).
pub trait Transport: Send + Sync + 'static {
    /// Forward a message and return the id of the copy in `dest_chat`.
    fn forward_message(
        &self,
        source_chat: i64,
        message_id: i32,
        dest_chat: i64,
    ) -> impl Future<Output = Result<i32, TransportError>> + Send;

    fn get_chat_member(
        &self,
        chat_id: i64,
        user_id: u64,
    ) -> impl Future<Output = Result<MemberStatus, TransportError>> + Send;

    /// User ids of the chat's administrators.
    fn get_chat_administrators(
        &self,
        chat_id: i64,
    ) -> impl Future<Output = Result<Vec<u64>, TransportError>> + Send;

    fn get_me(&self) -> impl Future<Output = Result<BotIdentity, TransportError>> + Send;

    fn get_chat(&self, chat_id: i64) -> impl Future<Output = Result<ChatInfo, TransportError>> + Send;

    fn send_message(
        &self,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<i32, TransportError>> + Send;
}

/// Telegram Bot API transport.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Transport for TelegramTransport {
    async fn forward_message(
        &self,
        source_chat: i64,
        message_id: i32,
        dest_chat: i64,
    ) -> Result<i32, TransportError> {
        info!("📤 Forwarding msg {} from {} to {}", message_id, source_chat, dest_chat);
        let forwarded = self
            .bot
            .forward_message(ChatId(dest_chat), ChatId(source_chat), MessageId(message_id))
            .await?;
        Ok(forwarded.id.0)
    }

    async fn get_chat_member(&self, chat_id: i64, user_id: u64) -> Result<MemberStatus, TransportError> {
        debug!("Getting chat member: chat={}, user={}", chat_id, user_id);
        let member = self.bot.get_chat_member(ChatId(chat_id), UserId(user_id)).await?;

        let status = match member.kind {
            ChatMemberKind::Owner(_) => MemberStatus::Owner,
            ChatMemberKind::Administrator(_) => MemberStatus::Administrator,
            ChatMemberKind::Member(_) => MemberStatus::Member,
            ChatMemberKind::Restricted(_) => MemberStatus::Restricted,
            ChatMemberKind::Left => MemberStatus::Left,
            ChatMemberKind::Banned(_) => MemberStatus::Banned,
        };
        Ok(status)
    }

    async fn get_chat_administrators(&self, chat_id: i64) -> Result<Vec<u64>, TransportError> {
        debug!("👥 Getting admins for chat {}", chat_id);
        let admins = self.bot.get_chat_administrators(ChatId(chat_id)).await?;
        Ok(admins.iter().map(|m| m.user.id.0).collect())
    }

    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        let me = self.bot.get_me().await?;
        Ok(BotIdentity {
            id: me.id.0,
            username: me.username().to_string(),
        })
    }

    async fn get_chat(&self, chat_id: i64) -> Result<ChatInfo, TransportError> {
        let chat = self.bot.get_chat(ChatId(chat_id)).await?;
        Ok(ChatInfo {
            id: chat.id.0,
            title: chat.title().map(str::to_string),
        })
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i32, TransportError> {
        let sent = self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(sent.id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_statuses() {
        assert!(MemberStatus::Owner.is_admin());
        assert!(MemberStatus::Administrator.is_admin());
        assert!(!MemberStatus::Member.is_admin());
        assert!(!MemberStatus::Restricted.is_admin());
        assert!(!MemberStatus::Left.is_admin());
        assert!(!MemberStatus::Banned.is_admin());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Network("connection reset".into());
        assert_eq!(err.to_string(), "network error: connection reset");
    }
}
