//! Forward engine - relays each audio file to the channel exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::relay::ledger::{Ledger, Presence};
use crate::relay::message::AudioMessage;
use crate::relay::retry::RetryingInvoker;
use crate::relay::state::RuntimeState;
use crate::relay::transport::Transport;

/// Where audio comes from and where it goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub source_chat: i64,
    pub destination_chat: i64,
}

/// Outcome of a forward attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardResult {
    Forwarded { dest_message_id: i32 },
    AlreadyForwarded,
    NotAudio,
    ForwardFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardStatus {
    Success,
    Skipped,
    Failure,
}

impl ForwardResult {
    pub fn status(self) -> ForwardStatus {
        match self {
            Self::Forwarded { .. } => ForwardStatus::Success,
            Self::AlreadyForwarded => ForwardStatus::Skipped,
            Self::NotAudio | Self::ForwardFailed => ForwardStatus::Failure,
        }
    }

    /// Whether the automatic path should tell the chat about this outcome.
    pub fn worth_announcing(self) -> bool {
        matches!(self, Self::Forwarded { .. } | Self::ForwardFailed)
    }
}

/// Per-file async locks so two tasks never forward the same file at once.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.owner.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map holds it now: nobody is waiting on this key.
        if locks.get(&self.key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.key);
        }
    }
}

/// Decides whether inbound audio needs relaying and performs the relay.
pub struct ForwardEngine<T> {
    transport: Arc<T>,
    invoker: Arc<RetryingInvoker>,
    ledger: Arc<Ledger>,
    state: Arc<RuntimeState>,
    route: Route,
    in_flight: KeyLocks,
}

impl<T: Transport> ForwardEngine<T> {
    pub fn new(
        transport: Arc<T>,
        invoker: Arc<RetryingInvoker>,
        ledger: Arc<Ledger>,
        state: Arc<RuntimeState>,
        route: Route,
    ) -> Self {
        Self {
            transport,
            invoker,
            ledger,
            state,
            route,
            in_flight: KeyLocks::default(),
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    /// Automatic path for audio arriving in real time.
    ///
    /// Returns `None` without touching the ledger or the transport when the
    /// relay is paused or the message is not from the source chat.
    pub async fn handle_inbound_audio(&self, msg: &AudioMessage) -> Option<ForwardResult> {
        if self.state.is_paused() {
            debug!(message_id = msg.message_id, "relay paused, skipping audio");
            return None;
        }
        if msg.chat_id != self.route.source_chat {
            debug!(chat_id = msg.chat_id, "audio outside source chat, ignoring");
            return None;
        }
        Some(self.forward_audio(msg).await)
    }

    /// Relay `msg` to the destination channel unless it was relayed before.
    pub async fn forward_audio(&self, msg: &AudioMessage) -> ForwardResult {
        let Some(audio) = msg.audio.as_ref() else {
            return ForwardResult::NotAudio;
        };
        let file_id = audio.file_id.as_str();

        let _key = self.in_flight.acquire(file_id).await;

        match self.ledger.lookup(file_id) {
            Presence::Present => {
                info!("⏭️ Already forwarded: {} ({})", msg.describe(), file_id);
                return ForwardResult::AlreadyForwarded;
            }
            Presence::Unknown => {
                warn!(file_id, "ledger unavailable, forwarding anyway");
            }
            Presence::Absent => {}
        }

        let transport = &self.transport;
        let Route { destination_chat, .. } = self.route;
        let forwarded = self
            .invoker
            .invoke("forward_message", move || {
                transport.forward_message(msg.chat_id, msg.message_id, destination_chat)
            })
            .await;

        let dest_message_id = match forwarded {
            Ok(id) => id,
            Err(e) => {
                error!("❌ Forward failed for {} ({}): {}", msg.describe(), file_id, e);
                return ForwardResult::ForwardFailed;
            }
        };

        let recorded = self.ledger.record(
            file_id,
            audio.file_name.as_deref().unwrap_or(""),
            audio.performer.as_deref().unwrap_or(""),
            audio.title.as_deref().unwrap_or(""),
            i64::from(dest_message_id),
        );
        if recorded.is_none() {
            error!(file_id, dest_message_id, "forwarded but not recorded, dedup lost for this file");
        }
        info!("✅ Forwarded {} ({}) as msg {}", msg.describe(), file_id, dest_message_id);
        ForwardResult::Forwarded { dest_message_id }
    }

    #[cfg(test)]
    pub(crate) fn in_flight_keys(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ForwardResult::Forwarded { dest_message_id: 1 }.status(), ForwardStatus::Success);
        assert_eq!(ForwardResult::AlreadyForwarded.status(), ForwardStatus::Skipped);
        assert_eq!(ForwardResult::NotAudio.status(), ForwardStatus::Failure);
        assert_eq!(ForwardResult::ForwardFailed.status(), ForwardStatus::Failure);
    }

    #[test]
    fn test_only_forwarded_and_failed_are_announced() {
        assert!(ForwardResult::Forwarded { dest_message_id: 1 }.worth_announcing());
        assert!(ForwardResult::ForwardFailed.worth_announcing());
        assert!(!ForwardResult::AlreadyForwarded.worth_announcing());
        assert!(!ForwardResult::NotAudio.worth_announcing());
    }

    #[tokio::test]
    async fn test_key_lock_released_after_use() {
        let locks = KeyLocks::default();
        {
            let _a = locks.acquire("A1").await;
            let _b = locks.acquire("B2").await;
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);
    }
}
