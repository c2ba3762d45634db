//! Relay core - forwards audio from the source group to the channel.

pub mod engine;
pub mod health;
pub mod ledger;
pub mod message;
pub mod retry;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use engine::{ForwardEngine, ForwardResult, ForwardStatus, Route};
pub use health::{Health, HealthMonitor, HealthReport};
pub use ledger::{Ledger, LedgerError, Presence, RelayRecord};
pub use message::{AudioMessage, AudioMeta};
pub use retry::{RetryPolicy, RetryingInvoker, TransportExhausted};
pub use state::RuntimeState;
pub use transport::{BotIdentity, ChatInfo, MemberStatus, TelegramTransport, Transport, TransportError};
