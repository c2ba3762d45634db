//! Liveness watchdog that probes the transport when the bot goes quiet.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::relay::retry::{RetryingInvoker, TransportExhausted};
use crate::relay::state::RuntimeState;
use crate::relay::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Stale,
}

/// Snapshot of liveness at one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub health: Health,
    pub idle: Duration,
}

impl HealthReport {
    /// Stale once idle time is strictly above the timeout.
    pub fn evaluate(idle: Duration, activity_timeout: Duration) -> Self {
        let health = if idle > activity_timeout { Health::Stale } else { Health::Healthy };
        Self { health, idle }
    }

    pub fn is_healthy(&self) -> bool {
        self.health == Health::Healthy
    }

    pub fn idle_minutes(&self) -> u64 {
        self.idle.as_secs() / 60
    }
}

/// Watches `RuntimeState::last_activity` and re-establishes contact with
/// the transport when it has been silent for too long.
pub struct HealthMonitor<T> {
    transport: Arc<T>,
    invoker: Arc<RetryingInvoker>,
    state: Arc<RuntimeState>,
    activity_timeout: Duration,
    probe_chat: i64,
}

impl<T: Transport> HealthMonitor<T> {
    pub fn new(
        transport: Arc<T>,
        invoker: Arc<RetryingInvoker>,
        state: Arc<RuntimeState>,
        activity_timeout: Duration,
        probe_chat: i64,
    ) -> Self {
        Self {
            transport,
            invoker,
            state,
            activity_timeout,
            probe_chat,
        }
    }

    pub fn check_health(&self) -> HealthReport {
        HealthReport::evaluate(self.state.idle_for(), self.activity_timeout)
    }

    /// Lightweight identity and chat lookups. Success refreshes last activity.
    pub async fn probe(&self) -> Result<(), TransportExhausted> {
        info!("Attempting to reset connection...");
        let transport = &self.transport;

        let me = self.invoker.invoke("get_me", move || transport.get_me()).await?;
        info!("Connection verified with bot: @{}", me.username);

        let chat_id = self.probe_chat;
        let chat = self
            .invoker
            .invoke("get_chat", move || transport.get_chat(chat_id))
            .await?;
        match chat.title {
            Some(title) => info!("Connection to group verified: {}", title),
            None => info!("Connection to group verified: {}", chat.id),
        }
        Ok(())
    }

    /// One watchdog evaluation. Probe failures are logged, never propagated.
    pub async fn tick(&self) -> HealthReport {
        let report = self.check_health();
        if !report.is_healthy() {
            warn!("Bot inactive for {}s, resetting connection", report.idle.as_secs());
            if let Err(e) = self.probe().await {
                error!("Connection reset failed: {}", e);
            }
        }
        report
    }

    /// Operator health check: report, probing first when stale.
    pub async fn health_check(&self) -> HealthReport {
        self.tick().await
    }

    /// Run the watchdog until the returned handle is aborted.
    pub fn spawn_watchdog(self: Arc<Self>, first_tick: Duration, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + first_tick;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    /// One-shot startup job: confirm identity and group reachability.
    ///
    /// The Bot API exposes no chat history, so nothing is backfilled; audio
    /// is relayed as it arrives.
    pub fn spawn_startup_sync(self: Arc<Self>, delay: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = self.startup_sync().await {
                error!("Startup sync failed: {}", e);
            }
        })
    }

    pub async fn startup_sync(&self) -> Result<usize, TransportExhausted> {
        info!("Starting sync with channel...");
        let transport = &self.transport;

        let me = self.invoker.invoke("get_me", move || transport.get_me()).await?;
        info!("Bot connection verified: @{}", me.username);

        let chat_id = self.probe_chat;
        let admins = self
            .invoker
            .invoke("get_chat_administrators", move || transport.get_chat_administrators(chat_id))
            .await?;
        info!("Found {} admins in the group", admins.len());
        info!("Relying on real-time forwarding, no history to backfill");
        Ok(admins.len())
    }
}
