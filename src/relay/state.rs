//! Process-wide runtime state shared by every relay component.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::i18n::Language;

/// Shared runtime status: pause flag, active language, uptime and liveness.
///
/// Lives for the whole process and is handed to components as an
/// `Arc<RuntimeState>`. Nothing here is persisted.
pub struct RuntimeState {
    paused: AtomicBool,
    language: RwLock<Language>,
    start_time: DateTime<Utc>,
    started: Instant,
    last_activity: Mutex<Instant>,
}

impl RuntimeState {
    pub fn new(language: Language) -> Self {
        let now = Instant::now();
        Self {
            paused: AtomicBool::new(false),
            language: RwLock::new(language),
            start_time: Utc::now(),
            started: now,
            last_activity: Mutex::new(now),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn language(&self) -> Language {
        *self.language.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_language(&self, language: Language) {
        *self.language.write().unwrap_or_else(PoisonError::into_inner) = language;
    }

    /// Wall-clock time the process started.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record a successful interaction with the transport.
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time elapsed since the last successful transport interaction.
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(Language::default())
    }
}
