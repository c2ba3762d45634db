//! Scripted in-memory transport shared by the crate's tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::time::Duration;

use super::{AudioMessage, AudioMeta, BotIdentity, ChatInfo, MemberStatus, Transport, TransportError};

pub(crate) const SOURCE: i64 = -1001;
pub(crate) const CHANNEL: i64 = -2002;

/// Transport stub with call counters and scripted failures.
pub(crate) struct MockTransport {
    pub forward_calls: AtomicU32,
    pub get_me_calls: AtomicU32,
    pub get_chat_calls: AtomicU32,
    pub admin_calls: AtomicU32,
    fail_times: AtomicU32,
    always_fail: AtomicBool,
    next_message_id: AtomicI32,
    forward_latency: Duration,
    member_status: Mutex<MemberStatus>,
    sent: Mutex<Vec<(i64, String)>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            forward_calls: AtomicU32::new(0),
            get_me_calls: AtomicU32::new(0),
            get_chat_calls: AtomicU32::new(0),
            admin_calls: AtomicU32::new(0),
            fail_times: AtomicU32::new(0),
            always_fail: AtomicBool::new(false),
            next_message_id: AtomicI32::new(500),
            forward_latency: Duration::ZERO,
            member_status: Mutex::new(MemberStatus::Member),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl MockTransport {
    pub fn failing() -> Self {
        let t = Self::default();
        t.always_fail.store(true, Ordering::SeqCst);
        t
    }

    pub fn flaky(fail_times: u32) -> Self {
        let t = Self::default();
        t.fail_times.store(fail_times, Ordering::SeqCst);
        t
    }

    pub fn slow(latency: Duration) -> Self {
        Self { forward_latency: latency, ..Self::default() }
    }

    pub fn set_failing(&self, failing: bool) {
        self.always_fail.store(failing, Ordering::SeqCst);
    }

    /// Role reported for every user by `get_chat_member`.
    pub fn set_member_status(&self, status: MemberStatus) {
        *self.member_status.lock().unwrap() = status;
    }

    pub fn forwards(&self) -> u32 {
        self.forward_calls.load(Ordering::SeqCst)
    }

    /// Texts sent so far, oldest first.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_sent(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, text)| text.clone())
    }

    fn outcome(&self) -> Result<(), TransportError> {
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(TransportError::Network("unreachable".into()));
        }
        let consumed = self
            .fail_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(TransportError::Api("Bad Gateway".into()));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    async fn forward_message(&self, _source_chat: i64, _message_id: i32, dest_chat: i64) -> Result<i32, TransportError> {
        assert_eq!(dest_chat, CHANNEL);
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        if !self.forward_latency.is_zero() {
            tokio::time::sleep(self.forward_latency).await;
        }
        self.outcome()?;
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn get_chat_member(&self, _chat_id: i64, _user_id: u64) -> Result<MemberStatus, TransportError> {
        self.outcome()?;
        Ok(*self.member_status.lock().unwrap())
    }

    async fn get_chat_administrators(&self, _chat_id: i64) -> Result<Vec<u64>, TransportError> {
        self.admin_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        Ok(vec![1, 2, 3])
    }

    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        self.get_me_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        Ok(BotIdentity { id: 42, username: "relay_bot".into() })
    }

    async fn get_chat(&self, chat_id: i64) -> Result<ChatInfo, TransportError> {
        self.get_chat_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()?;
        Ok(ChatInfo { id: chat_id, title: Some("Music".into()) })
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i32, TransportError> {
        self.outcome()?;
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// An audio message in the source group.
pub(crate) fn audio(file_id: &str, message_id: i32) -> AudioMessage {
    AudioMessage {
        chat_id: SOURCE,
        message_id,
        audio: Some(AudioMeta {
            file_id: file_id.to_string(),
            file_name: Some(format!("{file_id}.mp3")),
            performer: None,
            title: Some("Track".into()),
        }),
    }
}
