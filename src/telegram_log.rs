use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram's message length limit, minus room for the ellipsis.
const MAX_ALERT_CHARS: usize = 4000;

/// Alerts arriving within this window are sent as one message.
const BATCH_WINDOW: Duration = Duration::from_secs(3);

/// Sends this crate's WARN/ERROR events to an operator chat.
///
/// Events from other crates (teloxide, hyper) are skipped: when the
/// connection is down they would only describe the failure of sending
/// this very alert.
pub struct AlertLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl AlertLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut batch = vec![first];
                let deadline = tokio::time::sleep(BATCH_WINDOW);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        next = rx.recv() => match next {
                            Some(alert) => batch.push(alert),
                            None => break,
                        },
                    }
                }
                send_alert(&bot, chat_id, &batch.join("\n")).await;
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_ALERT_CHARS {
        let truncated: String = text.chars().take(MAX_ALERT_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

async fn send_alert(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, truncate(text)).await {
        eprintln!("Failed to send alert to Telegram: {e}");
    }
}

#[derive(Default)]
struct AlertVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for AlertVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
}

impl AlertVisitor {
    fn render(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields.join(" "),
            (false, false) => format!("{} ({})", self.message, self.fields.join(" ")),
        }
    }
}

fn is_own_event(target: &str) -> bool {
    target == env!("CARGO_CRATE_NAME") || target.starts_with(concat!(env!("CARGO_CRATE_NAME"), "::"))
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = *meta.level();
        if level > Level::WARN || !is_own_event(meta.target()) {
            return;
        }

        let mut visitor = AlertVisitor::default();
        event.record(&mut visitor);

        let prefix = if level == Level::ERROR { "❌" } else { "⚠️" };
        let alert = format!("{prefix} {}", visitor.render());

        if self.tx.send(alert).is_err() {
            eprintln!("Alert channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_long_alerts() {
        let long = "x".repeat(MAX_ALERT_CHARS + 10);
        let out = truncate(&long);
        assert_eq!(out.chars().count(), MAX_ALERT_CHARS + 3);
        assert!(out.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn test_visitor_render() {
        let plain = AlertVisitor { message: "boom".into(), fields: vec![] };
        assert_eq!(plain.render(), "boom");

        let structured = AlertVisitor {
            message: "retrying transport call".into(),
            fields: vec!["attempt=2".into(), "delay_secs=10.0".into()],
        };
        assert_eq!(structured.render(), "retrying transport call (attempt=2 delay_secs=10.0)");
    }

    #[test]
    fn test_only_own_targets() {
        assert!(is_own_event("relaybot"));
        assert!(is_own_event("relaybot::relay::retry"));
        assert!(!is_own_event("relaybotx"));
        assert!(!is_own_event("teloxide::dispatching"));
    }
}
