//! Operator-facing strings in every supported language.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::relay::ForwardResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Fa,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Fa];

    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fa => "fa",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_lowercase();
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// Comma separated list of supported codes.
    pub fn supported() -> String {
        Self::ALL.map(Language::code).join(", ")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A message the bot can say, with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Text {
    Welcome,
    Help,
    Status { paused: bool, uptime: Duration, count: u64 },
    Stats { count: u64, last: Option<DateTime<Utc>> },
    Paused,
    Resumed,
    AdminOnly,
    GroupOnly,
    LanguageSet,
    Languages,
    Forwarded,
    ForwardFailed,
    ReplyRequired,
    AlreadyForwarded,
    NotAudio,
    HealthGood { idle_minutes: u64 },
    HealthBad,
    BotRunning,
    GenericError,
}

impl Text {
    /// What to tell the chat about a forward attempt.
    pub fn for_forward(result: ForwardResult) -> Self {
        match result {
            ForwardResult::Forwarded { .. } => Self::Forwarded,
            ForwardResult::AlreadyForwarded => Self::AlreadyForwarded,
            ForwardResult::NotAudio => Self::NotAudio,
            ForwardResult::ForwardFailed => Self::ForwardFailed,
        }
    }

    pub fn render(&self, lang: Language) -> String {
        match lang {
            Language::En => self.english(),
            Language::Fa => self.persian(),
        }
    }

    fn english(&self) -> String {
        match self {
            Self::Welcome => "✅ Bot activated!\nI forward audio messages to the channel.".into(),
            Self::Help => concat!(
                "📖 Commands:\n",
                "/start - Start bot\n",
                "/status - Bot status\n",
                "/pause - Pause forwarding\n",
                "/resume - Resume forwarding\n",
                "/forward - Forward specific message\n",
                "/language - Change language\n",
                "/stats - View forwarding stats\n",
                "/healthcheck - Check bot health",
            )
            .into(),
            Self::Status { paused, uptime, count } => {
                let status = if *paused { "⏸ Paused" } else { "▶️ Active" };
                format!(
                    "🔄 Status: {status}\n⏳ Uptime: {}\n📊 Files forwarded: {count}",
                    format_uptime(*uptime, "day", "days")
                )
            }
            Self::Stats { count, last } => {
                format!("📊 Total files forwarded: {count}\n📅 Last forwarded: {}", format_last(*last))
            }
            Self::Paused => "⏸ Bot paused!".into(),
            Self::Resumed => "▶️ Bot resumed!".into(),
            Self::AdminOnly => "🚫 Admin only!".into(),
            Self::GroupOnly => "⚠️ Only works in group!".into(),
            Self::LanguageSet => "🌐 Language set to English".into(),
            Self::Languages => format!("Languages: {}", Language::supported()),
            Self::Forwarded => "✅ Forwarded!".into(),
            Self::ForwardFailed => "❌ Failed!".into(),
            Self::ReplyRequired => "↩️ Reply to a message!".into(),
            Self::AlreadyForwarded => "⚠️ Already forwarded to channel!".into(),
            Self::NotAudio => "❌ This message is not an audio file!".into(),
            Self::HealthGood { idle_minutes } => {
                format!("✅ Bot is working correctly!\n⏱️ Last activity: {idle_minutes} minutes ago")
            }
            Self::HealthBad => "⚠️ Bot might be experiencing issues. Restarting connection...".into(),
            Self::BotRunning => "🤖 Bot is running!".into(),
            Self::GenericError => "⚠️ An error occurred. Please try again.".into(),
        }
    }

    fn persian(&self) -> String {
        match self {
            Self::Welcome => "✅ ربات فعال شد!\nپیامهای صوتی به کانال فوروارد میشوند.".into(),
            Self::Help => concat!(
                "📖 دستورات:\n",
                "/start - شروع ربات\n",
                "/status - وضعیت ربات\n",
                "/pause - توقف فوروارد\n",
                "/resume - ادامه فوروارد\n",
                "/forward - فوروارد پیام خاص\n",
                "/language - تغییر زبان\n",
                "/stats - آمار ارسال‌ها\n",
                "/healthcheck - بررسی سلامت ربات",
            )
            .into(),
            Self::Status { paused, uptime, count } => {
                let status = if *paused { "⏸ متوقف" } else { "▶️ فعال" };
                format!(
                    "🔄 وضعیت: {status}\n⏳ مدت فعالیت: {}\n📊 فایل‌های ارسال شده: {count}",
                    format_uptime(*uptime, "روز", "روز")
                )
            }
            Self::Stats { count, last } => {
                format!("📊 کل فایل‌های ارسال شده: {count}\n📅 آخرین ارسال: {}", format_last(*last))
            }
            Self::Paused => "⏸ ربات متوقف شد!".into(),
            Self::Resumed => "▶️ ربات فعال شد!".into(),
            Self::AdminOnly => "🚫 فقط ادمین!".into(),
            Self::GroupOnly => "⚠️ فقط در گروه!".into(),
            Self::LanguageSet => "🌐 زبان تنظیم شد به فارسی".into(),
            Self::Languages => format!("زبان‌ها: {}", Language::supported()),
            Self::Forwarded => "✅ ارسال شد!".into(),
            Self::ForwardFailed => "❌ خطا!".into(),
            Self::ReplyRequired => "↩️ روی پیام ریپلای کنید!".into(),
            Self::AlreadyForwarded => "⚠️ قبلاً به کانال ارسال شده است!".into(),
            Self::NotAudio => "❌ این پیام آهنگ نیست!".into(),
            Self::HealthGood { idle_minutes } => {
                format!("✅ ربات به درستی کار می‌کند!\n⏱️ آخرین فعالیت: {idle_minutes} دقیقه پیش")
            }
            Self::HealthBad => "⚠️ ممکن است ربات با مشکل مواجه شده باشد. در حال راه‌اندازی مجدد اتصال...".into(),
            Self::BotRunning => "🤖 ربات در حال اجراست!".into(),
            Self::GenericError => "⚠️ خطایی رخ داد. لطفاً دوباره تلاش کنید.".into(),
        }
    }
}

/// `H:MM:SS`, prefixed with the day count once past 24 hours.
pub fn format_uptime(uptime: Duration, day: &str, days: &str) -> String {
    let secs = uptime.as_secs();
    let (d, rest) = (secs / 86_400, secs % 86_400);
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match d {
        0 => clock,
        1 => format!("1 {day}, {clock}"),
        n => format!("{n} {days}, {clock}"),
    }
}

fn format_last(last: Option<DateTime<Utc>>) -> String {
    last.map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}
