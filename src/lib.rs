//! Audio relay bot: forwards audio from a Telegram group to a channel,
//! once per file, with retry and self-healing connectivity checks.

pub mod commands;
pub mod config;
pub mod i18n;
pub mod relay;
pub mod supervisor;
pub mod telegram_log;
