//! Inbound message references handed to the forward engine.

use teloxide::types::Message;

/// Audio payload metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMeta {
    /// Stable identifier of the audio payload (Telegram's `file_unique_id`).
    pub file_id: String,
    pub file_name: Option<String>,
    pub performer: Option<String>,
    pub title: Option<String>,
}

/// A message in some chat that may carry an audio attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub audio: Option<AudioMeta>,
}

impl AudioMessage {
    pub fn from_telegram(msg: &Message) -> Self {
        let audio = msg.audio().map(|a| AudioMeta {
            file_id: a.file.unique_id.0.clone(),
            file_name: a.file_name.clone(),
            performer: a.performer.clone(),
            title: a.title.clone(),
        });

        Self {
            chat_id: msg.chat.id.0,
            message_id: msg.id.0,
            audio,
        }
    }

    /// Short human-readable label for logs.
    pub fn describe(&self) -> String {
        match &self.audio {
            Some(AudioMeta { performer: Some(p), title: Some(t), .. }) => format!("{p} - {t}"),
            Some(AudioMeta { title: Some(t), .. }) => t.clone(),
            Some(AudioMeta { file_name: Some(n), .. }) => n.clone(),
            Some(a) => a.file_id.clone(),
            None => format!("msg:{}", self.message_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(performer: Option<&str>, title: Option<&str>, file_name: Option<&str>) -> AudioMessage {
        AudioMessage {
            chat_id: -100,
            message_id: 7,
            audio: Some(AudioMeta {
                file_id: "AgADxyz".into(),
                file_name: file_name.map(Into::into),
                performer: performer.map(Into::into),
                title: title.map(Into::into),
            }),
        }
    }

    #[test]
    fn test_describe_prefers_performer_and_title() {
        assert_eq!(audio(Some("Artist"), Some("Song"), Some("a.mp3")).describe(), "Artist - Song");
        assert_eq!(audio(None, Some("Song"), Some("a.mp3")).describe(), "Song");
        assert_eq!(audio(None, None, Some("a.mp3")).describe(), "a.mp3");
        assert_eq!(audio(None, None, None).describe(), "AgADxyz");
    }

    #[test]
    fn test_describe_without_audio() {
        let msg = AudioMessage { chat_id: -100, message_id: 9, audio: None };
        assert_eq!(msg.describe(), "msg:9");
    }
}
