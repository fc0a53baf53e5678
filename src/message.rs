//! Outgoing message payloads.
//!
//! Operators type bare phone numbers; the gateway wants `<digits>@c.us`.
//! [`format_chat_id`] does that conversion and every [`MessagePayload`]
//! constructor goes through it, so a payload with a malformed chat id cannot
//! be built.

use std::path::Path;

use serde::Serialize;

use crate::error::MessageError;

/// Suffix of individual (non-group) WhatsApp chat ids.
const CHAT_ID_SUFFIX: &str = "@c.us";

/// Strip everything but digits and append `@c.us`. No digits → empty string.
///
/// ```
/// use waha_panel::format_chat_id;
/// assert_eq!(format_chat_id("+55 (11) 99999-9999"), "5511999999999@c.us");
/// assert_eq!(format_chat_id("abc"), "");
/// ```
pub fn format_chat_id(number: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        String::new()
    } else {
        format!("{digits}{CHAT_ID_SUFFIX}")
    }
}

/// Which media endpoint a file goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MediaKind {
    Image,
    File,
    Voice,
    Video,
}

impl MediaKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Image => "sendImage",
            Self::File => "sendFile",
            Self::Voice => "sendVoice",
            Self::Video => "sendVideo",
        }
    }
}

/// File contents plus the name the gateway should see.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Read a file from disk; the upload name is the file's base name.
    pub async fn read(path: &Path) -> Result<Self, MessageError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| MessageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { file_name, bytes })
    }
}

/// One quick-reply button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub id: String,
    pub text: String,
}

impl Button {
    /// Buttons from labels: blanks dropped, ids `1..n` in order.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Vec<Self> {
        labels
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(i, text)| Self {
                id: (i + 1).to_string(),
                text: text.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    Media { kind: MediaKind, file: Attachment },
    Buttons { text: String, buttons: Vec<Button> },
}

/// A validated message, built per submission.
#[derive(Debug, Clone)]
pub struct MessagePayload {
    /// Always `<digits>@c.us`.
    pub chat_id: String,
    pub session: String,
    pub content: MessageContent,
}

impl MessagePayload {
    pub fn text(session: &str, number: &str, text: &str) -> Result<Self, MessageError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MessageError::EmptyText);
        }
        Self::build(session, number, MessageContent::Text(text.to_string()))
    }

    pub fn media(
        session: &str,
        number: &str,
        kind: MediaKind,
        file: Attachment,
    ) -> Result<Self, MessageError> {
        Self::build(session, number, MessageContent::Media { kind, file })
    }

    pub fn buttons(
        session: &str,
        number: &str,
        text: &str,
        buttons: Vec<Button>,
    ) -> Result<Self, MessageError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MessageError::EmptyText);
        }
        let buttons: Vec<Button> = buttons
            .into_iter()
            .filter(|b| !b.text.trim().is_empty())
            .collect();
        if buttons.is_empty() {
            return Err(MessageError::NoButtons);
        }
        Self::build(
            session,
            number,
            MessageContent::Buttons {
                text: text.to_string(),
                buttons,
            },
        )
    }

    fn build(session: &str, number: &str, content: MessageContent) -> Result<Self, MessageError> {
        let chat_id = format_chat_id(number);
        if chat_id.is_empty() {
            return Err(MessageError::MissingChatId);
        }
        Ok(Self {
            chat_id,
            session: session.to_string(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_from_bare_digits() {
        assert_eq!(format_chat_id("5511999999999"), "5511999999999@c.us");
    }

    #[test]
    fn chat_id_without_digits_is_empty() {
        assert_eq!(format_chat_id("abc"), "");
        assert_eq!(format_chat_id(""), "");
    }

    #[test]
    fn chat_id_is_recanonicalised() {
        assert_eq!(format_chat_id("5511999999999@c.us"), "5511999999999@c.us");
    }

    #[test]
    fn text_payload_requires_digits() {
        let err = MessagePayload::text("default", "call me", "hi").unwrap_err();
        assert!(matches!(err, MessageError::MissingChatId));
    }

    #[test]
    fn text_payload_is_trimmed() {
        let payload = MessagePayload::text("sales", "55 11 4000", "  hello  ").unwrap();
        assert_eq!(payload.chat_id, "55114000@c.us");
        assert_eq!(payload.session, "sales");
        assert!(matches!(payload.content, MessageContent::Text(ref t) if t == "hello"));
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(matches!(
            MessagePayload::text("default", "5511", "   "),
            Err(MessageError::EmptyText)
        ));
    }

    #[test]
    fn button_labels_drop_blanks_and_number_ids() {
        let buttons = Button::from_labels(&["Yes", "  ", "No"]);
        assert_eq!(
            buttons,
            vec![
                Button { id: "1".into(), text: "Yes".into() },
                Button { id: "2".into(), text: "No".into() },
            ]
        );
    }

    #[test]
    fn buttons_payload_needs_one_button() {
        let err = MessagePayload::buttons("default", "5511", "Pick one", Vec::new()).unwrap_err();
        assert!(matches!(err, MessageError::NoButtons));
    }

    #[test]
    fn media_endpoints() {
        assert_eq!(MediaKind::Image.endpoint(), "sendImage");
        assert_eq!(MediaKind::File.endpoint(), "sendFile");
        assert_eq!(MediaKind::Voice.endpoint(), "sendVoice");
        assert_eq!(MediaKind::Video.endpoint(), "sendVideo");
    }

    #[tokio::test]
    async fn attachment_uses_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        let file = Attachment::read(&path).await.unwrap();
        assert_eq!(file.file_name, "photo.jpg");
        assert_eq!(file.bytes, b"jpeg");
    }

    #[tokio::test]
    async fn missing_attachment_is_an_error() {
        let err = Attachment::read(Path::new("/nonexistent/clip.mp4")).await.unwrap_err();
        assert!(matches!(err, MessageError::Io { .. }));
    }
}
