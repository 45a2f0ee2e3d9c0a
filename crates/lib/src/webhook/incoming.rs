//! Inbound webhook payload: chat id, message type and text content.

use serde_json::{Map, Value};

const CHAT_ID_KEYS: &[&str] = &["chatId", "chat_id", "remoteJid"];
const TYPE_KEYS: &[&str] = &["type", "messageType"];
const CONTENT_KEYS: &[&str] = &["content", "text"];

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a json object")]
    NotAnObject,
}

/// The normalized message fields the dispatcher needs. Missing fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    /// `<number>@<domain>` as sent by the provider.
    pub chat_id: String,
    /// Provider type tag, verbatim (e.g. "Conversation", "ptt").
    pub message_type: String,
    pub content: String,
}

/// A decoded webhook: optional envelope fields plus the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingWebhook {
    pub instance: Option<String>,
    pub event: Option<String>,
    pub message: IncomingMessage,
}

impl IncomingWebhook {
    /// Decode a raw request body. Fails only when the body is not a JSON object.
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, WebhookError> {
        let root = value.as_object().ok_or(WebhookError::NotAnObject)?;
        let message = message_object(root)
            .map(|m| IncomingMessage {
                chat_id: first_string(m, CHAT_ID_KEYS),
                message_type: first_string(m, TYPE_KEYS),
                content: first_string(m, CONTENT_KEYS),
            })
            .unwrap_or_default();
        Ok(Self {
            instance: non_empty(first_string(root, &["instance"])),
            event: non_empty(first_string(root, &["event"])),
            message,
        })
    }

    /// Sender phone number derived from the chat id.
    pub fn sender_number(&self) -> &str {
        sender_number(&self.message.chat_id)
    }
}

/// `body.message`, falling back to a top-level `message`.
fn message_object(root: &Map<String, Value>) -> Option<&Map<String, Value>> {
    root.get("body")
        .and_then(|b| b.get("message"))
        .and_then(Value::as_object)
        .or_else(|| root.get("message").and_then(Value::as_object))
}

/// First non-empty string value among `keys`; non-string values are skipped.
fn first_string(map: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Part of a chat id before the first `@`; ids without `@` are returned unchanged.
pub fn sender_number(chat_id: &str) -> &str {
    match chat_id.find('@') {
        Some(i) => &chat_id[..i],
        None => chat_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sender_number_truncates_at_first_at() {
        assert_eq!(sender_number("5531999990000@s.whatsapp.net"), "5531999990000");
        assert_eq!(sender_number("a@b@c"), "a");
        assert_eq!(sender_number("5531999990000"), "5531999990000");
        assert_eq!(sender_number("@g.us"), "");
    }

    #[test]
    fn decodes_canonical_payload() {
        let body = br#"{
            "instance": "inst-1",
            "event": "messages",
            "body": { "message": { "chatId": "5531@s.whatsapp.net", "type": "Conversation", "content": "oi", "extra": 1 } }
        }"#;
        let w = IncomingWebhook::from_slice(body).unwrap();
        assert_eq!(w.instance.as_deref(), Some("inst-1"));
        assert_eq!(w.event.as_deref(), Some("messages"));
        assert_eq!(w.message.chat_id, "5531@s.whatsapp.net");
        assert_eq!(w.message.message_type, "Conversation");
        assert_eq!(w.message.content, "oi");
        assert_eq!(w.sender_number(), "5531");
    }

    #[test]
    fn falls_back_through_historical_keys() {
        let v = json!({ "body": { "message": {
            "chatId": "", "chat_id": null, "remoteJid": "5511@s.whatsapp.net",
            "messageType": "text", "text": "olá"
        } } });
        let w = IncomingWebhook::from_value(&v).unwrap();
        assert_eq!(w.message.chat_id, "5511@s.whatsapp.net");
        assert_eq!(w.message.message_type, "text");
        assert_eq!(w.message.content, "olá");
    }

    #[test]
    fn first_key_wins_when_several_are_present() {
        let v = json!({ "message": { "chatId": "1@x", "chat_id": "2@x", "type": "ptt" } });
        let w = IncomingWebhook::from_value(&v).unwrap();
        assert_eq!(w.message.chat_id, "1@x");
        assert_eq!(w.message.content, "");
    }

    #[test]
    fn object_without_message_is_empty_not_error() {
        let w = IncomingWebhook::from_slice(br#"{"event":"presence"}"#).unwrap();
        assert_eq!(w.message, IncomingMessage::default());
    }

    #[test]
    fn rejects_non_objects_and_bad_json() {
        assert!(matches!(
            IncomingWebhook::from_slice(b"[1,2]"),
            Err(WebhookError::NotAnObject)
        ));
        assert!(matches!(
            IncomingWebhook::from_slice(b"{not json"),
            Err(WebhookError::Json(_))
        ));
    }
}
