//! Gateway data shapes and upstream normalization.
//!
//! The chat listing API does not guarantee a single field name for message
//! bodies, and author/phone fields vary by provider version. Everything
//! shape-dependent is normalized here so the engine only ever sees these
//! types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One conversation thread as reported by the chat listing API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Opaque chat id from the gateway
    pub id: String,
    #[serde(default)]
    pub unread_count: u32,
    /// Raw phone number, possibly still carrying a JID suffix
    #[serde(default)]
    pub phone_number: String,
    /// Most recent messages, newest ordering as delivered upstream
    #[serde(default)]
    pub recent_messages: Vec<InboundMessage>,
}

/// A normalized inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub chat_id: String,
    /// True when the bound account itself authored the message
    pub from_self: bool,
    /// Body text; empty when the message carried none
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl InboundMessage {
    /// Normalize one raw message object from the listing API.
    ///
    /// Expected shape: `id` (required), `is_sender` as bool or 0/1, body
    /// text under `text`, else `body`, else `content`, and an RFC 3339
    /// `timestamp` when present. Returns `None` when `id` is missing.
    pub fn from_upstream(chat_id: &str, raw: &Value) -> Option<Self> {
        let id = raw.get("id")?.as_str()?.to_string();
        let from_self = raw.get("is_sender").map(flag_is_set).unwrap_or(false);
        let text = message_text(raw).unwrap_or_default();
        let timestamp = raw
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Some(Self {
            id,
            chat_id: chat_id.to_string(),
            from_self,
            text,
            timestamp,
        })
    }
}

/// The message body, checked under `text`, then `body`, then `content`.
/// Empty strings count as absent.
pub fn message_text(raw: &Value) -> Option<String> {
    for field in ["text", "body", "content"] {
        if let Some(s) = raw.get(field).and_then(Value::as_str) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

fn flag_is_set(value: &Value) -> bool {
    value
        .as_bool()
        .unwrap_or_else(|| value.as_u64().unwrap_or(0) != 0)
}

/// Strip WhatsApp JID suffixes from a chat's phone number
pub fn normalize_phone_number(raw: &str) -> String {
    raw.trim_end_matches("@s.whatsapp.net")
        .trim_end_matches("@c.us")
        .to_string()
}

/// Webhook delivery payload from the events service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub connector_id: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: WebhookMessage,
}

/// The message carried by a webhook delivery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookMessage {
    /// Sender phone number, or `"me"` for the bound account's own messages
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message_id: String,
}

impl WebhookEvent {
    /// The payload's message, or `None` when a required field is missing
    pub fn message(&self) -> Option<&WebhookMessage> {
        if self.connector_id.is_empty() || self.data.text.is_empty() || self.data.from.is_empty() {
            return None;
        }
        Some(&self.data)
    }
}
