//! HTTP messaging gateway.
//!
//! Lists unread chats through the account-level chat API and sends replies
//! through the platform's WhatsApp action API. All requests share one
//! client with a bounded timeout, so a hung send surfaces as a failed
//! dispatch instead of stalling the process.

use std::time::Duration;

use reqwest::header::ACCEPT;
use serde_json::{json, Value};
use tracing::debug;

use super::types::{normalize_phone_number, ChatSummary, InboundMessage};
use super::{GatewayError, GatewayResult, MessagingGateway};

/// Unread chats requested per listing call
const CHAT_LIST_LIMIT: usize = 10;
/// Messages fetched per chat
const MESSAGE_FETCH_LIMIT: usize = 5;

/// Credentials for the account-level chat API
#[derive(Debug, Clone)]
pub struct ChatApiCredentials {
    pub api_key: String,
    pub subdomain: String,
    pub port: u16,
    pub account_id: String,
}

/// HTTP gateway bound to one connector
pub struct HttpGateway {
    client: reqwest::Client,
    connector_id: String,
    platform_base_url: String,
    platform_api_key: String,
    chat_api: ChatApiCredentials,
}

impl HttpGateway {
    /// Create a gateway with a per-request timeout
    pub fn new(
        connector_id: impl Into<String>,
        platform_base_url: impl Into<String>,
        platform_api_key: impl Into<String>,
        chat_api: ChatApiCredentials,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            connector_id: connector_id.into(),
            platform_base_url: platform_base_url.into().trim_end_matches('/').to_string(),
            platform_api_key: platform_api_key.into(),
            chat_api,
        })
    }

    fn chat_api_base(&self) -> String {
        format!(
            "https://{}.unipile.com:{}/api/v1",
            self.chat_api.subdomain, self.chat_api.port
        )
    }

    async fn fetch_chat_messages(&self, chat_id: &str) -> GatewayResult<Vec<InboundMessage>> {
        let url = format!(
            "{}/chats/{}/messages?limit={}",
            self.chat_api_base(),
            chat_id,
            MESSAGE_FETCH_LIMIT
        );
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header("X-API-KEY", &self.chat_api.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::ListFailed(response.status()));
        }
        let body: Value = response.json().await?;
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(items
            .iter()
            .filter_map(|raw| InboundMessage::from_upstream(chat_id, raw))
            .collect())
    }
}

#[async_trait::async_trait]
impl MessagingGateway for HttpGateway {
    async fn list_unread_chats(&self) -> GatewayResult<Vec<ChatSummary>> {
        let url = format!(
            "{}/chats?account_id={}&account_type=WHATSAPP&unread=true&limit={}",
            self.chat_api_base(),
            self.chat_api.account_id,
            CHAT_LIST_LIMIT
        );
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header("X-API-KEY", &self.chat_api.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::ListFailed(response.status()));
        }
        let body: Value = response.json().await?;
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut chats = Vec::with_capacity(items.len());
        for item in &items {
            let Some(id) = item.get("id").and_then(Value::as_str) else {
                continue;
            };
            let unread_count = item
                .get("unread_count")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32;
            let phone_number = item
                .get("phone_number")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            // Messages are only fetched for chats the engine will look at.
            // A failed per-chat fetch leaves that chat empty rather than
            // failing the whole listing.
            let recent_messages = if unread_count > 0 {
                match self.fetch_chat_messages(id).await {
                    Ok(messages) => messages,
                    Err(e) => {
                        debug!(chat = %id, error = %e, "message fetch failed, chat skipped this cycle");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };

            chats.push(ChatSummary {
                id: id.to_string(),
                unread_count,
                phone_number,
                recent_messages,
            });
        }
        Ok(chats)
    }

    async fn send_message(&self, phone_number: &str, text: &str) -> GatewayResult<()> {
        let url = format!(
            "{}/actions/whatsapp/start_chat/{}",
            self.platform_base_url, self.connector_id
        );
        let body = json!({
            "phone_numbers": normalize_phone_number(phone_number),
            "text": text,
        });
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.platform_api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::SendFailed(response.status()));
        }
        Ok(())
    }
}
