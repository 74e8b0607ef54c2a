//! Messaging gateway interface.
//!
//! Capabilities the engine consumes but does not implement: listing unread
//! chats and sending replies. The HTTP implementation lives in
//! [`http`]; tests inject their own.

pub mod http;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use types::ChatSummary;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors from the external messaging gateway
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat listing failed with status {0}")]
    ListFailed(reqwest::StatusCode),

    #[error("send failed with status {0}")]
    SendFailed(reqwest::StatusCode),
}

/// External messaging gateway capabilities
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Unread chats for the bound account, each with its recent messages
    async fn list_unread_chats(&self) -> GatewayResult<Vec<ChatSummary>>;

    /// Send a text reply to a phone number
    async fn send_message(&self, phone_number: &str, text: &str) -> GatewayResult<()>;
}

/// Type-erased gateway for injection
pub type DynGateway = Arc<dyn MessagingGateway>;
