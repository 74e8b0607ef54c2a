//! Auto-reply engine.
//!
//! Orchestrates one invocation: fetch unread chats from the messaging
//! gateway, skip self-sent, already-handled, and empty messages, pick a
//! reply and dispatch it, then record the key so repeated invocations never
//! answer the same message twice. One engine serves one connector and owns
//! that connector's ledger.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::gateway::types::WebhookEvent;
use crate::gateway::{DynGateway, GatewayError};
use crate::llm::DynReplyGenerator;

use super::classifier::Classifier;
use super::ledger::{DedupLedger, ProcessedKey};

/// Default number of recent messages inspected per chat
pub const DEFAULT_MESSAGE_LOOKBACK: usize = 5;

/// Outcome of one dispatched reply
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    /// Chat the message arrived in; absent for webhook deliveries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub phone_number: String,
    pub incoming_text: String,
    pub reply_text: String,
    pub sent: bool,
}

/// Per-invocation summary returned to the caller, in processing order
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub cycle_id: String,
    /// Chats returned by the unread listing
    pub unread_chats: usize,
    /// Dispatch attempts recorded this invocation, failed sends included
    pub replies_sent: usize,
    pub results: Vec<DispatchResult>,
}

/// Cumulative engine counters
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub cycles_run: u64,
    pub replies_sent: u64,
    pub send_failures: u64,
    pub ledger_size: usize,
}

/// Errors that abort an invocation
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A previous cycle for this connector is still running
    #[error("auto-reply cycle already in progress")]
    CycleInProgress,

    /// The upstream chat listing failed; no keys were marked
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Per-connector auto-reply engine
pub struct AutoReplyEngine {
    connector_id: String,
    classifier: Classifier,
    ledger: DedupLedger,
    gateway: DynGateway,
    generator: Option<DynReplyGenerator>,
    rng: Mutex<StdRng>,
    cycle_lock: tokio::sync::Mutex<()>,
    message_lookback: usize,
    cycles_run: AtomicU64,
    replies_sent: AtomicU64,
    send_failures: AtomicU64,
}

impl AutoReplyEngine {
    /// Create an engine bound to one connector
    pub fn new(
        connector_id: impl Into<String>,
        classifier: Classifier,
        ledger: DedupLedger,
        gateway: DynGateway,
    ) -> Self {
        Self {
            connector_id: connector_id.into(),
            classifier,
            ledger,
            gateway,
            generator: None,
            rng: Mutex::new(StdRng::from_entropy()),
            cycle_lock: tokio::sync::Mutex::new(()),
            message_lookback: DEFAULT_MESSAGE_LOOKBACK,
            cycles_run: AtomicU64::new(0),
            replies_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        }
    }

    /// Use a reply generator, preferred over the rule table when it succeeds
    pub fn with_generator(mut self, generator: DynReplyGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use a specific random source (seedable for tests)
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Inspect at most `lookback` recent messages per chat (minimum 1)
    pub fn with_message_lookback(mut self, lookback: usize) -> Self {
        self.message_lookback = lookback.max(1);
        self
    }

    /// The connector this engine serves
    pub fn connector_id(&self) -> &str {
        &self.connector_id
    }

    /// Run one auto-reply cycle over the gateway's unread chats.
    ///
    /// Single-flight per engine: a cycle entered while the previous one is
    /// still running returns [`EngineError::CycleInProgress`] without
    /// touching the gateway. Re-running with unchanged upstream data sends
    /// nothing new, since every handled key is already marked.
    pub async fn run_cycle(&self) -> Result<DispatchSummary, EngineError> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| EngineError::CycleInProgress)?;

        let cycle_id = uuid::Uuid::new_v4().to_string();
        let chats = self.gateway.list_unread_chats().await?;

        let mut results = Vec::new();
        for chat in &chats {
            if chat.unread_count == 0 {
                continue;
            }
            for message in chat.recent_messages.iter().take(self.message_lookback) {
                if message.from_self {
                    continue;
                }
                let key = ProcessedKey::new(&self.connector_id, &message.id);
                if self.ledger.seen(&key) {
                    continue;
                }
                if message.text.is_empty() {
                    continue;
                }

                let reply = self.compose_reply(&message.text).await;
                let sent = self.dispatch(&chat.phone_number, &reply).await;

                results.push(DispatchResult {
                    chat_id: Some(chat.id.clone()),
                    phone_number: chat.phone_number.clone(),
                    incoming_text: message.text.clone(),
                    reply_text: reply,
                    sent,
                });

                // A failed send is not retried: the key is marked either way.
                self.ledger.mark(key);
            }
        }

        self.cycles_run.fetch_add(1, Ordering::Relaxed);
        Ok(DispatchSummary {
            cycle_id,
            unread_chats: chats.len(),
            replies_sent: results.len(),
            results,
        })
    }

    /// Handle one webhook-delivered message.
    ///
    /// Returns `None` for skipped payloads: missing fields, a connector this
    /// engine does not serve, the account's own messages, or a message id
    /// already in the ledger. The ledger is shared with [`Self::run_cycle`],
    /// so a message seen on both paths is answered once.
    pub async fn process_event(&self, event: &WebhookEvent) -> Option<DispatchResult> {
        let message = match event.message() {
            Some(message) => message,
            None => {
                debug!(connector = %self.connector_id, "webhook payload incomplete, skipped");
                return None;
            }
        };
        if event.connector_id != self.connector_id {
            debug!(
                connector = %self.connector_id,
                event_connector = %event.connector_id,
                "webhook for another connector, skipped"
            );
            return None;
        }
        if message.from == "me" {
            return None;
        }

        let key = if message.message_id.is_empty() {
            None
        } else {
            Some(ProcessedKey::new(&self.connector_id, &message.message_id))
        };
        if let Some(key) = &key {
            if self.ledger.seen(key) {
                return None;
            }
        }

        let reply = self.compose_reply(&message.text).await;
        let sent = self.dispatch(&message.from, &reply).await;
        if let Some(key) = key {
            self.ledger.mark(key);
        }

        Some(DispatchResult {
            chat_id: None,
            phone_number: message.from.clone(),
            incoming_text: message.text.clone(),
            reply_text: reply,
            sent,
        })
    }

    /// Cumulative counters since engine construction
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            ledger_size: self.ledger.len(),
        }
    }

    /// Forget all handled-message history (test isolation)
    pub fn reset_ledger(&self) {
        self.ledger.clear();
    }

    async fn compose_reply(&self, text: &str) -> String {
        if let Some(generator) = &self.generator {
            match generator.generate(text).await {
                Ok(reply) => return reply,
                Err(e) => {
                    debug!(
                        connector = %self.connector_id,
                        error = %e,
                        "reply generator unavailable, using rule table"
                    );
                }
            }
        }
        let mut rng = self.rng.lock();
        self.classifier.classify(text, &mut *rng)
    }

    async fn dispatch(&self, phone_number: &str, reply: &str) -> bool {
        match self.gateway.send_message(phone_number, reply).await {
            Ok(()) => {
                self.replies_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!(connector = %self.connector_id, error = %e, "reply send failed");
                false
            }
        }
    }
}
