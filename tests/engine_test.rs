//! End-to-end engine scenarios over a mock gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use replygate::autoreply::{AutoReplyEngine, Classifier, DedupLedger, EngineError, RuleSet};
use replygate::gateway::types::{ChatSummary, InboundMessage, WebhookEvent, WebhookMessage};
use replygate::gateway::{GatewayError, GatewayResult, MessagingGateway};
use replygate::llm::{GeneratorError, ReplyGenerator};
use replygate::poller;

const GREETING_REPLIES: [&str; 3] = [
    "Hello! 👋 How can I help you today?",
    "Hi there! What can I do for you?",
    "Hey! Nice to hear from you. How can I assist?",
];

const GRATITUDE_REPLIES: [&str; 2] = [
    "You're welcome! Let me know if you need anything else. 😊",
    "Happy to help! Don't hesitate to reach out again.",
];

/// Gateway serving a fixed batch and recording sends.
#[derive(Default)]
struct MockGateway {
    chats: Mutex<Vec<ChatSummary>>,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: AtomicBool,
    list_delay_ms: u64,
}

impl MockGateway {
    fn with_chats(chats: Vec<ChatSummary>) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.chats.lock() = chats;
        Arc::new(gateway)
    }

    fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessagingGateway for MockGateway {
    async fn list_unread_chats(&self) -> GatewayResult<Vec<ChatSummary>> {
        if self.list_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.list_delay_ms)).await;
        }
        Ok(self.chats.lock().clone())
    }

    async fn send_message(&self, phone_number: &str, text: &str) -> GatewayResult<()> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(GatewayError::SendFailed(reqwest::StatusCode::BAD_GATEWAY));
        }
        self.sent
            .lock()
            .push((phone_number.to_string(), text.to_string()));
        Ok(())
    }
}

struct FixedGenerator(&'static str);

#[async_trait]
impl ReplyGenerator for FixedGenerator {
    async fn generate(&self, _text: &str) -> Result<String, GeneratorError> {
        Ok(self.0.to_string())
    }
}

struct FailingGenerator;

#[async_trait]
impl ReplyGenerator for FailingGenerator {
    async fn generate(&self, _text: &str) -> Result<String, GeneratorError> {
        Err(GeneratorError::EmptyReply)
    }
}

fn message(id: &str, chat_id: &str, from_self: bool, text: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        from_self,
        text: text.to_string(),
        timestamp: None,
    }
}

fn chat(id: &str, phone: &str, unread: u32, messages: Vec<InboundMessage>) -> ChatSummary {
    ChatSummary {
        id: id.to_string(),
        unread_count: unread,
        phone_number: phone.to_string(),
        recent_messages: messages,
    }
}

fn engine(gateway: Arc<MockGateway>) -> AutoReplyEngine {
    AutoReplyEngine::new(
        "conn-1",
        Classifier::new(RuleSet::builtin()),
        DedupLedger::new(1000),
        gateway,
    )
    .with_rng(StdRng::seed_from_u64(7))
}

fn event(connector_id: &str, from: &str, text: &str, message_id: &str) -> WebhookEvent {
    WebhookEvent {
        connector_id: connector_id.to_string(),
        event: "message_received".to_string(),
        data: WebhookMessage {
            from: from.to_string(),
            text: text.to_string(),
            timestamp: String::new(),
            message_id: message_id.to_string(),
        },
    }
}

#[tokio::test]
async fn replies_to_one_unread_message() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567@s.whatsapp.net",
        1,
        vec![message("m1", "chat-1", false, "thanks!")],
    )]);
    let engine = engine(gateway.clone());

    let summary = engine.run_cycle().await.unwrap();

    assert_eq!(summary.unread_chats, 1);
    assert_eq!(summary.replies_sent, 1);
    assert_eq!(summary.results.len(), 1);

    let result = &summary.results[0];
    assert!(result.sent);
    assert_eq!(result.chat_id.as_deref(), Some("chat-1"));
    assert_eq!(result.incoming_text, "thanks!");
    assert!(GRATITUDE_REPLIES.contains(&result.reply_text.as_str()));

    let sent = gateway.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, result.reply_text);
}

#[tokio::test]
async fn replay_of_same_batch_sends_nothing() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567",
        1,
        vec![message("m1", "chat-1", false, "hi there")],
    )]);
    let engine = engine(gateway.clone());

    let first = engine.run_cycle().await.unwrap();
    assert_eq!(first.replies_sent, 1);
    assert!(GREETING_REPLIES.contains(&first.results[0].reply_text.as_str()));

    let second = engine.run_cycle().await.unwrap();
    assert_eq!(second.replies_sent, 0);
    assert!(second.results.is_empty());
    assert_eq!(gateway.sent_messages().len(), 1);
}

#[tokio::test]
async fn own_messages_are_never_answered() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567",
        2,
        vec![
            message("m1", "chat-1", true, "hi there"),
            message("m2", "chat-1", true, "thanks!"),
        ],
    )]);
    let engine = engine(gateway.clone());

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.replies_sent, 0);
    assert!(gateway.sent_messages().is_empty());
}

#[tokio::test]
async fn empty_text_and_read_chats_are_skipped() {
    let gateway = MockGateway::with_chats(vec![
        chat(
            "chat-1",
            "15551230001",
            1,
            vec![message("m1", "chat-1", false, "")],
        ),
        chat(
            "chat-2",
            "15551230002",
            0,
            vec![message("m2", "chat-2", false, "hello")],
        ),
    ]);
    let engine = engine(gateway.clone());

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.unread_chats, 2);
    assert_eq!(summary.replies_sent, 0);
    assert!(gateway.sent_messages().is_empty());
}

#[tokio::test]
async fn lookback_bounds_messages_per_chat() {
    let messages: Vec<InboundMessage> = (0..8)
        .map(|n| message(&format!("m{}", n), "chat-1", false, "hello"))
        .collect();
    let gateway = MockGateway::with_chats(vec![chat("chat-1", "15551234567", 8, messages)]);
    let engine = engine(gateway.clone()).with_message_lookback(5);

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.replies_sent, 5);
    assert_eq!(gateway.sent_messages().len(), 5);
}

#[tokio::test]
async fn failed_send_is_recorded_and_not_retried() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567",
        1,
        vec![message("m1", "chat-1", false, "hi there")],
    )]);
    gateway.fail_sends.store(true, Ordering::Relaxed);
    let engine = engine(gateway.clone());

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.replies_sent, 1);
    assert!(!summary.results[0].sent);

    // The send works now, but the key is already marked.
    gateway.fail_sends.store(false, Ordering::Relaxed);
    let replay = engine.run_cycle().await.unwrap();
    assert_eq!(replay.replies_sent, 0);
    assert!(gateway.sent_messages().is_empty());

    let stats = engine.stats();
    assert_eq!(stats.send_failures, 1);
    assert_eq!(stats.replies_sent, 0);
    assert_eq!(stats.cycles_run, 2);
    assert_eq!(stats.ledger_size, 1);
}

#[tokio::test]
async fn generator_takes_precedence_over_rules() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567",
        1,
        vec![message("m1", "chat-1", false, "hi there")],
    )]);
    let engine = engine(gateway.clone()).with_generator(Arc::new(FixedGenerator("Custom reply.")));

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.results[0].reply_text, "Custom reply.");
}

#[tokio::test]
async fn generator_failure_falls_back_to_rules() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567",
        1,
        vec![message("m1", "chat-1", false, "hi there")],
    )]);
    let engine = engine(gateway.clone()).with_generator(Arc::new(FailingGenerator));

    let summary = engine.run_cycle().await.unwrap();
    assert!(GREETING_REPLIES.contains(&summary.results[0].reply_text.as_str()));
}

#[tokio::test]
async fn webhook_event_is_answered_once() {
    let gateway = MockGateway::with_chats(vec![]);
    let engine = engine(gateway.clone());

    let delivery = event("conn-1", "15551234567", "hi there", "m1");
    let result = engine.process_event(&delivery).await.unwrap();
    assert!(result.sent);
    assert!(result.chat_id.is_none());
    assert!(GREETING_REPLIES.contains(&result.reply_text.as_str()));

    // Same delivery again: already in the ledger.
    assert!(engine.process_event(&delivery).await.is_none());
    assert_eq!(gateway.sent_messages().len(), 1);
}

#[tokio::test]
async fn webhook_skips_invalid_and_foreign_payloads() {
    let gateway = MockGateway::with_chats(vec![]);
    let engine = engine(gateway.clone());

    // Own message.
    assert!(engine
        .process_event(&event("conn-1", "me", "hi", "m1"))
        .await
        .is_none());
    // Missing text.
    assert!(engine
        .process_event(&event("conn-1", "15551234567", "", "m2"))
        .await
        .is_none());
    // Another connector.
    assert!(engine
        .process_event(&event("conn-2", "15551234567", "hi", "m3"))
        .await
        .is_none());

    assert!(gateway.sent_messages().is_empty());
}

#[tokio::test]
async fn webhook_and_poll_paths_share_the_ledger() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567",
        1,
        vec![message("m1", "chat-1", false, "hi there")],
    )]);
    let engine = engine(gateway.clone());

    // Webhook answers the message first.
    let delivery = event("conn-1", "15551234567", "hi there", "m1");
    assert!(engine.process_event(&delivery).await.is_some());

    // The poller then observes the same message id and skips it.
    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.replies_sent, 0);
    assert_eq!(gateway.sent_messages().len(), 1);
}

#[tokio::test]
async fn overlapping_cycles_are_single_flight() {
    let gateway = Arc::new(MockGateway {
        list_delay_ms: 100,
        ..MockGateway::default()
    });
    let engine = Arc::new(engine(gateway));

    let (first, second) = tokio::join!(engine.run_cycle(), engine.run_cycle());

    let in_progress = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Err(EngineError::CycleInProgress)))
        .count();
    assert_eq!(in_progress, 1);
    assert_eq!(engine.stats().cycles_run, 1);
}

#[tokio::test]
async fn reset_ledger_allows_reprocessing() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567",
        1,
        vec![message("m1", "chat-1", false, "thanks!")],
    )]);
    let engine = engine(gateway.clone());

    assert_eq!(engine.run_cycle().await.unwrap().replies_sent, 1);
    engine.reset_ledger();
    assert_eq!(engine.run_cycle().await.unwrap().replies_sent, 1);
    assert_eq!(gateway.sent_messages().len(), 2);
}

#[tokio::test]
async fn summary_serializes_with_expected_fields() {
    let gateway = MockGateway::with_chats(vec![chat(
        "chat-1",
        "15551234567",
        1,
        vec![message("m1", "chat-1", false, "thanks!")],
    )]);
    let engine = engine(gateway);

    let summary = engine.run_cycle().await.unwrap();
    let json = serde_json::to_value(&summary).unwrap();

    assert!(json["cycle_id"].is_string());
    assert_eq!(json["unread_chats"], 1);
    assert_eq!(json["replies_sent"], 1);
    assert_eq!(json["results"][0]["chat_id"], "chat-1");
    assert_eq!(json["results"][0]["sent"], true);
}

#[tokio::test]
async fn poll_loop_runs_cycles_until_shutdown() {
    let gateway = MockGateway::with_chats(vec![]);
    let engine = Arc::new(engine(gateway));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(poller::poll_loop(
        engine.clone(),
        Duration::from_millis(10),
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(80)).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("poller should stop on shutdown")
        .unwrap();
    assert!(engine.stats().cycles_run >= 1);
}
