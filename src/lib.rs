//! replygate
//!
//! Auto-reply decision engine for a WhatsApp automation product: a
//! classifier over an ordered rule table, a bounded deduplication ledger,
//! and a dispatch orchestrator that polls an external messaging gateway
//! and answers each new inbound message at most once per process lifetime.

pub mod autoreply;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod poller;
