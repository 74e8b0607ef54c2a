//! Auto-reply decision engine.
//!
//! Rule table and classifier, deduplication ledger, and the dispatch
//! orchestrator that ties them to the messaging gateway.

pub mod classifier;
pub mod engine;
pub mod ledger;
pub mod rules;

pub use classifier::Classifier;
pub use engine::{
    AutoReplyEngine, DispatchResult, DispatchSummary, EngineError, EngineStats,
    DEFAULT_MESSAGE_LOOKBACK,
};
pub use ledger::{DedupLedger, ProcessedKey};
pub use rules::{ReplyRule, ReplyRuleConfig, RuleError, RuleSet};
