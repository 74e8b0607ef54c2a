//! Reply rule table.
//!
//! Ordered, case-insensitive pattern rules loaded once at startup and
//! immutable afterwards. Rule order is the precedence order: the first
//! matching rule wins.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Errors raised while compiling a rule table
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule `{pattern}` has no candidate replies")]
    EmptyReplies { pattern: String },
}

/// A single rule as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRuleConfig {
    /// Regex tested against the incoming text, compiled case-insensitive
    pub pattern: String,
    /// Candidate replies; one is chosen at random when the rule matches
    pub replies: Vec<String>,
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct ReplyRule {
    pattern: Regex,
    replies: Vec<String>,
}

impl ReplyRule {
    /// Whether the rule's pattern matches the text
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Candidate replies for this rule
    pub fn replies(&self) -> &[String] {
        &self.replies
    }

    /// The source pattern
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Ordered, immutable rule table
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ReplyRule>,
}

impl RuleSet {
    /// Compile a rule table from configuration, preserving order.
    pub fn compile(configs: &[ReplyRuleConfig]) -> Result<Self, RuleError> {
        let mut rules = Vec::with_capacity(configs.len());
        for config in configs {
            if config.replies.is_empty() {
                return Err(RuleError::EmptyReplies {
                    pattern: config.pattern.clone(),
                });
            }
            let pattern = RegexBuilder::new(&config.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| RuleError::InvalidPattern {
                    pattern: config.pattern.clone(),
                    source,
                })?;
            rules.push(ReplyRule {
                pattern,
                replies: config.replies.clone(),
            });
        }
        Ok(Self { rules })
    }

    /// The built-in rule table: greetings, identity, gratitude, farewell,
    /// help, pricing.
    pub fn builtin() -> Self {
        let configs: Vec<ReplyRuleConfig> = BUILTIN_RULES
            .iter()
            .map(|(pattern, replies)| ReplyRuleConfig {
                pattern: (*pattern).to_string(),
                replies: replies.iter().map(|r| (*r).to_string()).collect(),
            })
            .collect();
        Self::compile(&configs).expect("built-in rule table compiles")
    }

    /// First rule whose pattern matches, in table order.
    pub fn first_match(&self, text: &str) -> Option<&ReplyRule> {
        self.rules.iter().find(|rule| rule.matches(text))
    }

    /// Number of rules in the table
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

const BUILTIN_RULES: &[(&str, &[&str])] = &[
    (
        r"^(hi|hello|hey|hii+|hola)",
        &[
            "Hello! 👋 How can I help you today?",
            "Hi there! What can I do for you?",
            "Hey! Nice to hear from you. How can I assist?",
        ],
    ),
    (
        r"(who is this|who are you|what is this)",
        &[
            "Hi! I'm an AI assistant here to help you. Feel free to ask me anything! 🤖",
            "Hello! This is an automated assistant. How may I help you today?",
        ],
    ),
    (
        r"(thanks|thank you|thx)",
        &[
            "You're welcome! Let me know if you need anything else. 😊",
            "Happy to help! Don't hesitate to reach out again.",
        ],
    ),
    (
        r"(bye|goodbye|see you|later)",
        &[
            "Goodbye! Take care! 👋",
            "See you later! Have a great day!",
        ],
    ),
    (
        r"(help|support|issue|problem)",
        &[
            "I'd be happy to help! Could you please describe your issue in detail?",
            "I'm here to assist. What seems to be the problem?",
        ],
    ),
    (
        r"(price|cost|how much)",
        &[
            "For pricing information, please let me know which product or service you're interested in.",
            "I can help with pricing! What would you like to know about?",
        ],
    ),
];
