//! Message classifier.
//!
//! Maps incoming text to a reply. The first matching rule wins and one of
//! its candidates is chosen uniformly at random; text matching no rule gets
//! an echo fallback quoting a truncated prefix of the input.

use rand::Rng;

use super::rules::RuleSet;

/// Longest prefix of the incoming text echoed by the fallback reply
const ECHO_PREFIX_CHARS: usize = 50;

/// Rule-based classifier. Pure over (text, rule table, random source).
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: RuleSet,
}

impl Classifier {
    /// Create a classifier over a compiled rule table
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Produce a reply for `text`. Always returns a string, including for
    /// empty or whitespace-only input.
    pub fn classify<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> String {
        if let Some(rule) = self.rules.first_match(text) {
            let replies = rule.replies();
            let index = rng.gen_range(0..replies.len());
            return replies[index].clone();
        }
        fallback_reply(text)
    }

    /// The rule table backing this classifier
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

/// Echo fallback for text no rule matches.
fn fallback_reply(text: &str) -> String {
    let prefix: String = text.chars().take(ECHO_PREFIX_CHARS).collect();
    let marker = if text.chars().count() > ECHO_PREFIX_CHARS {
        "..."
    } else {
        ""
    };
    format!(
        "Thanks for your message! I received: \"{}{}\". I'll get back to you shortly! 📩",
        prefix, marker
    )
}
