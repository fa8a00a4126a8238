//! Pre-LLM rules for fast intent routing.
//!
//! Runs before the LLM classification step to short-circuit obvious cases:
//! - messages with attachments → `knowledge_qa` (ingestion path)
//! - bare greetings/thanks → `smalltalk`
//!
//! If a rule matches, the LLM call is skipped entirely.

use regex::Regex;

use crate::intent::{Intent, IntentClassification};

/// A single fast-path rule with a compiled regex.
#[derive(Debug, Clone)]
struct FastRule {
    regex: Regex,
    intent: Intent,
    confidence: f32,
    reasoning: &'static str,
}

/// Pre-LLM rules engine for intent routing.
pub struct IntentRules {
    rules: Vec<FastRule>,
}

impl IntentRules {
    /// Create the default rule set.
    pub fn default_rules() -> Self {
        let rules = vec![
            // Bare greeting / pleasantry, nothing else in the message
            FastRule {
                regex: Regex::new(
                    r"(?i)^\s*(hi|hello|hey|yo|thanks|thank you|good (morning|afternoon|evening)|how are you\??)[\s!.,]*$",
                )
                .unwrap(),
                intent: Intent::Smalltalk,
                confidence: 0.95,
                reasoning: "bare greeting or pleasantry",
            },
        ];
        Self { rules }
    }

    /// Create an empty rules engine (for testing).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Evaluate a message against the rules. `None` means fall through to
    /// LLM classification.
    pub fn evaluate(&self, message: &str, has_attachments: bool) -> Option<IntentClassification> {
        if has_attachments {
            return Some(IntentClassification::fast(
                Intent::KnowledgeQa,
                0.9,
                "message contains file attachments, routing for ingestion",
                message,
            ));
        }

        for rule in &self.rules {
            if rule.regex.is_match(message) {
                return Some(IntentClassification::fast(
                    rule.intent,
                    rule.confidence,
                    rule.reasoning,
                    message,
                ));
            }
        }
        None
    }
}

impl Default for IntentRules {
    fn default() -> Self {
        Self::default_rules()
    }
}
