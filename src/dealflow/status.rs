//! Deterministic deal status classification.
//!
//! Keyword-driven: the label comes from explicit win/loss language and the
//! reason category from a fixed keyword table, checked in priority order.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reason summaries keep the first 200 characters of the update text.
const MAX_REASON_SUMMARY_CHARS: usize = 200;

static WON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(won|win|signed|accepted|closed[ -]won)\b").unwrap());

static LOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(lost|lose|losing|rejected|declined|closed[ -]lost)\b").unwrap()
});

/// Deal outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Won,
    Lost,
    OnHold,
}

/// Why the deal moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    Budget,
    Timeline,
    Competition,
    Internal,
    Technical,
    Other,
}

/// A classified deal status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusClassification {
    pub label: StatusLabel,
    pub reason_category: ReasonCategory,
    pub reason_summary: String,
}

/// Reason keyword table, checked in order; first hit wins.
const REASON_KEYWORDS: &[(ReasonCategory, &[&str])] = &[
    (
        ReasonCategory::Budget,
        &["budget", "cost", "price", "money", "expensive"],
    ),
    (
        ReasonCategory::Timeline,
        &["timeline", "schedule", "time", "deadline", "urgent"],
    ),
    (
        ReasonCategory::Competition,
        &["competitor", "competition", "alternative", "other vendor"],
    ),
    (
        ReasonCategory::Internal,
        &["internal", "approval", "decision", "team", "management"],
    ),
    (
        ReasonCategory::Technical,
        &["technical", "requirement", "feature", "integration"],
    ),
];

/// Classify a status update from its text alone.
pub fn classify_status(text: &str) -> StatusClassification {
    let label = if WON_RE.is_match(text) {
        StatusLabel::Won
    } else if LOST_RE.is_match(text) {
        StatusLabel::Lost
    } else {
        StatusLabel::OnHold
    };

    let lower = text.to_lowercase();
    let reason_category = REASON_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(ReasonCategory::Other);

    StatusClassification {
        label,
        reason_category,
        reason_summary: summary_of(text),
    }
}

fn summary_of(text: &str) -> String {
    let text = text.trim();
    if text.len() <= MAX_REASON_SUMMARY_CHARS {
        return text.to_string();
    }
    let mut end = MAX_REASON_SUMMARY_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn won_with_budget_reason() {
        let result = classify_status("We won the Acme deal, they loved the price point");
        assert_eq!(result.label, StatusLabel::Won);
        assert_eq!(result.reason_category, ReasonCategory::Budget);
    }

    #[test]
    fn lost_to_competition() {
        let result = classify_status("Lost the Globex account, they went with a competitor");
        assert_eq!(result.label, StatusLabel::Lost);
        assert_eq!(result.reason_category, ReasonCategory::Competition);
    }

    #[test]
    fn hold_is_the_default_label() {
        let result = classify_status("Deal paused pending internal approval on their side");
        assert_eq!(result.label, StatusLabel::OnHold);
        assert_eq!(result.reason_category, ReasonCategory::Internal);
    }

    #[test]
    fn unknown_reason_is_other() {
        let result = classify_status("They signed today!");
        assert_eq!(result.label, StatusLabel::Won);
        assert_eq!(result.reason_category, ReasonCategory::Other);
    }

    #[test]
    fn technical_reason() {
        let result = classify_status("On hold until the integration requirement is scoped");
        assert_eq!(result.label, StatusLabel::OnHold);
        assert_eq!(result.reason_category, ReasonCategory::Technical);
    }

    #[test]
    fn summary_is_truncated() {
        let text = "lost because ".repeat(50);
        let result = classify_status(&text);
        assert_eq!(result.reason_summary.len(), 200);
    }
}
