//! Regex entity extraction from inbound messages.
//!
//! Runs on every message regardless of how the intent was decided, so the
//! conversation log and downstream agents always have the same entity view.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b").unwrap());

static ORG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:from|at)\s+((?:[A-Z][A-Za-z0-9&]*)(?:\s+[A-Z][A-Za-z0-9&]*)*)").unwrap()
});

// "for X" often names a person ("a proposal for John"), so it only counts
// as an organization when no from/at mention exists.
static ORG_FOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfor\s+((?:[A-Z][A-Za-z0-9&]*)(?:\s+[A-Z][A-Za-z0-9&]*)*)").unwrap()
});

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s\-()]{7,}\d").unwrap());

static BUDGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s*\d[\d,]*(?:\.\d+)?(?:\s*[km])?\b|\b\d[\d,]*\s*[km]\b").unwrap()
});

static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b
        | \b(?:mon|tues?|wed|thur?s?|fri|sat|sun)\b
        | \b(?:today|tomorrow|next\s+week|this\s+week)\b
        | \b\d{1,2}:\d{2}\s*(?:am|pm)?\b
        | \b\d{1,2}\s*(?:am|pm)\b
        | \bat\s+\d{1,2}\b
        | \b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
    )
    .unwrap()
});

/// Entities extracted from a user message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// Person names mentioned.
    #[serde(default)]
    pub names: Vec<String>,
    /// Company/organization names.
    #[serde(default)]
    pub organizations: Vec<String>,
    /// Date/time mentions.
    #[serde(default)]
    pub dates_times: Vec<String>,
    /// Budget or money amounts.
    #[serde(default)]
    pub budget_amounts: Vec<String>,
    /// Emails, phone numbers.
    #[serde(default)]
    pub contact_info: Vec<String>,
}

impl ExtractedEntities {
    /// Extract entities from raw message text.
    pub fn extract(text: &str) -> Self {
        let mut org_spans: Vec<(usize, usize)> = Vec::new();
        let mut organizations: Vec<String> = Vec::new();
        for captures in ORG_RE.captures_iter(text) {
            if let Some(m) = captures.get(1) {
                org_spans.push((m.start(), m.end()));
                organizations.push(m.as_str().trim().to_string());
            }
        }
        if organizations.is_empty() {
            for captures in ORG_FOR_RE.captures_iter(text) {
                if let Some(m) = captures.get(1) {
                    org_spans.push((m.start(), m.end()));
                    organizations.push(m.as_str().trim().to_string());
                }
            }
        }

        // A capitalized pair inside an organization mention ("Acme Corp")
        // is the company, not a person.
        let names = NAME_RE
            .find_iter(text)
            .filter(|m| {
                !org_spans
                    .iter()
                    .any(|&(start, end)| m.start() < end && m.end() > start)
            })
            .map(|m| m.as_str().to_string())
            .collect();

        let dates_times = DATE_TIME_RE
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();

        let budget_amounts = BUDGET_RE
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();

        let mut contact_info: Vec<String> = EMAIL_RE
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        contact_info.extend(PHONE_RE.find_iter(text).map(|m| m.as_str().to_string()));

        Self {
            names,
            organizations,
            dates_times,
            budget_amounts,
            contact_info,
        }
    }

    /// Whether the message carries any date/time mention.
    pub fn has_temporal_signal(&self) -> bool {
        !self.dates_times.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_lead_style_message() {
        let entities =
            ExtractedEntities::extract("John Smith from Acme Corp wants a PoC, budget 10k");
        assert_eq!(entities.names, vec!["John Smith"]);
        assert_eq!(entities.organizations, vec!["Acme Corp"]);
        assert_eq!(entities.budget_amounts, vec!["10k"]);
    }

    #[test]
    fn extracts_contact_info() {
        let entities =
            ExtractedEntities::extract("Reach me at jane@acme.com or +1 555-123-4567 please");
        assert!(entities.contact_info.contains(&"jane@acme.com".to_string()));
        assert!(entities.contact_info.iter().any(|c| c.contains("555")));
    }

    #[test]
    fn extracts_scheduling_mentions() {
        let entities = ExtractedEntities::extract("Schedule demo next Wednesday at 11am");
        assert!(entities.has_temporal_signal());
        assert!(
            entities
                .dates_times
                .iter()
                .any(|d| d.eq_ignore_ascii_case("wednesday"))
        );
        assert!(entities.dates_times.iter().any(|d| d.contains("11")));
    }

    #[test]
    fn company_mention_is_not_a_person() {
        let entities = ExtractedEntities::extract("Draft a proposal for Deep Blue at Acme Corp");
        assert_eq!(entities.organizations, vec!["Acme Corp"]);
        assert_eq!(entities.names, vec!["Deep Blue"]);
    }

    #[test]
    fn for_phrase_is_an_organization_fallback() {
        let entities = ExtractedEntities::extract("Draft a proposal for Acme");
        assert_eq!(entities.organizations, vec!["Acme"]);

        // from/at mentions outrank the "for" phrase.
        let entities = ExtractedEntities::extract("Draft a proposal for John Smith at Acme Corp");
        assert_eq!(entities.organizations, vec!["Acme Corp"]);
        assert_eq!(entities.names, vec!["John Smith"]);
    }

    #[test]
    fn abbreviated_weekday_and_bare_hour_are_temporal() {
        let entities = ExtractedEntities::extract("Schedule demo next Wed at 11");
        assert!(entities.has_temporal_signal());
        assert!(
            entities
                .dates_times
                .iter()
                .any(|d| d.eq_ignore_ascii_case("wed"))
        );
    }

    #[test]
    fn extracts_dollar_budget() {
        let entities = ExtractedEntities::extract("They have $25,000 allocated");
        assert_eq!(entities.budget_amounts, vec!["$25,000"]);
    }

    #[test]
    fn empty_message_has_no_entities() {
        let entities = ExtractedEntities::extract("ok");
        assert_eq!(entities, ExtractedEntities::default());
        assert!(!entities.has_temporal_signal());
    }
}
