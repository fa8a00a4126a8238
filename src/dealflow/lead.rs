//! Lead parsing and enrichment.
//!
//! The LLM extracts structured fields from free-form text; when its output
//! is unparseable the regex fallback here takes over. Enrichment adds a
//! guessed company domain and a completeness-based quality score.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][a-z]+\s+[A-Z][a-z]+)\b").unwrap());

static COMPANY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:from|at)\s+([A-Z][A-Za-z&]*(?:\s+[A-Z][A-Za-z&]*)*)").unwrap()
});

static BUDGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s*\d[\d,]*(?:\.\d+)?(?:\s*[km])?\b|\b\d[\d,]*\s*[km]\b").unwrap()
});

static INTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(PoC|proof of concept|demo|trial|pilot|project|solution)\b").unwrap()
});

static DOMAIN_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(inc|llc|ltd|corp|corporation)\b").unwrap());

/// Lead fields extracted from raw text, before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParsedLead {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ParsedLead {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.company.is_none()
    }
}

/// Regex fallback when the LLM extraction is unusable.
pub fn fallback_parse(text: &str) -> ParsedLead {
    ParsedLead {
        name: NAME_RE
            .captures(text)
            .map(|c| c[1].trim().to_string()),
        company: COMPANY_RE
            .captures(text)
            .map(|c| c[1].trim().to_string()),
        intent: INTENT_RE
            .captures(text)
            .map(|c| c[1].trim().to_string()),
        budget: BUDGET_RE
            .find(text)
            .map(|m| m.as_str().trim().to_string()),
        notes: None,
    }
}

/// Guess a company web domain: lowercase, corporate suffixes stripped,
/// non-alphanumerics removed, ".com" appended.
pub fn guess_company_domain(company: &str) -> Option<String> {
    let lowered = company.to_lowercase();
    let stripped = DOMAIN_SUFFIX_RE.replace_all(&lowered, "");
    let candidate: String = stripped.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if candidate.is_empty() {
        None
    } else {
        Some(format!("{candidate}.com"))
    }
}

/// Completeness-based quality score in [0, 1].
pub fn quality_score(lead: &ParsedLead) -> f32 {
    let mut score = 0.0;
    if lead.name.is_some() {
        score += 0.2;
    }
    if lead.company.is_some() {
        score += 0.3;
    }
    if lead.intent.is_some() {
        score += 0.3;
    }
    if lead.budget.is_some() {
        score += 0.2;
    }
    f32::min(1.0, score)
}
