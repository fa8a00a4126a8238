//! Proposal copy generation: response parsing and the deterministic
//! template fallback used when the LLM output is unusable.

use serde::{Deserialize, Serialize};

use crate::dealflow::lead::ParsedLead;

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_SUMMARY_CHARS: usize = 500;
pub const MIN_BULLETS: usize = 3;
pub const MAX_BULLETS: usize = 5;

/// Generated proposal copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalCopy {
    /// At most 100 characters.
    pub title: String,
    /// At most 500 characters.
    pub summary_blurb: String,
    /// Between 3 and 5 entries.
    pub bullet_points: Vec<String>,
}

/// Parse a sectioned LLM response into proposal copy. Returns `None` when
/// the response yields no usable summary or too few bullets, in which case
/// the caller should fall back to [`template_proposal`].
pub fn parse_proposal_response(content: &str) -> Option<ProposalCopy> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Title,
        Summary,
        Bullets,
    }

    let mut title = String::new();
    let mut summary = String::new();
    let mut bullets: Vec<String> = Vec::new();
    let mut section = Section::None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();

        if lower.contains("title") || line.starts_with("1.") {
            section = Section::Title;
            if let Some((_, value)) = line.split_once(':') {
                title = value.trim().to_string();
            }
        } else if lower.contains("summary") || line.starts_with("2.") {
            section = Section::Summary;
            if let Some((_, value)) = line.split_once(':') {
                summary.push_str(value.trim());
                summary.push(' ');
            }
        } else if lower.contains("bullet") || lower.contains("point") || line.starts_with("3.") {
            section = Section::Bullets;
        } else if let Some(item) = line.strip_prefix('-').or_else(|| line.strip_prefix('•')) {
            // Bulleted lines count even without a "Bullet points:" header.
            section = Section::Bullets;
            bullets.push(item.trim().to_string());
        } else {
            match section {
                Section::Title if title.is_empty() => title = line.to_string(),
                Section::Summary => {
                    summary.push_str(line);
                    summary.push(' ');
                }
                _ => {}
            }
        }
    }

    bullets.retain(|b| !b.is_empty());
    bullets.truncate(MAX_BULLETS);

    let summary = summary.trim().to_string();
    if summary.is_empty() || bullets.len() < MIN_BULLETS {
        return None;
    }

    Some(ProposalCopy {
        title: clamp(
            if title.is_empty() {
                "Custom Business Proposal"
            } else {
                &title
            },
            MAX_TITLE_CHARS,
        ),
        summary_blurb: clamp(&summary, MAX_SUMMARY_CHARS),
        bullet_points: bullets,
    })
}

/// Deterministic proposal built from whatever lead fields are known.
pub fn template_proposal(lead: &ParsedLead) -> ProposalCopy {
    let company = lead.company.as_deref().unwrap_or("your company");
    let intent = lead.intent.as_deref().unwrap_or("your business needs");
    let budget = lead.budget.as_deref().unwrap_or("to be discussed");

    ProposalCopy {
        title: clamp(&format!("Proposal for {company}"), MAX_TITLE_CHARS),
        summary_blurb: clamp(
            &format!(
                "Thank you for your interest. This proposal outlines how we can \
                 support {company} with {intent}. We have structured our approach \
                 around your goals and a budget of {budget}, and we look forward \
                 to discussing the details with you."
            ),
            MAX_SUMMARY_CHARS,
        ),
        bullet_points: vec![
            format!("Tailored solution for {intent}"),
            "Dedicated onboarding and support throughout the engagement".to_string(),
            format!("Transparent pricing aligned with a budget of {budget}"),
        ],
    }
}

fn clamp(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
