//! Dealflow agent: lead capture, proposal copy, next-step parsing, and
//! deal status updates.
//!
//! LLM extraction always has a deterministic fallback, so a bad model
//! response degrades output quality instead of failing the request.

pub mod lead;
pub mod proposal;
pub mod status;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DealflowError, ScheduleError};
use crate::intent::extract_json_object;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::schedule::{self, ParsedSchedule};
use crate::store::{Database, LeadRecord, LeadStatus};

pub use lead::ParsedLead;
pub use proposal::ProposalCopy;
pub use status::{ReasonCategory, StatusClassification, StatusLabel};

const PARSE_TEMPERATURE: f64 = 0.0;
const PARSE_MAX_TOKENS: u64 = 300;

const PROPOSAL_TEMPERATURE: f64 = 0.7;
const PROPOSAL_MAX_TOKENS: u64 = 600;

const LEAD_PARSE_PROMPT: &str = "\
Extract lead information from the user's message. Respond with ONLY a JSON \
object with fields: name, company, intent, budget, notes. Use null for \
anything not mentioned. Do not invent values.";

/// Sales-pipeline agent.
pub struct DealflowAgent {
    llm: Arc<dyn LlmProvider>,
    db: Arc<dyn Database>,
}

impl DealflowAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, db: Arc<dyn Database>) -> Self {
        Self { llm, db }
    }

    /// Parse, enrich, and persist a new lead from free-form text.
    ///
    /// Fails with [`DealflowError::EmptyLead`] when neither a name nor a
    /// company can be found.
    pub async fn new_lead(
        &self,
        raw: &str,
        request_id: &str,
    ) -> Result<LeadRecord, DealflowError> {
        let parsed = self.parse_lead(raw).await;
        if parsed.is_empty() {
            return Err(DealflowError::EmptyLead);
        }

        let domain = parsed
            .company
            .as_deref()
            .and_then(lead::guess_company_domain);
        let quality = lead::quality_score(&parsed);

        let now = Utc::now();
        let record = LeadRecord {
            id: Uuid::new_v4(),
            request_id: request_id.to_string(),
            name: parsed.name.unwrap_or_default(),
            company: parsed.company.unwrap_or_default(),
            intent: parsed.intent.unwrap_or_else(|| "unspecified".to_string()),
            budget: parsed.budget,
            normalized_company_domain: domain,
            quality_score: quality,
            notes: parsed.notes,
            status: LeadStatus::New,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_lead(&record).await?;
        info!(
            lead_id = %record.id,
            company = %record.company,
            quality = record.quality_score,
            "Captured new lead"
        );
        Ok(record)
    }

    /// Generate proposal copy from free-form text describing the deal.
    pub async fn proposal_copy(&self, raw: &str) -> Result<ProposalCopy, DealflowError> {
        let parsed = self.parse_lead(raw).await;
        self.proposal_for(&parsed).await
    }

    /// Generate proposal copy from already-known lead fields.
    pub async fn proposal_for(&self, parsed: &ParsedLead) -> Result<ProposalCopy, DealflowError> {
        let prompt = format!(
            "Generate a professional business proposal for:\n\
             Company: {}\n\
             Contact: {}\n\
             Requirement: {}\n\
             Budget: {}\n\n\
             Produce:\n\
             Title: a compelling one-line title\n\
             Summary: a 120-160 word executive summary\n\
             Bullet points: 3-5 dashes highlighting our value proposition",
            parsed.company.as_deref().unwrap_or("Unknown"),
            parsed.name.as_deref().unwrap_or("Unknown"),
            parsed.intent.as_deref().unwrap_or("General business needs"),
            parsed.budget.as_deref().unwrap_or("To be discussed"),
        );

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(PROPOSAL_TEMPERATURE)
            .with_max_tokens(PROPOSAL_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(response) => match proposal::parse_proposal_response(&response.content) {
                Some(copy) => Ok(copy),
                None => {
                    warn!("Unusable proposal response, using template");
                    Ok(proposal::template_proposal(parsed))
                }
            },
            Err(error) => {
                warn!(%error, "Proposal generation failed, using template");
                Ok(proposal::template_proposal(parsed))
            }
        }
    }

    /// Parse a next-step scheduling request.
    pub fn nextstep_parse(&self, raw: &str) -> Result<ParsedSchedule, ScheduleError> {
        schedule::parse_schedule(raw, Utc::now())
    }

    /// Classify a deal status update.
    pub fn status_classify(&self, raw: &str) -> StatusClassification {
        status::classify_status(raw)
    }

    /// Classify a status update and apply it to the most recent lead for
    /// `company`, when one exists.
    pub async fn apply_status_update(
        &self,
        raw: &str,
        company: &str,
    ) -> Result<(StatusClassification, Option<LeadRecord>), DealflowError> {
        let classification = status::classify_status(raw);
        let Some(record) = self.db.latest_lead_for_company(company).await? else {
            return Ok((classification, None));
        };

        let new_status = match classification.label {
            StatusLabel::Won => LeadStatus::Won,
            StatusLabel::Lost => LeadStatus::Lost,
            StatusLabel::OnHold => LeadStatus::OnHold,
        };
        self.db.update_lead_status(record.id, new_status).await?;
        info!(lead_id = %record.id, status = new_status.as_str(), "Updated lead status");

        let updated = self.db.get_lead(record.id).await?;
        Ok((classification, updated))
    }

    /// LLM extraction with regex fallback. Never fails: an unusable model
    /// response falls back to the deterministic parser.
    async fn parse_lead(&self, raw: &str) -> ParsedLead {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(LEAD_PARSE_PROMPT),
            ChatMessage::user(raw),
        ])
        .with_temperature(PARSE_TEMPERATURE)
        .with_max_tokens(PARSE_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(response) => {
                let parsed = extract_json_object(&response.content)
                    .and_then(|json| serde_json::from_str::<ParsedLead>(json).ok());
                match parsed {
                    Some(parsed) => parsed,
                    None => {
                        warn!("Unparseable lead extraction, using regex fallback");
                        lead::fallback_parse(raw)
                    }
                }
            }
            Err(error) => {
                warn!(%error, "Lead extraction failed, using regex fallback");
                lead::fallback_parse(raw)
            }
        }
    }
}
