//! Unified `Database` trait: a single async interface for all persistence.
//!
//! Covers the conversation log, CRM leads, the knowledge chunk store, and
//! the effects ledger that backs exactly-once semantics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::knowledge::Citation;

/// One row of the append-only conversation log.
#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// User identifier (phone number, handle).
    pub user: String,
    /// Intent label the router decided on.
    pub intent: String,
    /// Raw inbound text.
    pub input: String,
    /// Text returned to the user (empty when the turn errored).
    pub output: String,
    pub confidence: f32,
    pub citations: Vec<Citation>,
    /// Error message, when the dispatched operation failed.
    pub error: Option<String>,
}

/// Deal status of a CRM lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Won,
    Lost,
    OnHold,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
            LeadStatus::OnHold => "on_hold",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "won" => LeadStatus::Won,
            "lost" => LeadStatus::Lost,
            "on_hold" => LeadStatus::OnHold,
            _ => LeadStatus::New,
        }
    }
}

/// A persisted CRM lead row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: Uuid,
    /// Request that created this lead (idempotency key).
    pub request_id: String,
    pub name: String,
    pub company: String,
    pub intent: String,
    pub budget: Option<String>,
    pub normalized_company_domain: Option<String>,
    pub quality_score: f32,
    pub notes: Option<String>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An embedded chunk of an ingested document.
#[derive(Debug, Clone)]
pub struct KnowledgeChunk {
    /// `{document_id}_chunk_{ordinal}`.
    pub id: String,
    pub document_id: String,
    /// Document title for citations.
    pub title: String,
    /// Position of the chunk within its document.
    pub ordinal: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub ingested_at: DateTime<Utc>,
}

impl KnowledgeChunk {
    pub fn chunk_id(document_id: &str, ordinal: i64) -> String {
        format!("{document_id}_chunk_{ordinal}")
    }
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Conversation log ────────────────────────────────────────────

    /// Append one conversation-log row.
    async fn append_conversation(&self, row: &ConversationRow) -> Result<(), DatabaseError>;

    /// Most recent rows for a user, newest first, up to `limit`.
    async fn recent_conversations(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<ConversationRow>, DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert a new lead.
    async fn insert_lead(&self, lead: &LeadRecord) -> Result<(), DatabaseError>;

    /// Get a lead by ID.
    async fn get_lead(&self, id: Uuid) -> Result<Option<LeadRecord>, DatabaseError>;

    /// Most recently created lead whose company matches (case-insensitive).
    async fn latest_lead_for_company(
        &self,
        company: &str,
    ) -> Result<Option<LeadRecord>, DatabaseError>;

    /// Update a lead's status.
    async fn update_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<(), DatabaseError>;

    // ── Knowledge chunks ────────────────────────────────────────────

    /// Replace all chunks for a document (re-ingestion overwrites).
    async fn replace_document_chunks(
        &self,
        document_id: &str,
        chunks: &[KnowledgeChunk],
    ) -> Result<(), DatabaseError>;

    /// All stored chunks (retrieval ranks them in process).
    async fn all_chunks(&self) -> Result<Vec<KnowledgeChunk>, DatabaseError>;

    // ── Effects ledger ──────────────────────────────────────────────

    /// Look up a recorded outcome for (request, operation).
    async fn recorded_effect(
        &self,
        request_id: &str,
        operation: &str,
    ) -> Result<Option<String>, DatabaseError>;

    /// Record an outcome for (request, operation). First write wins; a
    /// duplicate write is a no-op so concurrent retries stay exactly-once.
    async fn record_effect(
        &self,
        request_id: &str,
        operation: &str,
        outcome_json: &str,
    ) -> Result<(), DatabaseError>;
}
