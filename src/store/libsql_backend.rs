//! libSQL backend for the async `Database` trait.
//!
//! Supports local file and in-memory databases. Chunk embeddings are stored
//! as little-endian f32 BLOBs.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    ConversationRow, Database, KnowledgeChunk, LeadRecord, LeadStatus,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run(&backend.conn).await?;
        Ok(backend)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Encode an embedding as a little-endian f32 BLOB.
pub(crate) fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 BLOB back into an embedding.
pub(crate) fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

fn row_to_conversation(row: &libsql::Row) -> Result<ConversationRow, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err)?;
    let timestamp_str: String = row.get(1).map_err(query_err)?;
    let citations_str: String = row.get(7).map_err(query_err)?;
    Ok(ConversationRow {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("conversation id: {e}")))?,
        timestamp: parse_datetime(&timestamp_str),
        user: row.get(2).map_err(query_err)?,
        intent: row.get(3).map_err(query_err)?,
        input: row.get(4).map_err(query_err)?,
        output: row.get(5).map_err(query_err)?,
        confidence: row.get::<f64>(6).map_err(query_err)? as f32,
        citations: serde_json::from_str(&citations_str)
            .map_err(|e| DatabaseError::Serialization(format!("citations: {e}")))?,
        error: row.get(8).ok(),
    })
}

fn row_to_lead(row: &libsql::Row) -> Result<LeadRecord, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err)?;
    let status_str: String = row.get(9).map_err(query_err)?;
    let created_str: String = row.get(10).map_err(query_err)?;
    let updated_str: String = row.get(11).map_err(query_err)?;
    Ok(LeadRecord {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("lead id: {e}")))?,
        request_id: row.get(1).map_err(query_err)?,
        name: row.get(2).map_err(query_err)?,
        company: row.get(3).map_err(query_err)?,
        intent: row.get(4).map_err(query_err)?,
        budget: row.get(5).ok(),
        normalized_company_domain: row.get(6).ok(),
        quality_score: row.get::<f64>(7).map_err(query_err)? as f32,
        notes: row.get(8).ok(),
        status: LeadStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_chunk(row: &libsql::Row) -> Result<KnowledgeChunk, DatabaseError> {
    let blob: Vec<u8> = row.get(5).map_err(query_err)?;
    let ingested_str: String = row.get(6).map_err(query_err)?;
    Ok(KnowledgeChunk {
        id: row.get(0).map_err(query_err)?,
        document_id: row.get(1).map_err(query_err)?,
        title: row.get(2).map_err(query_err)?,
        ordinal: row.get(3).map_err(query_err)?,
        text: row.get(4).map_err(query_err)?,
        embedding: blob_to_embedding(&blob),
        ingested_at: parse_datetime(&ingested_str),
    })
}

const LEAD_COLUMNS: &str = "id, request_id, name, company, intent, budget, \
    normalized_company_domain, quality_score, notes, status, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run(&self.conn).await
    }

    // ── Conversation log ────────────────────────────────────────────

    async fn append_conversation(&self, row: &ConversationRow) -> Result<(), DatabaseError> {
        let citations = serde_json::to_string(&row.citations)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO conversation_log \
                 (id, timestamp, user, intent, input, output, confidence, citations, error) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    row.id.to_string(),
                    row.timestamp.to_rfc3339(),
                    row.user.clone(),
                    row.intent.clone(),
                    row.input.clone(),
                    row.output.clone(),
                    row.confidence as f64,
                    citations,
                    row.error.clone(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn recent_conversations(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<ConversationRow>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, timestamp, user, intent, input, output, confidence, citations, error \
                 FROM conversation_log WHERE user = ?1 \
                 ORDER BY timestamp DESC LIMIT ?2",
                params![user, limit as i64],
            )
            .await
            .map_err(query_err)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            result.push(row_to_conversation(&row)?);
        }
        Ok(result)
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                &format!("INSERT INTO leads ({LEAD_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
                params![
                    lead.id.to_string(),
                    lead.request_id.clone(),
                    lead.name.clone(),
                    lead.company.clone(),
                    lead.intent.clone(),
                    lead.budget.clone(),
                    lead.normalized_company_domain.clone(),
                    lead.quality_score as f64,
                    lead.notes.clone(),
                    lead.status.as_str(),
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<LeadRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    async fn latest_lead_for_company(
        &self,
        company: &str,
    ) -> Result<Option<LeadRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads \
                     WHERE LOWER(company) = LOWER(?1) \
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![company],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<(), DatabaseError> {
        let updated = self
            .conn
            .execute(
                "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(query_err)?;
        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ── Knowledge chunks ────────────────────────────────────────────

    async fn replace_document_chunks(
        &self,
        document_id: &str,
        chunks: &[KnowledgeChunk],
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("begin transaction: {e}")))?;

        tx.execute(
            "DELETE FROM knowledge_chunks WHERE document_id = ?1",
            params![document_id],
        )
        .await
        .map_err(query_err)?;

        for chunk in chunks {
            tx.execute(
                "INSERT INTO knowledge_chunks \
                 (id, document_id, title, ordinal, text, embedding, ingested_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    chunk.id.clone(),
                    chunk.document_id.clone(),
                    chunk.title.clone(),
                    chunk.ordinal,
                    chunk.text.clone(),
                    embedding_to_blob(&chunk.embedding),
                    chunk.ingested_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("commit: {e}")))?;
        Ok(())
    }

    async fn all_chunks(&self) -> Result<Vec<KnowledgeChunk>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, document_id, title, ordinal, text, embedding, ingested_at \
                 FROM knowledge_chunks ORDER BY document_id, ordinal",
                (),
            )
            .await
            .map_err(query_err)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            result.push(row_to_chunk(&row)?);
        }
        Ok(result)
    }

    // ── Effects ledger ──────────────────────────────────────────────

    async fn recorded_effect(
        &self,
        request_id: &str,
        operation: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT outcome FROM effects WHERE request_id = ?1 AND operation = ?2",
                params![request_id, operation],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row.get(0).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn record_effect(
        &self,
        request_id: &str,
        operation: &str,
        outcome_json: &str,
    ) -> Result<(), DatabaseError> {
        // First write wins: a concurrent retry hitting the primary key is a
        // no-op rather than an error.
        self.conn
            .execute(
                "INSERT OR IGNORE INTO effects (request_id, operation, outcome, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![request_id, operation, outcome_json, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
