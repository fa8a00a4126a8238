//! Knowledge agent: document ingestion and retrieval-grounded answers.
//!
//! Ingestion chunks a document, embeds the chunks, and stores them.
//! Answering embeds the question, ranks stored chunks by cosine similarity,
//! and asks the LLM to answer strictly from the retrieved context with
//! numbered citations.

pub mod chunker;
pub mod retrieval;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::KnowledgeError;
use crate::knowledge::chunker::{Chunker, approx_tokens};
use crate::knowledge::retrieval::ScoredChunk;
use crate::llm::{ChatMessage, CompletionRequest, Embedder, LlmProvider};
use crate::store::{Database, KnowledgeChunk};

const ANSWER_TEMPERATURE: f64 = 0.2;
const ANSWER_MAX_TOKENS: u64 = 800;

/// A chunk shorter than this contributes nothing to answer confidence.
const SUBSTANTIVE_CHUNK_CHARS: usize = 100;
const CONFIDENCE_PER_CHUNK: f32 = 0.2;
const MAX_CONFIDENCE: f32 = 0.9;

const SNIPPET_CHARS: usize = 160;

const NO_KNOWLEDGE_ANSWER: &str =
    "I couldn't find any relevant information in the knowledge base for that question.";

const CLARIFICATION_NOTE: &str =
    "\n\nNote: I'm not fully confident in this answer. Could you rephrase or \
     add more detail to your question?";

const ANSWER_SYSTEM_PROMPT: &str = "\
You are a knowledge assistant for a sales team. Answer the question using \
ONLY the numbered context passages below. Cite passages inline as [1], [2], \
etc. If the context does not contain the answer, say so plainly instead of \
guessing.";

/// A source reference attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Title of the source document.
    pub title: String,
    pub document_id: String,
    /// Leading excerpt of the cited chunk.
    pub snippet: String,
}

/// Result of answering a question against the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
}

/// Result of ingesting a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub document_id: String,
    pub chunk_count: usize,
    pub approx_tokens: usize,
}

/// Retrieval-augmented knowledge agent.
pub struct KnowledgeAgent {
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    db: Arc<dyn Database>,
    chunker: Chunker,
    top_k: usize,
    low_confidence_threshold: f32,
}

impl KnowledgeAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        db: Arc<dyn Database>,
        chunker: Chunker,
        top_k: usize,
        low_confidence_threshold: f32,
    ) -> Self {
        Self {
            llm,
            embedder,
            db,
            chunker,
            top_k,
            low_confidence_threshold,
        }
    }

    /// Ingest a document: chunk, embed, and store. Re-ingesting the same
    /// document id replaces its chunks.
    pub async fn ingest(
        &self,
        document_id: &str,
        title: &str,
        text: &str,
    ) -> Result<IngestionResult, KnowledgeError> {
        let pieces = self.chunker.split(text);
        if pieces.is_empty() {
            return Err(KnowledgeError::EmptyDocument {
                document_id: document_id.to_string(),
            });
        }

        let embeddings = self.embedder.embed(&pieces).await?;
        if embeddings.len() != pieces.len() {
            return Err(KnowledgeError::Retrieval(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                pieces.len()
            )));
        }

        let now = Utc::now();
        let chunks: Vec<KnowledgeChunk> = pieces
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(ordinal, (text, embedding))| KnowledgeChunk {
                id: KnowledgeChunk::chunk_id(document_id, ordinal as i64),
                document_id: document_id.to_string(),
                title: title.to_string(),
                ordinal: ordinal as i64,
                text: text.clone(),
                embedding,
                ingested_at: now,
            })
            .collect();

        self.db.replace_document_chunks(document_id, &chunks).await?;

        let tokens = approx_tokens(&pieces);
        info!(
            document_id,
            chunks = chunks.len(),
            approx_tokens = tokens,
            "Document ingested"
        );

        Ok(IngestionResult {
            document_id: document_id.to_string(),
            chunk_count: chunks.len(),
            approx_tokens: tokens,
        })
    }

    /// Answer a question from the stored knowledge base.
    pub async fn ask(&self, question: &str) -> Result<KnowledgeAnswer, KnowledgeError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(KnowledgeError::EmptyQuery);
        }

        let chunks = self.db.all_chunks().await?;
        if chunks.is_empty() {
            warn!("Knowledge base is empty");
            return Ok(KnowledgeAnswer {
                answer: NO_KNOWLEDGE_ANSWER.to_string(),
                citations: Vec::new(),
                confidence: 0.1,
            });
        }

        let query_embedding = self.embedder.embed_query(question).await?;
        let ranked = retrieval::rank(chunks, &query_embedding, self.top_k);

        let confidence = self.score_confidence(&ranked);
        let context = build_context(&ranked);

        let request = CompletionRequest::new(vec![
            ChatMessage::system(format!("{ANSWER_SYSTEM_PROMPT}\n\n{context}")),
            ChatMessage::user(question),
        ])
        .with_temperature(ANSWER_TEMPERATURE)
        .with_max_tokens(ANSWER_MAX_TOKENS);

        let response = self.llm.complete(request).await?;

        let mut answer = response.content.trim().to_string();
        if confidence < self.low_confidence_threshold {
            answer.push_str(CLARIFICATION_NOTE);
        }

        info!(
            retrieved = ranked.len(),
            confidence,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Answered knowledge question"
        );

        Ok(KnowledgeAnswer {
            answer,
            citations: ranked.iter().map(|s| citation_for(&s.chunk)).collect(),
            confidence,
        })
    }

    /// Confidence grows with the number of substantive retrieved chunks,
    /// capped well below certainty.
    fn score_confidence(&self, ranked: &[ScoredChunk]) -> f32 {
        let substantive = ranked
            .iter()
            .filter(|s| s.chunk.text.len() > SUBSTANTIVE_CHUNK_CHARS)
            .count();
        (CONFIDENCE_PER_CHUNK * substantive as f32).min(MAX_CONFIDENCE)
    }
}

fn build_context(ranked: &[ScoredChunk]) -> String {
    let mut context = String::from("Context passages:\n");
    for (i, scored) in ranked.iter().enumerate() {
        context.push_str(&format!(
            "[{}] ({}) {}\n",
            i + 1,
            scored.chunk.title,
            scored.chunk.text
        ));
    }
    context
}

fn citation_for(chunk: &KnowledgeChunk) -> Citation {
    let snippet = if chunk.text.len() > SNIPPET_CHARS {
        let mut end = SNIPPET_CHARS;
        while !chunk.text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &chunk.text[..end])
    } else {
        chunk.text.clone()
    };
    Citation {
        title: chunk.title.clone(),
        document_id: chunk.document_id.clone(),
        snippet,
    }
}
