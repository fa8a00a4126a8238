//! Configuration types.

use crate::error::ConfigError;

/// Service configuration, populated from environment variables.
#[derive(Debug, Clone)]
pub struct CopilotConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Path to the local libSQL database file.
    pub db_path: String,
    /// Completion model name.
    pub model: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Chunk size for document splitting, in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks, in characters.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per query.
    pub retrieval_top_k: usize,
    /// Below this confidence, answers get a clarification note appended.
    pub low_confidence_threshold: f32,
    /// Optional directory for rolling file logs.
    pub log_dir: Option<String>,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            db_path: "./data/copilot.db".to_string(),
            model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_top_k: 5,
            low_confidence_threshold: 0.3,
            log_dir: None,
        }
    }
}

impl CopilotConfig {
    /// Build configuration from `COPILOT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let chunk_size = parse_env("COPILOT_CHUNK_SIZE", defaults.chunk_size)?;
        let chunk_overlap = parse_env("COPILOT_CHUNK_OVERLAP", defaults.chunk_overlap)?;
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "COPILOT_CHUNK_OVERLAP".to_string(),
                message: format!(
                    "overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
                ),
            });
        }

        Ok(Self {
            bind_addr: env_or("COPILOT_BIND_ADDR", &defaults.bind_addr),
            db_path: env_or("COPILOT_DB_PATH", &defaults.db_path),
            model: env_or("COPILOT_MODEL", &defaults.model),
            embedding_model: env_or("COPILOT_EMBEDDING_MODEL", &defaults.embedding_model),
            chunk_size,
            chunk_overlap,
            retrieval_top_k: parse_env("COPILOT_RETRIEVAL_TOP_K", defaults.retrieval_top_k)?,
            low_confidence_threshold: parse_env(
                "COPILOT_LOW_CONFIDENCE",
                defaults.low_confidence_threshold,
            )?,
            log_dir: std::env::var("COPILOT_LOG_DIR").ok(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CopilotConfig::default();
        assert!(config.chunk_overlap < config.chunk_size);
        assert!(config.retrieval_top_k > 0);
        assert!(config.low_confidence_threshold > 0.0);
    }
}
