//! Typed view over the merged configuration document.
//!
//! Every section falls back to its defaults, so an empty `config.yml`
//! yields a runnable (offline) configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub vector: VectorSettings,
    pub retrieval: RetrievalSettings,
    pub ingestion: IngestionSettings,
    pub sessions: SessionSettings,
}

impl Settings {
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        serde_json::from_value(value.clone())
            .map_err(|e| ApiError::Validation(format!("Invalid configuration: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub jwt_algorithm: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret".to_string(),
            jwt_algorithm: "HS256".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    /// Without a key the composer answers with the deterministic stub.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "llama3.1:8b-instruct-q4_K_M".to_string(),
            temperature: 0.1,
            max_tokens: 500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Hash,
    #[serde(alias = "openai_compatible")]
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `hash` is the offline default and only matches shared words;
    /// `openai` gives semantic embeddings.
    pub provider: EmbeddingProvider,
    /// Falls back to `llm.base_url` when unset.
    pub base_url: Option<String>,
    /// Falls back to `llm.api_key` when unset.
    pub api_key: Option<String>,
    /// Remote embedding model; unused by the hash provider.
    pub model: String,
    /// Vector width of the hash provider.
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            base_url: None,
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    pub backend: VectorBackend,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Sqlite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_k: usize,
    pub max_k: usize,
    pub context_max_chars: usize,
    pub chunk_max_chars: usize,
    pub snippet_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 50,
            context_max_chars: 12_000,
            chunk_max_chars: 2_000,
            snippet_chars: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub batch_size: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub compensate_on_index_failure: bool,
    /// Zero disables the background reconciliation task.
    pub reconcile_interval_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            chunk_size: 500,
            chunk_overlap: 50,
            compensate_on_index_failure: true,
            reconcile_interval_secs: 0,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub recency_window_hours: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            recency_window_hours: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_value(&json!({})).unwrap();
        assert_eq!(settings.retrieval.context_max_chars, 12_000);
        assert_eq!(settings.retrieval.chunk_max_chars, 2_000);
        assert_eq!(settings.ingestion.batch_size, 500);
        assert_eq!(settings.sessions.recency_window_hours, 24);
        assert_eq!(settings.vector.backend, VectorBackend::Sqlite);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Hash);
        assert!(settings.llm.api_key.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings = Settings::from_value(&json!({
            "retrieval": { "context_max_chars": 500 },
            "vector": { "backend": "memory" },
            "embedding": { "provider": "openai_compatible" }
        }))
        .unwrap();
        assert_eq!(settings.retrieval.context_max_chars, 500);
        assert_eq!(settings.retrieval.default_k, 5);
        assert_eq!(settings.vector.backend, VectorBackend::Memory);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Openai);
    }

    #[test]
    fn wrong_types_are_validation_errors() {
        let err = Settings::from_value(&json!({ "sessions": { "recency_window_hours": "soon" } }))
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
