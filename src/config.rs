use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub qdrant: QdrantConfig,
    pub jobs: JobsConfig,
    pub ingest: IngestSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Path to the model's `tokenizer.json`, used for token-accurate chunking.
    pub tokenizer_path: String,
    pub vector_size: u64,
    pub document_task: String,
    pub query_task: String,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".into(),
            model: "jinaai/jina-code-embeddings-0.5b".into(),
            tokenizer_path: "tokenizer.json".into(),
            vector_size: 896,
            document_task: "code2code_document".into(),
            query_task: "nl2code_query".into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub sqlite_path: String,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "sema.db".into(),
            workers: 2,
            queue_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub max_tokens: usize,
    pub overlap: usize,
    pub batch_size: usize,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap: 64,
            batch_size: 64,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SEMA_QDRANT_URL") {
            self.qdrant.url = url;
        }
        if let Ok(url) = std::env::var("SEMA_EMBED_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Ok(key) = std::env::var("SEMA_EMBED_API_KEY") {
            self.embedding.api_key = Some(key);
        }
    }
}
