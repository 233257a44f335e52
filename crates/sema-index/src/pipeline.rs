use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::sync::watch;

use sema_embed::{EmbedMode, Embedder};

use crate::chunker::{ChunkParams, TokenChunker};
use crate::error::{IngestError, Result};
use crate::extractor::{EntityKind, Extraction, Extractor};
use crate::languages::{detect_language, language_tag};
use crate::store::{UpsertBuffer, VectorStore};
use crate::traversal::{TraversalConfig, source_files};

/// Pipeline settings for one ingestor instance.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub chunking: ChunkParams,
    /// Dimensionality of the embedding model's output.
    pub vector_size: u64,
    /// Points per upsert batch.
    pub batch_size: usize,
    pub traversal: TraversalConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkParams::default(),
            vector_size: 896,
            batch_size: 64,
            traversal: TraversalConfig::default(),
        }
    }
}

/// Provenance of a chunk, serialized into its point payload.
#[derive(Debug, Clone)]
pub enum ChunkMetadata {
    /// Sliding token window over the whole file.
    FileLevel,
    /// Cut from a structurally extracted entity.
    Entity {
        kind: EntityKind,
        name: Option<String>,
        start_line: usize,
        end_line: usize,
        package: Option<String>,
        imports: Vec<String>,
    },
}

/// One embedding unit addressed by `(file_path, chunk_index)`.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub file_path: String,
    pub chunk_index: usize,
    pub language: String,
    pub metadata: ChunkMetadata,
    pub text: String,
}

impl ChunkRecord {
    /// Flat payload stored alongside the vector.
    #[must_use]
    pub fn payload(&self, repo: &str) -> HashMap<String, serde_json::Value> {
        let mut payload = HashMap::from([
            ("repo".to_owned(), json!(repo)),
            ("file_path".to_owned(), json!(self.file_path)),
            ("language".to_owned(), json!(self.language)),
            ("chunk_index".to_owned(), json!(self.chunk_index)),
            ("body".to_owned(), json!(self.text)),
        ]);
        if let ChunkMetadata::Entity {
            kind,
            name,
            start_line,
            end_line,
            package,
            imports,
        } = &self.metadata
        {
            payload.insert("kind".to_owned(), json!(kind.as_str()));
            payload.insert("name".to_owned(), json!(name.clone().unwrap_or_default()));
            payload.insert("start_code_line".to_owned(), json!(start_line));
            payload.insert("end_code_line".to_owned(), json!(end_line));
            payload.insert(
                "package".to_owned(),
                json!(package.clone().unwrap_or_default()),
            );
            payload.insert("imports".to_owned(), json!(imports.join("\n")));
        }
        payload
    }
}

/// Summary of one completed ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_upserted: usize,
    pub duration_ms: u64,
}

/// The ingestion pipeline: walk, extract, chunk, embed, upsert.
pub struct Ingestor<E> {
    extractor: Arc<Extractor>,
    chunker: Arc<TokenChunker>,
    embedder: Arc<E>,
    store: Arc<dyn VectorStore>,
    config: IngestConfig,
}

impl<E: Embedder> Ingestor<E> {
    pub fn new(
        extractor: Arc<Extractor>,
        chunker: Arc<TokenChunker>,
        embedder: Arc<E>,
        store: Arc<dyn VectorStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            extractor,
            chunker,
            embedder,
            store,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest one materialized checkout into the buffer's collection.
    ///
    /// Unreadable files are skipped with a warning; chunking, embedding, and
    /// store failures abort the run. The cancel signal is checked between
    /// files. On any outcome, points flushed so far remain counted in the
    /// caller's buffer.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when the cancel signal flips, or the first
    /// job-fatal pipeline error.
    pub async fn run(
        &self,
        buffer: &mut UpsertBuffer<'_>,
        root: &Path,
        repo: &str,
        cancel: &watch::Receiver<bool>,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        let mut report = IngestReport::default();

        self.store
            .ensure_collection(buffer.collection(), self.config.vector_size)
            .await?;

        for path in source_files(root, &self.config.traversal) {
            if *cancel.borrow() {
                return Err(IngestError::Cancelled);
            }
            report.files_scanned += 1;

            let rel_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let text = match std::fs::read(&path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::warn!(file = %rel_path, "skipping unreadable file: {e}");
                    report.files_skipped += 1;
                    continue;
                }
            };

            let records = self.file_records(&text, &rel_path)?;
            if records.is_empty() {
                report.files_skipped += 1;
                continue;
            }

            let file_hash = blake3::hash(text.as_bytes()).to_hex().to_string();
            let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts, EmbedMode::Document).await?;
            if vectors.len() != records.len() {
                return Err(sema_embed::EmbedError::ShapeMismatch {
                    expected: records.len(),
                    got: vectors.len(),
                }
                .into());
            }

            for (record, vector) in records.iter().zip(vectors) {
                buffer
                    .add(&file_hash, record.chunk_index, vector, record.payload(repo))
                    .await?;
            }

            report.files_indexed += 1;
            tracing::debug!(file = %rel_path, chunks = records.len(), "file ingested");
        }

        buffer.flush().await?;
        report.chunks_upserted = buffer.total_upserted();
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            repo,
            files = report.files_indexed,
            skipped = report.files_skipped,
            chunks = report.chunks_upserted,
            ms = report.duration_ms,
            "ingestion run finished"
        );
        Ok(report)
    }

    /// Ordered chunk records for one file.
    ///
    /// Entities that fit the token budget become a single chunk; oversized
    /// entities and files without entities go through sliding-window
    /// chunking. Chunk indices are assigned sequentially from zero, so the
    /// same content and parameters always reproduce the same sequence.
    fn file_records(&self, text: &str, rel_path: &str) -> Result<Vec<ChunkRecord>> {
        let path = Path::new(rel_path);
        let tag = language_tag(path);
        let extraction = detect_language(path)
            .map(|lang| self.extractor.extract(text, lang))
            .unwrap_or_default();

        let mut records = Vec::new();
        if extraction.entities.is_empty() {
            for window in self.chunker.chunk(text, &self.config.chunking)? {
                records.push(ChunkRecord {
                    file_path: rel_path.to_owned(),
                    chunk_index: records.len(),
                    language: tag.clone(),
                    metadata: ChunkMetadata::FileLevel,
                    text: window.text,
                });
            }
            return Ok(records);
        }

        let Extraction {
            package,
            imports,
            entities,
        } = extraction;
        for entity in entities {
            let metadata = ChunkMetadata::Entity {
                kind: entity.kind,
                name: entity.name,
                start_line: entity.start_line,
                end_line: entity.end_line,
                package: package.clone(),
                imports: imports.clone(),
            };
            if self.chunker.count_tokens(&entity.text)? > self.config.chunking.max_tokens {
                for window in self.chunker.chunk(&entity.text, &self.config.chunking)? {
                    records.push(ChunkRecord {
                        file_path: rel_path.to_owned(),
                        chunk_index: records.len(),
                        language: tag.clone(),
                        metadata: metadata.clone(),
                        text: window.text,
                    });
                }
            } else {
                records.push(ChunkRecord {
                    file_path: rel_path.to_owned(),
                    chunk_index: records.len(),
                    language: tag.clone(),
                    metadata,
                    text: entity.text,
                });
            }
        }
        Ok(records)
    }
}
