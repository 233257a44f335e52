use thiserror::Error;

use crate::store::VectorStoreError;

/// Job-fatal ingestion errors.
///
/// Per-file problems (unreadable files, parse failures) are absorbed inside
/// the pipeline and logged; only errors that invalidate the whole run
/// surface here.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunking parameters: {0}")]
    InvalidChunkParams(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("embedding error: {0}")]
    Embed(#[from] sema_embed::EmbedError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("ingestion cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, IngestError>;
