//! Repository ingestion pipeline and semantic retrieval.
//!
//! A checkout is walked with exclusion and binary filters, each file is
//! split into token-bounded chunks (structural entities where a tree-sitter
//! grammar is available, sliding token windows otherwise), chunks are
//! embedded in per-file batches, and the vectors land in a collection under
//! deterministic content-derived point ids.

pub mod chunker;
pub mod error;
pub mod extractor;
pub mod languages;
pub mod pipeline;
pub mod retriever;
pub mod store;
pub mod traversal;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{IngestError, Result};
pub use pipeline::{IngestConfig, IngestReport, Ingestor};
pub use retriever::{Retriever, SearchHit};
