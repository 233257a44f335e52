//! Embedding providers for the sema indexing pipeline.
//!
//! Chunks are encoded in document mode at indexing time and search strings
//! in query mode at retrieval time; the two encodings are deliberately
//! asymmetric and never interchangeable.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;

pub use any::AnyEmbedder;
pub use error::{EmbedError, Result};
pub use http::HttpEmbedder;
pub use provider::{EmbedMode, Embedder};
