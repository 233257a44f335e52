use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Encoding mode for an embedding request.
///
/// Code chunks are encoded as documents at indexing time; search strings are
/// encoded as queries at retrieval time. The two encodings are asymmetric:
/// a vector produced in one mode is only meaningful when matched against
/// vectors produced for the opposite side of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    Document,
    Query,
}

impl EmbedMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Query => "query",
        }
    }
}

/// Batch embedding provider.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts in the given mode.
    ///
    /// Returns one vector per input, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable, rejects the request,
    /// or returns a malformed response.
    fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    fn name(&self) -> &'static str;
}
