use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{EmbedError, Result};
use crate::provider::{EmbedMode, Embedder};

/// Deterministic in-process embedder for tests.
///
/// Vectors are derived from the input bytes, offset by mode so that the same
/// text embeds differently as a document and as a query.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    fail_after: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(8)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail_after: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Succeed for the first `calls` batch requests, then fail.
    #[must_use]
    pub fn failing_after(dimensions: usize, calls: usize) -> Self {
        Self {
            dimensions,
            fail_after: Some(calls),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str, mode: EmbedMode) -> Vec<f32> {
        let seed = text
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        let offset = match mode {
            EmbedMode::Document => 0.0,
            EmbedMode::Query => 0.5,
        };
        (0..self.dimensions)
            .map(|i| {
                let i = u32::try_from(i).unwrap_or(u32::MAX);
                #[expect(clippy::cast_precision_loss)]
                let base = (seed.wrapping_add(i) % 97) as f32 / 97.0;
                base + offset
            })
            .collect()
    }
}

impl Embedder for MockEmbedder {
    async fn embed_batch(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after
            && call >= limit
        {
            return Err(EmbedError::Other("mock embedder failure".into()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t, mode)).collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_same_vector() {
        let embedder = MockEmbedder::new(4);
        let a = embedder
            .embed_batch(&["hello".into()], EmbedMode::Document)
            .await
            .unwrap();
        let b = embedder
            .embed_batch(&["hello".into()], EmbedMode::Document)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn document_and_query_modes_differ() {
        let embedder = MockEmbedder::new(4);
        let doc = embedder
            .embed_batch(&["hello".into()], EmbedMode::Document)
            .await
            .unwrap();
        let query = embedder
            .embed_batch(&["hello".into()], EmbedMode::Query)
            .await
            .unwrap();
        assert_ne!(doc, query);
    }

    #[tokio::test]
    async fn fails_after_limit() {
        let embedder = MockEmbedder::failing_after(4, 1);
        assert!(
            embedder
                .embed_batch(&["a".into()], EmbedMode::Document)
                .await
                .is_ok()
        );
        assert!(
            embedder
                .embed_batch(&["b".into()], EmbedMode::Document)
                .await
                .is_err()
        );
        assert_eq!(embedder.calls(), 2);
    }
}
