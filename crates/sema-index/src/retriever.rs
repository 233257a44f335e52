use std::sync::Arc;

use sema_embed::{EmbedMode, Embedder};

use crate::error::Result;
use crate::store::{ScoredVectorPoint, VectorStore};

/// One search result with its decoded payload.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub repo: String,
    pub file_path: String,
    pub language: String,
    pub chunk_index: usize,
    pub body: String,
    pub kind: Option<String>,
    pub name: Option<String>,
}

impl SearchHit {
    fn from_point(point: &ScoredVectorPoint) -> Option<Self> {
        let payload = &point.payload;
        let get_str =
            |key: &str| payload.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        Some(Self {
            score: point.score,
            repo: get_str("repo")?,
            file_path: get_str("file_path")?,
            language: get_str("language")?,
            chunk_index: payload
                .get("chunk_index")
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| usize::try_from(v).ok())?,
            body: get_str("body")?,
            kind: get_str("kind"),
            name: get_str("name"),
        })
    }
}

/// Semantic search over an indexed collection.
///
/// Queries are embedded in query mode, the counterpart of the document
/// mode used at indexing time.
pub struct Retriever<E> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<E>,
    collection: String,
}

impl<E: Embedder> Retriever<E> {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<E>, collection: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    /// Return up to `limit` hits ranked by similarity.
    ///
    /// Points with malformed payloads are dropped from the results.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or searching the store fails.
    pub async fn search(&self, query: &str, limit: u64) -> Result<Vec<SearchHit>> {
        let vectors = self
            .embedder
            .embed_batch(&[query.to_owned()], EmbedMode::Query)
            .await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or(sema_embed::EmbedError::ShapeMismatch {
                expected: 1,
                got: 0,
            })?;
        let points = self.store.search(&self.collection, vector, limit).await?;
        Ok(points.iter().filter_map(SearchHit::from_point).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, VectorPoint};
    use sema_embed::mock::MockEmbedder;
    use std::collections::HashMap;

    fn payload(body: &str) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("repo".to_owned(), serde_json::json!("r")),
            ("file_path".to_owned(), serde_json::json!("f.go")),
            ("language".to_owned(), serde_json::json!("go")),
            ("chunk_index".to_owned(), serde_json::json!(0)),
            ("body".to_owned(), serde_json::json!(body)),
        ])
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_collection("c", 4).await.unwrap();
        let embedder = MockEmbedder::new(4);
        let vectors = embedder
            .embed_batch(&["alpha".into(), "beta".into()], EmbedMode::Document)
            .await
            .unwrap();
        store
            .upsert(
                "c",
                vec![
                    VectorPoint {
                        id: "a".into(),
                        vector: vectors[0].clone(),
                        payload: payload("alpha"),
                    },
                    VectorPoint {
                        id: "b".into(),
                        vector: vectors[1].clone(),
                        payload: payload("beta"),
                    },
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn search_returns_decoded_hits() {
        let store = seeded_store().await;
        let retriever = Retriever::new(store, Arc::new(MockEmbedder::new(4)), "c");
        let hits = retriever.search("alpha", 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].repo, "r");
        assert_eq!(hits[0].file_path, "f.go");
        assert!(hits[0].kind.is_none());
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let store = seeded_store().await;
        let retriever = Retriever::new(store, Arc::new(MockEmbedder::new(4)), "c");
        let hits = retriever.search("alpha", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_collection("c", 4).await.unwrap();
        store
            .upsert(
                "c",
                vec![VectorPoint {
                    id: "x".into(),
                    vector: vec![1.0, 0.0, 0.0, 0.0],
                    payload: HashMap::from([("repo".to_owned(), serde_json::json!("r"))]),
                }],
            )
            .await
            .unwrap();

        let retriever = Retriever::new(store, Arc::new(MockEmbedder::new(4)), "c");
        let hits = retriever.search("anything", 5).await.unwrap();
        assert!(hits.is_empty());
    }
}
