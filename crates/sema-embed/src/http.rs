use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::provider::{EmbedMode, Embedder};

/// Client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Each input is prefixed with a task instruction before being sent. The
/// instruction differs between document and query mode, which is how
/// code-embedding models implement asymmetric retrieval.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    document_task: String,
    query_task: String,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpEmbedder {
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            document_task: "code2code_document".into(),
            query_task: "nl2code_query".into(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the task instructions for document and query encoding.
    #[must_use]
    pub fn with_tasks(mut self, document: impl Into<String>, query: impl Into<String>) -> Self {
        self.document_task = document.into();
        self.query_task = query.into();
        self
    }

    fn task(&self, mode: EmbedMode) -> &str {
        match mode {
            EmbedMode::Document => &self.document_task,
            EmbedMode::Query => &self.query_task,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let task = self.task(mode);
        let input: Vec<String> = texts.iter().map(|t| format!("{task}: {t}")).collect();
        let body = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "embedding request rejected");
            return Err(EmbedError::Api {
                status: status.as_u16(),
                detail: text,
            });
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&text)?;
        if parsed.data.len() != texts.len() {
            return Err(EmbedError::ShapeMismatch {
                expected: texts.len(),
                got: parsed.data.len(),
            });
        }

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(index) = vectors.iter().position(Vec::is_empty) {
            return Err(EmbedError::EmptyVector { index });
        }
        Ok(vectors)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedding_body(vectors: &[Vec<f32>]) -> serde_json::Value {
        let data: Vec<serde_json::Value> = vectors
            .iter()
            .map(|v| serde_json::json!({"embedding": v}))
            .collect();
        serde_json::json!({"data": data})
    }

    #[tokio::test]
    async fn embeds_batch_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[
                vec![1.0, 0.0],
                vec![0.0, 1.0],
            ])))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(server.uri(), "test-model");
        let vectors = embedder
            .embed_batch(&["fn one() {}".into(), "fn two() {}".into()], EmbedMode::Document)
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn document_and_query_send_different_instructions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_string_contains("code2code_document"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![1.0]])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_string_contains("nl2code_query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![2.0]])))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(server.uri(), "test-model");
        let doc = embedder
            .embed_batch(&["find the parser".into()], EmbedMode::Document)
            .await
            .unwrap();
        let query = embedder
            .embed_batch(&["find the parser".into()], EmbedMode::Query)
            .await
            .unwrap();
        assert_ne!(doc, query);
    }

    #[tokio::test]
    async fn api_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(server.uri(), "test-model");
        let err = embedder
            .embed_batch(&["text".into()], EmbedMode::Document)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn count_mismatch_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![1.0]])))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(server.uri(), "test-model");
        let err = embedder
            .embed_batch(&["a".into(), "b".into()], EmbedMode::Document)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbedError::ShapeMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        let embedder = HttpEmbedder::new("http://127.0.0.1:1", "test-model");
        let vectors = embedder.embed_batch(&[], EmbedMode::Document).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn api_key_is_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(wiremock::matchers::header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![1.0]])))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(server.uri(), "test-model").with_api_key("sk-test");
        embedder
            .embed_batch(&["text".into()], EmbedMode::Document)
            .await
            .unwrap();
    }
}
