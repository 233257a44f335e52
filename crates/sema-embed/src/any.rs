use crate::error::Result;
use crate::http::HttpEmbedder;
#[cfg(feature = "mock")]
use crate::mock::MockEmbedder;
use crate::provider::{EmbedMode, Embedder};

macro_rules! delegate {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            Self::Http($p) => $body,
            #[cfg(feature = "mock")]
            Self::Mock($p) => $body,
        }
    };
}

/// Concrete embedder selected at runtime.
#[derive(Debug, Clone)]
pub enum AnyEmbedder {
    Http(HttpEmbedder),
    #[cfg(feature = "mock")]
    Mock(MockEmbedder),
}

impl Embedder for AnyEmbedder {
    async fn embed_batch(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        delegate!(self, p => p.embed_batch(texts, mode).await)
    }

    fn name(&self) -> &'static str {
        delegate!(self, p => p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_variant() {
        let embedder = AnyEmbedder::Http(HttpEmbedder::new("http://localhost", "m"));
        assert_eq!(embedder.name(), "http");
    }
}
