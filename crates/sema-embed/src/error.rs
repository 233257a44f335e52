use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding API error (status {status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("embedding count mismatch: sent {expected} inputs, got {got} vectors")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("empty embedding vector for input {index}")]
    EmptyVector { index: usize },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EmbedError>;
