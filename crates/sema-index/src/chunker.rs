use std::path::Path;

use tokenizers::Tokenizer;

use crate::error::{IngestError, Result};

/// Sliding-window chunking parameters, counted in tokens.
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub max_tokens: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap: 64,
        }
    }
}

/// One decoded token window. `start` and `end` are token indices into the
/// encoded input, end exclusive.
#[derive(Debug, Clone)]
pub struct TokenWindow {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Token-accurate text chunker backed by the embedding model's tokenizer.
///
/// Window boundaries are computed on token ids, then decoded back to text,
/// so chunk sizes line up with what the embedding model actually sees.
pub struct TokenChunker {
    tokenizer: Tokenizer,
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker").finish_non_exhaustive()
    }
}

impl TokenChunker {
    #[must_use]
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Load a `tokenizer.json` from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| IngestError::Tokenizer(e.to_string()))?;
        Ok(Self::new(tokenizer))
    }

    /// Count the tokens `text` encodes to.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn count_tokens(&self, text: &str) -> Result<usize> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| IngestError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().len())
    }

    /// Split `text` into overlapping token windows.
    ///
    /// Consecutive windows overlap by `params.overlap` tokens. The start
    /// index always advances by at least one token, so pathological overlap
    /// settings degrade to slow progress rather than an infinite loop.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChunkParams` when `max_tokens` is zero, or a
    /// tokenizer error if encoding or decoding fails.
    pub fn chunk(&self, text: &str, params: &ChunkParams) -> Result<Vec<TokenWindow>> {
        if params.max_tokens == 0 {
            return Err(IngestError::InvalidChunkParams(
                "max_tokens must be greater than zero".into(),
            ));
        }
        let max_tokens = params.max_tokens;
        let overlap = if params.overlap >= max_tokens {
            max_tokens.saturating_sub(1).max(1)
        } else {
            params.overlap
        };

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| IngestError::Tokenizer(e.to_string()))?;
        let ids = encoding.get_ids();
        let total = ids.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut windows = Vec::new();
        let mut start = 0usize;
        loop {
            let end = usize::min(start + max_tokens, total);
            let text = self
                .tokenizer
                .decode(&ids[start..end], true)
                .map_err(|e| IngestError::Tokenizer(e.to_string()))?;
            windows.push(TokenWindow { start, end, text });
            if end >= total {
                break;
            }
            let mut next = end.saturating_sub(overlap);
            if next <= start {
                next = start + 1;
            }
            start = next;
        }
        Ok(windows)
    }
}
