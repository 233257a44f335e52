//! Shared helpers for in-crate tests.

use tokenizers::Tokenizer;

pub(crate) const TEST_VOCAB_SIZE: usize = 1500;

/// Whitespace word-level tokenizer with a `w0..wN` vocabulary.
///
/// Gives exact, predictable token counts: every whitespace-separated word
/// is one token, and decoding joins tokens with single spaces.
pub(crate) fn word_tokenizer() -> Tokenizer {
    let mut vocab = String::from("\"[UNK]\": 0");
    for i in 0..TEST_VOCAB_SIZE {
        vocab.push_str(&format!(", \"w{i}\": {}", i + 1));
    }
    let json = format!(
        concat!(
            "{{\"version\":\"1.0\",\"truncation\":null,\"padding\":null,",
            "\"added_tokens\":[],\"normalizer\":null,",
            "\"pre_tokenizer\":{{\"type\":\"Whitespace\"}},",
            "\"post_processor\":null,\"decoder\":null,",
            "\"model\":{{\"type\":\"WordLevel\",\"vocab\":{{{vocab}}},",
            "\"unk_token\":\"[UNK]\"}}}}"
        ),
        vocab = vocab
    );
    Tokenizer::from_bytes(json.as_bytes()).unwrap()
}

/// `n` whitespace-separated vocabulary words, one token each.
pub(crate) fn words(n: usize) -> String {
    (0..n)
        .map(|i| format!("w{}", i % TEST_VOCAB_SIZE))
        .collect::<Vec<_>>()
        .join(" ")
}
