// src/utils/tokenize.rs

//! Word-level splitting shared by the explainer and the preprocessing pipeline.

use regex::Regex;
use std::sync::LazyLock;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern is a valid regex"));

/// A contiguous span of the input: either a word or the text between words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub is_word: bool,
}

/// Splits `text` into alternating separator and word spans.
///
/// Concatenating every span's text reproduces the input exactly.
pub fn split_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for m in WORD_RE.find_iter(text) {
        if m.start() > cursor {
            spans.push(Span {
                text: text[cursor..m.start()].to_string(),
                is_word: false,
            });
        }
        spans.push(Span {
            text: m.as_str().to_string(),
            is_word: true,
        });
        cursor = m.end();
    }
    if cursor < text.len() {
        spans.push(Span {
            text: text[cursor..].to_string(),
            is_word: false,
        });
    }
    spans
}

/// Returns only the word tokens of `text`, in order.
pub fn words(text: &str) -> Vec<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}
