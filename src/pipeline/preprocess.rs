// src/pipeline/preprocess.rs

//! Text cleaning applied before vectorization.

use crate::core::PreprocessConfig;
use crate::utils::tokenize::words;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

static HTML_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<.*?>").expect("valid html pattern"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid url pattern"));
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+@\S+").expect("valid email pattern"));
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").expect("valid mention pattern"));
static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("valid hashtag pattern"));
static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid symbol pattern"));
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid digit pattern"));

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

static STOP_WORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ENGLISH_STOP_WORDS.iter().copied().collect());

/// Cleans and normalises raw article text into space-joined tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPreprocessor {
    config: PreprocessConfig,
}

impl TextPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Strips markup, links, handles and symbols; lowercases and collapses
    /// whitespace.
    pub fn clean_text(&self, text: &str) -> String {
        let mut text = HTML_RE.replace_all(text, " ").into_owned();
        if self.config.remove_urls {
            text = URL_RE.replace_all(&text, " ").into_owned();
        }
        text = EMAIL_RE.replace_all(&text, " ").into_owned();
        text = MENTION_RE.replace_all(&text, " ").into_owned();
        text = HASHTAG_RE.replace_all(&text, " ").into_owned();
        text = NON_WORD_RE.replace_all(&text, " ").into_owned();
        if self.config.remove_numbers {
            text = DIGITS_RE.replace_all(&text, " ").into_owned();
        }
        if self.config.lowercase {
            text = text.to_lowercase();
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn tokenize<'a>(&self, cleaned: &'a str) -> Vec<&'a str> {
        words(cleaned)
    }

    pub fn preprocess(&self, text: &str) -> String {
        let cleaned = self.clean_text(text);
        self.tokenize(&cleaned)
            .into_iter()
            .filter(|token| !(self.config.remove_stopwords && STOP_WORDS.contains(token.to_lowercase().as_str())))
            .filter(|token| token.chars().count() >= self.config.min_word_length)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn preprocess_batch(&self, texts: &[String]) -> Vec<String> {
        texts.iter().map(|t| self.preprocess(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_noise_and_stop_words() {
        let pre = TextPreprocessor::default();
        let out = pre.preprocess(
            "BREAKING NEWS!!! Check <b>this</b> at https://example.com @journalist #FakeNews is SHOCKING",
        );
        assert_eq!(out, "breaking news check shocking");
    }

    #[test]
    fn respects_switches() {
        let pre = TextPreprocessor::new(PreprocessConfig {
            remove_stopwords: false,
            lowercase: false,
            remove_numbers: true,
            min_word_length: 1,
            ..Default::default()
        });
        assert_eq!(pre.preprocess("The 2024 Vote"), "The Vote");
    }

    #[test]
    fn empty_input_stays_empty() {
        let pre = TextPreprocessor::default();
        assert_eq!(pre.preprocess(""), "");
        assert_eq!(pre.preprocess("!!! ... ???"), "");
    }
}
