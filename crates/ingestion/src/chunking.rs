//! Corpus chunking strategies
//!
//! A strategy decides how a corpus is split into chunk rows and how the
//! rows are joined back. Built-in strategies:
//! - `DelimiterSplitter`: split on a fixed delimiter (default `"\n"`)
//! - `ParagraphSplitter`: blank-line separated paragraphs
//! - `SentenceSplitter`: sentence boundaries (`.`, `!`, `?` followed by whitespace)
//! - `FixedWindowSplitter`: character-capacity windows via `text-splitter`

use crate::corpus::{join_documents, Metadata};
use pgvt_common::config::{ChunkingConfig, ChunkingStrategyKind};
use pgvt_common::errors::Result;
use pgvt_common::Document;
use regex_lite::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Pluggable split / per-chunk metadata / join behaviour
pub trait CorpusStrategy: Send + Sync + fmt::Debug {
    /// Delimiter placed between chunks when a corpus is rejoined
    fn delimiter(&self) -> &str;

    /// Split a corpus into non-empty chunks
    fn split(&self, content: &str) -> Vec<String> {
        split_on_delimiter(content, self.delimiter(), false)
    }

    /// Metadata specific to one chunk, merged over the corpus metadata
    fn extract_chunk_metadata(&self, _chunk: &str) -> Metadata {
        Metadata::new()
    }

    /// Rebuild corpus content and metadata from its chunk rows
    fn join(&self, documents: &[Document]) -> Result<(String, Metadata)> {
        join_documents(documents, self.delimiter())
    }
}

/// Split on `delimiter`, dropping whitespace-only pieces
pub fn split_on_delimiter(content: &str, delimiter: &str, trim: bool) -> Vec<String> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    if delimiter.is_empty() {
        let chunk = if trim { content.trim() } else { content };
        return vec![chunk.to_string()];
    }

    content
        .split(delimiter)
        .filter(|piece| !piece.trim().is_empty())
        .map(|piece| (if trim { piece.trim() } else { piece }).to_string())
        .collect()
}

/// `chunk_length` (characters) and `word_count` for a chunk
pub fn chunk_stats(chunk: &str) -> Metadata {
    let mut stats = Metadata::new();
    stats.insert("chunk_length".to_string(), Value::from(chunk.chars().count()));
    stats.insert("word_count".to_string(), Value::from(chunk.split_whitespace().count()));
    stats
}

/// Split on a fixed delimiter, keeping chunk whitespace intact
#[derive(Debug, Clone)]
pub struct DelimiterSplitter {
    delimiter: String,
    chunk_stats: bool,
}

impl DelimiterSplitter {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
            chunk_stats: false,
        }
    }

    pub fn with_chunk_stats(mut self, enabled: bool) -> Self {
        self.chunk_stats = enabled;
        self
    }
}

impl Default for DelimiterSplitter {
    fn default() -> Self {
        Self::new("\n")
    }
}

impl CorpusStrategy for DelimiterSplitter {
    fn delimiter(&self) -> &str {
        &self.delimiter
    }

    fn extract_chunk_metadata(&self, chunk: &str) -> Metadata {
        if self.chunk_stats {
            chunk_stats(chunk)
        } else {
            Metadata::new()
        }
    }
}

/// Blank-line separated paragraphs, trimmed
#[derive(Debug, Clone, Default)]
pub struct ParagraphSplitter {
    chunk_stats: bool,
}

impl ParagraphSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_stats(mut self, enabled: bool) -> Self {
        self.chunk_stats = enabled;
        self
    }
}

impl CorpusStrategy for ParagraphSplitter {
    fn delimiter(&self) -> &str {
        "\n\n"
    }

    fn split(&self, content: &str) -> Vec<String> {
        split_on_delimiter(content, self.delimiter(), true)
    }

    fn extract_chunk_metadata(&self, chunk: &str) -> Metadata {
        if self.chunk_stats {
            chunk_stats(chunk)
        } else {
            Metadata::new()
        }
    }
}

const SENTENCE_BOUNDARY: &str = r"[.!?]+\s+";

/// One chunk per sentence, rejoined with single spaces
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    boundary: Regex,
    chunk_stats: bool,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self {
            boundary: Regex::new(SENTENCE_BOUNDARY).expect("sentence boundary pattern is valid"),
            chunk_stats: false,
        }
    }

    pub fn with_chunk_stats(mut self, enabled: bool) -> Self {
        self.chunk_stats = enabled;
        self
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl CorpusStrategy for SentenceSplitter {
    fn delimiter(&self) -> &str {
        " "
    }

    fn split(&self, content: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for boundary in self.boundary.find_iter(content) {
            // Keep the terminal punctuation, drop the whitespace after it
            let end = boundary.start() + boundary.as_str().trim_end().len();
            sentences.push(&content[start..end]);
            start = boundary.end();
        }
        sentences.push(&content[start..]);

        sentences
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn extract_chunk_metadata(&self, chunk: &str) -> Metadata {
        if self.chunk_stats {
            chunk_stats(chunk)
        } else {
            Metadata::new()
        }
    }
}

/// Windows of at most `capacity` characters, split at the coarsest
/// semantic level that fits
pub struct FixedWindowSplitter {
    splitter: TextSplitter<text_splitter::Characters>,
    capacity: usize,
    chunk_stats: bool,
}

impl FixedWindowSplitter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            splitter: TextSplitter::new(ChunkConfig::new(capacity)),
            capacity,
            chunk_stats: false,
        }
    }

    pub fn with_chunk_stats(mut self, enabled: bool) -> Self {
        self.chunk_stats = enabled;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for FixedWindowSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowSplitter")
            .field("capacity", &self.capacity)
            .field("chunk_stats", &self.chunk_stats)
            .finish()
    }
}

impl CorpusStrategy for FixedWindowSplitter {
    fn delimiter(&self) -> &str {
        " "
    }

    fn split(&self, content: &str) -> Vec<String> {
        let chunks: Vec<String> = self
            .splitter
            .chunks(content)
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .collect();

        debug!(
            input_len = content.len(),
            chunk_count = chunks.len(),
            capacity = self.capacity,
            "Text chunked"
        );

        chunks
    }

    fn extract_chunk_metadata(&self, chunk: &str) -> Metadata {
        if self.chunk_stats {
            chunk_stats(chunk)
        } else {
            Metadata::new()
        }
    }
}

/// Build the strategy selected in configuration
pub fn strategy_from_config(config: &ChunkingConfig) -> Arc<dyn CorpusStrategy> {
    match config.strategy {
        ChunkingStrategyKind::Delimiter => Arc::new(
            DelimiterSplitter::new(config.delimiter.clone()).with_chunk_stats(config.chunk_stats),
        ),
        ChunkingStrategyKind::Paragraph => {
            Arc::new(ParagraphSplitter::new().with_chunk_stats(config.chunk_stats))
        }
        ChunkingStrategyKind::Sentence => {
            Arc::new(SentenceSplitter::new().with_chunk_stats(config.chunk_stats))
        }
        ChunkingStrategyKind::FixedWindow => Arc::new(
            FixedWindowSplitter::new(config.window_size).with_chunk_stats(config.chunk_stats),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_delimiter_split() {
        let splitter = DelimiterSplitter::default();
        assert_eq!(splitter.split("a\nb\nc"), vec!["a", "b", "c"]);
        assert_eq!(splitter.split("a\n\n  \nb"), vec!["a", "b"]);
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("  \n ").is_empty());
        // Untrimmed
        assert_eq!(splitter.split(" a \nb"), vec![" a ", "b"]);
    }

    #[test]
    fn test_custom_delimiter() {
        let splitter = DelimiterSplitter::new("|");
        assert_eq!(splitter.split("one|two||three"), vec!["one", "two", "three"]);
        assert_eq!(splitter.delimiter(), "|");
    }

    #[test]
    fn test_paragraph_split_and_join() {
        let splitter = ParagraphSplitter::new();
        let content = "A.\n\nB.\n\nC.";
        let chunks = splitter.split(content);
        assert_eq!(chunks, vec!["A.", "B.", "C."]);
        assert_eq!(chunks.join(splitter.delimiter()), content);
    }

    #[test]
    fn test_sentence_split() {
        let splitter = SentenceSplitter::new();
        let chunks = splitter.split("First one. Second one!  Third?\nTrailing");
        assert_eq!(chunks, vec!["First one.", "Second one!", "Third?", "Trailing"]);
        assert!(splitter.split("   ").is_empty());
        // Decimals are not boundaries
        assert_eq!(splitter.split("Pi is 3.14 roughly."), vec!["Pi is 3.14 roughly."]);
    }

    #[test]
    fn test_fixed_window_split() {
        let splitter = FixedWindowSplitter::new(20);
        let text = "Machine learning is a field. Deep learning is a subset. Vectors are numbers.";
        let chunks = splitter.split(text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {:?}", chunk);
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn test_chunk_stats() {
        let splitter = DelimiterSplitter::default().with_chunk_stats(true);
        let stats = splitter.extract_chunk_metadata("two words");
        assert_eq!(stats.get("chunk_length"), Some(&json!(9)));
        assert_eq!(stats.get("word_count"), Some(&json!(2)));

        assert!(DelimiterSplitter::default().extract_chunk_metadata("x").is_empty());
    }

    #[test]
    fn test_default_join_orders_by_index() {
        let corpus_id = Uuid::new_v4();
        let docs = vec![
            Document::new(corpus_id, 1, "second", json!({"b": 2})),
            Document::new(corpus_id, 0, "first", json!({"a": 1})),
        ];

        let (content, metadata) = DelimiterSplitter::default().join(&docs).unwrap();
        assert_eq!(content, "first\nsecond");
        assert_eq!(metadata.get("a"), Some(&json!(1)));
        assert_eq!(metadata.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_strategy_from_config() {
        let mut config = ChunkingConfig::default();
        assert_eq!(strategy_from_config(&config).delimiter(), "\n");

        config.strategy = ChunkingStrategyKind::Paragraph;
        assert_eq!(strategy_from_config(&config).delimiter(), "\n\n");

        config.strategy = ChunkingStrategyKind::FixedWindow;
        config.chunk_stats = true;
        let strategy = strategy_from_config(&config);
        assert_eq!(strategy.delimiter(), " ");
        assert!(strategy.extract_chunk_metadata("abc").contains_key("word_count"));
    }
}
