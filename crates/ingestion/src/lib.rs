//! pgvt Ingestion
//!
//! Write side of a document table:
//! - Chunking strategies (`chunking`)
//! - Corpus reconstruction and metadata merging (`corpus`)
//! - The corpus manager: embed, insert, replace, rebuild, delete (`manager`)

pub mod chunking;
pub mod corpus;
pub mod manager;

pub use chunking::{
    strategy_from_config, CorpusStrategy, DelimiterSplitter, FixedWindowSplitter,
    ParagraphSplitter, SentenceSplitter,
};
pub use corpus::{infer_corpus_metadata, Corpus, Metadata};
pub use manager::{CorpusManager, CorpusManagerConfig};
