//! pgvt Search
//!
//! Read side of a document table:
//! - Metadata filter compilation to jsonb conditions (`filter`)
//! - Keyword, semantic, filter and date-range search (`client`)

pub mod client;
pub mod filter;

pub use client::{RetrievalMode, RetrievalResult, SearchClient, SearchClientConfig};
pub use filter::build_condition;
