//! Corpus reconstruction from chunk rows

use pgvt_common::errors::{AppError, Result};
use pgvt_common::Document;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata mapping stored in `document_metadata`
pub type Metadata = Map<String, Value>;

/// A source text rebuilt from its chunk rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Corpus {
    pub corpus_id: Uuid,
    /// Chunks joined with the strategy's delimiter
    pub content: String,
    /// Union of chunk metadata, later chunks win
    pub metadata: Metadata,
    /// Chunk rows ordered by chunk_index
    pub documents: Vec<Document>,
}

/// Merge chunk metadata in slice order; later keys overwrite earlier ones.
///
/// Nested objects are replaced, not merged. A row whose metadata is not a
/// JSON object breaks the row contract and fails the whole merge.
pub fn infer_corpus_metadata(documents: &[Document]) -> Result<Metadata> {
    merge_metadata(documents)
}

fn merge_metadata<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Result<Metadata> {
    let mut merged = Metadata::new();

    for document in documents {
        let metadata = document.metadata_map().ok_or_else(|| AppError::Contract {
            message: format!(
                "document_metadata of document {} (chunk {}) is {}, expected an object",
                document.id,
                document.chunk_index,
                json_kind(&document.document_metadata)
            ),
        })?;

        for (key, value) in metadata {
            merged.insert(key.clone(), value.clone());
        }
    }

    Ok(merged)
}

/// Sort by chunk_index, join content with `delimiter` and merge metadata
pub fn join_documents(documents: &[Document], delimiter: &str) -> Result<(String, Metadata)> {
    let mut ordered: Vec<&Document> = documents.iter().collect();
    ordered.sort_by_key(|d| d.chunk_index);

    let content = ordered
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join(delimiter);

    let metadata = merge_metadata(ordered)?;

    Ok((content, metadata))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgvt_common::errors::ErrorCode;
    use serde_json::json;

    fn doc(index: i32, content: &str, metadata: Value) -> Document {
        Document::new(Uuid::nil(), index, content, metadata)
    }

    #[test]
    fn test_infer_merges_later_wins() {
        let docs = vec![
            doc(0, "a", json!({"author": "X", "page": 1})),
            doc(1, "b", json!({"page": 2, "section": "intro"})),
        ];

        let metadata = infer_corpus_metadata(&docs).unwrap();
        assert_eq!(Value::Object(metadata), json!({"author": "X", "page": 2, "section": "intro"}));
    }

    #[test]
    fn test_infer_replaces_nested_objects() {
        let docs = vec![
            doc(0, "a", json!({"info": {"journal": "Nature", "year": 2020}})),
            doc(1, "b", json!({"info": {"year": 2021}})),
        ];

        let metadata = infer_corpus_metadata(&docs).unwrap();
        assert_eq!(metadata.get("info"), Some(&json!({"year": 2021})));
    }

    #[test]
    fn test_infer_empty_input() {
        assert!(infer_corpus_metadata(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_infer_rejects_null_metadata() {
        let docs = vec![doc(0, "a", json!({"k": 1})), doc(1, "b", Value::Null)];

        let err = infer_corpus_metadata(&docs).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ContractViolation);
        assert!(err.to_string().contains("is null"));
    }

    #[test]
    fn test_join_sorts_by_chunk_index() {
        let docs = vec![
            doc(2, "C.", json!({"k": "third"})),
            doc(0, "A.", json!({"k": "first"})),
            doc(1, "B.", json!({})),
        ];

        let (content, metadata) = join_documents(&docs, "\n\n").unwrap();
        assert_eq!(content, "A.\n\nB.\n\nC.");
        assert_eq!(metadata.get("k"), Some(&json!("third")));
    }
}
