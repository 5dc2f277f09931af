//! Search client
//!
//! Compiles a [`SearchQuery`] into one SELECT over a document table and
//! assembles scored results. Criteria combine with AND:
//! - keywords: case-insensitive substring match, any keyword suffices
//! - text: cosine distance ordering against the embedded query text
//! - metadata filters: every filter must hold
//! - date range: row lifetime overlaps the window

use crate::filter::build_condition;
use pgvt_common::db::models::document::vector_literal;
use pgvt_common::errors::Result;
use pgvt_common::metadata::validate_metadata_filters;
use pgvt_common::{
    metrics, Document, DocumentColumn, DocumentTable, EmbeddingProvider, MetadataSchema,
    SearchQuery,
};
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Alias, BinOper, Condition, Expr, LikeExpr, Order, SelectStatement, SimpleExpr};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, QueryResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Alias of the similarity column added by semantic search
pub const SIMILARITY_COLUMN: &str = "similarity";

/// Document with its relevance score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub document: Document,
    /// Cosine similarity, keyword hit ratio, or 1.0 for pure filter matches
    pub score: f64,
}

/// How a query was ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Ordered by embedding distance
    Semantic,
    /// Keyword substring matching
    Keyword,
    /// Metadata and date constraints only
    Filter,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Semantic => "semantic",
            RetrievalMode::Keyword => "keyword",
            RetrievalMode::Filter => "filter",
        }
    }
}

#[derive(Clone)]
pub struct SearchClientConfig {
    pub table: DocumentTable,
    pub embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    /// When set, filters are validated against it before compilation
    pub metadata_schema: Option<MetadataSchema>,
}

impl SearchClientConfig {
    pub fn new(table: DocumentTable) -> Self {
        Self {
            table,
            embedding_provider: None,
            metadata_schema: None,
        }
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn with_metadata_schema(mut self, schema: MetadataSchema) -> Self {
        self.metadata_schema = Some(schema);
        self
    }
}

/// Read-side queries over one document table
pub struct SearchClient {
    db: Arc<DatabaseConnection>,
    config: SearchClientConfig,
}

impl SearchClient {
    pub fn new(db: Arc<DatabaseConnection>, config: SearchClientConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &SearchClientConfig {
        &self.config
    }

    /// Run a query and return scored documents
    #[instrument(skip(self, query), fields(table = %self.config.table.name(), limit = query.limit))]
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<RetrievalResult>> {
        query.check()?;
        let start = Instant::now();

        let embedding = match (query.semantic_text(), &self.config.embedding_provider) {
            (Some(text), Some(provider)) => Some(provider.embed(text).await?),
            _ => None,
        };

        let select = self.build_select(query, embedding.as_deref())?;
        let mode = retrieval_mode(query, embedding.is_some());

        let backend = self.db.get_database_backend();
        let rows = self.db.query_all(backend.build(&select)).await?;

        let keywords: Vec<String> = query.effective_keywords().map(str::to_lowercase).collect();
        let results = rows
            .iter()
            .map(|row| to_result(row, mode, &keywords))
            .collect::<Result<Vec<_>>>()?;

        metrics::record_search(start.elapsed().as_secs_f64(), mode.as_str(), results.len());
        debug!(mode = mode.as_str(), results = results.len(), "Search completed");

        Ok(results)
    }

    /// The SELECT a query compiles to; `embedding` enables semantic ordering
    pub fn build_select(&self, query: &SearchQuery, embedding: Option<&[f32]>) -> Result<SelectStatement> {
        let mut select = self.config.table.select_documents();

        self.apply_keyword_search(&mut select, query);
        self.apply_metadata_filters(&mut select, query)?;
        self.apply_date_range(&mut select, query);

        match embedding {
            Some(embedding) => self.apply_semantic_search(&mut select, embedding)?,
            None => {
                select
                    .order_by(DocumentColumn::CorpusId, Order::Asc)
                    .order_by(DocumentColumn::ChunkIndex, Order::Asc);
            }
        }

        select.limit(query.limit);
        Ok(select)
    }

    /// `content ILIKE '%kw%'` for each keyword, OR-combined
    pub fn apply_keyword_search(&self, select: &mut SelectStatement, query: &SearchQuery) {
        let mut any = Condition::any();
        let mut added = false;

        for keyword in query.effective_keywords() {
            let pattern = format!("%{}%", escape_like(keyword));
            any = any.add(Expr::col(DocumentColumn::Content).ilike(LikeExpr::new(pattern).escape('\\')));
            added = true;
        }

        if added {
            select.cond_where(any);
        }
    }

    /// Add the similarity column and order by cosine distance
    pub fn apply_semantic_search(&self, select: &mut SelectStatement, embedding: &[f32]) -> Result<()> {
        self.config.table.check_dimensions(embedding)?;

        let similarity = SimpleExpr::Binary(
            Box::new(Expr::val(1.0_f64).into()),
            BinOper::Sub,
            Box::new(cosine_distance(embedding)),
        );

        select
            .expr_as(similarity, Alias::new(SIMILARITY_COLUMN))
            .order_by_expr(cosine_distance(embedding), Order::Asc);
        Ok(())
    }

    /// AND every filter; validated first when a metadata schema is configured
    pub fn apply_metadata_filters(&self, select: &mut SelectStatement, query: &SearchQuery) -> Result<()> {
        if query.metadata_filters.is_empty() {
            return Ok(());
        }

        if let Some(schema) = &self.config.metadata_schema {
            validate_metadata_filters(&query.metadata_filters, schema)?;
        }

        for filter in &query.metadata_filters {
            select.cond_where(build_condition(filter)?);
        }
        Ok(())
    }

    /// Keep rows whose created_at..updated_at span overlaps the window
    pub fn apply_date_range(&self, select: &mut SelectStatement, query: &SearchQuery) {
        if let Some((start, end)) = query.date_range {
            select.cond_where(
                Condition::all()
                    .add(Expr::col(DocumentColumn::CreatedAt).lte(end))
                    .add(Expr::col(DocumentColumn::UpdatedAt).gte(start)),
            );
        }
    }
}

/// `embedding <=> CAST('[..]' AS vector)`
fn cosine_distance(embedding: &[f32]) -> SimpleExpr {
    SimpleExpr::Binary(
        Box::new(Expr::col(DocumentColumn::Embedding).into()),
        BinOper::Custom("<=>"),
        Box::new(Expr::val(vector_literal(embedding)).cast_as(Alias::new("vector"))),
    )
}

fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn retrieval_mode(query: &SearchQuery, semantic: bool) -> RetrievalMode {
    if semantic {
        RetrievalMode::Semantic
    } else if query.effective_keywords().next().is_some() {
        RetrievalMode::Keyword
    } else {
        RetrievalMode::Filter
    }
}

fn to_result(row: &QueryResult, mode: RetrievalMode, keywords: &[String]) -> Result<RetrievalResult> {
    let document = Document::from_query_result(row, "")?;

    let score = match mode {
        // NULL when the row has no embedding
        RetrievalMode::Semantic => row.try_get::<Option<f64>>("", SIMILARITY_COLUMN)?.unwrap_or(0.0),
        RetrievalMode::Keyword => keyword_score(&document.content, keywords),
        RetrievalMode::Filter => 1.0,
    };

    Ok(RetrievalResult { document, score })
}

/// Fraction of (lowercased) keywords found in the content
fn keyword_score(content: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 1.0;
    }
    let content = content.to_lowercase();
    let hits = keywords.iter().filter(|k| content.contains(k.as_str())).count();
    hits as f64 / keywords.len() as f64
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pgvt_common::embeddings::HashEmbedder;
    use pgvt_common::{FieldType, MetadataFilter};
    use sea_orm::sea_query::PostgresQueryBuilder;
    use sea_orm::{DatabaseBackend, IntoMockRow, MockDatabase};
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    const DIMS: usize = 4;

    fn client(db: Arc<DatabaseConnection>) -> SearchClient {
        SearchClient::new(db, SearchClientConfig::new(DocumentTable::new("documents", DIMS)))
    }

    fn mock(db: MockDatabase) -> Arc<DatabaseConnection> {
        Arc::new(db.into_connection())
    }

    fn offline() -> SearchClient {
        client(mock(MockDatabase::new(DatabaseBackend::Postgres)))
    }

    /// Statements the client ran, once it has released the connection
    fn transaction_log(client: SearchClient, db: Arc<DatabaseConnection>) -> String {
        drop(client);
        let db = Arc::try_unwrap(db).ok().expect("connection still shared");
        format!("{:?}", db.into_transaction_log())
    }

    /// Document row as returned by a semantic query
    fn with_similarity(document: Document, similarity: f64) -> BTreeMap<String, sea_orm::Value> {
        let mut row: BTreeMap<_, _> = document.into_mock_row().into_column_value_tuples().collect();
        row.insert(SIMILARITY_COLUMN.to_string(), sea_orm::Value::Double(Some(similarity)));
        row
    }

    fn sql(client: &SearchClient, query: &SearchQuery, embedding: Option<&[f32]>) -> String {
        client.build_select(query, embedding).unwrap().to_string(PostgresQueryBuilder)
    }

    #[test]
    fn test_keyword_search_or_combined() {
        let query = SearchQuery::new(5).with_keywords(["learning", "vector"]);
        let sql = sql(&offline(), &query, None);

        assert!(sql.contains(r#""content" ILIKE '%learning%'"#), "{sql}");
        assert!(sql.contains(r#""content" ILIKE '%vector%'"#), "{sql}");
        assert!(sql.contains(" OR "), "{sql}");
        assert!(sql.contains(r#""is_deleted" = FALSE"#), "{sql}");
        assert!(sql.contains(r#"ORDER BY "corpus_id" ASC, "chunk_index" ASC"#), "{sql}");
        assert!(sql.ends_with("LIMIT 5"), "{sql}");
    }

    #[test]
    fn test_keyword_wildcards_escaped() {
        let query = SearchQuery::new(1).with_keywords(["100%_sure"]);
        let sql = sql(&offline(), &query, None);
        assert!(sql.contains(r"100\") && sql.contains(r"\_sure"), "{sql}");
        assert!(sql.contains("ESCAPE"), "{sql}");
    }

    #[test]
    fn test_semantic_search_orders_by_distance() {
        let query = SearchQuery::new(3).with_text("neural networks");
        let sql = sql(&offline(), &query, Some(&[0.5, 0.5, 0.5, 0.5]));

        assert!(sql.contains(r#"AS "similarity""#), "{sql}");
        assert!(sql.contains("<=>"), "{sql}");
        assert!(sql.contains("CAST('[0.5,0.5,0.5,0.5]' AS vector)"), "{sql}");
        assert!(sql.contains("ORDER BY"), "{sql}");
        assert!(!sql.contains(r#""corpus_id" ASC"#), "{sql}");
    }

    #[test]
    fn test_semantic_search_checks_dimensions() {
        let query = SearchQuery::new(3).with_text("neural networks");
        let err = offline().build_select(&query, Some(&[0.1, 0.2])).unwrap_err();
        assert!(err.to_string().contains("expects 4"));
    }

    #[test]
    fn test_text_without_embedding_is_unchanged() {
        let query = SearchQuery::new(3).with_text("neural networks");
        let sql = sql(&offline(), &query, None);
        assert!(!sql.contains("<=>"));
        assert!(!sql.contains("similarity"));
    }

    #[test]
    fn test_filters_and_date_range_are_anded() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let query = SearchQuery::new(10)
            .with_filter(MetadataFilter::new("author", "eq", json!("Alice")).unwrap())
            .with_filter(MetadataFilter::new("year", "gte", json!(2020)).unwrap())
            .with_date_range(start, end);

        let sql = sql(&offline(), &query, None);

        assert!(sql.contains("'author'"), "{sql}");
        assert!(sql.contains("'year'"), "{sql}");
        assert!(sql.contains(r#""created_at" <= '2024-12-31"#), "{sql}");
        assert!(sql.contains(r#""updated_at" >= '2024-01-01"#), "{sql}");
        assert!(!sql.contains(" OR "), "{sql}");
    }

    #[test]
    fn test_filters_validated_against_schema() {
        let schema = MetadataSchema::new("Paper")
            .field("author", FieldType::String)
            .field("year", FieldType::Integer);
        let config = SearchClientConfig::new(DocumentTable::new("documents", DIMS)).with_metadata_schema(schema);
        let client = SearchClient::new(mock(MockDatabase::new(DatabaseBackend::Postgres)), config);

        let ok = SearchQuery::new(1).with_filter(MetadataFilter::new("year", "gt", json!(2000)).unwrap());
        assert!(client.build_select(&ok, None).is_ok());

        let unknown = SearchQuery::new(1).with_filter(MetadataFilter::new("venue", "eq", json!("x")).unwrap());
        let err = client.build_select(&unknown, None).unwrap_err();
        assert!(err.to_string().contains("not found in metadata schema"));

        let incompatible = SearchQuery::new(1).with_filter(MetadataFilter::new("author", "gt", json!("A")).unwrap());
        assert!(client.build_select(&incompatible, None).is_err());
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres));
        let client = client(db.clone());

        let err = client.search(&SearchQuery::new(5)).await.unwrap_err();
        assert!(err.to_string().contains("At least one search criterion is required"));

        let err = client.search(&SearchQuery::new(0).with_keywords(["x"])).await.unwrap_err();
        assert!(err.to_string().contains("limit must be at least 1"));

        assert_eq!(transaction_log(client, db), "[]");
    }

    #[tokio::test]
    async fn test_keyword_search_scores_hit_ratio() {
        let corpus_id = Uuid::new_v4();
        let rows = vec![
            Document::new(corpus_id, 0, "Machine Learning with vectors", json!({})),
            Document::new(corpus_id, 1, "Deep learning", json!({})),
        ];
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres).append_query_results(vec![rows]));
        let client = client(db.clone());

        let query = SearchQuery::new(10).with_keywords(["learning", "vector"]);
        let results = client.search(&query).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].score, 0.5);
        assert!(transaction_log(client, db).contains("ILIKE"));
    }

    #[tokio::test]
    async fn test_filter_only_search_scores_one() {
        let rows = vec![Document::new(Uuid::new_v4(), 0, "anything", json!({"author": "Alice"}))];
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres).append_query_results(vec![rows]));

        let query = SearchQuery::new(10).with_filter(MetadataFilter::new("author", "eq", json!("Alice")).unwrap());
        let results = client(db).search(&query).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[0].document.content, "anything");
    }

    #[tokio::test]
    async fn test_semantic_search_embeds_query() {
        let rows = vec![with_similarity(Document::new(Uuid::new_v4(), 0, "neural nets", json!({})), 0.75)];
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres).append_query_results(vec![rows]));
        let config = SearchClientConfig::new(DocumentTable::new("documents", DIMS))
            .with_embedding_provider(Arc::new(HashEmbedder::new(DIMS)));
        let client = SearchClient::new(db.clone(), config);

        let results = client.search(&SearchQuery::new(1).with_text("neural networks")).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 0.75);
        assert!(transaction_log(client, db).contains("<=>"));
    }

    #[tokio::test]
    async fn test_blank_text_is_not_embedded() {
        let rows = vec![Document::new(Uuid::new_v4(), 0, "rust", json!({}))];
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres).append_query_results(vec![rows]));
        let config = SearchClientConfig::new(DocumentTable::new("documents", DIMS))
            .with_embedding_provider(Arc::new(HashEmbedder::new(DIMS)));
        let client = SearchClient::new(db.clone(), config);

        let query = SearchQuery::new(1).with_text("   ").with_keywords(["rust"]);
        let results = client.search(&query).await.unwrap();

        assert_eq!(results[0].score, 1.0);
        let log = transaction_log(client, db);
        assert!(!log.contains("<=>"), "{log}");
        assert!(log.contains("ILIKE"), "{log}");
    }

    #[test]
    fn test_keyword_score() {
        let keywords = vec!["rust".to_string(), "sql".to_string()];
        assert_eq!(keyword_score("Rust and SQL", &keywords), 1.0);
        assert_eq!(keyword_score("rusty", &keywords), 0.5);
        assert_eq!(keyword_score("nothing", &keywords), 0.0);
        assert_eq!(keyword_score("nothing", &[]), 1.0);
    }
}
