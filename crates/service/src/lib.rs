//! pgvt Service
//!
//! `DocumentService` puts a [`CorpusManager`] (writes, primary connection)
//! and a [`SearchClient`] (reads, replica when configured) behind one
//! handle bound to a single document table.

use pgvt_common::config::{AppConfig, DocumentTableConfig};
use pgvt_common::db::schema::ensure_document_table;
use pgvt_common::embeddings::create_embedder;
use pgvt_common::errors::Result;
use pgvt_common::metrics::register_metrics;
use pgvt_common::{
    DbPool, Document, DocumentProps, DocumentTable, EmbeddingProvider, MetadataSchema, SearchQuery,
};
use pgvt_ingestion::{
    strategy_from_config, Corpus, CorpusManager, CorpusManagerConfig, CorpusStrategy, Metadata,
};
use pgvt_search::{RetrievalResult, SearchClient, SearchClientConfig};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Everything a service needs besides the connections
#[derive(Clone)]
pub struct DocumentServiceConfig {
    pub table: DocumentTable,
    pub embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    pub metadata_schema: Option<MetadataSchema>,
    /// Chunking strategy; newline splitting when unset
    pub strategy: Option<Arc<dyn CorpusStrategy>>,
    /// Limit used by [`DocumentService::query`]
    pub default_limit: u64,
}

impl DocumentServiceConfig {
    pub fn new(table: DocumentTable) -> Self {
        Self {
            table,
            embedding_provider: None,
            metadata_schema: None,
            strategy: None,
            default_limit: 10,
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

    pub fn with_strategy(mut self, strategy: Arc<dyn CorpusStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Table descriptor for the configured document table
pub fn document_table(config: &DocumentTableConfig, dimensions: usize) -> DocumentTable {
    let table = DocumentTable::new(config.table.clone(), dimensions);
    match &config.schema {
        Some(schema) => table.with_schema(schema.clone()),
        None => table,
    }
}

pub struct DocumentService {
    pool: DbPool,
    manager: CorpusManager,
    search: SearchClient,
    metadata_schema: Option<MetadataSchema>,
    default_limit: u64,
}

impl DocumentService {
    pub fn new(pool: &DbPool, config: DocumentServiceConfig) -> Self {
        let mut manager_config = CorpusManagerConfig::new(config.table.clone());
        let mut search_config = SearchClientConfig::new(config.table);

        if let Some(provider) = config.embedding_provider {
            manager_config = manager_config.with_embedding_provider(provider.clone());
            search_config = search_config.with_embedding_provider(provider);
        }
        if let Some(schema) = config.metadata_schema.clone() {
            search_config = search_config.with_metadata_schema(schema);
        }

        let manager = match config.strategy {
            Some(strategy) => CorpusManager::with_strategy(pool.write().clone(), manager_config, strategy),
            None => CorpusManager::new(pool.write().clone(), manager_config),
        };

        Self {
            pool: pool.clone(),
            manager,
            search: SearchClient::new(pool.read().clone(), search_config),
            metadata_schema: config.metadata_schema,
            default_limit: config.default_limit,
        }
    }

    /// Connect and wire a service from application configuration
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        register_metrics();

        let pool = DbPool::new(&config.database).await?;
        let table = document_table(&config.documents, config.embedding.dimension);

        let mut service_config = DocumentServiceConfig::new(table)
            .with_strategy(strategy_from_config(&config.chunking));
        service_config.default_limit = config.search.default_limit;

        if let Some(provider) = create_embedder(&config.embedding)? {
            service_config = service_config.with_embedding_provider(provider);
        }

        info!(
            table = %service_config.table.qualified_name(),
            provider = %config.embedding.provider,
            strategy = ?config.chunking.strategy,
            "Document service configured"
        );

        Ok(Self::new(&pool, service_config))
    }

    /// Create extensions, table and indexes when missing
    #[instrument(skip(self))]
    pub async fn initialize_store(&self) -> Result<()> {
        ensure_document_table(self.pool.write().as_ref(), self.table()).await
    }

    pub fn table(&self) -> &DocumentTable {
        &self.manager.config().table
    }

    pub fn manager(&self) -> &CorpusManager {
        &self.manager
    }

    pub fn search_client(&self) -> &SearchClient {
        &self.search
    }

    /// Empty query with the configured default limit
    pub fn query(&self) -> SearchQuery {
        SearchQuery::new(self.default_limit)
    }

    /// JSON schema of a search query against this table's metadata schema
    pub fn query_json_schema(&self) -> Option<Value> {
        self.metadata_schema.as_ref().map(SearchQuery::json_schema)
    }

    pub fn split(&self, content: &str) -> Vec<String> {
        self.manager.split(content)
    }

    pub fn infer_corpus_metadata(&self, documents: &[Document]) -> Result<Metadata> {
        self.manager.infer_corpus_metadata(documents)
    }

    pub async fn insert_corpus(
        &self,
        content: &str,
        metadata: Metadata,
        props: &DocumentProps,
        corpus_id: Option<Uuid>,
        update_if_exists: bool,
    ) -> Result<usize> {
        self.manager
            .insert_corpus(content, metadata, props, corpus_id, update_if_exists)
            .await
    }

    pub async fn insert_documents(
        &self,
        corpus_id: Uuid,
        contents: &[String],
        embeddings: &[Vec<f32>],
        corpus_metadata: &Metadata,
        props: &DocumentProps,
        update_if_exists: bool,
    ) -> Result<usize> {
        self.manager
            .insert_documents(corpus_id, contents, embeddings, corpus_metadata, props, update_if_exists)
            .await
    }

    pub async fn get_full_corpus(&self, corpus_id: Uuid) -> Result<Option<Corpus>> {
        self.manager.get_full_corpus(corpus_id).await
    }

    pub async fn soft_delete_corpus(&self, corpus_id: Uuid) -> Result<u64> {
        self.manager.soft_delete_corpus(corpus_id).await
    }

    pub async fn purge_corpus(&self, corpus_id: Uuid) -> Result<u64> {
        self.manager.purge_corpus(corpus_id).await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<RetrievalResult>> {
        self.search.search(query).await
    }

    /// Search, then rebuild every corpus that had a hit, in first-hit order
    #[instrument(skip(self, query))]
    pub async fn search_corpora(&self, query: &SearchQuery) -> Result<Vec<Corpus>> {
        let results = self.search.search(query).await?;

        let mut corpus_ids: Vec<Uuid> = Vec::new();
        for result in &results {
            if !corpus_ids.contains(&result.document.corpus_id) {
                corpus_ids.push(result.document.corpus_id);
            }
        }

        let mut corpora = Vec::with_capacity(corpus_ids.len());
        for corpus_id in corpus_ids {
            // Soft-deleted between the two reads
            if let Some(corpus) = self.manager.get_full_corpus(corpus_id).await? {
                corpora.push(corpus);
            }
        }

        Ok(corpora)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgvt_common::embeddings::HashEmbedder;
    use pgvt_common::{FieldType, MetadataFilter};
    use pgvt_ingestion::ParagraphSplitter;
    use sea_orm::sea_query::PostgresQueryBuilder;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use serde_json::json;

    const DIMS: usize = 8;

    fn mock(db: MockDatabase) -> Arc<DatabaseConnection> {
        Arc::new(db.into_connection())
    }

    /// Statements the service ran, once it has released the connection
    fn transaction_log(service: DocumentService, db: Arc<DatabaseConnection>) -> String {
        drop(service);
        let db = Arc::try_unwrap(db).ok().expect("connection still shared");
        format!("{:?}", db.into_transaction_log())
    }

    fn service(db: Arc<DatabaseConnection>) -> DocumentService {
        let config = DocumentServiceConfig::new(DocumentTable::new("documents", DIMS))
            .with_embedding_provider(Arc::new(HashEmbedder::new(DIMS)))
            .with_strategy(Arc::new(ParagraphSplitter::new()));
        DocumentService::new(&DbPool::from_connection(db), config)
    }

    #[test]
    fn test_document_table_from_config() {
        let mut config = DocumentTableConfig::default();
        assert_eq!(document_table(&config, 3).qualified_name(), "\"documents\"");

        config.schema = Some("rag".to_string());
        config.table = "papers".to_string();
        let table = document_table(&config, 3);
        assert_eq!(table.qualified_name(), "\"rag\".\"papers\"");
        assert_eq!(table.embedding_dimensions(), 3);
    }

    #[tokio::test]
    async fn test_paragraph_corpus_round_trip() {
        let content = "A.\n\nB.\n\nC.";
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results(vec![MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                }]),
        );
        let service = service(db.clone());
        let corpus_id = Uuid::new_v4();

        let inserted = service
            .insert_corpus(content, Metadata::new(), &DocumentProps::default(), Some(corpus_id), false)
            .await
            .unwrap();
        assert_eq!(inserted, 3);
        let chunks = service.split(content);
        assert!(transaction_log(service, db).contains("INSERT INTO"));

        // Read the same rows back
        let rows: Vec<Document> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Document::new(corpus_id, i as i32, chunk, json!({})))
            .collect();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results(vec![rows]),
        );
        let service = DocumentService::new(
            &DbPool::from_connection(db),
            DocumentServiceConfig::new(DocumentTable::new("documents", DIMS))
                .with_strategy(Arc::new(ParagraphSplitter::new())),
        );

        let corpus = service.get_full_corpus(corpus_id).await.unwrap().unwrap();
        assert_eq!(corpus.documents.len(), 3);
        assert_eq!(corpus.content, content);
    }

    #[test]
    fn test_keyword_query_compiles_to_ilike() {
        let service = service(mock(MockDatabase::new(DatabaseBackend::Postgres)));
        let query = service.query().with_keywords(["learning"]);

        let sql = service
            .search_client()
            .build_select(&query, None)
            .unwrap()
            .to_string(PostgresQueryBuilder);

        assert!(sql.contains(r#""content" ILIKE '%learning%'"#), "{sql}");
        assert!(sql.ends_with("LIMIT 10"), "{sql}");
    }

    #[tokio::test]
    async fn test_search_corpora_groups_by_first_hit() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let hits = vec![
            Document::new(second, 1, "learning two", json!({})),
            Document::new(first, 0, "learning one", json!({})),
            Document::new(second, 0, "learning zero", json!({})),
        ];
        let second_rows = vec![
            Document::new(second, 0, "learning zero", json!({"part": 0})),
            Document::new(second, 1, "learning two", json!({"part": 1})),
        ];
        let first_rows = vec![Document::new(first, 0, "learning one", json!({}))];

        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results(vec![hits, second_rows, first_rows]),
        );
        let service = service(db);

        let query = SearchQuery::new(10).with_keywords(["learning"]);
        let corpora = service.search_corpora(&query).await.unwrap();

        assert_eq!(corpora.len(), 2);
        assert_eq!(corpora[0].corpus_id, second);
        assert_eq!(corpora[0].content, "learning zero\n\nlearning two");
        assert_eq!(corpora[0].metadata.get("part"), Some(&json!(1)));
        assert_eq!(corpora[1].corpus_id, first);
    }

    #[tokio::test]
    async fn test_search_corpora_skips_vanished_corpus() {
        let gone = Uuid::new_v4();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results(vec![
                    vec![Document::new(gone, 0, "learning", json!({}))],
                    Vec::new(),
                ]),
        );

        let corpora = service(db)
            .search_corpora(&SearchQuery::new(5).with_keywords(["learning"]))
            .await
            .unwrap();
        assert!(corpora.is_empty());
    }

    #[test]
    fn test_query_json_schema_requires_metadata_schema() {
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres));
        assert!(service(db.clone()).query_json_schema().is_none());

        let schema = MetadataSchema::base("Paper").field("year", FieldType::Integer);
        let config = DocumentServiceConfig::new(DocumentTable::new("documents", DIMS)).with_metadata_schema(schema);
        let service = DocumentService::new(&DbPool::from_connection(db), config);

        let json = service.query_json_schema().unwrap();
        assert!(json["properties"]["metadata_filters"]["metadata_schema"]["properties"]["year"].is_object());

        let filter = MetadataFilter::new("year", "contains", json!(1)).unwrap();
        assert!(service.search_client().build_select(&service.query().with_filter(filter), None).is_err());
    }

    #[tokio::test]
    async fn test_initialize_store_uses_write_connection() {
        let ok = || MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        };
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results((0..7).map(|_| ok()).collect::<Vec<_>>()),
        );

        let service = service(db.clone());
        service.initialize_store().await.unwrap();

        let log = transaction_log(service, db);
        assert!(log.contains("CREATE TABLE IF NOT EXISTS"));
        assert!(log.contains("vector(8)"));
    }
}
