//! Corpus manager
//!
//! Owns the write side of a document table:
//! - splitting a corpus with the injected [`CorpusStrategy`]
//! - embedding chunks through the configured provider
//! - inserting chunk rows, optionally replacing the previous version
//! - rebuilding a corpus from its rows
//! - soft delete and purge

use crate::chunking::{CorpusStrategy, DelimiterSplitter};
use crate::corpus::{infer_corpus_metadata, Corpus, Metadata};
use pgvt_common::db::DocumentTable;
use pgvt_common::embeddings::EmbeddingProvider;
use pgvt_common::errors::{AppError, Result};
use pgvt_common::{metrics, Document, DocumentProps};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, TransactionTrait};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Table and embedding provider a manager works with
#[derive(Clone)]
pub struct CorpusManagerConfig {
    pub table: DocumentTable,
    pub embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl CorpusManagerConfig {
    pub fn new(table: DocumentTable) -> Self {
        Self {
            table,
            embedding_provider: None,
        }
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }
}

/// Write-side operations over one document table
pub struct CorpusManager {
    db: Arc<DatabaseConnection>,
    config: CorpusManagerConfig,
    strategy: Arc<dyn CorpusStrategy>,
}

impl CorpusManager {
    /// Manager using the newline [`DelimiterSplitter`]
    pub fn new(db: Arc<DatabaseConnection>, config: CorpusManagerConfig) -> Self {
        Self::with_strategy(db, config, Arc::new(DelimiterSplitter::default()))
    }

    pub fn with_strategy(
        db: Arc<DatabaseConnection>,
        config: CorpusManagerConfig,
        strategy: Arc<dyn CorpusStrategy>,
    ) -> Self {
        Self {
            db,
            config,
            strategy,
        }
    }

    pub fn config(&self) -> &CorpusManagerConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Arc<dyn CorpusStrategy> {
        &self.strategy
    }

    pub fn split(&self, content: &str) -> Vec<String> {
        self.strategy.split(content)
    }

    pub fn extract_chunk_metadata(&self, chunk: &str) -> Metadata {
        self.strategy.extract_chunk_metadata(chunk)
    }

    pub fn infer_corpus_metadata(&self, documents: &[Document]) -> Result<Metadata> {
        infer_corpus_metadata(documents)
    }

    /// Insert pre-embedded chunks of one corpus.
    ///
    /// Chunk `i` gets `chunk_index = i` and the corpus metadata overlaid
    /// with its own chunk metadata. With `update_if_exists`, every existing
    /// row of the corpus is deleted first, in the same transaction as the
    /// insert. Without it, a duplicate key surfaces as the store's error.
    #[instrument(
        skip(self, contents, embeddings, corpus_metadata, props),
        fields(table = %self.config.table.name(), chunks = contents.len())
    )]
    pub async fn insert_documents(
        &self,
        corpus_id: Uuid,
        contents: &[String],
        embeddings: &[Vec<f32>],
        corpus_metadata: &Metadata,
        props: &DocumentProps,
        update_if_exists: bool,
    ) -> Result<usize> {
        if contents.len() != embeddings.len() {
            return Err(AppError::invalid_field(
                "embeddings",
                "Number of embeddings does not match number of documents",
            ));
        }

        if contents.is_empty() {
            debug!("No chunks to insert");
            return Ok(0);
        }

        let table = &self.config.table;
        for embedding in embeddings {
            table.check_dimensions(embedding)?;
        }

        let documents = contents
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (content, embedding))| {
                self.build_document(corpus_id, index, content, embedding, corpus_metadata, props)
            })
            .collect::<Result<Vec<_>>>()?;

        let insert = table.insert_documents(&documents)?;
        let start = Instant::now();

        let txn = self.db.begin().await?;
        let backend = txn.get_database_backend();

        if update_if_exists {
            let deleted = txn.execute(backend.build(&table.delete_corpus(corpus_id))).await?;
            debug!(rows = deleted.rows_affected(), "Removed previous corpus rows");
        }

        txn.execute(backend.build(&insert)).await?;
        txn.commit().await?;

        metrics::record_insert(start.elapsed().as_secs_f64(), documents.len(), update_if_exists);
        info!(
            corpus_id = %corpus_id,
            inserted = documents.len(),
            replaced = update_if_exists,
            "Corpus chunks inserted"
        );

        Ok(documents.len())
    }

    fn build_document(
        &self,
        corpus_id: Uuid,
        index: usize,
        content: &str,
        embedding: &[f32],
        corpus_metadata: &Metadata,
        props: &DocumentProps,
    ) -> Result<Document> {
        let chunk_index = i32::try_from(index).map_err(|_| {
            AppError::validation(format!("Corpus has too many chunks ({})", index + 1))
        })?;

        let mut metadata = corpus_metadata.clone();
        metadata.extend(self.extract_chunk_metadata(content));

        let mut document = Document::new(corpus_id, chunk_index, content, Value::Object(metadata))
            .with_embedding(embedding);
        props.apply(&mut document);
        Ok(document)
    }

    /// Split, embed and insert a corpus; returns the number of chunk rows.
    ///
    /// A fresh corpus id is generated when none is given.
    #[instrument(skip(self, content, metadata, props), fields(content_len = content.len()))]
    pub async fn insert_corpus(
        &self,
        content: &str,
        metadata: Metadata,
        props: &DocumentProps,
        corpus_id: Option<Uuid>,
        update_if_exists: bool,
    ) -> Result<usize> {
        let provider = self
            .config
            .embedding_provider
            .as_ref()
            .ok_or_else(|| AppError::invalid_field("embedding_provider", "embedding_provider must be provided"))?;

        let corpus_id = corpus_id.unwrap_or_else(Uuid::new_v4);
        let chunks = self.split(content);

        if chunks.is_empty() {
            debug!(corpus_id = %corpus_id, "Corpus split into no chunks");
            return Ok(0);
        }

        let embeddings = provider.embed_batch(&chunks).await?;
        debug!(
            corpus_id = %corpus_id,
            chunks = chunks.len(),
            model = provider.model_name(),
            "Corpus embedded"
        );

        self.insert_documents(corpus_id, &chunks, &embeddings, &metadata, props, update_if_exists)
            .await
    }

    /// Rebuild a corpus from its live rows; None when it has none
    #[instrument(skip(self))]
    pub async fn get_full_corpus(&self, corpus_id: Uuid) -> Result<Option<Corpus>> {
        let backend = self.db.get_database_backend();
        let rows = self
            .db
            .query_all(backend.build(&self.config.table.select_corpus(corpus_id)))
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut documents = rows
            .iter()
            .map(|row| Document::from_query_result(row, ""))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        documents.sort_by_key(|d| d.chunk_index);

        let (content, metadata) = self.strategy.join(&documents)?;

        Ok(Some(Corpus {
            corpus_id,
            content,
            metadata,
            documents,
        }))
    }

    /// Flag every live row of a corpus as deleted; returns rows touched
    #[instrument(skip(self))]
    pub async fn soft_delete_corpus(&self, corpus_id: Uuid) -> Result<u64> {
        let backend = self.db.get_database_backend();
        let result = self
            .db
            .execute(backend.build(&self.config.table.soft_delete_corpus(corpus_id)))
            .await?;

        metrics::record_corpus_deleted("soft");
        info!(rows = result.rows_affected(), "Corpus soft-deleted");
        Ok(result.rows_affected())
    }

    /// Remove every row of a corpus, deleted or not
    #[instrument(skip(self))]
    pub async fn purge_corpus(&self, corpus_id: Uuid) -> Result<u64> {
        let backend = self.db.get_database_backend();
        let result = self
            .db
            .execute(backend.build(&self.config.table.delete_corpus(corpus_id)))
            .await?;

        metrics::record_corpus_deleted("purge");
        info!(rows = result.rows_affected(), "Corpus purged");
        Ok(result.rows_affected())
    }
}
