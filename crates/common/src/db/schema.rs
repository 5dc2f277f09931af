//! DDL for document tables
//!
//! Creates what a document table needs in a fresh database:
//! - the `vector` and `pg_trgm` extensions
//! - the schema, when the table lives outside the search path
//! - the table with a `vector(N)` embedding column
//! - the chunk-order, uniqueness, trigram and metadata indexes

use super::models::document::Column;
use super::DocumentTable;
use crate::errors::Result;
use sea_orm::sea_query::{Alias, ColumnDef, Expr, Table, TableCreateStatement};
use sea_orm::ConnectionTrait;
use tracing::{info, instrument};

/// Extensions required by the vector column and the trigram index
pub const EXTENSIONS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS vector",
    "CREATE EXTENSION IF NOT EXISTS pg_trgm",
];

pub fn create_schema_sql(table: &DocumentTable) -> Option<String> {
    table
        .schema()
        .map(|schema| format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema.replace('"', "\"\"")))
}

pub fn create_table_statement(table: &DocumentTable) -> TableCreateStatement {
    let vector_type = format!("vector({})", table.embedding_dimensions());

    Table::create()
        .table(table.table_ref())
        .if_not_exists()
        .col(ColumnDef::new(Column::Id).uuid().not_null().primary_key())
        .col(ColumnDef::new(Column::Collection).string_len(64))
        .col(ColumnDef::new(Column::CorpusId).uuid().not_null())
        .col(ColumnDef::new(Column::ChunkIndex).integer().not_null().default(0))
        .col(ColumnDef::new(Column::Content).text().not_null())
        .col(ColumnDef::new(Column::Title).string_len(500))
        .col(
            ColumnDef::new(Column::DocumentMetadata)
                .json_binary()
                .not_null()
                .default(Expr::cust("'{}'::jsonb")),
        )
        .col(ColumnDef::new(Column::OriginUrl).string_len(2048))
        .col(ColumnDef::new(Column::Language).string_len(10).default("en"))
        .col(ColumnDef::new(Column::Score).double())
        .col(ColumnDef::new(Column::Tags).json_binary())
        .col(ColumnDef::new(Column::Embedding).custom(Alias::new(vector_type)))
        .col(
            ColumnDef::new(Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(Column::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(ColumnDef::new(Column::IsDeleted).boolean().not_null().default(false))
        .to_owned()
}

/// Index DDL. The unique index treats NULL collections as equal (Postgres 15+).
pub fn index_statements(table: &DocumentTable) -> Vec<String> {
    let qualified = table.qualified_name();
    let index = |suffix: &str| format!("\"{}_{}\"", table.name().replace('"', "\"\""), suffix);

    vec![
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (corpus_id, chunk_index)",
            index("corpus_chunk_idx"),
            qualified
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} (collection, corpus_id, chunk_index) NULLS NOT DISTINCT",
            index("collection_corpus_chunk_key"),
            qualified
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING gin (content gin_trgm_ops)",
            index("content_trgm_idx"),
            qualified
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING gin (document_metadata)",
            index("metadata_gin_idx"),
            qualified
        ),
    ]
}

/// Create extensions, schema, table and indexes if missing
#[instrument(skip(db, table), fields(table = %table.qualified_name()))]
pub async fn ensure_document_table<C: ConnectionTrait>(db: &C, table: &DocumentTable) -> Result<()> {
    for sql in EXTENSIONS {
        db.execute_unprepared(sql).await?;
    }

    if let Some(sql) = create_schema_sql(table) {
        db.execute_unprepared(&sql).await?;
    }

    let backend = db.get_database_backend();
    db.execute(backend.build(&create_table_statement(table))).await?;

    for sql in index_statements(table) {
        db.execute_unprepared(&sql).await?;
    }

    info!(dimensions = table.embedding_dimensions(), "Document table ready");
    Ok(())
}
