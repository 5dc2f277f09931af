use super::models::document::{Column, Model};
use crate::errors::{AppError, Result};
use sea_orm::sea_query::{
    Alias, DeleteStatement, Expr, InsertStatement, IntoIden, Order, Query, SelectStatement,
    SimpleExpr, TableRef, UpdateStatement,
};
use sea_orm::Iterable;
use uuid::Uuid;

/// Physical location and embedding width of one document type.
///
/// Every statement touching document rows is built against a descriptor, so
/// a single process can serve several document tables that share the
/// [`Model`] column set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTable {
    schema: Option<String>,
    name: String,
    embedding_dimensions: usize,
}

impl DocumentTable {
    pub fn new(name: impl Into<String>, embedding_dimensions: usize) -> Self {
        Self {
            schema: None,
            name: name.into(),
            embedding_dimensions,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    pub fn table_ref(&self) -> TableRef {
        match &self.schema {
            Some(schema) => TableRef::SchemaTable(
                Alias::new(schema.as_str()).into_iden(),
                Alias::new(self.name.as_str()).into_iden(),
            ),
            None => TableRef::Table(Alias::new(self.name.as_str()).into_iden()),
        }
    }

    /// Double-quoted, schema-qualified name for raw DDL
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// Reject embeddings whose width does not match the `vector(N)` column
    pub fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.embedding_dimensions {
            return Err(AppError::invalid_field(
                "embedding",
                format!(
                    "Embedding has {} dimensions, table '{}' expects {}",
                    embedding.len(),
                    self.name,
                    self.embedding_dimensions
                ),
            ));
        }
        Ok(())
    }

    /// SELECT of every column over live rows; the embedding comes back as text.
    /// Further constraints go through `cond_where`, which ANDs them.
    pub fn select_documents(&self) -> SelectStatement {
        let mut select = Query::select();
        for column in Column::iter() {
            match column {
                Column::Embedding => {
                    select.expr_as(
                        Expr::col(Column::Embedding).cast_as(Alias::new("text")),
                        Column::Embedding,
                    );
                }
                other => {
                    select.column(other);
                }
            }
        }
        select
            .from(self.table_ref())
            .cond_where(Expr::col(Column::IsDeleted).eq(false));
        select
    }

    /// Live chunks of one corpus in chunk order
    pub fn select_corpus(&self, corpus_id: Uuid) -> SelectStatement {
        let mut select = self.select_documents();
        select
            .cond_where(Expr::col(Column::CorpusId).eq(corpus_id))
            .order_by(Column::ChunkIndex, Order::Asc);
        select
    }

    /// One multi-row INSERT for a batch of chunk rows
    pub fn insert_documents(&self, documents: &[Model]) -> Result<InsertStatement> {
        let mut insert = Query::insert();
        insert
            .into_table(self.table_ref())
            .columns(Column::iter());

        for document in documents {
            insert.values(Column::iter().map(|column| column_value(document, column)))?;
        }

        Ok(insert)
    }

    /// Hard delete of every row of a corpus, across collections
    pub fn delete_corpus(&self, corpus_id: Uuid) -> DeleteStatement {
        Query::delete()
            .from_table(self.table_ref())
            .and_where(Expr::col(Column::CorpusId).eq(corpus_id))
            .to_owned()
    }

    pub fn soft_delete_corpus(&self, corpus_id: Uuid) -> UpdateStatement {
        Query::update()
            .table(self.table_ref())
            .values([
                (Column::IsDeleted, Expr::value(true)),
                (Column::UpdatedAt, Expr::current_timestamp().into()),
            ])
            .and_where(Expr::col(Column::CorpusId).eq(corpus_id))
            .and_where(Expr::col(Column::IsDeleted).eq(false))
            .to_owned()
    }
}

fn column_value(document: &Model, column: Column) -> SimpleExpr {
    match column {
        Column::Id => document.id.into(),
        Column::Collection => document.collection.clone().into(),
        Column::CorpusId => document.corpus_id.into(),
        Column::ChunkIndex => document.chunk_index.into(),
        Column::Content => document.content.clone().into(),
        Column::Title => document.title.clone().into(),
        Column::DocumentMetadata => document.document_metadata.clone().into(),
        Column::OriginUrl => document.origin_url.clone().into(),
        Column::Language => document.language.clone().into(),
        Column::Score => document.score.into(),
        Column::Tags => document.tags.clone().into(),
        Column::Embedding => match &document.embedding {
            Some(vector) => Expr::val(vector.as_str()).cast_as(Alias::new("vector")),
            None => Expr::cust("NULL"),
        },
        Column::CreatedAt => document.created_at.into(),
        Column::UpdatedAt => document.updated_at.into(),
        Column::IsDeleted => document.is_deleted.into(),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::PostgresQueryBuilder;
    use serde_json::json;

    #[test]
    fn test_qualified_name() {
        let table = DocumentTable::new("documents", 3);
        assert_eq!(table.qualified_name(), "\"documents\"");

        let table = DocumentTable::new("we\"ird", 3).with_schema("rag");
        assert_eq!(table.qualified_name(), "\"rag\".\"we\"\"ird\"");
    }

    #[test]
    fn test_check_dimensions() {
        let table = DocumentTable::new("documents", 3);
        assert!(table.check_dimensions(&[0.1, 0.2, 0.3]).is_ok());

        let err = table.check_dimensions(&[0.1, 0.2]).unwrap_err();
        assert!(err.to_string().contains("expects 3"));
    }

    #[test]
    fn test_select_corpus_sql() {
        let table = DocumentTable::new("documents", 3).with_schema("rag");
        let corpus_id = Uuid::nil();
        let sql = table.select_corpus(corpus_id).to_string(PostgresQueryBuilder);

        assert!(sql.contains(r#"FROM "rag"."documents""#));
        assert!(sql.contains(r#"CAST("embedding" AS text) AS "embedding""#));
        assert!(sql.contains(r#""is_deleted" = FALSE"#));
        assert!(sql.contains(r#""corpus_id" = '00000000-0000-0000-0000-000000000000'"#));
        assert!(sql.ends_with(r#"ORDER BY "chunk_index" ASC"#));
    }

    #[test]
    fn test_insert_casts_embedding_to_vector() {
        let table = DocumentTable::new("documents", 2);
        let corpus_id = Uuid::new_v4();
        let docs = vec![
            Model::new(corpus_id, 0, "first", json!({"k": "v"})).with_embedding(&[0.5, 1.0]),
            Model::new(corpus_id, 1, "second", json!({})),
        ];

        let sql = table.insert_documents(&docs).unwrap().to_string(PostgresQueryBuilder);

        assert!(sql.starts_with(r#"INSERT INTO "documents""#));
        assert!(sql.contains("CAST('[0.5,1]' AS vector)"));
        assert!(sql.contains("'first'"));
        assert!(sql.contains("'second'"));
        assert!(sql.contains("NULL"));
    }

    #[test]
    fn test_delete_statements() {
        let table = DocumentTable::new("documents", 2);
        let corpus_id = Uuid::nil();

        let sql = table.delete_corpus(corpus_id).to_string(PostgresQueryBuilder);
        assert!(sql.starts_with(r#"DELETE FROM "documents" WHERE "corpus_id" = "#));

        let sql = table.soft_delete_corpus(corpus_id).to_string(PostgresQueryBuilder);
        assert!(sql.starts_with(r#"UPDATE "documents" SET "is_deleted" = TRUE"#));
        assert!(sql.contains("CURRENT_TIMESTAMP"));
    }
}
