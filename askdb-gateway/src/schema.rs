//! Schema summaries and prompt context.
//!
//! A table's column metadata is rendered into a fixed textual form. That text
//! is both the direct prompt context and the document embedded into the
//! vector index.

use crate::database::{ColumnInfo, Database};
use askdb_common::{Error, Result};
use askdb_memory::{SchemaDocument, SchemaMemory};
use serde::Serialize;

/// Render the summary for one table.
///
/// ```text
/// Table: shop.orders
/// Columns:
/// - id int NOT NULL PRIMARY KEY auto_increment
/// - status varchar(20) DEFAULT 'new'
/// ```
pub fn render_summary(database: &str, table: &str, columns: &[ColumnInfo]) -> String {
    let mut out = format!("Table: {}.{}\nColumns:", database, table);
    for col in columns {
        out.push_str("\n- ");
        out.push_str(&col.name);
        out.push(' ');
        out.push_str(&col.data_type);
        if !col.nullable {
            out.push_str(" NOT NULL");
        }
        match col.key.as_str() {
            "PRI" => out.push_str(" PRIMARY KEY"),
            "UNI" => out.push_str(" UNIQUE"),
            "MUL" => out.push_str(" INDEXED"),
            _ => {}
        }
        if let Some(default) = &col.default_value {
            out.push_str(" DEFAULT ");
            out.push_str(default);
        }
        let extra = col.extra.trim();
        if !extra.is_empty() {
            out.push(' ');
            out.push_str(extra);
        }
    }
    out
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Result of `process_table`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub table_name: String,
    pub column_count: usize,
    pub vector_indexed: bool,
    pub summary: String,
}

/// Where the prompt's schema context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    Vector,
    Direct,
}

/// Schema context ready to go into a prompt.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    pub text: String,
    pub source: ContextSource,
    pub tables: Vec<String>,
}

/// Reads table metadata and keeps the vector index in step.
#[derive(Clone)]
pub struct SchemaProcessor {
    memory: Option<SchemaMemory>,
}

impl SchemaProcessor {
    pub fn new(memory: Option<SchemaMemory>) -> Self {
        Self { memory }
    }

    async fn direct_summary(&self, db: &dyn Database, table: &str) -> Result<(String, usize)> {
        let columns = db.describe_table(table).await?;
        if columns.is_empty() {
            return Err(Error::NotFound(format!(
                "Table '{}' does not exist in database '{}'",
                table,
                db.database_name()
            )));
        }
        Ok((render_summary(db.database_name(), table, &columns), columns.len()))
    }

    /// Describe a table and, if enabled, index its summary.
    pub async fn process_table(
        &self,
        session_id: &str,
        db: &dyn Database,
        table: &str,
        use_vector: bool,
    ) -> Result<ProcessOutcome> {
        let table = table.trim();
        if table.is_empty() {
            return Err(Error::InvalidInput("table_name is required".into()));
        }

        let (summary, column_count) = self.direct_summary(db, table).await?;

        let mut vector_indexed = false;
        if use_vector {
            if let Some(memory) = &self.memory {
                let doc = SchemaDocument::new(session_id, db.database_name(), table, summary.as_str());
                match memory.store(&doc).await {
                    Ok(()) => vector_indexed = true,
                    Err(e) => tracing::warn!(
                        table,
                        backend = memory.backend(),
                        error = %e,
                        "Vector indexing failed, continuing with direct schema"
                    ),
                }
            }
        }

        tracing::info!(table, column_count, vector_indexed, "Processed table");
        Ok(ProcessOutcome {
            table_name: table.to_string(),
            column_count,
            vector_indexed,
            summary,
        })
    }

    async fn recall(
        &self,
        session_id: &str,
        db: &dyn Database,
        question: &str,
    ) -> Vec<SchemaDocument> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        match memory.recall(session_id, db.database_name(), question).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(
                    backend = memory.backend(),
                    error = %e,
                    "Vector recall failed, falling back to direct schema"
                );
                Vec::new()
            }
        }
    }

    /// Build prompt context for a question.
    ///
    /// With a table name the live summary of that table comes first, followed
    /// by any other tables recalled from the index. Without one, recalled
    /// tables are the only source.
    pub async fn resolve_context(
        &self,
        session_id: &str,
        db: &dyn Database,
        question: &str,
        table: Option<&str>,
        use_vector: bool,
        max_chars: usize,
    ) -> Result<SchemaContext> {
        let recalled = if use_vector {
            self.recall(session_id, db, question).await
        } else {
            Vec::new()
        };

        let mut sections = Vec::new();
        let mut tables = Vec::new();
        let mut source = ContextSource::Direct;

        if let Some(table) = table.map(str::trim).filter(|t| !t.is_empty()) {
            let (summary, _) = self.direct_summary(db, table).await?;
            sections.push(summary);
            tables.push(table.to_string());
        } else if recalled.is_empty() {
            return Err(Error::InvalidInput(
                "table_name is required when no processed table matches the question".into(),
            ));
        }

        for doc in recalled {
            if tables.contains(&doc.table) {
                continue;
            }
            source = ContextSource::Vector;
            tables.push(doc.table);
            sections.push(doc.summary);
        }

        let joined = sections.join("\n\n");
        Ok(SchemaContext {
            text: truncate_chars(&joined, max_chars).to_string(),
            source,
            tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::QueryOutcome;
    use askdb_memory::{EmbeddingProvider, InMemoryIndex};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Catalog;

    #[async_trait]
    impl Database for Catalog {
        fn database_name(&self) -> &str {
            "shop"
        }
        fn host(&self) -> &str {
            "localhost"
        }
        async fn connection_id(&self) -> Result<u64> {
            Ok(7)
        }
        async fn list_tables(&self) -> Result<Vec<String>> {
            Ok(vec!["orders".into(), "users".into()])
        }
        async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
            Ok(match table {
                "orders" => vec![
                    ColumnInfo {
                        nullable: false,
                        key: "PRI".into(),
                        extra: "auto_increment".into(),
                        ..ColumnInfo::new("id", "int")
                    },
                    ColumnInfo {
                        default_value: Some("'new'".into()),
                        ..ColumnInfo::new("status", "varchar(20)")
                    },
                ],
                "users" => vec![ColumnInfo {
                    key: "UNI".into(),
                    ..ColumnInfo::new("email", "varchar(255)")
                }],
                _ => vec![],
            })
        }
        async fn explain(&self, _sql: &str) -> Result<()> {
            Ok(())
        }
        async fn execute(&self, _sql: &str, _max_rows: usize) -> Result<QueryOutcome> {
            Ok(QueryOutcome::default())
        }
        async fn close(&self) {}
    }

    struct WordEmbedding;

    #[async_trait]
    impl EmbeddingProvider for WordEmbedding {
        fn name(&self) -> &str {
            "word"
        }
        fn dimensions(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    vec![
                        if t.contains("orders") { 1.0 } else { 0.0 },
                        if t.contains("users") { 1.0 } else { 0.0 },
                    ]
                })
                .collect())
        }
    }

    struct BrokenEmbedding;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedding {
        fn name(&self) -> &str {
            "broken"
        }
        fn dimensions(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding service unreachable")
        }
    }

    fn processor(embedding: Arc<dyn EmbeddingProvider>) -> SchemaProcessor {
        SchemaProcessor::new(Some(SchemaMemory::new(
            embedding,
            Arc::new(InMemoryIndex::new()),
            3,
        )))
    }

    #[test]
    fn summary_format() {
        let columns = vec![
            ColumnInfo {
                nullable: false,
                key: "PRI".into(),
                extra: "auto_increment".into(),
                ..ColumnInfo::new("id", "int")
            },
            ColumnInfo {
                default_value: Some("0".into()),
                key: "MUL".into(),
                ..ColumnInfo::new("total", "decimal(10,2)")
            },
        ];
        assert_eq!(
            render_summary("shop", "orders", &columns),
            "Table: shop.orders\nColumns:\n- id int NOT NULL PRIMARY KEY auto_increment\n- total decimal(10,2) INDEXED DEFAULT 0"
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("日本語", 1), "日");
    }

    #[tokio::test]
    async fn missing_table_is_not_found() {
        let err = SchemaProcessor::new(None)
            .process_table("s1", &Catalog, "nope", false)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn process_table_indexes_when_enabled() {
        let processor = processor(Arc::new(WordEmbedding));
        let outcome = processor
            .process_table("s1", &Catalog, "orders", true)
            .await
            .unwrap();
        assert_eq!(outcome.column_count, 2);
        assert!(outcome.vector_indexed);

        let skipped = processor
            .process_table("s1", &Catalog, "users", false)
            .await
            .unwrap();
        assert!(!skipped.vector_indexed);
    }

    #[tokio::test]
    async fn vector_failure_degrades() {
        let processor = processor(Arc::new(BrokenEmbedding));
        let outcome = processor
            .process_table("s1", &Catalog, "orders", true)
            .await
            .unwrap();
        assert!(!outcome.vector_indexed);

        let ctx = processor
            .resolve_context("s1", &Catalog, "count orders", Some("orders"), true, 4000)
            .await
            .unwrap();
        assert_eq!(ctx.source, ContextSource::Direct);
        assert!(ctx.text.starts_with("Table: shop.orders"));
    }

    #[tokio::test]
    async fn context_from_vector_without_table() {
        let processor = processor(Arc::new(WordEmbedding));
        processor
            .process_table("s1", &Catalog, "users", true)
            .await
            .unwrap();

        let ctx = processor
            .resolve_context("s1", &Catalog, "list users", None, true, 4000)
            .await
            .unwrap();
        assert_eq!(ctx.source, ContextSource::Vector);
        assert_eq!(ctx.tables, vec!["users".to_string()]);

        let err = processor
            .resolve_context("s1", &Catalog, "list users", None, false, 4000)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn named_table_comes_first_and_is_truncated() {
        let processor = processor(Arc::new(WordEmbedding));
        processor
            .process_table("s1", &Catalog, "users", true)
            .await
            .unwrap();

        let ctx = processor
            .resolve_context("s1", &Catalog, "orders by users", Some("orders"), true, 4000)
            .await
            .unwrap();
        assert_eq!(ctx.tables, vec!["orders".to_string(), "users".to_string()]);
        assert_eq!(ctx.source, ContextSource::Vector);

        let short = processor
            .resolve_context("s1", &Catalog, "orders", Some("orders"), false, 20)
            .await
            .unwrap();
        assert_eq!(short.text.chars().count(), 20);
    }
}
