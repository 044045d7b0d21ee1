//! Question → context → SQL → rows → summary.

use crate::composer::{PerformanceReport, Summarizer};
use crate::database::{Database, Row};
use crate::generator::SqlGenerator;
use crate::performance::PerformanceConfig;
use crate::schema::SchemaProcessor;
use askdb_common::{Error, Result};
use serde::Serialize;
use std::time::Instant;

/// Body of a successful `POST /api/query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub question: String,
    pub generated_query: String,
    pub results: Vec<Row>,
    pub row_count: usize,
    pub total_count: Option<u64>,
    pub limited: bool,
    pub max_results: usize,
    pub ai_summary: Option<String>,
    pub performance: PerformanceReport,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Runs one question end to end against a session's database.
#[derive(Clone)]
pub struct QueryService {
    schema: SchemaProcessor,
    generator: SqlGenerator,
    summarizer: Summarizer,
}

impl QueryService {
    pub fn new(schema: SchemaProcessor, generator: SqlGenerator, summarizer: Summarizer) -> Self {
        Self {
            schema,
            generator,
            summarizer,
        }
    }

    pub fn schema(&self) -> &SchemaProcessor {
        &self.schema
    }

    pub async fn answer(
        &self,
        session_id: &str,
        db: &dyn Database,
        question: &str,
        table: Option<&str>,
        perf: &PerformanceConfig,
    ) -> Result<QueryResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question is required".into()));
        }
        let total_start = Instant::now();

        let start = Instant::now();
        let context = self
            .schema
            .resolve_context(
                session_id,
                db,
                question,
                table,
                perf.use_vector_search,
                perf.max_context_length,
            )
            .await?;
        let context_ms = elapsed_ms(start);

        let start = Instant::now();
        let generated = self
            .generator
            .generate(db, question, &context.text, perf)
            .await?;
        let generation_ms = elapsed_ms(start);

        let start = Instant::now();
        let mut outcome = db.execute(&generated.sql, perf.max_results).await?;
        if outcome.rows.len() > perf.max_results {
            outcome.rows.truncate(perf.max_results);
            outcome.limited = true;
        }
        let execution_ms = elapsed_ms(start);
        tracing::info!(
            rows = outcome.row_count(),
            limited = outcome.limited,
            execution_ms,
            "Query executed"
        );

        let start = Instant::now();
        let ai_summary = if perf.generate_summary {
            self.summarizer
                .summarize(
                    &generated.model,
                    question,
                    &generated.sql,
                    &outcome.rows,
                    outcome.total_count,
                    perf.max_context_length,
                )
                .await
        } else {
            None
        };
        let summary_ms = elapsed_ms(start);

        Ok(QueryResponse {
            success: true,
            question: question.to_string(),
            generated_query: generated.sql,
            row_count: outcome.row_count(),
            results: outcome.rows,
            total_count: outcome.total_count,
            limited: outcome.limited,
            max_results: perf.max_results,
            ai_summary,
            performance: PerformanceReport {
                context_ms,
                generation_ms,
                execution_ms,
                summary_ms,
                total_ms: elapsed_ms(total_start),
                attempts: generated.attempts,
                model: generated.model,
                context_source: context.source,
            },
        })
    }
}
