//! SQL generation with bounded retries.
//!
//! Every attempt sends the same prompt. A reply is accepted only if it yields
//! a single read-only statement and, when validation is on, survives `EXPLAIN`.

use crate::database::Database;
use crate::performance::PerformanceConfig;
use crate::provider::{ChatRequest, Provider};
use askdb_common::{Error, LlmConfig, Result};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:[A-Za-z0-9_-]+[ \t]*\r?\n)?(.*?)```").unwrap());

/// Keywords that make a statement something other than a plain read.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "GRANT",
    "REVOKE", "RENAME", "CALL", "LOCK", "SET", "HANDLER", "LOAD", "INTO",
];

const SYSTEM_PROMPT: &str = "You translate questions into MySQL. \
Reply with exactly one SELECT statement that answers the question, using only the \
tables and columns listed in the schema. Do not explain the query and do not modify data.";

/// Why a single attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    #[error("the model returned an empty response")]
    EmptyResponse,

    #[error("not a read-only SELECT statement: {0}")]
    NotSelect(String),

    #[error("statement rejected by EXPLAIN: {0}")]
    Malformed(String),
}

// ============================================================================
// Extraction
// ============================================================================

fn strip_code_fences(raw: &str) -> String {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(block) => block.as_str().to_string(),
        None => raw.replace("```", ""),
    }
}

/// Words that open or continue a clause. A line led by one of these is SQL.
const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "JOIN", "INNER", "LEFT", "RIGHT", "OUTER",
    "CROSS", "NATURAL", "STRAIGHT_JOIN", "ON", "USING", "GROUP", "ORDER", "BY", "HAVING",
    "LIMIT", "OFFSET", "UNION", "ALL", "DISTINCT", "AS", "CASE", "WHEN", "THEN", "ELSE", "END",
    "IN", "IS", "NULL", "LIKE", "BETWEEN", "EXISTS", "ASC", "DESC", "WITH", "RECURSIVE",
    "WINDOW", "OVER", "PARTITION", "INTERVAL",
];

fn is_sql_keyword(word: &str) -> bool {
    SQL_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn leading_word(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

/// Skip one identifier, bare or backquoted, and any whitespace after it.
fn skip_identifier(text: &str) -> Option<&str> {
    let rest = if let Some(quoted) = text.strip_prefix('`') {
        &quoted[quoted.find('`')? + 1..]
    } else {
        let word = leading_word(text);
        if word.is_empty() || word.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        &text[word.len()..]
    };
    Some(rest.trim_start())
}

/// `WITH` opens a statement only as `WITH RECURSIVE` or `WITH name [(cols)] AS (`.
fn is_cte_head(after_with: &str) -> bool {
    let text = after_with.trim_start();
    if leading_word(text).eq_ignore_ascii_case("RECURSIVE") {
        return true;
    }
    let Some(mut rest) = skip_identifier(text) else {
        return false;
    };
    if let Some(columns) = rest.strip_prefix('(') {
        let Some(close) = columns.find(')') else {
            return false;
        };
        rest = columns[close + 1..].trim_start();
    }
    let word = leading_word(rest);
    word.eq_ignore_ascii_case("AS") && rest[word.len()..].trim_start().starts_with('(')
}

/// Byte offset of the first line that opens a `SELECT` or a CTE.
fn find_statement_start(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let start = offset + indent;
        let word = leading_word(&text[start..]);
        if word.eq_ignore_ascii_case("SELECT")
            || (word.eq_ignore_ascii_case("WITH") && is_cte_head(&text[start + word.len()..]))
        {
            return Some(start);
        }
        offset += line.len();
    }
    None
}

/// Whether a line after the first reads as commentary rather than SQL.
fn is_prose_line(line: &str) -> bool {
    let line = line.trim();
    let first = leading_word(line);
    if first.is_empty() || is_sql_keyword(first) {
        return false;
    }
    if line.ends_with(['.', '!', '?', ':']) {
        return true;
    }

    let capitalized = first.len() > 1
        && first.starts_with(|c: char| c.is_ascii_uppercase())
        && first[1..].chars().all(|c| c.is_ascii_lowercase());
    let plain = !line.contains(|c: char| "(),=<>*'\"`".contains(c));
    let words: Vec<&str> = line.split_whitespace().collect();
    capitalized && plain && words.len() >= 3 && !words.iter().any(|w| is_sql_keyword(w))
}

/// A statement ends before a blank line or a line of commentary.
fn ends_statement(rest: &str) -> bool {
    let line = rest.split('\n').next().unwrap_or_default();
    line.trim().is_empty() || is_prose_line(line)
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote != b'`' => i += 2,
            c if c == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}

/// Tokens of one statement, outside literals and comments.
struct Scan<'a> {
    /// Byte length of the statement: up to the first top-level `;`, blank
    /// line or line of commentary
    end: usize,
    /// Bare words with the next non-space character after each
    words: Vec<(&'a str, Option<char>)>,
    /// Contains a MySQL `/*! ... */` comment, which the server executes
    executable_comment: bool,
}

fn scan(sql: &str) -> Scan<'_> {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut executable_comment = false;
    let mut i = 0;

    while i < bytes.len() {
        if i > 0 && bytes[i - 1] == b'\n' && ends_statement(&sql[i..]) {
            return Scan {
                end: i,
                words,
                executable_comment,
            };
        }
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, q),
            b'#' => i = skip_line(bytes, i),
            // MySQL only treats `--` as a comment when followed by whitespace
            b'-' if bytes.get(i + 1) == Some(&b'-')
                && bytes.get(i + 2).map_or(true, |c| c.is_ascii_whitespace()) =>
            {
                i = skip_line(bytes, i)
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                if bytes.get(i + 2) == Some(&b'!') {
                    executable_comment = true;
                }
                i = skip_block_comment(bytes, i);
            }
            b';' => {
                return Scan {
                    end: i,
                    words,
                    executable_comment,
                }
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
                {
                    i += 1;
                }
                let next = sql[i..].trim_start().chars().next();
                words.push((&sql[start..i], next));
            }
            _ => i += 1,
        }
    }

    Scan {
        end: bytes.len(),
        words,
        executable_comment,
    }
}

/// Pull a single read-only statement out of a model reply.
pub fn extract_sql(raw: &str) -> std::result::Result<String, AttemptFailure> {
    let text = strip_code_fences(raw);
    let text = text.trim();
    if text.is_empty() {
        return Err(AttemptFailure::EmptyResponse);
    }

    let start = find_statement_start(text)
        .ok_or_else(|| AttemptFailure::NotSelect("no SELECT statement found".into()))?;
    let candidate = &text[start..];
    let scanned = scan(candidate);

    if scanned.executable_comment {
        return Err(AttemptFailure::NotSelect(
            "executable comments are not allowed".into(),
        ));
    }
    // String functions such as REPLACE(...) and INSERT(...) are reads
    if let Some((word, _)) = scanned.words.iter().find(|(word, next)| {
        *next != Some('(') && FORBIDDEN_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
    }) {
        return Err(AttemptFailure::NotSelect(format!(
            "contains {}",
            word.to_ascii_uppercase()
        )));
    }

    let statement = candidate[..scanned.end].trim();
    if statement.is_empty() {
        return Err(AttemptFailure::EmptyResponse);
    }
    Ok(statement.to_string())
}

/// User message for one generation request.
pub fn build_prompt(database: &str, context: &str, question: &str) -> String {
    format!(
        "Database: {database}\n\nSchema:\n{context}\n\nQuestion: {question}\n\nSQL:"
    )
}

// ============================================================================
// Generator
// ============================================================================

/// An accepted statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSql {
    pub sql: String,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Model requested
    pub model: String,
}

/// Prompts the language model for SQL and validates the reply.
#[derive(Clone)]
pub struct SqlGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    fast_model: String,
    temperature: f64,
    max_tokens: i64,
}

impl SqlGenerator {
    pub fn new(provider: Arc<dyn Provider>, llm: &LlmConfig) -> Self {
        Self {
            provider,
            model: llm.model.clone(),
            fast_model: llm.fast_model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        }
    }

    /// Model selected by the session's `use_faster_model` flag.
    pub fn model_for(&self, use_faster_model: bool) -> &str {
        if use_faster_model {
            &self.fast_model
        } else {
            &self.model
        }
    }

    /// Accept or reject one reply. `Err` is reserved for unreachable services.
    async fn check(
        &self,
        db: &dyn Database,
        reply: &str,
        validate: bool,
    ) -> Result<std::result::Result<String, AttemptFailure>> {
        let sql = match extract_sql(reply) {
            Ok(sql) => sql,
            Err(failure) => return Ok(Err(failure)),
        };
        if !validate {
            return Ok(Ok(sql));
        }
        match db.explain(&sql).await {
            Ok(()) => Ok(Ok(sql)),
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => Ok(Err(AttemptFailure::Malformed(e.to_string()))),
        }
    }

    /// Run up to `1 + max_retries` independent attempts.
    pub async fn generate(
        &self,
        db: &dyn Database,
        question: &str,
        context: &str,
        perf: &PerformanceConfig,
    ) -> Result<GeneratedSql> {
        let model = self.model_for(perf.use_faster_model);
        let prompt = build_prompt(db.database_name(), context, question);
        let max_attempts = perf.max_retries.saturating_add(1);
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            let request = ChatRequest::single_turn(model, SYSTEM_PROMPT, prompt.as_str())
                .with_max_tokens(self.max_tokens)
                .with_temperature(self.temperature);
            let response = self.provider.chat(request).await?;

            match self.check(db, &response.content, perf.validate_queries).await? {
                Ok(sql) => {
                    tracing::info!(attempt, model, "Generated SQL accepted");
                    return Ok(GeneratedSql {
                        sql,
                        attempts: attempt,
                        model: model.to_string(),
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        reason = %failure,
                        "Generated SQL rejected"
                    );
                    last_failure = Some(failure);
                }
            }
        }

        Err(Error::Generation {
            attempts: max_attempts,
            reason: last_failure.map(|f| f.to_string()).unwrap_or_default(),
        })
    }
}
