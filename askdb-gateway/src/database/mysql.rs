//! MySQL backend built on SQLx.
//!
//! Each session gets a single-connection pool. Statements run inside a
//! `START TRANSACTION READ ONLY` block that is always rolled back.

use super::{take_limited, ColumnInfo, ConnectParams, Connector, Database, QueryOutcome, Row};
use askdb_common::{Error, ExecutionErrorKind, Result};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::mysql::{
    MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlPool, MySqlPoolOptions,
    MySqlRow,
};
use sqlx::{Column, Executor, Row as _};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Error classification
// ============================================================================

/// MySQL server error number, when the error came from the server.
fn mysql_error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(MySqlDatabaseError::number),
        _ => None,
    }
}

/// Map a connect failure onto auth / not-found / unavailable.
fn classify_connect_error(err: sqlx::Error, params: &ConnectParams) -> Error {
    let message = err.to_string();
    match mysql_error_number(&err) {
        Some(1044 | 1045 | 1698) => {
            Error::Auth(format!("Access denied for user '{}'", params.user))
        }
        Some(1049) => Error::NotFound(format!("Unknown database '{}'", params.database)),
        Some(_) => Error::Unavailable(message),
        None => match err {
            sqlx::Error::Configuration(_) => Error::InvalidInput(message),
            _ if message.contains("Access denied") => {
                Error::Auth(format!("Access denied for user '{}'", params.user))
            }
            _ if message.contains("Unknown database") => {
                Error::NotFound(format!("Unknown database '{}'", params.database))
            }
            _ => Error::Unavailable(format!(
                "Cannot reach MySQL at {}:{}: {}",
                params.host, params.port, message
            )),
        },
    }
}

/// Classify a statement failure by server error number.
fn execution_kind(number: Option<u16>) -> ExecutionErrorKind {
    match number {
        // parse errors, unknown columns, bad grouping
        Some(1064 | 1054 | 1052 | 1055 | 1056 | 1111 | 1140 | 1149 | 1241 | 1248 | 1305) => {
            ExecutionErrorKind::Syntax
        }
        Some(1044 | 1142 | 1143 | 1227 | 1370 | 1792) => ExecutionErrorKind::Permission,
        Some(1205 | 1317 | 1969 | 3024) => ExecutionErrorKind::Timeout,
        Some(1146 | 1049) => ExecutionErrorKind::NotFound,
        _ => ExecutionErrorKind::Other,
    }
}

fn classify_execution_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            Error::Unavailable(format!("Database connection lost: {}", err))
        }
        _ => Error::execution(execution_kind(mysql_error_number(&err)), err.to_string()),
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens MySQL handles with client-supplied credentials.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(connect_timeout: Duration, query_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            query_timeout,
        }
    }

    fn build_connect_options(params: &ConnectParams) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .password(&params.password)
            .database(params.database.trim())
    }
}

impl Default for MySqlConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(30))
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn Database>> {
        let opts = Self::build_connect_options(params);
        let max_execution_ms = self.query_timeout.as_millis() as u64;

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(self.connect_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    // MariaDB has no max_execution_time; the cap is best-effort
                    let stmt = format!("SET SESSION max_execution_time = {}", max_execution_ms);
                    if let Err(e) = conn.execute(sqlx::raw_sql(&stmt)).await {
                        tracing::debug!(error = %e, "Could not set max_execution_time");
                    }
                    Ok(())
                })
            })
            .connect_with(opts)
            .await
            .map_err(|e| classify_connect_error(e, params))?;

        tracing::info!(
            host = %params.host,
            port = params.port,
            database = %params.database,
            "Opened MySQL connection"
        );

        Ok(Arc::new(MySqlDatabase {
            pool,
            database: params.database.trim().to_string(),
            host: params.host.clone(),
        }))
    }
}

// ============================================================================
// Handle
// ============================================================================

/// A session's MySQL handle.
pub struct MySqlDatabase {
    pool: MySqlPool,
    database: String,
    host: String,
}

impl MySqlDatabase {
    /// Column names in select-list order; repeated names get a numeric suffix.
    fn column_names(row: &MySqlRow) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(row.columns().len());
        for col in row.columns() {
            let base = col.name().to_string();
            let mut name = base.clone();
            let mut n = 2;
            while names.contains(&name) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            names.push(name);
        }
        names
    }

    /// Converts a SQLx row to a JSON object keyed by `columns`.
    fn convert_row(row: &MySqlRow, columns: &[String]) -> Row {
        columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), Self::extract_value(row, idx)))
            .collect()
    }

    /// Extracts a JSON value from a MySqlRow at the given index.
    fn extract_value(row: &MySqlRow, idx: usize) -> Value {
        // Try u64 first for BIGINT UNSIGNED columns
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<u16>, _>(idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<u8>, _>(idx) {
            return v.map(Value::from).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(float_value).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| float_value(f as f64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
            return v.map(decimal_value).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return v
                .map(|t| Value::String(t.format("%H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v
                .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned()))
                .unwrap_or(Value::Null);
        }

        Value::Null
    }

    /// Stream rows, keeping at most `max_rows`; reads one extra to detect truncation.
    async fn fetch_limited(
        conn: &mut MySqlConnection,
        sql: &str,
        max_rows: usize,
    ) -> Result<(Vec<String>, Vec<Row>, bool)> {
        let stream = sqlx::query(sql)
            .fetch(&mut *conn)
            .map_err(classify_execution_error);
        let (raw, limited) = take_limited(stream, max_rows).await?;

        let columns = raw.first().map(Self::column_names).unwrap_or_default();
        let rows = raw
            .iter()
            .map(|row| Self::convert_row(row, &columns))
            .collect();
        Ok((columns, rows, limited))
    }

    /// Untruncated row count; `None` if the server refuses the wrapped count.
    async fn count_total(conn: &mut MySqlConnection, sql: &str) -> Option<u64> {
        let count_sql = format!("SELECT COUNT(*) FROM ({}) AS askdb_total", sql);
        match sqlx::query_scalar::<_, i64>(&count_sql)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(n) => Some(n.max(0) as u64),
            Err(e) => {
                tracing::debug!(error = %e, "Total count unavailable");
                None
            }
        }
    }

    async fn run_read_only(
        conn: &mut MySqlConnection,
        sql: &str,
        max_rows: usize,
    ) -> Result<QueryOutcome> {
        let (columns, rows, limited) = Self::fetch_limited(conn, sql, max_rows).await?;
        let total_count = if limited {
            Self::count_total(conn, sql).await
        } else {
            Some(rows.len() as u64)
        };

        Ok(QueryOutcome {
            columns,
            rows,
            total_count,
            limited,
        })
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn decimal_value(d: Decimal) -> Value {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}

#[async_trait]
impl Database for MySqlDatabase {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn connection_id(&self) -> Result<u64> {
        sqlx::query_scalar::<_, u64>("SELECT CONNECTION_ID()")
            .fetch_one(&self.pool)
            .await
            .map_err(classify_execution_error)
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT CAST(TABLE_NAME AS CHAR)
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME
            "#,
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_execution_error)
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        // Cast to CHAR to avoid BINARY type mismatch with Rust String
        let column_rows: Vec<(String, String, String, Option<String>, String, String)> =
            sqlx::query_as(
                r#"
                SELECT
                    CAST(c.COLUMN_NAME AS CHAR) AS column_name,
                    CAST(c.COLUMN_TYPE AS CHAR) AS column_type,
                    CAST(c.IS_NULLABLE AS CHAR) AS is_nullable,
                    CAST(c.COLUMN_DEFAULT AS CHAR) AS column_default,
                    CAST(c.COLUMN_KEY AS CHAR) AS column_key,
                    CAST(c.EXTRA AS CHAR) AS extra
                FROM information_schema.COLUMNS c
                WHERE c.TABLE_SCHEMA = ? AND c.TABLE_NAME = ?
                ORDER BY c.ORDINAL_POSITION
                "#,
            )
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_execution_error)?;

        Ok(column_rows
            .into_iter()
            .map(
                |(name, data_type, is_nullable, default_value, key, extra)| ColumnInfo {
                    name,
                    data_type,
                    nullable: is_nullable == "YES",
                    key,
                    default_value,
                    extra,
                },
            )
            .collect())
    }

    async fn explain(&self, sql: &str) -> Result<()> {
        let explain_sql = format!("EXPLAIN {}", sql);
        self.pool
            .execute(sqlx::raw_sql(&explain_sql))
            .await
            .map_err(classify_execution_error)?;
        Ok(())
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryOutcome> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(classify_execution_error)?;

        conn.execute(sqlx::raw_sql("START TRANSACTION READ ONLY"))
            .await
            .map_err(classify_execution_error)?;

        let outcome = Self::run_read_only(&mut conn, sql, max_rows).await;

        if let Err(e) = conn.execute(sqlx::raw_sql("ROLLBACK")).await {
            tracing::warn!(error = %e, "Rollback after read-only query failed");
        }

        outcome
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!(host = %self.host, database = %self.database, "Closed MySQL connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectParams {
        ConnectParams {
            host: "db.local".into(),
            port: 3306,
            user: "app".into(),
            password: "secret".into(),
            database: "shop".into(),
        }
    }

    #[test]
    fn execution_kinds() {
        assert_eq!(execution_kind(Some(1064)), ExecutionErrorKind::Syntax);
        assert_eq!(execution_kind(Some(1054)), ExecutionErrorKind::Syntax);
        assert_eq!(execution_kind(Some(1142)), ExecutionErrorKind::Permission);
        assert_eq!(execution_kind(Some(1792)), ExecutionErrorKind::Permission);
        assert_eq!(execution_kind(Some(3024)), ExecutionErrorKind::Timeout);
        assert_eq!(execution_kind(Some(1146)), ExecutionErrorKind::NotFound);
        assert_eq!(execution_kind(Some(2013)), ExecutionErrorKind::Other);
        assert_eq!(execution_kind(None), ExecutionErrorKind::Other);
    }

    #[test]
    fn io_errors_are_unavailable() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        let classified = classify_connect_error(err, &params());
        assert!(classified.is_unavailable());
        assert!(classified.to_string().contains("db.local:3306"));

        assert!(classify_execution_error(sqlx::Error::PoolTimedOut).is_unavailable());
    }

    #[test]
    fn configuration_errors_are_invalid_input() {
        let err = sqlx::Error::Configuration("bad option".into());
        assert!(matches!(
            classify_connect_error(err, &params()),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn protocol_messages_fall_back_to_text_matching() {
        let err = sqlx::Error::Protocol("Access denied for user 'app'@'10.0.0.1'".into());
        assert!(classify_connect_error(err, &params()).is_auth());

        let err = sqlx::Error::Protocol("Unknown database 'shop'".into());
        assert!(matches!(
            classify_connect_error(err, &params()),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), Value::Null);
        assert_eq!(
            decimal_value(Decimal::new(12345, 2)),
            serde_json::json!(123.45)
        );
    }
}
