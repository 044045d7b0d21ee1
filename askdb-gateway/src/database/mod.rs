//! Database handle abstraction.
//!
//! A [`Connector`] opens a [`Database`] from client-supplied credentials; the
//! handle is then owned by one session. MySQL is the production backend.

mod mysql;

pub use mysql::{MySqlConnector, MySqlDatabase};

use askdb_common::Result;
use async_trait::async_trait;
use futures_util::{TryStream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Credentials and target for a new connection.
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Column metadata as reported by `information_schema.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Full column type, e.g. `varchar(255)` or `int unsigned`
    pub data_type: String,
    pub nullable: bool,
    /// `PRI`, `UNI`, `MUL` or empty
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub default_value: Option<String>,
    /// e.g. `auto_increment`
    #[serde(default)]
    pub extra: String,
}

impl ColumnInfo {
    /// Minimal column for tests and fixtures.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            key: String::new(),
            default_value: None,
            extra: String::new(),
        }
    }
}

/// One result row, column name → value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Rows returned by a capped execution.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Untruncated row count, when it could be determined
    pub total_count: Option<u64>,
    /// More rows existed than were returned
    pub limited: bool,
}

impl QueryOutcome {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Collect at most `max_rows` items from `stream`, reading one more to learn
/// whether it was cut short. The stream is not polled past that extra item.
pub async fn take_limited<S>(
    mut stream: S,
    max_rows: usize,
) -> std::result::Result<(Vec<S::Ok>, bool), S::Error>
where
    S: TryStream + Unpin,
{
    let mut items = Vec::new();
    while let Some(item) = stream.try_next().await? {
        if items.len() >= max_rows {
            return Ok((items, true));
        }
        items.push(item);
    }
    Ok((items, false))
}

/// A live connection owned by one session.
#[async_trait]
pub trait Database: Send + Sync {
    /// Name of the connected database.
    fn database_name(&self) -> &str;

    /// Host the handle points at.
    fn host(&self) -> &str;

    /// Server-side connection ID.
    async fn connection_id(&self) -> Result<u64>;

    /// Tables and views in the connected database, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of `table` in ordinal order; empty when the table does not exist.
    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Ask the server to plan `sql` without running it.
    async fn explain(&self, sql: &str) -> Result<()>;

    /// Run a read-only statement, returning at most `max_rows` rows.
    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryOutcome>;

    /// Release the underlying connection.
    async fn close(&self);
}

/// Opens database handles.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn Database>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_params_debug_redacts_password() {
        let params = ConnectParams {
            host: "db.local".into(),
            port: 3306,
            user: "app".into(),
            password: "hunter2".into(),
            database: "shop".into(),
        };
        let debug = format!("{:?}", params);
        assert!(debug.contains("db.local"));
        assert!(!debug.contains("hunter2"));
    }

    async fn take(available: usize, max_rows: usize) -> (Vec<usize>, bool) {
        let stream = futures_util::stream::iter((0..available).map(Ok::<_, ()>));
        take_limited(stream, max_rows).await.unwrap()
    }

    #[tokio::test]
    async fn take_limited_caps_and_flags_truncation() {
        let max = 5;
        for (available, expected_len, expected_limited) in [
            (0, 0, false),
            (max - 1, max - 1, false),
            (max, max, false),
            (max + 1, max, true),
            (max * 4, max, true),
        ] {
            let (rows, limited) = take(available, max).await;
            assert_eq!(rows.len(), expected_len, "{available} rows available");
            assert_eq!(limited, expected_limited, "{available} rows available");
            assert_eq!(rows, (0..expected_len).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn take_limited_stops_after_the_extra_item() {
        let items = vec![Ok(1), Ok(2), Ok(3), Err("read past the limit")];
        let (rows, limited) = take_limited(futures_util::stream::iter(items), 2)
            .await
            .unwrap();
        assert_eq!(rows, vec![1, 2]);
        assert!(limited);

        let failing = vec![Ok(1), Err("connection reset")];
        let err = take_limited(futures_util::stream::iter(failing), 5)
            .await
            .unwrap_err();
        assert_eq!(err, "connection reset");
    }

    #[test]
    fn outcome_row_count() {
        let mut outcome = QueryOutcome::default();
        assert_eq!(outcome.row_count(), 0);
        outcome.rows.push(Row::new());
        assert_eq!(outcome.row_count(), 1);
    }
}
