//! `PostgreSQL` Database Engine Implementation
//!
//! This module implements the `DatabaseEngine` trait for `PostgreSQL` databases.
//!
//! # Features
//! - Scoped, single-use connections (`with_connection`)
//! - Read-only sessions (`default_transaction_read_only=on`) and a fixed
//!   `application_name`
//! - Schema introspection via `information_schema`
//! - Table analysis via `pg_stats`, `pg_tables`, and the size functions
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - Column types come from a prepared statement; values come from the simple
//!   (text) protocol so every server type renders without a per-type decoder
//! - Deadline and cancellation are raced against connect + work; the loser is
//!   cancelled server-side through the driver's cancel token
//! - The connection is closed on every exit path before the call returns

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use crate::config::{GatewayConfig, DEFAULT_APPLICATION_NAME};
use crate::engine::{
    CallContext, ColumnInfo, ColumnProfile, ColumnStats, ConnectionDescriptor, DatabaseEngine,
    DatabaseOverview, ResultSet, TableProfile, TableReport, TableSize, Value,
};
use crate::error::{GatewayError, Result};

mod ident;

pub use ident::{quote_identifier, QualifiedName};

/// Boxed future borrowing the connection for `'a`
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Startup option that makes every transaction in the session read-only
const READ_ONLY_OPTION: &str = "-c default_transaction_read_only=on";

/// Distinct sample values shown per column in detailed analysis
pub const SAMPLE_SIZE: usize = 5;

/// How long to wait for the connection task to finish after the client is dropped
const CLOSE_GRACE: Duration = Duration::from_secs(2);

const LIST_TABLES_SQL: &str = "
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = current_schema()
    ORDER BY table_name";

const DESCRIBE_TABLE_SQL: &str = "
    SELECT column_name::text, data_type::text, is_nullable::text, column_default::text
    FROM information_schema.columns
    WHERE table_schema = COALESCE($1::text, current_schema()) AND table_name = $2::text
    ORDER BY ordinal_position";

const TABLE_SIZE_SQL: &str = "SELECT pg_size_pretty(pg_total_relation_size($1::text::regclass))";

const COLUMN_STATS_SQL: &str = "
    SELECT attname::text, n_distinct, correlation
    FROM pg_stats
    WHERE schemaname = COALESCE($1::text, current_schema()) AND tablename = $2::text
    ORDER BY attname";

const TABLE_SIZES_SQL: &str = "
    SELECT schemaname::text,
           tablename::text,
           pg_size_pretty(pg_total_relation_size(format('%I.%I', schemaname, tablename)::regclass)),
           pg_total_relation_size(format('%I.%I', schemaname, tablename)::regclass)
    FROM pg_tables
    WHERE schemaname = current_schema()
    ORDER BY 4 DESC, 2";

const DATABASE_SIZE_SQL: &str = "SELECT pg_size_pretty(pg_database_size(current_database()))";

/// `PostgreSQL` database engine implementation
#[derive(Debug, Clone)]
pub struct PostgresEngine {
    read_only_session: bool,
    application_name: String,
}

impl Default for PostgresEngine {
    fn default() -> Self {
        Self { read_only_session: true, application_name: DEFAULT_APPLICATION_NAME.to_string() }
    }
}

impl PostgresEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session settings taken from the gateway configuration
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            read_only_session: config.read_only_session,
            application_name: config.application_name.clone(),
        }
    }

    /// Driver configuration for one session
    fn session_config(&self, descriptor: &ConnectionDescriptor) -> Result<Config> {
        let mut config: Config = descriptor.as_str().parse().map_err(|e: tokio_postgres::Error| {
            GatewayError::invalid_input(format!("malformed connection descriptor: {e}"))
        })?;

        config.application_name(&self.application_name);

        if self.read_only_session {
            let options = match config.get_options() {
                Some(existing) if !existing.trim().is_empty() => {
                    format!("{existing} {READ_ONLY_OPTION}")
                }
                _ => READ_ONLY_OPTION.to_string(),
            };
            config.options(&options);
        }

        Ok(config)
    }

    /// Open one connection, run `op` on it, and close it
    ///
    /// The deadline in `ctx` covers connect and `op` together. When the deadline
    /// passes or the cancel signal trips while `op` is running, the statement is
    /// cancelled on the server before the connection is closed.
    pub async fn with_connection<T, F>(
        &self,
        descriptor: &ConnectionDescriptor,
        ctx: &CallContext,
        op: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c Client) -> BoxFuture<'c, Result<T>> + Send,
    {
        let config = self.session_config(descriptor)?;
        let started = Instant::now();

        let (client, connection) = ctx
            .guard(started, async { config.connect(NoTls).await.map_err(connect_error) })
            .await?;

        let mut driver = tokio::spawn(async move {
            // Connection errors carry no credentials, only socket/protocol detail
            if let Err(e) = connection.await {
                debug!(error = %e, "connection task ended with error");
            }
        });
        debug!(application_name = %self.application_name, "connection opened");

        let outcome = ctx.guard(started, op(&client)).await;

        if let Err(err) = &outcome {
            if matches!(err, GatewayError::Timeout(_) | GatewayError::Cancelled) {
                warn!(code = err.error_code(), "abandoning statement, cancelling server-side");
                let token = client.cancel_token();
                cancel_server_side(token.cancel_query(NoTls)).await;
            }
        }

        drop(client);
        if tokio::time::timeout(CLOSE_GRACE, &mut driver).await.is_err() {
            driver.abort();
        }
        debug!("connection closed");

        outcome
    }
}

impl DatabaseEngine for PostgresEngine {
    async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        ctx: &CallContext,
        sql: &str,
    ) -> Result<ResultSet> {
        let sql = sql.to_string();
        self.with_connection(descriptor, ctx, move |client| {
            Box::pin(async move { run_query(client, &sql).await })
        })
        .await
    }

    async fn list_tables(
        &self,
        descriptor: &ConnectionDescriptor,
        ctx: &CallContext,
    ) -> Result<Vec<String>> {
        self.with_connection(descriptor, ctx, |client| Box::pin(list_tables(client))).await
    }

    async fn describe_table(
        &self,
        descriptor: &ConnectionDescriptor,
        ctx: &CallContext,
        table: &str,
    ) -> Result<Vec<ColumnInfo>> {
        let name = QualifiedName::parse(table)?;
        self.with_connection(descriptor, ctx, move |client| {
            Box::pin(async move { describe_table(client, &name).await })
        })
        .await
    }

    async fn table_report(
        &self,
        descriptor: &ConnectionDescriptor,
        ctx: &CallContext,
        table: &str,
    ) -> Result<TableReport> {
        let name = QualifiedName::parse(table)?;
        let display = table.trim().to_string();
        self.with_connection(descriptor, ctx, move |client| {
            Box::pin(async move { table_report(client, &name, display).await })
        })
        .await
    }

    async fn table_profile(
        &self,
        descriptor: &ConnectionDescriptor,
        ctx: &CallContext,
        table: &str,
    ) -> Result<TableProfile> {
        let name = QualifiedName::parse(table)?;
        let display = table.trim().to_string();
        self.with_connection(descriptor, ctx, move |client| {
            Box::pin(async move { table_profile(client, &name, display).await })
        })
        .await
    }

    async fn overview(
        &self,
        descriptor: &ConnectionDescriptor,
        ctx: &CallContext,
    ) -> Result<DatabaseOverview> {
        self.with_connection(descriptor, ctx, |client| Box::pin(overview(client))).await
    }
}

/// Wait for a cancel request, giving up after `CLOSE_GRACE`
///
/// The request opens its own socket, so an unreachable server would otherwise
/// hold the call past its deadline.
async fn cancel_server_side<F>(cancel: F)
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>>,
{
    match tokio::time::timeout(CLOSE_GRACE, cancel).await {
        Ok(Ok(())) => debug!("server-side cancel sent"),
        Ok(Err(e)) => debug!(error = %e, "server-side cancel failed"),
        Err(_) => warn!("server-side cancel timed out, dropping connection"),
    }
}

fn connect_error(err: tokio_postgres::Error) -> GatewayError {
    match err.as_db_error() {
        Some(db_err) => GatewayError::connection_failed(db_err.message()),
        None => GatewayError::connection_failed(err.to_string()),
    }
}

/// Execute a classified statement and collect its rows
async fn run_query(client: &Client, sql: &str) -> Result<ResultSet> {
    let statement = client.prepare(sql).await?;

    let columns: Vec<String> =
        statement.columns().iter().map(|c| c.name().to_string()).collect();
    let kinds: Vec<ValueKind> =
        statement.columns().iter().map(|c| ValueKind::of(c.type_())).collect();

    let messages = client.simple_query(sql).await?;

    let mut rows = Vec::new();
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let values = (0..row.len())
                .map(|idx| {
                    let kind = kinds.get(idx).copied().unwrap_or(ValueKind::Text);
                    decode_text(row.get(idx), kind)
                })
                .collect();
            rows.push(values);
        }
    }

    Ok(ResultSet { columns, rows })
}

/// How a column's text values are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Bool,
    Int,
    Float,
    Numeric,
    Text,
}

impl ValueKind {
    fn of(ty: &Type) -> Self {
        match *ty {
            Type::BOOL => Self::Bool,
            Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => Self::Int,
            Type::FLOAT4 | Type::FLOAT8 => Self::Float,
            Type::NUMERIC => Self::Numeric,
            _ => Self::Text,
        }
    }
}

/// Convert one text-protocol cell into a `Value`
///
/// Anything that fails to parse as its declared kind is kept verbatim.
fn decode_text(raw: Option<&str>, kind: ValueKind) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };

    match kind {
        ValueKind::Bool => match raw {
            "t" => Value::Bool(true),
            "f" => Value::Bool(false),
            other => Value::Text(other.to_string()),
        },
        ValueKind::Int => raw.parse().map_or_else(|_| Value::Numeric(raw.to_string()), Value::Int),
        ValueKind::Float => {
            raw.parse().map_or_else(|_| Value::Numeric(raw.to_string()), Value::Float)
        }
        ValueKind::Numeric => Value::Numeric(raw.to_string()),
        ValueKind::Text => Value::Text(raw.to_string()),
    }
}

async fn list_tables(client: &Client) -> Result<Vec<String>> {
    let rows = client.query(LIST_TABLES_SQL, &[]).await?;
    rows.iter().map(|row| row.try_get(0).map_err(GatewayError::from)).collect()
}

async fn describe_table(client: &Client, name: &QualifiedName) -> Result<Vec<ColumnInfo>> {
    let rows = client.query(DESCRIBE_TABLE_SQL, &[&name.schema(), &name.name()]).await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let is_nullable: String = row.try_get(2)?;
        columns.push(ColumnInfo {
            name: row.try_get(0)?,
            data_type: row.try_get(1)?,
            nullable: is_nullable == "YES",
            default: row.try_get(3)?,
        });
    }

    Ok(columns)
}

async fn table_report(client: &Client, name: &QualifiedName, display: String) -> Result<TableReport> {
    let count_sql = format!("SELECT COUNT(*) FROM {}", name.quoted());
    let row_count: i64 = client.query_one(count_sql.as_str(), &[]).await?.try_get(0)?;

    let size: String = client.query_one(TABLE_SIZE_SQL, &[&name.quoted()]).await?.try_get(0)?;

    let rows = client.query(COLUMN_STATS_SQL, &[&name.schema(), &name.name()]).await?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        columns.push(ColumnStats {
            name: row.try_get(0)?,
            n_distinct: row.try_get(1)?,
            correlation: row.try_get(2)?,
        });
    }

    Ok(TableReport { table: display, row_count, size, columns })
}

async fn table_profile(
    client: &Client,
    name: &QualifiedName,
    display: String,
) -> Result<TableProfile> {
    let columns = describe_table(client, name).await?;

    let mut profiles = Vec::with_capacity(columns.len());
    for column in columns {
        let samples = sample_values(client, name, &column.name).await;
        profiles.push(ColumnProfile { column, samples });
    }

    Ok(TableProfile { table: display, columns: profiles })
}

/// Up to `SAMPLE_SIZE` distinct non-null values, or `None` if the column cannot
/// be sampled (e.g. a type without an equality operator)
async fn sample_values(client: &Client, table: &QualifiedName, column: &str) -> Option<Vec<String>> {
    let quoted = quote_identifier(column);
    let sql = format!(
        "SELECT DISTINCT {quoted} FROM {} WHERE {quoted} IS NOT NULL LIMIT {SAMPLE_SIZE}",
        table.quoted()
    );

    match client.simple_query(&sql).await {
        Ok(messages) => Some(
            messages
                .iter()
                .filter_map(|message| match message {
                    SimpleQueryMessage::Row(row) => row.get(0).map(str::to_string),
                    _ => None,
                })
                .collect(),
        ),
        Err(e) => {
            debug!(column, error = %e, "sample query failed, omitting samples");
            None
        }
    }
}

async fn overview(client: &Client) -> Result<DatabaseOverview> {
    let rows = client.query(TABLE_SIZES_SQL, &[]).await?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        tables.push(TableSize {
            schema: row.try_get(0)?,
            table: row.try_get(1)?,
            size: row.try_get(2)?,
            bytes: row.try_get(3)?,
        });
    }

    let total_size: String = client.query_one(DATABASE_SIZE_SQL, &[]).await?.try_get(0)?;

    Ok(DatabaseOverview { tables, total_size })
}
