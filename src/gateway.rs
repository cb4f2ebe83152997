//! Gateway Façade
//!
//! The three operations an agent can call: `query`, `schema` and `analyze`. Each
//! call is independent. It classifies (query only), opens a connection, does its
//! work, renders text, and releases the connection.
//!
//! # Failure Surface
//! Nothing here returns an error. Every failure becomes a line of text that starts
//! with `Error`, so the agent can read it and try again. The `*_with` variants also
//! return a [`Reply`] whose flag says whether the call failed, so transports never
//! have to guess from the text.

use std::fmt;

use tracing::{debug, info, warn};

use crate::capability::{classify, Verdict};
use crate::config::GatewayConfig;
use crate::engine::postgres::PostgresEngine;
use crate::engine::{AnalysisMode, CallContext, ConnectionDescriptor, DatabaseEngine};
use crate::error::GatewayError;
use crate::output;

/// Returned verbatim by every operation when no descriptor is configured
pub const NO_CONNECTION_MESSAGE: &str =
    "Error: No database connection available. Database connection should be established at startup.";

/// Which façade operation failed, for the error prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Query,
    Schema,
    Analyze,
}

impl Operation {
    const fn name(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Schema => "schema",
            Self::Analyze => "analyze",
        }
    }

    const fn activity(self) -> &'static str {
        match self {
            Self::Query => "executing query",
            Self::Schema => "getting schema",
            Self::Analyze => "performing analysis",
        }
    }
}

/// Rendered text of one call plus whether the call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    text: String,
    is_error: bool,
}

impl Reply {
    #[must_use]
    pub const fn success(text: String) -> Self {
        Self { text, is_error: false }
    }

    #[must_use]
    pub const fn failure(text: String) -> Self {
        Self { text, is_error: true }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Set for rejections, missing connections and database failures only
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_error
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Render an operation failure as agent-facing text
fn render_failure(operation: Operation, err: &GatewayError) -> Reply {
    if matches!(err, GatewayError::NoConnection) {
        return Reply::failure(NO_CONNECTION_MESSAGE.to_string());
    }
    warn!(
        operation = operation.name(),
        code = err.error_code(),
        error = %err,
        "operation failed"
    );
    Reply::failure(format!("Error {}: {}", operation.activity(), err.message()))
}

/// Read-only SQL gateway over one connection descriptor
///
/// Holds configuration only; no connection outlives a call.
#[derive(Debug, Clone)]
pub struct Gateway<E = PostgresEngine> {
    config: GatewayConfig,
    engine: E,
}

impl Gateway<PostgresEngine> {
    /// Gateway backed by `PostgreSQL`
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let engine = PostgresEngine::from_config(&config);
        Self { config, engine }
    }
}

impl<E: DatabaseEngine> Gateway<E> {
    /// Gateway backed by any engine
    pub fn with_engine(config: GatewayConfig, engine: E) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Context with the configured deadline and no cancellation signal
    pub fn call_context(&self) -> CallContext {
        self.config.call_context()
    }

    fn descriptor(&self) -> Result<ConnectionDescriptor, GatewayError> {
        self.config.descriptor().ok_or(GatewayError::NoConnection)
    }

    /// Classify, limit, execute, and render one statement
    ///
    /// `limit` of `None` uses the configured default; `<= 0` disables limiting.
    pub async fn query(&self, sql: &str, limit: Option<i64>) -> String {
        self.query_with(&self.call_context(), sql, limit).await.into_text()
    }

    /// `query` with a caller-supplied deadline/cancellation context
    pub async fn query_with(&self, ctx: &CallContext, sql: &str, limit: Option<i64>) -> Reply {
        let limit = limit.unwrap_or(self.config.default_limit);
        info!(operation = "query", limit, "gateway call");

        // Classification comes first: a rejected statement is reported even
        // when there is no connection
        let rewritten = match classify(sql, limit) {
            Verdict::Allowed(rewritten) => rewritten,
            Verdict::Rejected(reason) => {
                warn!(operation = "query", reason = reason.code(), "statement rejected");
                return Reply::failure(format!("Error: {reason}"));
            }
        };

        let descriptor = match self.descriptor() {
            Ok(descriptor) => descriptor,
            Err(err) => return render_failure(Operation::Query, &err),
        };

        debug!(sql = %rewritten, "executing classified statement");
        match self.engine.execute(&descriptor, ctx, &rewritten).await {
            Ok(result) => {
                debug!(rows = result.row_count(), "statement completed");
                Reply::success(output::format_result_set(&result))
            }
            Err(err) => render_failure(Operation::Query, &err),
        }
    }

    /// List tables, or describe one table's columns
    pub async fn schema(&self, table: Option<&str>) -> String {
        self.schema_with(&self.call_context(), table).await.into_text()
    }

    /// `schema` with a caller-supplied deadline/cancellation context
    pub async fn schema_with(&self, ctx: &CallContext, table: Option<&str>) -> Reply {
        let table = non_blank(table);
        info!(operation = "schema", table, "gateway call");

        let descriptor = match self.descriptor() {
            Ok(descriptor) => descriptor,
            Err(err) => return render_failure(Operation::Schema, &err),
        };

        let rendered = match table {
            None => self
                .engine
                .list_tables(&descriptor, ctx)
                .await
                .map(|tables| output::format_table_list(&tables)),
            Some(table) => self
                .engine
                .describe_table(&descriptor, ctx, table)
                .await
                .map(|columns| output::format_columns(table, &columns)),
        };

        rendered.map_or_else(|err| render_failure(Operation::Schema, &err), Reply::success)
    }

    /// Analyze one table, or the whole database when `table` is absent
    ///
    /// `mode` is ignored for the database-wide overview.
    pub async fn analyze(&self, table: Option<&str>, mode: AnalysisMode) -> String {
        self.analyze_with(&self.call_context(), table, mode).await.into_text()
    }

    /// `analyze` with a caller-supplied deadline/cancellation context
    pub async fn analyze_with(
        &self,
        ctx: &CallContext,
        table: Option<&str>,
        mode: AnalysisMode,
    ) -> Reply {
        let table = non_blank(table);
        info!(operation = "analyze", table, mode = mode.as_str(), "gateway call");

        let descriptor = match self.descriptor() {
            Ok(descriptor) => descriptor,
            Err(err) => return render_failure(Operation::Analyze, &err),
        };

        let rendered = match (table, mode) {
            (None, _) => self
                .engine
                .overview(&descriptor, ctx)
                .await
                .map(|overview| output::format_overview(&overview)),
            (Some(table), AnalysisMode::Basic) => self
                .engine
                .table_report(&descriptor, ctx, table)
                .await
                .map(|report| output::format_table_report(&report)),
            (Some(table), AnalysisMode::Detailed) => self
                .engine
                .table_profile(&descriptor, ctx, table)
                .await
                .map(|profile| output::format_table_profile(&profile)),
        };

        rendered.map_or_else(|err| render_failure(Operation::Analyze, &err), Reply::success)
    }
}

fn non_blank(table: Option<&str>) -> Option<&str> {
    table.map(str::trim).filter(|t| !t.is_empty())
}
