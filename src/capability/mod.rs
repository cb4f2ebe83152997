//! Read-Only Query Classification
//!
//! This module decides whether a candidate SQL string may run and, if so, how it
//! is rewritten before execution. pgwarden never writes: anything that is not a
//! plain query is rejected before a connection is ever opened.
//!
//! # Classification Strategy
//! - Keyword floor: any of the forbidden write/DDL keywords anywhere in the
//!   upper-cased text rejects the statement, even inside identifiers
//! - Prefix gate: the statement must start with `SELECT`, `WITH`, or `EXPLAIN`
//! - Statement-kind parse (PostgreSQL dialect): exactly one statement, which must be
//!   a query or an `EXPLAIN` of a query, and never `SELECT ... INTO`
//! - Limit injection: plain `SELECT`s whose outermost query has no `LIMIT` or
//!   `FETCH` get ` LIMIT n` appended, after any trailing semicolons and comments
//!
//! Classification is pure and never touches the database.

use std::fmt;

use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Location, Token, Tokenizer};

/// Keywords whose presence anywhere in a statement rejects it
pub const FORBIDDEN_KEYWORDS: [&str; 9] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
];

/// Statement prefixes that may reach the parser
const PERMITTED_PREFIXES: [&str; 3] = ["SELECT", "WITH", "EXPLAIN"];

/// Outcome of classifying one SQL string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Statement may run; carries the (possibly limit-augmented) SQL
    Allowed(String),
    Rejected(RejectReason),
}

impl Verdict {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Why a statement was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Blank input
    Empty,
    /// A write or DDL keyword appears somewhere in the text
    ForbiddenKeyword,
    /// Starts with something other than `SELECT`, `WITH`, `EXPLAIN`, or parses to a
    /// non-query statement
    StatementType,
    MultipleStatements,
    /// The PostgreSQL parser could not read the statement
    Unparseable(String),
    /// `SELECT ... INTO` creates a table
    SelectInto,
}

impl RejectReason {
    /// Stable short code, used in logs
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Empty => "empty_query",
            Self::ForbiddenKeyword => "forbidden_keyword",
            Self::StatementType => "statement_type",
            Self::MultipleStatements => "multiple_statements",
            Self::Unparseable(_) => "unparseable",
            Self::SelectInto => "select_into",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Query cannot be empty."),
            Self::ForbiddenKeyword => f.write_str(
                "Modification operations are not allowed. Only SELECT queries are permitted. \
                 Forbidden operation detected in query.",
            ),
            Self::StatementType => {
                f.write_str("Only SELECT, WITH (CTE), and EXPLAIN queries are allowed.")
            }
            Self::MultipleStatements => f.write_str(
                "Multiple statements are not allowed. Submit exactly one query per call.",
            ),
            Self::Unparseable(detail) => write!(f, "Query could not be parsed: {detail}"),
            Self::SelectInto => f.write_str(
                "SELECT ... INTO creates a table and is not allowed. Only read-only queries are permitted.",
            ),
        }
    }
}

/// Classify `sql` under the read-only policy
///
/// # Arguments
/// * `sql` - Candidate statement, as written by the caller
/// * `limit` - Row limit to inject into plain `SELECT`s; `<= 0` disables injection
///
/// # Returns
/// * `Verdict::Allowed(sql)` with the SQL to execute
/// * `Verdict::Rejected(reason)` otherwise
#[must_use]
pub fn classify(sql: &str, limit: i64) -> Verdict {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Verdict::Rejected(RejectReason::Empty);
    }

    let normalized = trimmed.to_uppercase();

    if FORBIDDEN_KEYWORDS.iter().any(|keyword| normalized.contains(keyword)) {
        return Verdict::Rejected(RejectReason::ForbiddenKeyword);
    }

    if !PERMITTED_PREFIXES.iter().any(|prefix| normalized.starts_with(prefix)) {
        return Verdict::Rejected(RejectReason::StatementType);
    }

    let bounded = match check_statement_kind(trimmed) {
        Ok(bounded) => bounded,
        Err(reason) => return Verdict::Rejected(reason),
    };

    if limit <= 0 || bounded || !normalized.starts_with("SELECT") {
        return Verdict::Allowed(sql.to_string());
    }

    Verdict::Allowed(format!("{} LIMIT {limit}", statement_body(trimmed)))
}

/// Parse with the PostgreSQL dialect and confirm a single read-only query
///
/// Returns whether the outermost query already bounds its rows.
fn check_statement_kind(sql: &str) -> Result<bool, RejectReason> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| RejectReason::Unparseable(e.to_string()))?;

    match statements.as_slice() {
        [] => Err(RejectReason::Empty),
        [statement] => check_statement(statement),
        _ => Err(RejectReason::MultipleStatements),
    }
}

fn check_statement(statement: &Statement) -> Result<bool, RejectReason> {
    match statement {
        Statement::Query(query) => {
            if creates_table(&query.body) {
                Err(RejectReason::SelectInto)
            } else {
                Ok(query.limit_clause.is_some() || query.fetch.is_some())
            }
        }
        Statement::Explain { statement, .. } => match statement.as_ref() {
            Statement::Query(_) => check_statement(statement),
            _ => Err(RejectReason::StatementType),
        },
        _ => Err(RejectReason::StatementType),
    }
}

/// True for any `SELECT ... INTO` reachable in the query body
fn creates_table(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => creates_table(&query.body),
        SetExpr::SetOperation { left, right, .. } => creates_table(left) || creates_table(right),
        _ => false,
    }
}

/// The statement up to its last significant token
///
/// Trailing semicolons, whitespace and comments are cut so that an appended
/// clause can never land inside a `--` comment.
fn statement_body(sql: &str) -> &str {
    let fallback = || sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    let Ok(tokens) = Tokenizer::new(&PostgreSqlDialect {}, sql).tokenize_with_location() else {
        return fallback();
    };

    let last = tokens
        .iter()
        .rev()
        .find(|t| !matches!(t.token, Token::Whitespace(_) | Token::SemiColon | Token::EOF));

    last.and_then(|t| byte_offset(sql, t.span.end)).map_or_else(fallback, |end| &sql[..end])
}

/// Convert a 1-based line/column (in characters) to a byte offset into `sql`
fn byte_offset(sql: &str, location: Location) -> Option<usize> {
    let line = usize::try_from(location.line).ok()?;
    let column = usize::try_from(location.column).ok()?;

    let line_start = match line {
        0 => return None,
        1 => 0,
        n => sql.match_indices('\n').nth(n - 2)?.0 + 1,
    };

    let rest = &sql[line_start..];
    let offset = rest.char_indices().nth(column.checked_sub(1)?).map_or(rest.len(), |(i, _)| i);
    Some(line_start + offset)
}
