//! Text Output Rendering
//!
//! This module turns result sets, schema descriptors and analysis reports into the
//! plain-text blocks returned to the agent. Output is deterministic: the same
//! input always renders to the same bytes.
//!
//! # Output Contract
//! - Query results: tab-separated header, dash rule, tab-separated rows, blank line,
//!   `Total rows returned: <n>`
//! - Zero rows: `Query executed successfully. No rows returned.`
//! - `NULL` for null cells; non-numeric cells longer than 100 characters are cut to
//!   97 characters plus `...`
//! - Lines are joined with `\n`, no trailing newline

use crate::engine::{ColumnInfo, DatabaseOverview, ResultSet, TableProfile, TableReport, Value};

/// Rendered for a successful statement that produced no rows
pub const NO_ROWS_MESSAGE: &str = "Query executed successfully. No rows returned.";

/// Rendered when the current schema has no tables
pub const NO_TABLES_MESSAGE: &str = "No tables found in the database.";

/// Cells longer than this (in characters) are truncated
pub const MAX_CELL_CHARS: usize = 100;

const TRUNCATED_CHARS: usize = MAX_CELL_CHARS - 3;

/// Render a query result
#[must_use]
pub fn format_result_set(result: &ResultSet) -> String {
    if result.is_empty() {
        return NO_ROWS_MESSAGE.to_string();
    }

    let header = result.columns.join("\t");
    let dashes = rule('-', header.chars().count());
    let mut lines = Vec::with_capacity(result.row_count() + 4);
    lines.push(header);
    lines.push(dashes);

    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(format_cell).collect();
        lines.push(cells.join("\t"));
    }

    lines.push(String::new());
    lines.push(format!("Total rows returned: {}", result.row_count()));
    lines.join("\n")
}

/// Render one cell, truncating long non-numeric values
#[must_use]
pub fn format_cell(value: &Value) -> String {
    let rendered = value.to_string();
    if value.is_numeric() {
        return rendered;
    }
    truncate(&rendered)
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(TRUNCATED_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Render the table list of the current schema
#[must_use]
pub fn format_table_list(tables: &[String]) -> String {
    if tables.is_empty() {
        return NO_TABLES_MESSAGE.to_string();
    }

    let mut lines = vec!["Available tables:".to_string()];
    lines.extend(tables.iter().map(|table| format!("- {table}")));
    lines.join("\n")
}

/// `Table '<t>' not found.`
#[must_use]
pub fn table_not_found(table: &str) -> String {
    format!("Table '{table}' not found.")
}

/// Render the columns of one table, or the not-found text if there are none
#[must_use]
pub fn format_columns(table: &str, columns: &[ColumnInfo]) -> String {
    if columns.is_empty() {
        return table_not_found(table);
    }

    let mut lines = vec![
        format!("Schema for table '{table}':"),
        "Column Name\tData Type\tNullable\tDefault".to_string(),
        rule('-', 60),
    ];
    for column in columns {
        lines.push(format!(
            "{}\t{}\t{}\t{}",
            column.name,
            column.data_type,
            yes_no(column.nullable),
            column.default.as_deref().unwrap_or("None")
        ));
    }
    lines.join("\n")
}

/// Render a basic single-table analysis
#[must_use]
pub fn format_table_report(report: &TableReport) -> String {
    let mut lines = vec![
        format!("Analysis for table '{}':", report.table),
        rule('=', 50),
        format!("Total rows: {}", group_thousands(report.row_count)),
        format!("Table size: {}", report.size),
        String::new(),
        "Column Statistics:".to_string(),
        "Column\t\tDistinct Values\tCorrelation".to_string(),
        rule('-', 50),
    ];

    for stats in &report.columns {
        let distinct = stats.n_distinct.map_or_else(|| "N/A".to_string(), format_estimate);
        let correlation =
            stats.correlation.map_or_else(|| "N/A".to_string(), |c| format!("{c:.3}"));
        lines.push(format!("{}\t\t{distinct}\t\t{correlation}", stats.name));
    }

    lines.join("\n")
}

/// Render a detailed single-table analysis, or the not-found text if the table
/// has no columns
#[must_use]
pub fn format_table_profile(profile: &TableProfile) -> String {
    if profile.columns.is_empty() {
        return table_not_found(&profile.table);
    }

    let mut lines = vec![format!("Detailed Analysis for table '{}':", profile.table), rule('=', 60)];

    for entry in &profile.columns {
        let column = &entry.column;
        lines.push(String::new());
        lines.push(format!("Column: {}", column.name));
        lines.push(format!("  Type: {}", column.data_type));
        lines.push(format!("  Nullable: {}", yes_no(column.nullable)));
        lines.push(format!("  Default: {}", column.default.as_deref().unwrap_or("None")));

        // Failed or empty samples drop the line for this column only
        if let Some(samples) = entry.samples.as_ref().filter(|s| !s.is_empty()) {
            let samples: Vec<String> = samples.iter().map(|s| truncate(s)).collect();
            lines.push(format!("  Sample values: {}", samples.join(", ")));
        }
    }

    lines.join("\n")
}

/// Render the database-wide analysis
#[must_use]
pub fn format_overview(overview: &DatabaseOverview) -> String {
    let mut lines = vec![
        "Database Overview:".to_string(),
        rule('=', 50),
        "Schema\t\tTable\t\tSize".to_string(),
        rule('-', 50),
    ];

    for table in &overview.tables {
        lines.push(format!("{}\t\t{}\t\t{}", table.schema, table.table, table.size));
    }

    lines.push(String::new());
    lines.push(format!("Total database size: {}", overview.total_size));
    lines.join("\n")
}

/// `1234567` -> `1,234,567`
#[must_use]
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        grouped.push('-');
    }
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// Planner estimates print with at least one decimal (`42.0`, `-0.5`)
fn format_estimate(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

const fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

fn rule(ch: char, width: usize) -> String {
    std::iter::repeat(ch).take(width).collect()
}
