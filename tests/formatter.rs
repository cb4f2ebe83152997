//! Formatter Output Tests
//!
//! Pins the exact text the agent sees for results, schemas and reports. Inline
//! snapshots contain literal tab characters.

use pgwarden::engine::{ColumnInfo, ColumnProfile, ColumnStats, TableSize};
use pgwarden::output::{
    format_columns, format_overview, format_result_set, format_table_list, format_table_profile,
    format_table_report, NO_ROWS_MESSAGE,
};
use pgwarden::{DatabaseOverview, ResultSet, TableProfile, TableReport, Value};
use pretty_assertions::assert_eq;

fn column(name: &str, data_type: &str, nullable: bool, default: Option<&str>) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable,
        default: default.map(str::to_string),
    }
}

// ============================================================================
// Query results
// ============================================================================

#[test]
fn test_two_columns_three_rows_one_null() {
    let result = ResultSet::new(
        vec!["id".to_string(), "email".to_string()],
        vec![
            vec![Value::Int(1), Value::Text("ada@example.com".to_string())],
            vec![Value::Int(2), Value::Null],
            vec![Value::Int(3), Value::Text("linus@example.com".to_string())],
        ],
    );

    let text = format_result_set(&result);
    assert_eq!(text.matches("NULL").count(), 1);
    insta::assert_snapshot!(text, @r"
id	email
--------
1	ada@example.com
2	NULL
3	linus@example.com

Total rows returned: 3
");
}

#[test]
fn test_zero_rows() {
    let result = ResultSet::new(vec!["id".to_string()], Vec::new());
    assert_eq!(format_result_set(&result), NO_ROWS_MESSAGE);
}

#[test]
fn test_150_character_value_truncated() {
    let long = "abcdefghij".repeat(15);
    let result = ResultSet::new(vec!["note".to_string()], vec![vec![Value::Text(long.clone())]]);

    let text = format_result_set(&result);
    let cell = text.lines().nth(2).expect("row line");
    assert_eq!(cell, format!("{}...", &long[..97]));
}

#[test]
fn test_mixed_value_kinds() {
    let result = ResultSet::new(
        vec!["active".to_string(), "ratio".to_string(), "amount".to_string()],
        vec![vec![Value::Bool(false), Value::Float(0.75), Value::Numeric("1234.50".to_string())]],
    );
    assert_eq!(
        format_result_set(&result),
        "active\tratio\tamount\n-------------------\nfalse\t0.75\t1234.50\n\nTotal rows returned: 1"
    );
}

// ============================================================================
// Schema
// ============================================================================

#[test]
fn test_table_list() {
    let tables = vec!["customers".to_string(), "orders".to_string()];
    insta::assert_snapshot!(format_table_list(&tables), @r"
Available tables:
- customers
- orders
");
}

#[test]
fn test_columns() {
    let columns = vec![
        column("id", "integer", false, Some("nextval('orders_id_seq'::regclass)")),
        column("note", "text", true, None),
    ];
    insta::assert_snapshot!(format_columns("orders", &columns), @r"
Schema for table 'orders':
Column Name	Data Type	Nullable	Default
------------------------------------------------------------
id	integer	NO	nextval('orders_id_seq'::regclass)
note	text	YES	None
");
}

#[test]
fn test_ghost_table() {
    assert_eq!(format_columns("ghost_table", &[]), "Table 'ghost_table' not found.");
}

// ============================================================================
// Analysis
// ============================================================================

#[test]
fn test_basic_report() {
    let report = TableReport {
        table: "orders".to_string(),
        row_count: 1_234_567,
        size: "88 MB".to_string(),
        columns: vec![
            ColumnStats { name: "id".to_string(), n_distinct: Some(-1.0), correlation: Some(1.0) },
            ColumnStats { name: "status".to_string(), n_distinct: Some(4.0), correlation: Some(0.2344) },
            ColumnStats { name: "tags".to_string(), n_distinct: None, correlation: None },
        ],
    };
    insta::assert_snapshot!(format_table_report(&report), @r"
Analysis for table 'orders':
==================================================
Total rows: 1,234,567
Table size: 88 MB

Column Statistics:
Column		Distinct Values	Correlation
--------------------------------------------------
id		-1.0		1.000
status		4.0		0.234
tags		N/A		N/A
");
}

#[test]
fn test_detailed_profile() {
    let profile = TableProfile {
        table: "orders".to_string(),
        columns: vec![
            ColumnProfile {
                column: column("status", "text", false, Some("'new'::text")),
                samples: Some(vec!["new".to_string(), "paid".to_string(), "shipped".to_string()]),
            },
            ColumnProfile { column: column("payload", "json", true, None), samples: None },
        ],
    };
    insta::assert_snapshot!(format_table_profile(&profile), @r"
Detailed Analysis for table 'orders':
============================================================

Column: status
  Type: text
  Nullable: NO
  Default: 'new'::text
  Sample values: new, paid, shipped

Column: payload
  Type: json
  Nullable: YES
  Default: None
");
}

#[test]
fn test_detailed_profile_of_missing_table() {
    let profile = TableProfile { table: "ghost".to_string(), columns: Vec::new() };
    assert_eq!(format_table_profile(&profile), "Table 'ghost' not found.");
}

#[test]
fn test_overview_keeps_database_order_and_ends_with_total() {
    let overview = DatabaseOverview {
        tables: vec![
            TableSize {
                schema: "public".to_string(),
                table: "events".to_string(),
                size: "1200 MB".to_string(),
                bytes: 1_258_291_200,
            },
            TableSize {
                schema: "public".to_string(),
                table: "users".to_string(),
                size: "64 kB".to_string(),
                bytes: 65_536,
            },
        ],
        total_size: "1300 MB".to_string(),
    };
    insta::assert_snapshot!(format_overview(&overview), @r"
Database Overview:
==================================================
Schema		Table		Size
--------------------------------------------------
public		events		1200 MB
public		users		64 kB

Total database size: 1300 MB
");
}
