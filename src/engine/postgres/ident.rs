//! `PostgreSQL` identifier handling
//!
//! Table and column names supplied by the caller are never spliced into SQL as-is.
//! Catalog lookups bind them as parameters; statements that need them in the FROM
//! clause use the double-quoted form built here.

use crate::error::{GatewayError, Result};

/// `NAMEDATALEN - 1` on a stock server
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Quote a single identifier: `users` -> `"users"`, `a"b` -> `"a""b"`
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// A table name, optionally schema-qualified (`schema.table`)
///
/// Parts keep their case. A part wrapped in double quotes has the quotes removed
/// and embedded `""` collapsed, so `"Order"` and `Order` name the same table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    schema: Option<String>,
    name: String,
}

impl QualifiedName {
    /// Parse caller input, splitting on the first `.`
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::invalid_input("Table name cannot be empty"));
        }

        match trimmed.split_once('.') {
            Some((schema, name)) => Ok(Self {
                schema: Some(parse_part(schema)?),
                name: parse_part(name)?,
            }),
            None => Ok(Self { schema: None, name: parse_part(trimmed)? }),
        }
    }

    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL-safe form with each part quoted: `"sales"."orders"`
    #[must_use]
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&self.name)),
            None => quote_identifier(&self.name),
        }
    }
}

fn parse_part(part: &str) -> Result<String> {
    let trimmed = part.trim();

    let clean = if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\"\"", "\"")
    } else {
        trimmed.to_string()
    };

    if clean.is_empty() {
        return Err(GatewayError::invalid_input("Identifier cannot be empty"));
    }
    if clean.contains('\0') {
        return Err(GatewayError::invalid_input("Identifier cannot contain NUL characters"));
    }
    if clean.len() > MAX_IDENTIFIER_LENGTH {
        return Err(GatewayError::invalid_input(format!(
            "Identifier exceeds maximum length of {MAX_IDENTIFIER_LENGTH} bytes"
        )));
    }

    Ok(clean)
}
