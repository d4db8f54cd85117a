//! Structured script result: typed columns, rows, and the output log.

use crate::error::{GateResult, ScriptError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Column types a script may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Date and time
    Datetime,
    /// Boolean
    Boolean,
    /// Integer
    Integer,
    /// String
    String,
    /// Calendar date
    Date,
    /// Floating point
    Float,
}

impl ColumnType {
    /// Every supported type, in the order exposed to scripts
    pub const ALL: [ColumnType; 6] = [
        Self::Datetime,
        Self::Boolean,
        Self::Integer,
        Self::String,
        Self::Date,
        Self::Float,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Date => "date",
            Self::Float => "float",
        }
    }

    /// Name of the script constant carrying this type, e.g. `TYPE_INTEGER`
    #[must_use]
    pub fn constant_name(&self) -> String {
        format!("TYPE_{}", self.as_str().to_uppercase())
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                ScriptError::runtime("ValueError", format!("'{s}' is not a supported column type"))
            })
    }
}

/// Declared result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column key used in rows
    pub name: String,
    /// Display name
    pub friendly_name: String,
    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    /// Create a new column
    #[must_use]
    pub fn new(name: impl Into<String>, friendly_name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.into(),
            column_type,
        }
    }
}

/// One result row, keyed by column name in insertion order
pub type Row = IndexMap<String, serde_json::Value>;

/// Secure-mode parameter bindings keyed by logical name
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Outcome of a successful script run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptResult {
    /// Declared columns
    pub columns: Vec<Column>,
    /// Rows
    pub rows: Vec<Row>,
    /// Timestamped output lines
    pub log: Vec<String>,
}

impl ScriptResult {
    /// Create an empty result
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a column name has been declared
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Check that every row only uses declared columns
    ///
    /// # Errors
    ///
    /// Returns a `ValueError` naming the first offending row and key
    pub fn validate(&self) -> GateResult<()> {
        for (index, row) in self.rows.iter().enumerate() {
            if let Some(key) = row.keys().find(|k| !self.has_column(k)) {
                return Err(ScriptError::runtime(
                    "ValueError",
                    format!("row {index} references undeclared column '{key}'"),
                ));
            }
        }
        Ok(())
    }

    /// Serialise to the caller-facing JSON text
    ///
    /// # Errors
    ///
    /// Returns error if a row value cannot be serialised
    pub fn to_json(&self) -> GateResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
