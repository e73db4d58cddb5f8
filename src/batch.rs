// 📋 Batch - Untyped tabular data shared by loaders and the pipeline
// Column names are preserved exactly as the sources spell them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// VALUE
// ============================================================================

/// Text spellings that loaders treat as a missing cell.
pub const MISSING_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "<NA>",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    /// Build a value from a raw text cell, mapping NA spellings to `Null`.
    pub fn from_text(raw: &str) -> Self {
        if MISSING_TOKENS.contains(&raw) {
            Value::Null
        } else {
            Value::Text(raw.to_string())
        }
    }

    pub fn number(n: f64) -> Self {
        if n.is_nan() {
            Value::Null
        } else {
            Value::Number(n)
        }
    }

    /// NaN counts as missing, same as an explicit null.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => n.is_nan(),
            Value::Text(_) => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Parse into a number. Anything unparsable becomes `Null`.
    pub fn coerce_numeric(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Number(n) => Value::number(*n),
            Value::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Value::Number(n),
                _ => Value::Null,
            },
        }
    }

    /// Render an identifier so `101`, `101.0` and `"101"` compare equal.
    /// Text is kept verbatim, surrounding whitespace included.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) if n.is_nan() => None,
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            Value::Number(n) => Some(n.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

// ============================================================================
// ROW
// ============================================================================

pub type Row = BTreeMap<String, Value>;

/// Look up a column, treating an absent column as missing.
pub fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
    const NULL: &Value = &Value::Null;
    row.get(column).unwrap_or(NULL)
}

// ============================================================================
// BATCH
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn new(columns: Vec<String>) -> Self {
        Batch {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, filling columns the row lacks with `Null`.
    pub fn push_row(&mut self, mut row: Row) {
        for column in &row.keys().cloned().collect::<Vec<_>>() {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
        for column in &self.columns {
            row.entry(column.clone()).or_insert(Value::Null);
        }
        self.rows.push(row);
    }

    /// Build a batch from a header and positional records.
    pub fn from_records(columns: Vec<String>, records: Vec<Vec<Value>>) -> Self {
        let mut batch = Batch::new(columns.clone());
        for record in records {
            let mut row = Row::new();
            for (i, column) in columns.iter().enumerate() {
                let value = record.get(i).cloned().unwrap_or(Value::Null);
                row.insert(column.clone(), value);
            }
            batch.rows.push(row);
        }
        batch
    }

    /// Row-wise concatenation. Columns are the union of all inputs in
    /// first-seen order, and rows from a batch that lacks a column get `Null`.
    pub fn concat(batches: Vec<Batch>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for batch in &batches {
            for column in &batch.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for batch in batches {
            for mut row in batch.rows {
                for column in &columns {
                    row.entry(column.clone()).or_insert(Value::Null);
                }
                rows.push(row);
            }
        }

        Batch { columns, rows }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
