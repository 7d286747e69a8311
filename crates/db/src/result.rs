use std::fmt;

use serde::Serialize;

/// One cell as SQLite stored it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{value:.1}")
            }
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => {
                f.write_str("'")?;
                for ch in value.chars() {
                    match ch {
                        '\\' => f.write_str("\\\\")?,
                        '\'' => f.write_str("\\'")?,
                        '\n' => f.write_str("\\n")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("'")
            }
            Self::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

/// Rows as a list of tuples, e.g. `[(1, 'Caneta', 40)]`; no rows renders as an
/// empty string.
impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return Ok(());
        }

        f.write_str("[")?;
        for (row_index, row) in self.rows.iter().enumerate() {
            if row_index > 0 {
                f.write_str(", ")?;
            }
            f.write_str("(")?;
            for (cell_index, cell) in row.iter().enumerate() {
                if cell_index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{cell}")?;
            }
            if row.len() == 1 {
                f.write_str(",")?;
            }
            f.write_str(")")?;
        }
        f.write_str("]")
    }
}
