use std::fmt::Display;

use sql_mapper::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqliteError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Parameter {0} is not bound")]
    UnboundParameter(usize),

    #[error("Parameter index {index} out of range (statement has {count})")]
    ParameterIndex { index: usize, count: usize },

    #[error("Column {index} out of range")]
    ColumnIndex { index: usize },

    #[error("No current row")]
    NoCurrentRow,

    #[error("Column {column} holds REAL {value} where a decimal was expected; declare it with TEXT affinity (e.g. DECIMAL_TEXT) to keep full precision")]
    InexactDecimal { column: String, value: f64 },

    #[error("Cannot read column {column} from {input:?}: {reason}")]
    Parse {
        column: String,
        input: String,
        reason: String,
    },
}

impl SqliteError {
    pub fn parse(column: &str, input: impl Display, reason: impl Display) -> Self {
        SqliteError::Parse {
            column: column.to_string(),
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<SqliteError> for StoreError {
    fn from(error: SqliteError) -> Self {
        StoreError::new(error)
    }
}
