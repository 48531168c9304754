//! Execution-layer interfaces implemented by database collaborators.
//!
//! The mapper never opens, pools or closes connections. Callers hand it a
//! connection for the duration of one operation; statements and result sets
//! created from it are dropped before the operation returns.
//!
//! Parameter and column indexes are 1-based.

use crate::error::StoreError;
use crate::value::{SqlType, SqlValue};

pub trait Connection {
    type Statement<'c>: PreparedStatement
    where
        Self: 'c;

    fn prepare(&mut self, sql: &str) -> Result<Self::Statement<'_>, StoreError>;

    /// Prepares a statement whose generated values for `key_columns` are
    /// reported by [`PreparedStatement::generated_keys`] after execution.
    fn prepare_with_keys(
        &mut self,
        sql: &str,
        key_columns: &[&str],
    ) -> Result<Self::Statement<'_>, StoreError>;
}

pub trait PreparedStatement {
    type Rows<'s>: ResultSet
    where
        Self: 's;

    fn parameter_count(&self) -> usize;

    /// Declared type of a placeholder, when the driver knows it.
    fn parameter_type(&self, index: usize) -> Option<SqlType>;

    fn set_value(&mut self, index: usize, value: SqlValue) -> Result<(), StoreError>;

    fn clear_parameters(&mut self);

    /// Executes with the current parameters and returns the affected row count.
    fn execute_update(&mut self) -> Result<u64, StoreError>;

    /// Queues the current parameters as one batch entry.
    fn add_batch(&mut self) -> Result<(), StoreError>;

    /// Executes every queued entry and returns per-entry affected row counts.
    fn execute_batch(&mut self) -> Result<Vec<u64>, StoreError>;

    /// Keys generated by the last non-batched execution.
    fn generated_keys(&mut self) -> Result<Vec<SqlValue>, StoreError>;

    fn execute_query(&mut self) -> Result<Self::Rows<'_>, StoreError>;
}

pub trait ResultSet {
    fn column_count(&self) -> usize;

    fn column_name(&self, index: usize) -> Result<&str, StoreError>;

    /// Advances to the next row; `false` once exhausted.
    fn next(&mut self) -> Result<bool, StoreError>;

    /// Value of a column in the current row.
    fn get(&self, index: usize) -> Result<SqlValue, StoreError>;
}
