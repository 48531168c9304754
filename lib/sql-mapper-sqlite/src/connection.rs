use std::path::Path;

use rusqlite::params_from_iter;
use sql_mapper::{Connection, PreparedStatement, ResultSet, SqlType, SqlValue, StoreError};
use tracing::debug;

use crate::error::SqliteError;
use crate::value::{Declared, Param, read_value};

/// Caller-owned SQLite connection lent to mapper operations.
#[derive(Debug)]
pub struct SqliteConnection(rusqlite::Connection);

impl SqliteConnection {
    pub fn open_in_memory() -> Result<Self, SqliteError> {
        Ok(SqliteConnection(rusqlite::Connection::open_in_memory()?))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteError> {
        Ok(SqliteConnection(rusqlite::Connection::open(path)?))
    }

    /// Runs semicolon-separated statements without parameters (schema setup).
    pub fn execute_batch(&self, sql: &str) -> Result<(), SqliteError> {
        Ok(self.0.execute_batch(sql)?)
    }

    pub fn inner(&self) -> &rusqlite::Connection {
        &self.0
    }

    pub fn into_inner(self) -> rusqlite::Connection {
        self.0
    }
}

impl From<rusqlite::Connection> for SqliteConnection {
    fn from(conn: rusqlite::Connection) -> Self {
        SqliteConnection(conn)
    }
}

impl Connection for SqliteConnection {
    type Statement<'c> = SqliteStatement<'c>;

    fn prepare(&mut self, sql: &str) -> Result<SqliteStatement<'_>, StoreError> {
        SqliteStatement::new(&self.0, sql, false)
    }

    /// SQLite reports only the rowid of the last insert, so `key_columns`
    /// is limited to a single integer primary key.
    fn prepare_with_keys(
        &mut self,
        sql: &str,
        _key_columns: &[&str],
    ) -> Result<SqliteStatement<'_>, StoreError> {
        SqliteStatement::new(&self.0, sql, true)
    }
}

pub struct SqliteStatement<'c> {
    conn: &'c rusqlite::Connection,
    stmt: rusqlite::Statement<'c>,
    params: Vec<Option<SqlValue>>,
    batch: Vec<Vec<SqlValue>>,
    want_keys: bool,
    last_key: Option<i64>,
}

impl<'c> SqliteStatement<'c> {
    fn new(conn: &'c rusqlite::Connection, sql: &str, want_keys: bool) -> Result<Self, StoreError> {
        let stmt = conn.prepare(sql).map_err(SqliteError::from)?;
        let count = stmt.parameter_count();
        Ok(SqliteStatement {
            conn,
            stmt,
            params: vec![None; count],
            batch: Vec::new(),
            want_keys,
            last_key: None,
        })
    }

    fn bound(&self) -> Result<Vec<SqlValue>, SqliteError> {
        self.params
            .iter()
            .enumerate()
            .map(|(i, value)| value.clone().ok_or(SqliteError::UnboundParameter(i + 1)))
            .collect()
    }

    fn run(&mut self, params: &[SqlValue]) -> Result<u64, SqliteError> {
        let rows = self.stmt.execute(params_from_iter(params.iter().map(Param)))?;
        Ok(rows as u64)
    }
}

impl PreparedStatement for SqliteStatement<'_> {
    type Rows<'s>
        = SqliteRows
    where
        Self: 's;

    fn parameter_count(&self) -> usize {
        self.params.len()
    }

    fn parameter_type(&self, _index: usize) -> Option<SqlType> {
        // SQLite parameters are untyped
        None
    }

    fn set_value(&mut self, index: usize, value: SqlValue) -> Result<(), StoreError> {
        let count = self.params.len();
        let slot = index
            .checked_sub(1)
            .and_then(|i| self.params.get_mut(i))
            .ok_or(SqliteError::ParameterIndex { index, count })?;
        *slot = Some(value);
        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.params.iter_mut().for_each(|slot| *slot = None);
    }

    fn execute_update(&mut self) -> Result<u64, StoreError> {
        let params = self.bound()?;
        let rows = self.run(&params)?;
        self.last_key = (self.want_keys && rows > 0).then(|| self.conn.last_insert_rowid());
        Ok(rows)
    }

    fn add_batch(&mut self) -> Result<(), StoreError> {
        let params = self.bound()?;
        self.batch.push(params);
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, StoreError> {
        let batch = std::mem::take(&mut self.batch);
        debug!(entries = batch.len(), "executing batch");
        self.last_key = None;
        let mut counts = Vec::with_capacity(batch.len());
        for params in &batch {
            counts.push(self.run(params)?);
        }
        Ok(counts)
    }

    fn generated_keys(&mut self) -> Result<Vec<SqlValue>, StoreError> {
        Ok(self.last_key.take().map(SqlValue::BigInt).into_iter().collect())
    }

    fn execute_query(&mut self) -> Result<SqliteRows, StoreError> {
        let params = self.bound()?;
        let columns: Vec<(String, Declared)> = self
            .stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), Declared::classify(c.decl_type())))
            .collect();

        let mut rows = self
            .stmt
            .query(params_from_iter(params.iter().map(Param)))
            .map_err(SqliteError::from)?;
        let mut materialized = Vec::new();
        while let Some(row) = rows.next().map_err(SqliteError::from)? {
            let mut values = Vec::with_capacity(columns.len());
            for (i, (name, declared)) in columns.iter().enumerate() {
                let raw = row.get_ref(i).map_err(SqliteError::from)?;
                values.push(read_value(name, raw, *declared)?);
            }
            materialized.push(values);
        }

        Ok(SqliteRows {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            rows: materialized,
            cursor: None,
        })
    }
}

/// Fully read query result; rows are converted while the statement is live.
#[derive(Debug)]
pub struct SqliteRows {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    cursor: Option<usize>,
}

impl ResultSet for SqliteRows {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Result<&str, StoreError> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .map(String::as_str)
            .ok_or_else(|| SqliteError::ColumnIndex { index }.into())
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        let next = self.cursor.map_or(0, |c| c + 1);
        self.cursor = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn get(&self, index: usize) -> Result<SqlValue, StoreError> {
        let row = self
            .cursor
            .and_then(|c| self.rows.get(c))
            .ok_or(SqliteError::NoCurrentRow)?;
        index
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .cloned()
            .ok_or_else(|| SqliteError::ColumnIndex { index }.into())
    }
}
