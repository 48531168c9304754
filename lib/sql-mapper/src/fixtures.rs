//! Entities and a recording connection shared by unit tests.

use std::collections::{BTreeMap, VecDeque};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::error::StoreError;
use crate::mapping::{ColumnMapping, MappedType};
use crate::statement::{Connection, PreparedStatement, ResultSet};
use crate::value::{SqlType, SqlValue};
use crate::{Entity, JoinKey, MappedEnum, StorageDatetime};

#[derive(MappedEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductType {
    #[default]
    #[mapped(rename = "BOOK")]
    Book,
    #[mapped(rename = "MUSIC")]
    Music,
    #[mapped(rename = "SOFTWARE")]
    Software,
}

#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[table(name = "products")]
pub struct Product {
    #[id]
    #[generated]
    pub id: i64,
    #[enumerated(name)]
    pub product_type: ProductType,
    pub product_code: String,
    pub rank: i32,
    pub unit_price: Option<Decimal>,
    pub introduced: Option<NaiveDateTime>,
    pub last_modified: Option<StorageDatetime>,
}

#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[table(name = "customers")]
pub struct Customer {
    #[id]
    #[generated]
    pub id: i64,
    #[version]
    pub version: i64,
    pub name: String,
}

#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[table(name = "shipments")]
pub struct Shipment {
    #[id]
    pub id: i64,
    #[enumerated(ordinal)]
    pub category: ProductType,
    #[transient]
    pub note: String,
}

#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[table(name = "tree_nodes")]
pub struct TreeNode {
    #[id]
    pub id: i64,
    pub label: String,
    #[join_column(name = "parent_id")]
    #[column(table = "parents")]
    pub parent: Option<JoinKey<TreeNode>>,
}

#[derive(Entity, Debug, Default)]
pub struct Unmappable {
    #[id]
    #[generated]
    pub a: i64,
    #[id]
    pub b: i64,
}

pub fn column_of<'m>(mapped: &'m MappedType, column: &str) -> &'m ColumnMapping {
    mapped.column(column).unwrap()
}

/// Records prepared SQL and bound parameters; answers queries from
/// `result_columns`/`result_rows` and updates from `update_counts` (default 1).
#[derive(Debug, Default)]
pub struct FakeConnection {
    pub prepared: Vec<String>,
    pub key_columns: Vec<Vec<String>>,
    pub executed: Vec<(String, Vec<SqlValue>)>,
    pub update_counts: VecDeque<u64>,
    pub next_key: i64,
    pub result_columns: Vec<String>,
    pub result_rows: Vec<Vec<SqlValue>>,
    pub cleared: usize,
}

impl Connection for FakeConnection {
    type Statement<'c> = FakeStatement<'c>;

    fn prepare(&mut self, sql: &str) -> Result<FakeStatement<'_>, StoreError> {
        self.prepared.push(sql.to_string());
        Ok(FakeStatement::new(self, sql, false))
    }

    fn prepare_with_keys(
        &mut self,
        sql: &str,
        key_columns: &[&str],
    ) -> Result<FakeStatement<'_>, StoreError> {
        self.prepared.push(sql.to_string());
        self.key_columns
            .push(key_columns.iter().map(|k| k.to_string()).collect());
        Ok(FakeStatement::new(self, sql, true))
    }
}

pub struct FakeStatement<'c> {
    conn: &'c mut FakeConnection,
    sql: String,
    placeholders: usize,
    params: BTreeMap<usize, SqlValue>,
    batch: Vec<Vec<SqlValue>>,
    want_keys: bool,
    last_key: Option<i64>,
}

impl<'c> FakeStatement<'c> {
    fn new(conn: &'c mut FakeConnection, sql: &str, want_keys: bool) -> Self {
        FakeStatement {
            conn,
            sql: sql.to_string(),
            placeholders: sql.matches('?').count(),
            params: BTreeMap::new(),
            batch: Vec::new(),
            want_keys,
            last_key: None,
        }
    }

    fn bound(&self) -> Vec<SqlValue> {
        self.params.values().cloned().collect()
    }

    fn record(&mut self, params: Vec<SqlValue>) -> u64 {
        self.conn.executed.push((self.sql.clone(), params));
        self.conn.update_counts.pop_front().unwrap_or(1)
    }
}

impl PreparedStatement for FakeStatement<'_> {
    type Rows<'s>
        = FakeRows
    where
        Self: 's;

    fn parameter_count(&self) -> usize {
        self.placeholders
    }

    fn parameter_type(&self, _index: usize) -> Option<SqlType> {
        None
    }

    fn set_value(&mut self, index: usize, value: SqlValue) -> Result<(), StoreError> {
        if index == 0 || index > self.placeholders {
            return Err(StoreError::new(format!("parameter index {index} out of range")));
        }
        self.params.insert(index, value);
        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.params.clear();
        self.conn.cleared += 1;
    }

    fn execute_update(&mut self) -> Result<u64, StoreError> {
        let params = self.bound();
        let rows = self.record(params);
        if self.want_keys && rows > 0 {
            self.conn.next_key += 1;
            self.last_key = Some(self.conn.next_key);
        }
        Ok(rows)
    }

    fn add_batch(&mut self) -> Result<(), StoreError> {
        let params = self.bound();
        self.batch.push(params);
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, StoreError> {
        let batch = std::mem::take(&mut self.batch);
        self.last_key = None;
        Ok(batch.into_iter().map(|params| self.record(params)).collect())
    }

    fn generated_keys(&mut self) -> Result<Vec<SqlValue>, StoreError> {
        Ok(self.last_key.take().map(SqlValue::BigInt).into_iter().collect())
    }

    fn execute_query(&mut self) -> Result<FakeRows, StoreError> {
        let params = self.bound();
        self.conn.executed.push((self.sql.clone(), params));
        Ok(FakeRows {
            columns: self.conn.result_columns.clone(),
            rows: self.conn.result_rows.clone(),
            cursor: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FakeRows {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    cursor: Option<usize>,
}

impl FakeRows {
    /// Rows given as (column, value) pairs; every row must share the first row's columns.
    pub fn new(rows: Vec<Vec<(&str, SqlValue)>>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.iter().map(|(name, _)| name.to_string()).collect())
            .unwrap_or_default();
        FakeRows {
            columns,
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|(_, value)| value).collect())
                .collect(),
            cursor: None,
        }
    }

    pub fn empty(columns: &[&str]) -> Self {
        FakeRows {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            cursor: None,
        }
    }
}

impl ResultSet for FakeRows {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Result<&str, StoreError> {
        self.columns
            .get(index.wrapping_sub(1))
            .map(String::as_str)
            .ok_or_else(|| StoreError::new(format!("no column {index}")))
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        let next = self.cursor.map_or(0, |c| c + 1);
        self.cursor = Some(next);
        Ok(next < self.rows.len())
    }

    fn get(&self, index: usize) -> Result<SqlValue, StoreError> {
        self.cursor
            .and_then(|row| self.rows.get(row))
            .and_then(|row| row.get(index.wrapping_sub(1)))
            .cloned()
            .ok_or_else(|| StoreError::new(format!("no value at column {index}")))
    }
}
