//! Connection-scoped mapping operations.
//!
//! Every operation borrows a caller-owned connection, prepares exactly one
//! statement on it and drops the statement (and any result set) before
//! returning. Opening, pooling and transactions stay with the caller.

use std::sync::Arc;

use tracing::debug;

use crate::binder::StatementBinder;
use crate::cache::SqlCache;
use crate::coerce::ValueCoercer;
use crate::config::MapperConfig;
use crate::entity::Entity;
use crate::error::MapperError;
use crate::hydrate::ResultHydrator;
use crate::mapping::MappedType;
use crate::registry::TypeRegistry;
use crate::statement::{Connection, PreparedStatement, ResultSet};
use crate::value::{FieldKind, SqlValue, Value};

#[derive(Debug)]
pub struct SqlMapper {
    registry: TypeRegistry,
    cache: SqlCache,
    coercer: ValueCoercer,
}

impl Default for SqlMapper {
    fn default() -> Self {
        SqlMapper::new(MapperConfig::default())
    }
}

impl SqlMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self::with_coercer(config, ValueCoercer::new())
    }

    /// Uses `coercer` (typically carrying backend [`crate::CoercionRule`]s).
    pub fn with_coercer(config: MapperConfig, coercer: ValueCoercer) -> Self {
        SqlMapper {
            registry: TypeRegistry::new(),
            cache: SqlCache::new(config.statement_cache_size),
            coercer,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &SqlCache {
        &self.cache
    }

    pub fn coercer(&self) -> &ValueCoercer {
        &self.coercer
    }

    pub fn mapped<T: Entity>(&self) -> Result<Arc<MappedType>, MapperError> {
        Ok(self.registry.get::<T>()?)
    }

    /// Inserts `object` and assigns its generated id.
    pub fn insert_object<C, T>(&self, conn: &mut C, object: &mut T) -> Result<u64, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.insert(&mapped);
        let keys = generated_key_columns(&mapped);
        let mut statement = prepare(conn, &sql, &keys)?;
        self.binder().insert(&mut statement, &mapped, object)
    }

    /// Inserts all objects in one batch. Generated ids are not assigned.
    pub fn insert_list_batched<C, T>(
        &self,
        conn: &mut C,
        objects: &[T],
    ) -> Result<Vec<u64>, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        if objects.is_empty() {
            return Ok(Vec::new());
        }
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.insert(&mapped);
        let keys = generated_key_columns(&mapped);
        let mut statement = prepare(conn, &sql, &keys)?;
        let binder = self.binder();
        for object in objects {
            binder.add_batch(&mut statement, &mapped, object)?;
        }
        Ok(statement.execute_batch()?)
    }

    /// Inserts objects one execution at a time on a single statement,
    /// assigning generated ids. Returns the total affected row count.
    pub fn insert_list_not_batched<C, T>(
        &self,
        conn: &mut C,
        objects: &mut [T],
    ) -> Result<u64, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        if objects.is_empty() {
            return Ok(0);
        }
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.insert(&mapped);
        let keys = generated_key_columns(&mapped);
        let mut statement = prepare(conn, &sql, &keys)?;
        let binder = self.binder();
        let mut total = 0;
        for object in objects.iter_mut() {
            total += binder.insert(&mut statement, &mapped, object)?;
        }
        Ok(total)
    }

    /// Updates `object`, applying the optimistic version check when mapped.
    pub fn update_object<C, T>(&self, conn: &mut C, object: &mut T) -> Result<u64, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.update(&mapped)?;
        let mut statement = prepare(conn, &sql, &[])?;
        self.binder().update(&mut statement, &mapped, object)
    }

    pub fn delete_object<C, T>(&self, conn: &mut C, object: &T) -> Result<u64, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.delete_by_id(&mapped)?;
        let mut statement = prepare(conn, &sql, &[])?;
        self.binder().delete(&mut statement, &mapped, object)
    }

    /// Deletes by id values in id-column order. Versioned types also take the
    /// expected version as the last argument.
    pub fn delete_object_by_id<T, C>(&self, conn: &mut C, ids: &[Value]) -> Result<u64, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.delete_by_id(&mapped)?;
        self.execute(conn, &sql, ids)
    }

    pub fn object_by_id<T, C>(&self, conn: &mut C, ids: &[Value]) -> Result<Option<T>, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.select_by_id(&mapped)?;
        self.fetch_single(conn, &mapped, &sql, ids)
    }

    pub fn object_from_clause<T, C>(
        &self,
        conn: &mut C,
        clause: &str,
        args: &[Value],
    ) -> Result<Option<T>, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.select(&mapped, Some(clause));
        self.fetch_single(conn, &mapped, &sql, args)
    }

    /// Every row of the mapped table.
    pub fn list<T, C>(&self, conn: &mut C) -> Result<Vec<T>, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.select(&mapped, None);
        self.fetch_list(conn, &mapped, &sql, &[])
    }

    pub fn list_from_clause<T, C>(
        &self,
        conn: &mut C,
        clause: &str,
        args: &[Value],
    ) -> Result<Vec<T>, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.select(&mapped, Some(clause));
        self.fetch_list(conn, &mapped, &sql, args)
    }

    /// Hydrates the rows of caller-written SQL.
    pub fn list_from_query<T, C>(
        &self,
        conn: &mut C,
        sql: &str,
        args: &[Value],
    ) -> Result<Vec<T>, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        self.fetch_list(conn, &mapped, sql, args)
    }

    /// Zero when the count query returns no row.
    pub fn count_objects_from_clause<T, C>(
        &self,
        conn: &mut C,
        clause: &str,
        args: &[Value],
    ) -> Result<i64, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mapped = self.mapped::<T>()?;
        let sql = self.cache.count(&mapped, Some(clause));
        match self.number_from_sql(conn, &sql, args)? {
            Some(value) => match self.coercer.to_kind(value, FieldKind::I64)? {
                Value::I64(count) => Ok(count),
                _ => Ok(0),
            },
            None => Ok(0),
        }
    }

    /// First column of the first row; `None` for no row or SQL NULL.
    pub fn number_from_sql<C>(
        &self,
        conn: &mut C,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<SqlValue>, MapperError>
    where
        C: Connection,
    {
        let mut statement = prepare(conn, sql, &[])?;
        self.binder().bind_arguments(&mut statement, args)?;
        let mut rows = statement.execute_query()?;
        if !rows.next()? {
            return Ok(None);
        }
        let value = rows.get(1)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    /// Executes caller-written SQL and returns the affected row count.
    pub fn execute_update<C>(
        &self,
        conn: &mut C,
        sql: &str,
        args: &[Value],
    ) -> Result<u64, MapperError>
    where
        C: Connection,
    {
        self.execute(conn, sql, args)
    }

    fn execute<C: Connection>(
        &self,
        conn: &mut C,
        sql: &str,
        args: &[Value],
    ) -> Result<u64, MapperError> {
        let mut statement = prepare(conn, sql, &[])?;
        self.binder().bind_arguments(&mut statement, args)?;
        match statement.execute_update() {
            Ok(rows) => Ok(rows),
            Err(e) => {
                statement.clear_parameters();
                Err(e.into())
            }
        }
    }

    fn fetch_list<T, C>(
        &self,
        conn: &mut C,
        mapped: &MappedType,
        sql: &str,
        args: &[Value],
    ) -> Result<Vec<T>, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mut statement = prepare(conn, sql, &[])?;
        self.binder().bind_arguments(&mut statement, args)?;
        let mut rows = statement.execute_query()?;
        self.hydrator().list_from(mapped, &mut rows)
    }

    fn fetch_single<T, C>(
        &self,
        conn: &mut C,
        mapped: &MappedType,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<T>, MapperError>
    where
        C: Connection,
        T: Entity,
    {
        let mut statement = prepare(conn, sql, &[])?;
        self.binder().bind_arguments(&mut statement, args)?;
        let mut rows = statement.execute_query()?;
        self.hydrator().single_from(mapped, &mut rows)
    }

    fn binder(&self) -> StatementBinder<'_> {
        StatementBinder::new(&self.coercer)
    }

    fn hydrator(&self) -> ResultHydrator<'_> {
        ResultHydrator::new(&self.coercer)
    }
}

fn prepare<'c, C: Connection>(
    conn: &'c mut C,
    sql: &str,
    key_columns: &[&str],
) -> Result<C::Statement<'c>, MapperError> {
    debug!(sql = %sql, "preparing statement");
    let statement = if key_columns.is_empty() {
        conn.prepare(sql)?
    } else {
        conn.prepare_with_keys(sql, key_columns)?
    };
    Ok(statement)
}

fn generated_key_columns(mapped: &MappedType) -> Vec<&str> {
    mapped
        .generated_id()
        .map(|c| vec![c.column.as_str()])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Customer, FakeConnection, Product, ProductType};
    use crate::value::SqlType;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_prepares_with_generated_key_column() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        let mut customer = Customer {
            name: "Ann".into(),
            ..Customer::default()
        };

        assert_eq!(mapper.insert_object(&mut conn, &mut customer).unwrap(), 1);
        assert_eq!(customer.id, 1);
        assert_eq!(conn.key_columns, vec![vec!["id".to_string()]]);
        assert_eq!(
            conn.prepared,
            vec!["INSERT INTO customers(version,name) VALUES (?,?)".to_string()]
        );
    }

    #[test]
    fn not_batched_insert_assigns_every_id() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        let mut customers = vec![Customer::default(), Customer::default()];

        assert_eq!(mapper.insert_list_not_batched(&mut conn, &mut customers).unwrap(), 2);
        assert_eq!(customers.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(conn.prepared.len(), 1);
    }

    #[test]
    fn batched_insert_of_nothing_prepares_nothing() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        let none: Vec<Customer> = Vec::new();
        assert!(mapper.insert_list_batched(&mut conn, &none).unwrap().is_empty());
        assert!(conn.prepared.is_empty());
    }

    #[test]
    fn object_by_id_returns_none_when_missing() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        let found: Option<Product> = mapper.object_by_id(&mut conn, &[5i64.into()]).unwrap();
        assert_eq!(found, None);
        assert!(conn.prepared[0].ends_with("FROM products products WHERE id=?"));
        assert_eq!(conn.executed[0].1, vec![SqlValue::BigInt(5)]);
    }

    #[test]
    fn list_from_clause_hydrates_rows() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        conn.result_columns = vec!["id".into(), "product_code".into(), "product_type".into()];
        conn.result_rows = vec![
            vec![SqlValue::BigInt(1), SqlValue::Text("A1".into()), SqlValue::Text("BOOK".into())],
            vec![SqlValue::BigInt(2), SqlValue::Text("B2".into()), SqlValue::Text("MUSIC".into())],
        ];

        let products: Vec<Product> = mapper
            .list_from_clause(&mut conn, "rank > ?", &[0i32.into()])
            .unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[1].product_type, ProductType::Music);
        assert!(conn.prepared[0].ends_with("products products WHERE rank > ?"));
    }

    #[test]
    fn count_is_zero_without_rows() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        let count = mapper
            .count_objects_from_clause::<Product, _>(&mut conn, "product_code=?", &["Z9".into()])
            .unwrap();
        assert_eq!(count, 0);

        conn.result_columns = vec!["count".into()];
        conn.result_rows = vec![vec![SqlValue::BigInt(3)]];
        let count = mapper
            .count_objects_from_clause::<Product, _>(&mut conn, "", &[])
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(conn.prepared[1], "SELECT COUNT(products.id) FROM products products");
    }

    #[test]
    fn number_from_sql_maps_null_to_none() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        conn.result_columns = vec!["max".into()];
        conn.result_rows = vec![vec![SqlValue::Null(SqlType::BigInt)]];
        assert_eq!(mapper.number_from_sql(&mut conn, "SELECT MAX(id) FROM products", &[]).unwrap(), None);
    }

    #[test]
    fn delete_by_id_of_versioned_type_takes_version() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        let err = mapper
            .delete_object_by_id::<Customer, _>(&mut conn, &[1i64.into()])
            .unwrap_err();
        assert!(matches!(err, MapperError::ParameterMismatch { expected: 2, supplied: 1 }));

        let rows = mapper
            .delete_object_by_id::<Customer, _>(&mut conn, &[1i64.into(), 4i64.into()])
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn stale_delete_is_a_version_conflict() {
        let mapper = SqlMapper::default();
        let mut conn = FakeConnection::default();
        conn.update_counts.push_back(0);
        let stale = Customer {
            id: 3,
            version: 2,
            name: "x".into(),
        };
        assert!(mapper.delete_object(&mut conn, &stale).unwrap_err().is_version_conflict());
        assert_eq!(
            conn.executed[0].1,
            vec![SqlValue::BigInt(3), SqlValue::BigInt(2)]
        );
    }
}
