//! Parameter binding for writes, with optimistic versioning and generated keys.

use tracing::debug;

use crate::coerce::ValueCoercer;
use crate::entity::Entity;
use crate::error::MapperError;
use crate::mapping::{ColumnMapping, MappedType};
use crate::statement::PreparedStatement;
use crate::value::{SqlType, Value};

/// What the bound statement will do with the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindIntent {
    Insert,
    /// SET list gets the incremented version; the predicate checks the current one.
    Update,
    Delete,
}

/// Binds instances to prepared statements using a [`ValueCoercer`].
///
/// Any failure while binding or executing clears the statement's parameters
/// before the error is returned.
#[derive(Debug, Clone, Copy)]
pub struct StatementBinder<'a> {
    coercer: &'a ValueCoercer,
}

impl<'a> StatementBinder<'a> {
    pub fn new(coercer: &'a ValueCoercer) -> Self {
        StatementBinder { coercer }
    }

    /// Binds `columns` in order, then the id predicate and the version
    /// predicate if placeholders remain.
    pub fn bind<S, T>(
        &self,
        statement: &mut S,
        mapped: &MappedType,
        columns: &[&ColumnMapping],
        instance: &T,
        intent: BindIntent,
    ) -> Result<(), MapperError>
    where
        S: PreparedStatement,
        T: Entity,
    {
        let result = self.bind_columns(statement, mapped, columns, instance, intent);
        cleared(statement, result)
    }

    /// Inserts one instance and assigns the generated id, if any.
    pub fn insert<S, T>(
        &self,
        statement: &mut S,
        mapped: &MappedType,
        instance: &mut T,
    ) -> Result<u64, MapperError>
    where
        S: PreparedStatement,
        T: Entity,
    {
        let columns = mapped.insert_statement_columns();
        self.bind(statement, mapped, &columns, instance, BindIntent::Insert)?;
        let rows = execute(statement)?;

        if let Some(generated) = mapped.generated_id() {
            let keys = statement.generated_keys()?;
            if let Some(key) = keys.into_iter().next() {
                let id = self.coercer.to_kind(key, generated.kind)?;
                debug!(type_name = mapped.type_name(), id = %id, "assigned generated id");
                instance.set_field(generated.field, id)?;
            }
        }
        Ok(rows)
    }

    /// Queues one instance for a batched insert. Generated ids are not
    /// available per row in batch mode and are left untouched.
    pub fn add_batch<S, T>(
        &self,
        statement: &mut S,
        mapped: &MappedType,
        instance: &T,
    ) -> Result<(), MapperError>
    where
        S: PreparedStatement,
        T: Entity,
    {
        let columns = mapped.insert_statement_columns();
        self.bind(statement, mapped, &columns, instance, BindIntent::Insert)?;
        let queued = statement.add_batch().map_err(MapperError::from);
        cleared(statement, queued)
    }

    /// Updates one instance. For a versioned, persisted instance the version
    /// advances in memory on success; zero affected rows is a version conflict.
    pub fn update<S, T>(
        &self,
        statement: &mut S,
        mapped: &MappedType,
        instance: &mut T,
    ) -> Result<u64, MapperError>
    where
        S: PreparedStatement,
        T: Entity,
    {
        let persisted = is_persisted(mapped, instance)?;
        let columns = mapped.update_statement_columns();
        self.bind(statement, mapped, &columns, instance, BindIntent::Update)?;
        let rows = execute(statement)?;

        if let Some(version) = mapped.version_column().filter(|_| persisted) {
            let current = instance.get_field(version.field)?;
            if rows == 0 {
                return Err(version_conflict(mapped, instance, &current)?);
            }
            instance.set_field(version.field, increment(&current)?)?;
        }
        Ok(rows)
    }

    /// Deletes one instance by its ids, checking the version when mapped.
    pub fn delete<S, T>(
        &self,
        statement: &mut S,
        mapped: &MappedType,
        instance: &T,
    ) -> Result<u64, MapperError>
    where
        S: PreparedStatement,
        T: Entity,
    {
        let persisted = is_persisted(mapped, instance)?;
        self.bind(statement, mapped, &[], instance, BindIntent::Delete)?;
        let rows = execute(statement)?;

        if let Some(version) = mapped.version_column().filter(|_| persisted && rows == 0) {
            let current = instance.get_field(version.field)?;
            return Err(version_conflict(mapped, instance, &current)?);
        }
        Ok(rows)
    }

    /// Binds positional arguments for caller-written SQL. Exactly one argument
    /// per placeholder is required.
    pub fn bind_arguments<S>(&self, statement: &mut S, args: &[Value]) -> Result<(), MapperError>
    where
        S: PreparedStatement,
    {
        let result = self.bind_values(statement, args);
        cleared(statement, result)
    }

    fn bind_values<S: PreparedStatement>(
        &self,
        statement: &mut S,
        args: &[Value],
    ) -> Result<(), MapperError> {
        let expected = statement.parameter_count();
        if expected != args.len() {
            return Err(MapperError::ParameterMismatch {
                expected,
                supplied: args.len(),
            });
        }
        for (offset, arg) in args.iter().enumerate() {
            let index = offset + 1;
            let target = statement
                .parameter_type(index)
                .unwrap_or_else(|| natural_type(arg));
            let value = self.coercer.to_sql(arg.clone(), target)?;
            statement.set_value(index, value)?;
        }
        Ok(())
    }

    fn bind_columns<S, T>(
        &self,
        statement: &mut S,
        mapped: &MappedType,
        columns: &[&ColumnMapping],
        instance: &T,
        intent: BindIntent,
    ) -> Result<(), MapperError>
    where
        S: PreparedStatement,
        T: Entity,
    {
        let expected = statement.parameter_count();
        if columns.len() > expected {
            return Err(MapperError::ParameterMismatch {
                expected,
                supplied: columns.len(),
            });
        }
        let persisted = is_persisted(mapped, instance)?;

        let mut index = 1;
        for column in columns {
            let mut value = instance.get_field(column.field)?;
            if column.is_version() && intent == BindIntent::Update && persisted {
                value = increment(&value)?;
            }
            self.set(statement, index, column, value)?;
            index += 1;
        }

        if index <= expected {
            for id in mapped.id_columns() {
                let value = instance.get_field(id.field)?;
                self.set(statement, index, id, value)?;
                index += 1;
            }
            if let Some(version) = mapped.version_column().filter(|_| index <= expected) {
                let value = if persisted {
                    instance.get_field(version.field)?
                } else {
                    Value::Null
                };
                self.set(statement, index, version, value)?;
                index += 1;
            }
        }

        let supplied = index - 1;
        if supplied != expected {
            return Err(MapperError::ParameterMismatch { expected, supplied });
        }
        Ok(())
    }

    fn set<S: PreparedStatement>(
        &self,
        statement: &mut S,
        index: usize,
        column: &ColumnMapping,
        value: Value,
    ) -> Result<(), MapperError> {
        let declared = statement.parameter_type(index);
        let value = self.coercer.to_column(column, value, declared)?;
        statement.set_value(index, value)?;
        Ok(())
    }
}

/// True when the mapping has ids, none of them is null, and a generated id is non-zero.
pub fn is_persisted<T: Entity>(mapped: &MappedType, instance: &T) -> Result<bool, MapperError> {
    let ids = mapped.id_columns();
    if ids.is_empty() {
        return Ok(false);
    }
    for id in ids {
        let value = instance.get_field(id.field)?;
        if value.is_null() || (id.generated && value.as_i64() == Some(0)) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn execute<S: PreparedStatement>(statement: &mut S) -> Result<u64, MapperError> {
    let result = statement.execute_update().map_err(MapperError::from);
    cleared(statement, result)
}

fn cleared<S: PreparedStatement, R>(
    statement: &mut S,
    result: Result<R, MapperError>,
) -> Result<R, MapperError> {
    if result.is_err() {
        statement.clear_parameters();
    }
    result
}

fn increment(version: &Value) -> Result<Value, MapperError> {
    let overflow = || crate::error::CoercionError::overflow(version, "version");
    let next = match version {
        Value::I16(n) => Value::I16(n.checked_add(1).ok_or_else(overflow)?),
        Value::I32(n) => Value::I32(n.checked_add(1).ok_or_else(overflow)?),
        Value::I64(n) => Value::I64(n.checked_add(1).ok_or_else(overflow)?),
        other => other.clone(),
    };
    Ok(next)
}

fn version_conflict<T: Entity>(
    mapped: &MappedType,
    instance: &T,
    current: &Value,
) -> Result<MapperError, MapperError> {
    let ids = mapped
        .id_columns()
        .iter()
        .map(|id| instance.get_field(id.field).map(|v| v.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MapperError::VersionConflict {
        type_name: mapped.type_name().to_string(),
        id: ids.join(","),
        expected_version: current.as_i64().unwrap_or_default(),
    })
}

fn natural_type(value: &Value) -> SqlType {
    match value {
        Value::Null => SqlType::Other,
        Value::Bool(_) => SqlType::Boolean,
        Value::I16(_) => SqlType::SmallInt,
        Value::I32(_) => SqlType::Integer,
        Value::I64(_) => SqlType::BigInt,
        Value::BigInteger(_) | Value::Decimal(_) => SqlType::Decimal,
        Value::F64(_) => SqlType::Double,
        Value::String(_) | Value::Enum(_) => SqlType::Varchar,
        Value::Bytes(_) => SqlType::Binary,
        Value::LocalDateTime(_) | Value::Instant(_) => SqlType::Timestamp,
        Value::LocalDate(_) => SqlType::Date,
        Value::LocalTime(_) => SqlType::Time,
        Value::Json(_) => SqlType::Json,
    }
}
