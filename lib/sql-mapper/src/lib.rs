//! SQL Mapper - maps annotated record types to relational rows.
//!
//! Given a type carrying persistence metadata (usually via `#[derive(Entity)]`),
//! the mapper extracts and memoizes its column mapping, generates and caches
//! SQL text, coerces values between native and column types, binds statement
//! parameters and hydrates result rows back into instances.
//!
//! # Core Concepts
//!
//! - **MappedType**: immutable per-type metadata (columns, ids, version,
//!   self-join) built once and shared through the [`TypeRegistry`].
//! - **Optimistic versioning**: updates of a `#[version]` type check the
//!   current version and advance it; a stale write is a
//!   [`MapperError::VersionConflict`].
//! - **Collaborators**: the mapper never owns connections. Callers implement
//!   (or use an adapter for) the [`Connection`] family of traits and lend a
//!   connection per operation.
//!
//! # Components
//!
//! - [`TypeRegistry`]: build-once, lock-free-read mapping registry
//! - [`SqlBuilder`] / [`SqlCache`]: statement text generation and memoization
//! - [`ValueCoercer`]: native/column conversion table with pluggable rules
//! - [`StatementBinder`]: parameter binding, versioned writes, generated keys
//! - [`ResultHydrator`]: result rows to instances
//! - [`SqlMapper`]: connection-scoped operations built from the above

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

// Lets the derive macros' `::sql_mapper::` paths resolve inside this crate.
extern crate self as sql_mapper;

mod binder;
mod cache;
mod coerce;
mod config;
mod entity;
mod error;
mod hydrate;
mod mapper;
mod mapping;
mod registry;
mod sql;
mod statement;
mod time;
mod value;

#[cfg(test)]
mod fixtures;

pub use binder::{BindIntent, StatementBinder, is_persisted};
pub use cache::SqlCache;
pub use coerce::{CoercionRule, OpaqueTextRule, ValueCoercer};
pub use config::{DEFAULT_STATEMENT_CACHE_SIZE, MapperConfig, STATEMENT_CACHE_SIZE_ENV};
pub use entity::{
    AttributeConverter, Entity, EntityDescriptor, EnumMode, FieldDescriptor, JoinColumnTarget,
    JoinKey, JoinTarget, MappedEnum,
};
pub use error::{CoercionError, MapperError, MappingDefinitionError, StoreError};
pub use hydrate::ResultHydrator;
pub use mapper::SqlMapper;
pub use mapping::{ColumnMapping, ColumnRole, EnumLookup, MappedType};
pub use registry::TypeRegistry;
pub use sql::{
    EMPTY_IN_LIST_LITERAL, SqlBuilder, StatementGenerator, columns_csv, columns_csv_excluding,
    id_predicate, in_clause_placeholders,
};
pub use statement::{Connection, PreparedStatement, ResultSet};
pub use time::StorageDatetime;
pub use value::{EnumValue, FieldKind, FieldValue, LargeObject, SqlType, SqlValue, Value};

// Re-export derive macros
pub use sql_mapper_derive::{Entity, MappedEnum};
