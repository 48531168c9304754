//! Entity trait and per-field persistence metadata.
//!
//! Types implementing [`Entity`] describe their persistent fields and expose
//! explicit accessors by field name. `#[derive(Entity)]` generates the
//! implementation; the descriptor builder can also be used by hand.
//!
//! # Example
//!
//! ```text
//! #[derive(Entity, Default)]
//! #[table(name = "customers")]
//! pub struct Customer {
//!     #[id]
//!     #[generated]
//!     pub id: i64,
//!     #[version]
//!     pub version: i32,
//!     pub name: String,
//!     #[transient]
//!     pub cached_display: String,
//! }
//! ```

use std::any::{TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{CoercionError, MapperError};
use crate::value::{FieldKind, FieldValue, SqlValue, Value};

/// A record type that can be mapped to a table row.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Persistence metadata, listed in field declaration order.
    fn descriptor() -> EntityDescriptor;

    /// Fresh instance used as the hydration target for one row.
    fn instantiate() -> Result<Self, MapperError>;

    fn get_field(&self, field: &str) -> Result<Value, MapperError>;

    fn set_field(&mut self, field: &str, value: Value) -> Result<(), MapperError>;
}

/// How an enum field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMode {
    /// Zero-based variant position, stored as an integer.
    Ordinal,
    /// Variant name, stored as text.
    Name,
}

/// Unit enum usable as a mapped field. Derive with `#[derive(MappedEnum)]`.
pub trait MappedEnum: Sized {
    /// Stored names, indexed by ordinal.
    const VARIANTS: &'static [&'static str];

    fn ordinal(&self) -> u32;

    fn from_ordinal(ordinal: u32) -> Option<Self>;
}

/// User-supplied conversion for one field, taking precedence over every
/// built-in coercion.
pub trait AttributeConverter: Send + Sync {
    fn to_column(&self, value: Value) -> Result<SqlValue, CoercionError>;

    fn to_attribute(&self, value: SqlValue) -> Result<Value, CoercionError>;
}

/// Identifier of another row of the same table, stored in a join column.
pub struct JoinKey<T> {
    pub id: i64,
    _target: PhantomData<fn() -> T>,
}

impl<T> JoinKey<T> {
    pub fn new(id: i64) -> Self {
        JoinKey {
            id,
            _target: PhantomData,
        }
    }
}

impl<T> Clone for JoinKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for JoinKey<T> {}

impl<T> PartialEq for JoinKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for JoinKey<T> {}

impl<T> fmt::Debug for JoinKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JoinKey<{}>({})", type_name::<T>(), self.id)
    }
}

impl<T> Default for JoinKey<T> {
    fn default() -> Self {
        JoinKey::new(0)
    }
}

impl<T> FieldValue for JoinKey<T> {
    const KIND: FieldKind = FieldKind::I64;

    fn to_value(&self) -> Value {
        Value::I64(self.id)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        i64::from_value(value).map(JoinKey::new)
    }
}

/// Names the row type a join column points at.
pub trait JoinColumnTarget {
    type Target: 'static;
}

impl<T: 'static> JoinColumnTarget for JoinKey<T> {
    type Target = T;
}

/// Type a join column refers to, checked against the enclosing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTarget {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl JoinTarget {
    pub fn of<T: 'static>() -> Self {
        JoinTarget {
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
        }
    }
}

/// Metadata for one struct field.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    /// `None` only for transient fields.
    pub kind: Option<FieldKind>,
    pub column: Option<String>,
    pub table: Option<String>,
    pub transient: bool,
    pub id: bool,
    pub generated: bool,
    pub version: bool,
    pub insertable: bool,
    pub updatable: bool,
    pub enumerated: Option<(EnumMode, &'static [&'static str])>,
    pub converter: Option<Arc<dyn AttributeConverter>>,
    pub join: Option<(String, JoinTarget)>,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        FieldDescriptor {
            name,
            kind: Some(kind),
            column: None,
            table: None,
            transient: false,
            id: false,
            generated: false,
            version: false,
            insertable: true,
            updatable: true,
            enumerated: None,
            converter: None,
            join: None,
        }
    }

    /// A field that is never read from or written to the table.
    pub fn transient(name: &'static str) -> Self {
        FieldDescriptor {
            kind: None,
            transient: true,
            ..FieldDescriptor::new(name, FieldKind::String)
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn insertable(mut self, insertable: bool) -> Self {
        self.insertable = insertable;
        self
    }

    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    pub fn enumerated(mut self, mode: EnumMode, variants: &'static [&'static str]) -> Self {
        self.enumerated = Some((mode, variants));
        self
    }

    pub fn converter(mut self, converter: Arc<dyn AttributeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Self-referencing foreign key stored in `column`.
    pub fn join_column(mut self, column: impl Into<String>, target: JoinTarget) -> Self {
        self.join = Some((column.into(), target));
        self
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("column", &self.column)
            .field("transient", &self.transient)
            .field("id", &self.id)
            .field("generated", &self.generated)
            .field("version", &self.version)
            .field("converter", &self.converter.is_some())
            .finish_non_exhaustive()
    }
}

/// Persistence metadata for one entity type.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    pub fn new<T: 'static>(table: impl Into<String>) -> Self {
        EntityDescriptor {
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            table: table.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }
}

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
