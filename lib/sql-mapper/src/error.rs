use std::error::Error as StdError;

use thiserror::Error;

use crate::value::FieldKind;

/// Malformed persistence metadata. Raised once, on first lookup of a type,
/// and remembered by the registry for the rest of its lifetime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingDefinitionError {
    #[error("{type_name}: cannot have multiple #[id] fields together with #[generated]")]
    MultipleIdsWithGeneratedValue { type_name: String },

    #[error("{type_name}.{field}: join columns can only be self-referencing, found {target}")]
    JoinColumnNotSelfReferencing {
        type_name: String,
        field: String,
        target: String,
    },

    #[error("{type_name}: column {column} is mapped by more than one field")]
    DuplicateColumn { type_name: String, column: String },

    #[error("{type_name}.{field}: a field cannot be both #[id] and #[version]")]
    ConflictingRoles { type_name: String, field: String },

    #[error("{type_name}: at most one #[version] field is allowed")]
    MultipleVersionFields { type_name: String },

    #[error("{type_name}.{field}: #[version] requires an integer field, found {kind:?}")]
    InvalidVersionKind {
        type_name: String,
        field: String,
        kind: FieldKind,
    },

    #[error("{type_name}.{field}: #[generated] requires an integer id field, found {kind:?}")]
    InvalidGeneratedIdKind {
        type_name: String,
        field: String,
        kind: FieldKind,
    },

    #[error("{type_name}.{field}: enum fields need #[enumerated(ordinal)] or #[enumerated(name)]")]
    MissingEnumMapping { type_name: String, field: String },

    #[error("{type_name}: no mapped columns")]
    NoColumns { type_name: String },

    #[error("{type_name}: {operation} requires at least one #[id] column")]
    NoIdColumns {
        type_name: String,
        operation: &'static str,
    },

    #[error("{type_name}: update requires at least one updatable column")]
    NoUpdatableColumns { type_name: String },
}

/// A value could not be converted between its native and storage forms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    #[error("cannot convert {from} to {to}")]
    Unsupported { from: String, to: String },

    #[error("value {value} does not fit in {to}")]
    Overflow { value: String, to: String },

    #[error("unknown enum key {key} for {column}")]
    UnknownEnumKey { key: String, column: String },

    #[error("cannot parse {input:?} as {to}: {reason}")]
    Parse {
        input: String,
        to: String,
        reason: String,
    },

    #[error("failed to read large object: {0}")]
    LargeObject(String),

    #[error("converter failed: {0}")]
    Converter(String),
}

impl CoercionError {
    pub fn unsupported(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        CoercionError::Unsupported {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    pub fn overflow(value: impl std::fmt::Display, to: &str) -> Self {
        CoercionError::Overflow {
            value: value.to_string(),
            to: to.to_string(),
        }
    }
}

/// Opaque failure reported by the collaborator's execution layer.
///
/// The original error is kept as the `source()`; use [`StoreError::root_cause`]
/// to reach the innermost cause of a chained driver error.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct StoreError {
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StoreError {
    pub fn new(error: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        StoreError {
            source: error.into(),
        }
    }

    /// Innermost error in the source chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self.source.as_ref();
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
        self.source
    }
}

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Mapping definition error: {0}")]
    MappingDefinition(#[from] MappingDefinitionError),

    #[error("Unknown column {column} on {type_name}")]
    UnknownColumn { type_name: String, column: String },

    #[error("Coercion error: {0}")]
    Coercion(#[from] CoercionError),

    #[error("UPDATE {type_name}, id={id}, version={expected_version} failed: row changed or removed")]
    VersionConflict {
        type_name: String,
        id: String,
        expected_version: i64,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot instantiate {type_name}: {reason}")]
    Instantiation { type_name: String, reason: String },

    #[error("Statement expects {expected} parameters, {supplied} supplied")]
    ParameterMismatch { expected: usize, supplied: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MapperError {
    pub fn unknown_column(type_name: impl Into<String>, column: impl Into<String>) -> Self {
        MapperError::UnknownColumn {
            type_name: type_name.into(),
            column: column.into(),
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, MapperError::VersionConflict { .. })
    }
}
