//! Column mappings built from entity descriptors.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::{AttributeConverter, EntityDescriptor, EnumMode, FieldDescriptor};
use crate::error::MappingDefinitionError;
use crate::value::{FieldKind, SqlType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Id,
    Version,
    Ordinary,
}

/// Both directions of an enum mapping, computed once per column.
#[derive(Debug, Clone)]
pub struct EnumLookup {
    mode: EnumMode,
    names: &'static [&'static str],
    by_name: HashMap<&'static str, u32>,
}

impl EnumLookup {
    fn new(mode: EnumMode, names: &'static [&'static str]) -> Self {
        let by_name = names
            .iter()
            .enumerate()
            .map(|(ordinal, name)| (*name, ordinal as u32))
            .collect();
        EnumLookup {
            mode,
            names,
            by_name,
        }
    }

    pub fn mode(&self) -> EnumMode {
        self.mode
    }

    pub fn name(&self, ordinal: u32) -> Option<&'static str> {
        self.names.get(ordinal as usize).copied()
    }

    pub fn ordinal(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One persistent field and the column that stores it.
#[derive(Clone)]
pub struct ColumnMapping {
    pub field: &'static str,
    /// Lower-cased column name.
    pub column: String,
    /// Qualifier used in SELECT lists; `None` means the mapped table.
    pub table: Option<String>,
    pub kind: FieldKind,
    pub coercion: SqlType,
    pub role: ColumnRole,
    pub generated: bool,
    pub insertable: bool,
    pub updatable: bool,
    pub self_join: bool,
    pub enum_lookup: Option<EnumLookup>,
    pub converter: Option<Arc<dyn AttributeConverter>>,
}

impl ColumnMapping {
    pub fn is_id(&self) -> bool {
        self.role == ColumnRole::Id
    }

    pub fn is_version(&self) -> bool {
        self.role == ColumnRole::Version
    }
}

impl std::fmt::Debug for ColumnMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnMapping")
            .field("field", &self.field)
            .field("column", &self.column)
            .field("table", &self.table)
            .field("kind", &self.kind)
            .field("coercion", &self.coercion)
            .field("role", &self.role)
            .field("generated", &self.generated)
            .field("enum_lookup", &self.enum_lookup.as_ref().map(EnumLookup::mode))
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

/// Immutable per-type mapping metadata with precomputed column views.
#[derive(Debug)]
pub struct MappedType {
    type_id: TypeId,
    type_name: &'static str,
    table: String,
    columns: Vec<ColumnMapping>,
    by_column: HashMap<String, usize>,
    ids: Vec<usize>,
    generated_id: Option<usize>,
    version: Option<usize>,
    self_join: Option<usize>,
    column_names: Vec<String>,
    id_column_names: Vec<String>,
    insertable_columns: Vec<String>,
    updatable_columns: Vec<String>,
    insert_statement: Vec<usize>,
    update_statement: Vec<usize>,
}

impl MappedType {
    pub fn from_descriptor(descriptor: EntityDescriptor) -> Result<Self, MappingDefinitionError> {
        let EntityDescriptor {
            type_id,
            type_name,
            table,
            fields,
        } = descriptor;
        let type_label = type_name.to_string();

        let mut columns: Vec<ColumnMapping> = Vec::new();
        let mut by_column = HashMap::new();
        let mut ids = Vec::new();
        let mut generated = Vec::new();
        let mut version = None;
        let mut self_join = None;

        for field in fields {
            if field.transient {
                continue;
            }
            let Some(kind) = field.kind else {
                continue;
            };
            let index = columns.len();
            let mapping = build_column(&type_label, type_id, field, kind)?;

            if by_column.insert(mapping.column.clone(), index).is_some() {
                return Err(MappingDefinitionError::DuplicateColumn {
                    type_name: type_label,
                    column: mapping.column,
                });
            }

            match mapping.role {
                ColumnRole::Id => {
                    ids.push(index);
                    if mapping.generated {
                        generated.push(index);
                    }
                }
                ColumnRole::Version => {
                    if version.replace(index).is_some() {
                        return Err(MappingDefinitionError::MultipleVersionFields {
                            type_name: type_label,
                        });
                    }
                }
                ColumnRole::Ordinary => {}
            }
            if mapping.self_join {
                self_join = Some(index);
            }
            columns.push(mapping);
        }

        if columns.is_empty() {
            return Err(MappingDefinitionError::NoColumns {
                type_name: type_label,
            });
        }
        if !generated.is_empty() && ids.len() > 1 {
            return Err(MappingDefinitionError::MultipleIdsWithGeneratedValue {
                type_name: type_label,
            });
        }

        let names_where = |keep: &dyn Fn(&ColumnMapping) -> bool| -> Vec<String> {
            columns
                .iter()
                .filter(|c| keep(c))
                .map(|c| c.column.clone())
                .collect()
        };
        let column_names = names_where(&|_| true);
        let id_column_names = names_where(&|c| c.is_id());
        let insertable_columns = names_where(&|c| c.role == ColumnRole::Ordinary && c.insertable);
        let updatable_columns = names_where(&|c| c.role == ColumnRole::Ordinary && c.updatable);

        let insert_statement = (0..columns.len())
            .filter(|&i| {
                let c = &columns[i];
                match c.role {
                    ColumnRole::Id => !c.generated,
                    ColumnRole::Version => true,
                    ColumnRole::Ordinary => c.insertable,
                }
            })
            .collect();
        let update_statement = (0..columns.len())
            .filter(|&i| {
                let c = &columns[i];
                match c.role {
                    ColumnRole::Id => false,
                    ColumnRole::Version => true,
                    ColumnRole::Ordinary => c.updatable,
                }
            })
            .collect();

        Ok(MappedType {
            type_id,
            type_name,
            table,
            columns,
            by_column,
            ids,
            generated_id: generated.first().copied(),
            version,
            self_join,
            column_names,
            id_column_names,
            insertable_columns,
            updatable_columns,
            insert_statement,
            update_statement,
        })
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    /// Looks up a column by (already lower-cased) name.
    pub fn column(&self, name: &str) -> Option<&ColumnMapping> {
        self.by_column.get(name).map(|&i| &self.columns[i])
    }

    pub fn column_for_field(&self, field: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn id_columns(&self) -> Vec<&ColumnMapping> {
        self.ids.iter().map(|&i| &self.columns[i]).collect()
    }

    pub fn generated_id(&self) -> Option<&ColumnMapping> {
        self.generated_id.map(|i| &self.columns[i])
    }

    pub fn version_column(&self) -> Option<&ColumnMapping> {
        self.version.map(|i| &self.columns[i])
    }

    pub fn self_join_column(&self) -> Option<&ColumnMapping> {
        self.self_join.map(|i| &self.columns[i])
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn id_column_names(&self) -> &[String] {
        &self.id_column_names
    }

    /// Ordinary columns written by INSERT.
    pub fn insertable_columns(&self) -> &[String] {
        &self.insertable_columns
    }

    /// Ordinary columns written by UPDATE.
    pub fn updatable_columns(&self) -> &[String] {
        &self.updatable_columns
    }

    /// Columns bound by INSERT: non-generated ids, version and insertable columns.
    pub fn insert_statement_columns(&self) -> Vec<&ColumnMapping> {
        self.insert_statement
            .iter()
            .map(|&i| &self.columns[i])
            .collect()
    }

    /// Columns bound by the SET list of UPDATE: version and updatable columns.
    pub fn update_statement_columns(&self) -> Vec<&ColumnMapping> {
        self.update_statement
            .iter()
            .map(|&i| &self.columns[i])
            .collect()
    }
}

fn build_column(
    type_name: &str,
    type_id: TypeId,
    field: FieldDescriptor,
    kind: FieldKind,
) -> Result<ColumnMapping, MappingDefinitionError> {
    let field_name = field.name;
    let definition_error = |make: fn(String, String) -> MappingDefinitionError| {
        make(type_name.to_string(), field_name.to_string())
    };

    if field.id && field.version {
        return Err(definition_error(|type_name, field| {
            MappingDefinitionError::ConflictingRoles { type_name, field }
        }));
    }
    if field.version && !kind.is_integer() {
        return Err(MappingDefinitionError::InvalidVersionKind {
            type_name: type_name.to_string(),
            field: field_name.to_string(),
            kind,
        });
    }
    let generated = field.id && field.generated;
    if generated && !kind.is_integer() {
        return Err(MappingDefinitionError::InvalidGeneratedIdKind {
            type_name: type_name.to_string(),
            field: field_name.to_string(),
            kind,
        });
    }
    if kind == FieldKind::Enum && field.enumerated.is_none() && field.converter.is_none() {
        return Err(definition_error(|type_name, field| {
            MappingDefinitionError::MissingEnumMapping { type_name, field }
        }));
    }

    let mut column = field.column.unwrap_or_else(|| field_name.to_string());
    let mut self_join = false;
    if let Some((join_column, target)) = field.join {
        if target.type_id != type_id {
            return Err(MappingDefinitionError::JoinColumnNotSelfReferencing {
                type_name: type_name.to_string(),
                field: field_name.to_string(),
                target: target.type_name.to_string(),
            });
        }
        column = join_column;
        self_join = true;
    }

    let enum_lookup = field
        .enumerated
        .map(|(mode, names)| EnumLookup::new(mode, names));
    let coercion = match enum_lookup.as_ref().map(EnumLookup::mode) {
        Some(EnumMode::Ordinal) => SqlType::Integer,
        Some(EnumMode::Name) => SqlType::Varchar,
        None => kind.coercion_class(),
    };
    let role = if field.id {
        ColumnRole::Id
    } else if field.version {
        ColumnRole::Version
    } else {
        ColumnRole::Ordinary
    };

    Ok(ColumnMapping {
        field: field_name,
        column: column.to_lowercase(),
        table: field.table,
        kind,
        coercion,
        role,
        generated,
        insertable: field.insertable,
        updatable: field.updatable,
        self_join,
        enum_lookup,
        converter: field.converter,
    })
}
