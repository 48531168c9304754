//! SQL text generation from mapped types.
//!
//! Generation is pure and deterministic; [`crate::SqlCache`] memoizes it.

use crate::error::MappingDefinitionError;
use crate::mapping::MappedType;

/// Literal used for an empty IN list so the statement stays valid and matches nothing.
pub const EMPTY_IN_LIST_LITERAL: &str = "'s0me n0n-ex1st4nt v4luu'";

/// Produces statement text for a mapped type.
pub trait StatementGenerator: Send + Sync {
    /// `SELECT <columns> FROM <table> <table>` followed by the optional clause.
    fn select(&self, mapped: &MappedType, clause: Option<&str>) -> String;

    /// `SELECT COUNT(<table>.<column>) FROM <table> <table>` followed by the optional clause.
    fn count(&self, mapped: &MappedType, clause: Option<&str>) -> String;

    fn insert(&self, mapped: &MappedType) -> String;

    fn update(&self, mapped: &MappedType) -> Result<String, MappingDefinitionError>;

    fn delete_by_id(&self, mapped: &MappedType) -> Result<String, MappingDefinitionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBuilder;

impl StatementGenerator for SqlBuilder {
    fn select(&self, mapped: &MappedType, clause: Option<&str>) -> String {
        let table = mapped.table();
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            columns_csv(mapped, Some(table)),
            table,
            table
        );
        if let Some(clause) = clause.filter(|c| !c.is_empty()) {
            let upper = clause.to_uppercase();
            if !upper.contains("WHERE") && !upper.contains("JOIN") {
                sql.push_str(" WHERE");
            }
            sql.push(' ');
            sql.push_str(clause);
        }
        sql
    }

    fn count(&self, mapped: &MappedType, clause: Option<&str>) -> String {
        let table = mapped.table();
        let count_column = mapped
            .id_column_names()
            .first()
            .or_else(|| mapped.column_names().first())
            .map(String::as_str)
            .unwrap_or("*");
        let mut sql = format!("SELECT COUNT({table}.{count_column}) FROM {table} {table}");
        if let Some(clause) = clause.filter(|c| !c.is_empty()) {
            let upper = clause.to_uppercase();
            if !upper.contains("WHERE") && !upper.contains("JOIN") && !upper.starts_with("ORDER") {
                sql.push_str(" WHERE");
            }
            sql.push(' ');
            sql.push_str(clause);
        }
        sql
    }

    fn insert(&self, mapped: &MappedType) -> String {
        let columns = mapped.insert_statement_columns();
        let names: Vec<&str> = columns.iter().map(|c| c.column.as_str()).collect();
        format!(
            "INSERT INTO {}({}) VALUES ({})",
            mapped.table(),
            names.join(","),
            placeholders(names.len())
        )
    }

    fn update(&self, mapped: &MappedType) -> Result<String, MappingDefinitionError> {
        let predicate = versioned_id_predicate(mapped, "update")?;
        let columns = mapped.update_statement_columns();
        if columns.is_empty() {
            return Err(MappingDefinitionError::NoUpdatableColumns {
                type_name: mapped.type_name().to_string(),
            });
        }
        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{}=?", c.column))
            .collect();
        Ok(format!(
            "UPDATE {} SET {} WHERE {}",
            mapped.table(),
            assignments.join(","),
            predicate
        ))
    }

    fn delete_by_id(&self, mapped: &MappedType) -> Result<String, MappingDefinitionError> {
        let predicate = versioned_id_predicate(mapped, "delete")?;
        Ok(format!("DELETE FROM {} WHERE {}", mapped.table(), predicate))
    }
}

/// Comma-separated column list. Columns with their own table qualifier always
/// use it; the rest use `prefix` when given.
pub fn columns_csv(mapped: &MappedType, prefix: Option<&str>) -> String {
    mapped
        .columns()
        .iter()
        .map(|c| match (c.table.as_deref(), prefix) {
            (Some(table), _) | (None, Some(table)) => format!("{}.{}", table, c.column),
            (None, None) => c.column.clone(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Column list without the excluded columns (compared case-insensitively).
pub fn columns_csv_excluding(mapped: &MappedType, excluded: &[&str]) -> String {
    mapped
        .columns()
        .iter()
        .filter(|c| !excluded.iter().any(|e| e.eq_ignore_ascii_case(&c.column)))
        .map(|c| match c.table.as_deref() {
            Some(table) => format!("{}.{}", table, c.column),
            None => c.column.clone(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// `a=? AND b=?` over the given columns.
pub fn id_predicate<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| format!("{}=?", c.as_ref()))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// ` (?,?,?) ` for an IN list of `count` values.
pub fn in_clause_placeholders(count: usize) -> String {
    if count == 0 {
        format!(" ({}) ", EMPTY_IN_LIST_LITERAL)
    } else {
        format!(" ({}) ", placeholders(count))
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

fn versioned_id_predicate(
    mapped: &MappedType,
    operation: &'static str,
) -> Result<String, MappingDefinitionError> {
    if mapped.id_column_names().is_empty() {
        return Err(MappingDefinitionError::NoIdColumns {
            type_name: mapped.type_name().to_string(),
            operation,
        });
    }
    let mut predicate = id_predicate(mapped.id_column_names());
    if let Some(version) = mapped.version_column() {
        predicate.push_str(&format!(" AND {}=?", version.column));
    }
    Ok(predicate)
}
