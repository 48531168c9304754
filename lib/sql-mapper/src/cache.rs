//! Memoized statement text.

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::MappingDefinitionError;
use crate::mapping::MappedType;
use crate::sql::{SqlBuilder, StatementGenerator, id_predicate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FixedKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ClauseKind {
    Select,
    SelectById,
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClauseKey {
    table: String,
    kind: ClauseKind,
    clause: Option<String>,
}

/// Two-tier statement cache in front of a [`StatementGenerator`].
///
/// Write statements depend only on the table and are kept forever. Clause
/// statements are bounded and evict the oldest insertion first.
pub struct SqlCache<G = SqlBuilder> {
    generator: G,
    fixed: DashMap<(String, FixedKind), Arc<str>>,
    clauses: Mutex<IndexMap<ClauseKey, Arc<str>>>,
    capacity: usize,
}

impl SqlCache<SqlBuilder> {
    pub fn new(capacity: usize) -> Self {
        Self::with_generator(SqlBuilder, capacity)
    }
}

impl<G: StatementGenerator> SqlCache<G> {
    pub fn with_generator(generator: G, capacity: usize) -> Self {
        SqlCache {
            generator,
            fixed: DashMap::new(),
            clauses: Mutex::new(IndexMap::new()),
            capacity,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries currently held by the bounded clause tier.
    pub fn clause_entries(&self) -> usize {
        self.clauses.lock().len()
    }

    pub fn select(&self, mapped: &MappedType, clause: Option<&str>) -> Arc<str> {
        self.clause_statement(mapped, ClauseKind::Select, clause, |g, m| g.select(m, clause))
    }

    pub fn count(&self, mapped: &MappedType, clause: Option<&str>) -> Arc<str> {
        self.clause_statement(mapped, ClauseKind::Count, clause, |g, m| g.count(m, clause))
    }

    pub fn select_by_id(&self, mapped: &MappedType) -> Result<Arc<str>, MappingDefinitionError> {
        if mapped.id_column_names().is_empty() {
            return Err(MappingDefinitionError::NoIdColumns {
                type_name: mapped.type_name().to_string(),
                operation: "select by id",
            });
        }
        let predicate = id_predicate(mapped.id_column_names());
        Ok(self.clause_statement(mapped, ClauseKind::SelectById, None, |g, m| {
            g.select(m, Some(&predicate))
        }))
    }

    pub fn insert(&self, mapped: &MappedType) -> Arc<str> {
        let key = (mapped.table().to_string(), FixedKind::Insert);
        self.fixed
            .entry(key)
            .or_insert_with(|| Arc::from(self.generator.insert(mapped)))
            .clone()
    }

    pub fn update(&self, mapped: &MappedType) -> Result<Arc<str>, MappingDefinitionError> {
        self.fixed_statement(mapped, FixedKind::Update, |g, m| g.update(m))
    }

    pub fn delete_by_id(&self, mapped: &MappedType) -> Result<Arc<str>, MappingDefinitionError> {
        self.fixed_statement(mapped, FixedKind::Delete, |g, m| g.delete_by_id(m))
    }

    fn fixed_statement(
        &self,
        mapped: &MappedType,
        kind: FixedKind,
        generate: impl FnOnce(&G, &MappedType) -> Result<String, MappingDefinitionError>,
    ) -> Result<Arc<str>, MappingDefinitionError> {
        let key = (mapped.table().to_string(), kind);
        if let Some(sql) = self.fixed.get(&key) {
            return Ok(sql.value().clone());
        }
        let sql: Arc<str> = Arc::from(generate(&self.generator, mapped)?);
        Ok(self.fixed.entry(key).or_insert(sql).clone())
    }

    fn clause_statement(
        &self,
        mapped: &MappedType,
        kind: ClauseKind,
        clause: Option<&str>,
        generate: impl FnOnce(&G, &MappedType) -> String,
    ) -> Arc<str> {
        let key = ClauseKey {
            table: mapped.table().to_string(),
            kind,
            clause: clause.map(str::to_string),
        };
        let mut clauses = self.clauses.lock();
        if let Some(sql) = clauses.get(&key) {
            return sql.clone();
        }
        let sql: Arc<str> = Arc::from(generate(&self.generator, mapped));
        if self.capacity == 0 {
            return sql;
        }
        while clauses.len() >= self.capacity {
            if let Some((evicted, _)) = clauses.shift_remove_index(0) {
                debug!(table = %evicted.table, clause = ?evicted.clause, "evicted cached statement");
            }
        }
        clauses.insert(key, sql.clone());
        sql
    }
}

impl Default for SqlCache<SqlBuilder> {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STATEMENT_CACHE_SIZE)
    }
}

impl<G> std::fmt::Debug for SqlCache<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCache")
            .field("fixed", &self.fixed.len())
            .field("clauses", &self.clauses.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
