//! Build-once registry of mapped types.

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::MappingDefinitionError;
use crate::mapping::MappedType;

/// Memoizes one [`MappedType`] per entity type.
///
/// Lookups of a registered type never take a lock. The first lookup of a type
/// builds its mapping under a per-type mutex, so concurrent first callers all
/// receive the same `Arc`. A definition error is remembered and returned on
/// every later lookup of that type.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: DashMap<TypeId, Arc<MappedType>>,
    failures: DashMap<TypeId, MappingDefinitionError>,
    build_locks: DashMap<TypeId, Arc<Mutex<()>>>,
    builds: AtomicUsize,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Entity>(&self) -> Result<Arc<MappedType>, MappingDefinitionError> {
        let key = TypeId::of::<T>();
        if let Some(found) = self.lookup(key) {
            return found;
        }

        let lock = self.build_locks.entry(key).or_default().clone();
        let _guard = lock.lock();
        if let Some(found) = self.lookup(key) {
            return found;
        }

        self.builds.fetch_add(1, Ordering::Relaxed);
        match MappedType::from_descriptor(T::descriptor()) {
            Ok(mapped) => {
                debug!(
                    type_name = mapped.type_name(),
                    table = mapped.table(),
                    columns = mapped.columns().len(),
                    "registered mapped type"
                );
                let mapped = Arc::new(mapped);
                self.types.insert(key, mapped.clone());
                Ok(mapped)
            }
            Err(e) => {
                warn!(error = %e, "invalid mapping definition");
                self.failures.insert(key, e.clone());
                Err(e)
            }
        }
    }

    /// Number of mapping constructions performed so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of successfully registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn lookup(&self, key: TypeId) -> Option<Result<Arc<MappedType>, MappingDefinitionError>> {
        if let Some(mapped) = self.types.get(&key) {
            return Some(Ok(mapped.value().clone()));
        }
        self.failures.get(&key).map(|e| Err(e.value().clone()))
    }
}
