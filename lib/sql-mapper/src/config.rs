use serde::{Deserialize, Serialize};

use crate::error::MapperError;

pub const DEFAULT_STATEMENT_CACHE_SIZE: usize = 500;

/// Environment variable overriding [`MapperConfig::statement_cache_size`].
pub const STATEMENT_CACHE_SIZE_ENV: &str = "SQL_MAPPER_STATEMENT_CACHE_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Capacity of the bounded clause-statement cache. Zero disables it.
    pub statement_cache_size: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            statement_cache_size: DEFAULT_STATEMENT_CACHE_SIZE,
        }
    }
}

impl MapperConfig {
    pub fn from_env() -> Result<Self, MapperError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MapperError> {
        let mut config = MapperConfig::default();
        if let Some(raw) = lookup(STATEMENT_CACHE_SIZE_ENV) {
            config.statement_cache_size = raw.trim().parse().map_err(|_| {
                MapperError::Config(format!(
                    "{STATEMENT_CACHE_SIZE_ENV} must be a non-negative integer, got {raw:?}"
                ))
            })?;
        }
        Ok(config)
    }
}
