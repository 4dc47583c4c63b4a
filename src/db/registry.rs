//! Maps each database type to a constructor for a fresh adapter.

use crate::db::adapter::DatabaseAdapter;
use crate::db::{MongoAdapter, MssqlAdapter, MySqlAdapter, PostgresAdapter, SqliteAdapter};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a new, disconnected adapter.
pub type AdapterConstructor = Arc<dyn Fn() -> Box<dyn DatabaseAdapter> + Send + Sync>;

/// Adapter constructors keyed by database type.
///
/// Every call to `create` returns a new instance; adapters are never shared
/// between requests.
#[derive(Clone)]
pub struct AdapterRegistry {
    constructors: HashMap<DatabaseType, AdapterConstructor>,
}

impl AdapterRegistry {
    /// Registry with no backends. Useful for tests that inject mocks.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with all five built-in backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DatabaseType::PostgreSQL, || Box::new(PostgresAdapter::new()));
        registry.register(DatabaseType::MySQL, || Box::new(MySqlAdapter::new()));
        registry.register(DatabaseType::SQLite, || Box::new(SqliteAdapter::new()));
        registry.register(DatabaseType::SqlServer, || Box::new(MssqlAdapter::new()));
        registry.register(DatabaseType::MongoDB, || Box::new(MongoAdapter::new()));
        registry
    }

    /// Add or replace the constructor for a database type.
    pub fn register<F>(&mut self, db_type: DatabaseType, constructor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn DatabaseAdapter> + Send + Sync + 'static,
    {
        self.constructors.insert(db_type, Arc::new(constructor));
        self
    }

    pub fn supports(&self, db_type: DatabaseType) -> bool {
        self.constructors.contains_key(&db_type)
    }

    /// Registered types in declaration order.
    pub fn supported_types(&self) -> Vec<DatabaseType> {
        DatabaseType::ALL
            .iter()
            .copied()
            .filter(|t| self.supports(*t))
            .collect()
    }

    /// Instantiate a disconnected adapter for `config.db_type`.
    pub fn create(&self, config: &ConnectionConfig) -> DbResult<Box<dyn DatabaseAdapter>> {
        match self.constructors.get(&config.db_type) {
            Some(constructor) => Ok(constructor()),
            None => {
                let supported: Vec<&str> =
                    self.supported_types().iter().map(|t| t.tag()).collect();
                Err(DbError::connection_failed(
                    format!("Unsupported database type: {}", config.db_type.tag()),
                    format!("Supported types: {}", supported.join(", ")),
                ))
            }
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_type() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(registry.supported_types(), DatabaseType::ALL.to_vec());

        for db_type in DatabaseType::ALL {
            let config = ConnectionConfig::network(db_type, "localhost", 0, "db", "u", "");
            let adapter = registry.create(&config).unwrap();
            assert_eq!(adapter.db_type(), db_type);
            assert!(!adapter.is_connected());
        }
    }

    #[test]
    fn test_create_unregistered_type() {
        let mut registry = AdapterRegistry::empty();
        registry.register(DatabaseType::SQLite, || Box::new(SqliteAdapter::new()));

        let config = ConnectionConfig::network(DatabaseType::MySQL, "h", 3306, "d", "u", "p");
        let err = registry.create(&config).err().unwrap();
        assert!(matches!(err, DbError::ConnectionFailed { .. }));
        assert_eq!(err.suggestion(), Some("Supported types: sqlite"));
    }
}
