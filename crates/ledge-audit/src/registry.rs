//! Versioned schema registry.
//!
//! The registry is the caller-facing view of schemas: cached in memory after
//! the first load from the backend, with writes passed through so they
//! survive process restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::backend::AuditBackend;
use crate::error::AuditError;
use crate::schema::AuditSchema;

/// In-memory, backend-persisted schema registry.
pub struct SchemaRegistry {
    backend: Arc<dyn AuditBackend>,
    // Keyed by schema_id.
    cache: RwLock<HashMap<String, AuditSchema>>,
}

impl SchemaRegistry {
    /// Hydrate a registry from the backend's persisted schemas.
    pub async fn load(backend: Arc<dyn AuditBackend>) -> Result<Self, AuditError> {
        let schemas = backend.list_schemas(false).await?;
        let cache = schemas
            .into_iter()
            .map(|s| (s.schema_id(), s))
            .collect::<HashMap<_, _>>();
        Ok(Self {
            backend,
            cache: RwLock::new(cache),
        })
    }

    /// Register a new schema version.
    ///
    /// Fails if the `schema_id` already exists, or if the version does not
    /// exceed every previously created version of the same name (versions
    /// are monotonic and never reused).
    pub async fn create_schema(&self, schema: AuditSchema) -> Result<(), AuditError> {
        schema.validate()?;

        let schema_id = schema.schema_id();
        {
            let cache = self.cache.read().expect("schema cache poisoned");
            if cache.contains_key(&schema_id) {
                return Err(AuditError::SchemaExists(schema_id));
            }
            if let Some(max) = cache
                .values()
                .filter(|s| s.schema_name == schema.schema_name)
                .map(|s| s.version)
                .max()
            {
                if schema.version <= max {
                    return Err(AuditError::InvalidSchema(format!(
                        "version {} for {} must exceed existing version {}",
                        schema.version, schema.schema_name, max
                    )));
                }
            }
        }

        self.backend.create_schema(schema.clone()).await?;

        let mut cache = self.cache.write().expect("schema cache poisoned");
        cache.insert(schema_id, schema);
        Ok(())
    }

    /// Fetch a schema from the cache. An omitted version resolves the
    /// highest version of that name, active or not.
    pub fn get_schema(&self, name: &str, version: Option<u32>) -> Option<AuditSchema> {
        let cache = self.cache.read().expect("schema cache poisoned");
        match version {
            Some(v) => cache.get(&format!("{name}:v{v}")).cloned(),
            None => cache
                .values()
                .filter(|s| s.schema_name == name)
                .max_by_key(|s| s.version)
                .cloned(),
        }
    }

    /// All known schema versions, sorted by name then version.
    pub fn list_schemas(&self, active_only: bool) -> Vec<AuditSchema> {
        let cache = self.cache.read().expect("schema cache poisoned");
        let mut schemas: Vec<_> = cache
            .values()
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect();
        schemas.sort_by(|a, b| {
            a.schema_name
                .cmp(&b.schema_name)
                .then(a.version.cmp(&b.version))
        });
        schemas
    }

    /// Deactivate one schema version. Idempotent; unknown schemas error.
    pub async fn deactivate_schema(&self, name: &str, version: u32) -> Result<(), AuditError> {
        let schema_id = format!("{name}:v{version}");
        {
            let cache = self.cache.read().expect("schema cache poisoned");
            match cache.get(&schema_id) {
                None => return Err(AuditError::SchemaNotFound(schema_id)),
                Some(s) if !s.active => return Ok(()),
                Some(_) => {}
            }
        }

        self.backend.deactivate_schema(name, version).await?;

        let mut cache = self.cache.write().expect("schema cache poisoned");
        if let Some(schema) = cache.get_mut(&schema_id) {
            schema.active = false;
        }
        Ok(())
    }
}
