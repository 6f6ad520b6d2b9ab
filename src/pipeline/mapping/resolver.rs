use crate::errors::ToolError;
use crate::pipeline::mapping::engine::CompiledMappingSet;
use crate::pipeline::types::{Direction, FieldMapping, MappingSource, ResolvedMapping};
use crate::services::cache::{CacheStats, KeyedCache, MemoryCache};
use crate::services::logger::Logger;
use crate::stores::{ConnectionScope, MappingStore};
use std::collections::HashMap;
use std::sync::Arc;

pub type ResolvedSet = Arc<Vec<ResolvedMapping>>;

/// Merges action-level defaults with connection overrides. A connection
/// mapping replaces the default with the same `(sourcePath, direction)`;
/// connection-only mappings are appended. Output order depends only on
/// the two inputs.
pub fn merge_mappings(defaults: Vec<FieldMapping>, overrides: Vec<FieldMapping>) -> Vec<ResolvedMapping> {
    let mut override_slots: HashMap<(String, Direction), FieldMapping> =
        HashMap::with_capacity(overrides.len());
    let mut override_order: Vec<(String, Direction)> = Vec::with_capacity(overrides.len());
    for mapping in overrides {
        let key = (mapping.source_path.clone(), mapping.direction);
        if override_slots.insert(key.clone(), mapping).is_none() {
            override_order.push(key);
        }
    }

    let mut merged = Vec::with_capacity(defaults.len() + override_order.len());
    for mapping in defaults {
        let key = (mapping.source_path.clone(), mapping.direction);
        match override_slots.remove(&key) {
            Some(replacement) => merged.push(ResolvedMapping {
                mapping: replacement,
                source: MappingSource::Connection,
            }),
            None => merged.push(ResolvedMapping {
                mapping,
                source: MappingSource::Default,
            }),
        }
    }
    for key in override_order {
        if let Some(mapping) = override_slots.remove(&key) {
            merged.push(ResolvedMapping {
                mapping,
                source: MappingSource::Connection,
            });
        }
    }
    merged
}

fn resolved_key(action_id: &str, connection_id: Option<&str>) -> String {
    match connection_id {
        Some(conn) => format!("{}:{}", action_id, conn),
        None => action_id.to_string(),
    }
}

fn compiled_key(action_id: &str, connection_id: Option<&str>, direction: Direction) -> String {
    format!("{}:{}", resolved_key(action_id, connection_id), direction.as_str())
}

pub struct MappingResolver {
    logger: Logger,
    store: Arc<dyn MappingStore>,
    resolved: Arc<dyn KeyedCache<ResolvedSet>>,
    compiled: Arc<dyn KeyedCache<Arc<CompiledMappingSet>>>,
}

impl MappingResolver {
    pub fn new(logger: Logger, store: Arc<dyn MappingStore>) -> Self {
        let logger = logger.child("mapping");
        Self {
            resolved: Arc::new(MemoryCache::<ResolvedSet>::new("resolved", logger.clone())),
            compiled: Arc::new(MemoryCache::<Arc<CompiledMappingSet>>::new("compiled", logger.clone())),
            logger,
            store,
        }
    }

    pub fn with_caches(
        logger: Logger,
        store: Arc<dyn MappingStore>,
        resolved: Arc<dyn KeyedCache<ResolvedSet>>,
        compiled: Arc<dyn KeyedCache<Arc<CompiledMappingSet>>>,
    ) -> Self {
        Self {
            logger: logger.child("mapping"),
            store,
            resolved,
            compiled,
        }
    }

    pub async fn resolve(
        &self,
        action_id: &str,
        connection_id: Option<&str>,
    ) -> Result<ResolvedSet, ToolError> {
        let key = resolved_key(action_id, connection_id);
        if let Some(hit) = self.resolved.get(&key) {
            return Ok(hit);
        }

        let defaults_fut = self.store.list_mappings(action_id, ConnectionScope::Defaults);
        let merged = match connection_id {
            Some(conn) => {
                let overrides_fut = self
                    .store
                    .list_mappings(action_id, ConnectionScope::Connection(conn.to_string()));
                let (defaults, overrides) = futures::try_join!(defaults_fut, overrides_fut)?;
                merge_mappings(defaults, overrides)
            }
            None => merge_mappings(defaults_fut.await?, Vec::new()),
        };

        let merged = Arc::new(merged);
        self.resolved.set(&key, merged.clone());
        self.logger.debug(
            "Resolved mappings",
            Some(&serde_json::json!({
                "action_id": action_id,
                "connection_id": connection_id,
                "count": merged.len(),
            })),
        );
        Ok(merged)
    }

    pub async fn compiled(
        &self,
        action_id: &str,
        connection_id: Option<&str>,
        direction: Direction,
    ) -> Result<Arc<CompiledMappingSet>, ToolError> {
        let key = compiled_key(action_id, connection_id, direction);
        if let Some(hit) = self.compiled.get(&key) {
            return Ok(hit);
        }
        let resolved = self.resolve(action_id, connection_id).await?;
        let set = Arc::new(CompiledMappingSet::compile(direction, &resolved));
        self.compiled.set(&key, set.clone());
        Ok(set)
    }

    /// Drops every cached entry for the action, including all of its
    /// connection scopes.
    pub fn invalidate_action(&self, action_id: &str) -> usize {
        self.resolved.invalidate_prefix(action_id) + self.compiled.invalidate_prefix(action_id)
    }

    /// Drops the entries for one connection scope. Changes to defaults
    /// affect every connection, so callers pass `None` to clear them all.
    pub fn invalidate(&self, action_id: &str, connection_id: Option<&str>) -> usize {
        match connection_id {
            None => self.invalidate_action(action_id),
            Some(conn) => {
                let key = resolved_key(action_id, Some(conn));
                self.resolved.invalidate_prefix(&key) + self.compiled.invalidate_prefix(&key)
            }
        }
    }

    pub fn cache_stats(&self) -> Vec<CacheStats> {
        vec![self.resolved.stats(), self.compiled.stats()]
    }
}
