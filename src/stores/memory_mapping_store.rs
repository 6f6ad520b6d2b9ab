use crate::constants::store::SNAPSHOT_VERSION;
use crate::errors::ToolError;
use crate::pipeline::types::{ActionDefinition, Direction, FieldMapping, MappingConfig};
use crate::stores::{ConnectionScope, MappingPatch, MappingStore, NewFieldMapping};
use crate::utils::json_path::CompiledPath;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSnapshot {
    pub version: u32,
    pub actions: Vec<ActionDefinition>,
    pub mappings: Vec<FieldMapping>,
    pub configs: BTreeMap<String, MappingConfig>,
}

#[derive(Debug, Default)]
struct StoreState {
    actions: BTreeMap<String, ActionDefinition>,
    mappings: Vec<FieldMapping>,
    configs: BTreeMap<String, MappingConfig>,
}

#[derive(Clone, Default)]
pub struct MemoryMappingStore {
    state: Arc<RwLock<StoreState>>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn validate_paths(source: &str, target: &str) -> Result<(), ToolError> {
    CompiledPath::parse(source)?;
    CompiledPath::parse(target)?;
    Ok(())
}

fn duplicate_error(
    action_id: &str,
    connection_id: Option<&str>,
    source_path: &str,
    direction: Direction,
) -> ToolError {
    ToolError::conflict(format!(
        "A {} mapping for '{}' already exists on action '{}'{}",
        direction.as_str(),
        source_path,
        action_id,
        connection_id
            .map(|c| format!(" (connection '{}')", c))
            .unwrap_or_default()
    ))
    .with_code("DUPLICATE_MAPPING")
    .with_hint("Update the existing mapping instead of creating a new one.")
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|err| err.into_inner())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.read();
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            actions: state.actions.values().cloned().collect(),
            mappings: state.mappings.clone(),
            configs: state.configs.clone(),
        }
    }

    pub fn restore(&self, snapshot: StoreSnapshot) {
        let mut state = self.write();
        state.actions = snapshot
            .actions
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        state.mappings = snapshot.mappings;
        state.configs = snapshot.configs;
    }

    fn conflicts(
        state: &StoreState,
        skip_id: Option<&str>,
        action_id: &str,
        connection_id: Option<&str>,
        source_path: &str,
        direction: Direction,
    ) -> bool {
        state.mappings.iter().any(|m| {
            Some(m.id.as_str()) != skip_id
                && m.action_id == action_id
                && m.connection_id.as_deref() == connection_id
                && m.source_path == source_path
                && m.direction == direction
        })
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn get_action(&self, action_id: &str) -> Result<Option<ActionDefinition>, ToolError> {
        Ok(self.read().actions.get(action_id).cloned())
    }

    async fn list_actions(&self) -> Result<Vec<ActionDefinition>, ToolError> {
        Ok(self.read().actions.values().cloned().collect())
    }

    async fn upsert_action(&self, action: ActionDefinition) -> Result<ActionDefinition, ToolError> {
        self.write().actions.insert(action.id.clone(), action.clone());
        Ok(action)
    }

    async fn delete_action(&self, action_id: &str) -> Result<bool, ToolError> {
        let mut state = self.write();
        let removed = state.actions.remove(action_id).is_some();
        state.mappings.retain(|m| m.action_id != action_id);
        state.configs.remove(action_id);
        Ok(removed)
    }

    async fn list_mappings(
        &self,
        action_id: &str,
        scope: ConnectionScope,
    ) -> Result<Vec<FieldMapping>, ToolError> {
        Ok(self
            .read()
            .mappings
            .iter()
            .filter(|m| m.action_id == action_id && scope.matches(m.connection_id.as_deref()))
            .cloned()
            .collect())
    }

    async fn get_mapping(&self, mapping_id: &str) -> Result<Option<FieldMapping>, ToolError> {
        Ok(self.read().mappings.iter().find(|m| m.id == mapping_id).cloned())
    }

    async fn create_mapping(&self, mapping: NewFieldMapping) -> Result<FieldMapping, ToolError> {
        validate_paths(&mapping.source_path, &mapping.target_path)?;
        let mut state = self.write();
        if Self::conflicts(
            &state,
            None,
            &mapping.action_id,
            mapping.connection_id.as_deref(),
            &mapping.source_path,
            mapping.direction,
        ) {
            return Err(duplicate_error(
                &mapping.action_id,
                mapping.connection_id.as_deref(),
                &mapping.source_path,
                mapping.direction,
            ));
        }
        let stamp = now();
        let record = FieldMapping {
            id: uuid::Uuid::new_v4().to_string(),
            action_id: mapping.action_id,
            connection_id: mapping.connection_id,
            source_path: mapping.source_path,
            target_path: mapping.target_path,
            direction: mapping.direction,
            transform_config: mapping.transform_config,
            created_at: stamp.clone(),
            updated_at: stamp,
        };
        state.mappings.push(record.clone());
        Ok(record)
    }

    async fn update_mapping(
        &self,
        mapping_id: &str,
        patch: MappingPatch,
    ) -> Result<FieldMapping, ToolError> {
        let mut state = self.write();
        let Some(index) = state.mappings.iter().position(|m| m.id == mapping_id) else {
            return Err(ToolError::not_found(format!("Mapping '{}' not found", mapping_id)));
        };
        let mut next = state.mappings[index].clone();
        if let Some(source) = patch.source_path {
            next.source_path = source;
        }
        if let Some(target) = patch.target_path {
            next.target_path = target;
        }
        if let Some(direction) = patch.direction {
            next.direction = direction;
        }
        if let Some(transform) = patch.transform_config {
            next.transform_config = transform;
        }
        validate_paths(&next.source_path, &next.target_path)?;
        if Self::conflicts(
            &state,
            Some(mapping_id),
            &next.action_id,
            next.connection_id.as_deref(),
            &next.source_path,
            next.direction,
        ) {
            return Err(duplicate_error(
                &next.action_id,
                next.connection_id.as_deref(),
                &next.source_path,
                next.direction,
            ));
        }
        next.updated_at = now();
        state.mappings[index] = next.clone();
        Ok(next)
    }

    async fn delete_mapping(&self, mapping_id: &str) -> Result<Option<FieldMapping>, ToolError> {
        let mut state = self.write();
        let position = state.mappings.iter().position(|m| m.id == mapping_id);
        Ok(position.map(|idx| state.mappings.remove(idx)))
    }

    async fn get_mapping_config(&self, action_id: &str) -> Result<MappingConfig, ToolError> {
        Ok(self.read().configs.get(action_id).cloned().unwrap_or_default())
    }

    async fn set_mapping_config(
        &self,
        action_id: &str,
        config: MappingConfig,
    ) -> Result<MappingConfig, ToolError> {
        self.write()
            .configs
            .insert(action_id.to_string(), config.clone());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolErrorKind;
    use crate::pipeline::types::TransformConfig;

    fn new_mapping(connection: Option<&str>, source: &str) -> NewFieldMapping {
        NewFieldMapping {
            action_id: "act1".to_string(),
            connection_id: connection.map(str::to_string),
            source_path: source.to_string(),
            target_path: "$.out".to_string(),
            direction: Direction::Output,
            transform_config: TransformConfig::default(),
        }
    }

    #[tokio::test]
    async fn rejects_duplicates_within_same_scope_only() {
        let store = MemoryMappingStore::new();
        store.create_mapping(new_mapping(None, "$.a")).await.unwrap();
        let err = store.create_mapping(new_mapping(None, "$.a")).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Conflict);
        assert_eq!(err.code, "DUPLICATE_MAPPING");
        store
            .create_mapping(new_mapping(Some("conn1"), "$.a"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_invalid_paths() {
        let store = MemoryMappingStore::new();
        let err = store
            .create_mapping(new_mapping(None, "data.a"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_PATH");
    }

    #[tokio::test]
    async fn update_checks_uniqueness_against_others() {
        let store = MemoryMappingStore::new();
        store.create_mapping(new_mapping(None, "$.a")).await.unwrap();
        let second = store.create_mapping(new_mapping(None, "$.b")).await.unwrap();
        let patch = MappingPatch {
            source_path: Some("$.a".to_string()),
            ..MappingPatch::default()
        };
        let err = store.update_mapping(&second.id, patch).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Conflict);

        let patch = MappingPatch {
            target_path: Some("$.renamed".to_string()),
            ..MappingPatch::default()
        };
        let updated = store.update_mapping(&second.id, patch).await.unwrap();
        assert_eq!(updated.target_path, "$.renamed");
    }

    #[tokio::test]
    async fn scoped_listing_and_config_defaults() {
        let store = MemoryMappingStore::new();
        store.create_mapping(new_mapping(None, "$.a")).await.unwrap();
        store
            .create_mapping(new_mapping(Some("conn1"), "$.b"))
            .await
            .unwrap();
        let defaults = store
            .list_mappings("act1", ConnectionScope::Defaults)
            .await
            .unwrap();
        assert_eq!(defaults.len(), 1);
        let conn = store
            .list_mappings("act1", ConnectionScope::Connection("conn1".to_string()))
            .await
            .unwrap();
        assert_eq!(conn[0].source_path, "$.b");
        assert_eq!(
            store.get_mapping_config("act1").await.unwrap(),
            MappingConfig::default()
        );
    }
}
