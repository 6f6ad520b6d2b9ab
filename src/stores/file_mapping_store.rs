use crate::constants::store::FILE_MODE;
use crate::errors::ToolError;
use crate::pipeline::types::{ActionDefinition, FieldMapping, MappingConfig};
use crate::services::logger::Logger;
use crate::stores::memory_mapping_store::StoreSnapshot;
use crate::stores::{ConnectionScope, MappingPatch, MappingStore, MemoryMappingStore, NewFieldMapping};
use crate::utils::fs_atomic::write_atomic;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// JSON-file backed store. Reads are served from memory; every mutation
/// rewrites the snapshot atomically.
pub struct FileMappingStore {
    logger: Logger,
    inner: MemoryMappingStore,
    file_path: PathBuf,
    queue: Mutex<()>,
}

impl FileMappingStore {
    pub async fn open(logger: Logger, file_path: impl AsRef<Path>) -> Result<Self, ToolError> {
        let store = Self {
            logger: logger.child("store"),
            inner: MemoryMappingStore::new(),
            file_path: file_path.as_ref().to_path_buf(),
            queue: Mutex::new(()),
        };
        store.load_from_disk().await?;
        Ok(store)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    async fn load_from_disk(&self) -> Result<(), ToolError> {
        let raw = match tokio::fs::read_to_string(&self.file_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(ToolError::internal(format!(
                    "Failed to load mapping store: {}",
                    err
                )))
            }
        };
        let snapshot: StoreSnapshot = serde_json::from_str(&raw).map_err(|err| {
            ToolError::internal(format!("Failed to parse mapping store: {}", err))
        })?;
        self.logger.info(
            "Mapping store loaded",
            Some(&serde_json::json!({
                "path": self.file_path.display().to_string(),
                "actions": snapshot.actions.len(),
                "mappings": snapshot.mappings.len(),
            })),
        );
        self.inner.restore(snapshot);
        Ok(())
    }

    async fn persist(&self) -> Result<(), ToolError> {
        let _guard = self.queue.lock().await;
        let payload = serde_json::to_string_pretty(&self.inner.snapshot()).map_err(|err| {
            ToolError::internal(format!("Failed to serialize mapping store: {}", err))
        })?;
        write_atomic(&self.file_path, format!("{}\n", payload).as_bytes(), FILE_MODE)
            .await
            .map_err(|err| ToolError::internal(format!("Failed to persist mapping store: {}", err)))
    }
}

#[async_trait]
impl MappingStore for FileMappingStore {
    async fn get_action(&self, action_id: &str) -> Result<Option<ActionDefinition>, ToolError> {
        self.inner.get_action(action_id).await
    }

    async fn list_actions(&self) -> Result<Vec<ActionDefinition>, ToolError> {
        self.inner.list_actions().await
    }

    async fn upsert_action(&self, action: ActionDefinition) -> Result<ActionDefinition, ToolError> {
        let saved = self.inner.upsert_action(action).await?;
        self.persist().await?;
        Ok(saved)
    }

    async fn delete_action(&self, action_id: &str) -> Result<bool, ToolError> {
        let removed = self.inner.delete_action(action_id).await?;
        self.persist().await?;
        Ok(removed)
    }

    async fn list_mappings(
        &self,
        action_id: &str,
        scope: ConnectionScope,
    ) -> Result<Vec<FieldMapping>, ToolError> {
        self.inner.list_mappings(action_id, scope).await
    }

    async fn get_mapping(&self, mapping_id: &str) -> Result<Option<FieldMapping>, ToolError> {
        self.inner.get_mapping(mapping_id).await
    }

    async fn create_mapping(&self, mapping: NewFieldMapping) -> Result<FieldMapping, ToolError> {
        let created = self.inner.create_mapping(mapping).await?;
        self.persist().await?;
        Ok(created)
    }

    async fn update_mapping(
        &self,
        mapping_id: &str,
        patch: MappingPatch,
    ) -> Result<FieldMapping, ToolError> {
        let updated = self.inner.update_mapping(mapping_id, patch).await?;
        self.persist().await?;
        Ok(updated)
    }

    async fn delete_mapping(&self, mapping_id: &str) -> Result<Option<FieldMapping>, ToolError> {
        let removed = self.inner.delete_mapping(mapping_id).await?;
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn get_mapping_config(&self, action_id: &str) -> Result<MappingConfig, ToolError> {
        self.inner.get_mapping_config(action_id).await
    }

    async fn set_mapping_config(
        &self,
        action_id: &str,
        config: MappingConfig,
    ) -> Result<MappingConfig, ToolError> {
        let saved = self.inner.set_mapping_config(action_id, config).await?;
        self.persist().await?;
        Ok(saved)
    }
}
