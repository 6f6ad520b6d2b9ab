pub mod file_mapping_store;
pub mod memory_mapping_store;

use crate::errors::ToolError;
use crate::pipeline::types::{ActionDefinition, Direction, FieldMapping, MappingConfig, TransformConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use file_mapping_store::FileMappingStore;
pub use memory_mapping_store::MemoryMappingStore;

/// Which mappings of an action a listing returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionScope {
    /// Action-level defaults (no connection).
    Defaults,
    Connection(String),
    All,
}

impl ConnectionScope {
    pub fn matches(&self, connection_id: Option<&str>) -> bool {
        match self {
            ConnectionScope::Defaults => connection_id.is_none(),
            ConnectionScope::Connection(id) => connection_id == Some(id.as_str()),
            ConnectionScope::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFieldMapping {
    pub action_id: String,
    #[serde(default)]
    pub connection_id: Option<String>,
    pub source_path: String,
    pub target_path: String,
    pub direction: Direction,
    #[serde(default)]
    pub transform_config: TransformConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingPatch {
    pub source_path: Option<String>,
    pub target_path: Option<String>,
    pub direction: Option<Direction>,
    pub transform_config: Option<TransformConfig>,
}

/// Persistence for action definitions, field mappings and per-action
/// mapping configuration.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get_action(&self, action_id: &str) -> Result<Option<ActionDefinition>, ToolError>;
    async fn list_actions(&self) -> Result<Vec<ActionDefinition>, ToolError>;
    async fn upsert_action(&self, action: ActionDefinition) -> Result<ActionDefinition, ToolError>;
    async fn delete_action(&self, action_id: &str) -> Result<bool, ToolError>;

    /// Mappings in creation order.
    async fn list_mappings(
        &self,
        action_id: &str,
        scope: ConnectionScope,
    ) -> Result<Vec<FieldMapping>, ToolError>;
    async fn get_mapping(&self, mapping_id: &str) -> Result<Option<FieldMapping>, ToolError>;
    async fn create_mapping(&self, mapping: NewFieldMapping) -> Result<FieldMapping, ToolError>;
    async fn update_mapping(
        &self,
        mapping_id: &str,
        patch: MappingPatch,
    ) -> Result<FieldMapping, ToolError>;
    async fn delete_mapping(&self, mapping_id: &str) -> Result<Option<FieldMapping>, ToolError>;

    /// Returns the default configuration when none was stored.
    async fn get_mapping_config(&self, action_id: &str) -> Result<MappingConfig, ToolError>;
    async fn set_mapping_config(
        &self,
        action_id: &str,
        config: MappingConfig,
    ) -> Result<MappingConfig, ToolError>;
}
