use crate::errors::ToolError;
use crate::pipeline::mapping::{
    apply_compiled, apply_mappings, MappingRequest, MappingResolver, MappingResult,
};
use crate::pipeline::types::{Direction, FieldMapping, MappingConfig, MappingSource};
use crate::services::logger::Logger;
use crate::services::validation::Validation;
use crate::stores::{ConnectionScope, MappingPatch, MappingStore, NewFieldMapping};
use crate::utils::tool_errors::unknown_action_error;
use serde_json::{json, Value};
use std::sync::Arc;

const MAPPING_ACTIONS: &[&str] = &[
    "list",
    "create",
    "update",
    "delete",
    "config_get",
    "config_update",
    "preview",
    "resolve",
    "invalidate",
];

fn result_to_value(result: &MappingResult) -> Value {
    json!({
        "applied": result.applied,
        "data": result.data,
        "errors": result.errors,
        "stats": result.stats,
        "failureMode": result.failure_mode,
    })
}

#[derive(Clone)]
pub struct MappingManager {
    logger: Logger,
    validation: Validation,
    store: Arc<dyn MappingStore>,
    resolver: Arc<MappingResolver>,
}

impl MappingManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        store: Arc<dyn MappingStore>,
        resolver: Arc<MappingResolver>,
    ) -> Self {
        Self {
            logger: logger.child("mappings"),
            validation,
            store,
            resolver,
        }
    }

    pub async fn handle_action(&self, args: Value) -> Result<Value, ToolError> {
        let action = args.get("action");
        match action.and_then(|v| v.as_str()).unwrap_or("") {
            "list" => self.list(&args).await,
            "create" => self.create(&args).await,
            "update" => self.update(&args).await,
            "delete" => self.delete(&args).await,
            "config_get" => self.config_get(&args).await,
            "config_update" => self.config_update(&args).await,
            "preview" => self.preview(&args).await,
            "resolve" => self.resolve(&args).await,
            "invalidate" => self.invalidate(&args),
            _ => Err(unknown_action_error("mappings", action, MAPPING_ACTIONS)),
        }
    }

    fn action_id(&self, args: &Value) -> Result<String, ToolError> {
        self.validation
            .ensure_identifier(args.get("action_id").unwrap_or(&Value::Null), "action_id")
    }

    fn connection_id(&self, args: &Value) -> Result<Option<String>, ToolError> {
        self.validation
            .ensure_optional_identifier(args.get("connection_id"), "connection_id")
    }

    async fn ensure_action(&self, action_id: &str) -> Result<(), ToolError> {
        match self.store.get_action(action_id).await? {
            Some(_) => Ok(()),
            None => Err(ToolError::not_found(format!("Unknown action: {}", action_id))),
        }
    }

    fn invalidate_for(&self, mapping: &FieldMapping) -> usize {
        self.resolver
            .invalidate(&mapping.action_id, mapping.connection_id.as_deref())
    }

    async fn list(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self.action_id(args)?;
        let connection_id = self.connection_id(args)?;
        let all = args.get("all").and_then(|v| v.as_bool()).unwrap_or(false);
        let scope = match (connection_id, all) {
            (_, true) => ConnectionScope::All,
            (Some(conn), false) => ConnectionScope::Connection(conn),
            (None, false) => ConnectionScope::Defaults,
        };
        let mappings = self.store.list_mappings(&action_id, scope).await?;
        Ok(json!({ "count": mappings.len(), "mappings": mappings }))
    }

    async fn create(&self, args: &Value) -> Result<Value, ToolError> {
        let raw = self.validation.ensure_object(args.get("mapping"), "mapping")?;
        let mapping: NewFieldMapping = self
            .validation
            .parse(Value::Object(raw.clone()), "mapping")?;
        self.validation
            .ensure_identifier(&Value::String(mapping.action_id.clone()), "mapping.actionId")?;
        if let Some(conn) = &mapping.connection_id {
            self.validation
                .ensure_identifier(&Value::String(conn.clone()), "mapping.connectionId")?;
        }
        self.ensure_action(&mapping.action_id).await?;

        let created = self.store.create_mapping(mapping).await?;
        let dropped = self.invalidate_for(&created);
        self.logger.info(
            "Mapping created",
            Some(&json!({
                "mapping_id": created.id,
                "action_id": created.action_id,
                "connection_id": created.connection_id,
                "cache_entries_dropped": dropped,
            })),
        );
        Ok(json!({ "mapping": created }))
    }

    async fn update(&self, args: &Value) -> Result<Value, ToolError> {
        let mapping_id = self
            .validation
            .ensure_string(args.get("mapping_id").unwrap_or(&Value::Null), "mapping_id", true)?;
        let raw = self.validation.ensure_object(args.get("patch"), "patch")?;
        let patch: MappingPatch = self.validation.parse(Value::Object(raw.clone()), "patch")?;

        let updated = self.store.update_mapping(&mapping_id, patch).await?;
        self.invalidate_for(&updated);
        Ok(json!({ "mapping": updated }))
    }

    async fn delete(&self, args: &Value) -> Result<Value, ToolError> {
        let mapping_id = self
            .validation
            .ensure_string(args.get("mapping_id").unwrap_or(&Value::Null), "mapping_id", true)?;
        let removed = self
            .store
            .delete_mapping(&mapping_id)
            .await?
            .ok_or_else(|| ToolError::not_found(format!("Unknown mapping: {}", mapping_id)))?;
        self.invalidate_for(&removed);
        Ok(json!({ "deleted": true, "mapping": removed }))
    }

    async fn config_get(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self.action_id(args)?;
        let config = self.store.get_mapping_config(&action_id).await?;
        Ok(json!({ "action_id": action_id, "config": config }))
    }

    /// Partial update: keys absent from `config` keep their stored values.
    async fn config_update(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self.action_id(args)?;
        let patch = self.validation.ensure_object(args.get("config"), "config")?;
        self.ensure_action(&action_id).await?;

        let current = self.store.get_mapping_config(&action_id).await?;
        let mut merged = serde_json::to_value(&current)
            .map_err(|err| ToolError::internal(err.to_string()))?;
        if let Value::Object(map) = &mut merged {
            for (key, value) in patch {
                map.insert(key.clone(), value.clone());
            }
        }
        let next: MappingConfig = self.validation.parse(merged, "config")?;
        let saved = self.store.set_mapping_config(&action_id, next).await?;
        Ok(json!({ "action_id": action_id, "config": saved }))
    }

    /// Applies mappings to sample data without calling the upstream. Inline
    /// `mappings` take precedence over the stored set.
    async fn preview(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self.action_id(args)?;
        let connection_id = self.connection_id(args)?;
        let direction: Direction = self.validation.parse(
            args.get("direction").cloned().unwrap_or_else(|| json!("output")),
            "direction",
        )?;
        let sample = args
            .get("sample")
            .cloned()
            .ok_or_else(|| ToolError::invalid_params("sample is required"))?;

        let mut config = self.store.get_mapping_config(&action_id).await?;
        if let Some(raw) = args.get("config").filter(|v| v.is_object()) {
            config = self.validation.parse(raw.clone(), "config")?;
        }

        let (result, count) = match args.get("mappings").filter(|v| !v.is_null()) {
            Some(raw) => {
                let entries = raw
                    .as_array()
                    .ok_or_else(|| ToolError::invalid_params("mappings must be an array"))?;
                let mut inline: Vec<FieldMapping> = Vec::with_capacity(entries.len());
                for (idx, entry) in entries.iter().enumerate() {
                    let mut entry = entry.clone();
                    if let Value::Object(map) = &mut entry {
                        map.entry("id").or_insert_with(|| json!(format!("preview-{}", idx)));
                        map.entry("actionId").or_insert_with(|| json!(action_id));
                        map.entry("direction").or_insert_with(|| json!(direction));
                    }
                    inline.push(self.validation.parse(entry, "mappings")?);
                }
                let count = inline.iter().filter(|m| m.direction == direction).count();
                let result = apply_mappings(
                    &sample,
                    MappingRequest {
                        direction,
                        config: &config,
                        mappings: &inline,
                    },
                );
                (result, count)
            }
            None => {
                let set = self
                    .resolver
                    .compiled(&action_id, connection_id.as_deref(), direction)
                    .await?;
                (apply_compiled(&sample, &config, &set), set.entries.len())
            }
        };

        let mut out = result_to_value(&result);
        if let Value::Object(map) = &mut out {
            map.insert("mappingCount".to_string(), json!(count));
            map.insert("direction".to_string(), json!(direction));
        }
        Ok(out)
    }

    async fn resolve(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self.action_id(args)?;
        let connection_id = self.connection_id(args)?;
        let resolved = self
            .resolver
            .resolve(&action_id, connection_id.as_deref())
            .await?;
        let overrides = resolved
            .iter()
            .filter(|m| m.source == MappingSource::Connection)
            .count();
        Ok(json!({
            "action_id": action_id,
            "connection_id": connection_id,
            "count": resolved.len(),
            "overrides": overrides,
            "mappings": resolved.as_slice(),
        }))
    }

    fn invalidate(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self.action_id(args)?;
        let connection_id = self.connection_id(args)?;
        let dropped = self
            .resolver
            .invalidate(&action_id, connection_id.as_deref());
        Ok(json!({
            "action_id": action_id,
            "connection_id": connection_id,
            "invalidated": dropped,
            "caches": self.resolver.cache_stats(),
        }))
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for MappingManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.logger.debug("handle_action", args.get("action"));
        self.handle_action(args).await
    }
}
