use crate::errors::ToolError;
use crate::pipeline::mapping::MappingResolver;
use crate::pipeline::orchestrator::{ExecutionRequest, Orchestrator};
use crate::pipeline::types::ActionDefinition;
use crate::pipeline::validation::DriftTracker;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::logger::Logger;
use crate::services::validation::Validation;
use crate::stores::MappingStore;
use crate::utils::tool_errors::unknown_action_error;
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

const GATEWAY_ACTIONS: &[&str] = &[
    "execute",
    "action_upsert",
    "action_get",
    "action_list",
    "action_delete",
    "circuit_status",
    "circuit_reset",
    "drift_report",
];

#[derive(Clone)]
pub struct GatewayManager {
    logger: Logger,
    validation: Validation,
    store: Arc<dyn MappingStore>,
    resolver: Arc<MappingResolver>,
    orchestrator: Arc<Orchestrator>,
    breaker: Arc<CircuitBreaker>,
    drift: Arc<DriftTracker>,
}

impl GatewayManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        store: Arc<dyn MappingStore>,
        resolver: Arc<MappingResolver>,
        orchestrator: Arc<Orchestrator>,
        breaker: Arc<CircuitBreaker>,
        drift: Arc<DriftTracker>,
    ) -> Self {
        Self {
            logger: logger.child("gateway"),
            validation,
            store,
            resolver,
            orchestrator,
            breaker,
            drift,
        }
    }

    pub async fn handle_action(&self, args: Value) -> Result<Value, ToolError> {
        let action = args.get("action");
        match action.and_then(|v| v.as_str()).unwrap_or("") {
            "execute" => self.execute(&args).await,
            "action_upsert" => self.action_upsert(&args).await,
            "action_get" => self.action_get(&args).await,
            "action_list" => self.action_list().await,
            "action_delete" => self.action_delete(&args).await,
            "circuit_status" => self.circuit_status(&args),
            "circuit_reset" => self.circuit_reset(&args),
            "drift_report" => self.drift_report(&args),
            _ => Err(unknown_action_error("gateway", action, GATEWAY_ACTIONS)),
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self
            .validation
            .ensure_identifier(args.get("action_id").unwrap_or(&Value::Null), "action_id")?;
        let connection_id = self
            .validation
            .ensure_optional_identifier(args.get("connection_id"), "connection_id")?;
        let input = args.get("input").cloned().unwrap_or_else(|| json!({}));
        if !input.is_object() {
            return Err(ToolError::invalid_params("input must be an object"));
        }

        let mut request = ExecutionRequest::new(&action_id, input);
        request.connection_id = connection_id;
        if let Some(raw) = args.get("pagination").filter(|v| !v.is_null()) {
            request.pagination = self.validation.parse(raw.clone(), "pagination")?;
        }
        if let Some(raw) = args.get("validation").filter(|v| !v.is_null()) {
            request.validation = self.validation.parse(raw.clone(), "validation")?;
        }
        if let Some(raw) = args.get("mapping").filter(|v| !v.is_null()) {
            request.mapping = self.validation.parse(raw.clone(), "mapping")?;
        }

        let response = self.orchestrator.execute(request).await?;
        serde_json::to_value(response).map_err(|err| ToolError::internal(err.to_string()))
    }

    async fn action_upsert(&self, args: &Value) -> Result<Value, ToolError> {
        let raw = self.validation.ensure_object(args.get("definition"), "definition")?;
        let definition: ActionDefinition = self
            .validation
            .parse(Value::Object(raw.clone()), "definition")?;
        self.validation
            .ensure_identifier(&Value::String(definition.id.clone()), "definition.id")?;
        self.validation.ensure_identifier(
            &Value::String(definition.integration_id.clone()),
            "definition.integrationId",
        )?;
        let base = Url::parse(&definition.base_url)
            .map_err(|_| ToolError::invalid_params("definition.baseUrl must be an absolute URL"))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ToolError::invalid_params(
                "definition.baseUrl must use http or https",
            ));
        }

        let saved = self.store.upsert_action(definition).await?;
        let dropped = self.resolver.invalidate_action(&saved.id);
        self.logger.info(
            "Action saved",
            Some(&json!({ "action_id": saved.id, "cache_entries_dropped": dropped })),
        );
        Ok(json!({ "action": saved }))
    }

    async fn action_get(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self
            .validation
            .ensure_identifier(args.get("action_id").unwrap_or(&Value::Null), "action_id")?;
        let action = self
            .store
            .get_action(&action_id)
            .await?
            .ok_or_else(|| ToolError::not_found(format!("Unknown action: {}", action_id)))?;
        Ok(json!({ "action": action }))
    }

    async fn action_list(&self) -> Result<Value, ToolError> {
        let actions = self.store.list_actions().await?;
        Ok(json!({ "count": actions.len(), "actions": actions }))
    }

    async fn action_delete(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self
            .validation
            .ensure_identifier(args.get("action_id").unwrap_or(&Value::Null), "action_id")?;
        let deleted = self.store.delete_action(&action_id).await?;
        if !deleted {
            return Err(ToolError::not_found(format!("Unknown action: {}", action_id)));
        }
        self.resolver.invalidate_action(&action_id);
        self.drift.reset(&action_id);
        Ok(json!({ "deleted": true, "action_id": action_id }))
    }

    fn circuit_status(&self, args: &Value) -> Result<Value, ToolError> {
        match self
            .validation
            .ensure_optional_identifier(args.get("circuit_id"), "circuit_id")?
        {
            Some(id) => {
                let snapshot = self
                    .breaker
                    .snapshot(&id)
                    .ok_or_else(|| ToolError::not_found(format!("Unknown circuit: {}", id)))?;
                Ok(json!({ "circuit": snapshot }))
            }
            None => {
                let circuits = self.breaker.snapshots();
                Ok(json!({
                    "count": circuits.len(),
                    "circuits": circuits,
                    "config": self.breaker.config(),
                }))
            }
        }
    }

    fn circuit_reset(&self, args: &Value) -> Result<Value, ToolError> {
        let circuit_id = self
            .validation
            .ensure_identifier(args.get("circuit_id").unwrap_or(&Value::Null), "circuit_id")?;
        let reset = self.breaker.reset(&circuit_id);
        Ok(json!({ "circuit_id": circuit_id, "reset": reset }))
    }

    fn drift_report(&self, args: &Value) -> Result<Value, ToolError> {
        let action_id = self
            .validation
            .ensure_optional_identifier(args.get("action_id"), "action_id")?;
        let entries = self.drift.report(action_id.as_deref());
        let drifting = entries.iter().filter(|e| e.status.detected).count();
        Ok(json!({ "count": entries.len(), "drifting": drifting, "actions": entries }))
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for GatewayManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.logger.debug("handle_action", args.get("action"));
        self.handle_action(args).await
    }
}
