use crate::errors::{ExecutionError, ToolError};
use crate::pipeline::mapping::{apply_compiled, MappingError, MappingResolver, MappingResult};
use crate::pipeline::pagination::{
    detect_strategy, extract_items, items_location, strategy_for, PageRequest, PageResponse,
    PageState, PaginationStrategy,
};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::types::{
    ActionDefinition, Direction, FailureMode, MappingConfig, PaginationConfig, StrategySelection,
    ValidationConfig, ValidationMode,
};
use crate::pipeline::validation::{
    compile_schema, validate, CompiledSchema, DriftStatus, DriftTracker, ValidationIssue,
};
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::logger::Logger;
use crate::services::settings::GatewaySettings;
use crate::services::transport::{HttpTransport, OutboundRequest, RawResponse};
use crate::stores::MappingStore;
use crate::utils::template::render_template;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationOverrides {
    pub strategy_override: Option<StrategySelection>,
    pub bypass: bool,
    pub max_pages: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOverrides {
    pub mode_override: Option<ValidationMode>,
    pub bypass: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingOverrides {
    pub bypass: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub action_id: String,
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default = "empty_object")]
    pub input: Value,
    #[serde(default)]
    pub pagination: PaginationOverrides,
    #[serde(default)]
    pub validation: ValidationOverrides,
    #[serde(default)]
    pub mapping: MappingOverrides,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl ExecutionRequest {
    pub fn new(action_id: &str, input: Value) -> Self {
        Self {
            action_id: action_id.to_string(),
            connection_id: None,
            input,
            pagination: PaginationOverrides::default(),
            validation: ValidationOverrides::default(),
            mapping: MappingOverrides::default(),
        }
    }

    pub fn with_connection(mut self, connection_id: &str) -> Self {
        self.connection_id = Some(connection_id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub strategy_used: String,
    pub pages_fetched: usize,
    pub items_fetched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub truncated: bool,
    pub bypassed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationMeta {
    pub valid: bool,
    pub mode: ValidationMode,
    pub bypassed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
    pub fields_coerced: usize,
    pub fields_stripped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingMeta {
    pub applied: bool,
    pub bypassed: bool,
    pub fields_transformed: usize,
    pub fields_coerced: usize,
    pub fields_defaulted: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<MappingError>,
    pub failure_mode: FailureMode,
}

impl MappingMeta {
    fn new(config: &MappingConfig, bypassed: bool) -> Self {
        Self {
            applied: false,
            bypassed,
            fields_transformed: 0,
            fields_coerced: 0,
            fields_defaulted: 0,
            errors: Vec::new(),
            failure_mode: config.failure_mode,
        }
    }

    fn absorb(&mut self, result: &MappingResult) {
        self.applied |= result.applied;
        self.fields_transformed += result.stats.fields_transformed;
        self.fields_coerced += result.stats.fields_coerced;
        self.fields_defaulted += result.stats.fields_defaulted;
        self.errors.extend(result.errors.iter().cloned());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailure {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&ExecutionError> for ExecutionFailure {
    fn from(err: &ExecutionError) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            retryable: err.retryable,
            retry_after_ms: err.retry_after_ms,
            status: err.status,
            cause: err.cause.map(|c| c.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: String,
    pub latency_ms: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub success: bool,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappingMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    pub meta: ResponseMeta,
}

/// Accumulates metadata while one execution moves through the stages.
struct Run {
    request_id: String,
    started: Instant,
    attempts: u32,
    mapping: Option<MappingMeta>,
    pagination: Option<PaginationMeta>,
    validation: Option<ValidationMeta>,
}

impl Run {
    fn finish(self, data: Value, preamble: Option<String>, error: Option<ExecutionFailure>) -> ExecutionResponse {
        ExecutionResponse {
            success: error.is_none(),
            data,
            preamble,
            pagination: self.pagination,
            validation: self.validation,
            mapping: self.mapping,
            error,
            meta: ResponseMeta {
                request_id: self.request_id,
                timestamp: chrono::Utc::now().to_rfc3339(),
                latency_ms: self.started.elapsed().as_millis() as u64,
                attempts: self.attempts,
            },
        }
    }
}

/// A failed stage plus the data handed back to the caller untouched.
struct Rejection {
    failure: ExecutionFailure,
    data: Value,
}

impl From<ExecutionFailure> for Rejection {
    fn from(failure: ExecutionFailure) -> Self {
        Self {
            failure,
            data: Value::Null,
        }
    }
}

/// What the pipeline knows about the response validator for this run.
struct ValidationPlan {
    config: ValidationConfig,
    schema: Option<CompiledSchema>,
    bypassed: bool,
}

impl ValidationPlan {
    fn active(&self) -> bool {
        !self.bypassed && self.config.enabled && self.schema.is_some()
    }
}

fn stringify_query(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(stringify_query)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

/// Fills `{name}` placeholders in `template` from top-level input fields and
/// removes the consumed fields from `input`.
pub(crate) fn fill_path(template: &str, input: &mut Value) -> Result<String, ToolError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let (prefix, tail) = rest.split_at(start);
        out.push_str(prefix);
        let end = tail
            .find('}')
            .ok_or_else(|| ToolError::invalid_params(format!("Unclosed placeholder in path '{}'", template)))?;
        let name = tail[1..end].trim();
        let value = input
            .as_object_mut()
            .and_then(|map| map.remove(name))
            .and_then(|v| stringify_query(&v))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ToolError::invalid_params(format!("Missing path parameter '{}'", name))
                    .with_hint("Provide it as a top-level input field.")
            })?;
        out.push_str(&value);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn join_url(base_url: &str, path: &str) -> Result<Url, ToolError> {
    let raw = if path.is_empty() {
        base_url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };
    let url = Url::parse(&raw).map_err(|_| ToolError::invalid_params(format!("Invalid URL: {}", raw)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ToolError::invalid_params("Only http/https URLs are supported"));
    }
    Ok(url)
}

/// Request template shared by every page of one execution.
struct BaseRequest {
    method: String,
    url: Url,
    query: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
    timeout_ms: u64,
}

impl BaseRequest {
    fn build(action: &ActionDefinition, input: Value, timeout_ms: u64, request_id: &str) -> Result<Self, ToolError> {
        let mut input = input;
        let path = fill_path(&action.path, &mut input)?;
        let url = join_url(&action.base_url, &path)?;

        let mut query: BTreeMap<String, String> = action
            .query
            .iter()
            .filter_map(|(k, v)| stringify_query(v).map(|v| (k.clone(), v)))
            .collect();
        let body = if action.sends_body() {
            Some(input)
        } else {
            if let Value::Object(map) = &input {
                for (key, value) in map {
                    if let Some(text) = stringify_query(value) {
                        query.insert(key.clone(), text);
                    }
                }
            }
            None
        };

        let mut headers: BTreeMap<String, String> = action
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        headers
            .entry("accept".to_string())
            .or_insert_with(|| "application/json".to_string());
        headers.insert("x-request-id".to_string(), request_id.to_string());

        Ok(Self {
            method: action.method.to_ascii_uppercase(),
            url,
            query,
            headers,
            body,
            timeout_ms: action.timeout_ms.unwrap_or(timeout_ms),
        })
    }

    fn page(&self, page: &PageRequest) -> OutboundRequest {
        let url = match page.url_override.as_deref().and_then(|raw| Url::parse(raw).ok()) {
            Some(next) => next,
            None => {
                let mut url = self.url.clone();
                let mut params: BTreeMap<String, String> = url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                params.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
                params.extend(page.query.iter().map(|(k, v)| (k.clone(), v.clone())));
                if params.is_empty() {
                    url.set_query(None);
                } else {
                    url.query_pairs_mut().clear().extend_pairs(params.iter());
                }
                url
            }
        };
        OutboundRequest {
            method: self.method.clone(),
            url: url.to_string(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Runs actions end to end: input mapping, paginated calls behind the
/// circuit breaker with retries, raw-page validation, merge, output mapping.
pub struct Orchestrator {
    logger: Logger,
    store: Arc<dyn MappingStore>,
    resolver: Arc<MappingResolver>,
    breaker: Arc<CircuitBreaker>,
    transport: Arc<dyn HttpTransport>,
    drift: Arc<DriftTracker>,
    settings: GatewaySettings,
}

impl Orchestrator {
    pub fn new(
        logger: Logger,
        store: Arc<dyn MappingStore>,
        resolver: Arc<MappingResolver>,
        breaker: Arc<CircuitBreaker>,
        transport: Arc<dyn HttpTransport>,
        drift: Arc<DriftTracker>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            logger: logger.child("pipeline"),
            store,
            resolver,
            breaker,
            transport,
            drift,
            settings,
        }
    }

    /// Errors are reserved for requests that cannot start (unknown action,
    /// bad path parameters). Upstream and pipeline failures come back as a
    /// response with `success: false`.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ToolError> {
        let mut run = Run {
            request_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            attempts: 0,
            mapping: None,
            pagination: None,
            validation: None,
        };

        let action = self
            .store
            .get_action(&request.action_id)
            .await?
            .ok_or_else(|| ToolError::not_found(format!("Unknown action: {}", request.action_id)))?;
        let connection_id = request.connection_id.as_deref();

        let mapping_config = self.store.get_mapping_config(&action.id).await?;
        let mapping_active = mapping_config.enabled && !request.mapping.bypass;
        run.mapping = Some(MappingMeta::new(&mapping_config, request.mapping.bypass));

        let input = if mapping_active {
            let set = self
                .resolver
                .compiled(&action.id, connection_id, Direction::Input)
                .await?;
            let result = apply_compiled(&request.input, &mapping_config, &set);
            if let Some(meta) = run.mapping.as_mut() {
                meta.absorb(&result);
            }
            if result.failed() {
                let failure = mapping_failure("input", &result);
                return Ok(run.finish(request.input, None, Some(failure)));
            }
            result.data
        } else {
            request.input.clone()
        };

        let base = BaseRequest::build(&action, input, self.settings.http_timeout_ms, &run.request_id)?;
        let plan = self.validation_plan(&action, &request);
        let retry = RetryPolicy::from_overrides(action.retry.as_ref());

        let raw = match self.paginate(&action, &request, &base, &plan, &retry, &mut run).await {
            Ok(data) => data,
            Err(rejection) => return Ok(run.finish(rejection.data, None, Some(rejection.failure))),
        };

        let data = if mapping_active {
            let set = self
                .resolver
                .compiled(&action.id, connection_id, Direction::Output)
                .await?;
            let result = apply_compiled(&raw, &mapping_config, &set);
            if let Some(meta) = run.mapping.as_mut() {
                meta.absorb(&result);
            }
            if result.failed() {
                let failure = mapping_failure("output", &result);
                return Ok(run.finish(raw, None, Some(failure)));
            }
            result.data
        } else {
            raw
        };

        let preamble = action.response_preamble.as_deref().map(|template| {
            let pagination = run.pagination.as_ref();
            render_template(
                template,
                &json!({
                    "action": action.id,
                    "actionName": action.name,
                    "pagesFetched": pagination.map(|p| p.pages_fetched).unwrap_or(0),
                    "itemCount": pagination.map(|p| p.items_fetched).unwrap_or(0),
                    "strategy": pagination.map(|p| p.strategy_used.clone()),
                }),
            )
        });

        self.logger.info(
            "Action executed",
            Some(&json!({
                "action_id": action.id,
                "connection_id": connection_id,
                "request_id": run.request_id,
                "attempts": run.attempts,
                "pages": run.pagination.as_ref().map(|p| p.pages_fetched),
            })),
        );
        Ok(run.finish(data, preamble, None))
    }

    fn validation_plan(&self, action: &ActionDefinition, request: &ExecutionRequest) -> ValidationPlan {
        let mut config = action.validation.clone().unwrap_or_else(|| ValidationConfig {
            timeout_ms: self.settings.validation_timeout_ms,
            ..ValidationConfig::default()
        });
        if let Some(mode) = request.validation.mode_override {
            config.mode = mode;
        }
        ValidationPlan {
            schema: action.output_schema.as_ref().and_then(compile_schema),
            config,
            bypassed: request.validation.bypass,
        }
    }

    fn pagination_config(&self, action: &ActionDefinition, request: &ExecutionRequest) -> Option<PaginationConfig> {
        if request.pagination.bypass {
            return None;
        }
        let mut config = action.pagination.clone()?;
        if !config.enabled {
            return None;
        }
        if let Some(selection) = request.pagination.strategy_override {
            config.strategy = selection;
        }
        config.max_pages = config
            .max_pages
            .min(request.pagination.max_pages.unwrap_or(usize::MAX))
            .min(self.settings.max_pages)
            .max(1);
        config.max_items = config.max_items.min(self.settings.max_items).max(1);
        config.page_size = config.page_size.max(1);
        Some(config)
    }

    /// Fetches every page and returns the merged body, already passed
    /// through the validator. Pagination signals are read from the raw
    /// pages so stripping cannot hide them.
    async fn paginate(
        &self,
        action: &ActionDefinition,
        request: &ExecutionRequest,
        base: &BaseRequest,
        plan: &ValidationPlan,
        retry: &RetryPolicy,
        run: &mut Run,
    ) -> Result<Value, Rejection> {
        let config = self.pagination_config(action, request);
        let mut meta = PaginationMeta {
            strategy_used: "none".to_string(),
            pages_fetched: 0,
            items_fetched: 0,
            total_items: None,
            confidence: None,
            truncated: false,
            bypassed: request.pagination.bypass,
        };
        run.validation = Some(ValidationMeta {
            valid: true,
            mode: plan.config.mode,
            bypassed: plan.bypassed,
            issues: Vec::new(),
            fields_coerced: 0,
            fields_stripped: 0,
            drift: None,
        });

        let Some(config) = config else {
            let response = self.call(action, base.page(&PageRequest::default()), retry, run).await?;
            let body = match self.validate_page(action, plan, &response.body, 0, run) {
                Ok(body) => body,
                Err(failure) => {
                    return Err(Rejection {
                        failure,
                        data: response.body,
                    })
                }
            };
            meta.pages_fetched = 1;
            meta.items_fetched = body.as_array().map(|items| items.len()).unwrap_or(0);
            run.pagination = Some(meta);
            return Ok(body);
        };

        let mut strategy: Option<&'static dyn PaginationStrategy> = config.strategy.explicit().map(strategy_for);
        let mut state = PageState::initial(&config);
        let mut first_body: Option<Value> = None;
        let mut items: Vec<Value> = Vec::new();

        loop {
            let page_request = match strategy {
                Some(strategy) => strategy.build_request_params(&config, &state),
                None => {
                    let mut first = PageRequest::default();
                    first
                        .query
                        .insert(config.limit_param.clone(), config.page_size.to_string());
                    first
                }
            };
            let response = match self.call(action, base.page(&page_request), retry, run).await {
                Ok(response) => response,
                Err(failure) => {
                    run.pagination = Some(meta);
                    return Err(failure.into());
                }
            };
            let page_index = meta.pages_fetched;
            meta.pages_fetched += 1;
            let body = match self.validate_page(action, plan, &response.body, page_index, run) {
                Ok(body) => body,
                Err(failure) => {
                    run.pagination = Some(meta);
                    return Err(Rejection {
                        failure,
                        data: response.body,
                    });
                }
            };
            let page = PageResponse {
                body: &response.body,
                headers: &response.headers,
            };

            if strategy.is_none() && page_index == 0 && config.strategy == StrategySelection::Auto {
                match detect_strategy(&page) {
                    Some(detection) => {
                        meta.confidence = Some(detection.confidence);
                        strategy = Some(strategy_for(detection.strategy));
                    }
                    None => {
                        meta.items_fetched = extract_items(&body, &config).len();
                        run.pagination = Some(meta);
                        return Ok(body);
                    }
                }
            }
            let Some(active) = strategy else {
                run.pagination = Some(meta);
                return Ok(body);
            };
            meta.strategy_used = active.kind().as_str().to_string();

            let info = active.extract_pagination_info(&page, &config, &state);
            meta.total_items = info.total_items.or(meta.total_items);
            let page_items = extract_items(&body, &config);
            let room = config.max_items.saturating_sub(items.len());
            if page_items.len() > room {
                meta.truncated = true;
            }
            items.extend(page_items.into_iter().take(room));
            if first_body.is_none() {
                first_body = Some(body.clone());
            }

            let caps_hit = meta.pages_fetched >= config.max_pages || items.len() >= config.max_items;
            if !info.has_more {
                break;
            }
            if caps_hit {
                meta.truncated = true;
                break;
            }
            let previous = state.clone();
            active.advance(&mut state, &info, &config);
            let stalled = (state.cursor.is_some() && state.cursor == previous.cursor)
                || (state.next_url.is_some() && state.next_url == previous.next_url);
            if stalled {
                self.logger.warn(
                    "Pagination made no progress; stopping",
                    Some(&json!({ "action_id": action.id, "page": meta.pages_fetched })),
                );
                break;
            }
        }

        meta.items_fetched = items.len();
        let first = first_body.unwrap_or(Value::Null);
        let merged = match items_location(&first, &config) {
            Some(location) => {
                let mut out = first;
                location.set_in_place(&mut out, Value::Array(items));
                out
            }
            None => Value::Array(items),
        };
        self.logger.debug(
            "Pagination finished",
            Some(&json!({
                "action_id": action.id,
                "strategy": meta.strategy_used,
                "pages": meta.pages_fetched,
                "items": meta.items_fetched,
                "truncated": meta.truncated,
            })),
        );
        run.pagination = Some(meta);
        Ok(merged)
    }

    fn validate_page(
        &self,
        action: &ActionDefinition,
        plan: &ValidationPlan,
        body: &Value,
        page_index: usize,
        run: &mut Run,
    ) -> Result<Value, ExecutionFailure> {
        if !plan.active() {
            return Ok(body.clone());
        }
        let result = validate(body, plan.schema.as_ref(), &plan.config);
        let drift = plan
            .config
            .drift_detection
            .then(|| self.drift.record(&action.id, body, result.valid && result.issues.is_empty()));

        let Some(meta) = run.validation.as_mut() else {
            return Ok(result.data);
        };
        meta.valid &= result.valid;
        meta.fields_coerced += result.stats.fields_coerced;
        meta.fields_stripped += result.stats.fields_stripped;
        if drift.is_some() {
            meta.drift = drift;
        }
        let room = crate::constants::validation::MAX_ISSUES.saturating_sub(meta.issues.len());
        meta.issues.extend(result.issues.into_iter().take(room).map(|mut issue| {
            if page_index > 0 {
                issue.path = page_issue_path(page_index, &issue.path);
            }
            issue
        }));

        if !result.valid {
            let errors = result_error_count(meta);
            return Err(ExecutionFailure {
                code: "VALIDATION_FAILED".to_string(),
                message: format!(
                    "Response failed strict validation with {} issue(s)",
                    errors
                ),
                retryable: false,
                retry_after_ms: None,
                status: None,
                cause: None,
            });
        }
        Ok(result.data)
    }

    /// One logical call: circuit gate, send, classify, retry with backoff.
    async fn call(
        &self,
        action: &ActionDefinition,
        request: OutboundRequest,
        retry: &RetryPolicy,
        run: &mut Run,
    ) -> Result<RawResponse, ExecutionFailure> {
        let circuit_id = action.integration_id.as_str();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if let Err(open) = self.breaker.check(circuit_id) {
                let err = ExecutionError::circuit_open(&open.circuit_id, open.retry_after_ms);
                self.logger.warn(
                    "Circuit open; call rejected",
                    Some(&json!({ "circuit_id": circuit_id, "retry_after_ms": open.retry_after_ms })),
                );
                return Err(ExecutionFailure::from(&err));
            }
            run.attempts += 1;

            let err = match self.transport.send(request.clone()).await {
                Ok(response) if response.is_success() => {
                    self.breaker.record_success(circuit_id);
                    return Ok(response);
                }
                Ok(response) => {
                    ExecutionError::from_status(response.status, &response.headers, &response.preview())
                }
                Err(err) => err,
            };
            if err.code.counts_against_circuit() {
                self.breaker.record_failure(circuit_id);
            }

            if retry.should_retry(&err, attempt) {
                let delay = retry.delay_ms(attempt, Some(&err));
                self.logger.warn(
                    "Retrying outbound call",
                    Some(&json!({
                        "action_id": action.id,
                        "attempt": attempt,
                        "code": err.code.as_str(),
                        "delay_ms": delay,
                    })),
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                continue;
            }

            let err = if attempt > 1 && err.retryable {
                ExecutionError::max_retries_exceeded(err, attempt)
            } else {
                err
            };
            self.logger.error(
                "Outbound call failed",
                Some(&json!({
                    "action_id": action.id,
                    "code": err.code.as_str(),
                    "status": err.status,
                    "attempts": attempt,
                })),
            );
            return Err(ExecutionFailure::from(&err));
        }
    }
}

/// `$.id` on page 2 becomes `page[1].id`; the page root becomes `page[1]`.
fn page_issue_path(page_index: usize, path: &str) -> String {
    format!("page[{}]{}", page_index, path.strip_prefix('$').unwrap_or(path))
}

fn result_error_count(meta: &ValidationMeta) -> usize {
    meta.issues
        .iter()
        .filter(|issue| issue.severity == crate::pipeline::validation::Severity::Error)
        .count()
}

fn mapping_failure(stage: &str, result: &MappingResult) -> ExecutionFailure {
    let first = result
        .errors
        .first()
        .map(|err| err.message.clone())
        .unwrap_or_default();
    ExecutionFailure {
        code: "MAPPING_FAILED".to_string(),
        message: format!(
            "{} mapping failed with {} error(s): {}",
            stage,
            result.errors.len(),
            first
        ),
        retryable: false,
        retry_after_ms: None,
        status: None,
        cause: None,
    }
}
