mod common;

use common::{action, harness, harness_with};
use gateway::errors::ExecutionError;
use gateway::pipeline::orchestrator::{ExecutionRequest, PaginationOverrides};
use gateway::pipeline::types::{
    Direction, FailureMode, MappingConfig, StrategySelection, TransformConfig, ValidationMode,
};
use gateway::services::circuit_breaker::{CircuitBreakerConfig, CircuitStatus};
use gateway::stores::{MappingStore, NewFieldMapping};
use serde_json::json;

fn mapping(source: &str, target: &str, direction: Direction, connection: Option<&str>) -> NewFieldMapping {
    NewFieldMapping {
        action_id: "contacts".to_string(),
        connection_id: connection.map(str::to_string),
        source_path: source.to_string(),
        target_path: target.to_string(),
        direction,
        transform_config: TransformConfig::default(),
    }
}

#[tokio::test]
async fn output_mapping_applies_connection_override() {
    let h = harness();
    h.store.upsert_action(action("contacts", json!({}))).await.unwrap();
    h.store
        .set_mapping_config(
            "contacts",
            MappingConfig {
                enabled: true,
                preserve_unmapped: false,
                failure_mode: FailureMode::Passthrough,
            },
        )
        .await
        .unwrap();
    h.store
        .create_mapping(mapping("$.full_name", "$.name", Direction::Output, None))
        .await
        .unwrap();
    let mut age = mapping("$.age", "$.age", Direction::Output, None);
    age.transform_config = serde_json::from_value(json!({ "coercion": { "type": "number" } })).unwrap();
    h.store.create_mapping(age).await.unwrap();
    h.store
        .create_mapping(mapping("$.full_name", "$.displayName", Direction::Output, Some("acme")))
        .await
        .unwrap();

    let upstream = json!({ "full_name": "Ada", "age": "36", "internal": true });
    h.transport.push(200, upstream.clone());
    h.transport.push(200, upstream);

    let plain = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(plain.success);
    assert_eq!(plain.data["name"], json!("Ada"));
    assert_eq!(plain.data["age"].as_f64(), Some(36.0));
    assert!(plain.data.get("internal").is_none());
    let meta = plain.mapping.unwrap();
    assert!(meta.applied);
    assert_eq!(meta.fields_coerced, 1);

    let tenant = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})).with_connection("acme"))
        .await
        .unwrap();
    assert_eq!(tenant.data["displayName"], json!("Ada"));
    assert!(tenant.data.get("name").is_none());
    assert_eq!(tenant.data["age"].as_f64(), Some(36.0));
}

#[tokio::test]
async fn input_mapping_reshapes_request_body() {
    let h = harness();
    h.store
        .upsert_action(action("contacts", json!({ "method": "POST", "path": "/orgs/{org}/contacts" })))
        .await
        .unwrap();
    h.store
        .set_mapping_config(
            "contacts",
            MappingConfig {
                enabled: true,
                ..MappingConfig::default()
            },
        )
        .await
        .unwrap();
    h.store
        .create_mapping(mapping("$.email", "$.contact.email", Direction::Input, None))
        .await
        .unwrap();
    h.transport.push(201, json!({ "id": "c1" }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new(
            "contacts",
            json!({ "org": "acme", "email": "ada@example.com" }),
        ))
        .await
        .unwrap();
    assert!(response.success);

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, "POST");
    assert_eq!(sent[0].url, "https://api.example.com/orgs/acme/contacts");
    let body = sent[0].body.clone().unwrap();
    assert_eq!(body["contact"]["email"], json!("ada@example.com"));
    assert!(body.get("org").is_none());
}

#[tokio::test]
async fn fail_mode_reports_mapping_failure() {
    let h = harness();
    h.store.upsert_action(action("contacts", json!({}))).await.unwrap();
    h.store
        .set_mapping_config(
            "contacts",
            MappingConfig {
                enabled: true,
                preserve_unmapped: true,
                failure_mode: FailureMode::Fail,
            },
        )
        .await
        .unwrap();
    h.store
        .create_mapping(mapping("$.missing", "$.value", Direction::Output, None))
        .await
        .unwrap();
    h.transport.push(200, json!({ "present": 1 }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(!response.success);
    let error = response.error.unwrap();
    assert_eq!(error.code, "MAPPING_FAILED");
    assert_eq!(response.mapping.unwrap().errors.len(), 1);
}

#[tokio::test]
async fn cursor_pagination_merges_pages() {
    let h = harness();
    h.store
        .upsert_action(action(
            "contacts",
            json!({ "pagination": { "strategy": "cursor", "pageSize": 2 } }),
        ))
        .await
        .unwrap();
    h.transport
        .push(200, json!({ "data": [1, 2], "next_cursor": "c2", "has_more": true }));
    h.transport
        .push(200, json!({ "data": [3], "next_cursor": null, "has_more": false }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.data["data"], json!([1, 2, 3]));
    let pagination = response.pagination.unwrap();
    assert_eq!(pagination.strategy_used, "cursor");
    assert_eq!(pagination.pages_fetched, 2);
    assert_eq!(pagination.items_fetched, 3);
    assert!(!pagination.truncated);

    let urls = h.transport.sent_urls();
    assert_eq!(urls.len(), 2);
    assert!(urls[0].contains("limit=2"));
    assert!(!urls[0].contains("cursor="));
    assert!(urls[1].contains("cursor=c2"));
}

#[tokio::test]
async fn auto_detects_link_header_pagination() {
    let h = harness();
    h.store
        .upsert_action(action("contacts", json!({ "pagination": {} })))
        .await
        .unwrap();
    h.transport.push_with_headers(
        200,
        json!([1, 2]),
        &[("Link", r#"<https://api.example.com/contacts?page=2>; rel="next""#)],
    );
    h.transport.push(200, json!([3]));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert_eq!(response.data, json!([1, 2, 3]));
    let pagination = response.pagination.unwrap();
    assert_eq!(pagination.strategy_used, "link_header");
    assert!(pagination.confidence.unwrap() > 0.5);
    assert_eq!(
        h.transport.sent_urls()[1],
        "https://api.example.com/contacts?page=2"
    );
}

#[tokio::test]
async fn auto_detect_without_signals_returns_first_page() {
    let h = harness();
    h.store
        .upsert_action(action("contacts", json!({ "pagination": {} })))
        .await
        .unwrap();
    h.transport.push(200, json!({ "id": 1 }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert_eq!(response.data, json!({ "id": 1 }));
    let pagination = response.pagination.unwrap();
    assert_eq!(pagination.strategy_used, "none");
    assert_eq!(pagination.pages_fetched, 1);
    assert_eq!(h.transport.sent().len(), 1);
}

#[tokio::test]
async fn max_pages_override_truncates() {
    let h = harness();
    h.store
        .upsert_action(action(
            "contacts",
            json!({ "pagination": { "strategy": "cursor", "pageSize": 1 } }),
        ))
        .await
        .unwrap();
    for n in 1..=3 {
        h.transport
            .push(200, json!({ "data": [n], "next_cursor": format!("c{}", n + 1) }));
    }

    let mut request = ExecutionRequest::new("contacts", json!({}));
    request.pagination = PaginationOverrides {
        strategy_override: Some(StrategySelection::Cursor),
        bypass: false,
        max_pages: Some(2),
    };
    let response = h.orchestrator.execute(request).await.unwrap();
    let pagination = response.pagination.unwrap();
    assert_eq!(pagination.pages_fetched, 2);
    assert!(pagination.truncated);
    assert_eq!(response.data["data"], json!([1, 2]));
    assert_eq!(h.transport.sent().len(), 2);
}

fn schema_action(mode: &str) -> serde_json::Value {
    json!({
        "outputSchema": {
            "type": "object",
            "properties": { "id": { "type": "integer" } },
            "required": ["id"]
        },
        "validation": { "mode": mode }
    })
}

#[tokio::test]
async fn strict_validation_rejects_bad_payload() {
    let h = harness();
    h.store
        .upsert_action(action("contacts", schema_action("strict")))
        .await
        .unwrap();
    h.transport.push(200, json!({ "id": "abc" }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.error.unwrap().code, "VALIDATION_FAILED");
    assert_eq!(response.data, json!({ "id": "abc" }));
    let validation = response.validation.unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.issues[0].path, "$.id");
}

#[tokio::test]
async fn stripping_extra_fields_keeps_cursor_pagination_going() {
    let h = harness();
    h.store
        .upsert_action(action(
            "contacts",
            json!({
                "pagination": { "strategy": "cursor", "pageSize": 2 },
                "outputSchema": {
                    "type": "object",
                    "properties": { "data": { "type": "array" } }
                },
                "validation": { "mode": "warn", "extraFields": "strip" }
            }),
        ))
        .await
        .unwrap();
    h.transport
        .push(200, json!({ "data": [1, 2], "next_cursor": "c2", "has_more": true }));
    h.transport
        .push(200, json!({ "data": [3], "next_cursor": null, "has_more": false }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.data, json!({ "data": [1, 2, 3] }));
    assert_eq!(response.pagination.unwrap().pages_fetched, 2);
    assert_eq!(response.validation.unwrap().fields_stripped, 4);
    assert!(h.transport.sent_urls()[1].contains("cursor=c2"));
}

#[tokio::test]
async fn later_page_issues_carry_page_prefix() {
    let h = harness();
    h.store
        .upsert_action(action(
            "contacts",
            json!({
                "pagination": { "strategy": "cursor" },
                "outputSchema": {
                    "type": "object",
                    "properties": { "data": { "type": "array" } }
                },
                "validation": { "mode": "warn" }
            }),
        ))
        .await
        .unwrap();
    h.transport
        .push(200, json!({ "data": [1], "next_cursor": "c2" }));
    h.transport.push(200, json!({ "data": "oops" }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(response.success);
    let validation = response.validation.unwrap();
    assert_eq!(validation.issues.len(), 1);
    assert_eq!(validation.issues[0].path, "page[1].data");
}

#[tokio::test]
async fn warn_override_lets_bad_payload_through() {
    let h = harness();
    h.store
        .upsert_action(action("contacts", schema_action("strict")))
        .await
        .unwrap();
    h.transport.push(200, json!({ "id": "abc" }));

    let mut request = ExecutionRequest::new("contacts", json!({}));
    request.validation.mode_override = Some(ValidationMode::Warn);
    let response = h.orchestrator.execute(request).await.unwrap();
    assert!(response.success);
    let validation = response.validation.unwrap();
    assert_eq!(validation.mode, ValidationMode::Warn);
    assert!(validation.valid);
    assert!(!validation.issues.is_empty());
}

#[tokio::test]
async fn lenient_validation_coerces_fields() {
    let h = harness();
    h.store
        .upsert_action(action("contacts", schema_action("lenient")))
        .await
        .unwrap();
    h.transport.push(200, json!({ "id": "42" }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.data["id"].as_f64(), Some(42.0));
    assert_eq!(response.validation.unwrap().fields_coerced, 1);
}

#[tokio::test]
async fn repeated_invalid_payloads_raise_drift() {
    let h = harness();
    let mut extra = schema_action("warn");
    extra["validation"]["driftDetection"] = json!(true);
    h.store.upsert_action(action("contacts", extra)).await.unwrap();

    let mut last = None;
    for _ in 0..5 {
        h.transport.push(200, json!({ "id": "not-a-number", "extra": 1 }));
        let response = h
            .orchestrator
            .execute(ExecutionRequest::new("contacts", json!({})))
            .await
            .unwrap();
        last = response.validation.and_then(|v| v.drift);
    }
    let drift = last.unwrap();
    assert!(drift.detected);
    assert_eq!(drift.samples, 5);
    assert!(h.drift.status("contacts").unwrap().detected);
}

#[tokio::test]
async fn retries_exhaust_into_max_retries_exceeded() {
    let h = harness();
    h.store.upsert_action(action("contacts", json!({}))).await.unwrap();
    for _ in 0..3 {
        h.transport.push(503, json!({ "error": "busy" }));
    }

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(!response.success);
    let error = response.error.unwrap();
    assert_eq!(error.code, "MAX_RETRIES_EXCEEDED");
    assert_eq!(error.cause.as_deref(), Some("SERVER_ERROR"));
    assert_eq!(error.status, Some(503));
    assert_eq!(response.meta.attempts, 3);
    assert_eq!(h.transport.sent().len(), 3);
}

#[tokio::test]
async fn long_retry_after_fails_without_sleeping() {
    let h = harness();
    h.store.upsert_action(action("contacts", json!({}))).await.unwrap();
    h.transport
        .push_with_headers(429, json!({ "error": "slow down" }), &[("Retry-After", "86400")]);

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(!response.success);
    let error = response.error.unwrap();
    assert_eq!(error.code, "RATE_LIMITED");
    assert_eq!(error.retry_after_ms, Some(86_400_000));
    assert_eq!(response.meta.attempts, 1);
    assert_eq!(h.transport.sent().len(), 1);
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let h = harness();
    h.store.upsert_action(action("contacts", json!({}))).await.unwrap();
    h.transport.push_error(ExecutionError::network("connection reset"));
    h.transport.push(200, json!({ "ok": true }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.meta.attempts, 2);
    assert_eq!(response.data, json!({ "ok": true }));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let h = harness();
    h.store.upsert_action(action("contacts", json!({}))).await.unwrap();
    h.transport.push(404, json!({ "error": "nope" }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, "CLIENT_ERROR");
    assert_eq!(error.status, Some(404));
    assert!(!error.retryable);
    assert_eq!(response.meta.attempts, 1);
    assert_eq!(h.breaker.state("crm"), CircuitStatus::Closed);
}

#[tokio::test]
async fn circuit_opens_then_recovers_after_reset_timeout() {
    let h = harness_with(CircuitBreakerConfig {
        failure_threshold: 2,
        reset_timeout_ms: 1_000,
        success_threshold: 1,
        ..CircuitBreakerConfig::default()
    });
    h.store
        .upsert_action(action("contacts", json!({ "retry": false })))
        .await
        .unwrap();
    h.transport.push(500, json!({}));
    h.transport.push(500, json!({}));

    for _ in 0..2 {
        let response = h
            .orchestrator
            .execute(ExecutionRequest::new("contacts", json!({})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, "SERVER_ERROR");
    }
    assert_eq!(h.breaker.state("crm"), CircuitStatus::Open);

    let rejected = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    let error = rejected.error.unwrap();
    assert_eq!(error.code, "CIRCUIT_OPEN");
    assert!(error.retry_after_ms.unwrap() <= 1_000);
    assert_eq!(h.transport.sent().len(), 2);

    h.clock.advance(1_000);
    h.transport.push(200, json!({ "ok": true }));
    let recovered = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert!(recovered.success);
    assert_eq!(h.breaker.state("crm"), CircuitStatus::Closed);
}

#[tokio::test]
async fn bypass_flags_skip_every_stage() {
    let h = harness();
    let mut extra = schema_action("strict");
    extra["pagination"] = json!({ "strategy": "cursor" });
    h.store.upsert_action(action("contacts", extra)).await.unwrap();
    h.store
        .set_mapping_config(
            "contacts",
            MappingConfig {
                enabled: true,
                preserve_unmapped: false,
                failure_mode: FailureMode::Fail,
            },
        )
        .await
        .unwrap();
    h.store
        .create_mapping(mapping("$.missing", "$.value", Direction::Output, None))
        .await
        .unwrap();
    h.transport.push(200, json!({ "id": "x", "next_cursor": "c2" }));

    let mut request = ExecutionRequest::new("contacts", json!({}));
    request.pagination.bypass = true;
    request.validation.bypass = true;
    request.mapping.bypass = true;
    let response = h.orchestrator.execute(request).await.unwrap();

    assert!(response.success);
    assert_eq!(response.data, json!({ "id": "x", "next_cursor": "c2" }));
    let pagination = response.pagination.unwrap();
    assert!(pagination.bypassed);
    assert_eq!(pagination.strategy_used, "none");
    assert!(response.validation.unwrap().bypassed);
    let mapping = response.mapping.unwrap();
    assert!(mapping.bypassed);
    assert!(!mapping.applied);
    assert_eq!(h.transport.sent().len(), 1);
}

#[tokio::test]
async fn preamble_renders_with_page_counts() {
    let h = harness();
    h.store
        .upsert_action(action(
            "contacts",
            json!({
                "name": "Contacts",
                "responsePreamble": "{{actionName}}: {{itemCount}} items via {{strategy}}",
                "pagination": { "strategy": "cursor" }
            }),
        ))
        .await
        .unwrap();
    h.transport.push(200, json!({ "items": [1, 2] }));

    let response = h
        .orchestrator
        .execute(ExecutionRequest::new("contacts", json!({})))
        .await
        .unwrap();
    assert_eq!(response.preamble.as_deref(), Some("Contacts: 2 items via cursor"));
}

#[tokio::test]
async fn unknown_action_is_not_found() {
    let h = harness();
    let err = h
        .orchestrator
        .execute(ExecutionRequest::new("ghost", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.code, "NOT_FOUND");
    assert!(h.transport.sent().is_empty());
}
