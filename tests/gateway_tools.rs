mod common;

use common::ScriptedTransport;
use gateway::app::App;
use gateway::services::logger::Logger;
use gateway::services::settings::GatewaySettings;
use serde_json::{json, Value};
use std::sync::Arc;

async fn app() -> (App, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let app = App::with_transport(GatewaySettings::default(), Logger::new("test"), transport.clone())
        .await
        .unwrap();
    (app, transport)
}

async fn call(app: &App, tool: &str, args: Value) -> Value {
    let envelope = app.tool_executor.execute(tool, args).await.unwrap();
    assert_eq!(envelope["ok"], json!(true));
    envelope["result"].clone()
}

async fn register_contacts(app: &App) {
    call(
        app,
        "gateway",
        json!({
            "action": "action_upsert",
            "definition": {
                "id": "contacts",
                "integrationId": "crm",
                "baseUrl": "https://api.example.com",
                "path": "/contacts",
                "retry": false
            }
        }),
    )
    .await;
}

#[tokio::test]
async fn upsert_rejects_non_http_base_url() {
    let (app, _) = app().await;
    let err = app
        .tool_executor
        .execute(
            "gateway",
            json!({
                "action": "action_upsert",
                "definition": { "id": "x", "integrationId": "i", "baseUrl": "file:///etc/passwd" }
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, "INVALID_PARAMS");
}

#[tokio::test]
async fn new_mappings_apply_on_next_execute() {
    let (app, transport) = app().await;
    register_contacts(&app).await;
    call(
        &app,
        "mappings",
        json!({ "action": "config_update", "action_id": "contacts", "config": { "enabled": true } }),
    )
    .await;

    transport.push(200, json!({ "full_name": "Ada" }));
    let first = call(&app, "gateway", json!({ "action": "execute", "action_id": "contacts" })).await;
    assert_eq!(first["data"], json!({ "full_name": "Ada" }));

    call(
        &app,
        "mappings",
        json!({
            "action": "create",
            "mapping": {
                "actionId": "contacts",
                "sourcePath": "$.full_name",
                "targetPath": "$.name",
                "direction": "output"
            }
        }),
    )
    .await;

    transport.push(200, json!({ "full_name": "Ada" }));
    let second = call(&app, "gateway", json!({ "action": "execute", "action_id": "contacts" })).await;
    assert_eq!(second["success"], json!(true));
    assert_eq!(second["data"]["name"], json!("Ada"));
    assert_eq!(second["mapping"]["fieldsTransformed"], json!(1));
}

#[tokio::test]
async fn resolve_reports_connection_overrides() {
    let (app, _) = app().await;
    register_contacts(&app).await;
    for (connection, target) in [(None, "$.name"), (Some("acme"), "$.displayName")] {
        let mut mapping = json!({
            "actionId": "contacts",
            "sourcePath": "$.full_name",
            "targetPath": target,
            "direction": "output"
        });
        if let Some(conn) = connection {
            mapping["connectionId"] = json!(conn);
        }
        call(&app, "mappings", json!({ "action": "create", "mapping": mapping })).await;
    }

    let defaults = call(
        &app,
        "mappings",
        json!({ "action": "resolve", "action_id": "contacts" }),
    )
    .await;
    assert_eq!(defaults["count"], json!(1));
    assert_eq!(defaults["overrides"], json!(0));

    let tenant = call(
        &app,
        "mappings",
        json!({ "action": "resolve", "action_id": "contacts", "connection_id": "acme" }),
    )
    .await;
    assert_eq!(tenant["count"], json!(1));
    assert_eq!(tenant["overrides"], json!(1));
    assert_eq!(tenant["mappings"][0]["targetPath"], json!("$.displayName"));
    assert_eq!(tenant["mappings"][0]["source"], json!("connection"));

    let all = call(
        &app,
        "mappings",
        json!({ "action": "list", "action_id": "contacts", "all": true }),
    )
    .await;
    assert_eq!(all["count"], json!(2));
}

#[tokio::test]
async fn update_and_delete_mapping() {
    let (app, _) = app().await;
    register_contacts(&app).await;
    let created = call(
        &app,
        "mappings",
        json!({
            "action": "create",
            "mapping": {
                "actionId": "contacts",
                "sourcePath": "$.a",
                "targetPath": "$.b",
                "direction": "output"
            }
        }),
    )
    .await;
    let mapping_id = created["mapping"]["id"].as_str().unwrap().to_string();

    let updated = call(
        &app,
        "mappings",
        json!({ "action": "update", "mapping_id": mapping_id, "patch": { "targetPath": "$.c" } }),
    )
    .await;
    assert_eq!(updated["mapping"]["targetPath"], json!("$.c"));
    assert_eq!(updated["mapping"]["sourcePath"], json!("$.a"));

    call(&app, "mappings", json!({ "action": "delete", "mapping_id": mapping_id })).await;
    let err = app
        .tool_executor
        .execute("mappings", json!({ "action": "delete", "mapping_id": mapping_id }))
        .await
        .unwrap_err();
    assert_eq!(err.code, "NOT_FOUND");
}

#[tokio::test]
async fn create_requires_known_action() {
    let (app, _) = app().await;
    let err = app
        .tool_executor
        .execute(
            "mappings",
            json!({
                "action": "create",
                "mapping": {
                    "actionId": "ghost",
                    "sourcePath": "$.a",
                    "targetPath": "$.b",
                    "direction": "input"
                }
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, "NOT_FOUND");
}

#[tokio::test]
async fn preview_uses_inline_mappings_without_upstream_calls() {
    let (app, transport) = app().await;
    register_contacts(&app).await;
    let preview = call(
        &app,
        "mappings",
        json!({
            "action": "preview",
            "action_id": "contacts",
            "sample": { "users": [{ "age": "31" }, { "age": "42" }] },
            "config": { "preserveUnmapped": false },
            "mappings": [{
                "sourcePath": "$.users[*].age",
                "targetPath": "$.ages",
                "transformConfig": { "coercion": { "type": "number" } }
            }]
        }),
    )
    .await;
    assert_eq!(preview["applied"], json!(true));
    assert_eq!(preview["data"], json!({ "ages": [31, 42] }));
    assert_eq!(preview["mappingCount"], json!(1));
    assert_eq!(preview["direction"], json!("output"));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn config_update_merges_partial_fields() {
    let (app, _) = app().await;
    register_contacts(&app).await;
    call(
        &app,
        "mappings",
        json!({ "action": "config_update", "action_id": "contacts", "config": { "failureMode": "fail" } }),
    )
    .await;
    let current = call(
        &app,
        "mappings",
        json!({ "action": "config_update", "action_id": "contacts", "config": { "enabled": true } }),
    )
    .await;
    assert_eq!(current["config"]["enabled"], json!(true));
    assert_eq!(current["config"]["failureMode"], json!("fail"));
    assert_eq!(current["config"]["preserveUnmapped"], json!(true));
}

#[tokio::test]
async fn circuit_status_and_reset_round_trip() {
    let (app, transport) = app().await;
    register_contacts(&app).await;
    for _ in 0..5 {
        transport.push(500, json!({}));
        let out = call(&app, "gateway", json!({ "action": "execute", "action_id": "contacts" })).await;
        assert_eq!(out["success"], json!(false));
    }

    let status = call(&app, "gateway", json!({ "action": "circuit_status", "circuit_id": "crm" })).await;
    assert_eq!(status["circuit"]["state"], json!("open"));

    let reset = call(&app, "gateway", json!({ "action": "circuit_reset", "circuit_id": "crm" })).await;
    assert_eq!(reset["reset"], json!(true));
    let status = call(&app, "gateway", json!({ "action": "circuit_status" })).await;
    assert_eq!(status["count"], json!(0));
    assert_eq!(status["config"]["failureThreshold"], json!(5));

    transport.push(200, json!({ "ok": true }));
    let out = call(&app, "gateway", json!({ "action": "execute", "action_id": "contacts" })).await;
    assert_eq!(out["success"], json!(true));
}

#[tokio::test]
async fn unknown_action_names_are_suggested() {
    let (app, _) = app().await;
    let err = app
        .tool_executor
        .execute("gateway", json!({ "action": "circuit" }))
        .await
        .unwrap_err();
    assert_eq!(err.code, "INVALID_PARAMS");
    assert_eq!(err.details.unwrap()["known_actions"].as_array().unwrap().len(), 8);
    assert!(err.hint.unwrap().contains("circuit_status"));
}

#[tokio::test]
async fn deleting_an_action_clears_drift_history() {
    let (app, _) = app().await;
    register_contacts(&app).await;
    app.drift.record("contacts", &json!({ "id": 1 }), true);
    assert!(app.drift.status("contacts").is_some());

    call(&app, "gateway", json!({ "action": "action_delete", "action_id": "contacts" })).await;
    assert!(app.drift.status("contacts").is_none());
    let report = call(&app, "gateway", json!({ "action": "drift_report" })).await;
    assert_eq!(report["count"], json!(0));
}
