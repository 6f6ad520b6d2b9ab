#![allow(dead_code)]

use async_trait::async_trait;
use gateway::errors::ExecutionError;
use gateway::pipeline::mapping::MappingResolver;
use gateway::pipeline::types::ActionDefinition;
use gateway::pipeline::validation::DriftTracker;
use gateway::pipeline::Orchestrator;
use gateway::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, ManualClock};
use gateway::services::logger::Logger;
use gateway::services::settings::GatewaySettings;
use gateway::services::transport::{HttpTransport, OutboundRequest, RawResponse};
use gateway::stores::{MappingStore, MemoryMappingStore};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Transport that replays queued responses and records what it was sent.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RawResponse, ExecutionError>>>,
    sent: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn push(&self, status: u16, body: Value) {
        self.push_with_headers(status, body, &[]);
    }

    pub fn push_with_headers(&self, status: u16, body: Value, headers: &[(&str, &str)]) {
        let headers: BTreeMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        self.responses.lock().unwrap().push_back(Ok(RawResponse {
            status,
            headers,
            body,
            duration_ms: 1,
            truncated: false,
        }));
    }

    pub fn push_error(&self, err: ExecutionError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_urls(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, ExecutionError> {
        self.sent.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExecutionError::network("no scripted response left")))
    }
}

pub struct Harness {
    pub store: Arc<MemoryMappingStore>,
    pub resolver: Arc<MappingResolver>,
    pub breaker: Arc<CircuitBreaker>,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<ScriptedTransport>,
    pub drift: Arc<DriftTracker>,
    pub orchestrator: Orchestrator,
}

pub fn harness() -> Harness {
    harness_with(CircuitBreakerConfig::default())
}

pub fn harness_with(circuit: CircuitBreakerConfig) -> Harness {
    let logger = Logger::new("test");
    let store = Arc::new(MemoryMappingStore::new());
    let dyn_store: Arc<dyn MappingStore> = store.clone();
    let resolver = Arc::new(MappingResolver::new(logger.clone(), dyn_store.clone()));
    let clock = Arc::new(ManualClock::new(1_000_000));
    let breaker = Arc::new(CircuitBreaker::with_clock(logger.clone(), circuit, clock.clone()));
    let transport = Arc::new(ScriptedTransport::default());
    let drift = Arc::new(DriftTracker::new(logger.clone()));
    let orchestrator = Orchestrator::new(
        logger,
        dyn_store,
        resolver.clone(),
        breaker.clone(),
        transport.clone(),
        drift.clone(),
        GatewaySettings {
            circuit,
            ..GatewaySettings::default()
        },
    );
    Harness {
        store,
        resolver,
        breaker,
        clock,
        transport,
        drift,
        orchestrator,
    }
}

/// Action with instant retries so failure paths do not sleep.
pub fn action(id: &str, extra: Value) -> ActionDefinition {
    let mut raw = json!({
        "id": id,
        "integrationId": "crm",
        "baseUrl": "https://api.example.com",
        "path": "/contacts",
        "retry": { "base_delay_ms": 0, "max_delay_ms": 0, "jitter": 0 }
    });
    if let (Value::Object(base), Value::Object(more)) = (&mut raw, extra) {
        for (key, value) in more {
            base.insert(key, value);
        }
    }
    serde_json::from_value(raw).unwrap()
}
