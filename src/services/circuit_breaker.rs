use crate::constants::circuit;
use crate::services::logger::Logger;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Clock advanced by hand; used to drive state transitions in tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitStatus {
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "half-open")]
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window_ms: u64,
    pub reset_timeout_ms: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: circuit::FAILURE_THRESHOLD,
            failure_window_ms: circuit::FAILURE_WINDOW_MS,
            reset_timeout_ms: circuit::RESET_TIMEOUT_MS,
            success_threshold: circuit::SUCCESS_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
struct CircuitState {
    status: CircuitStatus,
    failures: VecDeque<u64>,
    opened_at: Option<u64>,
    half_open_successes: u32,
    last_transition_at: u64,
}

impl CircuitState {
    fn new(now: u64) -> Self {
        Self {
            status: CircuitStatus::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            half_open_successes: 0,
            last_transition_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub circuit_id: String,
    pub state: CircuitStatus,
    pub failures_in_window: usize,
    pub half_open_successes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms_until_half_open: Option<u64>,
    pub last_transition_at: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Circuit '{circuit_id}' is open; retry in {retry_after_ms}ms")]
pub struct CircuitOpenError {
    pub circuit_id: String,
    pub retry_after_ms: u64,
}

#[derive(Debug, Error)]
pub enum CircuitCallError<E> {
    #[error(transparent)]
    Open(CircuitOpenError),
    #[error(transparent)]
    Inner(E),
}

/// Per-circuit closed/open/half-open state machine. States are created on
/// first use; the open -> half-open move happens lazily on the next gate check.
pub struct CircuitBreaker {
    logger: Logger,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    circuits: DashMap<String, CircuitState>,
}

impl CircuitBreaker {
    pub fn new(logger: Logger, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(logger, config, Arc::new(SystemClock))
    }

    pub fn with_clock(logger: Logger, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            logger: logger.child("circuit"),
            config,
            clock,
            circuits: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn prune(&self, state: &mut CircuitState, now: u64) {
        let horizon = now.saturating_sub(self.config.failure_window_ms);
        while state.failures.front().is_some_and(|at| *at < horizon) {
            state.failures.pop_front();
        }
    }

    fn transition(&self, circuit_id: &str, state: &mut CircuitState, to: CircuitStatus, now: u64) {
        let from = state.status;
        if from == to {
            return;
        }
        state.status = to;
        state.last_transition_at = now;
        match to {
            CircuitStatus::Open => {
                state.opened_at = Some(now);
                state.half_open_successes = 0;
            }
            CircuitStatus::HalfOpen => {
                state.half_open_successes = 0;
            }
            CircuitStatus::Closed => {
                state.opened_at = None;
                state.half_open_successes = 0;
                state.failures.clear();
            }
        }
        let meta = serde_json::json!({ "circuit_id": circuit_id, "from": from, "to": to });
        if to == CircuitStatus::Open {
            self.logger.warn("Circuit opened", Some(&meta));
        } else {
            self.logger.info("Circuit state changed", Some(&meta));
        }
    }

    fn remaining_ms(&self, state: &CircuitState, now: u64) -> u64 {
        state
            .opened_at
            .map(|at| (at + self.config.reset_timeout_ms).saturating_sub(now))
            .unwrap_or(0)
    }

    /// Returns whether a call may proceed. An open circuit whose reset
    /// timeout elapsed moves to half-open here.
    pub fn can_execute(&self, circuit_id: &str) -> bool {
        self.check(circuit_id).is_ok()
    }

    pub fn check(&self, circuit_id: &str) -> Result<(), CircuitOpenError> {
        let now = self.clock.now_ms();
        let mut entry = self
            .circuits
            .entry(circuit_id.to_string())
            .or_insert_with(|| CircuitState::new(now));
        let state = entry.value_mut();
        self.prune(state, now);
        if state.status == CircuitStatus::Open {
            let remaining = self.remaining_ms(state, now);
            if remaining > 0 {
                return Err(CircuitOpenError {
                    circuit_id: circuit_id.to_string(),
                    retry_after_ms: remaining,
                });
            }
            self.transition(circuit_id, state, CircuitStatus::HalfOpen, now);
        }
        Ok(())
    }

    pub fn record_success(&self, circuit_id: &str) {
        let now = self.clock.now_ms();
        let mut entry = self
            .circuits
            .entry(circuit_id.to_string())
            .or_insert_with(|| CircuitState::new(now));
        let state = entry.value_mut();
        self.prune(state, now);
        if state.status == CircuitStatus::HalfOpen {
            state.half_open_successes += 1;
            if state.half_open_successes >= self.config.success_threshold {
                self.transition(circuit_id, state, CircuitStatus::Closed, now);
            }
        }
    }

    pub fn record_failure(&self, circuit_id: &str) {
        let now = self.clock.now_ms();
        let mut entry = self
            .circuits
            .entry(circuit_id.to_string())
            .or_insert_with(|| CircuitState::new(now));
        let state = entry.value_mut();
        state.failures.push_back(now);
        self.prune(state, now);
        match state.status {
            CircuitStatus::HalfOpen => {
                self.transition(circuit_id, state, CircuitStatus::Open, now);
            }
            CircuitStatus::Closed => {
                if state.failures.len() as u32 >= self.config.failure_threshold {
                    self.transition(circuit_id, state, CircuitStatus::Open, now);
                }
            }
            CircuitStatus::Open => {}
        }
    }

    pub fn time_until_reset_ms(&self, circuit_id: &str) -> Option<u64> {
        let now = self.clock.now_ms();
        let entry = self.circuits.get(circuit_id)?;
        (entry.status == CircuitStatus::Open).then(|| self.remaining_ms(&entry, now))
    }

    pub fn state(&self, circuit_id: &str) -> CircuitStatus {
        self.circuits
            .get(circuit_id)
            .map(|entry| entry.status)
            .unwrap_or(CircuitStatus::Closed)
    }

    /// Gates `op` on the circuit and records its outcome.
    pub async fn execute<T, E, F, Fut>(&self, circuit_id: &str, op: F) -> Result<T, CircuitCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.check(circuit_id).map_err(CircuitCallError::Open)?;
        match op().await {
            Ok(value) => {
                self.record_success(circuit_id);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(circuit_id);
                Err(CircuitCallError::Inner(err))
            }
        }
    }

    pub fn snapshot(&self, circuit_id: &str) -> Option<CircuitSnapshot> {
        let now = self.clock.now_ms();
        let mut entry = self.circuits.get_mut(circuit_id)?;
        self.prune(entry.value_mut(), now);
        Some(self.to_snapshot(circuit_id, &entry, now))
    }

    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let now = self.clock.now_ms();
        let mut out: Vec<CircuitSnapshot> = self
            .circuits
            .iter_mut()
            .map(|mut entry| {
                self.prune(entry.value_mut(), now);
                self.to_snapshot(entry.key(), entry.value(), now)
            })
            .collect();
        out.sort_by(|a, b| a.circuit_id.cmp(&b.circuit_id));
        out
    }

    fn to_snapshot(&self, circuit_id: &str, state: &CircuitState, now: u64) -> CircuitSnapshot {
        CircuitSnapshot {
            circuit_id: circuit_id.to_string(),
            state: state.status,
            failures_in_window: state.failures.len(),
            half_open_successes: state.half_open_successes,
            opened_at: state.opened_at,
            ms_until_half_open: (state.status == CircuitStatus::Open)
                .then(|| self.remaining_ms(state, now)),
            last_transition_at: state.last_transition_at,
        }
    }

    pub fn reset(&self, circuit_id: &str) -> bool {
        let removed = self.circuits.remove(circuit_id).is_some();
        if removed {
            self.logger.info(
                "Circuit reset",
                Some(&serde_json::json!({ "circuit_id": circuit_id })),
            );
        }
        removed
    }
}
