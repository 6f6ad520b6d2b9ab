use crate::constants::drift;
use crate::services::logger::Logger;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone, Copy)]
pub struct DriftConfig {
    pub window_size: usize,
    pub min_samples: usize,
    pub failure_ratio: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window_size: drift::WINDOW_SIZE,
            min_samples: drift::MIN_SAMPLES,
            failure_ratio: drift::FAILURE_RATIO,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftStatus {
    pub detected: bool,
    pub samples: usize,
    pub failures: usize,
    pub failure_ratio: f64,
    pub fingerprint: String,
    pub fingerprint_changed: bool,
    pub added_fields: Vec<String>,
    pub removed_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReportEntry {
    pub action_id: String,
    #[serde(flatten)]
    pub status: DriftStatus,
}

#[derive(Debug, Default)]
struct DriftWindow {
    outcomes: VecDeque<bool>,
    fingerprint: Option<String>,
    fields: BTreeSet<String>,
    last: DriftStatus,
}

/// Top-level shape signature of a response: sorted `key:type` pairs. For an
/// array the first element's shape is used.
pub fn shape_fields(data: &Value) -> BTreeSet<String> {
    let target = match data {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    match target {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{}:{}", key, type_tag(value)))
            .collect(),
        other => std::iter::once(format!("$:{}", type_tag(other))).collect(),
    }
}

fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn fingerprint(fields: &BTreeSet<String>) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Per-action rolling record of validation outcomes and response shapes.
pub struct DriftTracker {
    logger: Logger,
    config: DriftConfig,
    windows: DashMap<String, DriftWindow>,
}

impl DriftTracker {
    pub fn new(logger: Logger) -> Self {
        Self::with_config(logger, DriftConfig::default())
    }

    pub fn with_config(logger: Logger, config: DriftConfig) -> Self {
        Self {
            logger: logger.child("drift"),
            config,
            windows: DashMap::new(),
        }
    }

    pub fn record(&self, action_id: &str, data: &Value, valid: bool) -> DriftStatus {
        let fields = shape_fields(data);
        let print = fingerprint(&fields);

        let mut window = self.windows.entry(action_id.to_string()).or_default();
        window.outcomes.push_back(valid);
        while window.outcomes.len() > self.config.window_size {
            window.outcomes.pop_front();
        }

        let (changed, added, removed) = match &window.fingerprint {
            Some(previous) if *previous != print => (
                true,
                fields.difference(&window.fields).cloned().collect(),
                window.fields.difference(&fields).cloned().collect(),
            ),
            _ => (false, Vec::new(), Vec::new()),
        };
        window.fingerprint = Some(print.clone());
        window.fields = fields;

        let samples = window.outcomes.len();
        let failures = window.outcomes.iter().filter(|ok| !**ok).count();
        let failure_ratio = if samples == 0 {
            0.0
        } else {
            failures as f64 / samples as f64
        };
        let ratio_breached =
            samples >= self.config.min_samples && failure_ratio >= self.config.failure_ratio;

        let status = DriftStatus {
            detected: ratio_breached || changed,
            samples,
            failures,
            failure_ratio,
            fingerprint: print,
            fingerprint_changed: changed,
            added_fields: added,
            removed_fields: removed,
        };
        window.last = status.clone();
        drop(window);

        if status.detected {
            self.logger.warn(
                "Response drift detected",
                Some(&json!({
                    "action_id": action_id,
                    "failure_ratio": status.failure_ratio,
                    "fingerprint_changed": status.fingerprint_changed,
                    "added": status.added_fields,
                    "removed": status.removed_fields,
                })),
            );
        }
        status
    }

    pub fn status(&self, action_id: &str) -> Option<DriftStatus> {
        self.windows.get(action_id).map(|w| w.last.clone())
    }

    pub fn report(&self, action_id: Option<&str>) -> Vec<DriftReportEntry> {
        let mut entries: Vec<DriftReportEntry> = self
            .windows
            .iter()
            .filter(|entry| action_id.map(|id| id == entry.key()).unwrap_or(true))
            .map(|entry| DriftReportEntry {
                action_id: entry.key().clone(),
                status: entry.value().last.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.action_id.cmp(&b.action_id));
        entries
    }

    pub fn reset(&self, action_id: &str) -> bool {
        self.windows.remove(action_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> DriftTracker {
        DriftTracker::new(Logger::new("test"))
    }

    #[test]
    fn failure_ratio_needs_minimum_samples() {
        let tracker = tracker();
        let body = json!({ "id": 1 });
        for _ in 0..4 {
            assert!(!tracker.record("a", &body, false).detected);
        }
        let status = tracker.record("a", &body, false);
        assert!(status.detected);
        assert_eq!(status.samples, 5);
        assert_eq!(status.failure_ratio, 1.0);
    }

    #[test]
    fn window_slides_out_old_failures() {
        let tracker = tracker();
        let body = json!({ "id": 1 });
        for _ in 0..10 {
            tracker.record("a", &body, false);
        }
        let mut status = DriftStatus::default();
        for _ in 0..20 {
            status = tracker.record("a", &body, true);
        }
        assert_eq!(status.samples, 20);
        assert_eq!(status.failures, 0);
        assert!(!status.detected);
    }

    #[test]
    fn shape_change_reports_fields() {
        let tracker = tracker();
        tracker.record("a", &json!({ "id": 1, "name": "x" }), true);
        let status = tracker.record("a", &json!({ "id": "1", "email": "e" }), true);
        assert!(status.detected);
        assert!(status.fingerprint_changed);
        assert_eq!(status.added_fields, vec!["email:string", "id:string"]);
        assert_eq!(status.removed_fields, vec!["id:number", "name:string"]);

        let again = tracker.record("a", &json!({ "id": "2", "email": "f" }), true);
        assert!(!again.detected);
    }

    #[test]
    fn report_filters_by_action() {
        let tracker = tracker();
        tracker.record("b", &json!([]), true);
        tracker.record("a", &json!([{ "id": 1 }]), true);
        let all = tracker.report(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action_id, "a");
        assert_eq!(tracker.report(Some("b")).len(), 1);
        assert!(tracker.reset("a"));
        assert!(tracker.status("a").is_none());
    }
}
