mod cursor;
mod link_header;
mod offset;
mod page_number;

pub use cursor::CursorStrategy;
pub use link_header::LinkHeaderStrategy;
pub use offset::OffsetStrategy;
pub use page_number::PageNumberStrategy;

use crate::constants::pagination::MIN_DETECTION_CONFIDENCE;
use crate::pipeline::types::{PaginationConfig, PaginationStrategyKind};
use crate::utils::json_path::CompiledPath;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Position of the pagination loop between pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub page_index: usize,
    pub cursor: Option<String>,
    pub offset: u64,
    pub page: u64,
    pub next_url: Option<String>,
}

impl PageState {
    pub fn initial(config: &PaginationConfig) -> Self {
        Self {
            page_index: 0,
            cursor: None,
            offset: 0,
            page: config.start_page,
            next_url: None,
        }
    }
}

/// Parameters a strategy contributes to the next request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub query: BTreeMap<String, String>,
    /// Replaces the request URL verbatim, including its query string.
    pub url_override: Option<String>,
}

pub struct PageResponse<'a> {
    pub body: &'a Value,
    pub headers: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginationInfo {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub total_items: Option<u64>,
    pub total_pages: Option<u64>,
}

pub trait PaginationStrategy: Send + Sync {
    fn kind(&self) -> PaginationStrategyKind;

    fn build_request_params(&self, config: &PaginationConfig, state: &PageState) -> PageRequest;

    fn extract_pagination_info(
        &self,
        response: &PageResponse<'_>,
        config: &PaginationConfig,
        state: &PageState,
    ) -> PaginationInfo;

    /// Confidence in [0, 1] that `response` uses this scheme.
    fn detect_strategy(&self, response: &PageResponse<'_>) -> f64;

    /// Moves `state` past the page described by `info`.
    fn advance(&self, state: &mut PageState, info: &PaginationInfo, config: &PaginationConfig);
}

/// Detection order; earlier strategies win ties.
pub const DETECTION_ORDER: [PaginationStrategyKind; 4] = [
    PaginationStrategyKind::Cursor,
    PaginationStrategyKind::Offset,
    PaginationStrategyKind::PageNumber,
    PaginationStrategyKind::LinkHeader,
];

static CURSOR: CursorStrategy = CursorStrategy;
static OFFSET: OffsetStrategy = OffsetStrategy;
static PAGE_NUMBER: PageNumberStrategy = PageNumberStrategy;
static LINK_HEADER: LinkHeaderStrategy = LinkHeaderStrategy;

pub fn strategy_for(kind: PaginationStrategyKind) -> &'static dyn PaginationStrategy {
    match kind {
        PaginationStrategyKind::Cursor => &CURSOR,
        PaginationStrategyKind::Offset => &OFFSET,
        PaginationStrategyKind::PageNumber => &PAGE_NUMBER,
        PaginationStrategyKind::LinkHeader => &LINK_HEADER,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub strategy: PaginationStrategyKind,
    pub confidence: f64,
    pub scores: Vec<(PaginationStrategyKind, f64)>,
}

/// Scores every strategy against the first response. Returns `None` when
/// nothing looks paginated.
pub fn detect_strategy(response: &PageResponse<'_>) -> Option<Detection> {
    let scores: Vec<(PaginationStrategyKind, f64)> = DETECTION_ORDER
        .iter()
        .map(|kind| (*kind, strategy_for(*kind).detect_strategy(response)))
        .collect();
    let mut best: Option<(PaginationStrategyKind, f64)> = None;
    for (kind, score) in &scores {
        if best.map(|(_, top)| *score > top).unwrap_or(true) {
            best = Some((*kind, *score));
        }
    }
    let (strategy, confidence) = best?;
    (confidence >= MIN_DETECTION_CONFIDENCE).then(|| Detection {
        strategy,
        confidence,
        scores,
    })
}

fn compile_all(paths: &[&str]) -> Vec<CompiledPath> {
    paths
        .iter()
        .filter_map(|p| CompiledPath::parse(p).ok())
        .collect()
}

static ITEM_PATHS: Lazy<Vec<CompiledPath>> = Lazy::new(|| {
    compile_all(&["$.data", "$.items", "$.results", "$.records", "$.entries", "$.data.items"])
});
pub(crate) static HAS_MORE_PATHS: Lazy<Vec<CompiledPath>> = Lazy::new(|| {
    compile_all(&["$.has_more", "$.hasMore", "$.meta.has_more", "$.pagination.has_more"])
});
pub(crate) static TOTAL_PATHS: Lazy<Vec<CompiledPath>> = Lazy::new(|| {
    compile_all(&[
        "$.total",
        "$.total_count",
        "$.totalCount",
        "$.meta.total",
        "$.pagination.total",
    ])
});

/// First non-null value among `candidates`.
pub(crate) fn first_present(body: &Value, candidates: &[CompiledPath]) -> Option<Value> {
    candidates.iter().find_map(|path| {
        let lookup = path.get(body).ok()?;
        (lookup.found && !lookup.value.is_null()).then_some(lookup.value)
    })
}

pub(crate) fn any_key_present(body: &Value, candidates: &[CompiledPath]) -> bool {
    candidates
        .iter()
        .any(|path| path.get(body).map(|l| l.found).unwrap_or(false))
}

/// Reads `configured` when set, otherwise tries `fallbacks` in order.
pub(crate) fn lookup_configured(
    body: &Value,
    configured: Option<&str>,
    fallbacks: &[CompiledPath],
) -> Option<Value> {
    match configured {
        Some(raw) => {
            let lookup = CompiledPath::parse(raw).ok()?.get(body).ok()?;
            (lookup.found && !lookup.value.is_null()).then_some(lookup.value)
        }
        None => first_present(body, fallbacks),
    }
}

pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub(crate) fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn as_token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn has_more_flag(body: &Value, config: &PaginationConfig) -> Option<bool> {
    lookup_configured(body, config.has_more_path.as_deref(), &HAS_MORE_PATHS).and_then(|v| as_bool(&v))
}

pub(crate) fn total_items(body: &Value, config: &PaginationConfig) -> Option<u64> {
    lookup_configured(body, config.total_path.as_deref(), &TOTAL_PATHS).and_then(|v| as_u64(&v))
}

/// Item array of a page: the configured data path, else the body itself
/// when it is an array, else the first conventional array field.
pub fn extract_items(body: &Value, config: &PaginationConfig) -> Vec<Value> {
    if let Some(raw) = config.data_path.as_deref() {
        let Ok(path) = CompiledPath::parse(raw) else {
            return Vec::new();
        };
        return match path.get(body) {
            Ok(lookup) if lookup.found => match lookup.value {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            },
            _ => Vec::new(),
        };
    }
    if let Value::Array(items) = body {
        return items.clone();
    }
    ITEM_PATHS
        .iter()
        .find_map(|path| match path.get(body) {
            Ok(lookup) if lookup.value.is_array() => lookup.value.as_array().cloned(),
            _ => None,
        })
        .unwrap_or_default()
}

/// Path under which merged items are written back.
pub fn items_location(body: &Value, config: &PaginationConfig) -> Option<CompiledPath> {
    if let Some(raw) = config.data_path.as_deref() {
        return CompiledPath::parse(raw).ok();
    }
    if body.is_array() {
        return Some(CompiledPath::root());
    }
    ITEM_PATHS
        .iter()
        .find(|path| path.get(body).map(|l| l.value.is_array()).unwrap_or(false))
        .cloned()
}
