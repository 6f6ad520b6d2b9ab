use crate::constants::{pagination, validation};
use crate::utils::coercion::CoercionType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayMode {
    #[default]
    All,
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionConfig {
    #[serde(rename = "type")]
    pub target: CoercionType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coercion: Option<CoercionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub omit_if_null: bool,
    pub omit_if_empty: bool,
    pub array_mode: ArrayMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub id: String,
    pub action_id: String,
    /// `None` marks an action-level default.
    #[serde(default)]
    pub connection_id: Option<String>,
    pub source_path: String,
    pub target_path: String,
    pub direction: Direction,
    #[serde(default)]
    pub transform_config: TransformConfig,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    Fail,
    #[default]
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingConfig {
    pub enabled: bool,
    pub preserve_unmapped: bool,
    pub failure_mode: FailureMode,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            preserve_unmapped: true,
            failure_mode: FailureMode::Passthrough,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Default,
    Connection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMapping {
    #[serde(flatten)]
    pub mapping: FieldMapping,
    pub source: MappingSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStrategyKind {
    Cursor,
    Offset,
    PageNumber,
    LinkHeader,
}

impl PaginationStrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaginationStrategyKind::Cursor => "cursor",
            PaginationStrategyKind::Offset => "offset",
            PaginationStrategyKind::PageNumber => "page_number",
            PaginationStrategyKind::LinkHeader => "link_header",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategySelection {
    #[default]
    Auto,
    Cursor,
    Offset,
    PageNumber,
    LinkHeader,
}

impl StrategySelection {
    pub fn explicit(self) -> Option<PaginationStrategyKind> {
        match self {
            StrategySelection::Auto => None,
            StrategySelection::Cursor => Some(PaginationStrategyKind::Cursor),
            StrategySelection::Offset => Some(PaginationStrategyKind::Offset),
            StrategySelection::PageNumber => Some(PaginationStrategyKind::PageNumber),
            StrategySelection::LinkHeader => Some(PaginationStrategyKind::LinkHeader),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationConfig {
    pub enabled: bool,
    pub strategy: StrategySelection,
    pub limit_param: String,
    pub cursor_param: String,
    pub offset_param: String,
    pub page_param: String,
    /// Location of the item array; auto-detected when absent.
    pub data_path: Option<String>,
    pub cursor_path: Option<String>,
    pub has_more_path: Option<String>,
    pub total_path: Option<String>,
    pub page_size: usize,
    pub max_pages: usize,
    pub max_items: usize,
    pub start_page: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: StrategySelection::Auto,
            limit_param: "limit".to_string(),
            cursor_param: "cursor".to_string(),
            offset_param: "offset".to_string(),
            page_param: "page".to_string(),
            data_path: None,
            cursor_path: None,
            has_more_path: None,
            total_path: None,
            page_size: pagination::PAGE_SIZE,
            max_pages: pagination::MAX_PAGES,
            max_items: pagination::MAX_ITEMS,
            start_page: pagination::START_PAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Strict,
    #[default]
    Warn,
    Lenient,
}

impl ValidationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Warn => "warn",
            ValidationMode::Lenient => "lenient",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFieldsMode {
    Strip,
    Error,
    #[default]
    Preserve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    pub enabled: bool,
    pub mode: ValidationMode,
    pub extra_fields: ExtraFieldsMode,
    pub coerce_types: bool,
    pub drift_detection: bool,
    pub timeout_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ValidationMode::Warn,
            extra_fields: ExtraFieldsMode::Preserve,
            coerce_types: false,
            drift_detection: false,
            timeout_ms: validation::TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLocation {
    Query,
    Body,
    /// Query for GET/DELETE/HEAD, body otherwise.
    #[default]
    Auto,
}

/// Stored description of an outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    pub id: String,
    /// Circuit key; actions against the same upstream share one circuit.
    pub integration_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    pub base_url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, Value>,
    #[serde(default)]
    pub input_location: InputLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_preamble: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ActionDefinition {
    pub fn sends_body(&self) -> bool {
        match self.input_location {
            InputLocation::Query => false,
            InputLocation::Body => true,
            InputLocation::Auto => !matches!(
                self.method.to_ascii_uppercase().as_str(),
                "GET" | "DELETE" | "HEAD" | "OPTIONS"
            ),
        }
    }
}
