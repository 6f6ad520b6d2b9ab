use super::{
    any_key_present, extract_items, has_more_flag, total_items, PageRequest, PageResponse,
    PageState, PaginationInfo, PaginationStrategy, TOTAL_PATHS,
};
use crate::pipeline::types::{PaginationConfig, PaginationStrategyKind};
use crate::utils::json_path::CompiledPath;
use once_cell::sync::Lazy;

static OFFSET_PATHS: Lazy<Vec<CompiledPath>> = Lazy::new(|| {
    ["$.offset", "$.meta.offset", "$.pagination.offset"]
        .iter()
        .filter_map(|p| CompiledPath::parse(p).ok())
        .collect()
});

static LIMIT_PATHS: Lazy<Vec<CompiledPath>> = Lazy::new(|| {
    ["$.limit", "$.meta.limit", "$.pagination.limit"]
        .iter()
        .filter_map(|p| CompiledPath::parse(p).ok())
        .collect()
});

#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetStrategy;

impl PaginationStrategy for OffsetStrategy {
    fn kind(&self) -> PaginationStrategyKind {
        PaginationStrategyKind::Offset
    }

    fn build_request_params(&self, config: &PaginationConfig, state: &PageState) -> PageRequest {
        let mut request = PageRequest::default();
        request
            .query
            .insert(config.offset_param.clone(), state.offset.to_string());
        request
            .query
            .insert(config.limit_param.clone(), config.page_size.to_string());
        request
    }

    fn extract_pagination_info(
        &self,
        response: &PageResponse<'_>,
        config: &PaginationConfig,
        state: &PageState,
    ) -> PaginationInfo {
        let items = extract_items(response.body, config);
        let total = total_items(response.body, config);
        let seen = state.offset + items.len() as u64;
        let has_more = !items.is_empty()
            && match (has_more_flag(response.body, config), total) {
                (Some(flag), _) => flag,
                (None, Some(total)) => seen < total,
                (None, None) => items.len() >= config.page_size,
            };
        PaginationInfo {
            next_cursor: has_more.then(|| (state.offset + config.page_size as u64).to_string()),
            items,
            has_more,
            total_items: total,
            total_pages: None,
        }
    }

    fn detect_strategy(&self, response: &PageResponse<'_>) -> f64 {
        if !any_key_present(response.body, &OFFSET_PATHS) {
            return 0.0;
        }
        if any_key_present(response.body, &TOTAL_PATHS) || any_key_present(response.body, &LIMIT_PATHS) {
            0.8
        } else {
            0.5
        }
    }

    fn advance(&self, state: &mut PageState, _info: &PaginationInfo, config: &PaginationConfig) {
        state.page_index += 1;
        state.offset += config.page_size as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn stops_when_total_reached() {
        let config = PaginationConfig {
            page_size: 2,
            ..PaginationConfig::default()
        };
        let headers = BTreeMap::new();
        let mut state = PageState::initial(&config);
        let body = json!({ "items": [1, 2], "offset": 0, "total": 3 });
        let info = OffsetStrategy.extract_pagination_info(
            &PageResponse { body: &body, headers: &headers },
            &config,
            &state,
        );
        assert!(info.has_more);
        OffsetStrategy.advance(&mut state, &info, &config);
        let next = OffsetStrategy.build_request_params(&config, &state);
        assert_eq!(next.query.get("offset").map(String::as_str), Some("2"));
        assert_eq!(next.query.get("limit").map(String::as_str), Some("2"));

        let body = json!({ "items": [3], "offset": 2, "total": 3 });
        let info = OffsetStrategy.extract_pagination_info(
            &PageResponse { body: &body, headers: &headers },
            &config,
            &state,
        );
        assert!(!info.has_more);
        assert_eq!(info.total_items, Some(3));
    }

    #[test]
    fn short_page_without_total_ends() {
        let config = PaginationConfig {
            page_size: 5,
            ..PaginationConfig::default()
        };
        let headers = BTreeMap::new();
        let state = PageState::initial(&config);
        let body = json!([1, 2]);
        let info = OffsetStrategy.extract_pagination_info(
            &PageResponse { body: &body, headers: &headers },
            &config,
            &state,
        );
        assert!(!info.has_more);
    }
}
