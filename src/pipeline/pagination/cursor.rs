use super::{
    any_key_present, as_token, extract_items, has_more_flag, lookup_configured, total_items,
    PageRequest, PageResponse, PageState, PaginationInfo, PaginationStrategy, HAS_MORE_PATHS,
};
use crate::pipeline::types::{PaginationConfig, PaginationStrategyKind};
use crate::utils::json_path::CompiledPath;
use once_cell::sync::Lazy;

static NEXT_CURSOR_PATHS: Lazy<Vec<CompiledPath>> = Lazy::new(|| {
    [
        "$.next_cursor",
        "$.nextCursor",
        "$.next_page_token",
        "$.nextPageToken",
        "$.meta.next_cursor",
        "$.pagination.next_cursor",
        "$.response_metadata.next_cursor",
    ]
    .iter()
    .filter_map(|p| CompiledPath::parse(p).ok())
    .collect()
});

/// Opaque token carried from one response into the next request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorStrategy;

impl PaginationStrategy for CursorStrategy {
    fn kind(&self) -> PaginationStrategyKind {
        PaginationStrategyKind::Cursor
    }

    fn build_request_params(&self, config: &PaginationConfig, state: &PageState) -> PageRequest {
        let mut request = PageRequest::default();
        request
            .query
            .insert(config.limit_param.clone(), config.page_size.to_string());
        if let Some(cursor) = &state.cursor {
            request
                .query
                .insert(config.cursor_param.clone(), cursor.clone());
        }
        request
    }

    fn extract_pagination_info(
        &self,
        response: &PageResponse<'_>,
        config: &PaginationConfig,
        _state: &PageState,
    ) -> PaginationInfo {
        let next_cursor = lookup_configured(
            response.body,
            config.cursor_path.as_deref(),
            &NEXT_CURSOR_PATHS,
        )
        .and_then(|v| as_token(&v));
        let has_more = has_more_flag(response.body, config).unwrap_or(next_cursor.is_some())
            && next_cursor.is_some();
        PaginationInfo {
            items: extract_items(response.body, config),
            next_cursor,
            has_more,
            total_items: total_items(response.body, config),
            total_pages: None,
        }
    }

    fn detect_strategy(&self, response: &PageResponse<'_>) -> f64 {
        let has_token = super::first_present(response.body, &NEXT_CURSOR_PATHS)
            .and_then(|v| as_token(&v))
            .is_some();
        if has_token {
            return 0.9;
        }
        let cursor_key = any_key_present(response.body, &NEXT_CURSOR_PATHS);
        let has_more_key = any_key_present(response.body, &HAS_MORE_PATHS);
        match (cursor_key, has_more_key) {
            (true, true) => 0.5,
            (true, false) => 0.4,
            (false, true) => 0.3,
            (false, false) => 0.0,
        }
    }

    fn advance(&self, state: &mut PageState, info: &PaginationInfo, _config: &PaginationConfig) {
        state.page_index += 1;
        state.cursor = info.next_cursor.clone();
    }
}
