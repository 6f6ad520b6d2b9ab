use super::{
    any_key_present, as_u64, extract_items, first_present, has_more_flag, total_items, PageRequest,
    PageResponse, PageState, PaginationInfo, PaginationStrategy,
};
use crate::pipeline::types::{PaginationConfig, PaginationStrategyKind};
use crate::utils::json_path::CompiledPath;
use once_cell::sync::Lazy;

static PAGE_PATHS: Lazy<Vec<CompiledPath>> = Lazy::new(|| {
    [
        "$.page",
        "$.current_page",
        "$.currentPage",
        "$.meta.page",
        "$.meta.current_page",
        "$.pagination.page",
    ]
    .iter()
    .filter_map(|p| CompiledPath::parse(p).ok())
    .collect()
});

static TOTAL_PAGES_PATHS: Lazy<Vec<CompiledPath>> = Lazy::new(|| {
    [
        "$.total_pages",
        "$.totalPages",
        "$.last_page",
        "$.meta.total_pages",
        "$.meta.last_page",
        "$.pagination.total_pages",
    ]
    .iter()
    .filter_map(|p| CompiledPath::parse(p).ok())
    .collect()
});

#[derive(Debug, Clone, Copy, Default)]
pub struct PageNumberStrategy;

impl PaginationStrategy for PageNumberStrategy {
    fn kind(&self) -> PaginationStrategyKind {
        PaginationStrategyKind::PageNumber
    }

    fn build_request_params(&self, config: &PaginationConfig, state: &PageState) -> PageRequest {
        let mut request = PageRequest::default();
        request
            .query
            .insert(config.page_param.clone(), state.page.to_string());
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
        let total_pages = first_present(response.body, &TOTAL_PAGES_PATHS).and_then(|v| as_u64(&v));
        let has_more = !items.is_empty()
            && match (has_more_flag(response.body, config), total_pages, total) {
                (Some(flag), _, _) => flag,
                (None, Some(pages), _) => state.page < pages,
                (None, None, Some(total)) => state.page.saturating_mul(config.page_size as u64) < total,
                (None, None, None) => items.len() >= config.page_size,
            };
        PaginationInfo {
            next_cursor: has_more.then(|| (state.page + 1).to_string()),
            items,
            has_more,
            total_items: total,
            total_pages,
        }
    }

    fn detect_strategy(&self, response: &PageResponse<'_>) -> f64 {
        if !any_key_present(response.body, &PAGE_PATHS) {
            return 0.0;
        }
        if any_key_present(response.body, &TOTAL_PAGES_PATHS) {
            0.85
        } else {
            0.5
        }
    }

    fn advance(&self, state: &mut PageState, _info: &PaginationInfo, _config: &PaginationConfig) {
        state.page_index += 1;
        state.page += 1;
    }
}
