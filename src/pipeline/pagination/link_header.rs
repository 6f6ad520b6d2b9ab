use super::{extract_items, PageRequest, PageResponse, PageState, PaginationInfo, PaginationStrategy};
use crate::pipeline::types::{PaginationConfig, PaginationStrategyKind};
use crate::utils::link_header::{find_rel, parse_link_header};
use url::Url;

fn query_param(raw_url: &str, name: &str) -> Option<String> {
    Url::parse(raw_url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn total_count_header(response: &PageResponse<'_>) -> Option<u64> {
    ["x-total-count", "x-total"]
        .iter()
        .find_map(|name| response.headers.get(*name))
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}

/// RFC 5988 `Link` navigation; the `next` URL is followed verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkHeaderStrategy;

impl PaginationStrategy for LinkHeaderStrategy {
    fn kind(&self) -> PaginationStrategyKind {
        PaginationStrategyKind::LinkHeader
    }

    fn build_request_params(&self, config: &PaginationConfig, state: &PageState) -> PageRequest {
        match &state.next_url {
            Some(url) => PageRequest {
                query: Default::default(),
                url_override: Some(url.clone()),
            },
            None => {
                let mut request = PageRequest::default();
                request
                    .query
                    .insert(config.limit_param.clone(), config.page_size.to_string());
                request
            }
        }
    }

    fn extract_pagination_info(
        &self,
        response: &PageResponse<'_>,
        config: &PaginationConfig,
        _state: &PageState,
    ) -> PaginationInfo {
        let links = response
            .headers
            .get("link")
            .map(|raw| parse_link_header(raw))
            .unwrap_or_default();
        let next_cursor = find_rel(&links, "next").map(|link| link.url.clone());
        let total_pages = find_rel(&links, "last")
            .and_then(|link| query_param(&link.url, &config.page_param))
            .and_then(|page| page.parse::<u64>().ok());
        PaginationInfo {
            items: extract_items(response.body, config),
            has_more: next_cursor.is_some(),
            next_cursor,
            total_items: total_count_header(response),
            total_pages,
        }
    }

    fn detect_strategy(&self, response: &PageResponse<'_>) -> f64 {
        match response.headers.get("link") {
            Some(raw) if find_rel(&parse_link_header(raw), "next").is_some() => 1.0,
            Some(_) => 0.5,
            None => 0.05,
        }
    }

    fn advance(&self, state: &mut PageState, info: &PaginationInfo, _config: &PaginationConfig) {
        state.page_index += 1;
        state.next_url = info.next_cursor.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn reads_next_and_last_from_header() {
        let config = PaginationConfig::default();
        let state = PageState::initial(&config);
        let mut headers = BTreeMap::new();
        headers.insert(
            "link".to_string(),
            r#"<https://api.example.com/items?page=2>; rel="next", <https://api.example.com/items?page=5>; rel="last""#
                .to_string(),
        );
        headers.insert("x-total-count".to_string(), "47".to_string());
        let body = json!([{ "id": 1 }]);
        let info = LinkHeaderStrategy.extract_pagination_info(
            &PageResponse { body: &body, headers: &headers },
            &config,
            &state,
        );
        assert_eq!(
            info.next_cursor.as_deref(),
            Some("https://api.example.com/items?page=2")
        );
        assert_eq!(info.total_pages, Some(5));
        assert_eq!(info.total_items, Some(47));
        assert!(info.has_more);
    }

    #[test]
    fn next_request_uses_url_verbatim() {
        let config = PaginationConfig::default();
        let mut state = PageState::initial(&config);
        let info = PaginationInfo {
            next_cursor: Some("https://x.io/items?after=abc&per_page=50".to_string()),
            has_more: true,
            ..PaginationInfo::default()
        };
        LinkHeaderStrategy.advance(&mut state, &info, &config);
        let request = LinkHeaderStrategy.build_request_params(&config, &state);
        assert_eq!(
            request.url_override.as_deref(),
            Some("https://x.io/items?after=abc&per_page=50")
        );
        assert!(request.query.is_empty());
    }
}
