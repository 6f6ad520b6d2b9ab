use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub url: String,
    pub rels: Vec<String>,
    pub params: BTreeMap<String, String>,
}

impl LinkEntry {
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rels.iter().any(|r| r.eq_ignore_ascii_case(rel))
    }
}

/// Parses an RFC 5988 `Link` header. Commas inside `<...>` or quoted
/// parameter values do not split entries.
pub fn parse_link_header(header: &str) -> Vec<LinkEntry> {
    split_top_level(header)
        .into_iter()
        .filter_map(|part| parse_entry(&part))
        .collect()
}

pub fn find_rel<'a>(links: &'a [LinkEntry], rel: &str) -> Option<&'a LinkEntry> {
    links.iter().find(|link| link.has_rel(rel))
}

fn split_top_level(header: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_url = false;
    let mut in_quotes = false;
    for ch in header.chars() {
        match ch {
            '<' if !in_quotes => in_url = true,
            '>' if !in_quotes => in_url = false,
            '"' if !in_url => in_quotes = !in_quotes,
            ',' if !in_url && !in_quotes => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current);
    parts
}

fn parse_entry(raw: &str) -> Option<LinkEntry> {
    let raw = raw.trim();
    let start = raw.find('<')?;
    let end = start + raw[start..].find('>')?;
    let url = raw[start + 1..end].trim().to_string();
    if url.is_empty() {
        return None;
    }

    let mut params = BTreeMap::new();
    for param in raw[end + 1..].split(';') {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let (key, value) = match param.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim().trim_matches('"')),
            None => (param, ""),
        };
        params.insert(key.to_ascii_lowercase(), value.to_string());
    }
    let rels = params
        .get("rel")
        .map(|rel| rel.split_whitespace().map(|r| r.to_ascii_lowercase()).collect())
        .unwrap_or_default();
    Some(LinkEntry { url, rels, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_next_and_last() {
        let header = r#"<https://api.example.com/items?page=2>; rel="next", <https://api.example.com/items?page=5>; rel="last""#;
        let links = parse_link_header(header);
        assert_eq!(links.len(), 2);
        assert_eq!(
            find_rel(&links, "next").map(|l| l.url.as_str()),
            Some("https://api.example.com/items?page=2")
        );
        assert_eq!(
            find_rel(&links, "last").map(|l| l.url.as_str()),
            Some("https://api.example.com/items?page=5")
        );
    }

    #[test]
    fn commas_inside_urls_do_not_split() {
        let header = r#"<https://x.io/search?fields=a,b,c&page=3>; rel="next""#;
        let links = parse_link_header(header);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://x.io/search?fields=a,b,c&page=3");
    }

    #[test]
    fn supports_multiple_rels_and_quoted_commas() {
        let header = r#"<https://x.io/p/9>; rel="next last"; title="a, b""#;
        let links = parse_link_header(header);
        assert_eq!(links.len(), 1);
        assert!(links[0].has_rel("next"));
        assert!(links[0].has_rel("last"));
        assert_eq!(links[0].params.get("title").map(String::as_str), Some("a, b"));
    }

    #[test]
    fn ignores_garbage_entries() {
        assert!(parse_link_header("").is_empty());
        assert!(parse_link_header("rel=next, <>").is_empty());
    }
}
