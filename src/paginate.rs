//! Pagination: page-size clamping and prev/next/first/last link
//! computation.
//!
//! `next` is present iff at least one more item exists beyond the current
//! page: `page * size < total` for offset pagination with a known total,
//! the presence of a next cursor token otherwise. With an unknown total
//! and no cursor, a full page is treated as "maybe more" and `next` is
//! emitted.

use crate::graph::{PageResult, PageState};
use crate::metadata::PaginationConfig;

/// Links of a collection page. `self_` is always present; the rest
/// depend on position and on whether the total is known.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLinks {
    pub self_: String,
    pub first: Option<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub last: Option<String>,
}

/// Effective page size for a request.
///
/// Client input is honored only when the operation allows it, and then
/// clamped to the configured maximum. Otherwise the server default
/// applies unconditionally and client input is ignored.
pub fn effective_page_size(config: &PaginationConfig, client_value: Option<u64>) -> u64 {
    match client_value {
        Some(requested) if config.client_controlled => requested.min(config.max_page_size).max(1),
        _ => config.page_size,
    }
}

/// Compute the links for one page.
pub fn build_links(page: &PageResult, request_uri: &str) -> PageLinks {
    match &page.state {
        PageState::Offset { page: number, total } => {
            offset_links(*number, page.page_size, page.items.len() as u64, *total, request_uri)
        }
        PageState::Cursor { current, next } => PageLinks {
            self_: with_query_param(request_uri, "cursor", current),
            first: None,
            prev: None,
            next: next
                .as_deref()
                .map(|token| with_query_param(request_uri, "cursor", token)),
            last: None,
        },
    }
}

fn offset_links(
    number: u64,
    size: u64,
    item_count: u64,
    total: Option<u64>,
    request_uri: &str,
) -> PageLinks {
    let number = number.max(1);
    let page_uri = |n: u64| with_query_param(request_uri, "page", &n.to_string());

    let last_page = total.map(|t| {
        let size = size.max(1);
        if t == 0 {
            1
        } else {
            (t + size - 1) / size
        }
    });

    let has_next = match total {
        // Known total: next exists iff items remain past this page, even
        // when the requested page overshoots the end.
        Some(t) => number.saturating_mul(size) < t,
        // Unknown total: a full page may have more behind it.
        None => item_count == size && size > 0,
    };

    PageLinks {
        self_: page_uri(number),
        first: Some(page_uri(1)),
        prev: (number > 1).then(|| page_uri(number - 1)),
        next: has_next.then(|| page_uri(number + 1)),
        last: last_page.map(page_uri),
    }
}

/// Replace or append one query parameter, preserving the order of the
/// others. Deterministic plain-string editing; no URL crate involved.
pub fn with_query_param(uri: &str, name: &str, value: &str) -> String {
    let (path, query) = match uri.split_once('?') {
        Some((p, q)) => (p, q),
        None => (uri, ""),
    };

    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (p.to_string(), String::new()),
        })
        .collect();

    match params.iter_mut().find(|(k, _)| k == name) {
        Some((_, v)) => *v = value.to_string(),
        None => params.push((name.to_string(), value.to_string())),
    }

    let rebuilt: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("{}?{}", path, rebuilt.join("&"))
}
