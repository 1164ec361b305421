//! Content negotiation and problem-detail rendering.
//!
//! Negotiation failures never surface as bare errors at the boundary:
//! [`problem_document`] renders any [`RenderError`] in the best format
//! the negotiator could still agree on, with the inner error message
//! preserved verbatim in the `detail` member.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::RenderError;
use crate::metadata::Operation;
use crate::types::Format;

/// Pick the response format for a request.
///
/// The Accept list is parsed with q-values (descending, listing order as
/// tie-break); `*/*` and `application/*` match the operation's first
/// configured format. A missing or empty header falls back the same way.
///
/// # Errors
///
/// `NotAcceptable` with the operation's supported MIME types when no
/// media range agrees.
pub fn negotiate(accept: Option<&str>, operation: &Operation) -> Result<Format, RenderError> {
    let header = accept.map(str::trim).unwrap_or("");
    if header.is_empty() {
        return first_supported(operation);
    }

    let mut ranges = parse_accept(header);
    // Stable by q descending keeps the client's listing order on ties.
    ranges.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (media_type, _q) in &ranges {
        match media_type.as_str() {
            "*/*" | "application/*" => return first_supported(operation),
            other => {
                if let Some(format) = Format::from_media_type(other) {
                    if operation.supports(format) {
                        debug!(media_type = other, "negotiated format");
                        return Ok(format);
                    }
                }
            }
        }
    }

    Err(RenderError::NotAcceptable {
        supported: supported_types(operation),
    })
}

/// Best format for rendering an error document when negotiation itself
/// may have failed: the negotiated format if any, else the operation's
/// first configured format, else plain JSON.
pub fn fallback_format(accept: Option<&str>, operation: &Operation) -> Format {
    negotiate(accept, operation)
        .ok()
        .or_else(|| operation.formats.first().copied())
        .unwrap_or(Format::Json)
}

fn first_supported(operation: &Operation) -> Result<Format, RenderError> {
    operation
        .formats
        .first()
        .copied()
        .ok_or_else(|| RenderError::NotAcceptable {
            supported: Vec::new(),
        })
}

fn supported_types(operation: &Operation) -> Vec<String> {
    operation
        .formats
        .iter()
        .map(|f| f.media_type().to_string())
        .collect()
}

fn parse_accept(header: &str) -> Vec<(String, f32)> {
    header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().split(';');
            let media_type = parts.next()?.trim();
            if media_type.is_empty() {
                return None;
            }
            let q = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .next()
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((media_type.to_string(), q))
        })
        .collect()
}

/// Render an error as a problem-detail document in the given format.
///
/// RFC 7807 members (`type`, `title`, `status`, `detail`) dressed per
/// format; the detail carries the error's own message verbatim.
pub fn problem_document(error: &RenderError, format: Format) -> Value {
    let status = error.status();
    let title = error.title();
    let detail = error.to_string();

    match format {
        Format::JsonLd => json!({
            "@context": "/contexts/Error",
            "@type": "hydra:Error",
            "hydra:title": title,
            "hydra:description": detail,
            "status": status,
        }),
        Format::JsonApi => json!({
            "errors": [{
                "status": status.to_string(),
                "title": title,
                "detail": detail,
            }]
        }),
        Format::Hal | Format::Json => json!({
            "type": "about:blank",
            "title": title,
            "status": status,
            "detail": detail,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Operation;

    fn operation(formats: &[Format]) -> Operation {
        Operation::get_collection("/books").formats(formats)
    }

    #[test]
    fn exact_match() {
        let op = operation(&[Format::JsonLd, Format::Hal]);
        let format = negotiate(Some("application/hal+json"), &op).unwrap();
        assert_eq!(format, Format::Hal);
    }

    #[test]
    fn missing_header_uses_first_configured() {
        let op = operation(&[Format::JsonApi, Format::Json]);
        assert_eq!(negotiate(None, &op).unwrap(), Format::JsonApi);
        assert_eq!(negotiate(Some(""), &op).unwrap(), Format::JsonApi);
    }

    #[test]
    fn wildcard_uses_first_configured() {
        let op = operation(&[Format::Hal, Format::Json]);
        assert_eq!(negotiate(Some("*/*"), &op).unwrap(), Format::Hal);
        assert_eq!(negotiate(Some("application/*"), &op).unwrap(), Format::Hal);
    }

    #[test]
    fn q_values_reorder_preferences() {
        let op = operation(&[Format::JsonLd, Format::Hal]);
        let format = negotiate(
            Some("application/ld+json;q=0.5, application/hal+json;q=0.9"),
            &op,
        )
        .unwrap();
        assert_eq!(format, Format::Hal);
    }

    #[test]
    fn equal_q_keeps_listing_order() {
        let op = operation(&[Format::JsonLd, Format::Hal]);
        let format = negotiate(
            Some("application/hal+json, application/ld+json"),
            &op,
        )
        .unwrap();
        assert_eq!(format, Format::Hal);
    }

    #[test]
    fn unsupported_type_skipped_for_supported_one() {
        let op = operation(&[Format::Json]);
        let format = negotiate(Some("text/html, application/json;q=0.1"), &op).unwrap();
        assert_eq!(format, Format::Json);
    }

    #[test]
    fn no_agreement_is_not_acceptable() {
        let op = operation(&[Format::JsonLd, Format::Hal]);
        match negotiate(Some("text/html"), &op) {
            Err(RenderError::NotAcceptable { supported }) => {
                assert_eq!(
                    supported,
                    vec!["application/ld+json", "application/hal+json"]
                );
            }
            other => panic!("expected NotAcceptable, got {:?}", other),
        }
    }

    #[test]
    fn format_configured_elsewhere_is_not_acceptable_here() {
        // JSON is a known format but not configured for this operation.
        let op = operation(&[Format::Hal]);
        assert!(matches!(
            negotiate(Some("application/json"), &op),
            Err(RenderError::NotAcceptable { .. })
        ));
    }

    #[test]
    fn fallback_prefers_negotiated_then_first() {
        let op = operation(&[Format::Hal, Format::Json]);
        assert_eq!(
            fallback_format(Some("application/json"), &op),
            Format::Json
        );
        assert_eq!(fallback_format(Some("text/html"), &op), Format::Hal);
    }

    #[test]
    fn problem_document_plain() {
        let error = RenderError::NotAcceptable {
            supported: vec!["application/hal+json".into()],
        };
        let doc = problem_document(&error, Format::Json);
        assert_eq!(doc["status"], 406);
        assert_eq!(doc["title"], "Not Acceptable");
        // Inner message preserved verbatim.
        assert!(doc["detail"]
            .as_str()
            .unwrap()
            .contains("application/hal+json"));
    }

    #[test]
    fn problem_document_jsonld_is_hydra_error() {
        let error = RenderError::InvalidFilterProperty {
            path: "author.unknown".into(),
        };
        let doc = problem_document(&error, Format::JsonLd);
        assert_eq!(doc["@type"], "hydra:Error");
        assert!(doc["hydra:description"]
            .as_str()
            .unwrap()
            .contains("author.unknown"));
    }

    #[test]
    fn problem_document_jsonapi_uses_errors_array() {
        let error = RenderError::UnknownResource {
            resource: "Ghost".into(),
        };
        let doc = problem_document(&error, Format::JsonApi);
        assert_eq!(doc["errors"][0]["status"], "404");
    }
}
