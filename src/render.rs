//! The engine facade: metadata lookup, embedding, sort/filter and
//! pagination for collections, then dispatch to the format normalizer.
//!
//! Render is a pure function of (metadata, data snapshot, query) to a
//! document. All data must be materialized before a render call; nothing
//! here performs I/O, and per-render state (visited set, identifier memo)
//! is confined to the call.

use serde_json::Value;
use tracing::debug;

use crate::embed;
use crate::error::RenderError;
use crate::graph::{ItemGraph, PageResult};
use crate::metadata::{MetadataRegistry, Operation, ResourceMetadata};
use crate::naming::{IriGenerator, NameConverter};
use crate::openapi::{self, SchemaView};
use crate::paginate::{self, PageLinks};
use crate::sort;
use crate::types::{Format, RenderOptions};
use crate::{hal, hydra, jsonapi, plain};

/// Collaborators and options for one render call.
pub struct RenderContext<'a> {
    pub registry: &'a MetadataRegistry,
    pub names: &'a dyn NameConverter,
    pub iris: &'a dyn IriGenerator,
    pub options: RenderOptions,
}

/// Collection request state: query parameters plus page position.
///
/// `items` handed to [`render_collection`] are the materialized candidate
/// set; the engine filters, sorts and slices the requested page unless a
/// cursor is supplied (cursor pages arrive pre-sliced, with the next
/// token already probed by the data layer).
#[derive(Debug, Clone, Default)]
pub struct CollectionQuery {
    /// Filter and `order[...]` parameters, request order.
    pub params: Vec<(String, String)>,
    /// 1-based page number. Zero is treated as one.
    pub page: u64,
    /// Client-requested page size, honored only when the operation
    /// allows client-controlled pagination.
    pub page_size: Option<u64>,
    /// Collection-wide total when the data layer knows it. Defaults to
    /// the post-filter item count.
    pub total: Option<u64>,
    /// Cursor pagination: (current token, next token from the probe).
    pub cursor: Option<(String, Option<String>)>,
    /// Request URI used to derive page links.
    pub request_uri: String,
}

/// Render a single item in the negotiated format.
pub fn render_item(
    instance: &Value,
    meta: &ResourceMetadata,
    operation: &Operation,
    format: Format,
    ctx: &RenderContext,
) -> Result<Value, RenderError> {
    require_format(operation, format)?;
    debug!(resource = %meta.short_name, format = format.media_type(), "rendering item");

    let item = embed::build_item(instance, meta, &operation.groups, ctx)?;
    Ok(match format {
        Format::JsonLd => hydra::normalize_item(&item, meta, ctx),
        Format::Hal => hal::normalize_item(&item),
        Format::JsonApi => jsonapi::normalize_item(&item),
        Format::Json => plain::normalize_item(&item),
    })
}

/// Render a collection page in the negotiated format.
pub fn render_collection(
    instances: &[Value],
    meta: &ResourceMetadata,
    operation: &Operation,
    format: Format,
    query: &CollectionQuery,
    ctx: &RenderContext,
) -> Result<Value, RenderError> {
    require_format(operation, format)?;
    debug!(
        resource = %meta.short_name,
        format = format.media_type(),
        candidates = instances.len(),
        "rendering collection"
    );

    // Translate declarative parameters, falling back to the operation's
    // default sort when the request orders nothing.
    let mut directives = sort::translate(&query.params, meta, ctx.registry)?;
    if directives.sorts.is_empty() {
        for (path, direction) in &operation.default_sort {
            let params = vec![(format!("order[{}]", path), direction_param(*direction))];
            let defaults = sort::translate(&params, meta, ctx.registry)?;
            directives.sorts.extend(defaults.sorts);
        }
    }
    let filtered = sort::apply(&directives, instances.to_vec(), meta)?;

    let (page, links) = paginate_items(filtered, operation, query, meta, ctx)?;

    Ok(match format {
        Format::JsonLd => {
            hydra::normalize_collection(&page, links.as_ref(), &query.request_uri, meta, ctx)
        }
        Format::Hal => {
            hal::normalize_collection(&page, links.as_ref(), &query.request_uri, meta, ctx)
        }
        Format::JsonApi => {
            jsonapi::normalize_collection(&page, links.as_ref(), &query.request_uri, meta, ctx)
        }
        Format::Json => plain::normalize_collection(&page),
    })
}

fn direction_param(direction: sort::Direction) -> String {
    match direction {
        sort::Direction::Asc => "asc".to_string(),
        sort::Direction::Desc => "desc".to_string(),
    }
}

fn paginate_items(
    filtered: Vec<Value>,
    operation: &Operation,
    query: &CollectionQuery,
    meta: &ResourceMetadata,
    ctx: &RenderContext,
) -> Result<(PageResult, Option<PageLinks>), RenderError> {
    let config = &operation.pagination;

    if !config.enabled {
        let items = embed::build_collection(&filtered, meta, &operation.groups, ctx)?;
        let total = items.len() as u64;
        let page = PageResult::offset(items, 1, total.max(1), Some(total));
        return Ok((page, None));
    }

    if let Some((current, next)) = &query.cursor {
        let size = paginate::effective_page_size(config, query.page_size);
        let items = embed::build_collection(&filtered, meta, &operation.groups, ctx)?;
        let page = PageResult::cursor(items, size, current.clone(), next.clone());
        let links = paginate::build_links(&page, &query.request_uri);
        return Ok((page, Some(links)));
    }

    let size = paginate::effective_page_size(config, query.page_size);
    let number = query.page.max(1);
    let total = query.total.unwrap_or(filtered.len() as u64);

    let start = usize::try_from((number - 1).saturating_mul(size)).unwrap_or(usize::MAX);
    let page_slice: Vec<Value> = filtered
        .into_iter()
        .skip(start)
        .take(size as usize)
        .collect();

    let items = embed::build_collection(&page_slice, meta, &operation.groups, ctx)?;
    let page = PageResult::offset(items, number, size, Some(total));
    let links = paginate::build_links(&page, &query.request_uri);
    Ok((page, Some(links)))
}

/// Parse an incoming write document into the intermediate tree.
///
/// The format must support writes and be configured for the operation.
/// The document is validated against the resource's write schema first;
/// the first validation failure is surfaced verbatim.
pub fn denormalize(
    doc: &Value,
    meta: &ResourceMetadata,
    operation: &Operation,
    format: Format,
    ctx: &RenderContext,
) -> Result<ItemGraph, RenderError> {
    if !format.supports_write() {
        return Err(RenderError::UnsupportedFormat {
            format: format.media_type().to_string(),
            operation: operation.name.clone(),
        });
    }
    require_format(operation, format)?;

    // Peel the envelope before schema validation: the schema describes
    // the attribute shape, not the format dressing.
    let attributes = match format {
        Format::Json => doc.clone(),
        Format::JsonLd => hydra::strip_keywords(doc),
        Format::JsonApi => jsonapi::flatten_document(doc)?,
        Format::Hal => unreachable!("write support checked above"),
    };

    let schema =
        openapi::standalone_schema(meta, &operation.groups, SchemaView::Write, ctx.registry);
    if let Err(errors) = openapi::validate_document(&attributes, &schema) {
        let first = &errors[0];
        return Err(RenderError::InvalidDocument {
            path: first.path.clone(),
            message: first.message.clone(),
        });
    }

    match format {
        Format::Json => plain::denormalize(doc, meta, ctx),
        Format::JsonLd => hydra::denormalize(doc, meta, ctx),
        Format::JsonApi => jsonapi::denormalize(doc, meta, ctx),
        Format::Hal => unreachable!("write support checked above"),
    }
}

fn require_format(operation: &Operation, format: Format) -> Result<(), RenderError> {
    if operation.supports(format) {
        Ok(())
    } else {
        Err(RenderError::UnsupportedFormat {
            format: format.media_type().to_string(),
            operation: operation.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PaginationConfig, PropertyDescriptor, ScalarType};
    use crate::naming::{IdentityNameConverter, PathIriGenerator};
    use serde_json::json;

    static IRIS: PathIriGenerator = PathIriGenerator { base: String::new() };

    fn registry() -> MetadataRegistry {
        let registry = MetadataRegistry::new();
        registry.insert(
            ResourceMetadata::new("Book", "/books")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::scalar("title", ScalarType::String))
                .operation(Operation::get_collection("/books").pagination(PaginationConfig {
                    enabled: true,
                    client_controlled: true,
                    page_size: 3,
                    max_page_size: 10,
                }))
                .operation(Operation::get_item("/books/{id}")),
        );
        registry
    }

    fn ctx(registry: &MetadataRegistry) -> RenderContext<'_> {
        RenderContext {
            registry,
            names: &IdentityNameConverter,
            iris: &IRIS,
            options: RenderOptions::default(),
        }
    }

    fn books(n: u64) -> Vec<Value> {
        (1..=n)
            .map(|i| json!({ "id": i, "title": format!("Book {}", i) }))
            .collect()
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let op = meta.operation_named("get_item").unwrap().clone();
        let op = op.formats(&[Format::Hal]);
        let ctx = ctx(&registry);

        let result = render_item(&json!({ "id": 1 }), &meta, &op, Format::JsonApi, &ctx);
        assert!(matches!(
            result,
            Err(RenderError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn collection_slices_requested_page() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let op = meta.operation_named("get_collection").unwrap();
        let ctx = ctx(&registry);

        let query = CollectionQuery {
            page: 2,
            request_uri: "/books".into(),
            ..Default::default()
        };
        let doc =
            render_collection(&books(5), &meta, op, Format::Json, &query, &ctx).unwrap();
        // Plain JSON collection is a bare array of the page members.
        let members = doc.as_array().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0]["id"], json!(4));
    }

    #[test]
    fn collection_applies_filters_before_paging() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let op = meta.operation_named("get_collection").unwrap();
        let ctx = ctx(&registry);

        let query = CollectionQuery {
            params: vec![("title".into(), "Book 2".into())],
            page: 1,
            request_uri: "/books".into(),
            ..Default::default()
        };
        let doc =
            render_collection(&books(5), &meta, op, Format::Json, &query, &ctx).unwrap();
        let members = doc.as_array().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0]["id"], json!(2));
    }

    #[test]
    fn denormalize_rejects_hal() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let op = meta.operation_named("get_item").unwrap();
        let ctx = ctx(&registry);

        let result = denormalize(&json!({}), &meta, op, Format::Hal, &ctx);
        assert!(matches!(
            result,
            Err(RenderError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn denormalize_surfaces_validation_message() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let op = meta.operation_named("get_item").unwrap();
        let ctx = ctx(&registry);

        let result = denormalize(
            &json!({ "id": 1, "title": 42 }),
            &meta,
            op,
            Format::Json,
            &ctx,
        );
        match result {
            Err(RenderError::InvalidDocument { path, message }) => {
                assert_eq!(path, "/title");
                assert!(!message.is_empty());
            }
            other => panic!("expected InvalidDocument, got {:?}", other),
        }
    }

    #[test]
    fn denormalize_accepts_valid_plain_document() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let op = meta.operation_named("get_item").unwrap();
        let ctx = ctx(&registry);

        let item = denormalize(
            &json!({ "id": 1, "title": "Dune" }),
            &meta,
            op,
            Format::Json,
            &ctx,
        )
        .unwrap();
        assert_eq!(item.resource, "Book");
        assert!(item.value("title").is_some());
    }
}
