//! Hydra / JSON-LD normalizer (`application/ld+json`).
//!
//! Items carry `@context`, `@id` and `@type` at the top level; nested
//! embeddings repeat `@id`/`@type` but not `@context`. Collections wrap
//! members in `hydra:Collection` with a `hydra:view` partial-view block
//! that is omitted entirely when pagination is disabled for the
//! operation.

use serde_json::{json, Map, Value};

use crate::error::RenderError;
use crate::graph::{ItemGraph, Node, PageResult};
use crate::metadata::ResourceMetadata;
use crate::paginate::PageLinks;
use crate::plain;
use crate::render::RenderContext;

/// JSON-LD keywords the plain denormalizer must never see.
pub const LD_KEYWORDS: &[&str] = &["@context", "@id", "@type"];

/// Render one top-level item, `@context` included.
pub fn normalize_item(item: &ItemGraph, meta: &ResourceMetadata, ctx: &RenderContext) -> Value {
    let mut out = Map::new();
    out.insert("@context".into(), json!(context_iri(meta, ctx)));
    item_body(item, &mut out);
    Value::Object(out)
}

/// Render a collection page.
pub fn normalize_collection(
    page: &PageResult,
    links: Option<&PageLinks>,
    request_uri: &str,
    meta: &ResourceMetadata,
    ctx: &RenderContext,
) -> Value {
    let collection_id = if request_uri.is_empty() {
        ctx.iris.collection_iri(&meta.path)
    } else {
        // The collection identifies by its path, not the full query.
        request_uri
            .split_once('?')
            .map(|(path, _)| path.to_string())
            .unwrap_or_else(|| request_uri.to_string())
    };

    let mut out = Map::new();
    out.insert("@context".into(), json!(context_iri(meta, ctx)));
    out.insert("@id".into(), json!(collection_id));
    out.insert("@type".into(), json!("hydra:Collection"));
    if let Some(total) = page.total() {
        out.insert("hydra:totalItems".into(), json!(total));
    }
    out.insert(
        "hydra:member".into(),
        Value::Array(page.items.iter().map(member).collect()),
    );
    if let Some(links) = links {
        out.insert("hydra:view".into(), view(links));
    }
    Value::Object(out)
}

fn view(links: &PageLinks) -> Value {
    let mut out = Map::new();
    out.insert("@id".into(), json!(links.self_));
    out.insert("@type".into(), json!("hydra:PartialCollectionView"));
    if let Some(first) = &links.first {
        out.insert("hydra:first".into(), json!(first));
    }
    if let Some(last) = &links.last {
        out.insert("hydra:last".into(), json!(last));
    }
    if let Some(prev) = &links.prev {
        out.insert("hydra:previous".into(), json!(prev));
    }
    if let Some(next) = &links.next {
        out.insert("hydra:next".into(), json!(next));
    }
    Value::Object(out)
}

/// Nested member: `@id`/`@type` without `@context`.
fn member(item: &ItemGraph) -> Value {
    let mut out = Map::new();
    item_body(item, &mut out);
    Value::Object(out)
}

fn item_body(item: &ItemGraph, out: &mut Map<String, Value>) {
    if let Some(iri) = &item.iri {
        out.insert("@id".into(), json!(iri));
    }
    out.insert("@type".into(), json!(item.resource));
    for (name, node) in &item.values {
        out.insert(name.clone(), node_value(node));
    }
}

fn node_value(node: &Node) -> Value {
    match node {
        Node::Scalar(value) => value.clone(),
        Node::Item(child) => member(child),
        // Linked resources are bare IRIs in JSON-LD.
        Node::Reference(reference) => Value::String(reference.iri.clone()),
        Node::List(nodes) => Value::Array(nodes.iter().map(node_value).collect()),
        Node::Null => Value::Null,
    }
}

fn context_iri(meta: &ResourceMetadata, ctx: &RenderContext) -> String {
    ctx.iris
        .collection_iri(&format!("/contexts/{}", meta.short_name))
}

/// Strip JSON-LD keywords from a document, recursively.
///
/// The inverse normalizer peels the keywords and hands the remainder to
/// the plain denormalizer.
pub fn strip_keywords(doc: &Value) -> Value {
    match doc {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if !LD_KEYWORDS.contains(&key.as_str()) {
                    out.insert(key.clone(), strip_keywords(value));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_keywords).collect()),
        other => other.clone(),
    }
}

/// Parse a JSON-LD document into the intermediate tree.
pub fn denormalize(
    doc: &Value,
    meta: &ResourceMetadata,
    ctx: &RenderContext,
) -> Result<ItemGraph, RenderError> {
    plain::denormalize(&strip_keywords(doc), meta, ctx)
}
