//! HAL normalizer (`application/hal+json`).
//!
//! Items are `{"_links": {...}, ...attributes, "_embedded": {...}}`.
//! Relations contribute a link and an `_embedded` entry: embedded items
//! render fully, references render as a stub carrying only its self
//! link. A cycle-broken back-reference therefore shows up as that stub,
//! never as a second full embedding. HAL is read-only: there is no
//! denormalizer.

use serde_json::{json, Map, Value};

use crate::graph::{ItemGraph, Node, PageResult};
use crate::metadata::ResourceMetadata;
use crate::paginate::PageLinks;
use crate::render::RenderContext;

/// Render one item.
pub fn normalize_item(item: &ItemGraph) -> Value {
    let mut links = Map::new();
    let mut embedded = Map::new();
    let mut attributes = Map::new();

    if let Some(iri) = &item.iri {
        links.insert("self".into(), href(iri));
    }

    for (name, node) in &item.values {
        match node {
            Node::Scalar(value) => {
                attributes.insert(name.clone(), value.clone());
            }
            Node::Null => {
                attributes.insert(name.clone(), Value::Null);
            }
            Node::Item(child) => {
                if let Some(iri) = &child.iri {
                    links.insert(name.clone(), href(iri));
                }
                embedded.insert(name.clone(), normalize_item(child));
            }
            Node::Reference(reference) => {
                links.insert(name.clone(), href(&reference.iri));
                embedded.insert(name.clone(), reference_stub(&reference.iri));
            }
            Node::List(nodes) => {
                let mut rel_links = Vec::new();
                let mut rel_embedded = Vec::new();
                for element in nodes {
                    match element {
                        Node::Item(child) => {
                            if let Some(iri) = &child.iri {
                                rel_links.push(href(iri));
                            }
                            rel_embedded.push(normalize_item(child));
                        }
                        Node::Reference(reference) => {
                            rel_links.push(href(&reference.iri));
                            rel_embedded.push(reference_stub(&reference.iri));
                        }
                        Node::Scalar(value) => rel_embedded.push(value.clone()),
                        Node::Null => rel_embedded.push(Value::Null),
                        Node::List(_) => {}
                    }
                }
                if !rel_links.is_empty() {
                    links.insert(name.clone(), Value::Array(rel_links));
                }
                embedded.insert(name.clone(), Value::Array(rel_embedded));
            }
        }
    }

    let mut out = Map::new();
    out.insert("_links".into(), Value::Object(links));
    for (name, value) in attributes {
        out.insert(name, value);
    }
    if !embedded.is_empty() {
        out.insert("_embedded".into(), Value::Object(embedded));
    }
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
    let self_uri = links
        .map(|l| l.self_.clone())
        .unwrap_or_else(|| collection_self(request_uri, meta, ctx));

    let mut link_map = Map::new();
    link_map.insert("self".into(), href(&self_uri));
    if let Some(links) = links {
        if let Some(first) = &links.first {
            link_map.insert("first".into(), href(first));
        }
        if let Some(last) = &links.last {
            link_map.insert("last".into(), href(last));
        }
        if let Some(prev) = &links.prev {
            link_map.insert("prev".into(), href(prev));
        }
        if let Some(next) = &links.next {
            link_map.insert("next".into(), href(next));
        }
    }
    let item_links: Vec<Value> = page
        .items
        .iter()
        .filter_map(|item| item.iri.as_deref().map(href))
        .collect();
    link_map.insert("item".into(), Value::Array(item_links));

    let mut out = Map::new();
    out.insert("_links".into(), Value::Object(link_map));
    if let Some(total) = page.total() {
        out.insert("totalItems".into(), json!(total));
    }
    if links.is_some() {
        out.insert("itemsPerPage".into(), json!(page.page_size));
    }
    out.insert(
        "_embedded".into(),
        json!({ "item": page.items.iter().map(normalize_item).collect::<Vec<_>>() }),
    );
    Value::Object(out)
}

fn collection_self(request_uri: &str, meta: &ResourceMetadata, ctx: &RenderContext) -> String {
    if request_uri.is_empty() {
        ctx.iris.collection_iri(&meta.path)
    } else {
        request_uri.to_string()
    }
}

fn href(iri: &str) -> Value {
    json!({ "href": iri })
}

fn reference_stub(iri: &str) -> Value {
    json!({ "_links": { "self": { "href": iri } } })
}
