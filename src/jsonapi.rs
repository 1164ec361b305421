//! JSON:API normalizer (`application/vnd.api+json`).
//!
//! Resource objects are `{"id", "type", "attributes", "relationships"}`.
//! Embedded relations become resource linkage plus a full resource
//! object in the top-level `included` array, de-duplicated by
//! (type, id); references contribute linkage only.

use serde_json::{json, Map, Value};

use crate::error::RenderError;
use crate::graph::{ItemGraph, Node, PageResult, Reference};
use crate::metadata::ResourceMetadata;
use crate::paginate::PageLinks;
use crate::plain;
use crate::render::RenderContext;

/// Render one item document.
pub fn normalize_item(item: &ItemGraph) -> Value {
    let mut included = Included::default();
    let data = resource_object(item, &mut included);

    let mut out = Map::new();
    out.insert("data".into(), data);
    if !included.objects.is_empty() {
        out.insert("included".into(), Value::Array(included.objects));
    }
    Value::Object(out)
}

/// Render a collection document.
pub fn normalize_collection(
    page: &PageResult,
    links: Option<&PageLinks>,
    request_uri: &str,
    meta: &ResourceMetadata,
    ctx: &RenderContext,
) -> Value {
    let self_uri = links.map(|l| l.self_.clone()).unwrap_or_else(|| {
        if request_uri.is_empty() {
            ctx.iris.collection_iri(&meta.path)
        } else {
            request_uri.to_string()
        }
    });

    let mut link_map = Map::new();
    link_map.insert("self".into(), json!(self_uri));
    if let Some(links) = links {
        if let Some(first) = &links.first {
            link_map.insert("first".into(), json!(first));
        }
        if let Some(last) = &links.last {
            link_map.insert("last".into(), json!(last));
        }
        if let Some(prev) = &links.prev {
            link_map.insert("prev".into(), json!(prev));
        }
        if let Some(next) = &links.next {
            link_map.insert("next".into(), json!(next));
        }
    }

    let mut meta_map = Map::new();
    if let Some(total) = page.total() {
        meta_map.insert("totalItems".into(), json!(total));
    }
    if links.is_some() {
        meta_map.insert("itemsPerPage".into(), json!(page.page_size));
    }

    let mut included = Included::default();
    let data: Vec<Value> = page
        .items
        .iter()
        .map(|item| resource_object(item, &mut included))
        .collect();

    let mut out = Map::new();
    out.insert("links".into(), Value::Object(link_map));
    if !meta_map.is_empty() {
        out.insert("meta".into(), Value::Object(meta_map));
    }
    out.insert("data".into(), Value::Array(data));
    if !included.objects.is_empty() {
        out.insert("included".into(), Value::Array(included.objects));
    }
    Value::Object(out)
}

/// Top-level `included` accumulator, de-duplicated by (type, id).
#[derive(Default)]
struct Included {
    objects: Vec<Value>,
    seen: std::collections::HashSet<(String, String)>,
}

impl Included {
    fn add(&mut self, item: &ItemGraph) {
        let key = (item.resource.clone(), identifier(item));
        if self.seen.insert(key) {
            // Recursion may append the child's own includes first; order
            // is stable either way since dedup is by key.
            let object = resource_object(item, self);
            self.objects.push(object);
        }
    }
}

fn identifier(item: &ItemGraph) -> String {
    item.iri.clone().unwrap_or_default()
}

fn resource_object(item: &ItemGraph, included: &mut Included) -> Value {
    let mut attributes = Map::new();
    let mut relationships = Map::new();

    for (name, node) in &item.values {
        match node {
            Node::Scalar(value) => {
                attributes.insert(name.clone(), value.clone());
            }
            Node::Null => {
                relationships.insert(name.clone(), json!({ "data": null }));
            }
            Node::Item(child) => {
                relationships.insert(name.clone(), json!({ "data": linkage_item(child) }));
                included.add(child);
            }
            Node::Reference(reference) => {
                relationships.insert(name.clone(), json!({ "data": linkage_ref(reference) }));
            }
            Node::List(nodes) => {
                let mut linkages = Vec::new();
                let mut scalars = Vec::new();
                for element in nodes {
                    match element {
                        Node::Item(child) => {
                            linkages.push(linkage_item(child));
                            included.add(child);
                        }
                        Node::Reference(reference) => linkages.push(linkage_ref(reference)),
                        // Scalar lists stay attributes.
                        Node::Scalar(value) => scalars.push(value.clone()),
                        Node::Null | Node::List(_) => {}
                    }
                }
                if !scalars.is_empty() {
                    attributes.insert(name.clone(), Value::Array(scalars));
                } else {
                    relationships.insert(name.clone(), json!({ "data": linkages }));
                }
            }
        }
    }

    let mut out = Map::new();
    out.insert("id".into(), json!(identifier(item)));
    out.insert("type".into(), json!(item.resource));
    out.insert("attributes".into(), Value::Object(attributes));
    if !relationships.is_empty() {
        out.insert("relationships".into(), Value::Object(relationships));
    }
    Value::Object(out)
}

fn linkage_item(item: &ItemGraph) -> Value {
    json!({ "type": item.resource, "id": identifier(item) })
}

fn linkage_ref(reference: &Reference) -> Value {
    json!({ "type": reference.resource, "id": reference.iri })
}

/// Flatten a JSON:API write document into plain attribute form:
/// `data.attributes` merged with `data.relationships.*.data.id` values.
pub fn flatten_document(doc: &Value) -> Result<Value, RenderError> {
    let data = doc.get("data").ok_or_else(|| RenderError::InvalidDocument {
        path: "/data".into(),
        message: "missing \"data\" member".into(),
    })?;

    let mut out = Map::new();
    if let Some(attributes) = data.get("attributes") {
        let map = attributes
            .as_object()
            .ok_or_else(|| RenderError::InvalidDocument {
                path: "/data/attributes".into(),
                message: format!(
                    "expected object, got {}",
                    crate::types::json_type_name(attributes)
                ),
            })?;
        for (key, value) in map {
            out.insert(key.clone(), value.clone());
        }
    }

    if let Some(relationships) = data.get("relationships") {
        let map = relationships
            .as_object()
            .ok_or_else(|| RenderError::InvalidDocument {
                path: "/data/relationships".into(),
                message: format!(
                    "expected object, got {}",
                    crate::types::json_type_name(relationships)
                ),
            })?;
        for (name, relationship) in map {
            let linkage =
                relationship
                    .get("data")
                    .ok_or_else(|| RenderError::InvalidDocument {
                        path: format!("/data/relationships/{}", name),
                        message: "missing \"data\" linkage".into(),
                    })?;
            out.insert(name.clone(), linkage_to_value(linkage, name)?);
        }
    }

    Ok(Value::Object(out))
}

fn linkage_to_value(linkage: &Value, name: &str) -> Result<Value, RenderError> {
    match linkage {
        Value::Null => Ok(Value::Null),
        Value::Object(map) => map.get("id").cloned().ok_or_else(|| {
            RenderError::InvalidDocument {
                path: format!("/data/relationships/{}/data", name),
                message: "resource linkage missing \"id\"".into(),
            }
        }),
        Value::Array(items) => {
            let mut ids = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                ids.push(linkage_to_value(item, &format!("{}/{}", name, i))?);
            }
            Ok(Value::Array(ids))
        }
        other => Err(RenderError::InvalidDocument {
            path: format!("/data/relationships/{}/data", name),
            message: format!(
                "expected linkage object, got {}",
                crate::types::json_type_name(other)
            ),
        }),
    }
}

/// Parse a JSON:API document into the intermediate tree.
pub fn denormalize(
    doc: &Value,
    meta: &ResourceMetadata,
    ctx: &RenderContext,
) -> Result<ItemGraph, RenderError> {
    plain::denormalize(&flatten_document(doc)?, meta, ctx)
}
