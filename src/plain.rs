//! Plain JSON normalizer: no envelope, no linked-data keys.
//!
//! The hard exclusion rule: `@id`, `@type` and `@context` never appear in
//! plain output at any nesting level. Collections are bare arrays.

use serde_json::{Map, Value};

use crate::error::RenderError;
use crate::graph::{ItemGraph, Node, PageResult, Reference};
use crate::metadata::{PropertyKind, ResourceMetadata};
use crate::render::RenderContext;

/// Render one item as a flat JSON object.
pub fn normalize_item(item: &ItemGraph) -> Value {
    let mut out = Map::new();
    for (name, node) in &item.values {
        out.insert(name.clone(), node_value(node));
    }
    Value::Object(out)
}

/// Render a collection page as a bare array.
pub fn normalize_collection(page: &PageResult) -> Value {
    Value::Array(page.items.iter().map(normalize_item).collect())
}

fn node_value(node: &Node) -> Value {
    match node {
        Node::Scalar(value) => value.clone(),
        Node::Item(item) => normalize_item(item),
        // References stay bare IRI strings; no keyed wrapper.
        Node::Reference(reference) => Value::String(reference.iri.clone()),
        Node::List(nodes) => Value::Array(nodes.iter().map(node_value).collect()),
        Node::Null => Value::Null,
    }
}

/// Parse a plain (envelope-free) document into the intermediate tree.
///
/// Also the shared tail of the JSON-LD and JSON:API denormalizers, which
/// peel their envelopes first. Only writable properties are accepted;
/// unknown members are rejected with their path.
pub fn denormalize(
    doc: &Value,
    meta: &ResourceMetadata,
    ctx: &RenderContext,
) -> Result<ItemGraph, RenderError> {
    denormalize_at(doc, meta, ctx, "")
}

fn denormalize_at(
    doc: &Value,
    meta: &ResourceMetadata,
    ctx: &RenderContext,
    path: &str,
) -> Result<ItemGraph, RenderError> {
    let object = doc.as_object().ok_or_else(|| RenderError::InvalidDocument {
        path: if path.is_empty() { "/".into() } else { path.into() },
        message: format!(
            "expected object, got {}",
            crate::types::json_type_name(doc)
        ),
    })?;

    let mut item = ItemGraph::new(&meta.short_name);

    for (wire_name, value) in object {
        let member_path = format!("{}/{}", path, wire_name);
        let property = meta
            .properties
            .iter()
            .find(|p| {
                p.serialized_name.as_deref() == Some(wire_name.as_str())
                    || ctx.names.to_internal(wire_name, &meta.short_name) == p.name
            })
            .ok_or_else(|| RenderError::InvalidDocument {
                path: member_path.clone(),
                message: format!("unknown property \"{}\"", wire_name),
            })?;

        if !property.writable {
            return Err(RenderError::InvalidDocument {
                path: member_path,
                message: format!("property \"{}\" is not writable", wire_name),
            });
        }

        let node = match &property.kind {
            PropertyKind::Scalar { .. } | PropertyKind::Enum { .. } => {
                Node::Scalar(value.clone())
            }
            PropertyKind::Relation { target } => {
                denormalize_relation(value, target, ctx, &member_path)?
            }
            PropertyKind::RelationList { target } => match value {
                Value::Array(elements) => {
                    let mut nodes = Vec::with_capacity(elements.len());
                    for (i, element) in elements.iter().enumerate() {
                        nodes.push(denormalize_relation(
                            element,
                            target,
                            ctx,
                            &format!("{}/{}", member_path, i),
                        )?);
                    }
                    Node::List(nodes)
                }
                other => {
                    return Err(RenderError::InvalidDocument {
                        path: member_path,
                        message: format!(
                            "expected array, got {}",
                            crate::types::json_type_name(other)
                        ),
                    })
                }
            },
        };
        item.push(wire_name.clone(), node);
    }

    Ok(item)
}

fn denormalize_relation(
    value: &Value,
    target: &str,
    ctx: &RenderContext,
    path: &str,
) -> Result<Node, RenderError> {
    match value {
        Value::Null => Ok(Node::Null),
        Value::String(iri) => Ok(Node::Reference(Reference::new(target, iri.clone()))),
        Value::Object(_) => {
            let target_meta =
                ctx.registry
                    .get(target)
                    .ok_or_else(|| RenderError::UnknownResource {
                        resource: target.to_string(),
                    })?;
            let nested = denormalize_at(value, &target_meta, ctx, path)?;
            Ok(Node::Item(Box::new(nested)))
        }
        other => Err(RenderError::InvalidDocument {
            path: path.to_string(),
            message: format!(
                "expected IRI or object, got {}",
                crate::types::json_type_name(other)
            ),
        }),
    }
}
