//! Relation embedding: building the intermediate tree from instance data
//! and metadata, with cycle detection.
//!
//! The visited set is an explicit `HashSet` of `(resource, identifier)`
//! keys threaded through the recursion. An instance already in the set is
//! rendered as a [`Node::Reference`] instead of recursing, which
//! guarantees termination on circular graphs. Under
//! `SiblingReuse::EmbedPerPath` the entry is removed when the recursion
//! returns, so the same instance reached through a different, non-cyclic
//! path embeds again; under `EmbedOnce` it stays for the whole render.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::RenderError;
use crate::graph::{ItemGraph, Node, Reference};
use crate::identifier::{should_generate_id, IdCache};
use crate::metadata::{PropertyDescriptor, PropertyKind, ResourceMetadata};
use crate::render::RenderContext;
use crate::types::{NullRelationPolicy, SiblingReuse};

/// Per-render embedding state: the identifier memo shared by every item
/// in the render call. Never reused across renders.
#[derive(Debug, Default)]
pub struct EmbedState {
    pub ids: IdCache,
}

impl EmbedState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Build the intermediate tree for one top-level instance.
///
/// The visited set is created here and dies with the call.
pub fn build_item(
    instance: &Value,
    meta: &ResourceMetadata,
    groups: &[String],
    ctx: &RenderContext,
) -> Result<ItemGraph, RenderError> {
    let mut state = EmbedState::new();
    let mut visited = HashSet::new();
    build(
        instance,
        meta,
        groups,
        ctx,
        &mut state,
        &mut visited,
        0,
        ctx.options.generate_ids,
    )
}

/// Build the trees for a collection page.
///
/// Each member is a top-level render: members get their own visited set,
/// while the identifier memo is shared so references agree across the
/// whole document.
pub fn build_collection(
    instances: &[Value],
    meta: &ResourceMetadata,
    groups: &[String],
    ctx: &RenderContext,
) -> Result<Vec<ItemGraph>, RenderError> {
    let mut state = EmbedState::new();
    let mut items = Vec::with_capacity(instances.len());
    for instance in instances {
        let mut visited = HashSet::new();
        items.push(build(
            instance,
            meta,
            groups,
            ctx,
            &mut state,
            &mut visited,
            0,
            ctx.options.generate_ids,
        )?);
    }
    Ok(items)
}

#[allow(clippy::too_many_arguments)]
fn build(
    instance: &Value,
    meta: &ResourceMetadata,
    groups: &[String],
    ctx: &RenderContext,
    state: &mut EmbedState,
    visited: &mut HashSet<String>,
    depth: usize,
    generate_id: bool,
) -> Result<ItemGraph, RenderError> {
    if let Some(limit) = ctx.options.max_depth {
        if depth > limit {
            return Err(RenderError::DepthExceeded { limit });
        }
    }
    trace!(resource = %meta.short_name, depth, "embedding instance");

    let key = instance_key(instance, meta, state)?;
    visited.insert(key.clone());

    let mut item = ItemGraph::new(&meta.short_name);
    if generate_id {
        item.iri = Some(reference_for(instance, meta, state, ctx)?);
    }

    for property in meta.readable_properties() {
        if !property.in_groups(groups) {
            continue;
        }
        let wire_name = wire_name(property, meta, ctx);

        match &property.kind {
            PropertyKind::Scalar { .. } | PropertyKind::Enum { .. } => {
                if let Some(value) = instance.get(&property.name) {
                    item.push(wire_name, Node::Scalar(value.clone()));
                }
            }
            PropertyKind::Relation { target } => {
                match instance.get(&property.name) {
                    None => {}
                    Some(Value::Null) => match ctx.options.null_relations {
                        NullRelationPolicy::Omit => {}
                        NullRelationPolicy::IncludeNull => item.push(wire_name, Node::Null),
                    },
                    Some(value) => {
                        let node = embed_related(
                            value, target, property, groups, ctx, state, visited, depth,
                        )?;
                        item.push(wire_name, node);
                    }
                }
            }
            PropertyKind::RelationList { target } => {
                match instance.get(&property.name) {
                    None | Some(Value::Null) => {}
                    Some(Value::Array(elements)) => {
                        let mut nodes = Vec::with_capacity(elements.len());
                        for element in elements {
                            nodes.push(embed_related(
                                element, target, property, groups, ctx, state, visited, depth,
                            )?);
                        }
                        item.push(wire_name, Node::List(nodes));
                    }
                    // A to-many value that is not an array: pass through
                    // as a single reference/embedding.
                    Some(value) => {
                        let node = embed_related(
                            value, target, property, groups, ctx, state, visited, depth,
                        )?;
                        item.push(wire_name, Node::List(vec![node]));
                    }
                }
            }
        }
    }

    if ctx.options.sibling_reuse == SiblingReuse::EmbedPerPath {
        visited.remove(&key);
    }

    Ok(item)
}

#[allow(clippy::too_many_arguments)]
fn embed_related(
    value: &Value,
    target: &str,
    property: &PropertyDescriptor,
    groups: &[String],
    ctx: &RenderContext,
    state: &mut EmbedState,
    visited: &mut HashSet<String>,
    depth: usize,
) -> Result<Node, RenderError> {
    match value {
        Value::Object(_) => {
            let target_meta =
                ctx.registry
                    .get(target)
                    .ok_or_else(|| RenderError::UnknownResource {
                        resource: target.to_string(),
                    })?;
            let key = instance_key(value, &target_meta, state)?;
            if visited.contains(&key) {
                // Already on the current path (or, under EmbedOnce, seen
                // anywhere in this render): link instead of recursing.
                debug!(resource = %target, "breaking reference cycle");
                let iri = reference_for(value, &target_meta, state, ctx)?;
                return Ok(Node::Reference(Reference::new(target, iri)));
            }
            let child = build(
                value,
                &target_meta,
                groups,
                ctx,
                state,
                visited,
                depth + 1,
                should_generate_id(property, ctx.options.generate_ids),
            )?;
            Ok(Node::Item(Box::new(child)))
        }
        // Scalar relation values are references the data layer resolved
        // already: IRIs pass through, bare identifiers get a path.
        Value::String(s) if s.starts_with('/') || s.starts_with("http") => {
            Ok(Node::Reference(Reference::new(target, s.clone())))
        }
        Value::String(_) | Value::Number(_) => {
            let target_meta =
                ctx.registry
                    .get(target)
                    .ok_or_else(|| RenderError::UnknownResource {
                        resource: target.to_string(),
                    })?;
            let id = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(Node::Reference(Reference::new(
                target,
                ctx.iris.item_iri(&target_meta.path, &id),
            )))
        }
        other => Err(RenderError::InvalidDocument {
            path: format!("/{}", property.name),
            message: format!(
                "expected object or reference, got {}",
                crate::types::json_type_name(other)
            ),
        }),
    }
}

/// External reference for an instance: the resolved identifier turned
/// into an IRI, or a skolem reference when the resource declares no
/// identifiers.
fn reference_for(
    instance: &Value,
    meta: &ResourceMetadata,
    state: &mut EmbedState,
    ctx: &RenderContext,
) -> Result<String, RenderError> {
    if meta.identifiers.is_empty() {
        Ok(state.ids.skolem(&meta.short_name, instance))
    } else {
        let id = state.ids.resolve(instance, meta)?;
        Ok(ctx.iris.item_iri(&meta.path, &id))
    }
}

fn instance_key(
    instance: &Value,
    meta: &ResourceMetadata,
    state: &mut EmbedState,
) -> Result<String, RenderError> {
    let id = if meta.identifiers.is_empty() {
        state.ids.skolem(&meta.short_name, instance)
    } else {
        state.ids.resolve(instance, meta)?
    };
    Ok(format!("{}\u{1f}{}", meta.short_name, id))
}

fn wire_name(
    property: &PropertyDescriptor,
    meta: &ResourceMetadata,
    ctx: &RenderContext,
) -> String {
    property
        .serialized_name
        .clone()
        .unwrap_or_else(|| ctx.names.to_wire(&property.name, &meta.short_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataRegistry, Operation, PropertyDescriptor, ScalarType};
    use crate::naming::{IdentityNameConverter, PathIriGenerator};
    use crate::types::RenderOptions;
    use serde_json::json;

    fn registry() -> MetadataRegistry {
        let registry = MetadataRegistry::new();
        registry.insert(
            ResourceMetadata::new("ResourceA", "/resource_as")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::relation("b", "ResourceB").nullable(true))
                .operation(Operation::get_item("/resource_as/{id}")),
        );
        registry.insert(
            ResourceMetadata::new("ResourceB", "/resource_bs")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::relation("a", "ResourceA").nullable(true)),
        );
        registry
    }

    fn ctx_with<'a>(
        registry: &'a MetadataRegistry,
        options: RenderOptions,
    ) -> RenderContext<'a> {
        RenderContext {
            registry,
            names: &IdentityNameConverter,
            iris: &NULL_BASE,
            options,
        }
    }

    static NULL_BASE: PathIriGenerator = PathIriGenerator { base: String::new() };

    #[test]
    fn cycle_breaks_into_reference() {
        let registry = registry();
        let ctx = ctx_with(&registry, RenderOptions::default());
        let meta = registry.get("ResourceA").unwrap();

        // A -> B -> A, circular.
        let instance = json!({
            "id": 1,
            "b": { "id": 2, "a": { "id": 1, "b": null } }
        });

        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        assert_eq!(item.iri.as_deref(), Some("/resource_as/1"));

        let b = match item.value("b").unwrap() {
            Node::Item(b) => b,
            other => panic!("expected embedded b, got {:?}", other),
        };
        assert_eq!(b.iri.as_deref(), Some("/resource_bs/2"));

        // B's back-reference to A is a reference, not a second embedding.
        // (The inner A object differs from the outer one - its `b` is
        // null - but it resolves to the same identifier, so the cycle
        // check fires.)
        match b.value("a").unwrap() {
            Node::Reference(reference) => assert_eq!(reference.iri, "/resource_as/1"),
            other => panic!("expected reference back to a, got {:?}", other),
        }
    }

    #[test]
    fn terminates_on_distinct_nested_instances() {
        let registry = registry();
        let ctx = ctx_with(&registry, RenderOptions::default());
        let meta = registry.get("ResourceA").unwrap();

        let instance = json!({
            "id": 1,
            "b": { "id": 2, "a": { "id": 3 } }
        });

        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        let b = match item.value("b").unwrap() {
            Node::Item(b) => b,
            other => panic!("unexpected {:?}", other),
        };
        // id 3 is a different A: fully embedded, not a reference.
        assert!(matches!(b.value("a").unwrap(), Node::Item(_)));
    }

    fn sibling_fixture() -> (MetadataRegistry, Value) {
        let registry = MetadataRegistry::new();
        registry.insert(
            ResourceMetadata::new("Order", "/orders")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::relation("billing", "Address"))
                .property(PropertyDescriptor::relation("shipping", "Address")),
        );
        registry.insert(
            ResourceMetadata::new("Address", "/addresses")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::scalar("city", ScalarType::String)),
        );
        let instance = json!({
            "id": 1,
            "billing": { "id": 9, "city": "Lyon" },
            "shipping": { "id": 9, "city": "Lyon" }
        });
        (registry, instance)
    }

    #[test]
    fn sibling_reuse_embed_per_path() {
        let (registry, instance) = sibling_fixture();
        let ctx = ctx_with(&registry, RenderOptions::default());
        let meta = registry.get("Order").unwrap();

        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        // Same address through two sibling paths: embedded both times.
        assert!(matches!(item.value("billing").unwrap(), Node::Item(_)));
        assert!(matches!(item.value("shipping").unwrap(), Node::Item(_)));
    }

    #[test]
    fn sibling_reuse_embed_once() {
        let (registry, instance) = sibling_fixture();
        let ctx = ctx_with(
            &registry,
            RenderOptions::default().sibling_reuse(SiblingReuse::EmbedOnce),
        );
        let meta = registry.get("Order").unwrap();

        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        assert!(matches!(item.value("billing").unwrap(), Node::Item(_)));
        match item.value("shipping").unwrap() {
            Node::Reference(reference) => assert_eq!(reference.iri, "/addresses/9"),
            other => panic!("expected reference, got {:?}", other),
        }
    }

    #[test]
    fn null_relation_policies() {
        let registry = registry();
        let meta = registry.get("ResourceA").unwrap();
        let instance = json!({ "id": 1, "b": null });

        let ctx = ctx_with(&registry, RenderOptions::default());
        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        assert!(item.value("b").is_none());

        let ctx = ctx_with(
            &registry,
            RenderOptions::default().null_relations(NullRelationPolicy::IncludeNull),
        );
        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        assert_eq!(item.value("b"), Some(&Node::Null));
    }

    #[test]
    fn scalar_reference_values_pass_through() {
        let registry = registry();
        let ctx = ctx_with(&registry, RenderOptions::default());
        let meta = registry.get("ResourceA").unwrap();

        // IRI string kept verbatim.
        let item =
            build_item(&json!({ "id": 1, "b": "/resource_bs/7" }), &meta, &[], &ctx).unwrap();
        assert_eq!(
            item.value("b"),
            Some(&Node::Reference(Reference::new("ResourceB", "/resource_bs/7")))
        );

        // Bare identifier turned into a path.
        let item = build_item(&json!({ "id": 1, "b": 7 }), &meta, &[], &ctx).unwrap();
        assert_eq!(
            item.value("b"),
            Some(&Node::Reference(Reference::new("ResourceB", "/resource_bs/7")))
        );
    }

    #[test]
    fn depth_guard() {
        let registry = registry();
        let ctx = ctx_with(&registry, RenderOptions::default().max_depth(Some(1)));
        let meta = registry.get("ResourceA").unwrap();

        // Three levels of distinct instances; the guard fires at depth 2.
        let instance = json!({
            "id": 1,
            "b": { "id": 2, "a": { "id": 3 } }
        });
        assert!(matches!(
            build_item(&instance, &meta, &[], &ctx),
            Err(RenderError::DepthExceeded { limit: 1 })
        ));
    }

    #[test]
    fn generate_id_override_disables_nested_iri() {
        let registry = MetadataRegistry::new();
        registry.insert(
            ResourceMetadata::new("Book", "/books")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::relation("author", "Author").generate_id(false)),
        );
        registry.insert(
            ResourceMetadata::new("Author", "/authors")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::scalar("name", ScalarType::String)),
        );
        let ctx = ctx_with(&registry, RenderOptions::default());
        let meta = registry.get("Book").unwrap();

        let instance = json!({ "id": 1, "author": { "id": 5, "name": "Ada" } });
        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        let author = match item.value("author").unwrap() {
            Node::Item(a) => a,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(author.iri, None);
        assert!(author.value("name").is_some());
    }

    #[test]
    fn identifier_less_resource_gets_skolem_iri() {
        let registry = MetadataRegistry::new();
        registry.insert(
            ResourceMetadata::new("Book", "/books")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::relation("note", "Note")),
        );
        registry.insert(
            ResourceMetadata::new("Note", "/notes")
                .property(PropertyDescriptor::scalar("text", ScalarType::String)),
        );
        let ctx = ctx_with(&registry, RenderOptions::default());
        let meta = registry.get("Book").unwrap();

        let instance = json!({ "id": 1, "note": { "text": "margin scribble" } });
        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        let note = match item.value("note").unwrap() {
            Node::Item(n) => n,
            other => panic!("unexpected {:?}", other),
        };
        assert!(note.iri.as_deref().unwrap().starts_with("/.well-known/genid/"));
    }

    #[test]
    fn relation_list_embeds_each_element() {
        let registry = MetadataRegistry::new();
        registry.insert(
            ResourceMetadata::new("Author", "/authors")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::relation_list("books", "Book")),
        );
        registry.insert(
            ResourceMetadata::new("Book", "/books")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::scalar("title", ScalarType::String)),
        );
        let ctx = ctx_with(&registry, RenderOptions::default());
        let meta = registry.get("Author").unwrap();

        let instance = json!({
            "id": 1,
            "books": [ { "id": 10, "title": "First" }, "/books/11" ]
        });
        let item = build_item(&instance, &meta, &[], &ctx).unwrap();
        match item.value("books").unwrap() {
            Node::List(nodes) => {
                assert_eq!(nodes.len(), 2);
                assert!(matches!(nodes[0], Node::Item(_)));
                assert_eq!(
                    nodes[1],
                    Node::Reference(Reference::new("Book", "/books/11"))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn collection_members_do_not_share_visited_state() {
        let registry = registry();
        let ctx = ctx_with(
            &registry,
            RenderOptions::default().sibling_reuse(SiblingReuse::EmbedOnce),
        );
        let meta = registry.get("ResourceA").unwrap();

        // Both members embed the same B; each member is its own
        // top-level render, so both embed fully even under EmbedOnce.
        let instances = vec![
            json!({ "id": 1, "b": { "id": 9 } }),
            json!({ "id": 2, "b": { "id": 9 } }),
        ];
        let items = build_collection(&instances, &meta, &[], &ctx).unwrap();
        assert!(matches!(items[0].value("b").unwrap(), Node::Item(_)));
        assert!(matches!(items[1].value("b").unwrap(), Node::Item(_)));
    }
}
