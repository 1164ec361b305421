//! OpenAPI / Swagger description emitter.
//!
//! A pure transform over resource metadata, no live data. Version
//! strings are emitted exactly (`"3.1.0"`, `"3.0.2"`, `swagger: "2.0"`)
//! since downstream tooling parses them literally. Schema components are
//! de-duplicated by (resource, serialization-group set) fingerprint, so
//! the same pair always yields the same component name and distinct
//! group sets yield distinct names.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::DocumentError;
use crate::metadata::{
    MetadataRegistry, Operation, PropertyDescriptor, PropertyKind, ResourceMetadata,
};

/// Target specification version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenApiVersion {
    /// OpenAPI `"3.1.0"`.
    #[default]
    V3_1,
    /// OpenAPI `"3.0.2"` (legacy mode).
    V3_0,
    /// Swagger `"2.0"`.
    Swagger2,
}

impl OpenApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenApiVersion::V3_1 => "3.1.0",
            OpenApiVersion::V3_0 => "3.0.2",
            OpenApiVersion::Swagger2 => "2.0",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "3.1.0" | "3.1" => Some(OpenApiVersion::V3_1),
            "3.0.2" | "3.0" => Some(OpenApiVersion::V3_0),
            "2.0" | "swagger" => Some(OpenApiVersion::Swagger2),
            _ => None,
        }
    }

    fn ref_base(&self) -> &'static str {
        match self {
            OpenApiVersion::Swagger2 => "#/definitions/",
            _ => "#/components/schemas/",
        }
    }
}

/// Which side of the wire a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaView {
    /// Response bodies: readable properties, non-nullable ones required.
    Read,
    /// Request bodies: writable properties, nothing required (partial
    /// updates stay valid).
    Write,
}

/// Document-level options.
#[derive(Debug, Clone)]
pub struct OpenApiOptions {
    pub title: String,
    /// `info.version` of the described API.
    pub api_version: String,
    pub spec: OpenApiVersion,
}

impl Default for OpenApiOptions {
    fn default() -> Self {
        Self {
            title: "API".into(),
            api_version: "0.1.0".into(),
            spec: OpenApiVersion::default(),
        }
    }
}

/// Deterministic component name for a (resource, group set) pair.
///
/// Empty set: the short name. Single group: `Name-group`. Multiple
/// groups: `Name-<fnv1a64 hex>` over the sorted set, so ordering of the
/// declared groups never changes the name.
pub fn schema_name(short_name: &str, groups: &[String]) -> String {
    match groups.len() {
        0 => short_name.to_string(),
        1 => format!("{}-{}", short_name, groups[0]),
        _ => {
            let mut sorted: Vec<&str> = groups.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() == 1 {
                return format!("{}-{}", short_name, sorted[0]);
            }
            let fingerprint = fnv1a64(sorted.join("\u{1f}").as_bytes());
            format!("{}-{:016x}", short_name, fingerprint)
        }
    }
}

// FNV-1a, 64 bit. Inlined because the fingerprint must be stable across
// processes, which rules out the std hasher.
fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Object schema for a resource under a group set.
///
/// Relation properties reference the target's component (same group
/// set) when the target is registered, and fall back to an IRI string
/// schema otherwise.
pub fn schema_for_groups(
    meta: &ResourceMetadata,
    groups: &[String],
    view: SchemaView,
    version: OpenApiVersion,
    registry: &MetadataRegistry,
) -> Value {
    object_schema(meta, groups, view, version.ref_base(), version, registry)
}

fn object_schema(
    meta: &ResourceMetadata,
    groups: &[String],
    view: SchemaView,
    ref_base: &str,
    version: OpenApiVersion,
    registry: &MetadataRegistry,
) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for property in visible_properties(meta, groups, view) {
        let wire = wire_name(property);
        properties.insert(
            wire.clone(),
            property_schema(property, ref_base, version, registry, view == SchemaView::Write),
        );
        if view == SchemaView::Read && !property.nullable {
            required.push(Value::String(wire));
        }
    }

    let mut out = Map::new();
    out.insert("type".into(), json!("object"));
    out.insert("description".into(), json!(meta.short_name));
    out.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        out.insert("required".into(), Value::Array(required));
    }
    Value::Object(out)
}

fn visible_properties<'a>(
    meta: &'a ResourceMetadata,
    groups: &'a [String],
    view: SchemaView,
) -> impl Iterator<Item = &'a PropertyDescriptor> {
    meta.properties.iter().filter(move |p| {
        let side = match view {
            SchemaView::Read => p.readable,
            SchemaView::Write => p.writable,
        };
        side && p.in_groups(groups)
    })
}

fn wire_name(property: &PropertyDescriptor) -> String {
    property
        .serialized_name
        .clone()
        .unwrap_or_else(|| property.name.clone())
}

fn property_schema(
    property: &PropertyDescriptor,
    ref_base: &str,
    version: OpenApiVersion,
    registry: &MetadataRegistry,
    write_view: bool,
) -> Value {
    let base = match &property.kind {
        PropertyKind::Scalar { r#type } => json!({ "type": r#type.schema_name() }),
        PropertyKind::Enum { values } => json!({ "type": "string", "enum": values }),
        PropertyKind::Relation { target } => relation_schema(
            target,
            property,
            ref_base,
            registry,
            write_view,
        ),
        PropertyKind::RelationList { target } => json!({
            "type": "array",
            "items": relation_schema(target, property, ref_base, registry, write_view),
        }),
    };

    if property.nullable {
        nullable_schema(base, version)
    } else {
        base
    }
}

fn relation_schema(
    target: &str,
    property: &PropertyDescriptor,
    ref_base: &str,
    registry: &MetadataRegistry,
    write_view: bool,
) -> Value {
    let iri = json!({ "type": "string", "format": "iri-reference" });
    if !registry.is_resource(target) {
        return iri;
    }
    let mut name = schema_name(target, &property.groups);
    if write_view {
        name.push_str("-write");
    }
    json!({ "anyOf": [ iri, { "$ref": format!("{}{}", ref_base, name) } ] })
}

fn nullable_schema(base: Value, version: OpenApiVersion) -> Value {
    match version {
        OpenApiVersion::V3_1 => {
            // JSON-Schema style type arrays.
            if let Some(type_name) = base.get("type").and_then(Value::as_str) {
                let mut out = base.as_object().cloned().unwrap_or_default();
                out.insert("type".into(), json!([type_name, "null"]));
                Value::Object(out)
            } else {
                json!({ "anyOf": [ base, { "type": "null" } ] })
            }
        }
        OpenApiVersion::V3_0 => with_flag(base, "nullable"),
        OpenApiVersion::Swagger2 => with_flag(base, "x-nullable"),
    }
}

fn with_flag(base: Value, flag: &str) -> Value {
    let mut out = base.as_object().cloned().unwrap_or_default();
    out.insert(flag.into(), Value::Bool(true));
    Value::Object(out)
}

/// Self-contained JSON Schema for validating write documents: the
/// resource's write schema plus `$defs` for every transitively
/// referenced resource. Safe on cyclic metadata graphs.
pub fn standalone_schema(
    meta: &ResourceMetadata,
    groups: &[String],
    view: SchemaView,
    registry: &MetadataRegistry,
) -> Value {
    let ref_base = "#/$defs/";
    let mut defs = BTreeMap::new();
    collect_defs(meta, view, ref_base, registry, &mut defs);

    let mut root = object_schema(meta, groups, view, ref_base, OpenApiVersion::V3_1, registry);
    if !defs.is_empty() {
        if let Some(map) = root.as_object_mut() {
            map.insert(
                "$defs".into(),
                Value::Object(defs.into_iter().collect()),
            );
        }
    }
    root
}

fn collect_defs(
    meta: &ResourceMetadata,
    view: SchemaView,
    ref_base: &str,
    registry: &MetadataRegistry,
    defs: &mut BTreeMap<String, Value>,
) {
    for property in meta.properties.iter() {
        let Some(target) = property.kind.relation_target() else {
            continue;
        };
        let Some(target_meta) = registry.get(target) else {
            continue;
        };
        let mut name = schema_name(target, &property.groups);
        if view == SchemaView::Write {
            name.push_str("-write");
        }
        if defs.contains_key(&name) {
            continue;
        }
        let schema = object_schema(
            &target_meta,
            &property.groups,
            view,
            ref_base,
            OpenApiVersion::V3_1,
            registry,
        );
        defs.insert(name, schema);
        collect_defs(&target_meta, view, ref_base, registry, defs);
    }
}

/// Validate a document against a schema, collecting every failure with
/// its JSON-Pointer path.
pub fn validate_document(doc: &Value, schema: &Value) -> Result<(), Vec<DocumentError>> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => {
            return Err(vec![DocumentError {
                path: "/".into(),
                message: e.to_string(),
            }])
        }
    };

    let errors: Vec<DocumentError> = validator
        .iter_errors(doc)
        .map(|e| DocumentError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Emit the full description document for every registered resource.
pub fn emit(registry: &MetadataRegistry, options: &OpenApiOptions) -> Value {
    let mut paths = Map::new();
    let mut schemas: BTreeMap<String, Value> = BTreeMap::new();

    for name in registry.resource_names() {
        let Some(meta) = registry.get(&name) else {
            continue;
        };

        // Response component for each distinct group set used by the
        // resource's operations, plus the ungrouped baseline.
        register_schema(&meta, &[], SchemaView::Read, options.spec, registry, &mut schemas);
        for operation in &meta.operations {
            register_schema(
                &meta,
                &operation.groups,
                SchemaView::Read,
                options.spec,
                registry,
                &mut schemas,
            );
            if is_write_method(&operation.method) {
                register_schema(
                    &meta,
                    &operation.groups,
                    SchemaView::Write,
                    options.spec,
                    registry,
                    &mut schemas,
                );
            }

            let entry = paths
                .entry(operation.path.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(map) = entry.as_object_mut() {
                map.insert(
                    operation.method.to_lowercase(),
                    operation_object(&meta, operation, options.spec),
                );
            }
        }
    }

    let info = json!({
        "title": options.title,
        "version": options.api_version,
    });

    match options.spec {
        OpenApiVersion::Swagger2 => json!({
            "swagger": "2.0",
            "info": info,
            "paths": Value::Object(paths),
            "definitions": Value::Object(schemas.into_iter().collect()),
        }),
        version => json!({
            "openapi": version.as_str(),
            "info": info,
            "paths": Value::Object(paths),
            "components": { "schemas": Value::Object(schemas.into_iter().collect()) },
        }),
    }
}

fn register_schema(
    meta: &ResourceMetadata,
    groups: &[String],
    view: SchemaView,
    version: OpenApiVersion,
    registry: &MetadataRegistry,
    schemas: &mut BTreeMap<String, Value>,
) {
    let mut name = schema_name(&meta.short_name, groups);
    if view == SchemaView::Write {
        name.push_str("-write");
    }
    if schemas.contains_key(&name) {
        return;
    }
    let schema = schema_for_groups(meta, groups, view, version, registry);
    schemas.insert(name, schema);

    // Referenced targets need their components too.
    for property in &meta.properties {
        if let Some(target) = property.kind.relation_target() {
            if let Some(target_meta) = registry.get(target) {
                register_schema(&target_meta, &property.groups, view, version, registry, schemas);
            }
        }
    }
}

fn is_write_method(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH"
    )
}

fn operation_object(
    meta: &ResourceMetadata,
    operation: &Operation,
    version: OpenApiVersion,
) -> Value {
    let read_ref = component_ref(meta, operation, version, SchemaView::Read);
    let media_types: Vec<&str> = operation.formats.iter().map(|f| f.media_type()).collect();

    let mut out = Map::new();
    out.insert(
        "operationId".into(),
        json!(format!("{}_{}", operation.name, meta.short_name)),
    );
    out.insert("tags".into(), json!([meta.short_name]));

    let mut parameters = Vec::new();
    if operation.is_item_operation() {
        // Parameter schemas differ between Swagger 2 and OpenAPI 3.
        parameters.push(match version {
            OpenApiVersion::Swagger2 => json!({
                "name": "id", "in": "path", "required": true, "type": "string"
            }),
            _ => json!({
                "name": "id", "in": "path", "required": true,
                "schema": { "type": "string" }
            }),
        });
    } else if operation.method.eq_ignore_ascii_case("GET") {
        if operation.pagination.enabled {
            parameters.push(query_parameter("page", "integer", version));
            if operation.pagination.client_controlled {
                parameters.push(query_parameter("itemsPerPage", "integer", version));
            }
        }
        for filter in &operation.filters {
            parameters.push(query_parameter(filter, "string", version));
        }
    }
    if !parameters.is_empty() {
        out.insert("parameters".into(), Value::Array(parameters));
    }

    let is_collection_get =
        operation.method.eq_ignore_ascii_case("GET") && !operation.is_item_operation();
    let success_schema = if is_collection_get {
        json!({ "type": "array", "items": read_ref })
    } else {
        read_ref
    };

    match version {
        OpenApiVersion::Swagger2 => {
            out.insert("produces".into(), json!(media_types));
            if is_write_method(&operation.method) {
                out.insert("consumes".into(), json!(media_types));
                let write_ref = component_ref(meta, operation, version, SchemaView::Write);
                let mut parameters = out
                    .remove("parameters")
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default();
                parameters.push(json!({
                    "name": "body", "in": "body", "required": true,
                    "schema": write_ref,
                }));
                out.insert("parameters".into(), Value::Array(parameters));
            }
            out.insert(
                "responses".into(),
                responses_object(&operation.method, success_schema, |schema| {
                    json!({ "description": "successful operation", "schema": schema })
                }),
            );
        }
        _ => {
            if is_write_method(&operation.method) {
                let write_ref = component_ref(meta, operation, version, SchemaView::Write);
                let mut content = Map::new();
                for media_type in &media_types {
                    content.insert(media_type.to_string(), json!({ "schema": write_ref.clone() }));
                }
                out.insert(
                    "requestBody".into(),
                    json!({ "required": true, "content": Value::Object(content) }),
                );
            }
            let media_types = media_types.clone();
            out.insert(
                "responses".into(),
                responses_object(&operation.method, success_schema, move |schema| {
                    let mut content = Map::new();
                    for media_type in &media_types {
                        content
                            .insert(media_type.to_string(), json!({ "schema": schema.clone() }));
                    }
                    json!({
                        "description": "successful operation",
                        "content": Value::Object(content),
                    })
                }),
            );
        }
    }

    Value::Object(out)
}

fn responses_object<F>(method: &str, success_schema: Value, body: F) -> Value
where
    F: Fn(Value) -> Value,
{
    let mut responses = Map::new();
    match method.to_ascii_uppercase().as_str() {
        "POST" => {
            responses.insert("201".into(), body(success_schema));
        }
        "DELETE" => {
            responses.insert("204".into(), json!({ "description": "resource deleted" }));
        }
        _ => {
            responses.insert("200".into(), body(success_schema));
        }
    }
    responses.insert("400".into(), json!({ "description": "invalid input" }));
    Value::Object(responses)
}

fn component_ref(
    meta: &ResourceMetadata,
    operation: &Operation,
    version: OpenApiVersion,
    view: SchemaView,
) -> Value {
    let mut name = schema_name(&meta.short_name, &operation.groups);
    if view == SchemaView::Write {
        name.push_str("-write");
    }
    json!({ "$ref": format!("{}{}", version.ref_base(), name) })
}

fn query_parameter(name: &str, type_name: &str, version: OpenApiVersion) -> Value {
    match version {
        OpenApiVersion::Swagger2 => json!({
            "name": name, "in": "query", "required": false, "type": type_name
        }),
        _ => json!({
            "name": name, "in": "query", "required": false,
            "schema": { "type": type_name }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PaginationConfig, PropertyDescriptor, ScalarType};
    use serde_json::json;

    fn registry() -> MetadataRegistry {
        let registry = MetadataRegistry::new();
        registry.insert(
            ResourceMetadata::new("Book", "/books")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::scalar("title", ScalarType::String))
                .property(
                    PropertyDescriptor::scalar("publishedAt", ScalarType::String)
                        .nullable(true),
                )
                .property(PropertyDescriptor::relation("author", "Author"))
                .operation(Operation::get_collection("/books").pagination(
                    PaginationConfig {
                        enabled: true,
                        client_controlled: true,
                        page_size: 30,
                        max_page_size: 100,
                    },
                ))
                .operation(Operation::get_item("/books/{id}")),
        );
        registry.insert(
            ResourceMetadata::new("Author", "/authors")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::scalar("name", ScalarType::String)),
        );
        registry
    }

    #[test]
    fn schema_name_determinism() {
        let groups = vec!["a".to_string(), "b".to_string()];
        let first = schema_name("Dummy", &groups);
        let second = schema_name("Dummy", &groups);
        assert_eq!(first, second);

        // Declaration order must not matter.
        let swapped = vec!["b".to_string(), "a".to_string()];
        assert_eq!(first, schema_name("Dummy", &swapped));
    }

    #[test]
    fn schema_name_shapes() {
        assert_eq!(schema_name("Dummy", &[]), "Dummy");
        assert_eq!(schema_name("Dummy", &["dummy".to_string()]), "Dummy-dummy");
        let hashed = schema_name("Dummy", &["a".to_string(), "b".to_string()]);
        assert!(hashed.starts_with("Dummy-"));
        assert_eq!(hashed.len(), "Dummy-".len() + 16);
    }

    #[test]
    fn distinct_group_sets_get_distinct_names() {
        let a = schema_name("Dummy", &["a".to_string(), "b".to_string()]);
        let b = schema_name("Dummy", &["a".to_string(), "c".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn read_schema_requires_non_nullable() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let schema =
            schema_for_groups(&meta, &[], SchemaView::Read, OpenApiVersion::V3_1, &registry);

        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("id")));
        assert!(required.contains(&json!("title")));
        assert!(!required.contains(&json!("publishedAt")));
    }

    #[test]
    fn write_schema_has_no_required() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let schema =
            schema_for_groups(&meta, &[], SchemaView::Write, OpenApiVersion::V3_1, &registry);
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn nullable_styles_per_version() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();

        let v31 = schema_for_groups(&meta, &[], SchemaView::Read, OpenApiVersion::V3_1, &registry);
        assert_eq!(
            v31["properties"]["publishedAt"]["type"],
            json!(["string", "null"])
        );

        let v30 = schema_for_groups(&meta, &[], SchemaView::Read, OpenApiVersion::V3_0, &registry);
        assert_eq!(v30["properties"]["publishedAt"]["nullable"], json!(true));

        let v2 = schema_for_groups(
            &meta,
            &[],
            SchemaView::Read,
            OpenApiVersion::Swagger2,
            &registry,
        );
        assert_eq!(v2["properties"]["publishedAt"]["x-nullable"], json!(true));
    }

    #[test]
    fn relation_references_target_component() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let schema =
            schema_for_groups(&meta, &[], SchemaView::Read, OpenApiVersion::V3_1, &registry);
        let any_of = schema["properties"]["author"]["anyOf"].as_array().unwrap();
        assert_eq!(any_of[1]["$ref"], json!("#/components/schemas/Author"));
    }

    #[test]
    fn version_strings_are_exact() {
        let registry = registry();

        let doc = emit(&registry, &OpenApiOptions::default());
        assert_eq!(doc["openapi"], json!("3.1.0"));

        let doc = emit(
            &registry,
            &OpenApiOptions {
                spec: OpenApiVersion::V3_0,
                ..Default::default()
            },
        );
        assert_eq!(doc["openapi"], json!("3.0.2"));

        let doc = emit(
            &registry,
            &OpenApiOptions {
                spec: OpenApiVersion::Swagger2,
                ..Default::default()
            },
        );
        assert_eq!(doc["swagger"], json!("2.0"));
        assert!(doc.get("openapi").is_none());
        assert!(doc["definitions"].get("Book").is_some());
    }

    #[test]
    fn collection_path_parameters() {
        let registry = registry();
        let doc = emit(&registry, &OpenApiOptions::default());
        let get = &doc["paths"]["/books"]["get"];
        let names: Vec<&str> = get["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["page", "itemsPerPage"]);
        // Collection response is an array of component refs.
        let schema = &get["responses"]["200"]["content"]["application/ld+json"]["schema"];
        assert_eq!(schema["type"], json!("array"));
    }

    #[test]
    fn item_path_has_id_parameter() {
        let registry = registry();
        let doc = emit(&registry, &OpenApiOptions::default());
        let get = &doc["paths"]["/books/{id}"]["get"];
        assert_eq!(get["parameters"][0]["name"], json!("id"));
        assert_eq!(get["parameters"][0]["in"], json!("path"));
    }

    #[test]
    fn emit_is_deterministic() {
        let registry = registry();
        let options = OpenApiOptions::default();
        let first = serde_json::to_string(&emit(&registry, &options)).unwrap();
        let second = serde_json::to_string(&emit(&registry, &options)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn standalone_schema_validates_documents() {
        let registry = registry();
        let meta = registry.get("Book").unwrap();
        let schema = standalone_schema(&meta, &[], SchemaView::Write, &registry);

        assert!(validate_document(&json!({ "title": "Dune" }), &schema).is_ok());

        let errors =
            validate_document(&json!({ "title": 42 }), &schema).unwrap_err();
        assert_eq!(errors[0].path, "/title");
    }

    #[test]
    fn standalone_schema_handles_cyclic_metadata() {
        let registry = MetadataRegistry::new();
        registry.insert(
            ResourceMetadata::new("A", "/as")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::relation("b", "B")),
        );
        registry.insert(
            ResourceMetadata::new("B", "/bs")
                .identifier("id")
                .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
                .property(PropertyDescriptor::relation("a", "A")),
        );
        let meta = registry.get("A").unwrap();
        // Terminates and produces $defs for both sides of the cycle.
        let schema = standalone_schema(&meta, &[], SchemaView::Write, &registry);
        assert!(schema["$defs"].get("A-write").is_some());
        assert!(schema["$defs"].get("B-write").is_some());
    }
}
