//! Resource metadata: immutable descriptions of resource types and the
//! process-wide registry that caches them.
//!
//! A [`ResourceMetadata`] is built once per resource type and read-only
//! afterwards. Relation targets are resource short names resolved through
//! the [`MetadataRegistry`] rather than owned nesting, since metadata
//! graphs may be cyclic (A relates to B, B back to A).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RenderError;
use crate::types::Format;
use crate::sort::Direction;

/// JSON-Schema scalar type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ScalarType {
    /// JSON-Schema `type` keyword value.
    pub fn schema_name(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Number => "number",
            ScalarType::Boolean => "boolean",
        }
    }
}

/// Semantic kind of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PropertyKind {
    /// Plain scalar value.
    Scalar { r#type: ScalarType },
    /// String constrained to a closed value set.
    Enum { values: Vec<String> },
    /// To-one relation to another resource.
    Relation { target: String },
    /// To-many relation to another resource.
    RelationList { target: String },
}

impl PropertyKind {
    /// Relation target short name, if this is a relation of either arity.
    pub fn relation_target(&self) -> Option<&str> {
        match self {
            PropertyKind::Relation { target } | PropertyKind::RelationList { target } => {
                Some(target)
            }
            _ => None,
        }
    }
}

/// Description of one property of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Explicit wire name. Wins over any [`crate::NameConverter`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized_name: Option<String>,
    #[serde(flatten)]
    pub kind: PropertyKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
    /// Per-property identifier-generation override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_id: Option<bool>,
    /// Serialization groups this property belongs to. Empty means the
    /// property is visible under every group set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl PropertyDescriptor {
    /// Scalar property with everything defaulted.
    pub fn scalar(name: impl Into<String>, r#type: ScalarType) -> Self {
        Self {
            name: name.into(),
            serialized_name: None,
            kind: PropertyKind::Scalar { r#type },
            nullable: false,
            readable: true,
            writable: true,
            generate_id: None,
            groups: Vec::new(),
        }
    }

    /// To-one relation property.
    pub fn relation(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serialized_name: None,
            kind: PropertyKind::Relation {
                target: target.into(),
            },
            nullable: false,
            readable: true,
            writable: true,
            generate_id: None,
            groups: Vec::new(),
        }
    }

    /// To-many relation property.
    pub fn relation_list(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serialized_name: None,
            kind: PropertyKind::RelationList {
                target: target.into(),
            },
            nullable: false,
            readable: true,
            writable: true,
            generate_id: None,
            groups: Vec::new(),
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn generate_id(mut self, on: bool) -> Self {
        self.generate_id = Some(on);
        self
    }

    pub fn serialized_name(mut self, name: impl Into<String>) -> Self {
        self.serialized_name = Some(name.into());
        self
    }

    pub fn groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Whether the property is visible under the given serialization
    /// group set. An empty declared set means always visible.
    pub fn in_groups(&self, groups: &[String]) -> bool {
        self.groups.is_empty()
            || groups.is_empty()
            || self.groups.iter().any(|g| groups.contains(g))
    }
}

/// Pagination configuration for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the client may choose its own page size.
    #[serde(default)]
    pub client_controlled: bool,
    /// Server default page size.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Upper bound for client-chosen page sizes.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

fn default_page_size() -> u64 {
    30
}

fn default_max_page_size() -> u64 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_controlled: false,
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl PaginationConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// One verb + path + format combination on a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub method: String,
    /// Path template; item operations carry an `{id}` placeholder.
    pub path: String,
    /// Formats configured for this operation, preference order first.
    pub formats: Vec<Format>,
    /// Registered filter ids usable on this operation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Default ordering applied when the request carries none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_sort: Vec<(String, Direction)>,
    /// Serialization group set; drives schema naming and property
    /// visibility.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl Operation {
    /// Collection GET with every format enabled.
    pub fn get_collection(path: impl Into<String>) -> Self {
        Self {
            name: "get_collection".into(),
            method: "GET".into(),
            path: path.into(),
            formats: Format::ALL.to_vec(),
            filters: Vec::new(),
            pagination: PaginationConfig::default(),
            default_sort: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Item GET with every format enabled.
    pub fn get_item(path: impl Into<String>) -> Self {
        Self {
            name: "get_item".into(),
            method: "GET".into(),
            path: path.into(),
            formats: Format::ALL.to_vec(),
            filters: Vec::new(),
            pagination: PaginationConfig::disabled(),
            default_sort: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn formats(mut self, formats: &[Format]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn supports(&self, format: Format) -> bool {
        self.formats.contains(&format)
    }

    /// Whether this operation targets a single item (`{id}` in the path).
    pub fn is_item_operation(&self) -> bool {
        self.path.contains("{id}")
    }
}

/// Immutable description of a resource type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub short_name: String,
    /// Collection route, e.g. `/books`.
    pub path: String,
    /// Identifier property names, declaration order.
    #[serde(default)]
    pub identifiers: Vec<String>,
    pub properties: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl ResourceMetadata {
    pub fn new(short_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            short_name: short_name.into(),
            path: path.into(),
            identifiers: Vec::new(),
            properties: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn identifier(mut self, name: impl Into<String>) -> Self {
        self.identifiers.push(name.into());
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Look up a property by internal name.
    pub fn property_named(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up an operation by name.
    pub fn operation_named(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.name == name)
    }

    /// Readable properties, declaration order.
    pub fn readable_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.readable)
    }

    /// Writable properties, declaration order.
    pub fn writable_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.writable)
    }
}

/// Process-wide, build-once, read-only metadata cache keyed by resource
/// short name.
///
/// Entries are `Arc`-shared and never mutated after insertion; concurrent
/// readers take the read lock only. `get_or_build` is compute-once-per-key
/// with a double-checked write lock.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: RwLock<HashMap<String, Arc<ResourceMetadata>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource description. Later inserts for the same name
    /// are ignored; the first build wins.
    pub fn insert(&self, metadata: ResourceMetadata) -> Arc<ResourceMetadata> {
        let mut entries = self.entries.write().expect("metadata lock poisoned");
        entries
            .entry(metadata.short_name.clone())
            .or_insert_with(|| Arc::new(metadata))
            .clone()
    }

    pub fn get(&self, short_name: &str) -> Option<Arc<ResourceMetadata>> {
        let entries = self.entries.read().expect("metadata lock poisoned");
        entries.get(short_name).cloned()
    }

    /// Fetch the metadata for `short_name`, building it with `build` on
    /// first access.
    pub fn get_or_build<F>(&self, short_name: &str, build: F) -> Arc<ResourceMetadata>
    where
        F: FnOnce() -> ResourceMetadata,
    {
        if let Some(found) = self.get(short_name) {
            return found;
        }
        let mut entries = self.entries.write().expect("metadata lock poisoned");
        // Double-check: another thread may have built it while we waited.
        entries
            .entry(short_name.to_string())
            .or_insert_with(|| Arc::new(build()))
            .clone()
    }

    /// ResourceClassResolver seam: is this type a known resource.
    pub fn is_resource(&self, short_name: &str) -> bool {
        self.get(short_name).is_some()
    }

    /// Short names of every registered resource, sorted.
    pub fn resource_names(&self) -> Vec<String> {
        let entries = self.entries.read().expect("metadata lock poisoned");
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Load a registry from a JSON document of the shape
    /// `{"resources": [ ...ResourceMetadata... ]}`.
    pub fn from_json(doc: &Value) -> Result<Self, RenderError> {
        let resources = doc
            .get("resources")
            .cloned()
            .unwrap_or_else(|| doc.clone());
        let parsed: Vec<ResourceMetadata> = serde_json::from_value(resources)
            .map_err(|source| RenderError::InvalidJson { source })?;
        let registry = Self::new();
        for resource in parsed {
            registry.insert(resource);
        }
        Ok(registry)
    }
}
