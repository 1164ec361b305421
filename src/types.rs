//! Core types for document rendering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire formats the engine can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Hydra / JSON-LD (`application/ld+json`).
    JsonLd,
    /// HAL (`application/hal+json`).
    Hal,
    /// JSON:API (`application/vnd.api+json`).
    JsonApi,
    /// Plain JSON, no hypermedia envelope (`application/json`).
    Json,
}

impl Format {
    /// All formats, in default negotiation preference order.
    pub const ALL: &'static [Format] =
        &[Format::JsonLd, Format::Hal, Format::JsonApi, Format::Json];

    /// Returns the MIME type for this format.
    pub fn media_type(&self) -> &'static str {
        match self {
            Format::JsonLd => "application/ld+json",
            Format::Hal => "application/hal+json",
            Format::JsonApi => "application/vnd.api+json",
            Format::Json => "application/json",
        }
    }

    /// Look up a format by MIME type.
    ///
    /// Media type parameters (`;charset=...`) must already be stripped.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            "application/ld+json" => Some(Format::JsonLd),
            "application/hal+json" => Some(Format::Hal),
            "application/vnd.api+json" => Some(Format::JsonApi),
            "application/json" => Some(Format::Json),
            _ => None,
        }
    }

    /// Short name used by the CLI (`--format hal`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jsonld" | "json-ld" | "hydra" => Some(Format::JsonLd),
            "hal" => Some(Format::Hal),
            "jsonapi" | "json-api" => Some(Format::JsonApi),
            "json" => Some(Format::Json),
            _ => None,
        }
    }

    /// Whether the format accepts write documents (denormalization).
    ///
    /// HAL is a read-only representation here: there is no agreed way to
    /// submit `_embedded` trees back, so writes are rejected up front.
    pub fn supports_write(&self) -> bool {
        !matches!(self, Format::Hal)
    }

    /// MIME type used when rendering a problem-detail document.
    pub fn problem_media_type(&self) -> &'static str {
        match self {
            Format::JsonLd => "application/ld+json",
            _ => "application/problem+json",
        }
    }
}

/// How a null-valued to-one relation appears in output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullRelationPolicy {
    /// The member is left out of the document entirely.
    #[default]
    Omit,
    /// The member is emitted with an explicit `null` value.
    IncludeNull,
}

/// Embedding behavior for an instance reached through two distinct,
/// non-cyclic paths in the same render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiblingReuse {
    /// Visited entries are path-local: the instance embeds fully on each
    /// distinct path. Cycles are still broken.
    #[default]
    EmbedPerPath,
    /// Visited entries last for the whole render: the second and later
    /// sightings become references.
    EmbedOnce,
}

/// Options for a render call.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Global default for identifier generation. A per-property
    /// `generate_id` override always wins.
    pub generate_ids: bool,
    /// Null to-one relation handling.
    pub null_relations: NullRelationPolicy,
    /// Re-embedding policy for non-cyclic revisits.
    pub sibling_reuse: SiblingReuse,
    /// Optional recursion guard. Cycles never need it (they are broken
    /// structurally); this only bounds legitimately deep graphs.
    pub max_depth: Option<usize>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            generate_ids: true,
            null_relations: NullRelationPolicy::default(),
            sibling_reuse: SiblingReuse::default(),
            max_depth: None,
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global identifier-generation default.
    pub fn generate_ids(mut self, on: bool) -> Self {
        self.generate_ids = on;
        self
    }

    /// Set the null to-one relation policy.
    pub fn null_relations(mut self, policy: NullRelationPolicy) -> Self {
        self.null_relations = policy;
        self
    }

    /// Set the sibling-reuse policy.
    pub fn sibling_reuse(mut self, policy: SiblingReuse) -> Self {
        self.sibling_reuse = policy;
        self
    }

    /// Bound embedding depth. `None` disables the guard.
    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
