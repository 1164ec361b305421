//! The generic intermediate tree built from instance data and metadata.
//!
//! Format normalizers consume this tree; nothing here is format-specific.
//! All of it is request-scoped: built inside one render call, dropped when
//! the document has been emitted.

use serde_json::Value;

/// A resolved external reference used in place of an embedding, either
/// because embedding policy said "link, don't embed" or because the
/// instance was already visited in the current traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Short name of the referenced resource.
    pub resource: String,
    /// The resolved identifier string.
    pub iri: String,
}

impl Reference {
    pub fn new(resource: impl Into<String>, iri: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            iri: iri.into(),
        }
    }
}

/// One resolved property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Scalar value, passed through from the instance data.
    Scalar(Value),
    /// Fully embedded related resource.
    Item(Box<ItemGraph>),
    /// Link to a related resource instead of an embedding.
    Reference(Reference),
    /// To-many value; elements are items, references or scalars.
    List(Vec<Node>),
    /// Explicit null (kept only under `NullRelationPolicy::IncludeNull`).
    Null,
}

/// A resource instance with resolved property values, wire-named and in
/// metadata declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemGraph {
    /// Resource short name.
    pub resource: String,
    /// External reference, absent when identifier generation is off for
    /// this instance.
    pub iri: Option<String>,
    /// (wire name, value) pairs; insertion order is emission order.
    pub values: Vec<(String, Node)>,
}

impl ItemGraph {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            iri: None,
            values: Vec::new(),
        }
    }

    pub fn value(&self, wire_name: &str) -> Option<&Node> {
        self.values
            .iter()
            .find(|(name, _)| name == wire_name)
            .map(|(_, node)| node)
    }

    pub fn push(&mut self, wire_name: impl Into<String>, node: Node) {
        self.values.push((wire_name.into(), node));
    }
}

/// Current page position.
#[derive(Debug, Clone, PartialEq)]
pub enum PageState {
    /// Numeric page-based pagination. `total` is the collection-wide item
    /// count when the data layer knows it.
    Offset { page: u64, total: Option<u64> },
    /// Opaque cursor tokens. `next` is present iff the one-page-ahead
    /// probe returned at least one item; the engine never probes itself.
    Cursor {
        current: String,
        next: Option<String>,
    },
}

/// One page of rendered items plus its position.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub items: Vec<ItemGraph>,
    pub page_size: u64,
    pub state: PageState,
}

impl PageResult {
    /// Offset-paged result.
    pub fn offset(items: Vec<ItemGraph>, page: u64, page_size: u64, total: Option<u64>) -> Self {
        Self {
            items,
            page_size,
            state: PageState::Offset { page, total },
        }
    }

    /// Cursor-paged result.
    pub fn cursor(
        items: Vec<ItemGraph>,
        page_size: u64,
        current: impl Into<String>,
        next: Option<String>,
    ) -> Self {
        Self {
            items,
            page_size,
            state: PageState::Cursor {
                current: current.into(),
                next,
            },
        }
    }

    /// Collection-wide total when known.
    pub fn total(&self) -> Option<u64> {
        match &self.state {
            PageState::Offset { total, .. } => *total,
            PageState::Cursor { .. } => None,
        }
    }
}
