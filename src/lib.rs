//! hyperdoc
//!
//! Multi-format hypermedia document normalization for resource APIs.
//!
//! The engine takes an immutable resource description (properties,
//! identifiers, operations), a materialized data graph and a negotiated
//! media type, and deterministically renders the matching wire document:
//! Hydra/JSON-LD, HAL, JSON:API or plain JSON, with pagination
//! envelopes, embedded-relation resolution and cycle breaking. The same
//! metadata feeds a static OpenAPI/Swagger description emitter. Nothing
//! here routes, persists or authenticates; data must be materialized by
//! the host before a render call.
//!
//! # Example
//!
//! ```
//! use hyperdoc::{
//!     render_item, Format, IdentityNameConverter, MetadataRegistry, Operation,
//!     PathIriGenerator, PropertyDescriptor, RenderContext, RenderOptions,
//!     ResourceMetadata, ScalarType,
//! };
//! use serde_json::json;
//!
//! let registry = MetadataRegistry::new();
//! registry.insert(
//!     ResourceMetadata::new("Book", "/books")
//!         .identifier("id")
//!         .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
//!         .property(PropertyDescriptor::scalar("title", ScalarType::String))
//!         .operation(Operation::get_item("/books/{id}")),
//! );
//!
//! let names = IdentityNameConverter;
//! let iris = PathIriGenerator::default();
//! let ctx = RenderContext {
//!     registry: &registry,
//!     names: &names,
//!     iris: &iris,
//!     options: RenderOptions::default(),
//! };
//!
//! let meta = registry.get("Book").unwrap();
//! let operation = meta.operation_named("get_item").unwrap();
//! let instance = json!({ "id": 1, "title": "Dune" });
//!
//! let doc = render_item(&instance, &meta, operation, Format::Hal, &ctx).unwrap();
//! assert_eq!(doc["_links"]["self"]["href"], json!("/books/1"));
//! assert_eq!(doc["title"], json!("Dune"));
//! ```

mod embed;
mod error;
mod graph;
mod hal;
mod hydra;
mod identifier;
mod jsonapi;
mod metadata;
mod naming;
mod negotiate;
mod openapi;
mod paginate;
mod plain;
mod render;
mod sort;
mod types;

pub use embed::{build_collection, build_item, EmbedState};
pub use error::{DocumentError, RenderError};
pub use graph::{ItemGraph, Node, PageResult, PageState, Reference};
pub use identifier::{resolve_id, should_generate_id, IdCache};
pub use metadata::{
    MetadataRegistry, Operation, PaginationConfig, PropertyDescriptor, PropertyKind,
    ResourceMetadata, ScalarType,
};
pub use naming::{
    IdentityNameConverter, IriGenerator, NameConverter, PathIriGenerator, SnakeCaseNameConverter,
};
pub use negotiate::{fallback_format, negotiate, problem_document};
pub use openapi::{
    emit as emit_openapi, schema_name, standalone_schema, validate_document, OpenApiOptions,
    OpenApiVersion, SchemaView,
};
pub use paginate::{build_links, effective_page_size, PageLinks};
pub use render::{denormalize, render_collection, render_item, CollectionQuery, RenderContext};
pub use sort::{
    apply as apply_directives, translate, Direction, DirectiveList, EqualityFilter, Filter,
    FilterDirective, FilterRegistry, NullPlacement, SortDirective,
};
pub use types::{Format, NullRelationPolicy, RenderOptions, SiblingReuse};
