//! Identifier resolution: turning a resource instance into a stable
//! external reference.
//!
//! Join policy for composite identifiers: `name=value` pairs joined with
//! `;` in metadata declaration order (`isbn=1234;edition=2`). Single
//! identifiers render the bare value. Values are percent-escaped so the
//! result is always one path segment.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::RenderError;
use crate::metadata::{PropertyDescriptor, ResourceMetadata};

/// Decide whether an identifier should be generated for a property value.
///
/// The per-property override wins; otherwise the global default applies.
/// Pure function, no side effects.
pub fn should_generate_id(property: &PropertyDescriptor, global_default: bool) -> bool {
    property.generate_id.unwrap_or(global_default)
}

/// Resolve the identifier string for an instance.
///
/// # Errors
///
/// `IdentifierNotFound` when the resource declares no identifier
/// properties, `MissingIdentifierValue` when a declared identifier has no
/// value in the instance data.
pub fn resolve_id(instance: &Value, meta: &ResourceMetadata) -> Result<String, RenderError> {
    if meta.identifiers.is_empty() {
        return Err(RenderError::IdentifierNotFound {
            resource: meta.short_name.clone(),
        });
    }

    let mut parts = Vec::with_capacity(meta.identifiers.len());
    for name in &meta.identifiers {
        let value = instance
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| RenderError::MissingIdentifierValue {
                resource: meta.short_name.clone(),
                property: name.clone(),
            })?;
        parts.push((name, scalar_to_segment(value)));
    }

    if parts.len() == 1 {
        Ok(path_escape(&parts[0].1))
    } else {
        let joined: Vec<String> = parts
            .iter()
            .map(|(name, value)| format!("{}={}", path_escape(name), path_escape(value)))
            .collect();
        Ok(joined.join(";"))
    }
}

fn scalar_to_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Percent-escape the characters that would break a single path segment
/// or the composite join syntax.
fn path_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            ';' => out.push_str("%3B"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}

/// Render-scoped identifier memo.
///
/// Guarantees idempotent identifiers within one render call and allocates
/// skolem references (`/.well-known/genid/bN`) for embedded resources
/// that declare no identifier properties. Keys are content fingerprints,
/// so content-equal instances share one reference per render. Never
/// reused across renders.
#[derive(Debug, Default)]
pub struct IdCache {
    ids: HashMap<String, String>,
    next_skolem: u64,
}

impl IdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized [`resolve_id`].
    pub fn resolve(
        &mut self,
        instance: &Value,
        meta: &ResourceMetadata,
    ) -> Result<String, RenderError> {
        let key = fingerprint(&meta.short_name, instance);
        if let Some(found) = self.ids.get(&key) {
            return Ok(found.clone());
        }
        let id = resolve_id(instance, meta)?;
        self.ids.insert(key, id.clone());
        Ok(id)
    }

    /// Skolem reference for an instance without natural identifiers.
    /// Stable for the same instance within one render.
    pub fn skolem(&mut self, resource: &str, instance: &Value) -> String {
        let key = fingerprint(resource, instance);
        if let Some(found) = self.ids.get(&key) {
            return found.clone();
        }
        let iri = format!("/.well-known/genid/b{}", self.next_skolem);
        self.next_skolem += 1;
        self.ids.insert(key, iri.clone());
        iri
    }
}

fn fingerprint(resource: &str, instance: &Value) -> String {
    format!("{}\u{1f}{}", resource, instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PropertyDescriptor, ScalarType};
    use serde_json::json;

    fn book_meta() -> ResourceMetadata {
        ResourceMetadata::new("Book", "/books")
            .identifier("id")
            .property(PropertyDescriptor::scalar("id", ScalarType::Integer))
    }

    fn composite_meta() -> ResourceMetadata {
        ResourceMetadata::new("Edition", "/editions")
            .identifier("isbn")
            .identifier("revision")
    }

    #[test]
    fn single_identifier_is_bare_value() {
        let id = resolve_id(&json!({ "id": 42 }), &book_meta()).unwrap();
        assert_eq!(id, "42");

        let id = resolve_id(&json!({ "id": "abc" }), &book_meta()).unwrap();
        assert_eq!(id, "abc");
    }

    #[test]
    fn composite_identifier_join_policy() {
        let instance = json!({ "isbn": "978-3", "revision": 2 });
        let id = resolve_id(&instance, &composite_meta()).unwrap();
        assert_eq!(id, "isbn=978-3;revision=2");
    }

    #[test]
    fn identifier_values_are_path_escaped() {
        let meta = ResourceMetadata::new("File", "/files").identifier("path");
        let id = resolve_id(&json!({ "path": "a/b;c=d" }), &meta).unwrap();
        assert_eq!(id, "a%2Fb%3Bc%3Dd");
    }

    #[test]
    fn no_identifiers_fails() {
        let meta = ResourceMetadata::new("Blob", "/blobs");
        assert!(matches!(
            resolve_id(&json!({ "id": 1 }), &meta),
            Err(RenderError::IdentifierNotFound { resource }) if resource == "Blob"
        ));
    }

    #[test]
    fn missing_identifier_value_fails() {
        assert!(matches!(
            resolve_id(&json!({ "title": "Dune" }), &book_meta()),
            Err(RenderError::MissingIdentifierValue { property, .. }) if property == "id"
        ));
        // Explicit null counts as missing.
        assert!(matches!(
            resolve_id(&json!({ "id": null }), &book_meta()),
            Err(RenderError::MissingIdentifierValue { .. })
        ));
    }

    #[test]
    fn should_generate_id_override_wins() {
        let on = PropertyDescriptor::scalar("x", ScalarType::String).generate_id(true);
        let off = PropertyDescriptor::scalar("x", ScalarType::String).generate_id(false);
        let unset = PropertyDescriptor::scalar("x", ScalarType::String);

        assert!(should_generate_id(&on, false));
        assert!(!should_generate_id(&off, true));
        assert!(should_generate_id(&unset, true));
        assert!(!should_generate_id(&unset, false));
    }

    #[test]
    fn cache_is_idempotent_within_render() {
        let mut cache = IdCache::new();
        let instance = json!({ "id": 7 });
        let first = cache.resolve(&instance, &book_meta()).unwrap();
        let second = cache.resolve(&instance, &book_meta()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn skolem_stable_per_instance() {
        let mut cache = IdCache::new();
        let a = json!({ "note": "x" });
        let b = json!({ "note": "y" });

        let first = cache.skolem("Note", &a);
        let again = cache.skolem("Note", &a);
        let other = cache.skolem("Note", &b);

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(first.starts_with("/.well-known/genid/b"));
    }
}
