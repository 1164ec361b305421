//! Sort/filter translation: declarative query parameters to an ordered
//! directive list, plus in-memory application with stable-sort semantics.
//!
//! Parameter syntax: `order[title]=asc`, `order[author.name]=desc` for
//! ordering (the value may carry a `,nulls_first` / `,nulls_last` suffix);
//! every other `key=value` pair is an equality filter. Dotted paths
//! resolve through relation descriptors to a field on the related
//! resource.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RenderError;
use crate::metadata::{MetadataRegistry, PropertyKind, ResourceMetadata};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Case-insensitive parse. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }
}

/// Where null values sort, independent of direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPlacement {
    NullsFirst,
    #[default]
    NullsLast,
}

/// One ordering directive over a resolved property path.
#[derive(Debug, Clone, PartialEq)]
pub struct SortDirective {
    /// Path segments, internal names, relations first.
    pub path: Vec<String>,
    pub direction: Direction,
    pub nulls: NullPlacement,
}

/// One equality-filter directive over a resolved property path.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDirective {
    pub path: Vec<String>,
    pub value: String,
}

/// Ordered directives produced by [`translate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveList {
    pub filters: Vec<FilterDirective>,
    pub sorts: Vec<SortDirective>,
}

/// Translate query parameters into a directive list.
///
/// Parameter order is preserved within each directive class. Falls back
/// to the operation's `default_sort` when the request carries no `order`
/// parameters (callers pass it pre-merged into `params` or append after).
///
/// # Errors
///
/// `InvalidFilterProperty` for paths that do not resolve to a scalar
/// field, directions that do not parse, or null suffixes that do not
/// parse.
pub fn translate(
    params: &[(String, String)],
    meta: &ResourceMetadata,
    registry: &MetadataRegistry,
) -> Result<DirectiveList, RenderError> {
    let mut directives = DirectiveList::default();

    for (key, value) in params {
        if let Some(path) = order_key(key) {
            let segments = resolve_path(path, meta, registry)?;
            let (direction, nulls) = parse_order_value(value, path)?;
            directives.sorts.push(SortDirective {
                path: segments,
                direction,
                nulls,
            });
        } else {
            let segments = resolve_path(key, meta, registry)?;
            directives.filters.push(FilterDirective {
                path: segments,
                value: value.clone(),
            });
        }
    }

    Ok(directives)
}

/// Extracts `title` from `order[title]`.
fn order_key(key: &str) -> Option<&str> {
    key.strip_prefix("order[")?.strip_suffix(']')
}

fn parse_order_value(value: &str, path: &str) -> Result<(Direction, NullPlacement), RenderError> {
    let (dir_part, nulls_part) = match value.split_once(',') {
        Some((d, n)) => (d, Some(n)),
        None => (value, None),
    };

    let direction = Direction::parse(dir_part).ok_or_else(|| RenderError::InvalidFilterProperty {
        path: format!("order[{}]={}", path, value),
    })?;

    let nulls = match nulls_part {
        None => NullPlacement::default(),
        Some("nulls_first") => NullPlacement::NullsFirst,
        Some("nulls_last") => NullPlacement::NullsLast,
        Some(_) => {
            return Err(RenderError::InvalidFilterProperty {
                path: format!("order[{}]={}", path, value),
            })
        }
    };

    Ok((direction, nulls))
}

/// Resolve a dotted path through relation descriptors to a final scalar
/// field on the (possibly related) resource.
fn resolve_path(
    path: &str,
    meta: &ResourceMetadata,
    registry: &MetadataRegistry,
) -> Result<Vec<String>, RenderError> {
    let mut segments = Vec::new();
    let mut current = meta.clone();
    let parts: Vec<&str> = path.split('.').collect();

    for (i, part) in parts.iter().enumerate() {
        let property =
            current
                .property_named(part)
                .ok_or_else(|| RenderError::InvalidFilterProperty {
                    path: path.to_string(),
                })?;
        segments.push(property.name.clone());

        let last = i == parts.len() - 1;
        match &property.kind {
            PropertyKind::Scalar { .. } | PropertyKind::Enum { .. } => {
                if !last {
                    // Scalar in the middle of a dotted path.
                    return Err(RenderError::InvalidFilterProperty {
                        path: path.to_string(),
                    });
                }
            }
            PropertyKind::Relation { target } | PropertyKind::RelationList { target } => {
                if last {
                    // A relation cannot be the final sort/filter field.
                    return Err(RenderError::InvalidFilterProperty {
                        path: path.to_string(),
                    });
                }
                let next = registry
                    .get(target)
                    .ok_or_else(|| RenderError::InvalidFilterProperty {
                        path: path.to_string(),
                    })?;
                current = (*next).clone();
            }
        }
    }

    Ok(segments)
}

/// FilterExecutor seam: a registered filter applies directives to
/// materialized items.
pub trait Filter: Send + Sync {
    fn apply(
        &self,
        directives: &DirectiveList,
        items: Vec<Value>,
        meta: &ResourceMetadata,
    ) -> Result<Vec<Value>, RenderError>;
}

/// Registered-by-id filter lookup.
#[derive(Default)]
pub struct FilterRegistry {
    filters: std::collections::HashMap<String, Box<dyn Filter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, filter: Box<dyn Filter>) {
        self.filters.insert(id.into(), filter);
    }

    pub fn get(&self, id: &str) -> Option<&dyn Filter> {
        self.filters.get(id).map(|f| f.as_ref())
    }
}

/// Built-in equality + ordering filter over materialized items.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualityFilter;

impl Filter for EqualityFilter {
    fn apply(
        &self,
        directives: &DirectiveList,
        items: Vec<Value>,
        meta: &ResourceMetadata,
    ) -> Result<Vec<Value>, RenderError> {
        apply(directives, items, meta)
    }
}

/// Apply directives to materialized items: equality filtering, then
/// ordering with a stable sort. Ties fall back to the resource's
/// identifier order because the sort is stable over the incoming
/// (identifier-ordered) sequence.
pub fn apply(
    directives: &DirectiveList,
    items: Vec<Value>,
    _meta: &ResourceMetadata,
) -> Result<Vec<Value>, RenderError> {
    let mut items: Vec<Value> = items
        .into_iter()
        .filter(|item| {
            directives
                .filters
                .iter()
                .all(|f| filter_matches(item, f))
        })
        .collect();

    // One stable pass per directive, least significant first, keeps the
    // more significant key dominant while preserving identifier order on
    // full ties.
    for sort in directives.sorts.iter().rev() {
        items.sort_by(|a, b| {
            compare_values(value_at(a, &sort.path), value_at(b, &sort.path), sort)
        });
    }

    Ok(items)
}

fn filter_matches(item: &Value, filter: &FilterDirective) -> bool {
    match value_at(item, &filter.path) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => s == &filter.value,
        Some(other) => other.to_string() == filter.value,
    }
}

fn value_at<'a>(item: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = item;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Compare two optional scalars under a directive. Nulls place first or
/// last per the directive, independent of direction; non-null values
/// compare by the JSON type ladder (bool < number < string), numbers
/// numerically, strings lexicographically.
fn compare_values(
    a: Option<&Value>,
    b: Option<&Value>,
    sort: &SortDirective,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let a_null = matches!(a, None | Some(Value::Null));
    let b_null = matches!(b, None | Some(Value::Null));

    match (a_null, b_null) {
        (true, true) => return Ordering::Equal,
        (true, false) => {
            return match sort.nulls {
                NullPlacement::NullsFirst => Ordering::Less,
                NullPlacement::NullsLast => Ordering::Greater,
            }
        }
        (false, true) => {
            return match sort.nulls {
                NullPlacement::NullsFirst => Ordering::Greater,
                NullPlacement::NullsLast => Ordering::Less,
            }
        }
        (false, false) => {}
    }

    let ordering = scalar_ordering(a.unwrap(), b.unwrap());
    match sort.direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

fn scalar_ordering(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        // Mixed types: rank by the type ladder.
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
