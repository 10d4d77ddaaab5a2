//! Filter compilation for the list endpoint.
//!
//! The backend expects each filtered field to carry an operator-tagged
//! operation string such as `eq.active`. A field that receives more than one
//! operation is promoted from a bare string to an ordered sequence.

use std::fmt;

use serde::ser::SerializeMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Field name to scalar value, in caller insertion order.
pub type FilterSpec = Map<String, Value>;

/// Comparison operator tags understood by the backend filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Is,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::In => "in",
            FilterOperator::Is => "is",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations accumulated for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FilterOps {
    Single(String),
    Many(Vec<String>),
}

impl FilterOps {
    fn push(&mut self, op: String) {
        match self {
            FilterOps::Single(first) => {
                let first = std::mem::take(first);
                *self = FilterOps::Many(vec![first, op]);
            }
            FilterOps::Many(ops) => ops.push(op),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            FilterOps::Single(op) => std::slice::from_ref(op),
            FilterOps::Many(ops) => ops,
        }
    }
}

/// Compiled filter keyed by field name. Serializes as a JSON object whose
/// values are either a string or an array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledFilter(Vec<(String, FilterOps)>);

impl Serialize for CompiledFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, ops) in &self.0 {
            map.serialize_entry(name, ops)?;
        }
        map.end()
    }
}

impl CompiledFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `op` to `field`, promoting a single operation to a sequence.
    pub fn push(&mut self, field: &str, op: String) {
        match self.0.iter_mut().find(|(name, _)| name == field) {
            Some((_, ops)) => ops.push(op),
            None => self.0.push((field.to_string(), FilterOps::Single(op))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FilterOps> {
        self.0.iter().find(|(name, _)| name == field).map(|(_, ops)| ops)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterOps)> {
        self.0.iter().map(|(name, ops)| (name.as_str(), ops))
    }
}

/// Tag every field of `filter` with `operator`.
pub fn compile(filter: &FilterSpec, operator: &str) -> CompiledFilter {
    let mut compiled = CompiledFilter::new();
    for (field, value) in filter {
        compiled.push(field, format!("{operator}.{}", filter_value_text(value)));
    }
    compiled
}

/// Text interpolated after the operator tag. Strings go in bare, arrays are
/// comma-joined, everything else uses its JSON text.
fn filter_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(filter_value_text)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
