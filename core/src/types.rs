//! Normalized result shapes returned to callers.
//!
//! # Design
//! Each operation kind gets its own result type instead of a single dynamic
//! payload. The response decoders in `client` check the backend's JSON
//! against these shapes at the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::Record;

/// One page of records plus the size of the full matching set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub data: Vec<Record>,
    pub total: u64,
}

/// A single record (GetOne, Create, Update, Delete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    pub data: Record,
}

/// Output of a bulk fan-out, in input id order. Holds full records or bare
/// ids depending on `BulkResultMode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManyResult {
    pub data: Vec<Value>,
}

/// What the bulk operations (GetMany, UpdateMany, DeleteMany) return per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkResultMode {
    /// Each response's full parsed record.
    #[default]
    Records,
    /// Only each response's `id` field.
    Ids,
}
