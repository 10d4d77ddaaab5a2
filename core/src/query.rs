//! Query parameters accepted by each data-provider operation.
//!
//! # Design
//! Params are plain owned structs, one per operation, mirroring the generic
//! record-access interface. Pagination arithmetic and sort serialization live
//! here so both the list and the reference endpoints share them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::filter::FilterSpec;

/// A JSON record as exchanged with the backend.
pub type Record = Map<String, Value>;

/// Opaque record identifier. The backend hands out integers, but any string
/// id is round-tripped as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Int(i64),
    Str(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(id) => write!(f, "{id}"),
            Identifier::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Identifier::Int(id)
    }
}

impl From<i32> for Identifier {
    fn from(id: i32) -> Self {
        Identifier::Int(i64::from(id))
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Identifier::Str(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Identifier::Str(id)
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Self {
        match id {
            Identifier::Int(id) => Value::from(id),
            Identifier::Str(id) => Value::String(id),
        }
    }
}

/// 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.page == 0 {
            return Err(ApiError::InvalidParams("page must be at least 1".to_string()));
        }
        if self.per_page == 0 {
            return Err(ApiError::InvalidParams("perPage must be at least 1".to_string()));
        }
        self.limit().map(|_| ())
    }

    pub fn offset(&self) -> Result<u64, ApiError> {
        self.page
            .checked_sub(1)
            .and_then(|prior| prior.checked_mul(self.per_page))
            .ok_or_else(|| self.out_of_range())
    }

    /// Index of the last row on the page. The backend treats `limit` as an
    /// inclusive bound, so this is one less than `offset + per_page`.
    pub fn limit(&self) -> Result<u64, ApiError> {
        self.page
            .checked_mul(self.per_page)
            .and_then(|end| end.checked_sub(1))
            .ok_or_else(|| self.out_of_range())
    }

    fn out_of_range(&self) -> ApiError {
        ApiError::InvalidParams(format!(
            "page {} of size {} is out of range",
            self.page, self.per_page
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }

    /// `"<field> <asc|desc>"`, the list endpoint's sort grammar.
    pub fn to_query(&self) -> String {
        format!("{} {}", self.field, self.order.as_str().to_lowercase())
    }

    /// `["<field>","<ASC|DESC>"]`, the range endpoint's sort grammar.
    pub fn to_json_array(&self) -> Value {
        Value::Array(vec![
            Value::String(self.field.clone()),
            Value::String(self.order.as_str().to_string()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    pub pagination: Pagination,
    pub sort: Sort,
    pub filter: FilterSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetOneParams {
    pub id: Identifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetManyParams {
    pub ids: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetManyReferenceParams {
    /// Field on `resource` that references the parent record.
    pub target: String,
    pub id: Identifier,
    pub pagination: Pagination,
    pub sort: Sort,
    pub filter: FilterSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateParams {
    pub data: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateParams {
    pub id: Identifier,
    pub data: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateManyParams {
    pub ids: Vec<Identifier>,
    pub data: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteParams {
    pub id: Identifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteManyParams {
    pub ids: Vec<Identifier>,
}
