//! Data-provider core for the Sandpiper REST API.
//!
//! # Overview
//! Translates generic record-access operations (list, get one/many, get by
//! reference, create, update, delete and their bulk variants) into Sandpiper
//! HTTP requests, and normalizes the JSON responses, pagination totals
//! included, into typed results.
//!
//! # Design
//! - `SandpiperClient` is sans-IO. It builds `HttpRequest` values and parses
//!   `HttpResponse` values, and holds only the resolved API root.
//! - `DataProvider` is the async surface. It drives a `Transport` for the
//!   actual round-trip and fans bulk operations out concurrently.
//! - `filter::compile` turns a flat field/value map into the backend's
//!   operator-tagged filter grammar.
//! - Configuration is injected through `ProviderConfig`; there is no global
//!   base URL.

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod provider;
pub mod query;
pub mod transport;
pub mod types;

pub use client::SandpiperClient;
pub use config::ProviderConfig;
pub use error::ApiError;
pub use filter::{compile, CompiledFilter, FilterOperator, FilterOps, FilterSpec};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use provider::DataProvider;
pub use query::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, Identifier, ListParams, Pagination, Record, Sort, SortOrder, UpdateManyParams,
    UpdateParams,
};
#[cfg(feature = "http-client")]
pub use transport::ReqwestTransport;
pub use transport::Transport;
pub use types::{BulkResultMode, ListResult, ManyResult, RecordResult};
