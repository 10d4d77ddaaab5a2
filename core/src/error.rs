//! Error types for the Sandpiper data provider.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the record does not exist" from "the server returned an unexpected
//! status." All other non-2xx responses land in `HttpError` with the raw
//! status code and body for debugging.
//!
//! Missing pagination metadata is reported through `MissingField` and
//! `MissingHeader` so a backend that omits totals yields a catchable error
//! instead of a bogus count.

use thiserror::Error;

/// Errors returned by `SandpiperClient` and `DataProvider`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (connect, TLS, I/O failure).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server returned 404 — the requested record does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body is not JSON, or not the JSON shape expected.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// A field the decoder depends on is absent from the response body.
    #[error("response is missing field `{0}`")]
    MissingField(&'static str),

    /// A header the decoder depends on is absent from the response.
    #[error("response is missing header `{0}`")]
    MissingHeader(&'static str),

    /// A header is present but its value cannot be interpreted.
    #[error("invalid `{name}` header: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// Operation parameters violate their constraints.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    pub(crate) fn deserialization(err: serde_json::Error) -> Self {
        ApiError::DeserializationError(err.to_string())
    }

    pub(crate) fn serialization(err: serde_json::Error) -> Self {
        ApiError::SerializationError(err.to_string())
    }
}
