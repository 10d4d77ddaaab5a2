//! Stateless HTTP request builder and response parser for the Sandpiper API.
//!
//! # Design
//! `SandpiperClient` holds only the resolved API root and the bulk result mode,
//! and carries no mutable state between calls. Each operation is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`. The caller (usually `DataProvider`) executes the
//! HTTP round-trip, keeping this layer deterministic and free of I/O.
//!
//! Two query grammars coexist on purpose. The list endpoint receives a
//! compiled, operator-tagged filter plus `offset`/`limit`; the reference
//! endpoint receives the raw filter merged with the reference constraint plus
//! a JSON `range`. They are kept as separate paths.

use serde_json::Value;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ApiError;
use crate::filter::{self, FilterOperator};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, Identifier, ListParams, Record, UpdateManyParams, UpdateParams,
};
use crate::types::{BulkResultMode, ListResult, ManyResult, RecordResult};

const CONTENT_RANGE: &str = "content-range";

/// Synchronous, stateless client for the Sandpiper API.
///
/// Builds `HttpRequest` values and parses `HttpResponse` values without
/// touching the network.
#[derive(Debug, Clone)]
pub struct SandpiperClient {
    root: Url,
    bulk_result_mode: BulkResultMode,
}

impl SandpiperClient {
    /// Resolve `<base_url>/<api_version>` once, up front.
    pub fn new(config: &ProviderConfig) -> Result<Self, ApiError> {
        let mut root = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidConfig(format!("base url {:?}: {e}", config.base_url)))?;
        {
            let mut segments = root.path_segments_mut().map_err(|_| {
                ApiError::InvalidConfig(format!("base url {:?} cannot be a base", config.base_url))
            })?;
            segments.pop_if_empty();
            segments.extend(config.api_version.split('/').filter(|s| !s.is_empty()));
        }
        Ok(Self {
            root,
            bulk_result_mode: config.bulk_result_mode,
        })
    }

    /// API root every resource path hangs off, without a trailing slash.
    pub fn root(&self) -> &str {
        self.root.as_str()
    }

    pub fn bulk_result_mode(&self) -> BulkResultMode {
        self.bulk_result_mode
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// `GET /<resource>?filter=..&limit=..&offset=..&sort=..`
    pub fn build_list(&self, resource: &str, params: &ListParams) -> Result<HttpRequest, ApiError> {
        params.pagination.validate()?;
        let compiled = filter::compile(&params.filter, FilterOperator::Eq.as_str());
        let filter = serde_json::to_string(&compiled).map_err(ApiError::serialization)?;

        let mut url = self.endpoint(&[resource]);
        url.query_pairs_mut()
            .append_pair("filter", &filter)
            .append_pair("limit", &params.pagination.limit()?.to_string())
            .append_pair("offset", &params.pagination.offset()?.to_string())
            .append_pair("sort", &params.sort.to_query());
        Ok(get(url))
    }

    pub fn build_get_one(&self, resource: &str, params: &GetOneParams) -> HttpRequest {
        get(self.item(resource, &params.id))
    }

    /// One GET per id; the backend has no multi-id route.
    pub fn build_get_many(&self, resource: &str, params: &GetManyParams) -> Vec<HttpRequest> {
        params.ids.iter().map(|id| get(self.item(resource, id))).collect()
    }

    /// `GET /<resource>?filter=..&range=..&sort=..`
    ///
    /// The filter is sent raw, not through the filter compiler, with the
    /// reference constraint `{target: id}` merged over it.
    pub fn build_get_many_reference(
        &self,
        resource: &str,
        params: &GetManyReferenceParams,
    ) -> Result<HttpRequest, ApiError> {
        params.pagination.validate()?;
        let mut filter = params.filter.clone();
        filter.insert(params.target.clone(), params.id.clone().into());

        let range = [params.pagination.offset()?, params.pagination.limit()?];
        let filter = serde_json::to_string(&filter).map_err(ApiError::serialization)?;
        let range = serde_json::to_string(&range).map_err(ApiError::serialization)?;
        let sort = serde_json::to_string(&params.sort.to_json_array())
            .map_err(ApiError::serialization)?;

        let mut url = self.endpoint(&[resource]);
        url.query_pairs_mut()
            .append_pair("filter", &filter)
            .append_pair("range", &range)
            .append_pair("sort", &sort);
        Ok(get(url))
    }

    pub fn build_create(&self, resource: &str, params: &CreateParams) -> Result<HttpRequest, ApiError> {
        with_json_body(HttpMethod::Post, self.endpoint(&[resource]), &params.data)
    }

    pub fn build_update(&self, resource: &str, params: &UpdateParams) -> Result<HttpRequest, ApiError> {
        with_json_body(HttpMethod::Put, self.item(resource, &params.id), &params.data)
    }

    /// One PUT per id, each carrying the same payload.
    pub fn build_update_many(
        &self,
        resource: &str,
        params: &UpdateManyParams,
    ) -> Result<Vec<HttpRequest>, ApiError> {
        let body = serde_json::to_string(&params.data).map_err(ApiError::serialization)?;
        Ok(params
            .ids
            .iter()
            .map(|id| HttpRequest {
                method: HttpMethod::Put,
                url: self.item(resource, id).into(),
                headers: json_headers(),
                body: Some(body.clone()),
            })
            .collect())
    }

    pub fn build_delete(&self, resource: &str, params: &DeleteParams) -> HttpRequest {
        delete(self.item(resource, &params.id))
    }

    pub fn build_delete_many(&self, resource: &str, params: &DeleteManyParams) -> Vec<HttpRequest> {
        params.ids.iter().map(|id| delete(self.item(resource, id))).collect()
    }

    // -----------------------------------------------------------------------
    // Parse
    // -----------------------------------------------------------------------

    /// Body is `{"data": [...], "paging": {"items_total": N}}`.
    pub fn parse_list(&self, response: HttpResponse) -> Result<ListResult, ApiError> {
        check_status(&response)?;
        let mut body = decode_object(&response)?;
        let total = body
            .get("paging")
            .ok_or(ApiError::MissingField("paging"))?
            .get("items_total")
            .ok_or(ApiError::MissingField("items_total"))
            .and_then(parse_total)?;
        let data = body.remove("data").ok_or(ApiError::MissingField("data"))?;
        Ok(ListResult {
            data: decode_records(data)?,
            total,
        })
    }

    pub fn parse_get_one(&self, response: HttpResponse) -> Result<RecordResult, ApiError> {
        check_status(&response)?;
        Ok(RecordResult {
            data: decode_object(&response)?,
        })
    }

    /// Decode the fan-out responses of GetMany, in request order.
    pub fn parse_get_many(&self, responses: Vec<HttpResponse>) -> Result<ManyResult, ApiError> {
        let data = responses
            .into_iter()
            .map(|response| self.parse_many_item(response))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ManyResult { data })
    }

    /// Body is a bare array; the total comes from `Content-Range: items 0-9/42`.
    pub fn parse_get_many_reference(&self, response: HttpResponse) -> Result<ListResult, ApiError> {
        check_status(&response)?;
        let header = response
            .header(CONTENT_RANGE)
            .ok_or(ApiError::MissingHeader(CONTENT_RANGE))?;
        let total = parse_content_range(header)?;
        let body: Value = serde_json::from_str(&response.body).map_err(ApiError::deserialization)?;
        Ok(ListResult {
            data: decode_records(body)?,
            total,
        })
    }

    /// The backend answers with at least the generated `id`; the result is
    /// the submitted data with that id attached.
    pub fn parse_create(
        &self,
        params: &CreateParams,
        response: HttpResponse,
    ) -> Result<RecordResult, ApiError> {
        check_status(&response)?;
        let body = decode_object(&response)?;
        let id = body.get("id").ok_or(ApiError::MissingField("id"))?;
        let mut data = params.data.clone();
        data.insert("id".to_string(), id.clone());
        Ok(RecordResult { data })
    }

    pub fn parse_update(&self, response: HttpResponse) -> Result<RecordResult, ApiError> {
        check_status(&response)?;
        Ok(RecordResult {
            data: decode_object(&response)?,
        })
    }

    pub fn parse_update_many(&self, responses: Vec<HttpResponse>) -> Result<ManyResult, ApiError> {
        let data = responses
            .into_iter()
            .map(|response| self.parse_many_item(response))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ManyResult { data })
    }

    /// A 2xx with an empty body yields `{"id": <deleted id>}`.
    pub fn parse_delete(
        &self,
        params: &DeleteParams,
        response: HttpResponse,
    ) -> Result<RecordResult, ApiError> {
        check_status(&response)?;
        Ok(RecordResult {
            data: decode_deleted(&params.id, &response)?,
        })
    }

    /// `responses` must be in the same order as `params.ids`.
    pub fn parse_delete_many(
        &self,
        params: &DeleteManyParams,
        responses: Vec<HttpResponse>,
    ) -> Result<ManyResult, ApiError> {
        if responses.len() != params.ids.len() {
            return Err(ApiError::InvalidParams(format!(
                "expected {} responses, got {}",
                params.ids.len(),
                responses.len()
            )));
        }
        let data = params
            .ids
            .iter()
            .zip(responses)
            .map(|(id, response)| self.parse_delete_many_item(id, response))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ManyResult { data })
    }

    /// Decode one GetMany/UpdateMany sub-response according to the bulk mode.
    pub fn parse_many_item(&self, response: HttpResponse) -> Result<Value, ApiError> {
        check_status(&response)?;
        self.bulk_item(decode_object(&response)?)
    }

    /// Decode one DeleteMany sub-response according to the bulk mode.
    pub fn parse_delete_many_item(
        &self,
        id: &Identifier,
        response: HttpResponse,
    ) -> Result<Value, ApiError> {
        check_status(&response)?;
        self.bulk_item(decode_deleted(id, &response)?)
    }

    fn bulk_item(&self, record: Record) -> Result<Value, ApiError> {
        match self.bulk_result_mode {
            BulkResultMode::Records => Ok(Value::Object(record)),
            BulkResultMode::Ids => record.get("id").cloned().ok_or(ApiError::MissingField("id")),
        }
    }

    // -----------------------------------------------------------------------
    // URLs
    // -----------------------------------------------------------------------

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.root.clone();
        // `new` rejected cannot-be-a-base roots, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn item(&self, resource: &str, id: &Identifier) -> Url {
        self.endpoint(&[resource, &id.to_string()])
    }
}

fn json_headers() -> Vec<(String, String)> {
    vec![("content-type".to_string(), "application/json".to_string())]
}

fn get(url: Url) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Get,
        url: url.into(),
        headers: Vec::new(),
        body: None,
    }
}

fn delete(url: Url) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Delete,
        url: url.into(),
        headers: Vec::new(),
        body: None,
    }
}

fn with_json_body(method: HttpMethod, url: Url, data: &Record) -> Result<HttpRequest, ApiError> {
    let body = serde_json::to_string(data).map_err(ApiError::serialization)?;
    Ok(HttpRequest {
        method,
        url: url.into(),
        headers: json_headers(),
        body: Some(body),
    })
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}

fn decode_object(response: &HttpResponse) -> Result<Record, ApiError> {
    match serde_json::from_str(&response.body).map_err(ApiError::deserialization)? {
        Value::Object(record) => Ok(record),
        other => Err(ApiError::DeserializationError(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn decode_records(value: Value) -> Result<Vec<Record>, ApiError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ApiError::DeserializationError(format!(
                "expected a JSON array of records, got {}",
                json_kind(&other)
            )))
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(ApiError::DeserializationError(format!(
                "expected a record object, got {}",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn decode_deleted(id: &Identifier, response: &HttpResponse) -> Result<Record, ApiError> {
    if response.body.trim().is_empty() {
        let mut record = Record::new();
        record.insert("id".to_string(), id.clone().into());
        return Ok(record);
    }
    decode_object(response)
}

/// `items_total` may arrive as a number or a numeric string.
fn parse_total(value: &Value) -> Result<u64, ApiError> {
    let total = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    total.ok_or_else(|| {
        ApiError::DeserializationError(format!("items_total is not a non-negative integer: {value}"))
    })
}

/// Whole, non-negative floats such as `57.0` count as integer totals.
fn integral(value: f64) -> Option<u64> {
    (value.fract() == 0.0 && value >= 0.0 && value < u64::MAX as f64).then_some(value as u64)
}

/// Numeric suffix after the final `/`, e.g. `items 0-9/42` → 42.
fn parse_content_range(value: &str) -> Result<u64, ApiError> {
    value
        .rsplit('/')
        .next()
        .and_then(|total| total.trim().parse().ok())
        .ok_or_else(|| ApiError::InvalidHeader {
            name: CONTENT_RANGE,
            value: value.to_string(),
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
