use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_RANGE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

pub type Record = Map<String, Value>;

/// In-memory collections keyed by resource name, records keyed by id.
#[derive(Debug, Default)]
pub struct Store {
    resources: HashMap<String, BTreeMap<i64, Record>>,
    next_id: i64,
}

impl Store {
    /// Insert `record` under a freshly generated id and return the stored copy.
    pub fn insert(&mut self, resource: &str, mut record: Record) -> Record {
        self.next_id += 1;
        let id = self.next_id;
        record.insert("id".to_string(), Value::from(id));
        self.resources
            .entry(resource.to_string())
            .or_default()
            .insert(id, record.clone());
        record
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with_db(Db::default())
}

pub fn app_with_db(db: Db) -> Router {
    Router::new()
        .route("/v1/{resource}", get(list_records).post(create_record))
        .route(
            "/v1/{resource}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

type ApiFailure = (StatusCode, String);

fn bad_request(msg: impl Into<String>) -> ApiFailure {
    (StatusCode::BAD_REQUEST, msg.into())
}

/// Two query dialects share this route. A `range` parameter selects the
/// reference dialect (JSON filter/sort/range, total in `Content-Range`);
/// otherwise the list dialect applies (compiled filter, `offset`, inclusive
/// `limit`, total in `paging.items_total`).
async fn list_records(
    State(db): State<Db>,
    Path(resource): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiFailure> {
    let records: Vec<Record> = db
        .read()
        .await
        .resources
        .get(&resource)
        .map(|records| records.values().cloned().collect())
        .unwrap_or_default();

    if let Some(range) = params.get("range") {
        debug!(%resource, "range query");
        return range_query(records, &params, range);
    }
    debug!(%resource, "list query");
    list_query(records, &params)
}

fn list_query(mut records: Vec<Record>, params: &HashMap<String, String>) -> Result<Response, ApiFailure> {
    if let Some(filter) = params.get("filter") {
        let filter: Map<String, Value> =
            serde_json::from_str(filter).map_err(|e| bad_request(format!("filter: {e}")))?;
        let mut predicates = Vec::new();
        for (field, ops) in &filter {
            match ops {
                Value::String(op) => predicates.push((field.clone(), parse_op(op)?)),
                Value::Array(ops) => {
                    for op in ops {
                        let op = op
                            .as_str()
                            .ok_or_else(|| bad_request(format!("filter `{field}`: expected strings")))?;
                        predicates.push((field.clone(), parse_op(op)?));
                    }
                }
                _ => return Err(bad_request(format!("filter `{field}`: expected op string"))),
            }
        }
        records.retain(|record| {
            predicates
                .iter()
                .all(|(field, (op, operand))| matches_op(record.get(field), op, operand))
        });
    }

    if let Some(sort) = params.get("sort") {
        let (field, order) = sort.rsplit_once(' ').unwrap_or((sort.as_str(), "asc"));
        sort_records(&mut records, field, order.eq_ignore_ascii_case("desc"));
    }

    let total = records.len();
    let offset = parse_index(params, "offset")?.unwrap_or(0);
    let limit = parse_index(params, "limit")?;
    let page = window(records, offset, limit);

    Ok(Json(json!({
        "data": page,
        "paging": {
            "items_total": total,
            "offset": offset,
            "limit": limit,
        },
    }))
    .into_response())
}

fn range_query(
    mut records: Vec<Record>,
    params: &HashMap<String, String>,
    range: &str,
) -> Result<Response, ApiFailure> {
    if let Some(filter) = params.get("filter") {
        let filter: Map<String, Value> =
            serde_json::from_str(filter).map_err(|e| bad_request(format!("filter: {e}")))?;
        records.retain(|record| {
            filter
                .iter()
                .all(|(field, expected)| record.get(field).is_some_and(|v| loosely_equal(v, expected)))
        });
    }

    if let Some(sort) = params.get("sort") {
        let (field, order): (String, String) =
            serde_json::from_str(sort).map_err(|e| bad_request(format!("sort: {e}")))?;
        sort_records(&mut records, &field, order.eq_ignore_ascii_case("desc"));
    }

    let (start, end): (usize, usize) =
        serde_json::from_str(range).map_err(|e| bad_request(format!("range: {e}")))?;
    let total = records.len();
    let page = window(records, start, Some(end));
    let content_range = if page.is_empty() {
        format!("items */{total}")
    } else {
        format!("items {start}-{}/{total}", start + page.len() - 1)
    };

    Ok(([(CONTENT_RANGE, content_range)], Json(page)).into_response())
}

fn parse_index(params: &HashMap<String, String>, key: &str) -> Result<Option<usize>, ApiFailure> {
    params
        .get(key)
        .map(|v| v.parse().map_err(|_| bad_request(format!("{key} must be a non-negative integer"))))
        .transpose()
}

/// Rows `start..=end`; `end` is an inclusive index.
fn window(records: Vec<Record>, start: usize, end: Option<usize>) -> Vec<Record> {
    let take = match end {
        Some(end) if end < start => 0,
        Some(end) => (end - start).saturating_add(1),
        None => usize::MAX,
    };
    records.into_iter().skip(start).take(take).collect()
}

fn parse_op(op: &str) -> Result<(String, String), ApiFailure> {
    let (tag, operand) = op
        .split_once('.')
        .ok_or_else(|| bad_request(format!("malformed filter operation `{op}`")))?;
    match tag {
        "eq" | "neq" | "gt" | "gte" | "lt" | "lte" | "like" | "ilike" => {
            Ok((tag.to_string(), operand.to_string()))
        }
        other => Err(bad_request(format!("unsupported filter operator `{other}`"))),
    }
}

fn matches_op(value: Option<&Value>, op: &str, operand: &str) -> bool {
    let text = value.map(value_text).unwrap_or_else(|| "null".to_string());
    let ordering = match (text.parse::<f64>(), operand.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(text.as_str().cmp(operand)),
    };
    match op {
        "eq" => text == operand,
        "neq" => text != operand,
        "gt" => ordering == Some(Ordering::Greater),
        "gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        "lt" => ordering == Some(Ordering::Less),
        "lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        "like" => like(&text, operand),
        "ilike" => like(&text.to_lowercase(), &operand.to_lowercase()),
        _ => false,
    }
}

/// SQL-style match where `%` or `*` stand for any run of characters.
fn like(text: &str, pattern: &str) -> bool {
    let pattern = pattern.replace('*', "%");
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || text.len() < first.len() + last.len() || !text.ends_with(last) {
        return false;
    }
    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers compare numerically, strings compare against their text so an id
/// sent as `"7"` still matches `7`.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    actual == expected || value_text(actual) == value_text(expected)
}

fn sort_records(records: &mut [Record], field: &str, descending: bool) {
    records.sort_by(|a, b| {
        let ordering = compare_values(a.get(field), b.get(field));
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(a), Some(b)) => value_text(a).cmp(&value_text(b)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

async fn create_record(
    State(db): State<Db>,
    Path(resource): Path<String>,
    Json(input): Json<Record>,
) -> (StatusCode, Json<Record>) {
    let record = db.write().await.insert(&resource, input);
    (StatusCode::CREATED, Json(record))
}

async fn get_record(
    State(db): State<Db>,
    Path((resource, id)): Path<(String, i64)>,
) -> Result<Json<Record>, StatusCode> {
    let store = db.read().await;
    store
        .resources
        .get(&resource)
        .and_then(|records| records.get(&id))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Full replacement; the path id wins over any `id` in the body.
async fn update_record(
    State(db): State<Db>,
    Path((resource, id)): Path<(String, i64)>,
    Json(mut input): Json<Record>,
) -> Result<Json<Record>, StatusCode> {
    let mut store = db.write().await;
    let record = store
        .resources
        .get_mut(&resource)
        .and_then(|records| records.get_mut(&id))
        .ok_or(StatusCode::NOT_FOUND)?;
    input.insert("id".to_string(), Value::from(id));
    *record = input;
    Ok(Json(record.clone()))
}

async fn delete_record(
    State(db): State<Db>,
    Path((resource, id)): Path<(String, i64)>,
) -> Result<Json<Record>, StatusCode> {
    let mut store = db.write().await;
    store
        .resources
        .get_mut(&resource)
        .and_then(|records| records.remove(&id))
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
