//! Async, caller-facing data provider.
//!
//! `DataProvider` pairs a `SandpiperClient` with a `Transport`: every
//! operation builds its request descriptor, awaits exactly one round-trip (or
//! one per id for the bulk operations) and decodes the response. It keeps no
//! state between calls beyond its configuration.

use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::client::SandpiperClient;
use crate::config::ProviderConfig;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::query::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, ListParams, UpdateManyParams, UpdateParams,
};
use crate::transport::Transport;
use crate::types::{ListResult, ManyResult, RecordResult};

/// The nine record-access operations over one backend and one transport.
#[derive(Debug, Clone)]
pub struct DataProvider<T> {
    client: SandpiperClient,
    transport: T,
}

impl<T: Transport> DataProvider<T> {
    pub fn new(config: &ProviderConfig, transport: T) -> Result<Self, ApiError> {
        Ok(Self {
            client: SandpiperClient::new(config)?,
            transport,
        })
    }

    pub fn client(&self) -> &SandpiperClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn list(&self, resource: &str, params: &ListParams) -> Result<ListResult, ApiError> {
        let result = async {
            let request = self.client.build_list(resource, params)?;
            let response = self.dispatch(request).await?;
            self.client.parse_list(response)
        }
        .await;
        log_failure("list", resource, result)
    }

    pub async fn get_one(&self, resource: &str, params: &GetOneParams) -> Result<RecordResult, ApiError> {
        let request = self.client.build_get_one(resource, params);
        let result = async {
            let response = self.dispatch(request).await?;
            self.client.parse_get_one(response)
        }
        .await;
        log_failure("get_one", resource, result)
    }

    /// Fans out one GET per id. Results follow `params.ids` order; the first
    /// failing sub-request fails the whole call.
    pub async fn get_many(&self, resource: &str, params: &GetManyParams) -> Result<ManyResult, ApiError> {
        let requests = self.client.build_get_many(resource, params);
        let result = try_join_all(requests.into_iter().map(|request| async move {
            let response = self.dispatch(request).await?;
            self.client.parse_many_item(response)
        }))
        .await
        .map(|data| ManyResult { data });
        log_failure("get_many", resource, result)
    }

    pub async fn get_many_reference(
        &self,
        resource: &str,
        params: &GetManyReferenceParams,
    ) -> Result<ListResult, ApiError> {
        let result = async {
            let request = self.client.build_get_many_reference(resource, params)?;
            let response = self.dispatch(request).await?;
            self.client.parse_get_many_reference(response)
        }
        .await;
        log_failure("get_many_reference", resource, result)
    }

    pub async fn create(&self, resource: &str, params: &CreateParams) -> Result<RecordResult, ApiError> {
        let result = async {
            let request = self.client.build_create(resource, params)?;
            let response = self.dispatch(request).await?;
            self.client.parse_create(params, response)
        }
        .await;
        log_failure("create", resource, result)
    }

    pub async fn update(&self, resource: &str, params: &UpdateParams) -> Result<RecordResult, ApiError> {
        let result = async {
            let request = self.client.build_update(resource, params)?;
            let response = self.dispatch(request).await?;
            self.client.parse_update(response)
        }
        .await;
        log_failure("update", resource, result)
    }

    /// Fans out one PUT per id with the same payload.
    pub async fn update_many(
        &self,
        resource: &str,
        params: &UpdateManyParams,
    ) -> Result<ManyResult, ApiError> {
        let result = async {
            let requests = self.client.build_update_many(resource, params)?;
            let data = try_join_all(requests.into_iter().map(|request| async move {
                let response = self.dispatch(request).await?;
                self.client.parse_many_item(response)
            }))
            .await?;
            Ok::<_, ApiError>(ManyResult { data })
        }
        .await;
        log_failure("update_many", resource, result)
    }

    pub async fn delete(&self, resource: &str, params: &DeleteParams) -> Result<RecordResult, ApiError> {
        let request = self.client.build_delete(resource, params);
        let result = async {
            let response = self.dispatch(request).await?;
            self.client.parse_delete(params, response)
        }
        .await;
        log_failure("delete", resource, result)
    }

    /// Fans out one DELETE per id.
    pub async fn delete_many(
        &self,
        resource: &str,
        params: &DeleteManyParams,
    ) -> Result<ManyResult, ApiError> {
        let requests = self.client.build_delete_many(resource, params);
        let result = try_join_all(params.ids.iter().zip(requests).map(|(id, request)| async move {
            let response = self.dispatch(request).await?;
            self.client.parse_delete_many_item(id, response)
        }))
        .await
        .map(|data| ManyResult { data });
        log_failure("delete_many", resource, result)
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = %request.method, url = %request.url, "dispatching request");
        let response = self.transport.perform(request).await?;
        debug!(status = response.status, "received response");
        Ok(response)
    }
}

fn log_failure<R>(operation: &str, resource: &str, result: Result<R, ApiError>) -> Result<R, ApiError> {
    if let Err(e) = &result {
        warn!(operation, resource, error = %e, "operation failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::filter::FilterSpec;
    use crate::http::HttpMethod;
    use crate::query::{Pagination, Record, Sort, SortOrder};
    use crate::types::BulkResultMode;

    const BASE_URL: &str = "http://backend.test";

    /// Canned response per URL, optionally delayed to control completion
    /// order. Unknown URLs answer 404.
    #[derive(Default)]
    struct ScriptedTransport {
        routes: HashMap<String, (Duration, HttpResponse)>,
        requests: Mutex<Vec<HttpRequest>>,
        completed: Mutex<Vec<String>>,
        in_flight_peak: AtomicUsize,
        in_flight: AtomicUsize,
    }

    impl ScriptedTransport {
        fn route(mut self, path: &str, delay_ms: u64, status: u16, body: &str) -> Self {
            self.routes.insert(
                format!("{BASE_URL}/v1{path}"),
                (
                    Duration::from_millis(delay_ms),
                    HttpResponse {
                        status,
                        headers: Vec::new(),
                        body: body.to_string(),
                    },
                ),
            );
            self
        }

        fn route_with_header(mut self, path: &str, header: (&str, &str), body: &str) -> Self {
            self.routes.insert(
                format!("{BASE_URL}/v1{path}"),
                (
                    Duration::ZERO,
                    HttpResponse {
                        status: 200,
                        headers: vec![(header.0.to_string(), header.1.to_string())],
                        body: body.to_string(),
                    },
                ),
            );
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn completed(&self) -> Vec<String> {
            self.completed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn perform(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.in_flight_peak.fetch_max(now, Ordering::SeqCst);

            let (delay, response) = self.routes.get(&request.url).cloned().unwrap_or((
                Duration::ZERO,
                HttpResponse {
                    status: 404,
                    headers: Vec::new(),
                    body: String::new(),
                },
            ));
            tokio::time::sleep(delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completed.lock().unwrap().push(request.url.clone());
            Ok(response)
        }
    }

    /// Fails every request at the transport level.
    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn perform(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            Err(ApiError::Transport(format!("connection refused: {}", request.url)))
        }
    }

    fn provider(transport: ScriptedTransport) -> DataProvider<ScriptedTransport> {
        DataProvider::new(&ProviderConfig::new(BASE_URL), transport).unwrap()
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn list_decodes_page_and_total() {
        let p = provider(ScriptedTransport::default().route(
            "/users?filter=%7B%22role%22%3A%22eq.admin%22%7D&limit=9&offset=0&sort=name+desc",
            0,
            200,
            r#"{"data":[{"id":1,"role":"admin"}],"paging":{"items_total":57}}"#,
        ));
        let params = ListParams {
            pagination: Pagination::new(1, 10),
            sort: Sort::new("name", SortOrder::Desc),
            filter: record(json!({"role": "admin"})),
        };

        let result = p.list("users", &params).await.unwrap();
        assert_eq!(result.total, 57);
        assert_eq!(result.data.len(), 1);
        assert_eq!(p.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn get_many_returns_input_order_despite_completion_order() {
        let p = provider(
            ScriptedTransport::default()
                .route("/users/1", 60, 200, r#"{"id":1,"name":"a"}"#)
                .route("/users/2", 30, 200, r#"{"id":2,"name":"b"}"#)
                .route("/users/3", 0, 200, r#"{"id":3,"name":"c"}"#),
        );
        let params = GetManyParams {
            ids: vec![1.into(), 2.into(), 3.into()],
        };

        let result = p.get_many("users", &params).await.unwrap();

        let ids: Vec<Value> = result.data.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(result.data[0], json!({"id": 1, "name": "a"}));

        let completed = p.transport().completed();
        assert_eq!(completed[0], format!("{BASE_URL}/v1/users/3"));
        assert_eq!(p.transport().in_flight_peak.load(Ordering::SeqCst), 3);
        assert!(p
            .transport()
            .requests()
            .iter()
            .all(|r| r.method == HttpMethod::Get && r.body.is_none()));
    }

    #[tokio::test]
    async fn get_many_in_ids_mode_returns_bare_ids() {
        let transport = ScriptedTransport::default()
            .route("/users/1", 0, 200, r#"{"id":1,"name":"a"}"#)
            .route("/users/2", 0, 200, r#"{"id":2,"name":"b"}"#);
        let config = ProviderConfig::new(BASE_URL).with_bulk_result_mode(BulkResultMode::Ids);
        let p = DataProvider::new(&config, transport).unwrap();

        let result = p
            .get_many("users", &GetManyParams { ids: vec![1.into(), 2.into()] })
            .await
            .unwrap();
        assert_eq!(result.data, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn get_many_with_no_ids_sends_nothing() {
        let p = provider(ScriptedTransport::default());
        let result = p.get_many("users", &GetManyParams { ids: Vec::new() }).await.unwrap();
        assert!(result.data.is_empty());
        assert!(p.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn delete_many_fails_whole_operation_on_one_failure() {
        let p = provider(
            ScriptedTransport::default()
                .route("/users/1", 0, 200, r#"{"id":1}"#)
                .route("/users/2", 0, 500, "boom")
                .route("/users/3", 0, 200, r#"{"id":3}"#),
        );
        let params = DeleteManyParams {
            ids: vec![1.into(), 2.into(), 3.into()],
        };

        let err = p.delete_many("users", &params).await.unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 500, .. }));
    }

    #[tokio::test]
    async fn get_many_reference_reads_header_total() {
        let p = provider(ScriptedTransport::default().route_with_header(
            "/comments?filter=%7B%22post_id%22%3A7%7D&range=%5B0%2C9%5D&sort=%5B%22id%22%2C%22ASC%22%5D",
            ("Content-Range", "items 0-9/42"),
            r#"[{"id":1,"post_id":7}]"#,
        ));
        let params = GetManyReferenceParams {
            target: "post_id".to_string(),
            id: 7.into(),
            pagination: Pagination::new(1, 10),
            sort: Sort::new("id", SortOrder::Asc),
            filter: FilterSpec::new(),
        };

        let result = p.get_many_reference("comments", &params).await.unwrap();
        assert_eq!(result.total, 42);
        assert_eq!(result.data[0]["post_id"], 7);
    }

    #[tokio::test]
    async fn create_merges_generated_id() {
        let p = provider(ScriptedTransport::default().route("/users", 0, 201, r#"{"id":99}"#));
        let params = CreateParams {
            data: record(json!({"name": "x"})),
        };

        let result = p.create("users", &params).await.unwrap();
        assert_eq!(Value::Object(result.data), json!({"name": "x", "id": 99}));

        let sent = p.transport().requests();
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"name":"x"}"#));
    }

    #[tokio::test]
    async fn update_round_trips_body_and_response() {
        let response_body = r#"{"id":5,"name":"y","updated_at":"2024-01-01"}"#;
        let p = provider(ScriptedTransport::default().route("/users/5", 0, 200, response_body));
        let data = record(json!({"id": 5, "name": "y"}));
        let params = UpdateParams {
            id: 5.into(),
            data: data.clone(),
        };

        let result = p.update("users", &params).await.unwrap();
        assert_eq!(result.data, serde_json::from_str::<Record>(response_body).unwrap());

        let sent: Record =
            serde_json::from_str(p.transport().requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, data);
    }

    #[tokio::test]
    async fn update_many_sends_same_payload_to_every_id() {
        let p = provider(
            ScriptedTransport::default()
                .route("/users/1", 10, 200, r#"{"id":1,"active":false}"#)
                .route("/users/2", 0, 200, r#"{"id":2,"active":false}"#),
        );
        let params = UpdateManyParams {
            ids: vec![1.into(), 2.into()],
            data: record(json!({"active": false})),
        };

        let result = p.update_many("users", &params).await.unwrap();
        assert_eq!(result.data[0]["id"], 1);
        assert_eq!(result.data[1]["id"], 2);
        for request in p.transport().requests() {
            assert_eq!(request.method, HttpMethod::Put);
            assert_eq!(request.body.as_deref(), Some(r#"{"active":false}"#));
        }
    }

    #[tokio::test]
    async fn get_one_and_delete_return_body() {
        let p = provider(
            ScriptedTransport::default().route("/users/4", 0, 200, r#"{"id":4,"name":"d"}"#),
        );
        let one = p.get_one("users", &GetOneParams { id: 4.into() }).await.unwrap();
        assert_eq!(one.data["name"], "d");

        let deleted = p.delete("users", &DeleteParams { id: 4.into() }).await.unwrap();
        assert_eq!(deleted.data["id"], 4);
        assert_eq!(p.transport().requests()[1].method, HttpMethod::Delete);
    }

    #[tokio::test]
    async fn transport_errors_surface_unchanged() {
        let p = DataProvider::new(&ProviderConfig::new(BASE_URL), Offline).unwrap();
        let err = p.get_one("users", &GetOneParams { id: 1.into() }).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));

        let err = p
            .update_many(
                "users",
                &UpdateManyParams {
                    ids: vec![1.into()],
                    data: Record::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let p = provider(ScriptedTransport::default());
        let err = p.get_one("users", &GetOneParams { id: 404.into() }).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }
}
