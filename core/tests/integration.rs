//! Full provider lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then exercises every
//! `DataProvider` operation over real HTTP through `ReqwestTransport`.
//! Validates that request building and response decoding agree with a
//! server implementing the same wire contract.

use sandpiper_core::{
    ApiError, BulkResultMode, CreateParams, DataProvider, DeleteManyParams, DeleteParams,
    GetManyParams, GetManyReferenceParams, GetOneParams, Identifier, ListParams, Pagination,
    ProviderConfig, Record, ReqwestTransport, Sort, SortOrder, UpdateManyParams, UpdateParams,
};
use serde_json::{json, Value};

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { mock_server::run(listener).await });
    format!("http://{addr}")
}

fn provider(base_url: &str, mode: BulkResultMode) -> DataProvider<ReqwestTransport> {
    let config = ProviderConfig::new(base_url).with_bulk_result_mode(mode);
    DataProvider::new(&config, ReqwestTransport::new().unwrap()).unwrap()
}

fn id_of(record: &Record) -> Identifier {
    serde_json::from_value(record["id"].clone()).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_lifecycle() {
    let base_url = start_server().await;
    let p = provider(&base_url, BulkResultMode::Records);

    // Step 1: list — should be empty.
    let page = p
        .list(
            "posts",
            &ListParams {
                pagination: Pagination::new(1, 10),
                sort: Sort::new("id", SortOrder::Asc),
                filter: Record::new(),
            },
        )
        .await
        .unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.total, 0);

    // Step 2: create three posts.
    let mut posts = Vec::new();
    for (title, author) in [("alpha", "ana"), ("beta", "bo"), ("gamma", "ana")] {
        let created = p
            .create(
                "posts",
                &CreateParams {
                    data: record(json!({"title": title, "author": author})),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.data["title"], title);
        assert!(created.data.contains_key("id"));
        posts.push(created.data);
    }

    // Step 3: list with an equality filter and descending sort.
    let page = p
        .list(
            "posts",
            &ListParams {
                pagination: Pagination::new(1, 10),
                sort: Sort::new("title", SortOrder::Desc),
                filter: record(json!({"author": "ana"})),
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    let titles: Vec<&Value> = page.data.iter().map(|r| &r["title"]).collect();
    assert_eq!(titles, [&json!("gamma"), &json!("alpha")]);

    // Step 4: second page of size one; total still counts every match.
    let page = p
        .list(
            "posts",
            &ListParams {
                pagination: Pagination::new(2, 1),
                sort: Sort::new("id", SortOrder::Asc),
                filter: Record::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0]["title"], "beta");

    // Step 5: get one.
    let alpha_id = id_of(&posts[0]);
    let fetched = p
        .get_one("posts", &GetOneParams { id: alpha_id.clone() })
        .await
        .unwrap();
    assert_eq!(fetched.data, posts[0]);

    // Step 6: get many, in request order.
    let ids: Vec<Identifier> = posts.iter().rev().map(id_of).collect();
    let many = p
        .get_many("posts", &GetManyParams { ids: ids.clone() })
        .await
        .unwrap();
    let titles: Vec<&Value> = many.data.iter().map(|r| &r["title"]).collect();
    assert_eq!(titles, [&json!("gamma"), &json!("beta"), &json!("alpha")]);

    // Step 7: comments referencing alpha, through the range endpoint.
    let alpha_key = posts[0]["id"].clone();
    for body in ["first", "second", "third"] {
        p.create(
            "comments",
            &CreateParams {
                data: record(json!({"post_id": alpha_key, "body": body, "status": "approved"})),
            },
        )
        .await
        .unwrap();
    }
    p.create(
        "comments",
        &CreateParams {
            data: record(json!({"post_id": alpha_key, "body": "spam", "status": "pending"})),
        },
    )
    .await
    .unwrap();

    let comments = p
        .get_many_reference(
            "comments",
            &GetManyReferenceParams {
                target: "post_id".to_string(),
                id: alpha_id.clone(),
                pagination: Pagination::new(1, 2),
                sort: Sort::new("body", SortOrder::Asc),
                filter: record(json!({"status": "approved"})),
            },
        )
        .await
        .unwrap();
    assert_eq!(comments.total, 3);
    let bodies: Vec<&Value> = comments.data.iter().map(|r| &r["body"]).collect();
    assert_eq!(bodies, [&json!("first"), &json!("second")]);

    // Step 8: update sends the record and returns the server's copy.
    let updated = p
        .update(
            "posts",
            &UpdateParams {
                id: alpha_id.clone(),
                data: record(json!({"title": "alpha v2", "author": "ana"})),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.data["title"], "alpha v2");
    assert_eq!(updated.data["id"], posts[0]["id"]);

    // Step 9: update many in ids mode.
    let ids_provider = provider(&base_url, BulkResultMode::Ids);
    let touched = ids_provider
        .update_many(
            "posts",
            &UpdateManyParams {
                ids: vec![id_of(&posts[1]), id_of(&posts[2])],
                data: record(json!({"title": "archived", "author": "system"})),
            },
        )
        .await
        .unwrap();
    assert_eq!(touched.data, vec![posts[1]["id"].clone(), posts[2]["id"].clone()]);

    // Step 10: delete one.
    let deleted = p
        .delete("posts", &DeleteParams { id: alpha_id.clone() })
        .await
        .unwrap();
    assert_eq!(deleted.data["title"], "alpha v2");

    // Step 11: get after delete — NotFound.
    let err = p
        .get_one("posts", &GetOneParams { id: alpha_id.clone() })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    // Step 12: delete many including the already-deleted id fails as a whole.
    let err = p
        .delete_many(
            "posts",
            &DeleteManyParams {
                ids: vec![id_of(&posts[1]), alpha_id],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    // Step 13: delete the rest.
    let removed = p
        .delete_many(
            "posts",
            &DeleteManyParams {
                ids: vec![id_of(&posts[2])],
            },
        )
        .await
        .unwrap();
    assert_eq!(removed.data[0]["title"], "archived");
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_backend_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let p = provider(&format!("http://{addr}"), BulkResultMode::Records);
    let err = p
        .get_one("posts", &GetOneParams { id: 1.into() })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}
