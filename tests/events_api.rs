use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod support;

use support::{
    ALICE_PHRASE, BOB_PHRASE, TestApp, body_json, body_text, post_with_type,
    unreachable_store_app,
};

#[tokio::test]
async fn create_then_list_all_shows_stamped_hidden_event() {
    let app = TestApp::new();

    let answer = app
        .post(
            "/events/admin/create",
            json!({ "phrase": ALICE_PHRASE, "event": { "name": "Gala", "visible": true } }),
        )
        .await;
    assert_eq!(answer, json!({ "status": 1, "data": true }));

    let listed = app.post("/events/admin/list", json!({})).await;
    assert_eq!(listed["status"], 1);
    let events = listed["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event["name"], "Gala");
    assert_eq!(event["visible"], false);
    assert_eq!(event["createdBy"], "alice");
    assert_eq!(event["changedBy"], "alice");
    assert_eq!(event["createdAt"], event["lastModified"]);
    assert!(event["createdAt"].is_i64());
    assert_eq!(event["_id"].as_str().unwrap().len(), 24);
}

#[tokio::test]
async fn caller_supplied_system_fields_are_overwritten() {
    let app = TestApp::new();
    let id = app
        .create_as_alice(json!({
            "name": "Gala",
            "createdBy": "mallory",
            "createdAt": 1,
            "_id": "000000000000000000000000",
        }))
        .await;

    assert_ne!(id, "000000000000000000000000");
    let event = app.fetch(&id).await;
    assert_eq!(event["createdBy"], "alice");
    assert_ne!(event["createdAt"], 1);
}

#[tokio::test]
async fn visibility_flow_controls_list_visible() {
    let app = TestApp::new();
    let id = app.create_as_alice(json!({ "name": "Gala" })).await;
    let _hidden = app.create_as_alice(json!({ "name": "Draft" })).await;

    let visible = app.post("/events/user/list", json!({})).await;
    assert_eq!(visible, json!({ "status": 1, "data": [] }));

    let answer = app
        .post(
            "/events/admin/visible",
            json!({ "phrase": BOB_PHRASE, "id": id, "visible": true }),
        )
        .await;
    assert_eq!(answer["status"], 1);
    assert_eq!(answer["data"]["acknowledged"], true);
    assert_eq!(answer["data"]["matchedCount"], 1);
    assert_eq!(answer["data"]["modifiedCount"], 1);

    let visible = app.post("/events/user/list", json!({})).await;
    let events = visible["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["_id"], id.as_str());
    assert_eq!(events[0]["visibilityChangedBy"], "bob");
    assert_eq!(events[0]["changedBy"], "bob");
    assert_eq!(events[0]["createdBy"], "alice");
}

#[tokio::test]
async fn list_visible_is_subset_of_list_all() {
    let app = TestApp::new();
    for name in ["one", "two", "three"] {
        let id = app.create_as_alice(json!({ "name": name })).await;
        if name != "two" {
            app.post(
                "/events/admin/visible",
                json!({ "phrase": ALICE_PHRASE, "id": id, "visible": true }),
            )
            .await;
        }
    }

    let all = app.post("/events/admin/list", json!({})).await["data"].clone();
    let visible = app.post("/events/user/list", json!({})).await["data"].clone();
    let all = all.as_array().unwrap();
    let visible = visible.as_array().unwrap();

    assert_eq!(all.len(), 3);
    assert_eq!(visible.len(), 2);
    for event in visible {
        assert_eq!(event["visible"], true);
        assert!(all.contains(event));
    }
}

#[tokio::test]
async fn mutations_without_known_actor_are_rejected_without_side_effects() {
    let app = TestApp::new();
    let id = app.create_as_alice(json!({ "name": "Gala" })).await;
    let before = app.fetch(&id).await;
    let not_authorized = json!({ "status": -1, "message": "Not Authorized" });

    for phrase in [json!("wrong"), json!(""), Value::Null] {
        let mut cases = vec![
            ("/events/admin/create", json!({ "event": { "name": "Intruder" } })),
            ("/events/admin/update", json!({ "id": id, "event": { "name": "Hacked" } })),
            ("/events/admin/visible", json!({ "id": id, "visible": true })),
            ("/events/admin/delete", json!({ "id": id })),
        ];
        for (path, body) in cases.iter_mut() {
            if !phrase.is_null() {
                body["phrase"] = phrase.clone();
            }
            let answer = app.post(path, body.clone()).await;
            assert_eq!(answer, not_authorized, "{path} with phrase {phrase}");
        }
    }

    assert_eq!(app.stored_count().await, 1);
    assert_eq!(app.fetch(&id).await, before);
}

#[tokio::test]
async fn unauthorized_create_with_missing_event_still_reports_not_authorized() {
    let app = TestApp::new();
    let answer = app.post("/events/admin/create", json!({ "phrase": "nope" })).await;
    assert_eq!(answer, json!({ "status": -1, "message": "Not Authorized" }));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let app = TestApp::new();
    let id = app.create_as_alice(json!({ "name": "Gala" })).await;

    let first = app
        .post("/events/admin/delete", json!({ "phrase": ALICE_PHRASE, "id": id }))
        .await;
    assert_eq!(first, json!({ "status": 1, "data": true }));

    let second = app
        .post("/events/admin/delete", json!({ "phrase": ALICE_PHRASE, "id": id }))
        .await;
    assert_eq!(second, json!({ "status": 1, "data": false }));
    assert_eq!(app.stored_count().await, 0);
}

#[tokio::test]
async fn update_merges_fields_and_keeps_identifier() {
    let app = TestApp::new();
    let id = app
        .create_as_alice(json!({ "name": "Gala", "seats": 120 }))
        .await;
    let before = app.fetch(&id).await;

    let answer = app
        .post(
            "/events/admin/update",
            json!({
                "phrase": BOB_PHRASE,
                "id": id,
                "event": { "_id": "ffffffffffffffffffffffff", "name": "Winter Gala" },
            }),
        )
        .await;
    assert_eq!(answer, json!({ "status": 1, "data": true }));

    let after = app.fetch(&id).await;
    assert_eq!(after["_id"], id.as_str());
    assert_eq!(after["name"], "Winter Gala");
    assert_eq!(after["seats"], 120);
    assert_eq!(after["changedBy"], "bob");
    assert_eq!(after["createdBy"], "alice");
    assert_eq!(after["createdAt"], before["createdAt"]);
    assert!(after["lastModified"].as_i64().unwrap() > before["lastModified"].as_i64().unwrap());
}

#[tokio::test]
async fn back_to_back_updates_advance_last_modified() {
    let app = TestApp::new();

    for round in 0..50 {
        let id = app.create_as_alice(json!({ "round": round })).await;
        let mut previous = app.fetch(&id).await["lastModified"].as_i64().unwrap();

        for phrase in [ALICE_PHRASE, BOB_PHRASE] {
            let answer = app
                .post(
                    "/events/admin/update",
                    json!({ "phrase": phrase, "id": id, "event": { "round": round } }),
                )
                .await;
            assert_eq!(answer, json!({ "status": 1, "data": true }));

            let current = app.fetch(&id).await["lastModified"].as_i64().unwrap();
            assert!(current > previous, "round {round}: {current} <= {previous}");
            previous = current;
        }
    }
}

#[tokio::test]
async fn update_of_unknown_event_reports_false() {
    let app = TestApp::new();
    let answer = app
        .post(
            "/events/admin/update",
            json!({
                "phrase": ALICE_PHRASE,
                "id": "65a1b2c3d4e5f60718293a4b",
                "event": { "name": "Ghost" },
            }),
        )
        .await;
    assert_eq!(answer, json!({ "status": 1, "data": false }));
    assert_eq!(app.stored_count().await, 0);
}

#[tokio::test]
async fn fetch_unknown_or_malformed_id_returns_null() {
    let app = TestApp::new();
    app.create_as_alice(json!({ "name": "Gala" })).await;

    for id in [json!("65a1b2c3d4e5f60718293a4b"), json!("not-an-id"), json!(7)] {
        let answer = app.post("/events/admin/fetch", json!({ "id": id })).await;
        assert_eq!(answer, json!({ "status": 1, "data": null }));
    }
    let answer = app.post("/events/admin/fetch", json!({})).await;
    assert_eq!(answer, json!({ "status": 1, "data": null }));
}

#[tokio::test]
async fn visibility_on_malformed_id_matches_nothing() {
    let app = TestApp::new();
    let answer = app
        .post(
            "/events/admin/visible",
            json!({ "phrase": ALICE_PHRASE, "id": "bogus", "visible": true }),
        )
        .await;
    assert_eq!(answer["status"], 1);
    assert_eq!(answer["data"]["matchedCount"], 0);
    assert_eq!(answer["data"]["modifiedCount"], 0);
}

#[tokio::test]
async fn non_object_event_is_a_generic_failure() {
    let app = TestApp::new();
    let answer = app
        .post("/events/admin/create", json!({ "phrase": ALICE_PHRASE, "event": "Gala" }))
        .await;
    assert_eq!(
        answer,
        json!({ "status": -1, "message": "Something went wrong" })
    );

    let answer = app.post("/events/admin/create", json!({ "phrase": ALICE_PHRASE })).await;
    assert_eq!(
        answer,
        json!({ "status": -1, "message": "Something went wrong" })
    );
    assert_eq!(app.stored_count().await, 0);
}

#[tokio::test]
async fn malformed_body_is_treated_as_empty() {
    let app = TestApp::new();
    app.create_as_alice(json!({ "name": "Gala" })).await;

    let listed = app.post_raw("/events/admin/list", "{ this is not json").await;
    assert_eq!(listed["status"], 1);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let rejected = app.post_raw("/events/admin/create", "{ \"phrase\": ").await;
    assert_eq!(
        rejected,
        json!({ "status": -1, "message": "Not Authorized" })
    );
}

#[tokio::test]
async fn empty_body_lists_events() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/events/user/list")
        .body(Body::empty())
        .unwrap();
    let answer = body_json(app.send(request).await).await;
    assert_eq!(answer, json!({ "status": 1, "data": [] }));
}

#[tokio::test]
async fn root_reports_time_and_version() {
    let app = TestApp::new();
    let response = app.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["time"].as_i64().unwrap() > 0);
    assert_eq!(body["version"], "0.0.1");
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/events/user/list")
        .header("origin", "https://example.org")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/events/admin/create")
        .header("origin", "https://example.org")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.send(preflight).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-methods")
    );
}

#[tokio::test]
async fn health_endpoints_report_memory_store() {
    let app = TestApp::new();

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], "0.0.1");

    let response = app.get("/ready").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);

    let response = app.get("/health/components").await;
    let body = body_json(response).await;
    assert_eq!(body["components"]["store"]["status"], "healthy");
    assert_eq!(body["components"]["store"]["details"]["backend"], "memory");
    assert_eq!(body["components"]["actors"]["details"]["registered"], 2);
}

#[tokio::test]
async fn metrics_count_operations_and_rejections() {
    let app = TestApp::new();
    app.create_as_alice(json!({ "name": "Gala" })).await;
    app.post("/events/admin/delete", json!({ "phrase": "wrong", "id": "x" }))
        .await;

    let response = app.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("events_requests_total"));
    assert!(text.contains("operation=\"create\""));
    assert!(text.contains("events_authorization_failures_total{operation=\"delete\"}"));
}

#[tokio::test]
async fn oversized_body_is_treated_as_empty() {
    let config = osgoode_events::ServerConfig {
        store: osgoode_events::StoreKind::Memory,
        max_body_bytes: 64,
        ..Default::default()
    };
    let app = TestApp::with_config(config, &[(ALICE_PHRASE, "alice")]);

    let padding = "x".repeat(256);
    let answer = app
        .post(
            "/events/admin/create",
            json!({ "phrase": ALICE_PHRASE, "event": { "name": padding } }),
        )
        .await;
    assert_eq!(answer, json!({ "status": -1, "message": "Not Authorized" }));
    assert_eq!(app.stored_count().await, 0);
}

#[tokio::test]
async fn gala_scenario() {
    let app = TestApp::new();
    let id = app.create_as_alice(json!({ "name": "Gala" })).await;

    let created = app.fetch(&id).await;
    assert_eq!(created["visible"], false);
    assert_eq!(created["createdBy"], "alice");
    assert_eq!(created["name"], "Gala");

    let answer = app
        .post(
            "/events/admin/visible",
            json!({ "phrase": ALICE_PHRASE, "id": id, "visible": true }),
        )
        .await;
    assert_eq!(answer["status"], 1);

    // Reads ignore the phrase entirely.
    let fetched = app
        .post("/events/admin/fetch", json!({ "phrase": "wrong", "id": id }))
        .await;
    assert_eq!(fetched["status"], 1);
    let fetched = &fetched["data"];
    assert_eq!(fetched["visible"], true);
    assert_eq!(fetched["visibilityChangedBy"], "alice");
    assert!(
        fetched["lastModified"].as_i64().unwrap() > created["lastModified"].as_i64().unwrap()
    );
}

#[tokio::test]
async fn form_encoded_bodies_drive_mutations() {
    let app = TestApp::new();
    let phrase = "correct%20horse%20battery%20staple";
    let form = "application/x-www-form-urlencoded";

    let (status, answer) = post_with_type(
        &app.router,
        "/events/admin/create",
        form,
        format!("phrase={phrase}&event[name]=Gala&event[seats]=120"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer, json!({ "status": 1, "data": true }));

    let id = app.all_ids().await.pop().unwrap();
    let event = app.fetch(&id).await;
    assert_eq!(event["name"], "Gala");
    assert_eq!(event["seats"], "120");
    assert_eq!(event["createdBy"], "alice");

    let (_, answer) = post_with_type(
        &app.router,
        "/events/admin/delete",
        form,
        format!("phrase={phrase}&id={id}"),
    )
    .await;
    assert_eq!(answer, json!({ "status": 1, "data": true }));
    assert_eq!(app.stored_count().await, 0);

    let (_, answer) = post_with_type(
        &app.router,
        "/events/admin/create",
        form,
        "phrase=wrong&event[name]=Intruder",
    )
    .await;
    assert_eq!(answer, json!({ "status": -1, "message": "Not Authorized" }));
}

#[tokio::test]
async fn unreachable_store_yields_generic_failure_and_retries() {
    let (router, store) = unreachable_store_app();
    let failure = json!({ "status": -1, "message": "Something went wrong" });
    let json_type = "application/json";

    for _ in 0..2 {
        let (status, answer) =
            post_with_type(&router, "/events/admin/list", json_type, "{}").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(answer, failure);
        assert!(!store.connections().is_connected());
    }

    let create = json!({ "phrase": ALICE_PHRASE, "event": { "name": "Gala" } }).to_string();
    let (status, answer) =
        post_with_type(&router, "/events/admin/create", json_type, create).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer, failure);

    let fetch = json!({ "id": "65a1b2c3d4e5f60718293a4b" }).to_string();
    let (_, answer) = post_with_type(&router, "/events/admin/fetch", json_type, fetch).await;
    assert_eq!(answer, failure);

    // Unauthorized requests are rejected before any connection attempt.
    let (_, answer) = post_with_type(
        &router,
        "/events/admin/delete",
        json_type,
        r#"{"phrase":"wrong","id":"65a1b2c3d4e5f60718293a4b"}"#,
    )
    .await;
    assert_eq!(answer, json!({ "status": -1, "message": "Not Authorized" }));

    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["ready"], false);
    assert_eq!(body["not_ready"], json!(["store"]));
    assert!(!store.connections().is_connected());

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let text = body_text(router.oneshot(request).await.unwrap()).await;
    assert!(text.contains(
        "events_errors_total{operation=\"list_all\",category=\"connection_error\"}"
    ));
}
