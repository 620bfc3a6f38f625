mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::{Value, json};

fn ids(board: &Value) -> Vec<i64> {
    board
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn create_appends_to_the_column() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let first = app
        .post("/api/events", &alice, json!({ "title": "  Picnic  " }))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body["title"], "Picnic");
    assert_eq!(first.body["status"], "idea");
    assert_eq!(first.body["version"], 1);
    assert_eq!(first.body["position"], 0);
    assert_eq!(first.body["owner_username"], "alice");
    assert_eq!(first.body["like_count"], 0);

    let second = app
        .post("/api/events", &alice, json!({ "title": "Concert" }))
        .await;
    assert_eq!(second.body["position"], 1);

    let upcoming = app
        .post(
            "/api/events",
            &alice,
            json!({ "title": "Hike", "status": "upcoming", "event_date": "2999-06-01" }),
        )
        .await;
    assert_eq!(upcoming.body["position"], 0);
    assert_eq!(upcoming.body["event_date"], "2999-06-01");
}

#[tokio::test]
async fn create_validates_fields() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let blank = app.post("/api/events", &alice, json!({ "title": "   " })).await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let long = app
        .post("/api/events", &alice, json!({ "title": "x".repeat(201) }))
        .await;
    assert_eq!(long.status, StatusCode::BAD_REQUEST);

    let bad_image = app
        .post(
            "/api/events",
            &alice,
            json!({ "title": "Gig", "image_url": "data:image/png;base64,AAAA" }),
        )
        .await;
    assert_eq!(bad_image.status, StatusCode::BAD_REQUEST);

    let bad_status = app
        .post("/api/events", &alice, json!({ "title": "Gig", "status": "someday" }))
        .await;
    assert_eq!(bad_status.status, StatusCode::BAD_REQUEST);
    assert!(bad_status.body["error"].is_string());

    let no_title = app
        .post("/api/events", &alice, json!({ "description": "untitled" }))
        .await;
    assert_eq!(no_title.status, StatusCode::BAD_REQUEST);
    assert!(no_title.body["error"].is_string());

    let board = app.get("/api/events", &alice).await;
    assert!(board.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_paths_and_queries_answer_json_errors() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let bad_id = app.get("/api/events/abc", &alice).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
    assert!(bad_id.body["error"].is_string());

    let bad_filter = app.get("/api/events?status=someday", &alice).await;
    assert_eq!(bad_filter.status, StatusCode::BAD_REQUEST);
    assert!(bad_filter.body["error"].is_string());

    let bad_limit = app.get("/api/feed?limit=lots", &alice).await;
    assert_eq!(bad_limit.status, StatusCode::BAD_REQUEST);
    assert!(bad_limit.body["error"].is_string());
}

#[tokio::test]
async fn board_orders_by_status_then_position() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let past = app
        .create_event(&alice, json!({ "title": "Done", "status": "past" }))
        .await;
    let idea = app.create_event(&alice, json!({ "title": "Maybe" })).await;
    let upcoming = app
        .create_event(&alice, json!({ "title": "Soon", "status": "upcoming" }))
        .await;

    let board = app.get("/api/events", &alice).await;
    assert_eq!(board.status, StatusCode::OK);
    assert_eq!(ids(&board.body), [idea, upcoming, past]);

    let only_past = app.get("/api/events?status=past", &alice).await;
    assert_eq!(ids(&only_past.body), [past]);
}

#[tokio::test]
async fn reorder_rewrites_positions() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let a = app.create_event(&alice, json!({ "title": "A" })).await;
    let b = app.create_event(&alice, json!({ "title": "B" })).await;
    let c = app.create_event(&alice, json!({ "title": "C" })).await;

    let reordered = app
        .put(
            "/api/events/order",
            &alice,
            json!({ "status": "idea", "event_ids": [c, a, b] }),
        )
        .await;
    assert_eq!(reordered.status, StatusCode::OK);
    assert_eq!(ids(&reordered.body), [c, a, b]);
    assert_eq!(reordered.body[0]["position"], 0);
    // reordering is not an edit
    assert_eq!(reordered.body[0]["version"], 1);

    let missing_one = app
        .put(
            "/api/events/order",
            &alice,
            json!({ "status": "idea", "event_ids": [a, b] }),
        )
        .await;
    assert_eq!(missing_one.status, StatusCode::BAD_REQUEST);

    let wrong_column = app
        .put(
            "/api/events/order",
            &alice,
            json!({ "status": "past", "event_ids": [a] }),
        )
        .await;
    assert_eq!(wrong_column.status, StatusCode::BAD_REQUEST);

    let board = app.get("/api/events?status=idea", &alice).await;
    assert_eq!(ids(&board.body), [c, a, b]);
}

#[tokio::test]
async fn reorder_cannot_touch_other_users_events() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let hers = app.create_event(&alice, json!({ "title": "Hers" })).await;
    let his = app.create_event(&bob, json!({ "title": "His" })).await;

    let response = app
        .put(
            "/api/events/order",
            &bob,
            json!({ "status": "idea", "event_ids": [hers, his] }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_bumps_version_and_detects_conflicts() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let id = app.create_event(&alice, json!({ "title": "Draft" })).await;
    let uri = format!("/api/events/{id}");

    let updated = app
        .patch(
            &uri,
            &alice,
            json!({ "title": "Final", "location": "Park", "expected_version": 1 }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["title"], "Final");
    assert_eq!(updated.body["location"], "Park");
    assert_eq!(updated.body["version"], 2);

    let stale = app
        .patch(&uri, &alice, json!({ "title": "Stale", "expected_version": 1 }))
        .await;
    assert_eq!(stale.status, StatusCode::CONFLICT);
    assert_eq!(stale.body["current"]["version"], 2);
    assert_eq!(stale.body["current"]["title"], "Final");

    let cleared = app.patch(&uri, &alice, json!({ "location": null })).await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert!(cleared.body["location"].is_null());
    assert_eq!(cleared.body["version"], 3);

    let noop = app.patch(&uri, &alice, json!({ "title": "Final" })).await;
    assert_eq!(noop.body["version"], 3);
}

#[tokio::test]
async fn status_change_moves_to_the_end_of_the_new_column() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let first = app
        .create_event(&alice, json!({ "title": "One", "status": "upcoming" }))
        .await;
    let idea = app.create_event(&alice, json!({ "title": "Two" })).await;

    let moved = app
        .patch(
            &format!("/api/events/{idea}"),
            &alice,
            json!({ "status": "upcoming" }),
        )
        .await;
    assert_eq!(moved.status, StatusCode::OK);
    assert_eq!(moved.body["status"], "upcoming");
    assert_eq!(moved.body["position"], 1);

    let column = app.get("/api/events?status=upcoming", &alice).await;
    assert_eq!(ids(&column.body), [first, idea]);
}

#[tokio::test]
async fn elapsed_upcoming_events_roll_over_to_past() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let old = app
        .create_event(
            &alice,
            json!({ "title": "Old gig", "status": "upcoming", "event_date": "2000-01-01" }),
        )
        .await;
    let future = app
        .create_event(
            &alice,
            json!({ "title": "Next gig", "status": "upcoming", "event_date": "2999-01-01" }),
        )
        .await;

    let past = app.get("/api/events?status=past", &alice).await;
    assert_eq!(ids(&past.body), [old]);
    assert_eq!(past.body[0]["version"], 2);

    let upcoming = app.get("/api/events?status=upcoming", &alice).await;
    assert_eq!(ids(&upcoming.body), [future]);
}

#[tokio::test]
async fn events_are_hidden_from_strangers() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let id = app.create_event(&alice, json!({ "title": "Private" })).await;
    let uri = format!("/api/events/{id}");

    assert_eq!(app.get(&uri, &bob).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        app.get("/api/users/alice/events", &bob).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.patch(&uri, &bob, json!({ "title": "Mine" })).await.status,
        StatusCode::NOT_FOUND
    );

    app.follow(&bob, "alice").await;

    let seen = app.get(&uri, &bob).await;
    assert_eq!(seen.status, StatusCode::OK);
    assert_eq!(seen.body["title"], "Private");

    let board = app.get("/api/users/alice/events", &bob).await;
    assert_eq!(ids(&board.body), [id]);

    assert_eq!(
        app.patch(&uri, &bob, json!({ "title": "Mine" })).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.delete(&uri, &bob).await.status, StatusCode::FORBIDDEN);

    // following is one way
    let bobs_board = app.get("/api/users/bob/events", &alice).await;
    assert_eq!(bobs_board.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_removes_the_event() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let id = app.create_event(&alice, json!({ "title": "Gone soon" })).await;
    let uri = format!("/api/events/{id}");

    assert_eq!(app.delete(&uri, &alice).await.status, StatusCode::NO_CONTENT);
    assert_eq!(app.get(&uri, &alice).await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.delete(&uri, &alice).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feed_pages_through_followed_users() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let carol = app.register("carol").await;
    app.follow(&bob, "alice").await;

    let first = app.create_event(&alice, json!({ "title": "1" })).await;
    let second = app.create_event(&alice, json!({ "title": "2" })).await;
    let third = app.create_event(&alice, json!({ "title": "3" })).await;
    app.create_event(&carol, json!({ "title": "not followed" })).await;
    app.create_event(&bob, json!({ "title": "own" })).await;

    let page = app.get("/api/feed?limit=2", &bob).await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(ids(&page.body["events"]), [third, second]);
    assert_eq!(page.body["next_before"], second);

    let rest = app
        .get(&format!("/api/feed?limit=2&before={second}"), &bob)
        .await;
    assert_eq!(ids(&rest.body["events"]), [first]);
    assert!(rest.body["next_before"].is_null());

    let empty = app.get("/api/feed", &alice).await;
    assert!(empty.body["events"].as_array().unwrap().is_empty());
}
