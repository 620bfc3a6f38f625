mod common;

use axum::http::StatusCode;
use common::TestApp;

#[tokio::test]
async fn follow_and_unfollow() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    app.register("bob").await;

    let followed = app.post("/api/users/bob/follow", &alice, serde_json::json!({})).await;
    assert_eq!(followed.status, StatusCode::CREATED);
    assert_eq!(followed.body["following"], true);
    assert_eq!(followed.body["follower_count"], 1);

    let again = app.post("/api/users/bob/follow", &alice, serde_json::json!({})).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let unfollowed = app.delete("/api/users/bob/follow", &alice).await;
    assert_eq!(unfollowed.status, StatusCode::OK);
    assert_eq!(unfollowed.body["following"], false);
    assert_eq!(unfollowed.body["follower_count"], 0);

    let missing = app.delete("/api/users/bob/follow", &alice).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn follow_rejects_self_and_unknown_users() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let own = app.post("/api/users/alice/follow", &alice, serde_json::json!({})).await;
    assert_eq!(own.status, StatusCode::BAD_REQUEST);

    let ghost = app.post("/api/users/ghost/follow", &alice, serde_json::json!({})).await;
    assert_eq!(ghost.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn follows_are_directional() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    app.register("carol").await;

    app.follow(&alice, "bob").await;
    app.follow(&alice, "carol").await;

    let bob_profile = app.get("/api/users/bob", &alice).await;
    assert_eq!(bob_profile.status, StatusCode::OK);
    assert_eq!(bob_profile.body["is_following"], true);
    assert_eq!(bob_profile.body["follows_you"], false);
    assert_eq!(bob_profile.body["follower_count"], 1);

    let alice_seen_by_bob = app.get("/api/users/alice", &bob).await;
    assert_eq!(alice_seen_by_bob.body["is_following"], false);
    assert_eq!(alice_seen_by_bob.body["follows_you"], true);
    assert_eq!(alice_seen_by_bob.body["following_count"], 2);

    let following = app.get("/api/users/alice/following", &bob).await;
    let names: Vec<&str> = following
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["carol", "bob"]);

    let followers = app.get("/api/users/bob/followers", &bob).await;
    assert_eq!(followers.body.as_array().unwrap().len(), 1);
    assert_eq!(followers.body[0]["username"], "alice");

    let bobs_following = app.get("/api/users/bob/following", &bob).await;
    assert!(bobs_following.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_matches_username_prefix() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    app.register("alan").await;
    app.register("bob").await;

    let found = app.get("/api/users?q=%40AL", &alice).await;
    assert_eq!(found.status, StatusCode::OK);
    let mut names: Vec<&str> = found
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["username"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["alan", "alice"]);

    let empty = app.get("/api/users?q=", &alice).await;
    assert_eq!(empty.body, serde_json::json!([]));

    let wildcard = app.get("/api/users?q=%25", &alice).await;
    assert_eq!(wildcard.body, serde_json::json!([]));

    let unknown = app.get("/api/users/nobody", &alice).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}
