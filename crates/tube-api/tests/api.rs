use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use tube_api::assets::{AssetStore, DiskStore};
use tube_api::auth::TokenSettings;
use tube_api::{AppState, AppStateInner, api_router};
use tube_db::Database;
use tube_db::queries::{NewUser, NewVideo};
use tube_types::like::{LikeAction, LikeTarget};
use tube_types::models::User;

struct Harness {
    router: Router,
    state: AppState,
    dir: TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        tokens: TokenSettings {
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            access_ttl_secs: 3600,
            refresh_ttl_secs: 7200,
        },
        assets: AssetStore::Disk(DiskStore::new(dir.path().join("assets"), "http://media.test")),
        temp_dir: dir.path().join("temp"),
        cookie_secure: false,
    });
    Harness { router: api_router(state.clone()), state, dir }
}

impl Harness {
    fn user(&self, username: &str) -> (User, String) {
        let email = format!("{username}@example.com");
        let user = self
            .state
            .db
            .create_user(&NewUser {
                username,
                email: &email,
                full_name: username,
                password_hash: "not-a-real-hash",
                avatar: "http://media.test/assets/avatar.png",
                cover_image: None,
            })
            .unwrap()
            .unwrap()
            .into_public();
        let token = self.state.tokens.issue_access(&user).unwrap();
        (user, token)
    }

    fn video(&self, owner: Uuid, title: &str) -> Uuid {
        self.state
            .db
            .create_video(&NewVideo {
                owner,
                title,
                description: "a video",
                video_file: "http://media.test/assets/v.mp4",
                thumbnail: "http://media.test/assets/t.png",
                duration: 30.0,
                is_published: true,
            })
            .unwrap()
            .base
            .id
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }
}

fn request(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

fn empty(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    request(method, uri, token).body(Body::empty()).unwrap()
}

fn json_body(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    request(method, uri, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "tube-test-boundary";

/// Text `fields` are `(name, value)`; `files` are `(name, filename, contents)`.
fn multipart(
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &str)],
) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    for (name, file_name, contents) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{contents}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    request(Method::POST, uri, token)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn healthcheck_reports_ok() {
    let h = harness();
    let (status, body) = h.send(empty(Method::GET, "/api/v1/healthcheck", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "OK");
    assert_eq!(body["success"], true);
    assert_eq!(body["statusCode"], 200);
}

#[tokio::test]
async fn register_then_login_sets_cookies() {
    let h = harness();
    let req = multipart(
        "/api/v1/users/register",
        None,
        &[
            ("fullName", "Alice Example"),
            ("email", "alice@example.com"),
            ("username", "Alice"),
            ("password", "correct horse"),
        ],
        &[("avatar", "me.png", "fake png bytes")],
    );
    let (status, body) = h.send(req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["username"], "alice");
    assert!(body["data"].get("password").is_none());
    let avatar = body["data"]["avatar"].as_str().unwrap();
    assert!(avatar.starts_with("http://media.test/assets/"));
    assert!(avatar.ends_with(".png"));
    assert_eq!(std::fs::read_dir(h.dir.path().join("assets")).unwrap().count(), 1);

    let again = multipart(
        "/api/v1/users/register",
        None,
        &[
            ("fullName", "Other"),
            ("email", "alice@example.com"),
            ("username", "someoneelse"),
            ("password", "correct horse"),
        ],
        &[("avatar", "me.png", "fake png bytes")],
    );
    let (status, body) = h.send(again).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    // The clashing upload is cleaned up again.
    assert_eq!(std::fs::read_dir(h.dir.path().join("assets")).unwrap().count(), 1);

    let login = json_body(
        Method::POST,
        "/api/v1/users/login",
        None,
        json!({"email": "alice@example.com", "password": "correct horse"}),
    );
    let response = h.router.clone().oneshot(login).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=") && c.contains("HttpOnly")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let token = body["data"]["accessToken"].as_str().unwrap().to_string();

    let (status, body) =
        h.send(empty(Method::GET, "/api/v1/users/current-user", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "alice@example.com");
}

#[tokio::test]
async fn register_requires_every_field() {
    let h = harness();
    let req = multipart(
        "/api/v1/users/register",
        None,
        &[("fullName", "Alice"), ("email", "   ")],
        &[],
    );
    let (status, body) = h.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "All fields are required");
}

#[tokio::test]
async fn like_dislike_toggle_sequence() {
    let h = harness();
    let (alice, _) = h.user("alice");
    let (_, bob_token) = h.user("bob");
    let video = h.video(alice.id, "first");

    let toggle = |action: &str| {
        empty(
            Method::POST,
            &format!("/api/v1/like/toggle?toggleLike={action}&videoId={video}"),
            Some(&bob_token),
        )
    };

    let (status, body) = h.send(toggle("true")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({"isLiked": true, "isDisliked": false, "totalLikes": 1, "totalDislikes": 0})
    );

    let (_, body) = h.send(toggle("false")).await;
    assert_eq!(
        body["data"],
        json!({"isLiked": false, "isDisliked": true, "totalLikes": 0, "totalDislikes": 1})
    );

    let (_, body) = h.send(toggle("false")).await;
    assert_eq!(
        body["data"],
        json!({"isLiked": false, "isDisliked": false, "totalLikes": 0, "totalDislikes": 0})
    );
}

#[tokio::test]
async fn like_alias_and_detail_view_agree() {
    let h = harness();
    let (alice, _) = h.user("alice");
    let (_, bob_token) = h.user("bob");
    let video = h.video(alice.id, "first");

    let (status, _) = h
        .send(empty(
            Method::POST,
            &format!("/api/v1/like/toggle/v/{video}?toggleLike=true"),
            Some(&bob_token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        h.send(empty(Method::GET, &format!("/api/v1/videos/{video}"), Some(&bob_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalLikes"], 1);
    assert_eq!(body["data"]["isLiked"], true);
    assert_eq!(body["data"]["isOwner"], false);

    // Anonymous callers see the same totals with no personal flags.
    let (status, body) = h.send(empty(Method::GET, &format!("/api/v1/videos/{video}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalLikes"], 1);
    assert_eq!(body["data"]["isLiked"], false);
}

#[tokio::test]
async fn like_requires_target_and_action() {
    let h = harness();
    let (_, token) = h.user("bob");

    let (status, body) =
        h.send(empty(Method::POST, "/api/v1/like/toggle?toggleLike=true", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let missing = Uuid::new_v4();
    let (status, body) = h
        .send(empty(
            Method::POST,
            &format!("/api/v1/like/toggle?toggleLike=true&tweetId={missing}"),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Tweet not found");

    let (status, body) = h
        .send(empty(Method::POST, &format!("/api/v1/like/toggle/v/{missing}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "toggleLike query parameter is required");
}

#[tokio::test]
async fn protected_routes_reject_anonymous_callers() {
    let h = harness();
    let (status, body) = h.send(empty(Method::GET, "/api/v1/dashboard/stats", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"], json!([]));

    let (status, _) =
        h.send(empty(Method::GET, "/api/v1/dashboard/stats", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_ids_are_bad_requests() {
    let h = harness();
    let (status, body) = h.send(empty(Method::GET, "/api/v1/videos/not-a-uuid", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid video id");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn search_rejects_unknown_sort_column() {
    let h = harness();
    let (alice, _) = h.user("alice");
    h.video(alice.id, "cats");
    h.video(alice.id, "dogs");

    let (status, _) =
        h.send(empty(Method::GET, "/api/v1/videos/all/option?sortBy=password", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h
        .send(empty(Method::GET, "/api/v1/videos/all/option?query=cat&sortBy=views", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["items"][0]["title"], "cats");
}

#[tokio::test]
async fn playlist_add_is_idempotent() {
    let h = harness();
    let (alice, token) = h.user("alice");
    let video = h.video(alice.id, "first");

    let (status, body) = h
        .send(json_body(
            Method::POST,
            "/api/v1/playlist",
            Some(&token),
            json!({"name": "Favourites"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["description"], "");
    let playlist = body["data"]["_id"].as_str().unwrap().to_string();

    let add = format!("/api/v1/playlist/add/{playlist}/{video}");
    for _ in 0..2 {
        let (status, body) = h.send(empty(Method::PATCH, &add, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["videos"], json!([video.to_string()]));
    }

    let (_, body) = h
        .send(empty(Method::GET, &format!("/api/v1/playlist/users/{}", alice.id), Some(&token)))
        .await;
    assert_eq!(body["data"][0]["totalVideos"], 1);

    let (_, outsider) = h.user("mallory");
    let (status, _) = h.send(empty(Method::PATCH, &add, Some(&outsider))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn subscription_toggle_and_dashboard() {
    let h = harness();
    let (alice, alice_token) = h.user("alice");
    let (_, bob_token) = h.user("bob");
    h.video(alice.id, "first");

    let subscribe = format!("/api/v1/subscription/{}", alice.id);
    let (status, body) = h.send(empty(Method::POST, &subscribe, Some(&bob_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"isSubscribed": true, "subscribersCount": 1}));

    let (status, _) = h.send(empty(Method::POST, &subscribe, Some(&alice_token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h.send(empty(Method::GET, &subscribe, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["username"], "bob");

    let (status, body) =
        h.send(empty(Method::GET, "/api/v1/dashboard/stats", Some(&alice_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalSubscribers"], 1);
    assert_eq!(body["data"]["totalVideos"], 1);
    assert_eq!(body["data"]["totalLikes"], 0);
}

#[tokio::test]
async fn register_failure_removes_uploaded_assets() {
    let h = harness();
    h.state
        .db
        .with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_users BEFORE INSERT ON users
                 BEGIN SELECT RAISE(ABORT, 'storage unavailable'); END;",
            )?;
            Ok(())
        })
        .unwrap();

    let req = multipart(
        "/api/v1/users/register",
        None,
        &[
            ("fullName", "Alice Example"),
            ("email", "alice@example.com"),
            ("username", "alice"),
            ("password", "correct horse"),
        ],
        &[("avatar", "me.png", "avatar bytes"), ("coverImage", "cover.jpg", "cover bytes")],
    );
    let (status, body) = h.send(req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");

    let left = std::fs::read_dir(h.dir.path().join("assets")).map(|d| d.count()).unwrap_or(0);
    assert_eq!(left, 0);
}

#[tokio::test]
async fn update_account_validates_email() {
    let h = harness();
    let (_, token) = h.user("alice");

    let (status, body) = h
        .send(json_body(
            Method::PATCH,
            "/api/v1/users/update-account",
            Some(&token),
            json!({"fullName": "Alice", "email": "not-an-email"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email is not valid");

    let (status, body) = h
        .send(json_body(
            Method::PATCH,
            "/api/v1/users/update-account",
            Some(&token),
            json!({"fullName": "Alice", "email": "alice@new.example"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "alice@new.example");
}

#[tokio::test]
async fn optional_auth_treats_bad_tokens_as_anonymous() {
    let h = harness();
    let (alice, _) = h.user("alice");
    let (bob, bob_token) = h.user("bob");
    let video = h.video(alice.id, "first");

    let db = &h.state.db;
    db.toggle_subscription(alice.id, bob.id).unwrap().unwrap();
    db.toggle_like(LikeTarget::video(video), bob.id, LikeAction::Like).unwrap().unwrap();
    let comment = db.add_comment(video, bob.id, "nice one").unwrap().unwrap();
    db.toggle_like(LikeTarget::comment(comment.id), bob.id, LikeAction::Like).unwrap().unwrap();

    let expired = TokenSettings { access_ttl_secs: -3600, ..h.state.tokens.clone() }
        .issue_access(&bob)
        .unwrap();

    let detail = format!("/api/v1/videos/{video}");
    let comments = format!("/api/v1/comment/get/{video}");

    // With a valid token every flag is set.
    let (_, body) = h.send(empty(Method::GET, &detail, Some(&bob_token))).await;
    assert_eq!(body["data"]["isLiked"], true);
    assert_eq!(body["data"]["owner"]["isSubscribed"], true);
    let (_, body) = h.send(empty(Method::GET, &comments, Some(&bob_token))).await;
    assert_eq!(body["data"]["items"][0]["isLiked"], true);
    assert_eq!(body["data"]["items"][0]["isOwner"], true);

    for token in ["garbage", expired.as_str()] {
        let (status, body) = h.send(empty(Method::GET, &detail, Some(token))).await;
        assert_eq!(status, StatusCode::OK, "{token}");
        assert_eq!(body["data"]["totalLikes"], 1);
        assert_eq!(body["data"]["isLiked"], false);
        assert_eq!(body["data"]["isDisliked"], false);
        assert_eq!(body["data"]["isOwner"], false);
        assert_eq!(body["data"]["owner"]["isSubscribed"], false);
        assert_eq!(body["data"]["owner"]["subscribersCount"], 1);

        let (status, body) = h.send(empty(Method::GET, &comments, Some(token))).await;
        assert_eq!(status, StatusCode::OK, "{token}");
        let first = &body["data"]["items"][0];
        assert_eq!(first["totalLikes"], 1);
        assert_eq!(first["isLiked"], false);
        assert_eq!(first["isOwner"], false);
    }
}
