mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use common::*;
use serde_json::{Value, json};
use tower::ServiceExt;
use upload_gateway::entities::users::Role;
use upload_gateway::infrastructure::seed::seed_root_user;

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = send(
        app,
        "POST",
        "/v1/user/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn setup() -> (TestApp, String) {
    let test = TestApp::new().await;
    seed_root_user(&test.db, "rootpw").await.unwrap();
    let token = login(&test.app, "root", "rootpw").await;
    (test, token)
}

#[tokio::test]
async fn test_login_errors() {
    let (test, _) = setup().await;

    let response = send(
        &test.app,
        "POST",
        "/v1/user/login",
        None,
        Some(json!({ "username": "ghost", "password": "whatever" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await, json!({ "error": "User not found" }));

    let response = send(
        &test.app,
        "POST",
        "/v1/user/login",
        None,
        Some(json!({ "username": "root", "password": "wrong" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await, json!({ "error": "Invalid password" }));
}

#[tokio::test]
async fn test_seeding_root_twice_is_noop() {
    let (test, _) = setup().await;
    seed_root_user(&test.db, "another").await.unwrap();

    // The original password still works
    login(&test.app, "root", "rootpw").await;
}

#[tokio::test]
async fn test_login_rotates_token() {
    let (test, first) = setup().await;
    let second = login(&test.app, "root", "rootpw").await;
    assert_ne!(first, second);

    let response = send(&test.app, "GET", "/v1/user", Some(&first), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await, json!({ "error": "Invalid token" }));

    let response = send(&test.app, "GET", "/v1/user", Some(&second), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_and_list() {
    let (test, token) = setup().await;

    let response = send(
        &test.app,
        "POST",
        "/v1/user/register",
        Some(&token),
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "secret1",
            "root_path": "/home/alice/"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        read_json(response).await,
        json!({ "username": "alice", "role": "user" })
    );

    let response = send(&test.app, "GET", "/v1/user", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    let users = json["data"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    let alice = users.iter().find(|u| u["username"] == "alice").unwrap();
    assert_eq!(alice["root_path"], "/home/alice/");
    assert_eq!(alice["email"], "alice@example.com");
    assert!(alice.get("password_hash").is_none());
    assert!(alice.get("token").is_none());

    // The new account can log in
    login(&test.app, "alice", "secret1").await;
}

#[tokio::test]
async fn test_register_conflicts() {
    let (test, token) = setup().await;
    let body = json!({ "username": "bob", "email": "bob@example.com", "password": "secret1" });

    let response = send(&test.app, "POST", "/v1/user/register", Some(&token), Some(body.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&test.app, "POST", "/v1/user/register", Some(&token), Some(body)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await, json!({ "error": "User already exists" }));

    // Same email under another name
    let response = send(
        &test.app,
        "POST",
        "/v1/user/register",
        Some(&token),
        Some(json!({ "username": "bob2", "email": "bob@example.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_validation() {
    let (test, token) = setup().await;

    let response = send(
        &test.app,
        "POST",
        "/v1/user/register",
        Some(&token),
        Some(json!({ "username": "bad name", "password": "secret1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &test.app,
        "POST",
        "/v1/user/register",
        Some(&token),
        Some(json!({ "username": "short", "password": "123" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &test.app,
        "POST",
        "/v1/user/register",
        Some(&token),
        Some(json!({ "username": "extra", "password": "secret1", "is_admin": true })),
    )
    .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_non_admin_is_forbidden() {
    let (test, _) = setup().await;
    let user_token = user_with_token(&test.db, "carol", Role::User, None).await;

    let response = send(&test.app, "GET", "/v1/user", Some(&user_token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &test.app,
        "POST",
        "/v1/user/register",
        Some(&user_token),
        Some(json!({ "username": "mallory", "password": "secret1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&test.app, "DELETE", "/v1/user/root", Some(&user_token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&test.app, "GET", "/v1/user", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_role_is_accepted() {
    let (test, _) = setup().await;
    let admin_token = user_with_token(&test.db, "dave", Role::Admin, None).await;

    let response = send(&test.app, "GET", "/v1/user", Some(&admin_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_user() {
    let (test, token) = setup().await;
    seed_user(&test.db, "erin", "secret1", Role::User, None).await;

    let response = send(
        &test.app,
        "PATCH",
        "/v1/user/erin",
        Some(&token),
        Some(json!({ "root_path": "/erin/", "role": "client", "password": "newsecret" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["username"], "erin");
    assert_eq!(json["root_path"], "/erin/");
    assert_eq!(json["role"], "client");

    login(&test.app, "erin", "newsecret").await;
}

#[tokio::test]
async fn test_update_user_errors() {
    let (test, token) = setup().await;
    seed_user(&test.db, "frank", "secret1", Role::User, None).await;

    let response = send(
        &test.app,
        "PATCH",
        "/v1/user/frank",
        Some(&token),
        Some(json!({ "username": "francis" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(response).await,
        json!({ "error": "Username cannot be changed." })
    );

    let response = send(
        &test.app,
        "PATCH",
        "/v1/user/nobody",
        Some(&token),
        Some(json!({ "root_path": "/x/" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await, json!({ "error": "User not found." }));

    // Repeating the same username is allowed
    let response = send(
        &test.app,
        "PATCH",
        "/v1/user/frank",
        Some(&token),
        Some(json!({ "username": "frank" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_user() {
    let (test, token) = setup().await;
    let grace_token = user_with_token(&test.db, "grace", Role::User, None).await;

    let response = send(&test.app, "DELETE", "/v1/user/grace", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&test.app, "DELETE", "/v1/user/grace", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({ "message": "User does not exist." })
    );

    // Tokens of a deleted user stop working
    let body = MultipartBody::new()
        .field("path", "docs")
        .file("file", "a.txt", b"x")
        .build();
    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/upload")
                .header(header::CONTENT_TYPE, multipart_content_type())
                .header(header::AUTHORIZATION, format!("Bearer {}", grace_token))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
