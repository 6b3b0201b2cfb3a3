use std::sync::Arc;

use mock_endpoint::{
    common::data::{PolicyPatch, ResponseCode},
    server::{
        server::server_header_value,
        state::{InMemoryPolicyStore, PolicyStore},
    },
    MockEndpointServerBuilder, RouteConfig,
};
use reqwest::{header, StatusCode};

use crate::utils::server::{client, TestServer};

#[tokio::test]
async fn text_route_replies_with_text() {
    // Arrange
    let server = TestServer::with_routes(RouteConfig {
        text: vec!["/a:hello".to_string()],
        ..RouteConfig::default()
    })
    .await;

    // Act
    let response = client().get(server.url("/a")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello");
}

#[tokio::test]
async fn redirect_route_replies_with_location() {
    // Arrange
    let server = TestServer::with_routes(RouteConfig {
        redirect: vec!["/b:https://x.test".to_string()],
        ..RouteConfig::default()
    })
    .await;

    // Act
    let response = client().get(server.url("/b")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "https://x.test");
    assert_eq!(
        response.text().await.unwrap(),
        "Found. Redirecting to https://x.test"
    );
}

#[tokio::test]
async fn error_route_replies_service_unavailable() {
    let server = TestServer::with_routes(RouteConfig {
        error: vec!["/down:maintenance".to_string()],
        ..RouteConfig::default()
    })
    .await;

    let response = client().get(server.url("/down")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().await.unwrap(), "maintenance");
}

#[tokio::test]
async fn route_without_reply_is_not_implemented() {
    let server = TestServer::with_routes(RouteConfig {
        delay: vec!["/bare:0".to_string()],
        ..RouteConfig::default()
    })
    .await;

    let response = client().get(server.url("/bare")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(response.text().await.unwrap(), "No response configured");
}

#[tokio::test]
async fn unknown_paths_and_unsupported_methods_are_not_found() {
    // Arrange
    let server = TestServer::with_routes(RouteConfig {
        text: vec!["/a:hello".to_string()],
        ..RouteConfig::default()
    })
    .await;

    // Act
    let unknown = client().get(server.url("/missing")).send().await.unwrap();
    let post = client().post(server.url("/a")).send().await.unwrap();

    // Assert
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(post.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn routes_ignore_case_and_trailing_slash() {
    let server = TestServer::with_routes(RouteConfig {
        text: vec!["/a:hello".to_string()],
        ..RouteConfig::default()
    })
    .await;

    for path in ["/a/", "/A"] {
        let response = client().get(server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        assert_eq!(response.text().await.unwrap(), "hello");
    }
}

#[tokio::test]
async fn pattern_route_matches_concrete_path() {
    // Arrange
    let store = Arc::new(InMemoryPolicyStore::new());
    store.fetch_or_create("/users/:id");
    store
        .patch(
            "/users/:id",
            PolicyPatch {
                response_code: Some(Some(ResponseCode::Ok)),
                text_body: Some(Some("a user".to_string())),
                ..PolicyPatch::default()
            },
        )
        .unwrap();
    let server = TestServer::start_with_state(MockEndpointServerBuilder::new(), store).await;

    // Act
    let response = client().get(server.url("/users/42")).send().await.unwrap();
    let patched = client()
        .patch(server.url("/users/7"))
        .body(r#"{"text": "another user"}"#)
        .send()
        .await
        .unwrap();
    let after_patch = client().get(server.url("/users/42")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "a user");
    assert_eq!(patched.status(), StatusCode::OK);
    assert_eq!(after_patch.text().await.unwrap(), "another user");
}

#[tokio::test]
async fn every_response_carries_the_server_header() {
    // Arrange
    let server = TestServer::start(
        MockEndpointServerBuilder::new()
            .tag("canary")
            .routes(RouteConfig {
                text: vec!["/a:hello".to_string()],
                ..RouteConfig::default()
            }),
    )
    .await;

    // Act
    let found = client().get(server.url("/a")).send().await.unwrap();
    let missing = client().get(server.url("/missing")).send().await.unwrap();

    // Assert
    let expected = server_header_value("canary");
    assert_eq!(found.headers()["x-mock-server"], expected.as_str());
    assert_eq!(missing.headers()["x-mock-server"], expected.as_str());
}
