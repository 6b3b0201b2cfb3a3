use std::time::Duration;

use mock_endpoint::{MockEndpointServerBuilder, RouteConfig};
use reqwest::StatusCode;

use crate::utils::{
    backend::{closed_url, Backend},
    server::{client, StaticTokenProvider, TestServer},
};

fn proxy_routes(target: &str) -> RouteConfig {
    RouteConfig {
        proxy: vec![format!("/c:{}", target)],
        ..RouteConfig::default()
    }
}

#[tokio::test]
async fn successful_upstream_reply_is_relayed() {
    // Arrange
    let backend = Backend::start(StatusCode::OK, "world").await;
    let server = TestServer::with_routes(proxy_routes(&backend.url("/ok"))).await;

    // Act
    let response = client().get(server.url("/c")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK => world");
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn failing_upstream_reply_is_relayed() {
    let backend = Backend::start(StatusCode::INTERNAL_SERVER_ERROR, "err").await;
    let server = TestServer::with_routes(proxy_routes(&backend.url("/bad"))).await;

    let response = client().get(server.url("/c")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "BAD => err");
}

#[tokio::test]
async fn unreachable_upstream_is_a_bad_response() {
    let server = TestServer::with_routes(proxy_routes(&closed_url().await)).await;

    let response = client().get(server.url("/c")).send().await.unwrap();

    assert_eq!(response.text().await.unwrap(), "Bad response");
}

#[tokio::test]
async fn slow_upstream_times_out() {
    // Arrange
    let backend =
        Backend::start_slow(StatusCode::OK, "too late", Duration::from_secs(5)).await;
    let server = TestServer::start(
        MockEndpointServerBuilder::new()
            .upstream_timeout(Duration::from_millis(200))
            .routes(proxy_routes(&backend.url("/slow"))),
    )
    .await;

    // Act
    let response = client().get(server.url("/c")).send().await.unwrap();

    // Assert
    assert_eq!(response.text().await.unwrap(), "Bad response");
}

#[tokio::test]
async fn gcp_auth_sends_bearer_token_upstream() {
    // Arrange
    let backend = Backend::start(StatusCode::OK, "secret").await;
    let mut routes = proxy_routes(&backend.url("/private"));
    routes.auth.push("/c:GCP_ID".to_string());
    let server = TestServer::start(
        MockEndpointServerBuilder::new()
            .token_provider(StaticTokenProvider::new(Some("t0k")))
            .routes(routes),
    )
    .await;

    // Act
    let response = client().get(server.url("/c")).send().await.unwrap();

    // Assert
    assert_eq!(response.text().await.unwrap(), "OK => secret");
    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["authorization"], "Bearer t0k");
}

#[tokio::test]
async fn missing_token_is_a_bad_gateway() {
    // Arrange
    let backend = Backend::start(StatusCode::OK, "secret").await;
    let mut routes = proxy_routes(&backend.url("/private"));
    routes.auth.push("/c:GCP_ID".to_string());
    let server = TestServer::start(
        MockEndpointServerBuilder::new()
            .token_provider(StaticTokenProvider::new(None))
            .routes(routes),
    )
    .await;

    // Act
    let response = client().get(server.url("/c")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.text().await.unwrap(), "Bad auth");
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn bearer_token_stays_with_the_configured_origin() {
    // Arrange
    let elsewhere = Backend::start(StatusCode::OK, "landed").await;
    let backend = Backend::redirecting_to(elsewhere.url("/landing")).await;
    let mut routes = proxy_routes(&backend.url("/private"));
    routes.auth.push("/c:GCP_ID".to_string());
    let server = TestServer::start(
        MockEndpointServerBuilder::new()
            .token_provider(StaticTokenProvider::new(Some("t0k")))
            .routes(routes),
    )
    .await;

    // Act
    let response = client().get(server.url("/c")).send().await.unwrap();

    // Assert
    assert_eq!(response.text().await.unwrap(), "OK => landed");
    assert_eq!(backend.requests()[0]["authorization"], "Bearer t0k");
    let redirected = elsewhere.requests();
    assert_eq!(redirected.len(), 1);
    assert!(redirected[0].get("authorization").is_none());
}
