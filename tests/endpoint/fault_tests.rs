use std::time::{Duration, Instant};

use mock_endpoint::RouteConfig;
use reqwest::StatusCode;

use crate::utils::server::{client, TestServer};

#[tokio::test]
async fn full_error_rate_fails_every_request() {
    // Arrange
    let server = TestServer::with_routes(RouteConfig {
        text: vec!["/flaky:fine".to_string()],
        error_rate: vec!["/flaky:100".to_string()],
        ..RouteConfig::default()
    })
    .await;

    // Act & Assert
    for _ in 0..10 {
        let response = client().get(server.url("/flaky")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text().await.unwrap(), "Server Error");
    }
}

#[tokio::test]
async fn error_rate_can_be_switched_off_at_runtime() {
    // Arrange
    let server = TestServer::with_routes(RouteConfig {
        text: vec!["/flaky:fine".to_string()],
        error_rate: vec!["/flaky:100".to_string()],
        ..RouteConfig::default()
    })
    .await;

    // Act
    client()
        .patch(server.url("/flaky"))
        .body(r#"{"errorRate": 0}"#)
        .send()
        .await
        .unwrap();

    // Assert
    for _ in 0..10 {
        let response = client().get(server.url("/flaky")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn delay_holds_back_the_reply() {
    // Arrange
    let server = TestServer::with_routes(RouteConfig {
        text: vec!["/slow:eventually".to_string()],
        delay: vec!["/slow:300".to_string()],
        ..RouteConfig::default()
    })
    .await;

    // Act
    let start = Instant::now();
    let response = client().get(server.url("/slow")).send().await.unwrap();
    let elapsed = start.elapsed();

    // Assert
    assert_eq!(response.text().await.unwrap(), "eventually");
    assert!(elapsed >= Duration::from_millis(300), "took {:?}", elapsed);
}

#[tokio::test]
async fn delayed_requests_do_not_block_others() {
    // Arrange
    let server = TestServer::with_routes(RouteConfig {
        text: vec!["/slow:late".to_string(), "/fast:early".to_string()],
        delay: vec!["/slow:1000".to_string()],
        ..RouteConfig::default()
    })
    .await;
    let client = client();

    // Act
    let slow = client.get(server.url("/slow")).send();
    let fast = async {
        let start = Instant::now();
        let response = client.get(server.url("/fast")).send().await.unwrap();
        (response.text().await.unwrap(), start.elapsed())
    };
    let (slow, (fast_body, fast_elapsed)) = tokio::join!(slow, fast);

    // Assert
    assert_eq!(fast_body, "early");
    assert!(fast_elapsed < Duration::from_millis(1000));
    assert_eq!(slow.unwrap().text().await.unwrap(), "late");
}
