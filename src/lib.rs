//! `mock-endpoint` is a configurable HTTP endpoint for integration and resilience testing.
//!
//! Every registered path carries a [`PathPolicy`](common::data::PathPolicy) that decides how
//! a `GET` on that path is answered:
//!
//! * a static text reply with status `200` or `503`,
//! * a `302` redirect,
//! * a proxied call to an upstream URL, optionally authenticated with a GCP identity token.
//!
//! Independently of the reply kind, a policy can delay the reply and inject `500` faults at a
//! configurable rate. Policies are seeded from [`RouteConfig`] at startup and can be changed
//! at runtime with a `PATCH` on the same path:
//!
//! ```text
//! PATCH /hello
//! {"delay": 250, "errorRate": 10}
//! ```
//!
//! Request counts and durations are exposed in the Prometheus text format on `GET /metrics`.
//!
//! # Example
//! ```no_run
//! use mock_endpoint::{MockEndpointServerBuilder, RouteConfig};
//!
//! # async fn run() -> Result<(), mock_endpoint::server::Error> {
//! let routes = RouteConfig {
//!     text: vec!["/hello:world".to_string()],
//!     ..RouteConfig::default()
//! };
//!
//! let server = MockEndpointServerBuilder::new()
//!     .port(8080)
//!     .routes(routes)
//!     .build()?;
//!
//! server.start().await
//! # }
//! ```

pub mod common;
pub mod config;
pub mod server;

pub use crate::{
    config::RouteConfig,
    server::{MockEndpointServer, MockEndpointServerBuilder},
};

/// Crate version, reported in the `X-Mock-Server` response header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
