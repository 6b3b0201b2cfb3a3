use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, Method, Request, Response, StatusCode};
use path_tree::PathTree;
use serde::Serialize;
use thiserror::Error;

use crate::{
    common::data::PolicyPatch,
    server::{
        dispatcher::Dispatcher,
        handler::Error::{
            MetricsEncodeError, ResponseBodyConversionError, ResponseBodySerializeError,
        },
        metrics::{Metrics, METRICS_PATH},
        state::{self, PolicyStore},
        util::text_response,
    },
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot serialize response body: {0}")]
    ResponseBodySerializeError(serde_json::Error),
    #[error("cannot convert response body: {0}")]
    ResponseBodyConversionError(#[from] http::Error),
    #[error("cannot encode metrics: {0}")]
    MetricsEncodeError(prometheus::Error),
}

#[async_trait]
pub(crate) trait Handler {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

/// Routes requests for registered paths to the dispatcher (`GET`, `HEAD`) or merges
/// partial policy updates (`PATCH`). `GET /metrics` is answered with the server metrics.
///
/// Routes are fixed when the handler is built: every path known to the store at that time
/// becomes a route. Registered paths may be express-style patterns such as `/users/:id`.
/// Matching ignores case and a single trailing slash.
pub struct MockEndpointHandler<S>
where
    S: PolicyStore + Send + Sync + 'static,
{
    path_tree: PathTree<String>,
    state: Arc<S>,
    dispatcher: Dispatcher<S>,
    metrics: Arc<Metrics>,
}

#[async_trait]
impl<S> Handler for MockEndpointHandler<S>
where
    S: PolicyStore + Send + Sync + 'static,
{
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        tracing::trace!("Routing incoming request: {} {}", req.method(), req.uri());

        let method = req.method().clone();
        let route_path = normalize_path(req.uri().path());

        if method == Method::GET && route_path == METRICS_PATH {
            return self.metrics_response();
        }

        let matched = self
            .path_tree
            .find(&route_path)
            .map(|(key, _)| key.clone());

        if let Some(key) = matched {
            match method {
                Method::GET | Method::HEAD => return Ok(self.dispatcher.dispatch(&key).await?),
                Method::PATCH => return self.handle_patch(&key, req),
                _ => {}
            }
        }

        Ok(text_response(StatusCode::NOT_FOUND, "Not Found")?)
    }
}

impl<S> MockEndpointHandler<S>
where
    S: PolicyStore + Send + Sync + 'static,
{
    pub fn new(state: Arc<S>, dispatcher: Dispatcher<S>, metrics: Arc<Metrics>) -> Self {
        let mut path_tree: PathTree<String> = PathTree::new();
        #[allow(unused_must_use)]
        {
            for path in state.paths() {
                path_tree.insert(&normalize_path(&path), path.clone());
            }
        }

        Self {
            path_tree,
            state,
            dispatcher,
            metrics,
        }
    }

    fn handle_patch(&self, key: &str, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let patch = match parse_patch(req.body()) {
            Ok(patch) => patch,
            Err(reason) => {
                tracing::debug!("Rejecting patch for {}: {}", key, reason);
                return Ok(text_response(StatusCode::BAD_REQUEST, reason)?);
            }
        };

        let policy = match self.state.patch(key, patch) {
            Ok(policy) => policy,
            Err(err @ state::Error::UnknownPath(_)) => {
                tracing::debug!("{}", err);
                return Ok(text_response(StatusCode::NOT_FOUND, "Not Found")?);
            }
        };

        tracing::info!("Updated policy for {}", key);

        if accepts_json(req.headers()) {
            response(StatusCode::OK, policy)
        } else {
            Ok(text_response(StatusCode::OK, "OK")?)
        }
    }

    fn metrics_response(&self) -> Result<Response<Bytes>, Error> {
        let body = self.metrics.render().map_err(MetricsEncodeError)?;

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, self.metrics.content_type())
            .body(Bytes::from(body))?)
    }
}

/// Lowercases `path` and strips one trailing slash, except from the root path.
fn normalize_path(path: &str) -> String {
    let path = path.to_ascii_lowercase();
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => path,
    }
}

/// An empty body is an empty update.
fn parse_patch(body: &[u8]) -> Result<PolicyPatch, String> {
    if body.trim_ascii().is_empty() {
        return Ok(PolicyPatch::default());
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|err| format!("invalid JSON body: {}", err))?;

    if !value.is_object() {
        return Err("expected a JSON object".to_string());
    }

    serde_json::from_value(value).map_err(|err| format!("invalid policy update: {}", err))
}

/// True when the `Accept` header is missing or its most specific media range covering JSON
/// has a non-zero quality.
fn accepts_json(headers: &HeaderMap) -> bool {
    let values: Vec<&str> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    if values.is_empty() {
        return true;
    }

    values
        .iter()
        .flat_map(|value| value.split(','))
        .filter_map(json_range_quality)
        .max_by(|(a_rank, a_q), (b_rank, b_q)| {
            a_rank.cmp(b_rank).then(a_q.total_cmp(b_q))
        })
        .is_some_and(|(_, q)| q > 0.0)
}

/// Rank and quality of a media range that covers JSON, `None` for other ranges.
fn json_range_quality(range: &str) -> Option<(u8, f32)> {
    let mut parts = range.split(';');
    let media_type = parts.next()?.trim().to_ascii_lowercase();

    let rank = match media_type.as_str() {
        "application/json" => 3,
        t if t.starts_with("application/") && t.ends_with("+json") => 3,
        "application/*" => 2,
        "*/*" => 1,
        _ => return None,
    };

    let q = parts
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
        .and_then(|(_, value)| value.trim().parse::<f32>().ok())
        .unwrap_or(1.0);

    Some((rank, q))
}

fn response<T>(status: StatusCode, body: T) -> Result<Response<Bytes>, Error>
where
    T: Serialize,
{
    let body_bytes = serde_json::to_vec(&body).map_err(ResponseBodySerializeError)?;

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Bytes::from(body_bytes))
        .map_err(ResponseBodyConversionError)
}
