use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use http::{header, HeaderMap, Request, Response, StatusCode};
use url::Url;

use crate::{
    common::{
        data::PathPolicy,
        http::{Error as HttpClientError, HttpClient},
        runtime,
    },
    server::util::text_response,
};

/// Upper bound of redirects followed for a single proxied request.
pub const MAX_REDIRECTS: usize = 20;

/// How a proxied request ended. Every variant maps to exactly one reply.
#[derive(Debug, PartialEq)]
pub enum ProxyOutcome {
    /// The upstream answered with a 2xx status.
    Success(String),
    /// The upstream answered with any other status.
    Failure(String),
    /// The request could not be sent or no response head arrived in time.
    Unreachable(String),
    /// The response head arrived but reading the body failed.
    BadData(String),
}

impl ProxyOutcome {
    pub fn reply_body(&self) -> String {
        match self {
            ProxyOutcome::Success(body) => format!("OK => {}", body),
            ProxyOutcome::Failure(body) => format!("BAD => {}", body),
            ProxyOutcome::Unreachable(_) => "Bad response".to_string(),
            ProxyOutcome::BadData(_) => "Bad data".to_string(),
        }
    }
}

/// Forwards requests to a policy's proxy target and relays the outcome.
///
/// Only `extra_headers` travel upstream. The inbound method, body and headers are not
/// forwarded; the outbound request is always a `GET`. Redirects are followed, and the whole
/// exchange including redirects is bounded by `timeout`. An `Authorization` header is only
/// sent to the origin of the configured target.
pub struct ProxyExecutor {
    http_client: Arc<dyn HttpClient + Send + Sync + 'static>,
    timeout: Duration,
}

impl ProxyExecutor {
    pub fn new(http_client: Arc<dyn HttpClient + Send + Sync + 'static>, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
        }
    }

    pub async fn execute(
        &self,
        policy: &PathPolicy,
        extra_headers: HeaderMap,
    ) -> Result<Response<Bytes>, http::Error> {
        let outcome = match policy.proxy_target.as_deref() {
            Some(target) => self.forward(target, extra_headers).await,
            None => ProxyOutcome::Unreachable(format!("no proxy target for {}", policy.path)),
        };

        match &outcome {
            ProxyOutcome::Unreachable(reason) | ProxyOutcome::BadData(reason) => {
                tracing::warn!("Proxying {} failed: {}", policy.path, reason)
            }
            _ => tracing::debug!("Proxied {}: {:?}", policy.path, outcome),
        }

        text_response(StatusCode::OK, outcome.reply_body())
    }

    pub async fn forward(&self, target: &str, extra_headers: HeaderMap) -> ProxyOutcome {
        match runtime::with_timeout(self.timeout, self.follow(target, extra_headers)).await {
            Some(outcome) => outcome,
            None => ProxyOutcome::Unreachable(format!(
                "no response from {} within {:?}",
                target, self.timeout
            )),
        }
    }

    async fn follow(&self, target: &str, mut headers: HeaderMap) -> ProxyOutcome {
        let mut url = match Url::parse(target) {
            Ok(url) => url,
            Err(err) => {
                return ProxyOutcome::Unreachable(format!("invalid target {}: {}", target, err))
            }
        };
        let origin = url.origin();

        for _ in 0..=MAX_REDIRECTS {
            let req = match Request::get(url.as_str()).body(Bytes::new()) {
                Ok(mut req) => {
                    *req.headers_mut() = headers.clone();
                    req
                }
                Err(err) => {
                    return ProxyOutcome::Unreachable(format!("invalid target {}: {}", url, err))
                }
            };

            let res = match self.http_client.send(req).await {
                Ok(res) => res,
                Err(HttpClientError::BodyError(err)) => {
                    return ProxyOutcome::BadData(err.to_string())
                }
                Err(err) => return ProxyOutcome::Unreachable(err.to_string()),
            };

            if let Some(next) = redirect_location(&url, &res) {
                tracing::debug!("Following redirect from {} to {}", url, next);
                // Credentials are scoped to the configured target's origin.
                if next.origin() != origin && headers.remove(header::AUTHORIZATION).is_some() {
                    tracing::debug!("Dropping authorization for redirect to {}", next);
                }
                url = next;
                continue;
            }

            let body = String::from_utf8_lossy(res.body()).into_owned();
            return if res.status().is_success() {
                ProxyOutcome::Success(body)
            } else {
                ProxyOutcome::Failure(body)
            };
        }

        ProxyOutcome::Unreachable(format!(
            "more than {} redirects starting at {}",
            MAX_REDIRECTS, target
        ))
    }
}

fn redirect_location(current: &Url, res: &Response<Bytes>) -> Option<Url> {
    if !matches!(
        res.status(),
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    ) {
        return None;
    }

    let location = res.headers().get(header::LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}
