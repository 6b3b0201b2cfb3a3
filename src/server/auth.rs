use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, StatusCode};
use thiserror::Error;

use crate::common::http::HttpClient;

/// Host of the GCP metadata server, overridable through `GCE_METADATA_HOST`.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";
const IDENTITY_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/identity";

#[derive(Error, Debug)]
pub enum Error {
    #[error("identity provider is unreachable: {0}")]
    Unreachable(String),
    #[error("identity provider denied the token request ({status}): {body}")]
    Denied { status: StatusCode, body: String },
    #[error("identity provider returned an empty token")]
    EmptyToken,
    #[error("cannot build token request: {0}")]
    RequestError(#[from] http::Error),
}

/// Obtains identity tokens scoped to a target audience.
#[async_trait]
pub trait TokenProvider {
    async fn fetch_identity_token(&self, audience: &str) -> Result<String, Error>;
}

/// Fetches Google-signed identity tokens from the GCP metadata server, which is what
/// workloads on Cloud Run, GKE and Compute Engine use.
pub struct GcpMetadataTokenProvider {
    base_url: String,
    http_client: Arc<dyn HttpClient + Send + Sync + 'static>,
}

impl GcpMetadataTokenProvider {
    pub fn new(http_client: Arc<dyn HttpClient + Send + Sync + 'static>) -> Self {
        let host =
            std::env::var(METADATA_HOST_ENV).unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_string());
        Self::with_base_url(format!("http://{}", host), http_client)
    }

    pub fn with_base_url<S: Into<String>>(
        base_url: S,
        http_client: Arc<dyn HttpClient + Send + Sync + 'static>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }

    fn identity_url(&self, audience: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("audience", audience)
            .append_pair("format", "full")
            .finish();

        format!(
            "{}{}?{}",
            self.base_url.trim_end_matches('/'),
            IDENTITY_PATH,
            query
        )
    }
}

#[async_trait]
impl TokenProvider for GcpMetadataTokenProvider {
    async fn fetch_identity_token(&self, audience: &str) -> Result<String, Error> {
        let req = Request::get(self.identity_url(audience))
            .header("Metadata-Flavor", "Google")
            .body(Bytes::new())?;

        let res = self
            .http_client
            .send(req)
            .await
            .map_err(|err| Error::Unreachable(err.to_string()))?;

        let body = String::from_utf8_lossy(res.body()).trim().to_string();

        if !res.status().is_success() {
            return Err(Error::Denied {
                status: res.status(),
                body,
            });
        }

        if body.is_empty() {
            return Err(Error::EmptyToken);
        }

        tracing::debug!("Obtained identity token for audience {}", audience);
        Ok(body)
    }
}
