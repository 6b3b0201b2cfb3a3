use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
#[cfg(feature = "https")]
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot send request: {0}")]
    SendError(Box<dyn std::error::Error + Send + Sync>),
    #[error("cannot read response body: {0}")]
    BodyError(Box<dyn std::error::Error + Send + Sync>),
    #[error("cannot set up HTTP client: {0}")]
    SetupError(String),
}

/// Outbound HTTP. Implementations buffer the whole response body.
///
/// A failure to obtain the response head is reported as [`Error::SendError`], a failure
/// while reading the body afterwards as [`Error::BodyError`]. Callers rely on that split.
#[async_trait]
pub trait HttpClient {
    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

#[cfg(feature = "https")]
type Connector = HttpsConnector<HttpConnector>;
#[cfg(not(feature = "https"))]
type Connector = HttpConnector;

/// Outbound client on hyper-util. The connector is created on the first request, so a
/// missing certificate store only affects proxied requests.
#[derive(Default)]
pub struct HyperHttpClient {
    client: OnceCell<Client<Connector, Full<Bytes>>>,
}

impl HyperHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self) -> Result<&Client<Connector, Full<Bytes>>, Error> {
        self.client
            .get_or_try_init(|| async {
                let client = Client::builder(TokioExecutor::new()).build(connector()?);
                tracing::debug!("Created upstream HTTP client");
                Ok::<_, Error>(client)
            })
            .await
    }
}

#[cfg(feature = "https")]
fn connector() -> Result<Connector, Error> {
    // see https://github.com/rustls/rustls/issues/1938
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        // Another thread may have won the race, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|err| {
            Error::SetupError(format!("cannot load native root certificates: {}", err))
        })?
        .https_or_http()
        .enable_http1()
        .build())
}

#[cfg(not(feature = "https"))]
fn connector() -> Result<Connector, Error> {
    Ok(HttpConnector::new())
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let client = self.client().await?;

        let (req_parts, req_body) = req.into_parts();
        let hyper_req = Request::from_parts(req_parts, Full::new(req_body));

        let res = client
            .request(hyper_req)
            .await
            .map_err(|err| Error::SendError(Box::new(err)))?;

        let (res_parts, res_body) = res.into_parts();
        let body = res_body
            .collect()
            .await
            .map_err(|err| Error::BodyError(Box::new(err)))?
            .to_bytes();

        Ok(Response::from_parts(res_parts, body))
    }
}
