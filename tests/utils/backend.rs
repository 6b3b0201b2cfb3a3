use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use http::{header, HeaderMap, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

/// A minimal upstream that answers every request with the same reply and records the
/// request headers it saw.
pub struct Backend {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<HeaderMap>>>,
}

impl Backend {
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        Self::start_slow(status, body, Duration::ZERO).await
    }

    pub async fn start_slow(status: StatusCode, body: &'static str, delay: Duration) -> Self {
        Self::serve(status, body, delay, None).await
    }

    /// Answers every request with a `302` to `location`.
    pub async fn redirecting_to(location: String) -> Self {
        Self::serve(StatusCode::FOUND, "", Duration::ZERO, Some(location)).await
    }

    async fn serve(
        status: StatusCode,
        body: &'static str,
        delay: Duration,
        location: Option<String>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };

                let recorded = recorded.clone();
                let location = location.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        recorded.lock().unwrap().push(req.headers().clone());
                        let location = location.clone();
                        async move {
                            tokio::time::sleep(delay).await;
                            let mut response = Response::builder().status(status);
                            if let Some(location) = location {
                                response = response.header(header::LOCATION, location);
                            }
                            Ok::<_, Infallible>(
                                response
                                    .body(Full::new(Bytes::from_static(body.as_bytes())))
                                    .unwrap(),
                            )
                        }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<HeaderMap> {
        self.requests.lock().unwrap().clone()
    }
}

/// A URL on which nothing is listening.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/gone", addr)
}
