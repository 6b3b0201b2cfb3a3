use std::{
    future::{pending, Future},
    net::SocketAddr,
    sync::Arc,
    time::Instant,
};

use futures_util::FutureExt;
use http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder as ServerBuilder,
};
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot::Sender,
    task::spawn,
};

use crate::{
    config,
    server::{
        handler::{self, Handler},
        metrics::Metrics,
        server::Error::{
            BufferError, LocalSocketAddrError, PublishSocketAddrError, RouterError,
            ServerConnectionError, SocketBindError,
        },
    },
    VERSION,
};

/// Identifies this server and its configured tag on every response.
pub const SERVER_HEADER: HeaderName = HeaderName::from_static("x-mock-server");

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot bind to socket addr {0}: {1}")]
    SocketBindError(SocketAddr, std::io::Error),
    #[error("cannot parse socket address: {0}")]
    SocketAddrParseError(#[from] std::net::AddrParseError),
    #[error("cannot obtain local socket address: {0}")]
    LocalSocketAddrError(std::io::Error),
    #[error("cannot send reserved TCP address to caller {0}")]
    PublishSocketAddrError(SocketAddr),
    #[error("buffering error: {0}")]
    BufferError(hyper::Error),
    #[error("HTTP error: {0}")]
    HTTPError(#[from] http::Error),
    #[error("cannot process request: {0}")]
    RouterError(#[from] handler::Error),
    #[error("invalid route configuration: {0}")]
    RouteConfigError(#[from] config::Error),
    #[error("cannot set up metrics: {0}")]
    MetricsSetupError(#[from] prometheus::Error),
    #[error("tag '{0}' cannot be used in a response header")]
    InvalidTag(String),
    #[error("server connection error: {0}")]
    ServerConnectionError(Box<dyn std::error::Error + Send + Sync>),
}

pub struct MockServerConfig {
    pub static_port: Option<u16>,
    pub expose: bool,
    pub tag: String,
}

/// Accepts HTTP/1 connections and hands each buffered request to a [`Handler`].
pub struct MockServer<H>
where
    H: Handler + Send + Sync + 'static,
{
    handler: Box<H>,
    config: MockServerConfig,
    server_header: HeaderValue,
    metrics: Arc<Metrics>,
}

impl<H> MockServer<H>
where
    H: Handler + Send + Sync + 'static,
{
    /// Creates a new `MockServer` instance with the given handler and configuration.
    ///
    /// # Parameters
    /// - `handler`: A boxed handler that implements the `Handler` trait.
    /// - `config`: The configuration settings for the mock server.
    /// - `metrics`: Receives the method, status and duration of every request.
    ///
    /// # Returns
    /// A `Result` containing the new `MockServer` instance or an `Error` if the configured tag
    /// cannot be sent as a header value.
    pub(crate) fn new(
        handler: Box<H>,
        config: MockServerConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, Error> {
        let server_header = HeaderValue::from_str(&server_header_value(&config.tag))
            .map_err(|_| Error::InvalidTag(config.tag.clone()))?;

        Ok(MockServer {
            handler,
            config,
            server_header,
            metrics,
        })
    }

    pub fn tag(&self) -> &str {
        &self.config.tag
    }

    /// Starts the mock server and runs until the process ends.
    pub async fn start(self) -> Result<(), Error> {
        self.start_with_signals(None, pending()).await
    }

    /// Starts the mock server asynchronously with support for handling external shutdown signals.
    ///
    /// # Parameters
    /// - `socket_addr_sender`: An optional `Sender` to send the server's socket address once it's bound.
    /// - `shutdown`: A future that resolves when the server should shut down.
    pub async fn start_with_signals<F>(
        self,
        socket_addr_sender: Option<Sender<SocketAddr>>,
        shutdown: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let host = if self.config.expose {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        };
        let addr: SocketAddr =
            format!("{}:{}", host, self.config.static_port.unwrap_or(0)).parse()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SocketBindError(addr, e))?;

        let local_addr = listener.local_addr().map_err(LocalSocketAddrError)?;
        if let Some(sender) = socket_addr_sender {
            sender.send(local_addr).map_err(PublishSocketAddrError)?;
        }

        tracing::info!("Listening on {}", local_addr);
        self.run_accept_loop(listener, shutdown).await
    }

    pub async fn run_accept_loop<F>(self, listener: TcpListener, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let shutdown = shutdown.shared();
        let server = Arc::new(self);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((tcp_stream, remote_address)) => {
                            let server = server.clone();
                            spawn(async move {
                                if let Err(err) = server.handle_tcp_stream(tcp_stream, remote_address).await {
                                    tracing::error!("{:?}", err);
                                }
                            });
                        },
                        Err(err) => {
                            tracing::error!("TCP error: {:?}", err);
                        },
                    };
                }
                _ = shutdown.clone() => {
                    tracing::info!("Shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn service(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
        tracing::trace!("New HTTP request received: {} {}", req.method(), req.uri());

        let started = Instant::now();
        let method = req.method().clone();

        let response = match buffer_request(req).await {
            Ok(req) => match self.handler.handle(req).await {
                Ok(response) => Ok(self.to_service_response(response)),
                Err(err) => {
                    self.error_response(StatusCode::INTERNAL_SERVER_ERROR, RouterError(err))
                }
            },
            Err(err) => self.error_response(StatusCode::INTERNAL_SERVER_ERROR, BufferError(err)),
        };

        if let Ok(response) = &response {
            self.metrics
                .observe(method.as_str(), response.status().as_u16(), started.elapsed());
        }

        response
    }

    async fn handle_tcp_stream(
        self: Arc<Self>,
        tcp_stream: TcpStream,
        remote_address: SocketAddr,
    ) -> Result<(), Error> {
        tracing::trace!("New TCP connection from {}", remote_address);
        serve_connection(self, tcp_stream).await
    }

    fn error_response(
        &self,
        code: StatusCode,
        err: Error,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
        tracing::error!("failed to process request: {}", err);
        Ok(Response::builder()
            .status(code)
            .header(SERVER_HEADER, self.server_header.clone())
            .body(full(err.to_string()))?)
    }

    fn to_service_response(
        &self,
        response: Response<Bytes>,
    ) -> Response<BoxBody<Bytes, hyper::Error>> {
        let (mut parts, body) = response.into_parts();
        parts.headers.insert(SERVER_HEADER, self.server_header.clone());
        Response::from_parts(parts, full(body))
    }
}

/// The value of the [`SERVER_HEADER`] for a given tag.
pub fn server_header_value(tag: &str) -> String {
    format!("HTTP Mock; {} / {}", VERSION, tag)
}

async fn serve_connection<H>(server: Arc<MockServer<H>>, stream: TcpStream) -> Result<(), Error>
where
    H: Handler + Send + Sync + 'static,
{
    let mut server_builder = ServerBuilder::new(TokioExecutor::new());
    server_builder.http1().preserve_header_case(true);

    server_builder
        .serve_connection(
            TokioIo::new(stream),
            service_fn(|req| server.clone().service(req)),
        )
        .await
        .map_err(ServerConnectionError)
}

async fn buffer_request(req: Request<Incoming>) -> Result<Request<Bytes>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Request::from_parts(parts, body))
}

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}
