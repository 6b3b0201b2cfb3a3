use std::{sync::Arc, time::Duration};

use crate::{
    common::http::{HttpClient, HyperHttpClient},
    config::RouteConfig,
    server::{
        auth::{GcpMetadataTokenProvider, TokenProvider},
        dispatcher::Dispatcher,
        faults::{FaultInjector, RandomSource, ThreadRandom},
        handler::MockEndpointHandler,
        metrics::Metrics,
        proxy::ProxyExecutor,
        server::{Error, MockServer, MockServerConfig},
        state::{InMemoryPolicyStore, PolicyStore},
    },
};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TAG: &str = "No Tag";
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// A mock endpoint server backed by the in-memory policy store.
pub type MockEndpointServer = MockServer<MockEndpointHandler<InMemoryPolicyStore>>;

/// The `MockEndpointServerBuilder` collects the server settings and the collaborators the
/// server depends on. Collaborators that are not set explicitly fall back to the production
/// implementations.
#[derive(Default)]
pub struct MockEndpointServerBuilder {
    port: Option<u16>,
    expose: Option<bool>,
    tag: Option<String>,
    upstream_timeout: Option<Duration>,
    routes: RouteConfig,
    http_client: Option<Arc<dyn HttpClient + Send + Sync + 'static>>,
    token_provider: Option<Arc<dyn TokenProvider + Send + Sync + 'static>>,
    random_source: Option<Arc<dyn RandomSource + Send + Sync + 'static>>,
}

impl MockEndpointServerBuilder {
    /// Creates a new instance of `MockEndpointServerBuilder` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the port to listen on. Port `0` picks a free ephemeral port.
    ///
    /// # Parameters
    /// - `port`: The port number.
    ///
    /// # Returns
    /// A modified `MockEndpointServerBuilder` instance for method chaining.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets whether the server listens on all interfaces (`true`) or on loopback only.
    ///
    /// # Parameters
    /// - `expose`: A boolean indicating whether to expose the server.
    ///
    /// # Returns
    /// A modified `MockEndpointServerBuilder` instance for method chaining.
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = Some(expose);
        self
    }

    /// Sets the tag reported in the `X-Mock-Server` header.
    pub fn tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Bounds every outbound proxy exchange and every identity token fetch.
    ///
    /// # Parameters
    /// - `timeout`: Maximum time to wait for an upstream, redirects included.
    ///
    /// # Returns
    /// A modified `MockEndpointServerBuilder` instance for method chaining.
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = Some(timeout);
        self
    }

    /// Sets the route directives that seed the policy store before the server starts.
    pub fn routes(mut self, routes: RouteConfig) -> Self {
        self.routes = routes;
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient + Send + Sync + 'static>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn token_provider(
        mut self,
        provider: Arc<dyn TokenProvider + Send + Sync + 'static>,
    ) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn random_source(mut self, random: Arc<dyn RandomSource + Send + Sync + 'static>) -> Self {
        self.random_source = Some(random);
        self
    }

    /// Builds the server with a fresh in-memory policy store.
    ///
    /// # Returns
    /// A `MockEndpointServer` instance or an error if a route directive is malformed.
    pub fn build(self) -> Result<MockEndpointServer, Error> {
        self.build_with_state(Arc::new(InMemoryPolicyStore::new()))
    }

    /// Builds the server on top of the provided policy store. The configured routes are
    /// registered in `state` first, together with any policies it already holds.
    ///
    /// # Parameters
    /// - `state`: The policy store to use.
    ///
    /// # Returns
    /// A `MockServer` instance or an error if the build process fails.
    pub fn build_with_state<S>(
        self,
        state: Arc<S>,
    ) -> Result<MockServer<MockEndpointHandler<S>>, Error>
    where
        S: PolicyStore + Send + Sync + 'static,
    {
        self.routes.seed(state.as_ref())?;

        let http_client: Arc<dyn HttpClient + Send + Sync + 'static> = match self.http_client {
            Some(client) => client,
            None => Arc::new(HyperHttpClient::new()),
        };

        let token_provider = self
            .token_provider
            .unwrap_or_else(|| Arc::new(GcpMetadataTokenProvider::new(http_client.clone())));

        let random = self
            .random_source
            .unwrap_or_else(|| Arc::new(ThreadRandom));

        let timeout = self.upstream_timeout.unwrap_or(DEFAULT_UPSTREAM_TIMEOUT);

        let dispatcher = Dispatcher::new(
            state.clone(),
            FaultInjector::new(random),
            ProxyExecutor::new(http_client, timeout),
            token_provider,
            timeout,
        );

        let metrics = Arc::new(Metrics::new()?);
        let handler = MockEndpointHandler::new(state, dispatcher, metrics.clone());

        MockServer::new(
            Box::new(handler),
            MockServerConfig {
                static_port: self.port,
                expose: self.expose.unwrap_or(false),
                tag: self.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            },
            metrics,
        )
    }
}
