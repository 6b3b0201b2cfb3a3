use std::{future::pending, process::ExitCode, sync::Arc, time::Duration};

use clap::{ArgAction, Parser};
use mock_endpoint::{
    server::{
        builder::{DEFAULT_PORT, DEFAULT_TAG},
        state::{InMemoryPolicyStore, PolicyStore},
        Error,
    },
    MockEndpointServerBuilder, RouteConfig, VERSION,
};
use tracing_subscriber::EnvFilter;

/// Holds command line parameters provided by the user.
#[derive(Parser, Debug)]
#[command(version, about = "Configurable mock HTTP endpoint")]
struct CommandLineParameters {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Listen on all interfaces instead of loopback only.
    #[arg(long, env = "EXPOSE", default_value_t = true, action = ArgAction::Set)]
    expose: bool,
    /// Free-form label reported in the X-Mock-Server response header.
    #[arg(long, env = "TAG", default_value = DEFAULT_TAG)]
    tag: String,
    /// Upper bound for proxied calls and identity token fetches.
    #[arg(long, default_value_t = 30_000)]
    upstream_timeout_ms: u64,
    /// Reply 200 with a text body.
    #[arg(long, value_name = "PATH:TEXT")]
    text: Vec<String>,
    /// Reply 302 to a target URL.
    #[arg(long, value_name = "PATH:URL")]
    redirect: Vec<String>,
    /// Reply 503 with a text body.
    #[arg(long, value_name = "PATH:TEXT")]
    error: Vec<String>,
    /// Proxy GET requests to an upstream URL.
    #[arg(long, value_name = "PATH:URL")]
    proxy: Vec<String>,
    /// Authenticate proxied requests (GCP_ID).
    #[arg(long, value_name = "PATH:MODE")]
    auth: Vec<String>,
    /// Delay replies by a number of milliseconds.
    #[arg(long, value_name = "PATH:MILLIS")]
    delay: Vec<String>,
    /// Fail this percentage of requests with a 500.
    #[arg(long, value_name = "PATH:PERCENT")]
    error_rate: Vec<String>,
}

impl CommandLineParameters {
    fn routes(&self) -> RouteConfig {
        RouteConfig {
            text: self.text.clone(),
            redirect: self.redirect.clone(),
            error: self.error.clone(),
            proxy: self.proxy.clone(),
            auth: self.auth.clone(),
            delay: self.delay.clone(),
            error_rate: self.error_rate.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_endpoint=info")),
        )
        .init();

    let params = CommandLineParameters::parse();

    match run(params).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(params: CommandLineParameters) -> Result<(), Error> {
    tracing::info!("Starting HTTP Mock V{} ({})", VERSION, params.tag);

    let store = Arc::new(InMemoryPolicyStore::new());

    let server = MockEndpointServerBuilder::new()
        .port(params.port)
        .expose(params.expose)
        .tag(params.tag.clone())
        .upstream_timeout(Duration::from_millis(params.upstream_timeout_ms))
        .routes(params.routes())
        .build_with_state(store.clone())?;

    match serde_json::to_string(&store.snapshot()) {
        Ok(json) => tracing::info!("Config: {}", json),
        Err(err) => tracing::warn!("Cannot serialize config: {}", err),
    }

    server.start_with_signals(None, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", err);
        pending::<()>().await;
    }
}
