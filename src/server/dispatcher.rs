use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Response, StatusCode};

use crate::{
    common::{
        data::{AuthMode, PathPolicy, ResponseCode},
        runtime,
    },
    server::{
        auth::TokenProvider,
        faults::FaultInjector,
        proxy::ProxyExecutor,
        state::PolicyStore,
        util::{redirect_response, text_response},
    },
};

/// Decides and produces the reply for a `GET` on a registered path.
///
/// The steps always run in the same order: look up the policy, wait for the configured
/// delay, roll for an injected fault, then proxy or answer from the static fields. Fault
/// injection wins over proxying and proxying wins over the static response code.
pub struct Dispatcher<S>
where
    S: PolicyStore + Send + Sync + 'static,
{
    store: Arc<S>,
    faults: FaultInjector,
    proxy: ProxyExecutor,
    token_provider: Arc<dyn TokenProvider + Send + Sync + 'static>,
    token_timeout: Duration,
}

impl<S> Dispatcher<S>
where
    S: PolicyStore + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<S>,
        faults: FaultInjector,
        proxy: ProxyExecutor,
        token_provider: Arc<dyn TokenProvider + Send + Sync + 'static>,
        token_timeout: Duration,
    ) -> Self {
        Self {
            store,
            faults,
            proxy,
            token_provider,
            token_timeout,
        }
    }

    pub async fn dispatch(&self, path: &str) -> Result<Response<Bytes>, http::Error> {
        let policy = match self.store.lookup(path) {
            Some(policy) => policy,
            None => return text_response(StatusCode::NOT_FOUND, "Not Found"),
        };

        runtime::sleep(policy.delay()).await;

        // Patches applied while the request was waiting take effect.
        let policy = self.store.lookup(path).unwrap_or(policy);

        if self.faults.should_fail(&policy) {
            tracing::debug!("Injecting fault for {}", path);
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Server Error");
        }

        if policy.proxy_target.is_some() {
            return self.proxy(&policy).await;
        }

        respond_statically(policy)
    }

    async fn proxy(&self, policy: &PathPolicy) -> Result<Response<Bytes>, http::Error> {
        let mut headers = HeaderMap::new();

        if let Some(AuthMode::GcpId) = policy.auth_mode {
            match self.bearer_header(policy).await {
                Ok(value) => {
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(reason) => {
                    tracing::warn!(
                        "Cannot authenticate proxy request for {}: {}",
                        policy.path,
                        reason
                    );
                    return text_response(StatusCode::BAD_GATEWAY, "Bad auth");
                }
            }
        }

        self.proxy.execute(policy, headers).await
    }

    async fn bearer_header(&self, policy: &PathPolicy) -> Result<HeaderValue, String> {
        let audience = policy.proxy_target.as_deref().unwrap_or_default();

        let token = runtime::with_timeout(
            self.token_timeout,
            self.token_provider.fetch_identity_token(audience),
        )
        .await
        .ok_or_else(|| format!("no token within {:?}", self.token_timeout))?
        .map_err(|err| err.to_string())?;

        HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|err| format!("token is not a valid header value: {}", err))
    }
}

fn respond_statically(policy: PathPolicy) -> Result<Response<Bytes>, http::Error> {
    match (policy.response_code, policy.redirect_target) {
        (Some(ResponseCode::Found), Some(target)) => redirect_response(&target),
        (Some(code @ (ResponseCode::Ok | ResponseCode::ServiceUnavailable)), _) => {
            text_response(code.status(), policy.text_body.unwrap_or_default())
        }
        _ => {
            tracing::warn!("No response configured for {}", policy.path);
            text_response(StatusCode::NOT_IMPLEMENTED, "No response configured")
        }
    }
}
