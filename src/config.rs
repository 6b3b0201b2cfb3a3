//! Startup route directives.
//!
//! Every directive is a list of `path:value` entries. The entry is split at its first colon,
//! so values such as URLs may contain further colons while paths may not. Directives naming
//! the same path accumulate onto one policy:
//!
//! ```text
//! --text /hello:world --delay /hello:250 --error-rate /hello:10
//! ```

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::{
    common::data::{AuthMode, PolicyPatch, ResponseCode},
    server::state::{self, PolicyStore},
};

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid {directive} route '{entry}': {reason}")]
    InvalidRoute {
        directive: Directive,
        entry: String,
        reason: String,
    },
    #[error("cannot register route: {0}")]
    RegistrationError(#[from] state::Error),
}

/// The kinds of route directives accepted at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Text,
    Redirect,
    Error,
    Proxy,
    Auth,
    Delay,
    ErrorRate,
}

impl Directive {
    pub fn name(self) -> &'static str {
        match self {
            Directive::Text => "text",
            Directive::Redirect => "redirect",
            Directive::Error => "error",
            Directive::Proxy => "proxy",
            Directive::Auth => "auth",
            Directive::Delay => "delay",
            Directive::ErrorRate => "error-rate",
        }
    }

    fn log_label(self) -> &'static str {
        match self {
            Directive::Text => "Text route",
            Directive::Redirect => "Redirect route",
            Directive::Error => "Error route",
            Directive::Proxy => "Proxy route",
            Directive::Auth => "Auth for route",
            Directive::Delay => "Add delay for route",
            Directive::ErrorRate => "Add error rate for route",
        }
    }

    /// Turns the value part of an entry into the update it stands for.
    fn to_patch(self, value: &str) -> Result<PolicyPatch, String> {
        let patch = match self {
            Directive::Text => PolicyPatch {
                response_code: Some(Some(ResponseCode::Ok)),
                text_body: Some(Some(value.to_string())),
                ..PolicyPatch::default()
            },
            Directive::Error => PolicyPatch {
                response_code: Some(Some(ResponseCode::ServiceUnavailable)),
                text_body: Some(Some(value.to_string())),
                ..PolicyPatch::default()
            },
            Directive::Redirect => PolicyPatch {
                response_code: Some(Some(ResponseCode::Found)),
                redirect_target: Some(Some(parse_target(value)?)),
                ..PolicyPatch::default()
            },
            Directive::Proxy => PolicyPatch {
                proxy_target: Some(Some(parse_target(value)?)),
                ..PolicyPatch::default()
            },
            Directive::Auth => PolicyPatch {
                auth_mode: Some(Some(value.parse::<AuthMode>()?)),
                ..PolicyPatch::default()
            },
            Directive::Delay => {
                let millis = value
                    .parse::<u64>()
                    .map_err(|err| format!("delay must be a non-negative integer: {}", err))?;
                PolicyPatch {
                    delay_millis: Some(Some(millis)),
                    ..PolicyPatch::default()
                }
            }
            Directive::ErrorRate => {
                let rate = value
                    .parse::<f64>()
                    .map_err(|err| format!("error rate must be a number: {}", err))?;
                if !rate.is_finite() {
                    return Err("error rate must be a finite number".to_string());
                }
                PolicyPatch {
                    error_rate_percent: Some(Some(rate)),
                    ..PolicyPatch::default()
                }
            }
        };

        Ok(patch)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_target(value: &str) -> Result<String, String> {
    let url = Url::parse(value).map_err(|err| format!("'{}' is not a URL: {}", value, err))?;

    match url.scheme() {
        "http" | "https" => Ok(value.to_string()),
        other => Err(format!("unsupported URL scheme '{}'", other)),
    }
}

/// A single validated `path:value` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub directive: Directive,
    pub path: String,
    pub patch: PolicyPatch,
    entry: String,
}

impl Route {
    pub fn parse(directive: Directive, entry: &str) -> Result<Self, Error> {
        let invalid = |reason: String| Error::InvalidRoute {
            directive,
            entry: entry.to_string(),
            reason,
        };

        let (path, value) = entry
            .split_once(':')
            .ok_or_else(|| invalid("expected 'path:value'".to_string()))?;

        if !path.starts_with('/') {
            return Err(invalid(format!("path '{}' must start with '/'", path)));
        }

        let patch = directive.to_patch(value).map_err(invalid)?;

        Ok(Self {
            directive,
            path: path.to_string(),
            patch,
            entry: entry.to_string(),
        })
    }
}

/// Raw route directives, typically collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct RouteConfig {
    pub text: Vec<String>,
    pub redirect: Vec<String>,
    pub error: Vec<String>,
    pub proxy: Vec<String>,
    pub auth: Vec<String>,
    pub delay: Vec<String>,
    pub error_rate: Vec<String>,
}

impl RouteConfig {
    /// Validates every entry. The first malformed entry aborts parsing.
    pub fn parse(&self) -> Result<Vec<Route>, Error> {
        let groups = [
            (Directive::Text, &self.text),
            (Directive::Redirect, &self.redirect),
            (Directive::Error, &self.error),
            (Directive::Proxy, &self.proxy),
            (Directive::Auth, &self.auth),
            (Directive::Delay, &self.delay),
            (Directive::ErrorRate, &self.error_rate),
        ];

        groups
            .iter()
            .flat_map(|(directive, entries)| entries.iter().map(move |e| (*directive, e)))
            .map(|(directive, entry)| Route::parse(directive, entry))
            .collect()
    }

    /// Validates all entries and registers them in `store`. Nothing is registered when any
    /// entry is malformed.
    pub fn seed<S>(&self, store: &S) -> Result<Vec<Route>, Error>
    where
        S: PolicyStore + ?Sized,
    {
        let routes = self.parse()?;

        for route in &routes {
            store.fetch_or_create(&route.path);
            store.patch(&route.path, route.patch.clone())?;
            tracing::info!("{}: {}", route.directive.log_label(), route.entry);
        }

        Ok(routes)
    }
}
