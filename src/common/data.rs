use std::{convert::TryFrom, fmt, str::FromStr, time::Duration};

use http::StatusCode;
use serde::{de, Deserialize, Deserializer, Serialize};

// *************************************************************************************************
// Response codes and auth modes
// *************************************************************************************************

/// The static response codes a policy can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum ResponseCode {
    /// `200`, replies with the policy text.
    Ok,
    /// `302`, redirects to the policy redirect target.
    Found,
    /// `503`, replies with the policy text.
    ServiceUnavailable,
}

impl ResponseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ResponseCode::Ok => 200,
            ResponseCode::Found => 302,
            ResponseCode::ServiceUnavailable => 503,
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ResponseCode::Ok => StatusCode::OK,
            ResponseCode::Found => StatusCode::FOUND,
            ResponseCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            200 => Ok(ResponseCode::Ok),
            302 => Ok(ResponseCode::Found),
            503 => Ok(ResponseCode::ServiceUnavailable),
            other => Err(format!(
                "unsupported response code {} (expected 200, 302 or 503)",
                other
            )),
        }
    }
}

impl From<ResponseCode> for u16 {
    fn from(code: ResponseCode) -> Self {
        code.as_u16()
    }
}

/// Authentication attached to proxied requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    /// Google Cloud identity token scoped to the proxy target.
    #[serde(rename = "GCP_ID")]
    GcpId,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "GCP_ID" => Ok(AuthMode::GcpId),
            other => Err(format!("unknown auth mode '{}' (expected GCP_ID)", other)),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::GcpId => f.write_str("GCP_ID"),
        }
    }
}

// *************************************************************************************************
// PathPolicy
// *************************************************************************************************

/// The response behaviour configured for a single path.
///
/// The serialized form uses the short field names accepted by `PATCH` requests
/// (`code`, `text`, `redirect`, `proxy`, `auth`, `delay`, `errorRate`). Unset fields are
/// omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PathPolicy {
    #[serde(skip)]
    pub path: String,
    #[serde(rename = "code", skip_serializing_if = "Option::is_none")]
    pub response_code: Option<ResponseCode>,
    #[serde(rename = "text", skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    #[serde(rename = "redirect", skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    #[serde(rename = "proxy", skip_serializing_if = "Option::is_none")]
    pub proxy_target: Option<String>,
    #[serde(rename = "auth", skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<AuthMode>,
    #[serde(rename = "delay", skip_serializing_if = "Option::is_none")]
    pub delay_millis: Option<u64>,
    #[serde(rename = "errorRate", skip_serializing_if = "Option::is_none")]
    pub error_rate_percent: Option<f64>,
}

impl PathPolicy {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_millis.unwrap_or(0))
    }

    pub fn error_rate(&self) -> f64 {
        self.error_rate_percent.unwrap_or(0.0)
    }

    /// Shallow, field-wise merge. Fields absent from the patch keep their value.
    pub fn apply(&mut self, patch: PolicyPatch) {
        merge(&mut self.response_code, patch.response_code);
        merge(&mut self.text_body, patch.text_body);
        merge(&mut self.redirect_target, patch.redirect_target);
        merge(&mut self.proxy_target, patch.proxy_target);
        merge(&mut self.auth_mode, patch.auth_mode);
        merge(&mut self.delay_millis, patch.delay_millis);
        merge(&mut self.error_rate_percent, patch.error_rate_percent);
    }
}

fn merge<T>(field: &mut Option<T>, update: Option<Option<T>>) {
    if let Some(value) = update {
        *field = value;
    }
}

// *************************************************************************************************
// PolicyPatch
// *************************************************************************************************

/// A partial policy update.
///
/// The outer `Option` tells whether a field was present at all, the inner one carries the
/// new value. An explicit JSON `null` therefore clears the stored value, while a missing
/// field leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PolicyPatch {
    #[serde(rename = "code", alias = "responseCode", default, deserialize_with = "present")]
    pub response_code: Option<Option<ResponseCode>>,
    #[serde(rename = "text", alias = "textBody", default, deserialize_with = "present")]
    pub text_body: Option<Option<String>>,
    #[serde(rename = "redirect", alias = "redirectTarget", default, deserialize_with = "present")]
    pub redirect_target: Option<Option<String>>,
    #[serde(rename = "proxy", alias = "proxyTarget", default, deserialize_with = "present")]
    pub proxy_target: Option<Option<String>>,
    #[serde(rename = "auth", alias = "authMode", default, deserialize_with = "present")]
    pub auth_mode: Option<Option<AuthMode>>,
    #[serde(
        rename = "delay",
        alias = "delayMillis",
        default,
        deserialize_with = "present_number"
    )]
    pub delay_millis: Option<Option<u64>>,
    #[serde(
        rename = "errorRate",
        alias = "errorRatePercent",
        default,
        deserialize_with = "present_number"
    )]
    pub error_rate_percent: Option<Option<f64>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// Numbers set from the command line used to arrive as strings, so both forms are accepted.
fn present_number<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText<N> {
        Number(N),
        Text(String),
    }

    match Option::<NumberOrText<T>>::deserialize(deserializer)? {
        None => Ok(Some(None)),
        Some(NumberOrText::Number(value)) => Ok(Some(Some(value))),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse::<T>()
            .map(|value| Some(Some(value)))
            .map_err(|err| de::Error::custom(format!("invalid number '{}': {}", text, err))),
    }
}
