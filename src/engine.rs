//! Risk decision engine.
//!
//! Trusts a valid, low-risk cookie outright. Anything else defers to a
//! synchronous `risk` API call whose outcome decides the action. API and
//! transport failures fail open.

use crate::action::MitigationAction;
use crate::api::{ApiClient, Header, RiskRequest, S2sCallReason};
use crate::cookie::DecodedCookie;
use crate::diagnostics::ErrorSink;
use crate::error::RequestError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The parts of an inbound HTTP request the agent needs.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Client IP address
    pub client_ip: String,
    /// Full URL with scheme and query
    pub url: String,
    /// Request path
    pub path: Option<String>,
    /// HTTP method
    pub method: String,
    /// Protocol version, with or without the `HTTP/` prefix
    pub http_version: String,
    /// Request headers in arrival order
    pub headers: Vec<Header>,
}

impl RequestInfo {
    /// Get a single header value (first if repeated), case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Get the User-Agent header.
    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// Extract the cookie named `cookie_name` from the Cookie header(s).
    pub fn risk_cookie(&self, cookie_name: &str) -> Option<&str> {
        let prefix = format!("{cookie_name}=");
        self.headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case("cookie"))
            .flat_map(|h| h.value.split(';'))
            .find_map(|cookie| cookie.trim().strip_prefix(prefix.as_str()))
    }
}

/// Outcome of the query branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiskQueryResult {
    /// Whether a `risk` call completed successfully
    pub executed: bool,
    pub score: Option<u8>,
    pub uuid: Option<String>,
    pub action: MitigationAction,
}

impl RiskQueryResult {
    fn not_executed() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> Value {
        if self.executed {
            json!({
                "executed": true,
                "uuid": self.uuid,
                "score": self.score,
                "action": self.action.as_str(),
            })
        } else {
            json!({ "executed": false })
        }
    }
}

/// Action and query outcome for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: MitigationAction,
    pub query: RiskQueryResult,
}

/// What the cookie alone says. `DeferredQuery` never leaves this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CookieVerdict {
    Trusted,
    DeferredQuery,
}

/// Turns a decoded cookie, and a `risk` call when needed, into an action.
#[derive(Clone)]
pub struct DecisionEngine {
    client: ApiClient,
    sink: Arc<dyn ErrorSink>,
}

impl DecisionEngine {
    pub fn new(client: ApiClient, sink: Arc<dyn ErrorSink>) -> Self {
        Self { client, sink }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Decide on `request` given its decoded cookie.
    ///
    /// Only a malformed request (bad IP, unsupported method or version)
    /// produces an error; API failures resolve to `None`.
    pub async fn decide(
        &self,
        request: &RequestInfo,
        cookie: &DecodedCookie,
        threshold: u8,
    ) -> Result<Decision, RequestError> {
        let verdict = if cookie.use_cookie(threshold) {
            CookieVerdict::Trusted
        } else {
            CookieVerdict::DeferredQuery
        };

        let query = match verdict {
            CookieVerdict::Trusted => RiskQueryResult::not_executed(),
            CookieVerdict::DeferredQuery => {
                let risk_request = build_risk_request(request, cookie)?;
                self.query(&risk_request, threshold).await
            }
        };

        Ok(Decision {
            action: resolve(verdict, &query),
            query,
        })
    }

    async fn query(&self, risk_request: &RiskRequest, threshold: u8) -> RiskQueryResult {
        let started = Instant::now();
        let result = self.client.send(risk_request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let action = if response.score >= threshold {
                    response.action.unwrap_or_default()
                } else {
                    MitigationAction::None
                };
                debug!(
                    elapsed_ms,
                    uuid = %response.uuid,
                    score = response.score,
                    action = action.as_str(),
                    "Risk query complete"
                );

                RiskQueryResult {
                    executed: true,
                    score: Some(response.score),
                    uuid: Some(response.uuid),
                    action,
                }
            }
            Err(err) => {
                let response = err
                    .response_body()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "none".to_string());
                let cause: &(dyn std::error::Error + 'static) = &err;
                self.sink.log_error(
                    "bot_risk::engine",
                    &format!(
                        "Error accessing risk API (request: {risk_request}, response: {response})"
                    ),
                    Some(cause),
                );
                debug!(elapsed_ms, "Risk query failed, failing open");

                RiskQueryResult::not_executed()
            }
        }
    }
}

/// Build the `risk` call for a request whose cookie was not trusted.
pub fn build_risk_request(
    request: &RequestInfo,
    cookie: &DecodedCookie,
) -> Result<RiskRequest, RequestError> {
    let mut builder = RiskRequest::builder(&request.client_ip, &request.url, &request.headers)
        .s2s_call_reason(S2sCallReason::from(cookie.status()));

    if let Some(path) = &request.path {
        builder = builder.uri(path.clone());
    }
    if let Some(raw) = cookie.raw().filter(|raw| !raw.trim().is_empty()) {
        builder = builder.px_cookie(raw);
    }
    if !request.method.is_empty() {
        builder = builder.http_method(request.method.clone());
    }
    let version = request.http_version.trim_start_matches("HTTP/");
    if !version.is_empty() {
        builder = builder.http_version(version);
    }

    builder.build()
}

fn resolve(verdict: CookieVerdict, query: &RiskQueryResult) -> MitigationAction {
    match verdict {
        CookieVerdict::Trusted => MitigationAction::None,
        CookieVerdict::DeferredQuery => query.action,
    }
}
