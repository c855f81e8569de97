//! Risk API protocol client.
//!
//! Each call is a request type implementing [`RiskCall`] paired with a
//! response type implementing [`RiskReply`]. Requests are validated when
//! built; responses are validated field by field when parsed.

pub mod request;
pub mod response;
pub mod transport;

pub use request::{
    Header, HttpMethod, HttpVersion, ResetReason, RiskRequest, RiskRequestBuilder,
    RiskResetByRequestId, RiskResetByVisitorId, RiskResetRequest, RiskResetRequestBuilder,
    S2sCallReason,
};
pub use response::{
    RiskReply, RiskResetByRequestIdResponse, RiskResetByVisitorIdResponse, RiskResetResponse,
    RiskResponse,
};
pub use transport::{AuthHeaders, HttpTransport, RiskTransport};

use crate::error::ApiError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Risk API routes, relative to the API base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskRoute {
    Risk,
    Reset,
    ResetByRequestId,
    ResetByVisitorId,
}

impl RiskRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRoute::Risk => "risk",
            RiskRoute::Reset => "risk/reset",
            RiskRoute::ResetByRequestId => "risk/reset/req_id",
            RiskRoute::ResetByVisitorId => "risk/reset/visitor_id",
        }
    }
}

impl fmt::Display for RiskRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that can be submitted to the risk API.
pub trait RiskCall {
    /// Route the body is posted to.
    const ROUTE: RiskRoute;

    /// Parsed reply for this call.
    type Response: RiskReply;

    /// JSON request body.
    fn body(&self) -> Value;
}

/// Submits [`RiskCall`]s through a transport with bearer authorization.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn RiskTransport>,
    auth: AuthHeaders,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn RiskTransport>, api_token: &str) -> Self {
        Self {
            transport,
            auth: AuthHeaders::bearer(api_token),
        }
    }

    /// Send one call and parse its reply. Nothing is retried.
    pub async fn send<C>(&self, call: &C) -> Result<C::Response, ApiError>
    where
        C: RiskCall + Sync,
    {
        let body = call.body();
        debug!(route = %C::ROUTE, "Calling risk API");

        let response = self.transport.post(C::ROUTE, &body, &self.auth).await?;
        C::Response::from_json(response)
    }
}
