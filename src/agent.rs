//! Main bot risk agent implementation.

use crate::action::{ActionHandlers, MitigationAction};
use crate::api::{
    ApiClient, ResetReason, RiskResetByRequestId, RiskResetByRequestIdResponse,
    RiskResetByVisitorId, RiskResetByVisitorIdResponse, RiskResetRequest, RiskTransport,
};
use crate::config::{BotRiskConfig, RiskPolicy};
use crate::cookie::{CookieCodec, CookieStatus, DecodedCookie};
use crate::diagnostics::{ErrorSink, TracingErrorSink};
use crate::engine::{DecisionEngine, RequestInfo, RiskQueryResult};
use crate::error::{ApiError, BotRiskError, ConfigError, RequestError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Everything decided about one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub action: MitigationAction,
    pub cookie: DecodedCookie,
    pub query: RiskQueryResult,
}

impl Evaluation {
    pub fn summary(&self) -> Value {
        json!({
            "action": self.action.as_str(),
            "cookie_info": self.cookie.summary(),
            "xquery_info": self.query.summary(),
        })
    }
}

/// Bot risk agent.
///
/// Built once at startup and shared read-only between requests.
pub struct BotRiskAgent {
    /// Configuration
    config: Arc<BotRiskConfig>,
    /// Threshold and enablement source
    policy: Arc<dyn RiskPolicy>,
    /// Absorbed-failure sink
    sink: Arc<dyn ErrorSink>,
    /// Cookie decoder
    codec: CookieCodec,
    /// Cookie/API decision logic
    engine: DecisionEngine,
}

impl BotRiskAgent {
    /// Create an agent using the config's static threshold and the tracing
    /// error sink.
    pub fn new(
        config: BotRiskConfig,
        transport: Arc<dyn RiskTransport>,
    ) -> Result<Self, ConfigError> {
        Self::builder(config, transport).build()
    }

    pub fn builder(config: BotRiskConfig, transport: Arc<dyn RiskTransport>) -> BotRiskAgentBuilder {
        BotRiskAgentBuilder {
            config,
            transport,
            policy: None,
            sink: None,
        }
    }

    pub fn name(&self) -> &str {
        "bot-risk"
    }

    pub fn config(&self) -> &BotRiskConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.enabled()
    }

    pub fn client(&self) -> &ApiClient {
        self.engine.client()
    }

    /// Decode the request's risk cookie.
    pub fn decode_cookie(&self, request: &RequestInfo) -> DecodedCookie {
        let raw = request.risk_cookie(&self.config.cookie_name);
        let user_agent = request.user_agent();

        match self.codec.decode(raw, user_agent, SystemTime::now()) {
            Ok(cookie) => cookie,
            Err(err) => {
                let cause: &(dyn std::error::Error + 'static) = &err;
                self.sink.log_error(
                    "bot_risk::cookie",
                    &format!(
                        "Unexpected {err} (ip: {}, ua: {})",
                        request.client_ip,
                        user_agent.unwrap_or_default()
                    ),
                    Some(cause),
                );
                match raw {
                    Some(raw) => DecodedCookie::untrusted(CookieStatus::DecryptionFailed, raw),
                    None => DecodedCookie::absent(),
                }
            }
        }
    }

    /// Evaluate `request` without running any handler.
    pub async fn evaluate(&self, request: &RequestInfo) -> Result<Evaluation, RequestError> {
        let threshold = self.policy.score_threshold();
        let cookie = self.decode_cookie(request);
        debug!(
            client_ip = %request.client_ip,
            cookie_status = cookie.status().as_str(),
            "Risk cookie decoded"
        );

        let decision = self.engine.decide(request, &cookie, threshold).await?;

        info!(
            client_ip = %request.client_ip,
            path = request.path.as_deref().unwrap_or_default(),
            cookie_status = cookie.status().as_str(),
            queried = decision.query.executed,
            score = decision.query.score,
            action = decision.action.as_str(),
            "Bot risk evaluation complete"
        );

        Ok(Evaluation {
            action: decision.action,
            cookie,
            query: decision.query,
        })
    }

    /// Evaluate `request` and run the matching handler.
    ///
    /// When the policy reports the agent disabled, `on_none` runs without
    /// any evaluation.
    pub async fn protect<T, N, B, C>(
        &self,
        request: &RequestInfo,
        handlers: ActionHandlers<N, B, C>,
    ) -> Result<T, RequestError>
    where
        N: FnOnce() -> T,
        B: FnOnce() -> T,
        C: FnOnce() -> T,
    {
        if !self.is_enabled() {
            debug!("Bot risk evaluation disabled");
            return Ok(handlers.dispatch(MitigationAction::None));
        }

        let evaluation = self.evaluate(request).await?;
        Ok(handlers.dispatch(evaluation.action))
    }

    /// Clear the negative score of visitor `vid` after a solved challenge.
    ///
    /// Returns the request id of the reset.
    pub async fn reset(&self, request: &RequestInfo, vid: &str) -> Result<String, BotRiskError> {
        self.reset_with_reason(request, vid, ResetReason::CaptchaSolved)
            .await
    }

    /// Reset visitor `vid` for an operator-supplied `reason`.
    pub async fn reset_with_reason(
        &self,
        request: &RequestInfo,
        vid: &str,
        reason: ResetReason,
    ) -> Result<String, BotRiskError> {
        let mut builder = RiskResetRequest::builder(
            &request.client_ip,
            &request.url,
            &request.headers,
            reason,
        )
        .vid(vid);
        if let Some(path) = &request.path {
            builder = builder.uri(path.clone());
        }
        let reset_request = builder.build()?;

        let response = self.client().send(&reset_request).await?;
        info!(vid, reason = reason.as_str(), uuid = %response.uuid, "Visitor risk reset");
        Ok(response.uuid)
    }

    /// Clear the state attached to request id `uuid` for `period` seconds.
    pub async fn reset_request_id(
        &self,
        uuid: &str,
        period: u64,
    ) -> Result<RiskResetByRequestIdResponse, ApiError> {
        self.client()
            .send(&RiskResetByRequestId::new(uuid, period))
            .await
    }

    /// Clear visitor `vid` for `period` seconds.
    pub async fn reset_visitor_id(
        &self,
        vid: &str,
        period: u64,
    ) -> Result<RiskResetByVisitorIdResponse, ApiError> {
        self.client()
            .send(&RiskResetByVisitorId::new(vid, period))
            .await
    }
}

/// Collects the injected collaborators before the agent is frozen.
pub struct BotRiskAgentBuilder {
    config: BotRiskConfig,
    transport: Arc<dyn RiskTransport>,
    policy: Option<Arc<dyn RiskPolicy>>,
    sink: Option<Arc<dyn ErrorSink>>,
}

impl BotRiskAgentBuilder {
    /// Use a dynamic threshold/enablement source instead of the config values.
    pub fn with_policy(mut self, policy: Arc<dyn RiskPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<BotRiskAgent, ConfigError> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let policy = self
            .policy
            .unwrap_or_else(|| config.clone() as Arc<dyn RiskPolicy>);
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingErrorSink) as Arc<dyn ErrorSink>);

        let codec = CookieCodec::new(config.secret_key.clone(), config.max_cookie_iterations);
        let client = ApiClient::new(self.transport, &config.api_token);
        let engine = DecisionEngine::new(client, sink.clone());

        Ok(BotRiskAgent {
            config,
            policy,
            sink,
            codec,
            engine,
        })
    }
}
