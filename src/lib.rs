//! Bot Risk Agent for Zentinel
//!
//! Evaluates inbound HTTP requests for bot risk using an encrypted risk
//! cookie and, when the cookie cannot be trusted, a remote risk API. Returns
//! NONE/BLOCK/CHALLENGE decisions and fails open on API errors.
//!
//! # Features
//!
//! - Risk cookie decryption (PBKDF2 + AES-256-CBC) and HMAC verification
//! - Validated request/response types for the risk API routes
//! - Cookie-first decision engine with configurable score threshold
//! - Per-action handler dispatch
//! - Visitor reset after a solved challenge
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zentinel_agent_bot_risk::{ActionHandlers, BotRiskAgent, BotRiskConfig, HttpTransport};
//!
//! let transport = Arc::new(HttpTransport::new(&config.api)?);
//! let agent = BotRiskAgent::new(config, transport)?;
//! let status = agent
//!     .protect(&request, ActionHandlers::new(|| 200, || 403, || 429))
//!     .await?;
//! ```

pub mod action;
pub mod agent;
pub mod api;
pub mod config;
pub mod cookie;
pub mod diagnostics;
pub mod engine;
pub mod error;

pub use action::{ActionHandlers, MitigationAction};
pub use agent::{BotRiskAgent, BotRiskAgentBuilder, Evaluation};
pub use api::{ApiClient, HttpTransport, RiskTransport};
pub use config::{BotRiskConfig, RiskPolicy};
pub use cookie::{CookieCodec, CookieStatus, DecodedCookie};
pub use diagnostics::{ErrorSink, TracingErrorSink};
pub use engine::{RequestInfo, RiskQueryResult};
pub use error::{ApiError, BotRiskError, ConfigError, RequestError};
