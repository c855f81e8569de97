//! Shared helpers for the integration tests.

#![allow(dead_code)]

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zentinel_agent_bot_risk::api::{AuthHeaders, Header, RiskRoute, RiskTransport};
use zentinel_agent_bot_risk::error::TransportError;
use zentinel_agent_bot_risk::{BotRiskConfig, ErrorSink, RequestInfo};

pub const SECRET: &str = "integration-secret";
pub const API_TOKEN: &str = "integration-token";
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) Safari/605.1.15";

pub fn config(threshold: u8) -> BotRiskConfig {
    BotRiskConfig {
        app_id: "PXapp123".to_string(),
        secret_key: SECRET.to_string(),
        api_token: API_TOKEN.to_string(),
        score_threshold: threshold,
        ..Default::default()
    }
}

pub fn request(cookie: Option<&str>) -> RequestInfo {
    let mut headers = vec![
        Header::new("Host", "shop.example"),
        Header::new("User-Agent", USER_AGENT),
    ];
    if let Some(cookie) = cookie {
        headers.push(Header::new("Cookie", format!("session=s1; _px={cookie}")));
    }

    RequestInfo {
        client_ip: "192.0.2.10".to_string(),
        url: "https://shop.example/checkout?step=2".to_string(),
        path: Some("/checkout".to_string()),
        method: "POST".to_string(),
        http_version: "HTTP/1.1".to_string(),
        headers,
    }
}

fn epoch_ms(offset: Duration, future: bool) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let offset = offset.as_millis() as u64;
    if future {
        now + offset
    } else {
        now - offset
    }
}

/// A cookie the agent will accept for `USER_AGENT`, expiring in an hour.
pub fn fresh_cookie(bot_score: i64) -> String {
    seal_cookie(epoch_ms(Duration::from_secs(3600), true), bot_score, USER_AGENT)
}

/// An authentic cookie whose timestamp already passed.
pub fn expired_cookie(bot_score: i64) -> String {
    seal_cookie(epoch_ms(Duration::from_secs(60), false), bot_score, USER_AGENT)
}

/// Encrypt and sign a cookie the way the risk service issues them.
pub fn seal_cookie(timestamp_ms: u64, bot_score: i64, user_agent: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp_ms}0{bot_score}cookie-uuidcookie-vid{user_agent}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let payload = json!({
        "t": timestamp_ms,
        "s": {"a": 0, "b": bot_score},
        "u": "cookie-uuid",
        "v": "cookie-vid",
        "h": signature,
    })
    .to_string();

    let salt = b"integration-salt";
    let iterations = 1000;
    let mut derived = [0u8; 48];
    pbkdf2::pbkdf2_hmac::<Sha256>(SECRET.as_bytes(), salt, iterations, &mut derived);
    let (key, iv) = derived.split_at(32);
    let ciphertext = cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(payload.as_bytes());

    format!(
        "{}:{}:{}",
        general_purpose::STANDARD.encode(salt),
        iterations,
        general_purpose::STANDARD.encode(ciphertext)
    )
}

/// One recorded transport call.
#[derive(Debug, Clone)]
pub struct Call {
    pub route: RiskRoute,
    pub body: Value,
    pub authorization: Option<String>,
}

/// Replays queued replies and records every call.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<Value, String>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub fn replying(replies: impl IntoIterator<Item = Value>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            calls: Mutex::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RiskTransport for MockTransport {
    async fn post(
        &self,
        route: RiskRoute,
        body: &Value,
        auth: &AuthHeaders,
    ) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(Call {
            route,
            body: body.clone(),
            authorization: auth.get("authorization").map(str::to_string),
        });

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(TransportError::Unavailable(message)),
            None => Err(TransportError::Unavailable("no reply queued".to_string())),
        }
    }
}

/// Keeps every absorbed error.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn log_error(&self, source: &str, message: &str, _cause: Option<&(dyn Error + 'static)>) {
        self.entries
            .lock()
            .unwrap()
            .push((source.to_string(), message.to_string()));
    }
}
