//! Risk API request payloads.
//!
//! Every request is validated when it is built and is immutable afterwards.

use super::{RiskCall, RiskRoute};
use super::response::{
    RiskResetByRequestIdResponse, RiskResetByVisitorIdResponse, RiskResetResponse, RiskResponse,
};
use crate::cookie::CookieStatus;
use crate::error::RequestError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Maximum number of `custom_paramN` fields accepted by the API.
pub const MAX_CUSTOM_PARAMS: usize = 10;

/// A request header forwarded to the risk API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

fn lookup<T: Copy>(
    field: &'static str,
    expected: &'static str,
    value: &str,
    table: &[(&'static str, T)],
) -> Result<T, RequestError> {
    let needle = value.trim();
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(needle))
        .map(|(_, variant)| *variant)
        .ok_or_else(|| RequestError::InvalidValue {
            field,
            value: value.to_string(),
            expected,
        })
}

/// Why the server-to-server call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S2sCallReason {
    None,
    ExpiredCookie,
    NoCookie,
    CookieDecryptionFailed,
    CookieVerificationFailed,
}

impl S2sCallReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            S2sCallReason::None => "none",
            S2sCallReason::ExpiredCookie => "expired_cookie",
            S2sCallReason::NoCookie => "no_cookie",
            S2sCallReason::CookieDecryptionFailed => "cookie_decryption_failed",
            S2sCallReason::CookieVerificationFailed => "cookie_verification_failed",
        }
    }
}

impl From<CookieStatus> for S2sCallReason {
    fn from(status: CookieStatus) -> Self {
        match status {
            CookieStatus::Valid => S2sCallReason::None,
            CookieStatus::Expired => S2sCallReason::ExpiredCookie,
            CookieStatus::NoCookie => S2sCallReason::NoCookie,
            CookieStatus::DecryptionFailed => S2sCallReason::CookieDecryptionFailed,
            CookieStatus::VerificationFailed => S2sCallReason::CookieVerificationFailed,
        }
    }
}

/// HTTP method of the inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Get,
    Put,
    Delete,
    Options,
    Head,
    Trace,
    Connect,
    Unknown,
    Patch,
}

impl HttpMethod {
    const TABLE: [(&'static str, HttpMethod); 10] = [
        ("POST", HttpMethod::Post),
        ("GET", HttpMethod::Get),
        ("PUT", HttpMethod::Put),
        ("DELETE", HttpMethod::Delete),
        ("OPTIONS", HttpMethod::Options),
        ("HEAD", HttpMethod::Head),
        ("TRACE", HttpMethod::Trace),
        ("CONNECT", HttpMethod::Connect),
        ("UNKNOWN", HttpMethod::Unknown),
        ("PATCH", HttpMethod::Patch),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Unknown => "UNKNOWN",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(
            "http_method",
            "POST/GET/PUT/DELETE/OPTIONS/HEAD/TRACE/CONNECT/UNKNOWN/PATCH",
            s,
            &Self::TABLE,
        )
    }
}

/// HTTP protocol version of the inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
    Http20,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http10 => "1.0",
            HttpVersion::Http11 => "1.1",
            HttpVersion::Http20 => "2.0",
        }
    }
}

impl FromStr for HttpVersion {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(
            "http_version",
            "1.0/1.1/2.0",
            s,
            &[
                ("1.0", HttpVersion::Http10),
                ("1.1", HttpVersion::Http11),
                ("2.0", HttpVersion::Http20),
                ("2", HttpVersion::Http20),
            ],
        )
    }
}

/// Why a visitor's score is being reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    CaptchaSolved,
    CustomerSupport,
    Other,
}

impl ResetReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetReason::CaptchaSolved => "captcha_solved",
            ResetReason::CustomerSupport => "customer_support",
            ResetReason::Other => "other",
        }
    }
}

impl FromStr for ResetReason {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(
            "reset_reason",
            "captcha_solved/customer_support/other",
            s,
            &[
                ("captcha_solved", ResetReason::CaptchaSolved),
                ("customer_support", ResetReason::CustomerSupport),
                ("other", ResetReason::Other),
            ],
        )
    }
}

/// Fields shared by requests that describe an inbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestSection {
    ip: String,
    url: String,
    uri: Option<String>,
    headers: Vec<Header>,
}

impl RequestSection {
    fn new(
        ip: String,
        url: String,
        uri: Option<String>,
        headers: Vec<Header>,
    ) -> Result<Self, RequestError> {
        if ip.parse::<IpAddr>().is_err() {
            return Err(RequestError::InvalidIp(ip));
        }

        Ok(Self {
            ip,
            url,
            uri,
            headers,
        })
    }

    fn to_json(&self) -> Value {
        let mut section = Map::new();
        section.insert("ip".into(), json!(self.ip));
        section.insert("uri".into(), json!(self.uri));
        section.insert("url".into(), json!(self.url));
        section.insert("headers".into(), json!(self.headers));
        Value::Object(section)
    }
}

/// Only name/value pairs are forwarded.
fn sanitize_headers(headers: &[Header]) -> Vec<Header> {
    headers
        .iter()
        .map(|h| Header::new(h.name.clone(), h.value.clone()))
        .collect()
}

/// Risk assessment request (`risk`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskRequest {
    section: RequestSection,
    s2s_call_reason: Option<S2sCallReason>,
    vid: Option<String>,
    px_cookie: Option<String>,
    http_method: Option<HttpMethod>,
    http_version: Option<HttpVersion>,
    custom_params: Vec<String>,
}

impl RiskRequest {
    pub fn builder(ip: &str, url: &str, headers: &[Header]) -> RiskRequestBuilder {
        RiskRequestBuilder {
            ip: ip.to_string(),
            url: url.to_string(),
            headers: sanitize_headers(headers),
            uri: None,
            s2s_call_reason: None,
            vid: None,
            px_cookie: None,
            http_method: None,
            http_version: None,
            custom_params: Vec::new(),
        }
    }

    pub fn ip(&self) -> &str {
        &self.section.ip
    }

    pub fn url(&self) -> &str {
        &self.section.url
    }

    pub fn uri(&self) -> Option<&str> {
        self.section.uri.as_deref()
    }

    pub fn headers(&self) -> &[Header] {
        &self.section.headers
    }

    pub fn s2s_call_reason(&self) -> Option<S2sCallReason> {
        self.s2s_call_reason
    }

    pub fn vid(&self) -> Option<&str> {
        self.vid.as_deref()
    }

    pub fn px_cookie(&self) -> Option<&str> {
        self.px_cookie.as_deref()
    }

    pub fn http_method(&self) -> Option<HttpMethod> {
        self.http_method
    }

    pub fn http_version(&self) -> Option<HttpVersion> {
        self.http_version
    }

    pub fn custom_params(&self) -> &[String] {
        &self.custom_params
    }

    fn additional(&self) -> Value {
        let mut additional = Map::new();
        if let Some(reason) = self.s2s_call_reason {
            additional.insert("s2s_call_reason".into(), json!(reason.as_str()));
        }
        if let Some(cookie) = &self.px_cookie {
            additional.insert("px_cookie".into(), json!(cookie));
        }
        if let Some(version) = self.http_version {
            additional.insert("http_version".into(), json!(version.as_str()));
        }
        if let Some(method) = self.http_method {
            additional.insert("http_method".into(), json!(method.as_str()));
        }
        for (i, param) in self.custom_params.iter().enumerate() {
            additional.insert(format!("custom_param{}", i + 1), json!(param));
        }
        Value::Object(additional)
    }
}

impl RiskCall for RiskRequest {
    const ROUTE: RiskRoute = RiskRoute::Risk;
    type Response = RiskResponse;

    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("request".into(), self.section.to_json());
        body.insert("additional".into(), self.additional());
        if let Some(vid) = &self.vid {
            body.insert("vid".into(), json!(vid));
        }
        Value::Object(body)
    }
}

impl fmt::Display for RiskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body())
    }
}

/// Builder for [`RiskRequest`]; all validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct RiskRequestBuilder {
    ip: String,
    url: String,
    headers: Vec<Header>,
    uri: Option<String>,
    s2s_call_reason: Option<S2sCallReason>,
    vid: Option<String>,
    px_cookie: Option<String>,
    http_method: Option<String>,
    http_version: Option<String>,
    custom_params: Vec<String>,
}

impl RiskRequestBuilder {
    /// Path of the inbound request.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn s2s_call_reason(mut self, reason: S2sCallReason) -> Self {
        self.s2s_call_reason = Some(reason);
        self
    }

    /// Visitor id, from the risk cookie's `v` field.
    pub fn vid(mut self, vid: impl Into<String>) -> Self {
        self.vid = Some(vid.into());
        self
    }

    /// Raw risk cookie, sent when a cookie existed but was not trusted.
    pub fn px_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.px_cookie = Some(cookie.into());
        self
    }

    /// Case-insensitive; validated on build.
    pub fn http_method(mut self, method: impl Into<String>) -> Self {
        self.http_method = Some(method.into());
        self
    }

    /// `1.0`, `1.1` or `2.0`; validated on build.
    pub fn http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = Some(version.into());
        self
    }

    /// Append a custom parameter (user id, campaign id, ...).
    pub fn custom_param(mut self, value: impl Into<String>) -> Self {
        self.custom_params.push(value.into());
        self
    }

    pub fn build(self) -> Result<RiskRequest, RequestError> {
        if self.custom_params.len() > MAX_CUSTOM_PARAMS {
            return Err(RequestError::TooManyCustomParams(self.custom_params.len()));
        }

        let http_method = self.http_method.as_deref().map(str::parse::<HttpMethod>).transpose()?;
        let http_version = self.http_version.as_deref().map(str::parse::<HttpVersion>).transpose()?;
        let section = RequestSection::new(self.ip, self.url, self.uri, self.headers)?;

        Ok(RiskRequest {
            section,
            s2s_call_reason: self.s2s_call_reason,
            vid: self.vid,
            px_cookie: self.px_cookie,
            http_method,
            http_version,
            custom_params: self.custom_params,
        })
    }
}

/// Clears a visitor's negative score (`risk/reset`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskResetRequest {
    section: RequestSection,
    reset_reason: ResetReason,
    vid: Option<String>,
}

impl RiskResetRequest {
    pub fn builder(
        ip: &str,
        url: &str,
        headers: &[Header],
        reset_reason: ResetReason,
    ) -> RiskResetRequestBuilder {
        RiskResetRequestBuilder {
            ip: ip.to_string(),
            url: url.to_string(),
            headers: sanitize_headers(headers),
            uri: None,
            reset_reason,
            vid: None,
        }
    }

    pub fn reset_reason(&self) -> ResetReason {
        self.reset_reason
    }

    pub fn vid(&self) -> Option<&str> {
        self.vid.as_deref()
    }

    pub fn ip(&self) -> &str {
        &self.section.ip
    }
}

impl RiskCall for RiskResetRequest {
    const ROUTE: RiskRoute = RiskRoute::Reset;
    type Response = RiskResetResponse;

    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("request".into(), self.section.to_json());
        body.insert(
            "additional".into(),
            json!({ "reset_reason": self.reset_reason.as_str() }),
        );
        if let Some(vid) = &self.vid {
            body.insert("vid".into(), json!(vid));
        }
        Value::Object(body)
    }
}

impl fmt::Display for RiskResetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body())
    }
}

#[derive(Debug, Clone)]
pub struct RiskResetRequestBuilder {
    ip: String,
    url: String,
    headers: Vec<Header>,
    uri: Option<String>,
    reset_reason: ResetReason,
    vid: Option<String>,
}

impl RiskResetRequestBuilder {
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn vid(mut self, vid: impl Into<String>) -> Self {
        self.vid = Some(vid.into());
        self
    }

    pub fn build(self) -> Result<RiskResetRequest, RequestError> {
        Ok(RiskResetRequest {
            section: RequestSection::new(self.ip, self.url, self.uri, self.headers)?,
            reset_reason: self.reset_reason,
            vid: self.vid,
        })
    }
}

/// Clears the state attached to one request id (`risk/reset/req_id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskResetByRequestId {
    uuid: String,
    period: u64,
}

impl RiskResetByRequestId {
    /// `period` is the number of seconds the reset applies for.
    pub fn new(uuid: &str, period: u64) -> Self {
        Self {
            uuid: uuid.to_lowercase(),
            period,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn period(&self) -> u64 {
        self.period
    }
}

impl RiskCall for RiskResetByRequestId {
    const ROUTE: RiskRoute = RiskRoute::ResetByRequestId;
    type Response = RiskResetByRequestIdResponse;

    fn body(&self) -> Value {
        json!({ "request": { "uuid": self.uuid, "period": self.period } })
    }
}

/// Clears a visitor by id for a period (`risk/reset/visitor_id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskResetByVisitorId {
    vid: String,
    period: u64,
}

impl RiskResetByVisitorId {
    pub fn new(vid: &str, period: u64) -> Self {
        Self {
            vid: vid.to_lowercase(),
            period,
        }
    }

    pub fn vid(&self) -> &str {
        &self.vid
    }

    pub fn period(&self) -> u64 {
        self.period
    }
}

impl RiskCall for RiskResetByVisitorId {
    const ROUTE: RiskRoute = RiskRoute::ResetByVisitorId;
    type Response = RiskResetByVisitorIdResponse;

    fn body(&self) -> Value {
        json!({ "request": { "vid": self.vid, "period": self.period } })
    }
}
