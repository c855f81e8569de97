//! Transport seam for risk API calls.

use super::RiskRoute;
use crate::config::ApiConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Posts a JSON body to a risk API route and returns the JSON reply.
///
/// Timeouts and retries, if any, belong to the implementation.
#[async_trait]
pub trait RiskTransport: Send + Sync {
    async fn post(
        &self,
        route: RiskRoute,
        body: &Value,
        auth: &AuthHeaders,
    ) -> Result<Value, TransportError>;
}

/// Authorization headers attached to every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    headers: Vec<(String, String)>,
}

impl AuthHeaders {
    /// `Authorization: Bearer <token>`
    pub fn bearer(token: &str) -> Self {
        Self {
            headers: vec![("Authorization".to_string(), format!("Bearer {token}"))],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// HTTPS transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for `route`.
    pub fn url(&self, route: RiskRoute) -> String {
        format!("{}/{}", self.base_url, route.as_str())
    }
}

#[async_trait]
impl RiskTransport for HttpTransport {
    async fn post(
        &self,
        route: RiskRoute,
        body: &Value,
        auth: &AuthHeaders,
    ) -> Result<Value, TransportError> {
        let mut request = self.client.post(self.url(route)).json(body);
        for (name, value) in auth.iter() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            // The API reports failures through `status` in the body.
            warn!(route = %route, http_status = status.as_u16(), "Risk API returned non-success HTTP status");
        }

        let bytes = response.bytes().await?;
        parse_reply(&bytes)
    }
}

/// Empty replies are acknowledgements and read as `Null`.
fn parse_reply(bytes: &[u8]) -> Result<Value, TransportError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the base URL and the raw
    /// request that was received.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if request_complete(&received) {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });

        (format!("http://{addr}/api/v1"), handle)
    }

    fn request_complete(received: &[u8]) -> bool {
        let text = String::from_utf8_lossy(received);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        received.len() >= header_end + 4 + content_length
    }

    fn transport(base_url: String) -> HttpTransport {
        HttpTransport::new(&ApiConfig {
            base_url,
            timeout_ms: 2000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_post_empty_reply_is_null() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_string(),
        )
        .await;

        let reply = transport(base_url)
            .post(
                RiskRoute::ResetByRequestId,
                &json!({"request": {"uuid": "abc", "period": 60}}),
                &AuthHeaders::bearer("tok"),
            )
            .await
            .unwrap();
        assert_eq!(reply, Value::Null);

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /api/v1/risk/reset/req_id "));
        assert!(received.to_ascii_lowercase().contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn test_post_json_reply() {
        let body = r#"{"status":0,"uuid":"u1","score":80,"action":"b"}"#;
        let (base_url, server) = serve_once(format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ))
        .await;

        let reply = transport(base_url)
            .post(RiskRoute::Risk, &json!({}), &AuthHeaders::bearer("tok"))
            .await
            .unwrap();
        assert_eq!(reply["uuid"], "u1");
        assert_eq!(reply["score"], 80);

        server.await.unwrap();
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(b"").unwrap(), Value::Null);
        assert_eq!(parse_reply(b" \r\n").unwrap(), Value::Null);
        assert_eq!(parse_reply(b"{\"status\":0}").unwrap(), json!({"status": 0}));
        assert!(matches!(parse_reply(b"<html>"), Err(TransportError::Json(_))));
    }

    #[test]
    fn test_bearer_header() {
        let auth = AuthHeaders::bearer("abc");
        assert_eq!(auth.get("authorization"), Some("Bearer abc"));
        assert_eq!(auth.iter().count(), 1);
    }

    #[test]
    fn test_route_urls() {
        let transport = HttpTransport::new(&ApiConfig {
            base_url: "https://risk.example/api/v1/".to_string(),
            timeout_ms: 500,
        })
        .unwrap();

        assert_eq!(transport.url(RiskRoute::Risk), "https://risk.example/api/v1/risk");
        assert_eq!(
            transport.url(RiskRoute::ResetByVisitorId),
            "https://risk.example/api/v1/risk/reset/visitor_id"
        );
    }
}
