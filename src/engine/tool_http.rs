// Kilo Engine — HTTP Tool Executor
// Outbound HTTPS for skill API integrations. Every request passes the
// SSRF guard before a socket is opened: https only, and loopback /
// RFC1918 / .local hosts rejected by literal form (DNS re-resolution is
// out of contract). Response bodies are streamed against a hard 512 KB
// cap and parsed as JSON when possible.

use futures::StreamExt;
use log::{info, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

use crate::atoms::constants::{HTTP_BODY_CAP_BYTES, HTTP_DEFAULT_TIMEOUT, HTTP_USER_AGENT};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::AuthKind;

// ── Request / response types ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Tool-registry entry name, for error attribution.
    pub tool_name: String,
    pub url: String,
    /// Uppercase HTTP method.
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// JSON body, sent on non-GET methods.
    pub body: Option<Value>,
    /// None → the 10 s default.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ToolHttpResponse {
    pub status: u16,
    /// Parsed JSON when the body is valid JSON, else a JSON string.
    pub body: Value,
    /// True when the body hit the 512 KB cap.
    pub truncated: bool,
    pub latency_ms: u64,
}

// ── SSRF guard ──────────────────────────────────────────────────────────

/// Validate an outbound URL: https scheme, and a host that is not a
/// literal loopback / private-range / mDNS name. Returns the parsed URL.
pub fn validate_outbound_url(raw: &str) -> EngineResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| EngineError::tool("http", format!("invalid URL: {}", e)))?;

    if url.scheme() != "https" {
        return Err(EngineError::tool(
            "http",
            format!("scheme '{}' rejected: only https is allowed", url.scheme()),
        ));
    }

    let host = url
        .host_str()
        .ok_or_else(|| EngineError::tool("http", "URL has no host"))?;
    if is_blocked_host(host) {
        return Err(EngineError::tool(
            "http",
            format!("host '{}' is not allowed", host),
        ));
    }
    Ok(url)
}

/// Literal-form block list: localhost, loopback v4/v6, *.local, and the
/// RFC1918 ranges 10/8, 192.168/16, 172.16/12.
fn is_blocked_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let lower = host.to_ascii_lowercase();

    if lower == "localhost" || lower == "::1" {
        return true;
    }
    if lower.ends_with(".local") {
        return true;
    }

    let octets: Vec<u8> = lower
        .split('.')
        .map(|p| p.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .unwrap_or_default();
    if octets.len() == 4 {
        let (a, b) = (octets[0], octets[1]);
        if a == 127 || a == 10 {
            return true;
        }
        if a == 192 && b == 168 {
            return true;
        }
        if a == 172 && (16..=31).contains(&b) {
            return true;
        }
    }
    false
}

/// Transient statuses worth a caller-side retry (surfaced, not retried
/// here — the pipeline performs a single attempt per tool call).
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

// ── Auth header construction ────────────────────────────────────────────

/// Build the auth header for a decrypted credential by auth kind.
/// `custom_header` secrets are stored as "Header-Name: value".
pub fn auth_header(kind: AuthKind, secret: &str) -> (String, String) {
    match kind {
        AuthKind::ApiKey => ("x-api-key".into(), secret.to_string()),
        AuthKind::Bearer | AuthKind::Oauth2 => {
            ("authorization".into(), format!("Bearer {}", secret))
        }
        AuthKind::CustomHeader => match secret.split_once(':') {
            Some((name, value)) => (name.trim().to_ascii_lowercase(), value.trim().to_string()),
            None => ("authorization".into(), secret.to_string()),
        },
    }
}

// ── Executor ────────────────────────────────────────────────────────────

pub struct HttpToolExecutor {
    client: Client,
}

impl Default for HttpToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpToolExecutor {
    pub fn new() -> Self {
        Self {
            // Per-request timeouts are applied in execute(); the client
            // itself only bounds connect time.
            client: Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Execute one outbound request. The URL is validated before any
    /// socket is opened; the body is streamed against the 512 KB cap.
    pub async fn execute(&self, request: OutboundRequest) -> EngineResult<ToolHttpResponse> {
        let url = validate_outbound_url(&request.url)?;
        let timeout = request.timeout.unwrap_or(HTTP_DEFAULT_TIMEOUT);
        let method: reqwest::Method = request
            .method
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| {
                EngineError::tool(&request.tool_name, format!("bad method '{}'", request.method))
            })?;
        let is_get = method == reqwest::Method::GET;

        let mut req = self
            .client
            .request(method, url)
            .timeout(timeout)
            .header("user-agent", HTTP_USER_AGENT);

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            if !is_get {
                req = req
                    .header("content-type", "application/json")
                    .body(serde_json::to_string(body)?);
            }
        }

        info!(
            "[tool-http] {} {} (timeout {:?})",
            request.method, request.url, timeout
        );
        let started = Instant::now();

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!("[tool-http] {} timed out", request.tool_name);
                EngineError::tool(&request.tool_name, "request timed out")
            } else {
                EngineError::tool(&request.tool_name, format!("request failed: {}", e))
            }
        })?;
        let status = resp.status().as_u16();

        // Stream the body so an oversized response never fully buffers.
        let mut bytes: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                EngineError::tool(&request.tool_name, format!("body read failed: {}", e))
            })?;
            if bytes.len() + chunk.len() > HTTP_BODY_CAP_BYTES {
                bytes.extend_from_slice(&chunk[..HTTP_BODY_CAP_BYTES - bytes.len()]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if truncated {
            warn!(
                "[tool-http] {} response truncated at {} bytes",
                request.tool_name, HTTP_BODY_CAP_BYTES
            );
        }

        Ok(ToolHttpResponse {
            status,
            body,
            truncated,
            latency_ms,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_https() {
        assert!(validate_outbound_url("http://api.example.com/v1").is_err());
        assert!(validate_outbound_url("ftp://example.com").is_err());
        assert!(validate_outbound_url("https://api.example.com/v1").is_ok());
    }

    #[test]
    fn rejects_loopback_and_private_hosts() {
        for url in [
            "https://localhost/x",
            "https://127.0.0.1/x",
            "https://127.0.0.53/x",
            "https://[::1]/x",
            "https://printer.local/x",
            "https://10.1.2.3/x",
            "https://192.168.0.10/x",
            "https://172.16.0.1/x",
            "https://172.31.255.255/x",
        ] {
            assert!(validate_outbound_url(url).is_err(), "{} should be blocked", url);
        }
    }

    #[test]
    fn allows_public_hosts() {
        for url in [
            "https://api.stripe.com/v1/charges",
            "https://172.15.0.1/x",
            "https://172.32.0.1/x",
            "https://8.8.8.8/x",
        ] {
            assert!(validate_outbound_url(url).is_ok(), "{} should pass", url);
        }
    }

    #[test]
    fn auth_header_by_kind() {
        assert_eq!(
            auth_header(AuthKind::ApiKey, "k123"),
            ("x-api-key".into(), "k123".into())
        );
        assert_eq!(
            auth_header(AuthKind::Bearer, "tok"),
            ("authorization".into(), "Bearer tok".into())
        );
        assert_eq!(
            auth_header(AuthKind::Oauth2, "tok"),
            ("authorization".into(), "Bearer tok".into())
        );
        assert_eq!(
            auth_header(AuthKind::CustomHeader, "X-Custom-Auth: abc"),
            ("x-custom-auth".into(), "abc".into())
        );
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(200));
        assert!(!is_retryable_status(404));
    }
}
