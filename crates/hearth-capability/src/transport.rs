//! Transport layer for the capability protocol.
//!
//! The session manager is transport-agnostic: anything that can carry one
//! JSON-RPC frame to the server and hand back the response frame satisfies
//! [`CapabilityTransport`].  Production uses [`HttpTransport`], which POSTs
//! each frame to a single endpoint; tests substitute scripted in-memory
//! transports.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{CapabilityError, Result};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Default per-request timeout for the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One-frame-in, one-frame-out transport to a capability server.
#[async_trait]
pub trait CapabilityTransport: Send + Sync {
    /// Send one request frame and await the matching response frame.
    ///
    /// Transport-level failures surface as [`CapabilityError::Connection`];
    /// the session layer reinterprets them per operation.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// HTTP POST transport backed by a pooled [`reqwest::Client`].
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Build a transport posting frames to `endpoint`, with a per-request
    /// timeout applied to every call including the handshake.
    pub fn new(endpoint: Url, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CapabilityError::Connection {
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CapabilityTransport for HttpTransport {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("request timed out: {e}")
                } else if e.is_connect() {
                    format!("could not reach capability server: {e}")
                } else {
                    format!("transport failure: {e}")
                };
                CapabilityError::Connection { reason }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Connection {
                reason: format!("http {status}: {}", truncate(&body, 200)),
            });
        }

        response
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| CapabilityError::Connection {
                reason: format!("malformed response frame: {e}"),
            })
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Clip an error body for logging without splitting a UTF-8 character.
fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "温度温度温度温度";
        let clipped = truncate(text, 7);
        assert!(clipped.len() <= 7);
        assert_eq!(clipped, "温度");
        assert_eq!(truncate("short", 200), "short");
    }

    #[test]
    fn http_transport_reports_endpoint() {
        let endpoint = Url::parse("http://127.0.0.1:8900/rpc").unwrap();
        let transport = HttpTransport::new(endpoint, DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(transport.endpoint(), "http://127.0.0.1:8900/rpc");
    }
}
