//! Session lifecycle for one remote capability server.
//!
//! A [`SessionManager`] owns exactly one logical session: the outcome of an
//! `initialize` handshake plus a monotonically increasing epoch.  The slot
//! holding the live session sits behind an async mutex that is held across
//! the handshake await, which gives `ensure_connected` its single-flight
//! guarantee: concurrent callers on a disconnected manager serialize on the
//! lock, the first performs the handshake, the rest observe the stored
//! session and return without touching the transport.
//!
//! The epoch is bumped on every successful connect.  Adapted capability sets
//! are cached against it, and an `invoke` that observes a different epoch
//! after its network round-trip knows a close or reconnect raced it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::{debug, info};
use url::Url;

use crate::error::{CapabilityError, Result};
use crate::protocol::{
    CallResult, CapabilityDescriptor, InitializeResult, JsonRpcRequest, ListCapabilitiesResult,
    PROTOCOL_VERSION, methods,
};
use crate::transport::{CapabilityTransport, DEFAULT_REQUEST_TIMEOUT, HttpTransport};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for the HTTP transport.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// JSON-RPC endpoint of the capability server.
    pub endpoint: Url,
    /// Timeout applied to every request, handshake included.
    pub request_timeout: Duration,
}

impl SessionConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------

/// Identity and generation of the live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub server_name: String,
    pub server_version: String,
    pub protocol_version: String,
    /// Generation counter; a new value means adapted capabilities built
    /// against an older one are stale.
    pub epoch: u64,
}

struct SessionSlot {
    live: Option<SessionInfo>,
    epoch: u64,
}

/// Owns the single persistent session to one capability server.
///
/// One manager per remote server; share it via [`Arc`].  Every public
/// operation either has a live session or returns a typed error -- the
/// manager never retries on its own.
pub struct SessionManager {
    transport: Arc<dyn CapabilityTransport>,
    slot: tokio::sync::Mutex<SessionSlot>,
    next_id: AtomicU64,
}

impl SessionManager {
    /// Manager over the production HTTP transport.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.endpoint, config.request_timeout)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Manager over a caller-supplied transport.
    pub fn with_transport(transport: Arc<dyn CapabilityTransport>) -> Self {
        Self {
            transport,
            slot: tokio::sync::Mutex::new(SessionSlot {
                live: None,
                epoch: 0,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Force a fresh handshake, discarding any existing session.
    ///
    /// On failure the manager is left disconnected; no partial session
    /// state survives.
    pub async fn connect(&self) -> Result<SessionInfo> {
        let mut slot = self.slot.lock().await;
        slot.live = None;
        let info = self.handshake(&mut slot).await?;
        slot.live = Some(info.clone());
        Ok(info)
    }

    /// Connect only if no live session exists.  Idempotent; concurrent
    /// callers wait on the in-flight handshake instead of starting another.
    pub async fn ensure_connected(&self) -> Result<SessionInfo> {
        let mut slot = self.slot.lock().await;
        if let Some(info) = slot.live.clone() {
            return Ok(info);
        }
        let info = self.handshake(&mut slot).await?;
        slot.live = Some(info.clone());
        Ok(info)
    }

    /// Current capability descriptors as the server reports them.
    ///
    /// Connects first when needed.  Any failure surfaces as
    /// [`CapabilityError::Session`]: the caller should treat capabilities as
    /// unavailable for this turn rather than retry.
    pub async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>> {
        self.ensure_connected()
            .await
            .map_err(|e| CapabilityError::Session {
                reason: format!("cannot list capabilities: {e}"),
            })?;

        let request = JsonRpcRequest::new(
            self.next_request_id(),
            methods::LIST_CAPABILITIES,
            Value::Null,
        );
        let response =
            self.transport
                .send(request)
                .await
                .map_err(|e| CapabilityError::Session {
                    reason: format!("listing failed: {e}"),
                })?;
        let payload = response
            .into_payload()
            .map_err(|rpc| CapabilityError::Session {
                reason: format!("listing rejected: {} (code {})", rpc.message, rpc.code),
            })?;
        let listing: ListCapabilitiesResult =
            serde_json::from_value(payload).map_err(|e| CapabilityError::Session {
                reason: format!("malformed listing: {e}"),
            })?;

        debug!(count = listing.tools.len(), "capabilities listed");
        Ok(listing.tools)
    }

    /// Invoke a capability and return the joined text payload of its result.
    ///
    /// Requires a live session.  Remote failures (JSON-RPC errors and
    /// results flagged `isError`) surface as [`CapabilityError::Invocation`]
    /// carrying the remote message; a close or reconnect racing the call
    /// surfaces as [`CapabilityError::Session`].
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<String> {
        let started_epoch = {
            let slot = self.slot.lock().await;
            match &slot.live {
                Some(info) => info.epoch,
                None => {
                    return Err(CapabilityError::Session {
                        reason: "no live session; call ensure_connected first".into(),
                    });
                }
            }
        };

        debug!(capability = name, "invoking remote capability");
        let request = JsonRpcRequest::new(
            self.next_request_id(),
            methods::INVOKE_CAPABILITY,
            json!({ "name": name, "arguments": arguments }),
        );
        let response =
            self.transport
                .send(request)
                .await
                .map_err(|e| CapabilityError::Invocation {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;

        // The result only belongs to the session the call started under.
        {
            let slot = self.slot.lock().await;
            let still_live = slot
                .live
                .as_ref()
                .is_some_and(|info| info.epoch == started_epoch);
            if !still_live {
                return Err(CapabilityError::Session {
                    reason: "session closed during invocation".into(),
                });
            }
        }

        let payload = response
            .into_payload()
            .map_err(|rpc| CapabilityError::Invocation {
                name: name.to_string(),
                reason: rpc.message,
            })?;
        let result: CallResult =
            serde_json::from_value(payload).map_err(|e| CapabilityError::Invocation {
                name: name.to_string(),
                reason: format!("malformed call result: {e}"),
            })?;
        if result.is_error {
            return Err(CapabilityError::Invocation {
                name: name.to_string(),
                reason: result.joined_text(),
            });
        }
        Ok(result.joined_text())
    }

    /// Drop the live session.  Idempotent; never fails, even when `connect`
    /// never succeeded.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if slot.live.take().is_some() {
            info!(endpoint = %self.transport.endpoint(), "capability session closed");
        }
    }

    /// Whether a live session currently exists.
    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.live.is_some()
    }

    /// Identity of the live session, if any.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        self.slot.lock().await.live.clone()
    }

    async fn handshake(&self, slot: &mut SessionSlot) -> Result<SessionInfo> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "hearth",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let request = JsonRpcRequest::new(self.next_request_id(), methods::INITIALIZE, params);
        let response = self.transport.send(request).await?;
        let payload = response
            .into_payload()
            .map_err(|rpc| CapabilityError::Connection {
                reason: format!("handshake rejected: {} (code {})", rpc.message, rpc.code),
            })?;
        let init: InitializeResult =
            serde_json::from_value(payload).map_err(|e| CapabilityError::Connection {
                reason: format!("malformed initialize result: {e}"),
            })?;
        if init.protocol_version != PROTOCOL_VERSION {
            return Err(CapabilityError::Connection {
                reason: format!(
                    "server speaks protocol revision `{}`, this client requires `{PROTOCOL_VERSION}`",
                    init.protocol_version
                ),
            });
        }

        slot.epoch += 1;
        let info = SessionInfo {
            server_name: init.server_info.name,
            server_version: init.server_info.version,
            protocol_version: init.protocol_version,
            epoch: slot.epoch,
        };
        info!(
            server = %info.server_name,
            version = %info.server_version,
            epoch = info.epoch,
            "capability session established"
        );
        Ok(info)
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ContentPart, JsonRpcResponse, error_codes};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct ScriptedTransport {
        initialize_calls: AtomicUsize,
        reject_handshake: AtomicBool,
        announce_version: Option<String>,
        call_reply: Option<CallResult>,
        call_rpc_error: Option<(i32, String)>,
        /// When set, a permit is added here as soon as a call arrives.
        call_entered: Option<Arc<Semaphore>>,
        /// When set, calls block until a permit is available.
        call_gate: Option<Arc<Semaphore>>,
    }

    #[async_trait::async_trait]
    impl CapabilityTransport for ScriptedTransport {
        async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
            match request.method.as_str() {
                methods::INITIALIZE => {
                    self.initialize_calls.fetch_add(1, Ordering::SeqCst);
                    if self.reject_handshake.load(Ordering::SeqCst) {
                        return Err(CapabilityError::Connection {
                            reason: "connection refused".into(),
                        });
                    }
                    let version = self
                        .announce_version
                        .clone()
                        .unwrap_or_else(|| PROTOCOL_VERSION.to_string());
                    Ok(JsonRpcResponse::success(
                        request.id,
                        json!({
                            "protocolVersion": version,
                            "serverInfo": { "name": "scripted", "version": "0.0.1" }
                        }),
                    ))
                }
                methods::LIST_CAPABILITIES => Ok(JsonRpcResponse::success(
                    request.id,
                    json!({ "tools": [] }),
                )),
                methods::INVOKE_CAPABILITY => {
                    if let Some(entered) = &self.call_entered {
                        entered.add_permits(1);
                    }
                    if let Some(gate) = &self.call_gate {
                        let _permit = gate.acquire().await.unwrap();
                    }
                    if let Some((code, message)) = &self.call_rpc_error {
                        return Ok(JsonRpcResponse::error(request.id, *code, message.clone()));
                    }
                    let reply = self
                        .call_reply
                        .clone()
                        .unwrap_or_else(|| CallResult::text("ok"));
                    Ok(JsonRpcResponse::success(
                        request.id,
                        serde_json::to_value(reply).unwrap(),
                    ))
                }
                other => Ok(JsonRpcResponse::error(
                    request.id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("unknown method {other}"),
                )),
            }
        }

        fn endpoint(&self) -> String {
            "scripted://test".into()
        }
    }

    fn manager_over(transport: ScriptedTransport) -> (Arc<SessionManager>, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let manager = Arc::new(SessionManager::with_transport(transport.clone()));
        (manager, transport)
    }

    #[tokio::test]
    async fn ensure_connected_handshakes_once() {
        let (manager, transport) = manager_over(ScriptedTransport::default());

        let first = manager.ensure_connected().await.unwrap();
        let second = manager.ensure_connected().await.unwrap();

        assert_eq!(transport.initialize_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.epoch, 1);
        assert_eq!(second.epoch, 1);
        assert_eq!(first.server_name, "scripted");
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn failed_handshake_rolls_back_to_disconnected() {
        let (manager, transport) = manager_over(ScriptedTransport {
            reject_handshake: AtomicBool::new(true),
            ..Default::default()
        });

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, CapabilityError::Connection { .. }));
        assert!(!manager.is_connected().await);

        // Server comes back: the next ensure succeeds with a fresh epoch.
        transport.reject_handshake.store(false, Ordering::SeqCst);
        let info = manager.ensure_connected().await.unwrap();
        assert_eq!(info.epoch, 1);
    }

    #[tokio::test]
    async fn handshake_rejects_protocol_mismatch() {
        let (manager, _) = manager_over(ScriptedTransport {
            announce_version: Some("2099-01-01".into()),
            ..Default::default()
        });

        let err = manager.ensure_connected().await.unwrap_err();
        match err {
            CapabilityError::Connection { reason } => {
                assert!(reason.contains("2099-01-01"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn invoke_without_session_is_a_session_error() {
        let (manager, _) = manager_over(ScriptedTransport::default());
        let err = manager.invoke("get_weather_now", Map::new()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Session { .. }));
    }

    #[tokio::test]
    async fn invoke_joins_text_parts() {
        let (manager, _) = manager_over(ScriptedTransport {
            call_reply: Some(CallResult {
                content: vec![ContentPart::text("27°C"), ContentPart::text("晴")],
                is_error: false,
            }),
            ..Default::default()
        });

        manager.ensure_connected().await.unwrap();
        let text = manager.invoke("get_weather_now", Map::new()).await.unwrap();
        assert_eq!(text, "27°C\n晴");
    }

    #[tokio::test]
    async fn invoke_surfaces_remote_error_flag() {
        let (manager, _) = manager_over(ScriptedTransport {
            call_reply: Some(CallResult {
                content: vec![ContentPart::text("city not found")],
                is_error: true,
            }),
            ..Default::default()
        });

        manager.ensure_connected().await.unwrap();
        let err = manager.invoke("get_weather_now", Map::new()).await.unwrap_err();
        match err {
            CapabilityError::Invocation { name, reason } => {
                assert_eq!(name, "get_weather_now");
                assert_eq!(reason, "city not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn invoke_surfaces_rpc_level_error() {
        let (manager, _) = manager_over(ScriptedTransport {
            call_rpc_error: Some((error_codes::INVALID_PARAMS, "missing city".into())),
            ..Default::default()
        });

        manager.ensure_connected().await.unwrap();
        let err = manager.invoke("get_weather_now", Map::new()).await.unwrap_err();
        match err {
            CapabilityError::Invocation { reason, .. } => assert_eq!(reason, "missing city"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent_and_reconnect_bumps_epoch() {
        let (manager, transport) = manager_over(ScriptedTransport::default());

        manager.ensure_connected().await.unwrap();
        manager.close().await;
        manager.close().await;
        assert!(!manager.is_connected().await);

        let info = manager.ensure_connected().await.unwrap();
        assert_eq!(info.epoch, 2);
        assert_eq!(transport.initialize_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_racing_invoke_fails_with_session_error() {
        let entered = Arc::new(Semaphore::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let (manager, _) = manager_over(ScriptedTransport {
            call_entered: Some(entered.clone()),
            call_gate: Some(gate.clone()),
            ..Default::default()
        });

        manager.ensure_connected().await.unwrap();
        let in_flight = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.invoke("slow_op", Map::new()).await })
        };

        // Wait until the call is inside the transport, close under it, then
        // let the transport reply.
        let _ = entered.acquire().await.unwrap();
        manager.close().await;
        gate.add_permits(1);

        let err = in_flight.await.unwrap().unwrap_err();
        match err {
            CapabilityError::Session { reason } => {
                assert!(reason.contains("closed during invocation"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn list_maps_failures_to_session_error() {
        let (manager, transport) = manager_over(ScriptedTransport {
            reject_handshake: AtomicBool::new(true),
            ..Default::default()
        });

        let err = manager.list_capabilities().await.unwrap_err();
        assert!(matches!(err, CapabilityError::Session { .. }));
        assert_eq!(transport.initialize_calls.load(Ordering::SeqCst), 1);
    }
}
