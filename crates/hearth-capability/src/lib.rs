//! Remote capability session layer for Hearth.
//!
//! This crate owns everything between a workflow node and the external tool
//! server it wants to call:
//!
//! - **[`session`]** -- [`SessionManager`], one persistent session per remote
//!   capability server: single-flight connect, discovery, invocation, and
//!   idempotent close, with a session epoch for staleness detection.
//! - **[`adapter`]** -- [`adapt`] turns discovered descriptors into
//!   independent [`CapabilityAction`] records that validate arguments
//!   locally and absorb every invocation failure into text;
//!   [`CapabilityCatalog`] caches the adapted set per session epoch.
//! - **[`protocol`]** -- JSON-RPC 2.0 frames, discovery/invocation payloads,
//!   and the typed parameter schema decoded from remote `inputSchema`s.
//! - **[`transport`]** -- the [`CapabilityTransport`] seam with the
//!   production HTTP implementation.
//! - **[`error`]** -- the capability error taxonomy via [`thiserror`].

pub mod adapter;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use adapter::{ActionOutcome, ArgStrictness, CapabilityAction, CapabilityCatalog, adapt};
pub use error::{CapabilityError, Result};
pub use protocol::{
    CallResult, CapabilityDescriptor, ContentPart, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    PROTOCOL_VERSION, ParamSchema, ParamSpec, ParamType,
};
pub use session::{SessionConfig, SessionInfo, SessionManager};
pub use transport::{CapabilityTransport, DEFAULT_REQUEST_TIMEOUT, HttpTransport};
