//! Capability error types.
//!
//! Everything in this crate surfaces errors through [`CapabilityError`].
//! Each variant carries enough context for callers to decide how to handle
//! the failure without inspecting opaque strings.  Propagation rules live
//! with the callers: workflow nodes absorb session and invocation failures
//! into degraded responses, and only [`CapabilityError::DuplicateCapability`]
//! may abort startup.

/// Unified error type for the capability session layer.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    // -- Session lifecycle ---------------------------------------------------
    /// The transport could not be established or the handshake was rejected.
    /// The manager rolls back to disconnected; no partial state survives.
    #[error("connection failed: {reason}")]
    Connection { reason: String },

    /// An operation needed a live session and none was usable.
    #[error("session unusable: {reason}")]
    Session { reason: String },

    // -- Invocation ----------------------------------------------------------
    /// A remote capability call failed; `reason` carries the remote message.
    #[error("invocation of `{name}` failed: {reason}")]
    Invocation { name: String, reason: String },

    // -- Adaptation ----------------------------------------------------------
    /// Two remote capabilities share a name.  Raised at adapt time and never
    /// resolved silently; the only error in this crate that may be fatal.
    #[error("duplicate capability name: `{name}`")]
    DuplicateCapability { name: String },

    /// A remote parameter schema used a type tag this client does not
    /// support.  Raised when the schema is decoded, not when it is used.
    #[error("unsupported parameter type `{type_tag}` for `{param}` on capability `{capability}`")]
    UnsupportedParamType {
        capability: String,
        param: String,
        type_tag: String,
    },

    /// Arguments failed validation against a capability's decoded schema.
    #[error("invalid arguments for capability `{capability}`: {reason}")]
    InvalidArguments { capability: String, reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the capability crate.
pub type Result<T> = std::result::Result<T, CapabilityError>;
