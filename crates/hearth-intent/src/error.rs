//! Error types for intent classification.

use thiserror::Error;

/// Unified error type for the classification pipeline.
///
/// Every variant is recoverable: the [`IntentClassifier`](crate::IntentClassifier)
/// absorbs these errors and falls back to keyword matching, so they never
/// surface past the classification stage.
#[derive(Debug, Error)]
pub enum IntentError {
    // -- Service errors -----------------------------------------------------
    /// The classification service could not be constructed.
    #[error("classifier configuration invalid: {reason}")]
    Config { reason: String },

    /// The request to the classification service failed (connect, timeout,
    /// non-success status).
    #[error("classification request failed: {reason}")]
    Request { reason: String },

    // -- Reply errors -------------------------------------------------------
    /// The service reply could not be parsed into the expected JSON shape.
    #[error("classification reply malformed: {reason}")]
    Parse { reason: String },

    /// The reply parsed but violated the contract (confidence out of range,
    /// empty intent label).
    #[error("classification reply invalid: {reason}")]
    Invalid { reason: String },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, IntentError>;
