//! Error types for the orchestration graph.

use thiserror::Error;

/// Errors the graph can surface to its caller.
///
/// Turn processing itself never fails; the only fallible graph operation is
/// start-up warm-up, and even there most failures are tolerated and retried
/// lazily.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The remote server offered two capabilities with the same name.
    /// Fatal at start-up: invocation routing would be ambiguous.
    #[error("duplicate capability `{name}` offered by the remote server")]
    DuplicateCapability { name: String },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, GraphError>;
