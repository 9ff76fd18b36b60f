//! Error taxonomy shared by the gateway contract and the synchronisation pipeline.
//!
//! [`GatewayError`] is what a [`crate::contract::RemoteGateway`] implementation reports.
//! [`SyncError`] is what pipeline operations (reconcile, checkout, persistence) return.
//! Components that back convenience paths (tree resolution, script detection) never return
//! these; they degrade to "absent" and log instead.

/// Failure reported by the remote source gateway.
///
/// Cloneable so a failed listing can be cached for the lifetime of a revision tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Path, revision, branch or tag does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The pre-authenticated handle was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Network or remote-service failure, including HTTP-level errors.
    #[error("transport failure: {0}")]
    TransportFailure(String),
    /// The remote answered with an unexpected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Error type for synchronisation passes.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Remote gateway error.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A required identifier or setting is missing or out of range.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Local filesystem error while writing the workspace or changelog.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted changelog or revision state could not be (de)serialised.
    #[error("persistence error: {0}")]
    Persistence(#[from] serde_json::Error),
}

/// Result type for synchronisation operations.
pub type Result<T> = std::result::Result<T, SyncError>;
