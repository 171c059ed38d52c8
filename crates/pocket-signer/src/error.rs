//! Error types for the pocket signing engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the public engine operations.
///
/// Transient relay failures during polling loops are retried internally and
/// never reach callers; `Relay` appears only for session/request creation
/// writes and for reads outside a retry loop.
#[derive(Debug, Error)]
pub enum Error {
    /// A network argument was neither `testnet` nor `mainnet`. Rejected
    /// locally, before any relay call.
    #[error("invalid network {0:?}: must be \"testnet\" or \"mainnet\"")]
    InvalidNetwork(String),

    /// The relay returned a non-2xx response, unparseable JSON, or a
    /// `success: false` envelope.
    #[error("relay call {endpoint} failed: {message}")]
    Relay { endpoint: String, message: String },

    /// The wallet did not approve the pairing within the configured window.
    #[error("pairing timeout: wallet did not approve the session in time")]
    PairingTimeout,

    /// The caller cancelled the pairing wait.
    #[error("pairing cancelled by caller")]
    UserCancelled,

    /// No terminal status arrived for the request within the signing window.
    #[error("signing timeout for request {0}")]
    SigningTimeout(String),

    /// The wallet reported the request as rejected.
    #[error("user rejected signing request {0}")]
    UserRejected(String),

    /// A pairing code failed to decode back into an artifact.
    #[error("invalid pairing artifact: {0}")]
    InvalidArtifact(String),

    /// Local session store read/write failure.
    #[error("session store error: {0}")]
    Store(String),
}

impl Error {
    pub(crate) fn relay(endpoint: &str, message: impl std::fmt::Display) -> Self {
        Error::Relay {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }
}
