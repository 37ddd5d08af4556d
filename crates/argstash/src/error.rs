use thiserror::Error;

/// Errors from stash, address, backend and registry operations.
///
/// Every variant is terminal for the immediate caller; nothing in this crate
/// retries.
#[derive(Debug, Error)]
pub enum StashError {
    /// The value cannot be represented by the codec.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The address does not match the grammar its backend expects.
    #[error("invalid address: {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// No backend is registered under this scheme.
    #[error("unknown backend: '{0}' is not registered")]
    UnknownBackend(String),

    /// The backend exists but cannot be used under the active configuration,
    /// or no enabled backend accepts the value.
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// The backend does not implement the requested capability.
    #[error("backend '{backend}' does not support {operation}")]
    UnsupportedOperation {
        backend: String,
        operation: &'static str,
    },

    /// The address is well formed but nothing is stored under it.
    #[error("stash not found: {0}")]
    StashNotFound(String),

    /// Transport failure unrelated to whether the stash exists.
    #[error("backend '{backend}' remote error: {message}")]
    BackendRemote { backend: String, message: String },

    /// A backend name was registered twice.
    #[error("backend '{0}' is already registered")]
    DuplicateBackend(String),

    /// Fetched bytes do not hash to the digest named by the address.
    #[error("digest mismatch for {address}: content hashes to {computed}")]
    DigestMismatch { address: String, computed: String },
}

impl StashError {
    pub(crate) fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(backend: impl Into<String>, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            backend: backend.into(),
            operation,
        }
    }

    pub(crate) fn remote(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendRemote {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Result alias for stash operations.
pub type StashResult<T> = Result<T, StashError>;
