//! Error types used across the sandlite runtime.

use thiserror::Error;

/// Result type for sandlite operations.
pub type SandResult<T> = Result<T, SandError>;

#[derive(Debug, Error)]
pub enum SandError {
    /// A profile token was not one of the recognized policy names.
    /// Never substituted with a default by the core.
    #[error("policy error: {0}")]
    Policy(String),

    /// The supervisor could not create the sandboxed child.
    #[error("clone failed: {0}")]
    Clone(String),

    /// A pre-exec step inside the child failed (hostname, chroot, mount,
    /// filter load). Surfaces to the parent as child exit code 1.
    #[error("sandbox setup failed: {0}")]
    Setup(String),

    /// Seccomp filter construction or load failed.
    #[error("seccomp error: {0}")]
    Seccomp(String),

    /// A resource-cap value could not be parsed. The offending cap is
    /// skipped; the sandbox still runs.
    #[error("resource cap parse error: {0}")]
    CapParse(String),

    /// A request or invocation was malformed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// Implement From for common error types to enable `?` operator
impl From<std::io::Error> for SandError {
    fn from(err: std::io::Error) -> Self {
        SandError::Internal(format!("I/O error: {}", err))
    }
}

impl From<String> for SandError {
    fn from(err: String) -> Self {
        SandError::Internal(err)
    }
}

impl From<&str> for SandError {
    fn from(err: &str) -> Self {
        SandError::Internal(err.to_string())
    }
}
