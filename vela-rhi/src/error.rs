//! Error type shared by every fallible entry point of the RHI.
//!
//! Factory and submission calls return [`GfxResult`]; the error carries a kind
//! so callers can distinguish caller bugs from environmental failures. State
//! machine violations on encoders are not errors, they panic (see
//! [`crate::device::RecordState`]).

use std::fmt;

use thiserror::Error;

/// Failure kinds surfaced by the public API.
#[derive(Debug, Error)]
pub enum GfxError {
    /// A descriptor or argument is malformed (bad size, mismatched format, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The call is legal in principle but not in the object's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An allocator, pool or heap ran out of space.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The backend reported that the device was lost. Every later call on the
    /// same device fails fast with this kind.
    #[error("device lost")]
    DeviceLost,

    /// The requested feature, format or backend is not available.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// An opaque native failure, with the backend's own error code.
    #[error("backend error ({code}): {message}")]
    Backend { code: i64, message: String },
}

impl GfxError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted(message.into())
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    pub fn backend(code: i64, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
        }
    }

    /// Logs the error under the `vela_rhi` target and passes it through.
    /// Used by factory entry points so every `Err` return leaves a trace.
    pub(crate) fn trace(self, context: &str) -> Self {
        log::error!("{context}: {self}");
        self
    }
}

pub type GfxResult<T> = Result<T, GfxError>;

/// Category names used in log lines, mirrored by the error kinds above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidOperation,
    ResourceExhausted,
    DeviceLost,
    NotSupported,
    Backend,
}

impl GfxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::DeviceLost => ErrorKind::DeviceLost,
            Self::NotSupported(_) => ErrorKind::NotSupported,
            Self::Backend { .. } => ErrorKind::Backend,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidOperation => "InvalidOperation",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::DeviceLost => "DeviceLost",
            Self::NotSupported => "NotSupported",
            Self::Backend => "Backend",
        };
        f.write_str(name)
    }
}
