//! Error types for the handshake and sideband request boundaries.
//!
//! Internal frame handling never returns an `Err` — malformed frames are
//! logged and dropped (see [`crate::frame`]). `RouterError` only covers the
//! places spec.md gives a concrete HTTP/status-line response.

use thiserror::Error;

/// Failure at a request boundary, mapped to a wire-visible status.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Unsupported client IPC version {0:?}")]
    UnsupportedVersion(String),

    #[error("Invalid IPC client id {0:?}")]
    InvalidId(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,
}
