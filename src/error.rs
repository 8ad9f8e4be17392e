//! Structured error taxonomy for the capture pipeline.
//!
//! Every component returns a [`CaptureError`] variant from one of five
//! buckets: a bad configuration caught before anything runs, a resource the
//! host ran out of, a transient condition worth retrying, a fatal one that
//! isn't, and a protocol violation from a misbehaving peer. `anyhow` takes
//! over at the CLI boundary, where callers just want a readable chain, not
//! a type to match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Rejected before capture/scaling start: a bad fps, scale factor, or
    /// crop rectangle.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The host is out of some bounded resource (PBO handles, worker
    /// threads, buffer capacity).
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Worth retrying: a single frame's readback failed but the capture
    /// loop itself is still healthy.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Not worth retrying: the GL context is gone, the backend is broken.
    #[error("fatal capture error: {0}")]
    Fatal(String),

    /// A peer violated the message protocol (format message missing before
    /// a frame, frame geometry that doesn't match the last format message).
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl CaptureError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::Fatal(_) | CaptureError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(CaptureError::Transient("dropped frame".into()).is_retryable());
        assert!(!CaptureError::Fatal("context lost".into()).is_retryable());
        assert!(!CaptureError::Configuration("fps must be positive".into()).is_retryable());
    }

    #[test]
    fn fatal_and_protocol_errors_are_not_recoverable() {
        assert!(CaptureError::Fatal("context lost".into()).is_fatal());
        assert!(CaptureError::Protocol("frame before format".into()).is_fatal());
        assert!(!CaptureError::ResourceExhaustion("no PBO handles left".into()).is_fatal());
    }
}
