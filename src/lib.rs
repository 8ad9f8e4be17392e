//! # glcap
//!
//! OpenGL frame capture, software rescaling, and stream bookkeeping for a
//! screen-recording pipeline.
//!
//! ## Architecture
//!
//! Three components, wired together through the tagged message bus defined
//! in `glcap-proto`:
//!
//! - [`gl_capture`]: reads pixels off a GL framebuffer on a configured
//!   cadence and publishes `VideoFormat`/`VideoFrame`/`Color` messages.
//! - `glcap-scale` (a sibling crate): a worker pool that rescales video
//!   frames — bilinear, box-filter, or BGRA-to-BGR passthrough depending on
//!   the configured scale factor.
//! - [`info`]: a diagnostic sink that tallies bytes and frame rate per
//!   stream without touching the pixels.
//!
//! Every component exchanges `glcap_proto::Message` values over a
//! `glcap_proto::PacketStream` (a bounded channel with a cooperative
//! cancel). Since the whole pipeline lives in one process, the message enum
//! itself is the wire format — there's no separate encoding to maintain.
//!
//! ## Pixel readback
//!
//! [`gl_backend::GlBackend`] abstracts the actual `glReadPixels` call so the
//! capture hot path can be exercised without a live GL context:
//! [`gl_backend::mock::MockBackend`] for tests and demos, and
//! [`gl_backend::glow_backend::GlowBackend`] (behind the `glow-backend`
//! feature) for real pixel-buffer-object-backed readback against an
//! existing, already-current GL context.

pub mod config;
pub mod error;
pub mod gl_backend;
pub mod gl_capture;
pub mod info;

pub use config::{CaptureConfig, InfoConfig, ScalerConfig};
pub use error::CaptureError;
pub use gl_backend::GlBackend;
pub use gl_capture::GlCapture;
pub use info::InfoSink;
