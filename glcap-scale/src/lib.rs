//! Worker-pool software rescaler.
//!
//! Reads frames from an upstream [`glcap_proto::PacketStream`], resamples
//! each video frame according to a fixed scale factor decided once per
//! format change, and forwards the result to a downstream `PacketStream`.
//! Three kernels cover the factors this pipeline is built for: untouched
//! passthrough, BGRA-to-BGR alpha drop, a 2x2 box filter for exact half
//! scale, and a general bilinear resample for everything else.

pub mod error;
pub mod scale_map;
pub mod stream;
pub mod worker;

pub use error::ScaleError;
pub use scale_map::ScaleMap;
pub use stream::{ProcessingMode, StreamState};
pub use worker::Scaler;
