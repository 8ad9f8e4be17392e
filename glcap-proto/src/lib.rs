//! Shared message bus, packet-stream buffer, rational fps pacing, and
//! stream bookkeeping used across the capture and scaling stages.
//!
//! This crate has no OpenGL dependency: it's the leaf of the workspace,
//! consumed by both the scaler and the capture/info crate.

pub mod geometry;
pub mod message;
pub mod packet_stream;
pub mod time;
pub mod tracker;

pub use geometry::{align_row, clamp_crop, Rect};
pub use message::{
    AudioDataMsg, AudioFormatMsg, ColorMsg, Message, PixelFormat, StreamFlags, StreamId,
    VideoFormatMsg, VideoFrameMsg,
};
pub use packet_stream::{PacketStream, PublishError, RecvError};
pub use time::FpsPeriod;
pub use tracker::Tracker;
