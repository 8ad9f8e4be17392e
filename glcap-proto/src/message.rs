//! The tagged message bus shared by every pipeline stage.
//!
//! `Message` is the logical wire format from the pipeline's external
//! interface description: a small tagged enum carrying one payload variant
//! per kind (`VIDEO_FORMAT`, `VIDEO_FRAME`, `AUDIO_FORMAT`, `AUDIO_DATA`,
//! `COLOR`, `CLOSE`). Since every stage of this pipeline lives in one
//! process, the enum itself is the wire format — there is no separate byte
//! encoding to round-trip.

use std::sync::Arc;

pub type StreamId = u32;

/// Pixel layout of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgr,
    Bgra,
    YCbCr420Jpeg,
}

impl PixelFormat {
    /// Bytes per pixel for the packed formats; `None` for planar YCbCr, whose
    /// size isn't a per-pixel constant.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Bgr => Some(3),
            PixelFormat::Bgra => Some(4),
            PixelFormat::YCbCr420Jpeg => None,
        }
    }

    /// Total payload bytes for one frame of `w × h`, including the
    /// dword-alignment row padding Info's diagnostic tally accounts for.
    pub fn frame_bytes(self, w: u32, h: u32, dword_aligned: bool) -> usize {
        let (w, h) = (w as usize, h as usize);
        match self {
            PixelFormat::Bgr => {
                let mut bytes = w * h * 3;
                if dword_aligned {
                    bytes += h * (8 - (w * 3) % 8);
                }
                bytes
            }
            PixelFormat::Bgra => {
                let mut bytes = w * h * 4;
                if dword_aligned {
                    bytes += h * (8 - (w * 4) % 8);
                }
                bytes
            }
            PixelFormat::YCbCr420Jpeg => (w * h * 3) / 2,
        }
    }
}

bitflags::bitflags! {
    /// Per-stream bitset. `CAPTURING` is the busy bit guarding at-most-one
    /// in-flight capture per stream; `NEEDS_COLOR_UPDATE` requests a fresh
    /// gamma query on the next frame; `DWORD_ALIGNED` marks rows padded to a
    /// multiple of 8 bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StreamFlags: u32 {
        const DWORD_ALIGNED      = 0b0000_0001;
        const NEEDS_COLOR_UPDATE = 0b0000_0010;
        const CAPTURING          = 0b0000_0100;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFormatMsg {
    pub stream_id: StreamId,
    pub flags: StreamFlags,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// A captured/rescaled frame. Pixel data is `Arc<[u8]>` so the scaler's
/// worker pool and the Info sink can both borrow it without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrameMsg {
    pub stream_id: StreamId,
    /// Nanoseconds since an arbitrary epoch; for PBO-sourced frames this is
    /// the time the async readback was *started*, not when it was harvested.
    pub time_ns: u64,
    pub data: Arc<[u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormatMsg {
    pub stream_id: StreamId,
    pub flags: u32,
    pub rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioDataMsg {
    pub stream_id: StreamId,
    pub time_ns: u64,
    pub data: Arc<[u8]>,
}

/// Gamma/brightness/contrast correction. Brightness and contrast are
/// currently always zero — the source display server API this was ported
/// from has no reliable way to query them, so the field is carried but
/// unused, same as upstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMsg {
    pub stream_id: StreamId,
    pub brightness: f32,
    pub contrast: f32,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    VideoFormat(VideoFormatMsg),
    VideoFrame(VideoFrameMsg),
    AudioFormat(AudioFormatMsg),
    AudioData(AudioDataMsg),
    Color(ColorMsg),
    Close { stream_id: StreamId },
}

impl Message {
    pub fn stream_id(&self) -> StreamId {
        match self {
            Message::VideoFormat(m) => m.stream_id,
            Message::VideoFrame(m) => m.stream_id,
            Message::AudioFormat(m) => m.stream_id,
            Message::AudioData(m) => m.stream_id,
            Message::Color(m) => m.stream_id,
            Message::Close { stream_id } => *stream_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_frame_bytes_no_padding() {
        assert_eq!(PixelFormat::Bgr.frame_bytes(4, 2, false), 4 * 2 * 3);
    }

    #[test]
    fn bgra_frame_bytes_with_dword_padding() {
        // w=5 -> row = 5*4 = 20, 20 % 8 = 4, pad = 4 per row, h=3
        let bytes = PixelFormat::Bgra.frame_bytes(5, 3, true);
        assert_eq!(bytes, 5 * 3 * 4 + 3 * (8 - (5 * 4) % 8));
    }

    #[test]
    fn ycbcr_is_one_and_half_bytes_per_pixel() {
        assert_eq!(PixelFormat::YCbCr420Jpeg.frame_bytes(4, 4, false), (4 * 4 * 3) / 2);
    }
}
