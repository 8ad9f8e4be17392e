//! Per-stream scaling state: which kernel applies and, for the general
//! bilinear path, the precomputed [`ScaleMap`].

use glcap_proto::{PixelFormat, StreamFlags, VideoFormatMsg};

use crate::error::ScaleError;
use crate::scale_map::ScaleMap;

/// Which of the three kernels a stream's frames should run through, decided
/// once per format change and cheap to re-derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// scale == 1.0 and the source is already BGR: forward frames untouched.
    Passthrough,
    /// scale == 1.0 and the source is BGRA: drop the alpha channel.
    BgraDropAlpha,
    /// scale == 0.5: 2x2 box filter.
    BoxFilterHalf,
    /// Any other scale factor: general bilinear resample.
    Bilinear,
}

pub struct StreamState {
    pub mode: ProcessingMode,
    pub src_w: u32,
    pub src_h: u32,
    pub src_row: u32,
    pub src_bpp: u32,
    pub dst_w: u32,
    pub dst_h: u32,
    pub scale_map: Option<ScaleMap>,
}

impl StreamState {
    /// Mirrors the scale context's mode decision on format-message arrival:
    /// an exact match on 1.0 or 0.5 picks the cheap path, anything else
    /// builds a scale map.
    pub fn from_format(format_msg: &VideoFormatMsg, scale: f64) -> Result<Self, ScaleError> {
        let src_bpp = format_msg.format.bytes_per_pixel().unwrap_or(4) as u32;
        let src_row = glcap_proto::align_row(
            (format_msg.width * src_bpp) as usize,
            if format_msg.flags.contains(StreamFlags::DWORD_ALIGNED) { 8 } else { 1 },
        ) as u32;
        let (src_w, src_h) = (format_msg.width, format_msg.height);

        if is_one(scale) {
            let mode = match format_msg.format {
                PixelFormat::Bgr => ProcessingMode::Passthrough,
                _ => ProcessingMode::BgraDropAlpha,
            };
            return Ok(Self { mode, src_w, src_h, src_row, src_bpp, dst_w: src_w, dst_h: src_h, scale_map: None });
        }

        let dst_w = (scale * src_w as f64) as u32;
        let dst_h = (scale * src_h as f64) as u32;
        if dst_w == 0 || dst_h == 0 {
            return Err(ScaleError::EmptyOutput { src_w, src_h, scale });
        }

        if is_half(scale) {
            return Ok(Self {
                mode: ProcessingMode::BoxFilterHalf,
                src_w, src_h, src_row, src_bpp, dst_w, dst_h,
                scale_map: None,
            });
        }

        let scale_map = ScaleMap::generate(src_w, src_h, dst_w, dst_h, src_row, src_bpp);
        Ok(Self {
            mode: ProcessingMode::Bilinear,
            src_w, src_h, src_row, src_bpp, dst_w, dst_h,
            scale_map: Some(scale_map),
        })
    }

    pub fn output_len(&self) -> usize {
        (self.dst_w * self.dst_h * 3) as usize
    }
}

fn is_one(scale: f64) -> bool {
    (scale - 1.0).abs() < f64::EPSILON
}

fn is_half(scale: f64) -> bool {
    (scale - 0.5).abs() < f64::EPSILON
}
