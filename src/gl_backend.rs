//! The pluggable pixel-readback backend `GlCapture` drives.
//!
//! `GlBackend` hides the real OpenGL entry points (and, behind them, the
//! pixel-buffer-object double-buffering that makes readback non-blocking)
//! behind a small synchronous interface: hand it a crop rectangle, get back
//! pixels and the timestamp they were captured at. A real render thread
//! already owns the GL context this hooks into, so the backend never
//! creates one itself.

use glcap_proto::{PixelFormat, Rect};

use crate::error::CaptureError;

/// One readback result.
pub struct FrameReadback {
    pub data: Vec<u8>,
    /// When the pixels were captured. For a PBO-backed backend this is the
    /// time the *previous* call kicked the async read off, not when this
    /// call's `map`/`get` completed.
    pub captured_at_ns: u64,
}

pub trait GlBackend: Send {
    /// Full framebuffer size, before any crop is applied.
    fn native_size(&self) -> (u32, u32);

    /// Pixel layout `read_frame` fills its buffer with.
    fn pixel_format(&self) -> PixelFormat;

    /// Monotonic clock the backend uses to timestamp frames.
    fn now_ns(&self) -> u64;

    /// Reads back `rect` of the framebuffer. May block briefly (mapping a
    /// completed PBO) but never for a full frame interval.
    fn read_frame(&mut self, rect: Rect) -> Result<FrameReadback, CaptureError>;

    /// Current gamma ramp midpoint, used to derive the `ColorMsg` a stream
    /// gets when `NEEDS_COLOR_UPDATE` is set. Brightness/contrast aren't
    /// queryable through this API and are always reported as zero.
    fn query_gamma(&mut self) -> Result<f32, CaptureError>;

    /// Whether `GL_ARB_pixel_buffer_object` is present on this context.
    /// Backends with no async path (e.g. the mock) default to unavailable.
    fn pbo_available(&self) -> bool {
        false
    }

    /// Enables or disables PBO-backed readback. A no-op on backends that
    /// never support it.
    fn set_pbo_enabled(&mut self, _enabled: bool) {}

    /// Draws the small on-screen capture indicator. A no-op on backends with
    /// nowhere to draw one.
    fn draw_indicator(&mut self) {}
}

pub mod mock {
    use std::sync::atomic::{AtomicU64, Ordering};

    use glcap_proto::{PixelFormat, Rect};

    use super::{CaptureError, FrameReadback, GlBackend};

    /// A deterministic, allocation-only backend for tests and demos: no GL
    /// context required. Each `read_frame` fills the buffer with the
    /// frame's own (wrapped) sequence number so scaler output is easy to
    /// assert on, and the clock is whatever `now_ns` returns — a real clock
    /// by default, or a caller-supplied one for reproducible pacing tests.
    pub struct MockBackend {
        width: u32,
        height: u32,
        format: PixelFormat,
        frame_count: AtomicU64,
        clock: Box<dyn Fn() -> u64 + Send>,
        gamma: f32,
    }

    impl MockBackend {
        pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
            Self {
                width,
                height,
                format,
                frame_count: AtomicU64::new(0),
                clock: Box::new(|| {
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_nanos() as u64)
                        .unwrap_or(0)
                }),
                gamma: 1.0,
            }
        }

        /// Swaps in an explicit clock, for tests that need exact, advancing
        /// timestamps instead of the wall clock.
        pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + 'static) -> Self {
            self.clock = Box::new(clock);
            self
        }

        pub fn frames_read(&self) -> u64 {
            self.frame_count.load(Ordering::Relaxed)
        }
    }

    impl GlBackend for MockBackend {
        fn native_size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn pixel_format(&self) -> PixelFormat {
            self.format
        }

        fn now_ns(&self) -> u64 {
            (self.clock)()
        }

        fn read_frame(&mut self, rect: Rect) -> Result<FrameReadback, CaptureError> {
            let bpp = self.format.bytes_per_pixel().ok_or_else(|| {
                CaptureError::Configuration("mock backend only supports packed pixel formats".into())
            })?;
            let seq = self.frame_count.fetch_add(1, Ordering::Relaxed);
            let fill = (seq % 256) as u8;
            let data = vec![fill; rect.w as usize * rect.h as usize * bpp];
            Ok(FrameReadback { data, captured_at_ns: self.now_ns() })
        }

        fn query_gamma(&mut self) -> Result<f32, CaptureError> {
            Ok(self.gamma)
        }
    }
}

#[cfg(feature = "glow-backend")]
pub mod glow_backend {
    use glow::HasContext;
    use glcap_proto::{PixelFormat, Rect};
    use tracing::debug;

    use super::{CaptureError, FrameReadback, GlBackend};

    /// Real pixel readback via `glow`, double-buffering two pixel buffer
    /// objects so one can be mapped while the other is still in flight.
    /// Falls back to a plain blocking `glReadPixels` when the context
    /// doesn't advertise `GL_ARB_pixel_buffer_object`.
    pub struct GlowBackend {
        gl: glow::Context,
        width: u32,
        height: u32,
        pbo: Option<[glow::Buffer; 2]>,
        pbo_enabled: bool,
        active: usize,
        pending: bool,
    }

    impl GlowBackend {
        /// # Safety
        /// `gl` must wrap a context current on the calling thread for the
        /// lifetime of this backend.
        pub unsafe fn new(gl: glow::Context, width: u32, height: u32) -> Result<Self, CaptureError> {
            let pbo = {
                let a = gl.create_buffer().map_err(CaptureError::ResourceExhaustion)?;
                let b = gl.create_buffer().map_err(CaptureError::ResourceExhaustion)?;
                let size = (width * height * 4) as i32;
                for buf in [a, b] {
                    gl.bind_buffer(glow::PIXEL_PACK_BUFFER, Some(buf));
                    gl.buffer_data_size(glow::PIXEL_PACK_BUFFER, size, glow::STREAM_READ);
                }
                gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
                Some([a, b])
            };
            Ok(Self { gl, width, height, pbo, pbo_enabled: true, active: 0, pending: false })
        }

        unsafe fn read_pixels_into(&self, rect: Rect, dst: Option<&mut [u8]>) {
            self.gl.read_pixels(
                rect.x as i32,
                rect.y as i32,
                rect.w as i32,
                rect.h as i32,
                glow::BGRA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(dst),
            );
        }

        /// `glReadPixels` hands back rows bottom-to-top; `Rect` and every
        /// downstream consumer assume the usual top-left origin, so the
        /// buffer is flipped in place before it leaves this backend.
        fn flip_rows(data: &mut [u8], width: u32, height: u32) {
            let stride = width as usize * 4;
            let (mut top, mut bottom) = (0usize, height as usize - 1);
            while top < bottom {
                let (top_off, bottom_off) = (top * stride, bottom * stride);
                let (head, tail) = data.split_at_mut(bottom_off);
                head[top_off..top_off + stride].swap_with_slice(&mut tail[..stride]);
                top += 1;
                bottom -= 1;
            }
        }

        fn start_async(&mut self, rect: Rect) {
            let Some(pbo) = self.pbo else { return };
            unsafe {
                self.gl.bind_buffer(glow::PIXEL_PACK_BUFFER, Some(pbo[self.active]));
                self.read_pixels_into(rect, None);
                self.gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
            }
            self.pending = true;
        }

        fn harvest_async(&mut self, rect: Rect) -> Vec<u8> {
            let Some(pbo) = self.pbo else { unreachable!("harvest_async requires PBOs") };
            let size = (rect.w * rect.h * 4) as usize;
            let mut out = vec![0u8; size];
            unsafe {
                self.gl.bind_buffer(glow::PIXEL_PACK_BUFFER, Some(pbo[self.active]));
                let mapped = self.gl.map_buffer_range(glow::PIXEL_PACK_BUFFER, 0, size as i32, glow::MAP_READ_BIT);
                if !mapped.is_null() {
                    std::ptr::copy_nonoverlapping(mapped, out.as_mut_ptr(), size);
                }
                self.gl.unmap_buffer(glow::PIXEL_PACK_BUFFER);
                self.gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
            }
            self.active = 1 - self.active;
            out
        }
    }

    impl GlBackend for GlowBackend {
        fn native_size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn pixel_format(&self) -> PixelFormat {
            PixelFormat::Bgra
        }

        fn now_ns(&self) -> u64 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        }

        fn read_frame(&mut self, rect: Rect) -> Result<FrameReadback, CaptureError> {
            if self.pbo.is_none() || !self.pbo_enabled {
                let size = (rect.w * rect.h * 4) as usize;
                let mut data = vec![0u8; size];
                unsafe { self.read_pixels_into(rect, Some(&mut data)) };
                Self::flip_rows(&mut data, rect.w, rect.h);
                return Ok(FrameReadback { data, captured_at_ns: self.now_ns() });
            }

            let captured_at_ns = self.now_ns();
            let mut data = if self.pending { self.harvest_async(rect) } else { Vec::new() };
            if !data.is_empty() {
                Self::flip_rows(&mut data, rect.w, rect.h);
            }
            self.start_async(rect);
            Ok(FrameReadback { data, captured_at_ns })
        }

        fn query_gamma(&mut self) -> Result<f32, CaptureError> {
            // The host GL driver exposes no gamma query through core GL;
            // glc's original fell back to a constant here too.
            Ok(1.0)
        }

        fn pbo_available(&self) -> bool {
            self.pbo.is_some()
        }

        fn set_pbo_enabled(&mut self, enabled: bool) {
            self.pbo_enabled = enabled;
            if !enabled {
                self.pending = false;
            }
            debug!(enabled, "PBO readback toggled");
        }

        fn draw_indicator(&mut self) {
            debug!("draw capture indicator");
        }
    }
}
