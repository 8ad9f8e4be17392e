//! GL Capture: the producer side of the pipeline.
//!
//! Drives a [`GlBackend`] on whatever cadence [`CaptureConfig::fps`]
//! dictates, publishing `VideoFormat`/`VideoFrame`/`Color` messages onto a
//! downstream [`PacketStream`]. Two independent guards protect it: a
//! start/stop `running` flag the host toggles around a recording session,
//! and a per-call `busy` flag so a frame already in flight is skipped
//! rather than reentered if `capture_frame` is somehow called concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use glcap_proto::{clamp_crop, ColorMsg, FpsPeriod, Message, PacketStream, Rect, StreamFlags, StreamId, VideoFormatMsg, VideoFrameMsg};
use tracing::{debug, trace, warn};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::gl_backend::GlBackend;

/// How long `stop()` sleeps between polls while draining an in-flight
/// capture, matching the original's ~1ms busy-sleep granularity.
const DRAIN_POLL: Duration = Duration::from_millis(1);

pub struct GlCapture<B: GlBackend> {
    backend: B,
    stream_id: StreamId,
    config: CaptureConfig,
    period: FpsPeriod,
    downstream: PacketStream,
    running: AtomicBool,
    busy: AtomicBool,
    frame_count: u64,
    /// The timestamp of the last published frame. `None` is the "never
    /// published" sentinel (the original's `last == 0`, which a real
    /// monotonic clock never revisits but a test clock pinned at 0 can).
    last_publish_ns: Option<u64>,
    last_rect: Option<Rect>,
    flags: StreamFlags,
    pbo_enabled: AtomicBool,
    draw_indicator_enabled: bool,
    attribute_window: Option<(u64, u64, u64)>,
}

impl<B: GlBackend> GlCapture<B> {
    pub fn new(stream_id: StreamId, backend: B, config: CaptureConfig, downstream: PacketStream) -> Result<Self, CaptureError> {
        config.validate()?;
        let period = FpsPeriod::from_fps(config.fps).map_err(|e| CaptureError::Configuration(e.to_string()))?;
        let mut flags = StreamFlags::NEEDS_COLOR_UPDATE;
        if config.dword_aligned {
            flags.insert(StreamFlags::DWORD_ALIGNED);
        }
        Ok(Self {
            backend,
            stream_id,
            config,
            period,
            downstream,
            running: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            frame_count: 0,
            last_publish_ns: None,
            last_rect: None,
            flags,
            pbo_enabled: AtomicBool::new(false),
            draw_indicator_enabled: false,
            attribute_window: None,
        })
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Stops capture: clears `running` so no new frame can start, then
    /// busy-waits for any frame already in flight to clear its `busy` bit,
    /// and resets `last_publish_ns` so the next `start`/`capture_frame`
    /// cycle always captures immediately rather than honoring stale pacing.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        while self.busy.load(Ordering::Acquire) {
            std::thread::sleep(DRAIN_POLL);
        }
        self.last_publish_ns = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queues a gamma re-query on the next capture, e.g. after the host
    /// signals a display-mode change.
    pub fn request_color_update(&mut self) {
        self.flags.insert(StreamFlags::NEEDS_COLOR_UPDATE);
    }

    /// Requests asynchronous PBO-backed readback if the backend advertises
    /// `GL_ARB_pixel_buffer_object`. The off-to-on transition is one-shot,
    /// CAS-guarded so a second concurrent request just observes the
    /// already-enabled state. Turning PBO off while a transfer may still be
    /// in flight fails rather than risk handing back a partial buffer.
    pub fn try_pbo(&mut self, enable: bool) -> Result<(), CaptureError> {
        if enable {
            if !self.backend.pbo_available() {
                return Err(CaptureError::Configuration("GL_ARB_pixel_buffer_object is not available".into()));
            }
            if self.pbo_enabled.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                self.backend.set_pbo_enabled(true);
            }
            Ok(())
        } else {
            if self.busy.load(Ordering::Acquire) {
                return Err(CaptureError::Transient("cannot disable PBO while a transfer is in flight".into()));
            }
            self.pbo_enabled.store(false, Ordering::Release);
            self.backend.set_pbo_enabled(false);
            Ok(())
        }
    }

    /// Enables or disables the small on-screen capture indicator.
    pub fn draw_indicator(&mut self, enabled: bool) {
        self.draw_indicator_enabled = enabled;
    }

    /// Binds the display/drawable/window triple subsequent geometry and
    /// gamma queries are scoped to.
    pub fn set_attribute_window(&mut self, display: u64, drawable: u64, window: u64) {
        self.attribute_window = Some((display, drawable, window));
    }

    /// Runs one iteration of the hot path. Returns `Ok(false)` when no
    /// frame was produced this call: capture is stopped, a frame is still
    /// in flight, or the configured fps hasn't elapsed yet.
    pub fn capture_frame(&mut self) -> Result<bool, CaptureError> {
        if !self.is_running() {
            return Ok(false);
        }
        if self.busy.swap(true, Ordering::AcqRel) {
            trace!(stream_id = self.stream_id, "capture already in flight, skipping");
            return Ok(false);
        }
        let result = self.do_capture();
        self.busy.store(false, Ordering::Release);
        result
    }

    fn do_capture(&mut self) -> Result<bool, CaptureError> {
        let period = self.period.period_ns;
        let mut now = self.backend.now_ns();

        // Step 2: under IGNORE_TIME the clock is pinned to exactly one
        // period past the last publish, so the schedule gate below always
        // passes and every call captures.
        if self.config.ignore_time {
            now = self.last_publish_ns.map_or(now, |last| last + period);
        }

        if let Some(due) = self.last_publish_ns {
            // Step 3: schedule-drop gate, bypassed under LOCK_FPS/IGNORE_TIME
            // (both modes capture every call and pace or stamp differently
            // instead of dropping). `due` already holds the next scheduled
            // publish instant (advanced past the previous capture's own
            // `due` by exactly one period), so this is a direct threshold
            // check, not a fresh "one period since now" comparison.
            if now < due && !self.config.lock_fps && !self.config.ignore_time {
                return Ok(false);
            }
            // Step 4: a gap this large means the host stalled; doesn't
            // affect whether this frame is captured.
            let elapsed = now.saturating_sub(due);
            if elapsed > 8 * period {
                warn!(stream_id = self.stream_id, elapsed_ns = elapsed, period_ns = period, "capture scheduling gap");
            }
        }

        let (native_w, native_h) = self.backend.native_size();
        let requested = self.config.crop.unwrap_or(Rect { x: 0, y: 0, w: native_w, h: native_h });
        let rect = clamp_crop(requested, native_w, native_h);

        if self.last_rect != Some(rect) {
            self.publish_format(rect)?;
            self.last_rect = Some(rect);
        }

        let readback = self.backend.read_frame(rect)?;
        // The reported readback time belongs to a PBO started one frame
        // earlier; only a sanity check against it ever landing in the
        // future, never IGNORE_TIME, governs whether `now` replaces it.
        let captured_at_ns = if readback.captured_at_ns > now { now } else { readback.captured_at_ns };

        self.frame_count += 1;
        let frame = Message::VideoFrame(VideoFrameMsg { stream_id: self.stream_id, time_ns: captured_at_ns, data: readback.data.into() });
        self.publish(frame)?;

        if self.draw_indicator_enabled {
            self.backend.draw_indicator();
        }

        // Step 10: LOCK_FPS paces emission by sleeping out the rest of this
        // period instead of relying on the schedule-drop gate, which it
        // just bypassed. IGNORE_TIME already forced `now` onto the grid, so
        // there's nothing left to sleep for.
        if self.config.lock_fps && !self.config.ignore_time {
            let target = self.last_publish_ns.unwrap_or(now) + period;
            if target > now {
                std::thread::sleep(Duration::from_nanos(target - now));
            }
        }

        self.last_publish_ns = Some(self.period.advance(self.last_publish_ns.unwrap_or(now), self.frame_count));

        if self.flags.contains(StreamFlags::NEEDS_COLOR_UPDATE) {
            self.publish_color()?;
            self.flags.remove(StreamFlags::NEEDS_COLOR_UPDATE);
        }

        Ok(true)
    }

    fn publish_format(&self, rect: Rect) -> Result<(), CaptureError> {
        if let Some((display, drawable, window)) = self.attribute_window {
            trace!(stream_id = self.stream_id, display, drawable, window, "geometry scoped to attribute window");
        }
        let format_msg = Message::VideoFormat(VideoFormatMsg {
            stream_id: self.stream_id,
            flags: self.flags,
            format: self.backend.pixel_format(),
            width: rect.w,
            height: rect.h,
        });
        self.publish(format_msg)
    }

    fn publish_color(&mut self) -> Result<(), CaptureError> {
        let gamma = self.backend.query_gamma()?;
        let color_msg = Message::Color(ColorMsg {
            stream_id: self.stream_id,
            // Brightness/contrast have no reliable query path on this host
            // API and are always reported as zero.
            brightness: 0.0,
            contrast: 0.0,
            red: gamma,
            green: gamma,
            blue: gamma,
        });
        self.publish(color_msg)
    }

    fn publish(&self, message: Message) -> Result<(), CaptureError> {
        let result = if self.config.lock_fps {
            self.downstream.publish_blocking(message)
        } else {
            self.downstream.try_publish(message)
        };
        match result {
            Ok(()) => Ok(()),
            Err(glcap_proto::PublishError::Busy) => {
                debug!(stream_id = self.stream_id, "capture buffer full, dropping frame");
                Ok(())
            }
            Err(glcap_proto::PublishError::Cancelled) => {
                warn!(stream_id = self.stream_id, "capture buffer cancelled");
                Err(CaptureError::Fatal("downstream buffer was cancelled".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl_backend::mock::MockBackend;
    use glcap_proto::PixelFormat;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    fn clocked_backend(w: u32, h: u32) -> (MockBackend, Arc<AtomicU64>) {
        let clock = Arc::new(AtomicU64::new(0));
        let reader = clock.clone();
        let backend = MockBackend::new(w, h, PixelFormat::Bgra).with_clock(move || reader.load(Ordering::Relaxed));
        (backend, clock)
    }

    #[test]
    fn first_capture_emits_format_then_frame() {
        let (backend, _clock) = clocked_backend(4, 2);
        let downstream = PacketStream::bounded(8);
        let mut capture = GlCapture::new(1, backend, CaptureConfig { fps: 30.0, ..CaptureConfig::default() }, downstream.clone()).unwrap();
        capture.start();

        assert!(capture.capture_frame().unwrap());

        assert!(matches!(downstream.try_recv().unwrap(), Some(Message::VideoFormat(_))));
        assert!(matches!(downstream.try_recv().unwrap(), Some(Message::VideoFrame(_))));
        assert!(matches!(downstream.try_recv().unwrap(), Some(Message::Color(_))));
    }

    #[test]
    fn stopped_capture_produces_nothing() {
        let (backend, _clock) = clocked_backend(4, 2);
        let downstream = PacketStream::bounded(8);
        let mut capture = GlCapture::new(1, backend, CaptureConfig::default(), downstream.clone()).unwrap();
        assert!(!capture.capture_frame().unwrap());
        assert!(downstream.try_recv().unwrap().is_none());
    }

    #[test]
    fn pacing_skips_frames_faster_than_the_configured_fps() {
        let (backend, clock) = clocked_backend(2, 2);
        let downstream = PacketStream::bounded(64);
        let mut capture = GlCapture::new(1, backend, CaptureConfig { fps: 10.0, ..CaptureConfig::default() }, downstream.clone()).unwrap();
        capture.start();

        assert!(capture.capture_frame().unwrap());
        // 10fps period is 100ms = 100_000_000ns; advancing 1ns should not
        // be due yet.
        clock.fetch_add(1, Ordering::Relaxed);
        assert!(!capture.capture_frame().unwrap());

        clock.fetch_add(100_000_000, Ordering::Relaxed);
        assert!(capture.capture_frame().unwrap());
    }

    #[test]
    fn request_color_update_re_emits_color_on_the_next_capture() {
        let (backend, clock) = clocked_backend(4, 2);
        let downstream = PacketStream::bounded(64);
        let config = CaptureConfig { fps: 1_000.0, ..CaptureConfig::default() };
        let mut capture = GlCapture::new(1, backend, config, downstream.clone()).unwrap();
        capture.start();

        capture.capture_frame().unwrap();
        let colors_after_first = std::iter::from_fn(|| downstream.try_recv().unwrap()).filter(|m| matches!(m, Message::Color(_))).count();
        assert_eq!(colors_after_first, 1);

        clock.fetch_add(1_000_000, Ordering::Relaxed);
        capture.capture_frame().unwrap();
        let colors_after_second = std::iter::from_fn(|| downstream.try_recv().unwrap()).filter(|m| matches!(m, Message::Color(_))).count();
        assert_eq!(colors_after_second, 0);

        capture.request_color_update();
        clock.fetch_add(1_000_000, Ordering::Relaxed);
        capture.capture_frame().unwrap();
        let colors_after_request = std::iter::from_fn(|| downstream.try_recv().unwrap()).filter(|m| matches!(m, Message::Color(_))).count();
        assert_eq!(colors_after_request, 1);
    }

    #[test]
    fn format_is_only_republished_when_the_crop_rectangle_changes() {
        let (backend, clock) = clocked_backend(4, 4);
        let downstream = PacketStream::bounded(64);
        let config = CaptureConfig { fps: 1_000.0, ..CaptureConfig::default() };
        let mut capture = GlCapture::new(1, backend, config, downstream.clone()).unwrap();
        capture.start();

        capture.capture_frame().unwrap();
        clock.fetch_add(1_000_000, Ordering::Relaxed);
        capture.capture_frame().unwrap();

        let mut formats = 0;
        while let Some(message) = downstream.try_recv().unwrap() {
            if matches!(message, Message::VideoFormat(_)) {
                formats += 1;
            }
        }
        assert_eq!(formats, 1);
    }
}
