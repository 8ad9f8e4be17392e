//! Info Sink: a diagnostic consumer that tallies bytes and frame rate per
//! stream instead of doing anything with the pixels.
//!
//! Mirrors the host pipeline's byte-accounting convention exactly,
//! including its quirk of adding the dword-alignment row padding to the
//! tally unconditionally once the stream is marked `DWORD_ALIGNED`, even
//! though the row itself may not need any padding for a given width.

use std::collections::HashMap;
use std::time::Duration;

use glcap_proto::{Message, StreamFlags, StreamId};
use tracing::info;

use crate::config::InfoConfig;

#[derive(Debug, Default, Clone, Copy)]
struct VideoStats {
    width: u32,
    height: u32,
    dword_aligned: bool,
    frames: u64,
    bytes: u64,
    /// One-second rolling window for the fps estimate.
    window_frames: u32,
    window_started_ns: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct AudioStats {
    packets: u64,
    bytes: u64,
}

/// Accumulates per-stream statistics as messages pass through.
#[derive(Default)]
pub struct InfoSink {
    config_enabled: bool,
    info_level: u8,
    video: HashMap<StreamId, VideoStats>,
    audio: HashMap<StreamId, AudioStats>,
}

/// A snapshot of one video stream's running totals, for callers that want
/// the numbers without parsing log lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoStreamReport {
    pub frames: u64,
    pub bytes: u64,
    pub fps_estimate: f64,
}

impl InfoSink {
    pub fn new(config: InfoConfig) -> Self {
        Self { config_enabled: config.enabled, info_level: config.info_level, ..Self::default() }
    }

    /// Feeds one message through the tally. A no-op when the sink is
    /// disabled, so callers don't need to branch at the call site.
    pub fn observe(&mut self, message: &Message) {
        if !self.config_enabled {
            return;
        }
        match message {
            Message::VideoFormat(m) => {
                let stats = self.video.entry(m.stream_id).or_default();
                stats.width = m.width;
                stats.height = m.height;
                stats.dword_aligned = m.flags.contains(StreamFlags::DWORD_ALIGNED);
                if self.info_level >= 2 {
                    info!(stream_id = m.stream_id, width = m.width, height = m.height, format = ?m.format, "video format");
                }
            }
            Message::VideoFrame(m) => {
                let Some(stats) = self.video.get_mut(&m.stream_id) else {
                    return;
                };
                let frame_bytes = glcap_proto::PixelFormat::Bgr.frame_bytes(stats.width, stats.height, stats.dword_aligned) as u64;
                stats.bytes += frame_bytes;
                stats.frames += 1;

                if stats.window_frames == 0 {
                    stats.window_started_ns = m.time_ns;
                }
                stats.window_frames += 1;
                if m.time_ns.saturating_sub(stats.window_started_ns) >= Duration::from_secs(1).as_nanos() as u64 {
                    let fps = stats.window_frames as f64;
                    if self.info_level >= 3 {
                        info!(stream_id = m.stream_id, fps, "video fps");
                    }
                    stats.window_frames = 0;
                }
            }
            Message::AudioFormat(m) => {
                self.audio.entry(m.stream_id).or_default();
                if self.info_level >= 4 {
                    info!(stream_id = m.stream_id, rate = m.rate, channels = m.channels, "audio format");
                }
            }
            Message::AudioData(m) => {
                if let Some(stats) = self.audio.get_mut(&m.stream_id) {
                    stats.bytes += m.data.len() as u64;
                    stats.packets += 1;
                }
            }
            Message::Color(_) => {}
            Message::Close { stream_id } => {
                self.video.remove(stream_id);
                self.audio.remove(stream_id);
            }
        }
    }

    pub fn video_report(&self, stream_id: StreamId) -> Option<VideoStreamReport> {
        let stats = self.video.get(&stream_id)?;
        let fps_estimate = if stats.window_started_ns == 0 { 0.0 } else { stats.window_frames as f64 };
        Some(VideoStreamReport { frames: stats.frames, bytes: stats.bytes, fps_estimate })
    }
}

/// Formats a byte count the way the diagnostic log does: exact bytes under
/// 1KiB, `KiB`/`MiB`/`GiB` with one decimal place above that.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glcap_proto::{PixelFormat, VideoFormatMsg, VideoFrameMsg};

    fn format(stream_id: StreamId, w: u32, h: u32, dword_aligned: bool) -> Message {
        let mut flags = StreamFlags::empty();
        if dword_aligned {
            flags.insert(StreamFlags::DWORD_ALIGNED);
        }
        Message::VideoFormat(VideoFormatMsg { stream_id, flags, format: PixelFormat::Bgr, width: w, height: h })
    }

    fn frame(stream_id: StreamId, time_ns: u64) -> Message {
        Message::VideoFrame(VideoFrameMsg { stream_id, time_ns, data: vec![].into() })
    }

    #[test]
    fn byte_tally_matches_the_unconditional_padding_formula() {
        let mut sink = InfoSink::new(InfoConfig { enabled: true, ..InfoConfig::default() });
        sink.observe(&format(1, 5, 3, true));
        sink.observe(&frame(1, 0));

        let report = sink.video_report(1).unwrap();
        let expected = PixelFormat::Bgr.frame_bytes(5, 3, true) as u64;
        assert_eq!(report.bytes, expected);
    }

    #[test]
    fn disabled_sink_tracks_nothing() {
        let mut sink = InfoSink::new(InfoConfig { enabled: false, ..InfoConfig::default() });
        sink.observe(&format(1, 5, 3, true));
        sink.observe(&frame(1, 0));
        assert!(sink.video_report(1).is_none());
    }

    #[test]
    fn frame_for_unknown_stream_is_ignored() {
        let mut sink = InfoSink::new(InfoConfig { enabled: true, ..InfoConfig::default() });
        sink.observe(&frame(99, 0));
        assert!(sink.video_report(99).is_none());
    }

    #[test]
    fn close_drops_the_stream_report() {
        let mut sink = InfoSink::new(InfoConfig { enabled: true, ..InfoConfig::default() });
        sink.observe(&format(1, 4, 2, false));
        sink.observe(&Message::Close { stream_id: 1 });
        assert!(sink.video_report(1).is_none());
    }

    #[test]
    fn tallies_accumulate_regardless_of_info_level() {
        // info_level only gates which events get logged; the running totals
        // themselves are unconditional.
        let mut sink = InfoSink::new(InfoConfig { enabled: true, info_level: 1 });
        sink.observe(&format(1, 5, 3, true));
        sink.observe(&frame(1, 0));
        let report = sink.video_report(1).unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(report.bytes, PixelFormat::Bgr.frame_bytes(5, 3, true) as u64);
    }

    #[test]
    fn format_bytes_switches_units_at_1024() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
    }
}
