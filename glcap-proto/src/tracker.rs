//! Out-of-band cache of the most recent format/color message per stream, so
//! a consumer that attaches mid-stream can be replayed a consistent prefix
//! before it sees live traffic.

use std::collections::HashMap;

use tracing::debug;

use crate::message::{AudioFormatMsg, ColorMsg, Message, StreamId, VideoFormatMsg};

#[derive(Default)]
struct TrackedVideo {
    format: Option<VideoFormatMsg>,
    color: Option<ColorMsg>,
}

#[derive(Default)]
struct TrackedAudio {
    format: Option<AudioFormatMsg>,
}

/// `submit` is O(1) amortized per call; `iterate` replays every remembered
/// message, per stream in the order `VIDEO_FORMAT`, `COLOR`, `AUDIO_FORMAT`,
/// and stops as soon as the callback returns `false`.
#[derive(Default)]
pub struct Tracker {
    video: HashMap<StreamId, TrackedVideo>,
    audio: HashMap<StreamId, TrackedAudio>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, message: &Message) {
        match message {
            Message::VideoFormat(m) => {
                if !self.video.contains_key(&m.stream_id) {
                    debug!(stream_id = m.stream_id, "tracking new video stream");
                }
                self.video.entry(m.stream_id).or_default().format = Some(m.clone());
            }
            Message::Color(m) => {
                self.video.entry(m.stream_id).or_default().color = Some(*m);
            }
            Message::AudioFormat(m) => {
                if !self.audio.contains_key(&m.stream_id) {
                    debug!(stream_id = m.stream_id, "tracking new audio stream");
                }
                self.audio.entry(m.stream_id).or_default().format = Some(*m);
            }
            _ => {}
        }
    }

    /// Visits every stream's recorded messages; stream iteration order
    /// itself is unspecified (`HashMap` order), matching the "any order"
    /// contract — only the per-stream ordering is guaranteed.
    pub fn iterate<F: FnMut(&Message) -> bool>(&self, mut callback: F) {
        for video in self.video.values() {
            if let Some(m) = &video.format {
                if !callback(&Message::VideoFormat(m.clone())) {
                    return;
                }
            }
            if let Some(m) = &video.color {
                if !callback(&Message::Color(*m)) {
                    return;
                }
            }
        }
        for audio in self.audio.values() {
            if let Some(m) = &audio.format {
                if !callback(&Message::AudioFormat(*m)) {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PixelFormat;
    use crate::message::StreamFlags;

    fn format(stream_id: StreamId) -> Message {
        Message::VideoFormat(VideoFormatMsg {
            stream_id,
            flags: StreamFlags::empty(),
            format: PixelFormat::Bgr,
            width: 4,
            height: 2,
        })
    }

    fn color(stream_id: StreamId) -> Message {
        Message::Color(ColorMsg {
            stream_id,
            brightness: 0.0,
            contrast: 0.0,
            red: 1.0,
            green: 1.0,
            blue: 1.0,
        })
    }

    #[test]
    fn replays_format_then_color_per_stream() {
        let mut tracker = Tracker::new();
        tracker.submit(&format(1));
        tracker.submit(&color(1));

        let mut seen = Vec::new();
        tracker.iterate(|m| {
            seen.push(match m {
                Message::VideoFormat(_) => "format",
                Message::Color(_) => "color",
                _ => "other",
            });
            true
        });
        assert_eq!(seen, vec!["format", "color"]);
    }

    #[test]
    fn only_the_latest_format_is_kept() {
        let mut tracker = Tracker::new();
        tracker.submit(&format(1));
        tracker.submit(&Message::VideoFormat(VideoFormatMsg {
            stream_id: 1,
            flags: StreamFlags::empty(),
            format: PixelFormat::Bgra,
            width: 8,
            height: 4,
        }));

        let mut widths = Vec::new();
        tracker.iterate(|m| {
            if let Message::VideoFormat(f) = m {
                widths.push(f.width);
            }
            true
        });
        assert_eq!(widths, vec![8]);
    }

    #[test]
    fn iteration_stops_on_false() {
        let mut tracker = Tracker::new();
        tracker.submit(&format(1));
        tracker.submit(&color(1));

        let mut calls = 0;
        tracker.iterate(|_| {
            calls += 1;
            false
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn iterate_is_idempotent() {
        let mut tracker = Tracker::new();
        tracker.submit(&format(1));
        tracker.submit(&color(1));
        tracker.submit(&Message::AudioFormat(AudioFormatMsg {
            stream_id: 2,
            flags: 0,
            rate: 48_000,
            channels: 2,
        }));

        let collect = |t: &Tracker| {
            let mut out = Vec::new();
            t.iterate(|m| {
                out.push(m.stream_id());
                true
            });
            out
        };
        assert_eq!(collect(&tracker), collect(&tracker));
    }
}
