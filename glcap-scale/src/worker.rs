//! The scaler's worker pool: `N = available_parallelism()` threads, each
//! pulling frames off the shared upstream buffer, running the per-stream
//! kernel, and forwarding the result downstream.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use glcap_proto::{Message, PacketStream, StreamId, Tracker, VideoFrameMsg};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::error::ScaleError;
use crate::scale_map::{bgra_drop_alpha, box_filter_half};
use crate::stream::{ProcessingMode, StreamState};

/// Owns the worker threads and the shared tracker a late-attaching consumer
/// can replay from.
pub struct Scaler {
    handles: Vec<JoinHandle<()>>,
    tracker: Arc<Mutex<Tracker>>,
}

impl Scaler {
    /// Spawns the worker pool. `workers` overrides the default of
    /// `std::thread::available_parallelism()` threads, mainly for tests.
    pub fn spawn(upstream: PacketStream, downstream: PacketStream, scale: f64, workers: Option<usize>) -> Self {
        let worker_count = workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        });
        let streams: Arc<RwLock<HashMap<StreamId, Arc<RwLock<StreamState>>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let tracker = Arc::new(Mutex::new(Tracker::new()));

        let handles = (0..worker_count)
            .map(|id| {
                let upstream = upstream.clone();
                let downstream = downstream.clone();
                let streams = streams.clone();
                let tracker = tracker.clone();
                std::thread::Builder::new()
                    .name(format!("glcap-scale-{id}"))
                    .spawn(move || worker_loop(upstream, downstream, streams, scale, tracker))
                    .expect("failed to spawn scaler worker thread")
            })
            .collect();

        Self { handles, tracker }
    }

    /// Shared handle to the replay tracker, for a consumer attaching after
    /// the stream has already started.
    pub fn tracker(&self) -> Arc<Mutex<Tracker>> {
        self.tracker.clone()
    }

    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    upstream: PacketStream,
    downstream: PacketStream,
    streams: Arc<RwLock<HashMap<StreamId, Arc<RwLock<StreamState>>>>>,
    scale: f64,
    tracker: Arc<Mutex<Tracker>>,
) {
    loop {
        let message = match upstream.recv() {
            Ok(message) => message,
            Err(_) => break,
        };

        let forwarded = match &message {
            Message::VideoFormat(format_msg) => match StreamState::from_format(format_msg, scale) {
                Ok(state) => {
                    let mut rewritten = format_msg.clone();
                    rewritten.width = state.dst_w;
                    rewritten.height = state.dst_h;
                    if state.mode != ProcessingMode::Passthrough {
                        rewritten.format = glcap_proto::PixelFormat::Bgr;
                    }
                    streams.write().insert(format_msg.stream_id, Arc::new(RwLock::new(state)));
                    Message::VideoFormat(rewritten)
                }
                Err(err) => {
                    warn!(stream_id = format_msg.stream_id, %err, "rejecting stream format");
                    continue;
                }
            },
            Message::VideoFrame(frame) => {
                let Some(state_lock) = streams.read().get(&frame.stream_id).cloned() else {
                    warn!(stream_id = frame.stream_id, "video frame for unknown stream, dropping");
                    continue;
                };
                let state = state_lock.read();
                let expected = (state.src_row * state.src_h) as usize;
                if frame.data.len() != expected {
                    let err = ScaleError::GeometryInvariant {
                        stream_id: frame.stream_id,
                        src_w: state.src_w,
                        src_h: state.src_h,
                        src_row: state.src_row,
                        expected,
                        actual: frame.data.len(),
                    };
                    warn!(stream_id = frame.stream_id, %err, "dropping frame");
                    continue;
                }
                match catch_unwind(AssertUnwindSafe(|| process_frame(frame, &state))) {
                    Ok(message) => message,
                    Err(_) => {
                        let err = ScaleError::WorkerPanicked { stream_id: frame.stream_id };
                        error!(stream_id = frame.stream_id, %err, "dropping frame");
                        continue;
                    }
                }
            }
            Message::Close { stream_id } => {
                streams.write().remove(stream_id);
                message
            }
            _ => message,
        };

        tracker.lock().submit(&forwarded);

        if let Err(err) = downstream.try_publish(forwarded) {
            debug!(%err, "downstream scaler buffer full or closed, dropping forwarded message");
        }
    }
}

fn process_frame(frame: &VideoFrameMsg, state: &StreamState) -> Message {
    match state.mode {
        ProcessingMode::Passthrough => Message::VideoFrame(frame.clone()),
        ProcessingMode::BgraDropAlpha => {
            let mut out = vec![0u8; state.output_len()];
            bgra_drop_alpha(&frame.data, &mut out, state.src_w, state.src_h, state.src_row);
            Message::VideoFrame(VideoFrameMsg { stream_id: frame.stream_id, time_ns: frame.time_ns, data: out.into() })
        }
        ProcessingMode::BoxFilterHalf => {
            let mut out = vec![0u8; state.output_len()];
            box_filter_half(&frame.data, &mut out, state.dst_w, state.dst_h, state.src_row, state.src_bpp);
            Message::VideoFrame(VideoFrameMsg { stream_id: frame.stream_id, time_ns: frame.time_ns, data: out.into() })
        }
        ProcessingMode::Bilinear => {
            let map = state.scale_map.as_ref().expect("bilinear mode always carries a scale map");
            let mut out = vec![0u8; map.output_len()];
            map.apply(&frame.data, &mut out);
            Message::VideoFrame(VideoFrameMsg { stream_id: frame.stream_id, time_ns: frame.time_ns, data: out.into() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glcap_proto::{PixelFormat, StreamFlags};

    #[test]
    fn bgr_passthrough_frame_is_forwarded_unchanged() {
        let state = StreamState::from_format(
            &glcap_proto::VideoFormatMsg { stream_id: 1, flags: StreamFlags::empty(), format: PixelFormat::Bgr, width: 2, height: 1 },
            1.0,
        )
        .unwrap();
        let frame = VideoFrameMsg { stream_id: 1, time_ns: 42, data: vec![1, 2, 3, 4, 5, 6].into() };
        let out = process_frame(&frame, &state);
        match out {
            Message::VideoFrame(f) => assert_eq!(&*f.data, &[1, 2, 3, 4, 5, 6][..]),
            _ => panic!("expected a video frame"),
        }
    }

    #[test]
    fn end_to_end_through_a_single_worker() {
        let upstream = PacketStream::bounded(8);
        let downstream = PacketStream::bounded(8);
        let scaler = Scaler::spawn(upstream.clone(), downstream.clone(), 1.0, Some(1));

        upstream
            .try_publish(Message::VideoFormat(glcap_proto::VideoFormatMsg {
                stream_id: 7,
                flags: StreamFlags::empty(),
                format: PixelFormat::Bgr,
                width: 1,
                height: 1,
            }))
            .unwrap();
        upstream
            .try_publish(Message::VideoFrame(VideoFrameMsg { stream_id: 7, time_ns: 1, data: vec![9, 8, 7].into() }))
            .unwrap();

        let got_format = downstream.recv().unwrap();
        assert!(matches!(got_format, Message::VideoFormat(_)));
        let got_frame = downstream.recv().unwrap();
        match got_frame {
            Message::VideoFrame(f) => assert_eq!(&*f.data, &[9, 8, 7][..]),
            _ => panic!("expected a video frame"),
        }

        upstream.cancel();
        scaler.join();
    }
}
