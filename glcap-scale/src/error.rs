use glcap_proto::StreamId;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq)]
pub enum ScaleError {
    /// Requested scale factor collapses a dimension to zero pixels.
    #[error("scale factor {scale} produces an empty output frame from {src_w}x{src_h}")]
    EmptyOutput { src_w: u32, src_h: u32, scale: f64 },

    /// A frame's byte length doesn't match the geometry its stream's format
    /// announced; the kernel would run off the end of the buffer.
    #[error("stream {stream_id} frame has {actual} bytes, expected {expected} for {src_w}x{src_h} at row stride {src_row}")]
    GeometryInvariant { stream_id: StreamId, src_w: u32, src_h: u32, src_row: u32, expected: usize, actual: usize },

    /// A worker thread panicked partway through a kernel; the frame that
    /// triggered it is lost but the pool keeps running.
    #[error("scaler worker panicked processing stream {stream_id}")]
    WorkerPanicked { stream_id: StreamId },
}
