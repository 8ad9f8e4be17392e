//! A minimal stand-in for the external packet-stream buffer the capture
//! pipeline was designed against: a bounded, multi-producer/multi-consumer
//! FIFO of [`Message`]s with a non-blocking "try open" publish path and a
//! cancel that wakes every blocked participant.
//!
//! No crate on crates.io exposes the original's exact contract (packet-
//! granular writes, try-lock opens, DMA-style in-place reservation) because
//! that contract is inherently a shared-memory/IPC one; inside a single
//! process a `Message` is already a complete, correctly sized value, so the
//! separate "reserve N bytes, write into it" step collapses into one
//! send call. `crossbeam-channel` supplies the bounded FIFO, try-send
//! semantics, and (via `select!` against a second channel that `cancel`
//! closes) the "wake everyone blocked in recv" half.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use tracing::info;

use crate::message::Message;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PublishError {
    /// The buffer is full — caller should drop the frame rather than stall.
    #[error("packet-stream buffer is full")]
    Busy,
    /// The buffer has been cancelled (fatal error downstream, or shutdown).
    #[error("packet-stream buffer was cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecvError {
    #[error("packet-stream buffer was cancelled")]
    Cancelled,
    #[error("packet-stream buffer is closed")]
    Closed,
}

struct Inner {
    data_tx: Sender<Message>,
    data_rx: Receiver<Message>,
    /// Closed (all senders dropped) by `cancel`, which is how a thread
    /// blocked in `recv` wakes up immediately instead of waiting for a
    /// message that may never come.
    cancel_rx: Receiver<()>,
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancelled: AtomicBool,
}

/// A cloneable handle to a bounded message queue. Clones share the same
/// underlying channel and cancellation state.
#[derive(Clone)]
pub struct PacketStream {
    inner: Arc<Inner>,
}

impl PacketStream {
    pub fn bounded(capacity: usize) -> Self {
        let (data_tx, data_rx) = bounded(capacity);
        let (cancel_tx, cancel_rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                data_tx,
                data_rx,
                cancel_rx,
                cancel_tx: Mutex::new(Some(cancel_tx)),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Non-blocking publish: the "try-lock open" path used on the host
    /// render thread, which must never stall. Returns `Busy` rather than
    /// blocking when the buffer is full.
    pub fn try_publish(&self, message: Message) -> Result<(), PublishError> {
        if self.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        self.inner.data_tx.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => PublishError::Busy,
            TrySendError::Disconnected(_) => PublishError::Cancelled,
        })
    }

    /// Blocking publish, used only under `LOCK_FPS`/`IGNORE_TIME` where the
    /// caller has already opted into pacing by waiting rather than dropping.
    pub fn publish_blocking(&self, message: Message) -> Result<(), PublishError> {
        if self.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        self.inner.data_tx.send(message).map_err(|_| PublishError::Cancelled)
    }

    /// Blocks until a message arrives or the buffer is cancelled/closed. A
    /// `cancel` racing with a pending message may surface either outcome —
    /// callers that need to fully drain before observing `Cancelled` should
    /// poll `try_recv` in a loop first.
    pub fn recv(&self) -> Result<Message, RecvError> {
        crossbeam_channel::select! {
            recv(self.inner.data_rx) -> msg => msg.map_err(|_| RecvError::Closed),
            recv(self.inner.cancel_rx) -> _ => Err(RecvError::Cancelled),
        }
    }

    pub fn try_recv(&self) -> Result<Option<Message>, RecvError> {
        match self.inner.data_rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) if self.is_cancelled() => Err(RecvError::Cancelled),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(RecvError::Closed),
        }
    }

    /// Cancels the buffer: every subsequent publish observes `Cancelled`,
    /// and every thread currently blocked in `recv` wakes immediately.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            info!("packet stream cancelled");
        }
        self.inner.cancel_tx.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}
