//! One live client link as the hub sees it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thingsync_core::{ConnectionId, SessionKey, User};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a connection. Moves forward only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Joined = 1,
    Leaving = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Joined,
            2 => Self::Leaving,
            _ => Self::Closed,
        }
    }
}

pub struct Connection {
    pub id: ConnectionId,
    pub session: SessionKey,
    pub user: User,
    /// Outbound queue drained by the connection's writer task.
    tx: mpsc::Sender<Arc<String>>,
    cancel: CancellationToken,
    state: AtomicU8,
    /// Last time any frame arrived from the client.
    last_seen: Mutex<Instant>,
    dropped: AtomicU64,
    pub connected_at: Instant,
}

impl Connection {
    pub fn new(
        session: SessionKey,
        user: User,
        tx: mpsc::Sender<Arc<String>>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            session,
            user,
            tx,
            cancel,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            last_seen: Mutex::new(now),
            dropped: AtomicU64::new(0),
            connected_at: now,
        }
    }

    /// Queue a frame without waiting.
    ///
    /// Returns `false` if the queue is full or closed; the frame is dropped
    /// and counted.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn mark_joined(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Joined)
    }

    /// Claim the single `Joined -> Leaving` transition.
    pub(crate) fn begin_leave(&self) -> bool {
        self.transition(ConnectionState::Joined, ConnectionState::Leaving)
    }

    pub(crate) fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Ask the connection's tasks to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}
