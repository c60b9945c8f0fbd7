//! Subscriber session: bounded outbound queue and delivery loop
//!
//! A [`SubscriberSession`] sits between a mountpoint and one subscriber
//! connection. The mountpoint pushes chunks with [`SubscriberSession::enqueue`],
//! which never waits: a full queue is resolved immediately by the session's
//! [`OverflowPolicy`]. The connection task runs [`SubscriberSession::deliver`],
//! which drains the queue to the socket at whatever pace the peer allows.
//!
//! ```text
//!  MountState::publish ──enqueue()──► [ queue ] ──deliver()──► TCP
//!       (never blocks)                 bounded     (own task)
//! ```
//!
//! The mountpoint holds only a `Weak` reference; the connection task owns the
//! session and its lifetime.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::registry::{Chunk, GapDetector, MountConfig, OverflowPolicy, QueueCapacity};
use crate::stats::SubscriberStats;

use super::state::{CloseReason, SessionPhase};

/// Outcome of [`SubscriberSession::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueResult {
    /// Chunk queued
    Accepted,
    /// Chunk queued after evicting this many older chunks
    DroppedOldest(usize),
    /// Queue full under `DisconnectSlow`; the session is now draining
    Overflow,
    /// Session is not active; nothing was queued
    Rejected,
}

impl QueueResult {
    /// Whether the subscriber should stay attached to the mountpoint
    pub fn keeps_subscriber(self) -> bool {
        matches!(self, QueueResult::Accepted | QueueResult::DroppedOldest(_))
    }
}

#[derive(Debug, Default)]
struct OutboundQueue {
    chunks: VecDeque<Chunk>,
    bytes: usize,
    close_reason: Option<CloseReason>,
    drain_deadline: Option<Instant>,
}

impl OutboundQueue {
    /// An empty queue always takes one chunk, whatever its size
    fn fits(&self, chunk: &Chunk, capacity: &QueueCapacity) -> bool {
        self.chunks.is_empty()
            || (self.chunks.len() < capacity.max_chunks
                && self.bytes.saturating_add(chunk.len()) <= capacity.max_bytes)
    }

    fn push(&mut self, chunk: Chunk) {
        self.bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    fn pop(&mut self) -> Option<Chunk> {
        let chunk = self.chunks.pop_front()?;
        self.bytes -= chunk.len();
        Some(chunk)
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.bytes = 0;
    }
}

#[derive(Debug, Default)]
struct Counters {
    chunks_enqueued: AtomicU64,
    bytes_sent: AtomicU64,
    chunks_dropped: AtomicU64,
    bytes_dropped: AtomicU64,
    gaps: AtomicU64,
}

/// Per-subscriber outbound queue with an overflow policy
#[derive(Debug)]
pub struct SubscriberSession {
    id: u64,
    mount: String,
    capacity: QueueCapacity,
    policy: OverflowPolicy,
    drain_timeout: Duration,
    created_at: Instant,
    queue: Mutex<OutboundQueue>,
    data_ready: Notify,
    phase: watch::Sender<SessionPhase>,
    counters: Counters,
}

impl SubscriberSession {
    /// Create a session for `mount` using the mount's queue settings
    ///
    /// The session starts in `Authorizing`; call [`activate`](Self::activate)
    /// once the subscriber is admitted.
    pub fn new(id: u64, mount: impl Into<String>, config: &MountConfig) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Authorizing);

        Self {
            id,
            mount: mount.into(),
            capacity: config.queue_capacity,
            policy: config.overflow_policy,
            drain_timeout: config.drain_timeout,
            created_at: Instant::now(),
            queue: Mutex::new(OutboundQueue::default()),
            data_ready: Notify::new(),
            phase,
            counters: Counters::default(),
        }
    }

    /// Session ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mountpoint name
    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// When the session was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Why the session is draining or closed, if it is
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.queue.lock().close_reason
    }

    fn transition(&self, next: SessionPhase) -> bool {
        self.phase.send_if_modified(|phase| {
            if phase.can_advance_to(next) {
                *phase = next;
                true
            } else {
                false
            }
        })
    }

    /// Admit the session: `Authorizing → Active`
    pub fn activate(&self) -> bool {
        self.transition(SessionPhase::Active)
    }

    /// Queue a chunk for delivery without waiting
    pub fn enqueue(&self, chunk: Chunk) -> QueueResult {
        if !self.phase().is_active() {
            return QueueResult::Rejected;
        }

        let mut queue = self.queue.lock();

        if queue.fits(&chunk, &self.capacity) {
            queue.push(chunk);
            drop(queue);
            self.counters.chunks_enqueued.fetch_add(1, Ordering::Relaxed);
            self.data_ready.notify_one();
            return QueueResult::Accepted;
        }

        match self.policy {
            OverflowPolicy::DropOldest => {
                let mut dropped = 0;
                while !queue.fits(&chunk, &self.capacity) {
                    let Some(old) = queue.pop() else { break };
                    dropped += 1;
                    self.counters.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .bytes_dropped
                        .fetch_add(old.len() as u64, Ordering::Relaxed);
                }
                queue.push(chunk);
                drop(queue);

                self.counters.chunks_enqueued.fetch_add(1, Ordering::Relaxed);
                self.data_ready.notify_one();

                tracing::trace!(
                    session_id = self.id,
                    mount = %self.mount,
                    dropped = dropped,
                    "Subscriber queue full, dropped oldest chunks"
                );
                QueueResult::DroppedOldest(dropped)
            }
            OverflowPolicy::DisconnectSlow => {
                let queued = queue.chunks.len();
                drop(queue);

                tracing::warn!(
                    session_id = self.id,
                    mount = %self.mount,
                    queued_chunks = queued,
                    "Subscriber too slow, disconnecting"
                );
                self.begin_drain(CloseReason::Overflow);
                QueueResult::Overflow
            }
        }
    }

    /// Start shutting the session down, flushing what is already queued
    ///
    /// Sessions that never became active close immediately. Returns false if
    /// the session was already draining or closed.
    pub fn begin_drain(&self, reason: CloseReason) -> bool {
        let phase = self.phase();
        if phase.is_terminating() {
            return false;
        }

        {
            let mut queue = self.queue.lock();
            queue.close_reason.get_or_insert(reason);
            queue.drain_deadline = Some(Instant::now() + self.drain_timeout);
        }

        let moved = if phase.is_active() {
            self.transition(SessionPhase::Draining)
        } else {
            self.transition(SessionPhase::Closed)
        };
        self.data_ready.notify_one();
        moved
    }

    /// Close the session immediately, discarding queued bytes
    pub fn close(&self, reason: CloseReason) {
        {
            let mut queue = self.queue.lock();
            queue.close_reason.get_or_insert(reason);
            queue.clear();
        }
        self.transition(SessionPhase::Closed);
        self.data_ready.notify_one();
    }

    /// Pop the next queued chunk
    pub(crate) fn next_chunk(&self) -> Option<Chunk> {
        self.queue.lock().pop()
    }

    /// Drain the queue into `writer` until the session closes
    ///
    /// Returns the close reason once the session reaches `Closed`. A write
    /// error closes the session and is returned as [`Error::WriteFailure`].
    /// While draining, all remaining writes share one deadline of
    /// `drain_timeout`; anything still queued when it passes is discarded.
    pub async fn deliver<W>(&self, writer: &mut W) -> Result<CloseReason>
    where
        W: AsyncWrite + Unpin,
    {
        let mut phase_rx = self.phase.subscribe();
        let mut gaps = GapDetector::default();

        loop {
            if let Some(chunk) = self.next_chunk() {
                let skipped = gaps.observe(&chunk);
                if skipped > 0 {
                    self.counters.gaps.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        session_id = self.id,
                        mount = %self.mount,
                        skipped_bytes = skipped,
                        "Gap in subscriber stream"
                    );
                }

                match self.bounded(writer.write_all(&chunk.data), &mut phase_rx).await {
                    Ok(true) => {
                        self.counters
                            .bytes_sent
                            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                    }
                    Ok(false) => return Ok(self.finish()),
                    Err(e) => return Err(self.fail(e)),
                }
                continue;
            }

            match self.phase() {
                SessionPhase::Closed => return Ok(self.finish()),
                SessionPhase::Draining => {
                    return match self.bounded(writer.flush(), &mut phase_rx).await {
                        Ok(_) => Ok(self.finish()),
                        Err(e) => Err(self.fail(e)),
                    };
                }
                _ => {
                    if let Err(e) = self.bounded(writer.flush(), &mut phase_rx).await {
                        return Err(self.fail(e));
                    }
                    self.data_ready.notified().await;
                }
            }
        }
    }

    /// Run `op` unless the drain deadline passes first
    ///
    /// Resolves to `Ok(false)` when the deadline won.
    async fn bounded<F>(&self, op: F, phase_rx: &mut watch::Receiver<SessionPhase>) -> io::Result<bool>
    where
        F: Future<Output = io::Result<()>>,
    {
        tokio::select! {
            res = op => res.map(|_| true),
            _ = self.drain_deadline(phase_rx) => Ok(false),
        }
    }

    /// Completes once the session is closed, or draining past its deadline
    async fn drain_deadline(&self, phase_rx: &mut watch::Receiver<SessionPhase>) {
        let reached = phase_rx
            .wait_for(|phase| phase.is_terminating())
            .await
            .map(|phase| *phase);

        match reached {
            Ok(SessionPhase::Draining) => {
                let deadline = self.queue.lock().drain_deadline;
                if let Some(deadline) = deadline {
                    tokio::time::sleep_until(deadline).await;
                }
            }
            Ok(_) => {}
            Err(_) => std::future::pending::<()>().await,
        }
    }

    fn finish(&self) -> CloseReason {
        let reason = {
            let mut queue = self.queue.lock();
            if !queue.chunks.is_empty() {
                tracing::debug!(
                    session_id = self.id,
                    mount = %self.mount,
                    discarded_chunks = queue.chunks.len(),
                    "Drain deadline passed, discarding queued data"
                );
            }
            queue.clear();
            *queue.close_reason.get_or_insert(CloseReason::Detached)
        };
        self.transition(SessionPhase::Closed);
        reason
    }

    fn fail(&self, err: io::Error) -> Error {
        self.close(CloseReason::WriteFailure);
        Error::WriteFailure(err)
    }

    /// Number of queued chunks
    pub fn queued_chunks(&self) -> usize {
        self.queue.lock().chunks.len()
    }

    /// Number of queued bytes
    pub fn queued_bytes(&self) -> usize {
        self.queue.lock().bytes
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> SubscriberStats {
        let (queued_chunks, queued_bytes) = {
            let queue = self.queue.lock();
            (queue.chunks.len(), queue.bytes)
        };

        SubscriberStats {
            session_id: self.id,
            mount: self.mount.clone(),
            phase: self.phase(),
            queued_chunks,
            queued_bytes,
            chunks_enqueued: self.counters.chunks_enqueued.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            chunks_dropped: self.counters.chunks_dropped.load(Ordering::Relaxed),
            bytes_dropped: self.counters.bytes_dropped.load(Ordering::Relaxed),
            gaps: self.counters.gaps.load(Ordering::Relaxed),
            connected_for: self.created_at.elapsed(),
        }
    }
}
