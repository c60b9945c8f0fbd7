//! Per-mountpoint broadcast hub
//!
//! A [`MountState`] relays one producer's bytes to every subscriber of a
//! mountpoint:
//!
//! ```text
//!                         MountState
//!                  ┌──────────────────────────┐
//!   [Source] ────► │ producer: Option<Slot>   │
//!   publish()      │ ring: RingBuffer         │
//!                  │ next_seq: u64            │
//!                  │ subscribers: id → Weak   │
//!                  └────────────┬─────────────┘
//!                 enqueue()     │    (never waits)
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//!   [SubscriberSession]  [SubscriberSession]  [SubscriberSession]
//!     deliver() ─► TCP     deliver() ─► TCP     deliver() ─► TCP
//! ```
//!
//! All state sits behind one short-lived lock per mountpoint. No method
//! awaits while holding it, so `publish` costs one enqueue per subscriber and
//! a slow subscriber can only ever hurt itself.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::protocol::rtcm;
use crate::session::{CloseReason, QueueResult, SubscriberSession};
use crate::stats::MountStats;

use super::chunk::Chunk;
use super::config::{MountConfig, PrimePolicy};
use super::error::MountError;
use super::ring::RingBuffer;

/// The attached producer
#[derive(Debug)]
struct ProducerSlot {
    session_id: u64,
    attached_at: Instant,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct MountInner {
    producer: Option<ProducerSlot>,
    subscribers: HashMap<u64, Weak<SubscriberSession>>,
    ring: RingBuffer,
    next_seq: u64,
    last_data_at: tokio::time::Instant,
    producer_detached_at: Option<Instant>,
    retired: bool,
    chunks_in: u64,
    bytes_in: u64,
    sources_served: u64,
}

/// Result of a successful [`MountState::publish`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Stream offset assigned to the published bytes
    pub seq: u64,
    /// Subscribers the chunk was queued for
    pub delivered: usize,
    /// Subscribers that lost older data to make room
    pub lagging: usize,
    /// Subscribers removed because they overflowed or had closed
    pub removed: usize,
}

/// Result of a successful [`MountState::attach_subscriber`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachReport {
    /// Subscribers attached after this one joined
    pub subscribers: usize,
    /// Bytes handed over from the ring buffer
    pub primed_bytes: usize,
}

/// Exclusive right to publish on a mountpoint
///
/// Dropping the guard detaches the producer, whatever way the producer's task
/// ends.
#[derive(Debug)]
pub struct ProducerGuard {
    mount: Arc<MountState>,
    session_id: u64,
    cancel: CancellationToken,
}

impl ProducerGuard {
    /// The mountpoint this guard publishes to
    pub fn mount(&self) -> &Arc<MountState> {
        &self.mount
    }

    /// Session ID of the producer
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Publish bytes as this producer
    pub fn publish(&self, data: Bytes) -> Result<PublishReport, MountError> {
        self.mount.publish(self.session_id, data)
    }

    /// Resolves when the producer is dropped by the caster
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Whether the producer has been dropped by the caster
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        self.mount.detach_producer(self.session_id);
    }
}

/// Broadcast hub for one mountpoint
#[derive(Debug)]
pub struct MountState {
    name: String,
    config: MountConfig,
    created_at: Instant,
    inner: Mutex<MountInner>,
}

impl MountState {
    /// Create an empty mountpoint
    pub fn new(name: impl Into<String>, config: MountConfig) -> Self {
        let now = Instant::now();

        Self {
            name: name.into(),
            inner: Mutex::new(MountInner {
                producer: None,
                subscribers: HashMap::new(),
                ring: RingBuffer::with_capacity(config.ring_capacity),
                next_seq: 0,
                last_data_at: tokio::time::Instant::now(),
                producer_detached_at: None,
                retired: false,
                chunks_in: 0,
                bytes_in: 0,
                sources_served: 0,
            }),
            config,
            created_at: now,
        }
    }

    /// Mountpoint name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this mountpoint was created with
    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Claim the producer slot
    ///
    /// Fails with [`MountError::ProducerConflict`] if a producer is already
    /// attached; the existing producer is not touched.
    pub fn attach_producer(self: &Arc<Self>, session_id: u64) -> Result<ProducerGuard, MountError> {
        let mut inner = self.inner.lock();

        if inner.retired {
            return Err(MountError::Retired(self.name.clone()));
        }
        if let Some(ref existing) = inner.producer {
            tracing::warn!(
                mount = %self.name,
                session_id = session_id,
                current = existing.session_id,
                "Source rejected, mountpoint already has a source"
            );
            return Err(MountError::ProducerConflict(self.name.clone()));
        }

        let cancel = CancellationToken::new();
        inner.producer = Some(ProducerSlot {
            session_id,
            attached_at: Instant::now(),
            cancel: cancel.clone(),
        });
        inner.producer_detached_at = None;
        inner.sources_served += 1;

        tracing::info!(
            mount = %self.name,
            session_id = session_id,
            subscribers = inner.subscribers.len(),
            "Source attached"
        );

        Ok(ProducerGuard {
            mount: Arc::clone(self),
            session_id,
            cancel,
        })
    }

    /// Clear the producer slot if `session_id` holds it
    ///
    /// Subscribers stay attached; they simply stop receiving bytes until a
    /// new producer arrives or their idle timeout closes them.
    pub fn detach_producer(&self, session_id: u64) -> bool {
        let mut inner = self.inner.lock();

        match inner.producer {
            Some(ref slot) if slot.session_id == session_id => {}
            _ => return false,
        }

        if let Some(slot) = inner.producer.take() {
            slot.cancel.cancel();
            tracing::info!(
                mount = %self.name,
                session_id = session_id,
                attached_secs = slot.attached_at.elapsed().as_secs(),
                subscribers = inner.subscribers.len(),
                "Source detached"
            );
        }

        inner.producer_detached_at = Some(Instant::now());
        inner.last_data_at = tokio::time::Instant::now();
        true
    }

    /// Ask the attached producer to stop
    ///
    /// The producer's task notices the cancellation and detaches itself.
    /// Returns false if no producer was attached.
    pub fn drop_producer(&self) -> bool {
        let inner = self.inner.lock();
        match inner.producer {
            Some(ref slot) => {
                tracing::info!(
                    mount = %self.name,
                    session_id = slot.session_id,
                    "Dropping source"
                );
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Append producer bytes and queue them for every subscriber
    ///
    /// Every live subscriber's queue holds the chunk (or has applied its
    /// overflow policy) before this returns. Never waits on subscriber I/O.
    pub fn publish(&self, session_id: u64, data: Bytes) -> Result<PublishReport, MountError> {
        let mut inner = self.inner.lock();

        match inner.producer {
            Some(ref slot) if slot.session_id == session_id => {}
            _ => return Err(MountError::ProducerMismatch(self.name.clone())),
        }

        let mut report = PublishReport {
            seq: inner.next_seq,
            ..Default::default()
        };
        if data.is_empty() {
            return Ok(report);
        }

        let chunk = Chunk::new(inner.next_seq, data);
        inner.next_seq = chunk.end_seq();
        inner.chunks_in += 1;
        inner.bytes_in += chunk.len() as u64;
        inner.last_data_at = tokio::time::Instant::now();
        inner.ring.push(chunk.clone());

        inner.subscribers.retain(|&id, weak| {
            let Some(subscriber) = weak.upgrade() else {
                report.removed += 1;
                return false;
            };

            let result = subscriber.enqueue(chunk.clone());
            match result {
                QueueResult::Accepted => report.delivered += 1,
                QueueResult::DroppedOldest(_) => {
                    report.delivered += 1;
                    report.lagging += 1;
                }
                QueueResult::Overflow | QueueResult::Rejected => {
                    tracing::debug!(
                        mount = %self.name,
                        session_id = id,
                        result = ?result,
                        "Subscriber removed during publish"
                    );
                    report.removed += 1;
                }
            }
            result.keeps_subscriber()
        });

        tracing::trace!(
            mount = %self.name,
            seq = report.seq,
            bytes = chunk.len(),
            delivered = report.delivered,
            "Published chunk"
        );

        Ok(report)
    }

    /// Add a subscriber, priming it according to the mount's [`PrimePolicy`]
    ///
    /// The session must already be active.
    pub fn attach_subscriber(
        &self,
        subscriber: &Arc<SubscriberSession>,
    ) -> Result<AttachReport, MountError> {
        let mut inner = self.inner.lock();

        if inner.retired {
            return Err(MountError::Retired(self.name.clone()));
        }

        // The buffered history goes out as one chunk, so a ring of many
        // small reads never counts against `max_chunks`
        let history = match self.config.prime_policy {
            PrimePolicy::Skip => None,
            PrimePolicy::Flush => inner.ring.contiguous(),
            PrimePolicy::FlushFramed => inner.ring.contiguous().and_then(|mut buffered| {
                let offset = rtcm::find_frame_start(&buffered.data)?;
                buffered.advance(offset);
                Some(buffered)
            }),
        };
        let primed_bytes = match history {
            Some(chunk) if !chunk.is_empty() => {
                let len = chunk.len();
                match subscriber.enqueue(chunk) {
                    QueueResult::Accepted => len,
                    result => {
                        tracing::debug!(
                            mount = %self.name,
                            session_id = subscriber.id(),
                            result = ?result,
                            "Subscriber not primed"
                        );
                        0
                    }
                }
            }
            _ => 0,
        };

        inner
            .subscribers
            .insert(subscriber.id(), Arc::downgrade(subscriber));

        tracing::info!(
            mount = %self.name,
            session_id = subscriber.id(),
            subscribers = inner.subscribers.len(),
            primed_bytes = primed_bytes,
            "Subscriber added"
        );

        Ok(AttachReport {
            subscribers: inner.subscribers.len(),
            primed_bytes,
        })
    }

    /// Remove a subscriber and start draining it
    ///
    /// Removing an absent one is a no-op. Once out of the set nothing else
    /// would ever close the session, so it enters `Draining` here (sessions
    /// already terminating are left alone).
    pub fn detach_subscriber(&self, session_id: u64) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.subscribers.remove(&session_id);
            if removed.is_some() {
                tracing::debug!(
                    mount = %self.name,
                    session_id = session_id,
                    subscribers = inner.subscribers.len(),
                    "Subscriber removed"
                );
            }
            removed
        };

        match removed {
            Some(weak) => {
                if let Some(subscriber) = weak.upgrade() {
                    subscriber.begin_drain(CloseReason::Detached);
                }
                true
            }
            None => false,
        }
    }

    /// Start draining every subscriber and empty the set
    pub fn close_subscribers(&self, reason: CloseReason) -> usize {
        let subscribers: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.subscribers.drain().filter_map(|(_, w)| w.upgrade()).collect()
        };

        for subscriber in &subscribers {
            subscriber.begin_drain(reason);
        }
        subscribers.len()
    }

    /// Close subscribers that have gone too long without data while no
    /// producer is attached
    ///
    /// A subscriber's idle clock starts at the later of its own attach time
    /// and the last byte published (or the producer detaching). Returns the
    /// number of subscribers closed.
    pub fn expire_idle(&self, now: tokio::time::Instant) -> usize {
        let timeout = self.config.subscriber_idle_timeout;
        let mut expired = Vec::new();

        {
            let mut inner = self.inner.lock();
            if inner.producer.is_some() {
                return 0;
            }

            let quiet_for = now.saturating_duration_since(inner.last_data_at);
            inner.subscribers.retain(|_, weak| {
                let Some(subscriber) = weak.upgrade() else {
                    return false;
                };

                let attached_for = now.saturating_duration_since(subscriber.created_at());
                if quiet_for.min(attached_for) >= timeout {
                    expired.push(subscriber);
                    false
                } else {
                    true
                }
            });
        }

        for subscriber in &expired {
            tracing::info!(
                mount = %self.name,
                session_id = subscriber.id(),
                idle_secs = timeout.as_secs(),
                "Subscriber idle without source, disconnecting"
            );
            subscriber.begin_drain(CloseReason::IdleTimeout);
        }
        expired.len()
    }

    /// Whether a producer is attached
    pub fn has_producer(&self) -> bool {
        self.inner.lock().producer.is_some()
    }

    /// Session ID of the attached producer
    pub fn producer_id(&self) -> Option<u64> {
        self.inner.lock().producer.as_ref().map(|p| p.session_id)
    }

    /// Number of subscribers still alive
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .subscribers
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Whether the mount has neither producer nor live subscribers
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.producer.is_none() && inner.subscribers.values().all(|w| w.strong_count() == 0)
    }

    /// Stream offset of the next published byte
    pub fn next_seq(&self) -> u64 {
        self.inner.lock().next_seq
    }

    /// Mark the mount retired if it is empty
    ///
    /// Called by the table under its write lock. Once retired, attach calls
    /// fail with [`MountError::Retired`] so callers go back to the table.
    pub(crate) fn retire_if_empty(&self) -> bool {
        let mut inner = self.inner.lock();
        let empty = inner.producer.is_none()
            && inner.subscribers.values().all(|w| w.strong_count() == 0);
        if empty {
            inner.retired = true;
            inner.subscribers.clear();
            inner.ring.clear();
        }
        empty
    }

    /// Retire unconditionally, dropping the producer and every subscriber
    pub(crate) fn retire(&self, reason: CloseReason) {
        {
            let mut inner = self.inner.lock();
            inner.retired = true;
            if let Some(ref slot) = inner.producer {
                slot.cancel.cancel();
            }
        }
        self.close_subscribers(reason);
    }

    /// Snapshot of the mount counters
    pub fn stats(&self) -> MountStats {
        let inner = self.inner.lock();

        MountStats {
            name: self.name.clone(),
            producer_session: inner.producer.as_ref().map(|p| p.session_id),
            subscriber_count: inner
                .subscribers
                .values()
                .filter(|w| w.strong_count() > 0)
                .count(),
            bytes_in: inner.bytes_in,
            chunks_in: inner.chunks_in,
            next_seq: inner.next_seq,
            ring_bytes: inner.ring.size(),
            sources_served: inner.sources_served,
            idle_for: inner.producer_detached_at.map(|t| t.elapsed()),
            age: self.created_at.elapsed(),
        }
    }
}
