//! Source (producer) read loop
//!
//! Reads the source's byte stream and publishes every read as one chunk.
//! The loop ends when the source closes its side, stays silent for longer
//! than the mount's `producer_idle_timeout`, or the caster drops it. The
//! producer slot is released when the session (and with it the
//! [`ProducerGuard`]) is dropped, whichever way the loop ended.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::registry::ProducerGuard;
use crate::stats::SessionStats;

use super::state::CloseReason;

/// An attached source
#[derive(Debug)]
pub struct SourceSession {
    guard: ProducerGuard,
    idle_timeout: Duration,
    read_buffer_size: usize,
    started_at: Instant,
    bytes_received: u64,
    chunks: u64,
}

impl SourceSession {
    /// Wrap an attached producer
    ///
    /// `read_buffer_size` bounds the size of a single published chunk.
    pub fn new(guard: ProducerGuard, read_buffer_size: usize) -> Self {
        let idle_timeout = guard.mount().config().producer_idle_timeout;

        Self {
            guard,
            idle_timeout,
            read_buffer_size: read_buffer_size.max(1),
            started_at: Instant::now(),
            bytes_received: 0,
            chunks: 0,
        }
    }

    /// Override the idle timeout (zero disables it)
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Session ID
    pub fn id(&self) -> u64 {
        self.guard.session_id()
    }

    /// Mountpoint name
    pub fn mount(&self) -> &str {
        self.guard.mount().name()
    }

    /// Publish `initial` (bytes that arrived with the request header), then
    /// relay `reader` until it ends
    ///
    /// Returns [`CloseReason::PeerClosed`] on EOF and
    /// [`CloseReason::IdleTimeout`] when the source went silent. An
    /// administrative drop or retirement of the mount ends the loop with
    /// [`Error::SourceDropped`].
    pub async fn run<R>(&mut self, reader: &mut R, initial: Bytes) -> Result<CloseReason>
    where
        R: AsyncRead + Unpin,
    {
        if !initial.is_empty() {
            self.publish(initial)?;
        }

        let mut buf = BytesMut::with_capacity(self.read_buffer_size);

        loop {
            buf.reserve(self.read_buffer_size);

            let read = tokio::select! {
                biased;

                _ = self.guard.cancelled() => {
                    return Err(Error::SourceDropped(self.mount().to_owned()));
                }
                read = read_with_timeout(reader, &mut buf, self.idle_timeout) => read,
            };

            match read {
                Some(Ok(0)) => {
                    tracing::debug!(
                        session_id = self.id(),
                        mount = %self.mount(),
                        bytes = self.bytes_received,
                        "Source closed the connection"
                    );
                    return Ok(CloseReason::PeerClosed);
                }
                Some(Ok(_)) => {
                    let data = buf.split().freeze();
                    self.publish(data)?;
                }
                Some(Err(e)) => return Err(Error::Io(e)),
                None => {
                    tracing::warn!(
                        session_id = self.id(),
                        mount = %self.mount(),
                        idle_secs = self.idle_timeout.as_secs(),
                        "Source idle, disconnecting"
                    );
                    return Ok(CloseReason::IdleTimeout);
                }
            }
        }
    }

    fn publish(&mut self, data: Bytes) -> Result<()> {
        let len = data.len() as u64;
        self.guard.publish(data)?;
        self.bytes_received += len;
        self.chunks += 1;
        Ok(())
    }

    /// Bytes relayed so far
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Chunks published so far
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::new(self.id());
        stats.bytes_received = self.bytes_received;
        stats.duration = self.started_at.elapsed();
        stats.calculate_bitrate();
        stats
    }
}

/// `None` when the timeout fired first
async fn read_with_timeout<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    timeout: Duration,
) -> Option<std::io::Result<usize>>
where
    R: AsyncRead + Unpin,
{
    if timeout.is_zero() {
        return Some(reader.read_buf(buf).await);
    }
    tokio::time::timeout(timeout, reader.read_buf(buf)).await.ok()
}
