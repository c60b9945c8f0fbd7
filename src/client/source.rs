//! NTRIP source client
//!
//! Pushes a correction stream to a caster mountpoint.

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::config::ClientConfig;
use super::connector::{NtripConnector, RequestKind};

/// Events from the source client
#[derive(Debug)]
pub enum SourceEvent {
    /// Caster accepted the source
    Connected,

    /// Error occurred
    Error(String),

    /// Disconnected
    Disconnected,
}

/// NTRIP source client
///
/// # Example
/// ```no_run
/// use ntrip_caster::client::{ClientConfig, NtripSource};
///
/// # async fn example() -> ntrip_caster::error::Result<()> {
/// let config = ClientConfig::new("127.0.0.1:2101", "RTCM3").password("sourcepass");
/// let (mut source, mut events) = NtripSource::new(config);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// source.connect().await?;
/// source.send(&[0xD3, 0x00, 0x00, 0x47, 0xEA, 0x4B]).await?;
/// # Ok(())
/// # }
/// ```
pub struct NtripSource {
    config: ClientConfig,
    event_tx: mpsc::Sender<SourceEvent>,
    connector: Option<NtripConnector>,
    bytes_sent: u64,
}

impl NtripSource {
    /// Create a new source client.
    ///
    /// Returns the client and a receiver for events.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<SourceEvent>) {
        let (tx, rx) = mpsc::channel(64);

        let source = Self {
            config,
            event_tx: tx,
            connector: None,
            bytes_sent: 0,
        };

        (source, rx)
    }

    /// Connect and claim the mountpoint.
    ///
    /// Fails with [`Error::AuthFailure`] or [`Error::ProducerConflict`] when
    /// the caster refuses the source.
    pub async fn connect(&mut self) -> Result<()> {
        match NtripConnector::connect(&self.config, RequestKind::Source).await {
            Ok(connector) => {
                self.connector = Some(connector);
                let _ = self.event_tx.try_send(SourceEvent::Connected);
                Ok(())
            }
            Err(e) => {
                let _ = self.event_tx.try_send(SourceEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Send stream bytes.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let connector = self.connector.as_mut().ok_or(Error::ConnectionClosed)?;

        if let Err(e) = connector.stream_mut().write_all(data).await {
            self.connector = None;
            let _ = self.event_tx.try_send(SourceEvent::Disconnected);
            return Err(Error::WriteFailure(e));
        }
        self.bytes_sent += data.len() as u64;
        Ok(())
    }

    /// Send a chunk of stream bytes.
    pub async fn send_bytes(&mut self, data: Bytes) -> Result<()> {
        self.send(&data).await
    }

    /// Disconnect from the caster, releasing the mountpoint.
    pub async fn disconnect(&mut self) {
        if let Some(mut connector) = self.connector.take() {
            let _ = connector.stream_mut().shutdown().await;
            let _ = self.event_tx.try_send(SourceEvent::Disconnected);
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.connector.is_some()
    }

    /// Bytes sent since the client was created
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}
