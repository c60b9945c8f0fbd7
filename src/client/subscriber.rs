//! NTRIP subscriber client
//!
//! Reads a mountpoint's stream, the way a rover would.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::Result;

use super::config::ClientConfig;
use super::connector::{NtripConnector, RequestKind};

/// NTRIP subscriber client
pub struct NtripClient {
    connector: NtripConnector,
    read_size: usize,
    bytes_received: u64,
}

impl NtripClient {
    /// Connect and subscribe to the configured mountpoint
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let connector = NtripConnector::connect(config, RequestKind::Subscribe).await?;

        Ok(Self {
            connector,
            read_size: 4 * 1024,
            bytes_received: 0,
        })
    }

    /// Caster's response status line
    pub fn status_line(&self) -> &str {
        self.connector.status_line()
    }

    /// Next piece of the stream, `None` once the caster closes
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let leftover = self.connector.take_leftover();
        if !leftover.is_empty() {
            self.bytes_received += leftover.len() as u64;
            return Ok(Some(leftover));
        }

        let mut buf = BytesMut::with_capacity(self.read_size);
        let n = self.connector.stream_mut().read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        self.bytes_received += n as u64;
        Ok(Some(buf.freeze()))
    }

    /// Read exactly `len` stream bytes
    ///
    /// Returns fewer bytes only if the caster closes the stream first.
    pub async fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(len);
        while out.len() < len {
            match self.next_chunk().await? {
                Some(mut chunk) => {
                    let want = len - out.len();
                    if chunk.len() > want {
                        let rest = chunk.split_off(want);
                        self.push_back(rest);
                    }
                    out.extend_from_slice(&chunk);
                }
                None => break,
            }
        }
        Ok(out.freeze())
    }

    /// Return unconsumed bytes; `next_chunk` hands them out first
    fn push_back(&mut self, rest: Bytes) {
        self.bytes_received -= rest.len() as u64;
        self.connector.set_leftover(rest);
    }

    /// Send an NMEA sentence upstream (e.g. a `$GPGGA` position report)
    pub async fn send_nmea(&mut self, sentence: &str) -> Result<()> {
        let stream = self.connector.stream_mut();
        stream.write_all(sentence.trim_end().as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Stream bytes received so far
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

/// Fetch the caster's sourcetable records (`STR;...` lines)
pub async fn fetch_sourcetable(config: &ClientConfig) -> Result<Vec<String>> {
    let mut connector = NtripConnector::connect(config, RequestKind::Sourcetable).await?;

    let mut body = connector.take_leftover().to_vec();
    connector.stream_mut().read_to_end(&mut body).await?;

    let body = String::from_utf8_lossy(&body);
    Ok(body
        .lines()
        .map(str::trim)
        .take_while(|line| *line != crate::protocol::constants::END_SOURCETABLE)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}
