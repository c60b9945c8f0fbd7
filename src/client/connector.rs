//! Low-level caster connection
//!
//! Opens the TCP connection, writes one request header and reads the
//! caster's response header. Whatever the caster sent after the header
//! (the first stream bytes, or a sourcetable body) is kept for the caller.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::auth::Credential;
use crate::error::{Error, Result};
use crate::protocol::constants::NTRIP_V2;
use crate::protocol::request::find_header_end;
use crate::protocol::NtripVersion;

use super::config::ClientConfig;

/// Largest response header the client accepts
const MAX_RESPONSE_HEADER: usize = 16 * 1024;

/// Kind of request to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Source,
    Subscribe,
    Sourcetable,
}

/// Connected caster stream, past the response header
#[derive(Debug)]
pub struct NtripConnector {
    stream: TcpStream,
    status_line: String,
    leftover: Bytes,
}

impl NtripConnector {
    /// Connect, send the request and wait for a successful response
    pub(crate) async fn connect(config: &ClientConfig, kind: RequestKind) -> Result<Self> {
        let stream = tokio::time::timeout(config.timeout, TcpStream::connect(&config.addr))
            .await
            .map_err(|_| timed_out("connect"))??;
        stream.set_nodelay(true)?;

        let mut connector = Self {
            stream,
            status_line: String::new(),
            leftover: Bytes::new(),
        };

        let request = build_request(config, kind);
        connector.stream.write_all(request.as_bytes()).await?;

        let (head, leftover) = tokio::time::timeout(config.timeout, connector.read_head())
            .await
            .map_err(|_| timed_out("response"))??;

        connector.status_line = head.lines().next().unwrap_or_default().to_owned();
        connector.leftover = leftover;
        check_status(&connector.status_line, &config.mount)?;

        tracing::debug!(
            addr = %config.addr,
            mount = %config.mount,
            status = %connector.status_line,
            "Connected to caster"
        );
        Ok(connector)
    }

    /// Read the response header
    ///
    /// NTRIP 1.0 error lines are not followed by a blank line; the caster
    /// just closes, so EOF ends the header too.
    async fn read_head(&mut self) -> Result<(String, Bytes)> {
        let mut buf = BytesMut::with_capacity(1024);

        loop {
            if let Some(end) = find_header_end(&buf) {
                let rest = buf.split_off(end);
                return Ok((String::from_utf8_lossy(&buf).into_owned(), rest.freeze()));
            }
            if buf.len() >= MAX_RESPONSE_HEADER {
                return Err(Error::UnexpectedResponse("response header too large".into()));
            }

            buf.reserve(1024);
            if self.stream.read_buf(&mut buf).await? == 0 {
                if buf.is_empty() {
                    return Err(Error::ConnectionClosed);
                }
                return Ok((String::from_utf8_lossy(&buf).into_owned(), Bytes::new()));
            }
        }
    }

    /// First line of the caster's response
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Take the bytes received after the response header
    pub(crate) fn take_leftover(&mut self) -> Bytes {
        std::mem::take(&mut self.leftover)
    }

    pub(crate) fn set_leftover(&mut self, leftover: Bytes) {
        self.leftover = leftover;
    }

    /// The underlying stream
    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

fn timed_out(what: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("{what} timed out"),
    ))
}

pub(crate) fn build_request(config: &ClientConfig, kind: RequestKind) -> String {
    let mount = &config.mount;
    let v2 = config.version == NtripVersion::V2;

    let mut head = match (kind, v2, &config.credential) {
        (RequestKind::Source, false, Some(Credential::Password(password))) => {
            format!("SOURCE {password} /{mount}\r\nSource-Agent: {}\r\n", config.user_agent)
        }
        (RequestKind::Source, false, _) => {
            format!("SOURCE /{mount}\r\nSource-Agent: {}\r\n", config.user_agent)
        }
        (RequestKind::Source, true, _) => format!(
            "POST /{mount} HTTP/1.1\r\nUser-Agent: {}\r\nContent-Type: gnss/data\r\n",
            config.user_agent
        ),
        (RequestKind::Subscribe, _, _) => format!(
            "GET /{mount} {}\r\nUser-Agent: {}\r\n",
            if v2 { "HTTP/1.1" } else { "HTTP/1.0" },
            config.user_agent
        ),
        (RequestKind::Sourcetable, _, _) => format!(
            "GET / {}\r\nUser-Agent: {}\r\n",
            if v2 { "HTTP/1.1" } else { "HTTP/1.0" },
            config.user_agent
        ),
    };

    if v2 {
        head.push_str(&format!("Ntrip-Version: {NTRIP_V2}\r\n"));
    }

    // The legacy SOURCE line already carries a bare password
    let inline_password =
        kind == RequestKind::Source && !v2 && matches!(config.credential, Some(Credential::Password(_)));
    if let Some(credential) = config.credential.as_ref().filter(|_| !inline_password) {
        head.push_str(&format!("Authorization: {}\r\n", credential.to_authorization()));
    }

    head.push_str("\r\n");
    head
}

pub(crate) fn check_status(status_line: &str, mount: &str) -> Result<()> {
    let code = status_line.split_whitespace().nth(1);

    if status_line.starts_with("ICY 200")
        || status_line.starts_with("SOURCETABLE 200")
        || code == Some("200")
    {
        return Ok(());
    }

    if code == Some("401") || status_line.contains("Bad Password") {
        Err(Error::AuthFailure(mount.to_owned()))
    } else if code == Some("409") || status_line.contains("Mount Point Taken") {
        Err(Error::ProducerConflict(mount.to_owned()))
    } else {
        Err(Error::UnexpectedResponse(status_line.to_owned()))
    }
}
