//! Response headers written back to clients

use bytes::Bytes;

use super::constants::{APPLICATION_JSON, GNSS_DATA, NTRIP_V2};
use super::request::NtripVersion;

/// Failure status sent before closing a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 400: request could not be parsed
    BadRequest,
    /// 401: bad, missing or unknown credential or mountpoint
    Unauthorized,
    /// 404: unknown or disabled administrative call
    NotFound,
    /// 408: header not received in time
    RequestTimeout,
    /// 409: mountpoint already has a source
    Conflict,
    /// 503: connection limit reached or shutting down
    ServiceUnavailable,
}

impl Status {
    /// Numeric status code
    pub fn code(self) -> u16 {
        match self {
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::NotFound => 404,
            Status::RequestTimeout => 408,
            Status::Conflict => 409,
            Status::ServiceUnavailable => 503,
        }
    }

    /// Reason phrase
    pub fn reason(self) -> &'static str {
        match self {
            Status::BadRequest => "Bad Request",
            Status::Unauthorized => "Unauthorized",
            Status::NotFound => "Not Found",
            Status::RequestTimeout => "Request Timeout",
            Status::Conflict => "Conflict",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

fn status_line(version: NtripVersion) -> &'static str {
    match version {
        NtripVersion::V1 => "HTTP/1.0",
        NtripVersion::V2 => "HTTP/1.1",
    }
}

/// Acceptance of a source
pub fn source_ok(version: NtripVersion, server: &str) -> Bytes {
    match version {
        NtripVersion::V1 => Bytes::from_static(b"ICY 200 OK\r\n\r\n"),
        NtripVersion::V2 => Bytes::from(format!(
            "HTTP/1.1 200 OK\r\nNtrip-Version: {NTRIP_V2}\r\nServer: {server}\r\n\
             Connection: close\r\n\r\n"
        )),
    }
}

/// Acceptance of a subscriber; raw stream bytes follow
pub fn subscribe_ok(version: NtripVersion, server: &str) -> Bytes {
    let mut head = format!(
        "{} 200 OK\r\nServer: {server}\r\nContent-Type: {GNSS_DATA}\r\n\
         Cache-Control: no-store, no-cache, max-age=0\r\nPragma: no-cache\r\n\
         Connection: close\r\n",
        status_line(version)
    );
    if version == NtripVersion::V2 {
        head.push_str(&format!("Ntrip-Version: {NTRIP_V2}\r\n"));
    }
    head.push_str("\r\n");
    Bytes::from(head)
}

/// Failure response for a subscriber, a sourcetable request or an NTRIP 2.0 source
pub fn error(status: Status, version: NtripVersion, server: &str) -> Bytes {
    let body = format!("{} {}\r\n", status.code(), status.reason());
    let mut head = format!(
        "{} {} {}\r\nServer: {server}\r\nContent-Type: text/plain\r\n\
         Content-Length: {}\r\nConnection: close\r\n",
        status_line(version),
        status.code(),
        status.reason(),
        body.len()
    );
    if version == NtripVersion::V2 {
        head.push_str(&format!("Ntrip-Version: {NTRIP_V2}\r\n"));
    }
    if status == Status::Unauthorized {
        head.push_str("WWW-Authenticate: Basic realm=\"NTRIP\"\r\n");
    }
    head.push_str("\r\n");
    head.push_str(&body);
    Bytes::from(head)
}

/// Successful administrative reply
pub fn json(version: NtripVersion, server: &str, body: &str) -> Bytes {
    Bytes::from(format!(
        "{} 200 OK\r\nServer: {server}\r\nContent-Type: {APPLICATION_JSON}\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        status_line(version),
        body.len()
    ))
}

/// Failure line for an NTRIP 1.0 `SOURCE` connection
pub fn legacy_source_error(status: Status) -> Bytes {
    match status {
        Status::Unauthorized => Bytes::from_static(b"ERROR - Bad Password\r\n"),
        _ => Bytes::from_static(b"ERROR - Mount Point Taken or Invalid\r\n"),
    }
}
