//! Request framing and classification
//!
//! Every caster connection opens with an HTTP-like header block. This module
//! reads exactly that block, under a byte and time budget, and classifies the
//! connection:
//!
//! ```text
//! SOURCE <password> /<mount>            NTRIP 1.0 source
//! SOURCE /<mount>  + Authorization      source, header credential
//! POST /<mount> HTTP/1.1                NTRIP 2.0 source
//! GET /<mount> HTTP/1.x                 subscriber
//! GET / HTTP/1.x                        sourcetable
//! GET|POST /adm/api/v1/<call>           administration
//! ```
//!
//! Whatever follows the blank line (a source may start streaming right
//! away) is returned untouched.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::auth::Credential;
use crate::error::{Error, Result};

use super::constants::{ADMIN_PREFIX, DEFAULT_MAX_HEADER_SIZE, MAX_MOUNT_LEN, NTRIP_V2};

/// Protocol generation spoken by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NtripVersion {
    /// NTRIP 1.0 (ICY / HTTP/1.0 style)
    #[default]
    V1,
    /// NTRIP 2.0 (`Ntrip-Version: Ntrip/2.0`)
    V2,
}

/// A source wanting to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    /// Mountpoint, without the leading `/`
    pub mount: String,
    /// Presented credential
    pub credential: Option<Credential>,
    /// Whether the password came on the NTRIP 1.0 `SOURCE` line
    pub legacy: bool,
}

/// A subscriber wanting to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Mountpoint, without the leading `/`
    pub mount: String,
    /// Presented credential
    pub credential: Option<Credential>,
}

/// HTTP method of an administrative call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminMethod {
    Get,
    Post,
}

/// An administrative call under `/adm/api/v1/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRequest {
    pub method: AdminMethod,
    /// Call name, e.g. `livesources`
    pub call: String,
    /// Raw query string, without the `?`
    pub query: Option<String>,
    /// Presented credential
    pub credential: Option<Credential>,
    /// Declared body length
    pub content_length: usize,
}

/// What the connection wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Publish on a mountpoint
    Producer(SourceRequest),
    /// Read a mountpoint
    Subscriber(SubscribeRequest),
    /// List mountpoints
    Sourcetable,
    /// Inspect or control the caster
    Admin(AdminRequest),
}

impl Intent {
    /// Mountpoint the request targets
    pub fn mount(&self) -> Option<&str> {
        match self {
            Intent::Producer(req) => Some(&req.mount),
            Intent::Subscriber(req) => Some(&req.mount),
            Intent::Sourcetable | Intent::Admin(_) => None,
        }
    }
}

/// A classified request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// What the client wants
    pub intent: Intent,
    /// Protocol generation
    pub version: NtripVersion,
    /// `User-Agent` (or NTRIP 1.0 `Source-Agent`) header
    pub user_agent: Option<String>,
}

/// Byte and time budget for reading a header
#[derive(Debug, Clone, Copy)]
pub struct FramerLimits {
    /// Maximum header size in bytes
    pub max_header_size: usize,
    /// Maximum time to receive the whole header
    pub header_timeout: Duration,
}

impl Default for FramerLimits {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            header_timeout: Duration::from_secs(10),
        }
    }
}

/// Read and classify a request header
///
/// Returns the request and any bytes received after the header terminator.
/// Fails with [`Error::HeaderTimeout`] if the header is larger than
/// `max_header_size` or slower than `header_timeout`, and with
/// [`Error::ConnectionClosed`] if the stream ends first.
pub async fn read_request<R>(reader: &mut R, limits: &FramerLimits) -> Result<(Request, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let (head, rest) =
        match tokio::time::timeout(limits.header_timeout, read_header(reader, limits.max_header_size))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(Error::HeaderTimeout),
        };

    Ok((parse_request(&head)?, rest))
}

async fn read_header<R>(reader: &mut R, max_size: usize) -> Result<(Bytes, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        match find_header_end(&buf) {
            Some(end) if end <= max_size => {
                let rest = buf.split_off(end);
                return Ok((buf.freeze(), rest.freeze()));
            }
            Some(_) => return Err(Error::HeaderTimeout),
            None if buf.len() >= max_size => return Err(Error::HeaderTimeout),
            None => {}
        }

        buf.reserve(1024);
        if reader.read_buf(&mut buf).await? == 0 {
            return Err(Error::ConnectionClosed);
        }
    }
}

/// Offset just past the empty line ending the header
///
/// Accepts CRLF and bare LF line endings.
pub(crate) fn find_header_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    for (i, &b) in buf.iter().enumerate() {
        if b == b'\n' {
            let line = &buf[line_start..i];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                return Some(i + 1);
            }
            line_start = i + 1;
        }
    }
    None
}

/// Classify a complete header block
pub fn parse_request(head: &[u8]) -> Result<Request> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::MalformedRequest("header is not valid UTF-8".into()))?;

    let mut lines = text.lines();
    let request_line = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| Error::MalformedRequest("empty request line".into()))?;

    let headers: Vec<(&str, &str)> = lines
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim(), value.trim()))
        .collect();

    let header = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    };

    let version = match header("Ntrip-Version") {
        Some(value) if value.eq_ignore_ascii_case(NTRIP_V2) => NtripVersion::V2,
        _ => NtripVersion::V1,
    };
    let user_agent = header("User-Agent")
        .or_else(|| header("Source-Agent"))
        .map(str::to_owned);
    let authorization = match header("Authorization") {
        Some(value) => Some(Credential::from_authorization(value).ok_or_else(|| {
            Error::MalformedRequest("unsupported or undecodable Authorization header".into())
        })?),
        None => None,
    };

    let mut tokens = request_line.split_whitespace();
    let method = tokens.next().unwrap_or_default();
    let args: Vec<&str> = tokens.collect();

    let admin_method = match method {
        "GET" => Some(AdminMethod::Get),
        "POST" => Some(AdminMethod::Post),
        _ => None,
    };
    if let (Some(method), Some(target)) = (admin_method, args.first()) {
        if let Some(call) = target.strip_prefix(ADMIN_PREFIX) {
            let content_length = match header("Content-Length") {
                Some(value) => value
                    .parse()
                    .map_err(|_| Error::MalformedRequest(format!("bad Content-Length {:?}", value)))?,
                None => 0,
            };
            let (call, query) = match call.split_once('?') {
                Some((call, query)) => (call, Some(query.to_owned())),
                None => (call, None),
            };

            return Ok(Request {
                intent: Intent::Admin(AdminRequest {
                    method,
                    call: call.to_owned(),
                    query,
                    credential: authorization,
                    content_length,
                }),
                version,
                user_agent,
            });
        }
    }

    let intent = match method {
        "SOURCE" => parse_source_line(&args, authorization)?,
        "POST" => {
            let target = args
                .first()
                .ok_or_else(|| Error::MalformedRequest("POST without a mountpoint".into()))?;
            Intent::Producer(SourceRequest {
                mount: parse_mount(target)?,
                credential: authorization,
                legacy: false,
            })
        }
        "GET" => {
            let target = args
                .first()
                .ok_or_else(|| Error::MalformedRequest("GET without a target".into()))?;
            let path = target.split('?').next().unwrap_or_default();
            if path.trim_matches('/').is_empty() {
                Intent::Sourcetable
            } else {
                Intent::Subscriber(SubscribeRequest {
                    mount: parse_mount(path)?,
                    credential: authorization,
                })
            }
        }
        other => {
            return Err(Error::MalformedRequest(format!(
                "unsupported method {:?}",
                other
            )))
        }
    };

    Ok(Request {
        intent,
        version,
        user_agent,
    })
}

/// `SOURCE` argument order differs between implementations; the token with a
/// leading `/` is the mountpoint. Without one, NTRIP 1.0 order applies:
/// `SOURCE <password> <mount>`.
fn parse_source_line(args: &[&str], authorization: Option<Credential>) -> Result<Intent> {
    let (mount, password) = match *args {
        [] => return Err(Error::MalformedRequest("SOURCE without a mountpoint".into())),
        [mount] => (mount, None),
        [first, second, ..] => {
            if first.starts_with('/') && !second.starts_with('/') {
                (first, Some(second))
            } else {
                (second, Some(first))
            }
        }
    };

    let legacy = password.is_some();
    let credential = match password {
        Some(password) => Some(Credential::Password(password.to_owned())),
        None => authorization,
    };

    Ok(Intent::Producer(SourceRequest {
        mount: parse_mount(mount)?,
        credential,
        legacy,
    }))
}

fn parse_mount(raw: &str) -> Result<String> {
    let mount = raw.trim_start_matches('/');

    let valid = !mount.is_empty()
        && mount.len() <= MAX_MOUNT_LEN
        && mount
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(mount.to_owned())
    } else {
        Err(Error::MalformedRequest(format!("invalid mountpoint {:?}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    fn parse(text: &str) -> Result<Request> {
        parse_request(text.as_bytes())
    }

    #[test]
    fn test_legacy_source_password_first() {
        let req = parse("SOURCE letmein /RTCM3\r\nSource-Agent: NTRIP test\r\n\r\n").unwrap();

        assert_eq!(req.version, NtripVersion::V1);
        assert_eq!(req.user_agent.as_deref(), Some("NTRIP test"));
        assert_eq!(
            req.intent,
            Intent::Producer(SourceRequest {
                mount: "RTCM3".into(),
                credential: Some(Credential::Password("letmein".into())),
                legacy: true,
            })
        );
    }

    #[test]
    fn test_legacy_source_mount_first() {
        let req = parse("SOURCE /RTCM3 letmein\r\n\r\n").unwrap();
        let Intent::Producer(src) = req.intent else {
            panic!("expected source");
        };
        assert_eq!(src.mount, "RTCM3");
        assert_eq!(src.credential, Some(Credential::Password("letmein".into())));
    }

    #[test]
    fn test_legacy_source_without_slashes() {
        let req = parse("SOURCE letmein RTCM3\r\n\r\n").unwrap();
        assert_eq!(req.intent.mount(), Some("RTCM3"));
    }

    #[test]
    fn test_source_with_header_credential() {
        let req = parse("SOURCE /RTCM3\r\nAuthorization: Basic YWRtaW46YWRtaW4=\r\n\r\n").unwrap();
        let Intent::Producer(src) = req.intent else {
            panic!("expected source");
        };
        assert!(!src.legacy);
        assert_eq!(src.credential, Some(Credential::basic("admin", "admin")));
    }

    #[test]
    fn test_ntrip2_post() {
        let req = parse(
            "POST /RTCM3 HTTP/1.1\r\nNtrip-Version: Ntrip/2.0\r\n\
             Authorization: Basic YWRtaW46YWRtaW4=\r\n\r\n",
        )
        .unwrap();

        assert_eq!(req.version, NtripVersion::V2);
        assert!(matches!(req.intent, Intent::Producer(ref src) if src.mount == "RTCM3"));
    }

    #[test]
    fn test_get_subscriber() {
        let req = parse(
            "GET /admin HTTP/1.0\r\nAuthorization: Basic YWRtaW46YWRtaW4=\r\n\
             User-Agent: test-client/1.0\r\n\r\n",
        )
        .unwrap();

        assert_eq!(req.user_agent.as_deref(), Some("test-client/1.0"));
        assert_eq!(
            req.intent,
            Intent::Subscriber(SubscribeRequest {
                mount: "admin".into(),
                credential: Some(Credential::basic("admin", "admin")),
            })
        );
    }

    #[test]
    fn test_get_root_is_sourcetable() {
        assert_eq!(parse("GET / HTTP/1.0\r\n\r\n").unwrap().intent, Intent::Sourcetable);
        assert_eq!(parse("GET /?x=1 HTTP/1.1\r\n\r\n").unwrap().intent, Intent::Sourcetable);
    }

    #[test]
    fn test_admin_calls() {
        let req = parse(
            "POST /adm/api/v1/drop?mountpoint=RTCM3 HTTP/1.1\r\n\
             Authorization: Basic YWRtaW46YWRtaW4=\r\nContent-Length: 12\r\n\r\n",
        )
        .unwrap();

        assert_eq!(req.intent.mount(), None);
        assert_eq!(
            req.intent,
            Intent::Admin(AdminRequest {
                method: AdminMethod::Post,
                call: "drop".into(),
                query: Some("mountpoint=RTCM3".into()),
                credential: Some(Credential::basic("admin", "admin")),
                content_length: 12,
            })
        );

        let req = parse("GET /adm/api/v1/livesources HTTP/1.0\r\n\r\n").unwrap();
        assert!(matches!(req.intent, Intent::Admin(ref a)
            if a.method == AdminMethod::Get && a.call == "livesources" && a.query.is_none()));

        // Outside the admin prefix the path is still a mountpoint
        assert!(matches!(
            parse("GET /adm HTTP/1.0\r\n\r\n").unwrap().intent,
            Intent::Subscriber(_)
        ));
        assert!(matches!(
            parse("POST /adm/api/v1/drop HTTP/1.1\r\nContent-Length: x\r\n\r\n"),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_bare_lf_accepted() {
        let req = parse("GET /RTCM3 HTTP/1.0\nUser-Agent: x\n\n").unwrap();
        assert_eq!(req.intent.mount(), Some("RTCM3"));
    }

    #[test]
    fn test_malformed_requests() {
        for text in [
            "\r\n\r\n",
            "PUT /RTCM3 HTTP/1.1\r\n\r\n",
            "SOURCE\r\n\r\n",
            "GET\r\n\r\n",
            "GET /bad%20name HTTP/1.0\r\n\r\n",
            "GET /RTCM3 HTTP/1.0\r\nAuthorization: Digest abc\r\n\r\n",
        ] {
            assert!(
                matches!(parse(text), Err(Error::MalformedRequest(_))),
                "expected malformed: {:?}",
                text
            );
        }
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"GET / HTTP/1.0\r\n\r\nDATA"), Some(18));
        assert_eq!(find_header_end(b"GET / HTTP/1.0\n\nDATA"), Some(16));
        assert_eq!(find_header_end(b"GET / HTTP/1.0\r\nHost: x\r\n"), None);
    }

    #[tokio::test]
    async fn test_read_request_returns_payload_untouched() {
        let mut reader = Builder::new()
            .read(b"SOURCE pass /RTCM3\r\n")
            .read(b"\r\n\xD3\x00\x01")
            .build();

        let (req, rest) = read_request(&mut reader, &FramerLimits::default()).await.unwrap();
        assert_eq!(req.intent.mount(), Some("RTCM3"));
        assert_eq!(&rest[..], b"\xD3\x00\x01");
    }

    #[tokio::test]
    async fn test_read_request_connection_closed() {
        let mut reader = Builder::new().read(b"GET /RTCM3 HTTP/1.0\r\n").build();

        let err = read_request(&mut reader, &FramerLimits::default()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_request_size_budget() {
        let limits = FramerLimits {
            max_header_size: 64,
            ..Default::default()
        };
        let long_header = format!("GET /RTCM3 HTTP/1.0\r\nX-Pad: {}\r\n\r\n", "a".repeat(100));
        let mut reader = Builder::new().read(long_header.as_bytes()).build();

        let err = read_request(&mut reader, &limits).await.unwrap_err();
        assert!(matches!(err, Error::HeaderTimeout));
    }

    #[tokio::test]
    async fn test_read_request_time_budget() {
        let limits = FramerLimits {
            header_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let mut reader = Builder::new()
            .read(b"GET /RTCM3 HTTP/1.0\r\n")
            .wait(Duration::from_secs(5))
            .build();

        let err = read_request(&mut reader, &limits).await.unwrap_err();
        assert!(matches!(err, Error::HeaderTimeout));
    }
}
