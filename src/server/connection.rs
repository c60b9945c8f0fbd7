//! Per-connection handling
//!
//! Each accepted socket is driven by one [`Connection`] on its own task:
//!
//! ```text
//! read_request ──► authorize ──┬─► SOURCE/POST ─► attach_producer ─► SourceSession::run
//!                              ├─► GET /mount ──► attach_subscriber ─► deliver ‖ watch EOF
//!                              ├─► GET / ───────► sourcetable, close
//!                              └─► /adm/api/v1/ ► admin call, close
//! ```
//!
//! Failures are answered with a status (when the client is still there to
//! read it) and confined to this connection.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::auth::AuthRegistry;
use crate::error::{Error, Result};
use crate::protocol::{
    read_request, response, sourcetable, AdminRequest, Intent, NtripVersion, SourceRequest,
    Status, SubscribeRequest,
};
use crate::registry::{MountConfig, MountError, MountState, MountpointTable, ProducerGuard};
use crate::server::admin::AdminCommand;
use crate::server::config::ServerConfig;
use crate::server::listener::ServerCounters;
use crate::session::{
    CloseReason, SessionPhase, SessionRole, SessionState, SourceSession, SubscriberSession,
};

/// Attempts at claiming a mount that was retired under us
const ATTACH_RETRIES: usize = 3;

/// A single client connection
pub struct Connection<S> {
    state: SessionState,
    stream: S,
    config: Arc<ServerConfig>,
    auth: Arc<AuthRegistry>,
    mounts: Arc<MountpointTable>,
    counters: Arc<ServerCounters>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a connection handler for an accepted stream
    pub fn new(
        session_id: u64,
        stream: S,
        peer_addr: SocketAddr,
        config: Arc<ServerConfig>,
        auth: Arc<AuthRegistry>,
        mounts: Arc<MountpointTable>,
        counters: Arc<ServerCounters>,
    ) -> Self {
        Self {
            state: SessionState::new(session_id, peer_addr),
            stream,
            config,
            auth,
            mounts,
            counters,
        }
    }

    /// Session ID
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Connection-level state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Serve the connection to completion
    pub async fn run(&mut self) -> Result<()> {
        let result = self.serve().await;

        self.state.close();
        self.counters
            .bytes_received
            .fetch_add(self.state.bytes_received, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(self.state.bytes_sent, Ordering::Relaxed);

        tracing::debug!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            role = ?self.state.role,
            mount = ?self.state.mount,
            bytes_received = self.state.bytes_received,
            bytes_sent = self.state.bytes_sent,
            duration_secs = self.state.duration().as_secs(),
            "Session finished"
        );
        result
    }

    async fn serve(&mut self) -> Result<()> {
        let limits = self.config.framer_limits();

        let (request, leftover) = match read_request(&mut self.stream, &limits).await {
            Ok(parsed) => parsed,
            Err(e) => {
                let status = match e {
                    Error::MalformedRequest(_) => Some(Status::BadRequest),
                    Error::HeaderTimeout => Some(Status::RequestTimeout),
                    _ => None,
                };
                if let Some(status) = status {
                    let resp = response::error(status, NtripVersion::V1, &self.config.server_name);
                    let _ = self.respond(resp).await;
                }
                return Err(e);
            }
        };

        self.state.advance(SessionPhase::Authorizing);
        self.state.bytes_received += leftover.len() as u64;

        tracing::debug!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            mount = ?request.intent.mount(),
            version = ?request.version,
            user_agent = ?request.user_agent,
            "Request received"
        );

        match request.intent {
            Intent::Producer(req) => self.handle_source(req, request.version, leftover).await,
            Intent::Subscriber(req) => self.handle_subscriber(req, request.version).await,
            Intent::Sourcetable => self.handle_sourcetable(request.version).await,
            Intent::Admin(req) => self.handle_admin(req, request.version, leftover).await,
        }
    }

    async fn handle_source(
        &mut self,
        req: SourceRequest,
        version: NtripVersion,
        leftover: Bytes,
    ) -> Result<()> {
        self.state.classify(SessionRole::Source, Some(&req.mount));

        let outcome = self.auth.check_producer(&req.mount, req.credential.as_ref());
        if !outcome.is_granted() {
            tracing::warn!(
                session_id = self.state.id,
                peer = %self.state.peer_addr,
                mount = %req.mount,
                outcome = ?outcome,
                "Source rejected"
            );
            let _ = self.reject_source(&req, version, Status::Unauthorized).await;
            return Err(Error::AuthFailure(req.mount));
        }

        let config = self.mount_config(&req.mount);
        let guard = match self.claim_producer(&req.mount, &config).await {
            Ok(guard) => guard,
            Err(e) => {
                let status = match e {
                    MountError::ProducerConflict(_) => Status::Conflict,
                    _ => Status::ServiceUnavailable,
                };
                let _ = self.reject_source(&req, version, status).await;
                return Err(e.into());
            }
        };

        // The guard releases the slot if the acknowledgement fails
        self.respond(response::source_ok(version, &self.config.server_name))
            .await?;
        self.state.advance(SessionPhase::Active);

        let mut session = SourceSession::new(guard, self.config.read_buffer_size);
        let result = session.run(&mut self.stream, leftover).await;
        self.state.bytes_received += session.bytes_received();
        drop(session);

        let reason = result?;
        tracing::info!(
            session_id = self.state.id,
            mount = %req.mount,
            reason = ?reason,
            "Source finished"
        );
        Ok(())
    }

    async fn reject_source(
        &mut self,
        req: &SourceRequest,
        version: NtripVersion,
        status: Status,
    ) -> Result<()> {
        let resp = if req.legacy {
            response::legacy_source_error(status)
        } else {
            response::error(status, version, &self.config.server_name)
        };
        self.respond(resp).await
    }

    /// Claim the producer slot, retrying if the mount was retired between
    /// lookup and attach
    async fn claim_producer(
        &self,
        name: &str,
        config: &MountConfig,
    ) -> std::result::Result<ProducerGuard, MountError> {
        let mut attempt = 0;
        loop {
            let mount = self.mounts.get_or_create_with(name, config).await;
            match mount.attach_producer(self.state.id) {
                Err(MountError::Retired(_)) if attempt < ATTACH_RETRIES => attempt += 1,
                result => return result,
            }
        }
    }

    async fn handle_subscriber(&mut self, req: SubscribeRequest, version: NtripVersion) -> Result<()> {
        self.state.classify(SessionRole::Subscriber, Some(&req.mount));

        let outcome = self.auth.check_subscriber(&req.mount, req.credential.as_ref());
        if !outcome.is_granted() {
            tracing::warn!(
                session_id = self.state.id,
                peer = %self.state.peer_addr,
                mount = %req.mount,
                outcome = ?outcome,
                "Subscriber rejected"
            );
            let resp = response::error(Status::Unauthorized, version, &self.config.server_name);
            let _ = self.respond(resp).await;
            return Err(Error::AuthFailure(req.mount));
        }

        let config = self.mount_config(&req.mount);
        let session = Arc::new(SubscriberSession::new(self.state.id, &req.mount, &config));
        session.activate();
        let mount = self.claim_subscriber(&req.mount, &config, &session).await?;

        // Anything published meanwhile (or primed) waits in the queue and
        // follows the header
        let ok = response::subscribe_ok(version, &self.config.server_name);
        if let Err(e) = self.respond(ok).await {
            session.close(CloseReason::WriteFailure);
            mount.detach_subscriber(session.id());
            return Err(e);
        }
        self.state.advance(SessionPhase::Active);

        let (mut reader, mut writer) = tokio::io::split(&mut self.stream);
        let (result, upstream) = tokio::select! {
            res = session.deliver(&mut writer) => (res, 0),
            upstream = discard_until_eof(&mut reader) => {
                session.close(CloseReason::PeerClosed);
                (Ok(CloseReason::PeerClosed), upstream)
            }
        };

        mount.detach_subscriber(session.id());
        self.state.bytes_received += upstream;
        self.state.bytes_sent += session.stats().bytes_sent;

        let reason = result?;
        tracing::info!(
            session_id = self.state.id,
            mount = %req.mount,
            reason = ?reason,
            "Subscriber finished"
        );

        if reason == CloseReason::Overflow {
            return Err(Error::QueueOverflow);
        }
        Ok(())
    }

    async fn claim_subscriber(
        &self,
        name: &str,
        config: &MountConfig,
        session: &Arc<SubscriberSession>,
    ) -> Result<Arc<MountState>> {
        let mut attempt = 0;
        loop {
            let mount = self.mounts.get_or_create_with(name, config).await;
            match mount.attach_subscriber(session) {
                Ok(_) => return Ok(mount),
                Err(MountError::Retired(_)) if attempt < ATTACH_RETRIES => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn handle_sourcetable(&mut self, version: NtripVersion) -> Result<()> {
        self.state.classify(SessionRole::Sourcetable, None);
        self.state.advance(SessionPhase::Active);

        let table = sourcetable::render(
            version,
            &self.config.server_name,
            self.auth.sourcetable_entries(),
        );
        self.respond(table).await
    }

    async fn handle_admin(
        &mut self,
        req: AdminRequest,
        version: NtripVersion,
        leftover: Bytes,
    ) -> Result<()> {
        self.state.classify(SessionRole::Admin, None);

        let Some(ref expected) = self.config.admin_credential else {
            let resp = response::error(Status::NotFound, version, &self.config.server_name);
            return self.respond(resp).await;
        };
        let granted = req
            .credential
            .as_ref()
            .is_some_and(|presented| expected.verify(presented));
        if !granted {
            tracing::warn!(
                session_id = self.state.id,
                peer = %self.state.peer_addr,
                call = %req.call,
                "Admin call rejected"
            );
            let resp = response::error(Status::Unauthorized, version, &self.config.server_name);
            let _ = self.respond(resp).await;
            return Err(Error::AuthFailure("adm".into()));
        }

        let body = match self.read_body(leftover, req.content_length).await {
            Ok(body) => body,
            Err(e) => {
                let status = match e {
                    Error::HeaderTimeout => Status::RequestTimeout,
                    _ => Status::BadRequest,
                };
                let _ = self
                    .respond(response::error(status, version, &self.config.server_name))
                    .await;
                return Err(e);
            }
        };

        let command = match AdminCommand::parse(&req, &body) {
            Ok(command) => command,
            Err(status) => {
                let resp = response::error(status, version, &self.config.server_name);
                return self.respond(resp).await;
            }
        };
        self.state.advance(SessionPhase::Active);

        tracing::info!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            command = ?command,
            "Admin call"
        );
        let reply = command.execute(&self.auth, &self.mounts).await;
        self.respond(response::json(version, &self.config.server_name, &reply))
            .await
    }

    /// Read a request body of `len` bytes, starting with what followed the
    /// header; bounded like the header itself
    async fn read_body(&mut self, leftover: Bytes, len: usize) -> Result<Bytes> {
        if len > self.config.max_header_size {
            return Err(Error::MalformedRequest(format!("body of {len} bytes too large")));
        }

        // Leftover bytes were counted with the header
        let mut body = BytesMut::from(&leftover[..leftover.len().min(len)]);
        let already_counted = body.len();
        let stream = &mut self.stream;
        let read = async move {
            while body.len() < len {
                if stream.read_buf(&mut body).await? == 0 {
                    return Err(Error::ConnectionClosed);
                }
            }
            body.truncate(len);
            Ok::<Bytes, Error>(body.freeze())
        };

        let body = tokio::time::timeout(self.config.header_timeout, read)
            .await
            .map_err(|_| Error::HeaderTimeout)??;
        self.state.bytes_received += (body.len() - already_counted) as u64;
        Ok(body)
    }

    fn mount_config(&self, name: &str) -> MountConfig {
        self.auth
            .definition(name)
            .map(|def| def.config.clone())
            .unwrap_or_else(|| self.mounts.default_config().clone())
    }

    /// Write a response, bounded by `response_timeout`
    async fn respond(&mut self, data: Bytes) -> Result<()> {
        let len = data.len() as u64;
        let stream = &mut self.stream;
        let written = tokio::time::timeout(self.config.response_timeout, async move {
            stream.write_all(&data).await?;
            stream.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => {
                self.state.bytes_sent += len;
                Ok(())
            }
            Ok(Err(e)) => Err(Error::WriteFailure(e)),
            Err(_) => Err(Error::WriteFailure(io::Error::new(
                io::ErrorKind::TimedOut,
                "response write timed out",
            ))),
        }
    }
}

/// Read and discard until the peer closes; returns the bytes discarded
///
/// Subscribers may send NMEA position updates upstream; the caster has no
/// use for them.
async fn discard_until_eof<R>(reader: &mut R) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 512];
    let mut total = 0;
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return total,
            Ok(n) => total += n as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::DuplexStream;

    use super::*;
    use crate::auth::{Credential, MountpointDefinition};

    struct Harness {
        config: Arc<ServerConfig>,
        auth: Arc<AuthRegistry>,
        mounts: Arc<MountpointTable>,
        counters: Arc<ServerCounters>,
        next_id: u64,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                config: Arc::new(
                    ServerConfig::default()
                        .header_timeout(Duration::from_millis(200))
                        .admin("admin", "secret"),
                ),
                auth: Arc::new(AuthRegistry::new(vec![
                    MountpointDefinition::new("RTCM3", "sourcepass").subscriber("rover", "roverpass"),
                ])),
                mounts: Arc::new(MountpointTable::new()),
                counters: Arc::new(ServerCounters::default()),
                next_id: 1,
            }
        }

        /// Spawn a connection; returns the client side and the task result
        fn connect(&mut self) -> (DuplexStream, tokio::task::JoinHandle<Result<()>>) {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let id = self.next_id;
            self.next_id += 1;

            let mut conn = Connection::new(
                id,
                server,
                "127.0.0.1:50000".parse().unwrap(),
                Arc::clone(&self.config),
                Arc::clone(&self.auth),
                Arc::clone(&self.mounts),
                Arc::clone(&self.counters),
            );
            let task = tokio::spawn(async move { conn.run().await });
            (client, task)
        }
    }

    async fn read_until(stream: &mut DuplexStream, needle: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        while !out.windows(needle.len()).any(|w| w == needle) {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream closed, got {:?}", String::from_utf8_lossy(&out));
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    async fn read_to_end(stream: &mut DuplexStream) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        out
    }

    fn subscribe_request() -> String {
        format!(
            "GET /RTCM3 HTTP/1.0\r\nAuthorization: {}\r\n\r\n",
            Credential::basic("rover", "roverpass").to_authorization()
        )
    }

    #[tokio::test]
    async fn test_source_to_subscriber() {
        let mut harness = Harness::new();

        let (mut sub, sub_task) = harness.connect();
        sub.write_all(subscribe_request().as_bytes()).await.unwrap();
        read_until(&mut sub, b"\r\n\r\n").await;

        let (mut src, src_task) = harness.connect();
        src.write_all(b"SOURCE sourcepass /RTCM3\r\n\r\n").await.unwrap();
        read_until(&mut src, b"ICY 200 OK\r\n\r\n").await;

        src.write_all(b"correction-bytes").await.unwrap();
        read_until(&mut sub, b"correction-bytes").await;

        drop(src);
        src_task.await.unwrap().unwrap();

        drop(sub);
        sub_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bytes_after_header_are_published() {
        let mut harness = Harness::new();

        let (mut sub, _sub_task) = harness.connect();
        sub.write_all(subscribe_request().as_bytes()).await.unwrap();
        read_until(&mut sub, b"\r\n\r\n").await;

        let (mut src, _src_task) = harness.connect();
        src.write_all(b"SOURCE sourcepass /RTCM3\r\n\r\nearly").await.unwrap();

        read_until(&mut sub, b"early").await;
    }

    #[tokio::test]
    async fn test_second_source_conflict() {
        let mut harness = Harness::new();

        let (mut first, _first_task) = harness.connect();
        first.write_all(b"SOURCE sourcepass /RTCM3\r\n\r\n").await.unwrap();
        read_until(&mut first, b"ICY 200 OK").await;

        let (mut second, second_task) = harness.connect();
        second.write_all(b"SOURCE sourcepass /RTCM3\r\n\r\n").await.unwrap();
        let reply = read_to_end(&mut second).await;

        assert_eq!(reply, b"ERROR - Mount Point Taken or Invalid\r\n");
        assert!(matches!(
            second_task.await.unwrap(),
            Err(Error::ProducerConflict(_))
        ));

        let mount = harness.mounts.lookup("RTCM3").await.unwrap();
        assert_eq!(mount.producer_id(), Some(1));
    }

    #[tokio::test]
    async fn test_bad_source_password() {
        let mut harness = Harness::new();

        let (mut src, task) = harness.connect();
        src.write_all(b"SOURCE wrong /RTCM3\r\n\r\n").await.unwrap();

        assert_eq!(read_to_end(&mut src).await, b"ERROR - Bad Password\r\n");
        assert!(matches!(task.await.unwrap(), Err(Error::AuthFailure(_))));
        assert!(harness.mounts.lookup("RTCM3").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_mount_same_as_bad_credential() {
        let mut harness = Harness::new();

        let (mut a, _) = harness.connect();
        a.write_all(b"GET /NOPE HTTP/1.0\r\n\r\n").await.unwrap();
        let unknown = read_to_end(&mut a).await;

        let (mut b, _) = harness.connect();
        b.write_all(b"GET /RTCM3 HTTP/1.0\r\n\r\n").await.unwrap();
        let missing = read_to_end(&mut b).await;

        assert!(unknown.starts_with(b"HTTP/1.0 401 Unauthorized\r\n"));
        assert_eq!(unknown, missing);
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let mut harness = Harness::new();

        let (mut client, task) = harness.connect();
        client.write_all(b"BREW /pot HTCPCP/1.0\r\n\r\n").await.unwrap();

        let reply = read_to_end(&mut client).await;
        assert!(reply.starts_with(b"HTTP/1.0 400 Bad Request\r\n"));
        assert!(matches!(task.await.unwrap(), Err(Error::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn test_header_timeout() {
        let mut harness = Harness::new();

        let (mut client, task) = harness.connect();
        client.write_all(b"GET /RTCM3 HTTP/1.0\r\n").await.unwrap();

        let reply = read_to_end(&mut client).await;
        assert!(reply.starts_with(b"HTTP/1.0 408 Request Timeout\r\n"));
        assert!(matches!(task.await.unwrap(), Err(Error::HeaderTimeout)));
    }

    #[tokio::test]
    async fn test_sourcetable() {
        let mut harness = Harness::new();

        let (mut client, task) = harness.connect();
        client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();

        let reply = String::from_utf8(read_to_end(&mut client).await).unwrap();
        assert!(reply.starts_with("SOURCETABLE 200 OK\r\n"));
        assert!(reply.contains("STR;RTCM3;"));
        assert!(reply.ends_with("ENDSOURCETABLE\r\n"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_disconnect_detaches() {
        let mut harness = Harness::new();

        let (mut sub, task) = harness.connect();
        sub.write_all(subscribe_request().as_bytes()).await.unwrap();
        read_until(&mut sub, b"\r\n\r\n").await;

        let mount = harness.mounts.lookup("RTCM3").await.unwrap();
        assert_eq!(mount.subscriber_count(), 1);

        drop(sub);
        task.await.unwrap().unwrap();
        assert_eq!(mount.subscriber_count(), 0);
    }

    fn admin_request(method: &str, call: &str, credential: &Credential, body: &str) -> String {
        format!(
            "{method} /adm/api/v1/{call} HTTP/1.1\r\nAuthorization: {}\r\n\
             Content-Length: {}\r\n\r\n{body}",
            credential.to_authorization(),
            body.len()
        )
    }

    fn json_body(reply: &[u8]) -> serde_json::Value {
        let reply = String::from_utf8_lossy(reply);
        let (_, body) = reply.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_admin_livesources() {
        let mut harness = Harness::new();

        let (mut src, _src_task) = harness.connect();
        src.write_all(b"SOURCE sourcepass /RTCM3\r\n\r\n").await.unwrap();
        read_until(&mut src, b"ICY 200 OK\r\n\r\n").await;

        let (mut admin, task) = harness.connect();
        let admin_credential = Credential::basic("admin", "secret");
        admin
            .write_all(admin_request("GET", "livesources", &admin_credential, "").as_bytes())
            .await
            .unwrap();

        let reply = read_to_end(&mut admin).await;
        assert!(reply.starts_with(b"HTTP/1.0 200 OK\r\n"));
        let listing = json_body(&reply);
        assert_eq!(listing[0]["mountpoint"], "RTCM3");
        assert_eq!(listing[0]["live"], true);
        assert_eq!(listing[0]["source_session"], 1);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_admin_drop_disconnects_source() {
        let mut harness = Harness::new();

        let (mut src, src_task) = harness.connect();
        src.write_all(b"SOURCE sourcepass /RTCM3\r\n\r\n").await.unwrap();
        read_until(&mut src, b"ICY 200 OK\r\n\r\n").await;

        let (mut admin, _task) = harness.connect();
        let request = admin_request(
            "POST",
            "drop",
            &Credential::basic("admin", "secret"),
            "mountpoint=RTCM3",
        );
        // Body arrives separately from the header
        let (head, body) = request.split_at(request.len() - 6);
        admin.write_all(head.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        admin.write_all(body.as_bytes()).await.unwrap();

        let reply = json_body(&read_to_end(&mut admin).await);
        assert_eq!(reply["mountpoint"], "RTCM3");
        assert_eq!(reply["dropped"], true);

        assert!(read_to_end(&mut src).await.is_empty());
        assert!(matches!(
            src_task.await.unwrap(),
            Err(Error::SourceDropped(ref m)) if m == "RTCM3"
        ));
    }

    #[tokio::test]
    async fn test_admin_requires_credential() {
        let mut harness = Harness::new();

        let (mut admin, task) = harness.connect();
        admin
            .write_all(
                admin_request("GET", "livesources", &Credential::basic("admin", "guess"), "")
                    .as_bytes(),
            )
            .await
            .unwrap();

        let reply = read_to_end(&mut admin).await;
        assert!(reply.starts_with(b"HTTP/1.0 401 Unauthorized\r\n"));
        assert!(matches!(task.await.unwrap(), Err(Error::AuthFailure(_))));
    }

    #[tokio::test]
    async fn test_admin_disabled_and_unknown_calls() {
        let mut harness = Harness::new();
        let credential = Credential::basic("admin", "secret");

        let (mut unknown, _) = harness.connect();
        unknown
            .write_all(admin_request("GET", "reload", &credential, "").as_bytes())
            .await
            .unwrap();
        assert!(read_to_end(&mut unknown)
            .await
            .starts_with(b"HTTP/1.0 404 Not Found\r\n"));

        harness.config = Arc::new(ServerConfig::default());
        let (mut disabled, task) = harness.connect();
        disabled
            .write_all(admin_request("GET", "livesources", &credential, "").as_bytes())
            .await
            .unwrap();
        assert!(read_to_end(&mut disabled)
            .await
            .starts_with(b"HTTP/1.0 404 Not Found\r\n"));
        task.await.unwrap().unwrap();
    }
}
