//! CONNECT tunneling.
//!
//! # Responsibilities
//! - Take raw control of the client connection
//! - Dial the requested `host:port` with a bounded timeout
//! - Relay bytes in both directions until either side stops
//!
//! # Data Flow
//! ```text
//! client ──hijack──▶ relay ──dial──▶ target
//!   ◀── "200 Connection Established" ──
//! client ⇄ [client→target task] [target→client task] ⇄ target
//! ```
//!
//! # Design Decisions
//! - Replies after the hijack are literal status lines on the raw socket
//! - The first relay direction to finish ends the whole session; bytes
//!   still in flight the other way are dropped
//! - No idle timeout once the tunnel is up

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::header;
use hyper::http::uri::Authority;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::ProxyError;
use crate::http::response::error_response;
use crate::http::IncomingRequest;
use crate::observability::{Direction, ProxyEvent, Reporter};
use crate::proxy::dispatch::Dispatched;
use crate::proxy::hijack::{RawConn, RawIo};

/// Written to the client once the target connection is up.
pub const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Written to the client when the target cannot be reached.
pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Establishes CONNECT tunnels.
pub struct TunnelRelay {
    connect_timeout: Duration,
    reporter: Arc<dyn Reporter>,
}

impl TunnelRelay {
    pub fn new(connect_timeout: Duration, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            connect_timeout,
            reporter,
        }
    }

    /// Serve one CONNECT request.
    ///
    /// Returns a response only when the connection could not be hijacked;
    /// every later outcome is written to the raw socket directly.
    pub async fn relay(&self, req: IncomingRequest) -> Dispatched {
        let client = req.client_label();
        let (request, hijack) = req.into_parts();
        let target = tunnel_target(&request);

        self.reporter.report(&ProxyEvent::TunnelRequested {
            client: &client,
            target: &target,
        });

        let raw = match hijack.map(|h| h.take_raw_control()) {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => return self.refuse(&target, ProxyError::HijackFailed(e)),
            None => return self.refuse(&target, ProxyError::HijackUnsupported),
        };
        let RawConn { mut io, buffered } = raw;

        let upstream = match self.dial(&target).await {
            Ok(stream) => stream,
            Err(err) => {
                self.reporter.report(&ProxyEvent::DialFailed {
                    target: &target,
                    error: &err,
                });
                let _ = io.write_all(BAD_GATEWAY).await;
                let _ = io.shutdown().await;
                return Dispatched::Hijacked;
            }
        };

        if let Err(e) = io.write_all(ESTABLISHED).await {
            let err = ProxyError::Copy(e);
            self.reporter.report(&ProxyEvent::RelayFinished {
                target: &target,
                direction: Direction::TargetToClient,
                bytes: 0,
                error: Some(&err),
            });
            return Dispatched::Hijacked;
        }
        self.reporter
            .report(&ProxyEvent::TunnelEstablished { target: &target });

        TunnelSession::new(io, buffered, upstream, target)
            .run(self.reporter.as_ref())
            .await;
        Dispatched::Hijacked
    }

    fn refuse(&self, target: &str, err: ProxyError) -> Dispatched {
        self.reporter.report(&ProxyEvent::HijackFailed {
            target,
            error: &err,
        });
        Dispatched::Response(error_response(&err))
    }

    async fn dial(&self, target: &str) -> Result<TcpStream, ProxyError> {
        let authority = parse_target(target).ok_or_else(|| ProxyError::DialFailed {
            target: target.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "target must be host:port",
            ),
        })?;

        let stream = connect_within(
            self.connect_timeout,
            target,
            TcpStream::connect(authority.as_str()),
        )
        .await?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

/// Bound a connect attempt; running out of time is a dial failure too.
async fn connect_within<F, S>(limit: Duration, target: &str, connect: F) -> Result<S, ProxyError>
where
    F: std::future::Future<Output = std::io::Result<S>>,
{
    let source = match tokio::time::timeout(limit, connect).await {
        Ok(Ok(stream)) => return Ok(stream),
        Ok(Err(e)) => e,
        Err(_) => std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect timed out after {:?}", limit),
        ),
    };
    Err(ProxyError::DialFailed {
        target: target.to_string(),
        source,
    })
}

/// The `host:port` a CONNECT request asks for: the request-target
/// authority, else the `Host` header.
pub fn tunnel_target<B>(request: &hyper::Request<B>) -> String {
    if let Some(authority) = request.uri().authority() {
        return authority.to_string();
    }
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| request.uri().to_string())
}

/// Accept only targets with a non-empty host and an explicit port.
fn parse_target(target: &str) -> Option<Authority> {
    let authority: Authority = target.parse().ok()?;
    if authority.host().is_empty() || authority.port_u16().is_none() {
        return None;
    }
    Some(authority)
}

/// Outcome of one relay direction.
#[derive(Debug)]
struct RelayOutcome {
    direction: Direction,
    bytes: u64,
    error: Option<std::io::Error>,
}

/// A live tunnel between a hijacked client connection and its target.
///
/// Exists from a successful hijack until relay termination; both
/// connections close together when it ends.
pub struct TunnelSession<C, T> {
    client: C,
    buffered: Bytes,
    target_conn: T,
    target: String,
}

impl<C: RawIo, T: RawIo> TunnelSession<C, T> {
    pub fn new(client: C, buffered: Bytes, target_conn: T, target: String) -> Self {
        Self {
            client,
            buffered,
            target_conn,
            target,
        }
    }

    /// Relay until either direction finishes, then close both connections.
    pub async fn run(self, reporter: &dyn Reporter) {
        let (client_read, client_write) = tokio::io::split(self.client);
        let (target_read, target_write) = tokio::io::split(self.target_conn);
        let (tx, mut rx) = mpsc::channel(2);

        let upstream = tokio::spawn(relay_half(
            Direction::ClientToTarget,
            self.buffered,
            client_read,
            target_write,
            tx.clone(),
        ));
        let downstream = tokio::spawn(relay_half(
            Direction::TargetToClient,
            Bytes::new(),
            target_read,
            client_write,
            tx,
        ));

        if let Some(outcome) = rx.recv().await {
            let error = outcome.error.map(ProxyError::Copy);
            reporter.report(&ProxyEvent::RelayFinished {
                target: &self.target,
                direction: outcome.direction,
                bytes: outcome.bytes,
                error: error.as_ref(),
            });
        }

        // Dropping the halves held by both tasks closes both sockets.
        upstream.abort();
        downstream.abort();
        let _ = upstream.await;
        let _ = downstream.await;
    }
}

async fn relay_half<R, W>(
    direction: Direction,
    prefix: Bytes,
    mut reader: R,
    mut writer: W,
    tx: mpsc::Sender<RelayOutcome>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (bytes, error) = copy_with_prefix(prefix, &mut reader, &mut writer).await;
    let _ = tx
        .send(RelayOutcome {
            direction,
            bytes,
            error,
        })
        .await;
}

/// Write `prefix`, then copy `reader` into `writer` until EOF or error.
async fn copy_with_prefix<R, W>(
    prefix: Bytes,
    reader: &mut R,
    writer: &mut W,
) -> (u64, Option<std::io::Error>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    if !prefix.is_empty() {
        if let Err(e) = writer.write_all(&prefix).await {
            return (total, Some(e));
        }
        total += prefix.len() as u64;
    }

    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return (total, None),
            Ok(n) => n,
            Err(e) => return (total, Some(e)),
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            return (total, Some(e));
        }
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::reporter::testing::{Recorded, RecordingReporter};
    use crate::proxy::hijack::{Hijack, HijackError, StreamHijack};
    use axum::body::Body;
    use hyper::{Method, Request, StatusCode};
    use std::net::SocketAddr;
    use tokio::io::DuplexStream;
    use tokio::net::TcpListener;

    struct FailingHijack;

    impl Hijack for FailingHijack {
        fn take_raw_control(self: Box<Self>) -> Result<RawConn, HijackError> {
            Err(HijackError::AlreadyTaken)
        }
    }

    fn connect(target: &str) -> Request<Body> {
        Request::builder()
            .method(Method::CONNECT)
            .uri(target)
            .body(Body::empty())
            .unwrap()
    }

    /// CONNECT request whose hijack hands over one end of an in-memory pipe.
    fn hijackable(target: &str, early: &'static [u8]) -> (IncomingRequest, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let req = IncomingRequest::new(connect(target), None).with_hijack(Box::new(
            StreamHijack::new(server, Bytes::from_static(early)),
        ));
        (req, client)
    }

    fn relay() -> (TunnelRelay, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        (
            TunnelRelay::new(Duration::from_secs(10), reporter.clone()),
            reporter,
        )
    }

    async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[test]
    fn target_from_authority_or_host() {
        assert_eq!(tunnel_target(&connect("example.com:443")), "example.com:443");

        let req = Request::builder()
            .method(Method::CONNECT)
            .uri("/")
            .header("Host", "fallback.test:8443")
            .body(())
            .unwrap();
        assert_eq!(tunnel_target(&req), "fallback.test:8443");
    }

    #[test]
    fn targets_need_host_and_port() {
        assert!(parse_target("example.com:443").is_some());
        assert!(parse_target("[::1]:8443").is_some());
        assert!(parse_target("example.com").is_none());
        assert!(parse_target(":443").is_none());
        assert!(parse_target("not a target").is_none());
    }

    #[tokio::test]
    async fn missing_hijack_is_internal_error() {
        let (relay, reporter) = relay();
        let req = IncomingRequest::new(connect("example.com:443"), None);

        match relay.relay(req).await {
            Dispatched::Response(response) => {
                assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR)
            }
            Dispatched::Hijacked => panic!("tunnel attempted without hijack"),
        }
        assert!(reporter.events().contains(&Recorded::HijackFailed));
    }

    #[tokio::test]
    async fn failed_hijack_is_service_unavailable() {
        let (relay, _) = relay();
        let req = IncomingRequest::new(connect("example.com:443"), None)
            .with_hijack(Box::new(FailingHijack));

        match relay.relay(req).await {
            Dispatched::Response(response) => {
                assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE)
            }
            Dispatched::Hijacked => panic!("tunnel attempted after failed hijack"),
        }
    }

    #[tokio::test]
    async fn unreachable_target_gets_literal_bad_gateway() {
        let addr = closed_port().await;
        let (relay, reporter) = relay();
        let (req, mut client) = hijackable(&addr.to_string(), b"");

        assert!(matches!(relay.relay(req).await, Dispatched::Hijacked));

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, BAD_GATEWAY);
        assert!(reporter.events().contains(&Recorded::DialFailed(addr.to_string())));
    }

    #[tokio::test]
    async fn malformed_target_is_a_dial_failure() {
        let (relay, _) = relay();
        let (req, mut client) = hijackable("no-port.test", b"");

        relay.relay(req).await;

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, BAD_GATEWAY);
    }

    #[tokio::test]
    async fn relays_both_ways_including_early_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let target = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 10];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"world").await.unwrap();
            buf
        });

        let (relay, reporter) = relay();
        let (req, mut client) = hijackable(&addr.to_string(), b"early");
        let session = tokio::spawn(async move { relay.relay(req).await });

        let mut line = vec![0u8; ESTABLISHED.len()];
        client.read_exact(&mut line).await.unwrap();
        assert_eq!(line, ESTABLISHED);

        client.write_all(b"hello").await.unwrap();
        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"world");
        assert_eq!(&target.await.unwrap(), b"earlyhello");

        // Target closed its socket: the whole session ends.
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
            .await
            .expect("client side not closed")
            .unwrap();
        assert!(rest.is_empty());
        session.await.unwrap();
        assert!(reporter
            .events()
            .contains(&Recorded::TunnelEstablished(addr.to_string())));
    }

    #[tokio::test]
    async fn first_finished_direction_closes_both() {
        let (client, client_peer) = tokio::io::duplex(1024);
        let (target, mut target_peer) = tokio::io::duplex(1024);
        let reporter = RecordingReporter::default();

        // Client hangs up; the target side never sends anything.
        drop(client_peer);
        let session = TunnelSession::new(client, Bytes::new(), target, "t:1".into());
        tokio::time::timeout(Duration::from_secs(5), session.run(&reporter))
            .await
            .expect("session did not end");

        let mut rest = Vec::new();
        target_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            reporter.events(),
            vec![Recorded::RelayFinished(Direction::ClientToTarget)]
        );
    }

    #[tokio::test]
    async fn stalled_connect_times_out() {
        let started = std::time::Instant::now();
        let err = connect_within(
            Duration::from_millis(50),
            "stalled.test:443",
            std::future::pending::<std::io::Result<TcpStream>>(),
        )
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            ProxyError::DialFailed { target, source } => {
                assert_eq!(target, "stalled.test:443");
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_target_still_gets_bad_gateway() {
        // Non-routable: the connect either hangs until the timeout or
        // fails at once, both must end in the literal 502.
        let reporter = Arc::new(RecordingReporter::default());
        let relay = TunnelRelay::new(Duration::from_millis(100), reporter.clone());
        let (req, mut client) = hijackable("10.255.255.1:81", b"");

        tokio::time::timeout(Duration::from_secs(5), relay.relay(req))
            .await
            .expect("dial not bounded");

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, BAD_GATEWAY);
        assert!(reporter
            .events()
            .contains(&Recorded::DialFailed("10.255.255.1:81".into())));
    }

    #[tokio::test]
    async fn teardown_with_data_still_pending() {
        let (client, mut client_peer) = tokio::io::duplex(1024);
        let (target, target_peer) = tokio::io::duplex(1024);
        let reporter = RecordingReporter::default();

        // The client keeps sending while the target hangs up.
        let writer = tokio::spawn(async move {
            let chunk = [b'x'; 512];
            loop {
                if client_peer.write_all(&chunk).await.is_err() {
                    return client_peer;
                }
            }
        });
        drop(target_peer);

        let session = TunnelSession::new(client, Bytes::new(), target, "t:2".into());
        tokio::time::timeout(Duration::from_secs(5), session.run(&reporter))
            .await
            .expect("session held open by pending data");

        let mut client_peer = tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .expect("client side left open")
            .unwrap();
        let mut rest = Vec::new();
        client_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(reporter.events().len(), 1);
    }

    #[tokio::test]
    async fn copy_counts_prefix_and_stream() {
        let mut reader: &[u8] = b"abc";
        let mut out = Vec::new();
        let (bytes, error) =
            copy_with_prefix(Bytes::from_static(b"xy"), &mut reader, &mut out).await;
        assert_eq!(bytes, 5);
        assert!(error.is_none());
        assert_eq!(out, b"xyabc");
    }
}
