//! Proxy server: accept loop and per-connection handling.
//!
//! # Responsibilities
//! - Accept connections under the listener's connection limit
//! - Read the first request head of each connection
//! - Hand CONNECT requests the raw connection, serve the rest with hyper
//! - Stop accepting when shutdown is signalled
//!
//! # Data Flow
//! ```text
//! accept → read_head (httparse, bounded by the handshake timeout)
//!     CONNECT → StreamHijack(stream, bytes past the head) → Dispatcher
//!     other   → hyper http1 over PrefixedStream(head bytes, stream)
//!                 → service_fn → Dispatcher (per request)
//! ```
//!
//! # Design Decisions
//! - The first head is parsed here so a CONNECT can own the socket outright
//! - hyper replays the already-read bytes and owns the connection from then
//!   on; a CONNECT arriving later on a kept-alive connection has no hijack
//!   capability

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use bytes::BytesMut;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::http::head::{read_head, HeadError};
use crate::http::IncomingRequest;
use crate::net::{ConnectionTracker, Listener, PrefixedStream};
use crate::observability::Reporter;
use crate::proxy::{Dispatched, Dispatcher, Route, StreamHijack};

/// The forward proxy's HTTP/1.1 server.
pub struct ProxyServer {
    dispatcher: Dispatcher,
    handshake_timeout: Duration,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    pub fn new(config: &ProxyConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            dispatcher: Dispatcher::new(config, reporter),
            handshake_timeout: config.timeouts.handshake(),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Handle on the live connection count, for draining after shutdown.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Connections already accepted keep running after this returns.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy server starting");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    let span = tracing::info_span!("conn", id = %guard.id(), client = %peer);
                    let conn = Connection {
                        dispatcher: self.dispatcher.clone(),
                        handshake_timeout: self.handshake_timeout,
                    };
                    tokio::spawn(
                        async move {
                            let _permit = permit;
                            let _guard = guard;
                            conn.serve(stream, peer).await;
                        }
                        .instrument(span),
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Proxy server stopped"
        );
        Ok(())
    }
}

/// Per-connection state.
struct Connection {
    dispatcher: Dispatcher,
    handshake_timeout: Duration,
}

impl Connection {
    async fn serve(self, mut stream: TcpStream, peer: SocketAddr) {
        let _ = stream.set_nodelay(true);

        let mut buf = BytesMut::with_capacity(4096);
        let head = match tokio::time::timeout(self.handshake_timeout, read_head(&mut stream, &mut buf)).await {
            Ok(Ok(head)) => head,
            Ok(Err(HeadError::Closed)) => return,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Unreadable request head");
                refuse(&mut stream, &e).await;
                return;
            }
            Err(_) => {
                tracing::debug!(timeout = ?self.handshake_timeout, "Request head timed out");
                return;
            }
        };

        if Route::for_method(&head.method) == Route::Tunnel {
            let head_len = head.len;
            let request = match head.into_request() {
                Ok(request) => request,
                Err(e) => {
                    refuse(&mut stream, &e).await;
                    return;
                }
            };
            let buffered = buf.split_off(head_len).freeze();
            let req = IncomingRequest::new(request, Some(peer))
                .with_hijack(Box::new(StreamHijack::new(stream, buffered)));

            if let Dispatched::Response(response) = self.dispatcher.dispatch(req).await {
                // The stream left with the hijack capability; nothing to write to.
                tracing::warn!(status = %response.status(), "Tunnel refused after hijack");
            }
            return;
        }

        self.serve_http(stream, buf, peer).await;
    }

    async fn serve_http(self, stream: TcpStream, buf: BytesMut, peer: SocketAddr) {
        let io = TokioIo::new(PrefixedStream::new(buf.freeze(), stream));
        let dispatcher = self.dispatcher;

        let service = service_fn(move |req: Request<Incoming>| {
            let dispatcher = dispatcher.clone();
            async move {
                let request_id = Uuid::new_v4();
                let span = tracing::info_span!("request", id = %request_id);
                let req = IncomingRequest::new(req.map(Body::new), Some(peer));
                let response = match dispatcher.dispatch(req).instrument(span).await {
                    Dispatched::Response(response) => response,
                    Dispatched::Hijacked => Response::new(Body::empty()),
                };
                Ok::<_, Infallible>(response)
            }
        });

        let result = http1::Builder::new()
            .timer(TokioTimer::new())
            .header_read_timeout(self.handshake_timeout)
            .serve_connection(io, service)
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "Connection ended with error");
        }
    }
}

async fn refuse(stream: &mut TcpStream, err: &HeadError) {
    if let Some(reply) = err.reply() {
        let _ = stream.write_all(reply).await;
        let _ = stream.shutdown().await;
    }
}
