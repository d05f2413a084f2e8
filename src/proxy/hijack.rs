//! Connection hijacking.
//!
//! A CONNECT tunnel needs exclusive raw control of the client connection,
//! taken out from under the HTTP layer that accepted it. The capability is
//! expressed as a trait so the tunnel relay can run against any byte
//! stream, including in-memory pipes in tests.

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Any bidirectional byte stream a tunnel can run over.
pub trait RawIo: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> RawIo for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Raw client connection handed over by a successful hijack.
pub struct RawConn {
    /// The connection itself.
    pub io: Box<dyn RawIo>,
    /// Bytes the protocol layer had already read past the request head.
    pub buffered: Bytes,
}

impl RawConn {
    pub fn new<T: RawIo>(io: T, buffered: Bytes) -> Self {
        Self {
            io: Box::new(io),
            buffered,
        }
    }
}

impl std::fmt::Debug for RawConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawConn")
            .field("buffered", &self.buffered.len())
            .finish_non_exhaustive()
    }
}

/// Reasons a hijack attempt can fail.
#[derive(Debug, Error)]
pub enum HijackError {
    #[error("connection already taken over")]
    AlreadyTaken,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Capability to take exclusive raw control of a client connection.
pub trait Hijack: Send {
    fn take_raw_control(self: Box<Self>) -> Result<RawConn, HijackError>;
}

/// Hijack capability over a connection whose request head was read by the
/// server itself, so nothing else holds the stream.
pub struct StreamHijack<T> {
    io: T,
    buffered: Bytes,
}

impl<T: RawIo> StreamHijack<T> {
    pub fn new(io: T, buffered: Bytes) -> Self {
        Self { io, buffered }
    }
}

impl<T: RawIo> Hijack for StreamHijack<T> {
    fn take_raw_control(self: Box<Self>) -> Result<RawConn, HijackError> {
        let StreamHijack { io, buffered } = *self;
        Ok(RawConn::new(io, buffered))
    }
}
