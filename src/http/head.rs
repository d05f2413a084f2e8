//! First-request-head parsing.
//!
//! # Responsibilities
//! - Read bytes from a fresh connection until a full request head arrived
//! - Parse it with `httparse` into `http` types
//! - Bound the head size and header count
//!
//! # Design Decisions
//! - Only the first head of a connection is read here; hyper owns the rest
//! - Bytes past the head stay in the caller's buffer untouched

use axum::body::Body;
use bytes::BytesMut;
use httparse::{Status, EMPTY_HEADER};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, Uri, Version};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest request head accepted before the connection is refused.
pub const MAX_HEAD_BYTES: usize = 32 * 1024;

/// Most header lines accepted in one request head.
pub const MAX_HEADERS: usize = 64;

/// Why a request head could not be read.
#[derive(Debug, Error)]
pub enum HeadError {
    #[error("connection closed before a complete request head")]
    Closed,
    #[error("request head exceeds {} bytes", MAX_HEAD_BYTES)]
    TooLarge,
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("invalid request head: {0}")]
    Invalid(#[from] hyper::http::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HeadError {
    /// Literal reply for the client, when one makes sense.
    pub fn reply(&self) -> Option<&'static [u8]> {
        match self {
            HeadError::TooLarge | HeadError::Malformed(httparse::Error::TooManyHeaders) => {
                Some(b"HTTP/1.1 431 Request Header Fields Too Large\r\nConnection: close\r\n\r\n")
            }
            HeadError::Malformed(_) | HeadError::Invalid(_) => {
                Some(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n")
            }
            HeadError::Closed | HeadError::Io(_) => None,
        }
    }
}

/// A parsed request head.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub target: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Length of the head in the read buffer, terminating blank line included.
    pub len: usize,
}

impl RequestHead {
    /// Build an empty-bodied request from the head.
    pub fn into_request(self) -> Result<Request<Body>, HeadError> {
        let mut builder = Request::builder()
            .method(self.method)
            .uri(self.target)
            .version(self.version);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        Ok(builder.body(Body::empty())?)
    }
}

/// Read from `io` into `buf` until it holds a complete request head.
pub async fn read_head<R>(io: &mut R, buf: &mut BytesMut) -> Result<RequestHead, HeadError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(head) = parse_head(buf)? {
            return Ok(head);
        }
        if buf.len() >= MAX_HEAD_BYTES {
            return Err(HeadError::TooLarge);
        }
        if io.read_buf(buf).await? == 0 {
            return Err(HeadError::Closed);
        }
    }
}

/// Parse a request head from the start of `buf`.
///
/// Returns `Ok(None)` while the head is still incomplete.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, HeadError> {
    let mut headers = [EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let len = match req.parse(buf)? {
        Status::Complete(len) => len,
        Status::Partial => return Ok(None),
    };

    // A complete parse always fills method, path and version.
    let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())
        .map_err(hyper::http::Error::from)?;
    let target = req
        .path
        .unwrap_or_default()
        .parse::<Uri>()
        .map_err(hyper::http::Error::from)?;
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut map = HeaderMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(hyper::http::Error::from)?;
        let value = HeaderValue::from_bytes(header.value).map_err(hyper::http::Error::from)?;
        map.append(name, value);
    }

    Ok(Some(RequestHead {
        method,
        target,
        version,
        headers: map,
        len,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_head_needs_more() {
        assert!(parse_head(b"CONNECT example.com:443 HTTP/1.1\r\nHost: ex")
            .unwrap()
            .is_none());
    }

    #[test]
    fn connect_head_with_trailing_bytes() {
        let raw = b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n\x16\x03\x01";
        let head = parse_head(raw).unwrap().unwrap();

        assert_eq!(head.method, Method::CONNECT);
        assert_eq!(head.target.authority().unwrap().as_str(), "example.com:443");
        assert_eq!(head.version, Version::HTTP_11);
        assert_eq!(&raw[head.len..], b"\x16\x03\x01");
    }

    #[test]
    fn absolute_form_with_repeated_headers() {
        let raw = b"GET http://example.com/a?b=1 HTTP/1.0\r\nAccept: a\r\nAccept: b\r\n\r\n";
        let head = parse_head(raw).unwrap().unwrap();

        assert_eq!(head.method, Method::GET);
        assert_eq!(head.target.host(), Some("example.com"));
        assert_eq!(head.version, Version::HTTP_10);
        let accept: Vec<_> = head.headers.get_all("accept").iter().collect();
        assert_eq!(accept, ["a", "b"]);

        let req = head.into_request().unwrap();
        assert_eq!(req.uri().path(), "/a");
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_head(b"\x00\x01 nonsense\r\n\r\n").unwrap_err();
        assert!(matches!(err, HeadError::Malformed(_)));
        assert!(err.reply().unwrap().starts_with(b"HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn read_head_across_chunks() {
        let (mut peer, mut io) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            peer.write_all(b"CONNECT a.test:1 HTTP/1.1\r\n").await.unwrap();
            peer.write_all(b"\r\nearly").await.unwrap();
            peer
        });

        let mut buf = BytesMut::new();
        let head = read_head(&mut io, &mut buf).await.unwrap();
        let _peer = writer.await.unwrap();

        assert_eq!(head.method, Method::CONNECT);
        assert!(buf.len() >= head.len);
    }

    #[tokio::test]
    async fn oversized_head_is_refused() {
        let (mut peer, mut io) = tokio::io::duplex(MAX_HEAD_BYTES * 2);
        use tokio::io::AsyncWriteExt;
        let mut raw = b"GET http://a.test/ HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.resize(MAX_HEAD_BYTES + 10, b'a');
        peer.write_all(&raw).await.unwrap();

        let mut buf = BytesMut::new();
        let err = read_head(&mut io, &mut buf).await.unwrap_err();
        assert!(matches!(err, HeadError::TooLarge));
        assert!(err.reply().unwrap().starts_with(b"HTTP/1.1 431"));
    }

    #[tokio::test]
    async fn eof_before_head_is_closed() {
        let (peer, mut io) = tokio::io::duplex(16);
        drop(peer);
        let mut buf = BytesMut::new();
        assert!(matches!(read_head(&mut io, &mut buf).await, Err(HeadError::Closed)));
    }
}
