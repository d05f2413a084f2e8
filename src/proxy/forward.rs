//! Plain HTTP forwarding.
//!
//! # Responsibilities
//! - Turn a proxy request into a direct origin request
//! - Perform one round trip through the pooled client, no redirects
//! - Pass the response back, streaming or buffering by content type
//!
//! # Design Decisions
//! - Textual bodies (HTML, CSS, JS) stream so the client sees bytes early
//! - Other bodies are buffered so the raw payload can be logged; the buffer
//!   is bounded and the overflow policy is configurable
//! - Failures never retry

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, TryStreamExt};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, Uri, Version};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use crate::config::{ForwardingConfig, OversizePolicy, ProxyConfig};
use crate::error::ProxyError;
use crate::http::response::error_response;
use crate::http::IncomingRequest;
use crate::observability::{ProxyEvent, Reporter};
use crate::proxy::classify::ContentClassification;
use crate::proxy::headers::{copy_headers, strip_proxy_headers};

/// Pooled outbound client shared by every forwarded request. Speaks
/// `http` and `https` origins.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Forwards non-CONNECT requests to their origin.
pub struct HttpForwarder {
    client: HttpClient,
    forwarding: ForwardingConfig,
    log_bodies: bool,
    reporter: Arc<dyn Reporter>,
}

impl HttpForwarder {
    pub fn new(config: &ProxyConfig, reporter: Arc<dyn Reporter>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeouts.upstream_connect()));
        connector.set_nodelay(true);
        connector.enforce_http(false);
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.timeouts.pool_idle())
            .build(connector);

        Self {
            client,
            forwarding: config.forwarding.clone(),
            log_bodies: config.observability.log_bodies,
            reporter,
        }
    }

    /// Forward one request and produce the response for the client.
    pub async fn forward(&self, req: IncomingRequest) -> Response<Body> {
        let client = req.client_label();
        let (request, _) = req.into_parts();
        let (parts, body) = request.into_parts();
        let method = parts.method.clone();
        let uri = parts.uri.clone();

        self.reporter.report(&ProxyEvent::RequestReceived {
            client: &client,
            method: &method,
            uri: &uri,
        });

        let outbound = match prepare_outbound(parts, body) {
            Ok(outbound) => outbound,
            Err(err) => return self.fail(&method, &uri, err),
        };

        let start = Instant::now();
        let upstream = match self.client.request(outbound).await {
            Ok(response) => response,
            Err(e) => return self.fail(&method, &uri, ProxyError::from(e)),
        };

        let (parts, body) = upstream.into_parts();
        // Values may carry obs-text; classify on a lossy view rather than
        // treating them as absent.
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
            .unwrap_or_default();
        let classification = ContentClassification::from_content_type(&content_type);

        let body = if classification.is_textual || !self.log_bodies {
            self.stream_body(&uri, Body::new(body).into_data_stream())
        } else {
            match self.buffer_body(&uri, classification, body).await {
                Ok(body) => body,
                Err(err) => return self.fail(&method, &uri, err),
            }
        };

        self.reporter.report(&ProxyEvent::ResponseForwarded {
            method: &method,
            uri: &uri,
            status: parts.status,
            elapsed: start.elapsed(),
        });

        let mut response = Response::new(body);
        *response.status_mut() = parts.status;
        copy_headers(&parts.headers, response.headers_mut());
        response
    }

    /// Read a non-textual body into memory and capture it unless it is markup.
    ///
    /// Past the buffer limit the body is either streamed on (bytes already
    /// read go first) or refused, depending on the oversize policy.
    async fn buffer_body(
        &self,
        uri: &Uri,
        classification: ContentClassification,
        body: Incoming,
    ) -> Result<Body, ProxyError> {
        let limit = self.forwarding.max_buffered_body_bytes;
        let mut stream = Body::new(body).into_data_stream();
        let mut buffered = BytesMut::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let err = ProxyError::Copy(std::io::Error::other(e));
                    self.reporter
                        .report(&ProxyEvent::BodyReadFailed { uri, error: &err });
                    return Err(err);
                }
            };

            if buffered.len() + chunk.len() > limit {
                self.reporter.report(&ProxyEvent::BodyOversize { uri, limit });
                return match self.forwarding.oversize {
                    OversizePolicy::Reject => Err(ProxyError::BodyTooLarge { limit }),
                    OversizePolicy::Stream => {
                        let read = futures_util::stream::iter([Ok(buffered.freeze()), Ok(chunk)]);
                        Ok(self.stream_body(uri, read.chain(stream)))
                    }
                };
            }
            buffered.extend_from_slice(&chunk);
        }

        let body: Bytes = buffered.freeze();
        if classification.with_body(&body).should_capture() {
            self.reporter
                .report(&ProxyEvent::BodyCaptured { uri, body: &body });
        }
        Ok(Body::from(body))
    }

    /// Pass a body through as it arrives, reporting a failure mid-stream.
    ///
    /// The error still reaches hyper, which aborts the client connection.
    fn stream_body<S>(&self, uri: &Uri, stream: S) -> Body
    where
        S: Stream<Item = Result<Bytes, axum::Error>> + Send + 'static,
    {
        let reporter = self.reporter.clone();
        let uri = uri.clone();
        Body::from_stream(stream.inspect_err(move |e| {
            let err = ProxyError::Copy(std::io::Error::other(e.to_string()));
            reporter.report(&ProxyEvent::BodyCopyFailed {
                uri: &uri,
                error: &err,
            });
        }))
    }

    /// Report a request that ends in a proxy-generated error reply.
    fn fail(&self, method: &Method, uri: &Uri, err: ProxyError) -> Response<Body> {
        self.reporter.report(&ProxyEvent::ForwardFailed {
            method,
            uri,
            error: &err,
        });
        error_response(&err)
    }
}

/// Rewrite a proxy request into a request the origin can take directly.
///
/// Proxy-only headers go, the request is reissued as HTTP/1.1, and an
/// origin-form target is made absolute from the `Host` header.
pub fn prepare_outbound(mut parts: Parts, body: Body) -> Result<Request<Body>, ProxyError> {
    strip_proxy_headers(&mut parts.headers);
    parts.uri = absolute_uri(&parts.uri, &parts.headers)?;
    parts.version = Version::HTTP_11;
    Ok(Request::from_parts(parts, body))
}

fn absolute_uri(uri: &Uri, headers: &HeaderMap) -> Result<Uri, ProxyError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.clone());
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProxyError::InvalidTarget(uri.to_string()))?;
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    Uri::builder()
        .scheme("http")
        .authority(host)
        .path_and_query(path)
        .build()
        .map_err(|_| ProxyError::InvalidTarget(uri.to_string()))
}
