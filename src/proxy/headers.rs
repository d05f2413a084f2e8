//! Header manipulation.
//!
//! # Responsibilities
//! - Strip proxy-only headers before a request leaves the proxy
//! - Copy upstream response headers to the client response verbatim

use hyper::header::{HeaderMap, HeaderName};

/// Headers meaningful only between the client and this proxy.
pub const PROXY_ONLY_HEADERS: [&str; 3] = [
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
];

/// Remove every proxy-only header, all values, any spelling.
///
/// `HeaderMap` keys are normalised to lower case on insertion, so a
/// lower-case lookup covers every casing the client may have sent.
pub fn strip_proxy_headers(headers: &mut HeaderMap) {
    for name in PROXY_ONLY_HEADERS {
        headers.remove(HeaderName::from_static(name));
    }
}

/// Append every `(name, value)` pair of `src` to `dst`.
///
/// Values keep their per-key order and multiplicity; nothing is added or
/// dropped.
pub fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    dst.reserve(src.len());
    for (name, value) in src.iter() {
        dst.append(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn strips_proxy_headers_in_any_casing() {
        let mut headers = map(&[
            ("Proxy-Connection", "keep-alive"),
            ("PROXY-AUTHORIZATION", "Basic Zm9vOmJhcg=="),
            ("proxy-authenticate", "Basic realm=x"),
            ("pRoXy-CoNnEcTiOn", "close"),
            ("Accept", "*/*"),
            ("Connection", "keep-alive"),
        ]);

        strip_proxy_headers(&mut headers);

        for name in PROXY_ONLY_HEADERS {
            assert!(!headers.contains_key(name), "{name} survived");
        }
        assert_eq!(headers.get("accept").unwrap(), "*/*");
        assert_eq!(headers.get("connection").unwrap(), "keep-alive");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn strip_on_clean_headers_is_noop() {
        let mut headers = map(&[("Host", "example.com")]);
        strip_proxy_headers(&mut headers);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn copy_preserves_multiplicity_and_order() {
        let src = map(&[
            ("Set-Cookie", "a=1"),
            ("Content-Type", "application/json"),
            ("Set-Cookie", "b=2"),
            ("Vary", "Accept"),
            ("Set-Cookie", "c=3"),
            ("Vary", "Origin"),
        ]);
        let mut dst = HeaderMap::new();

        copy_headers(&src, &mut dst);

        assert_eq!(dst.keys_len(), src.keys_len());
        assert_eq!(dst.len(), src.len());
        for key in src.keys() {
            let want: Vec<_> = src.get_all(key).iter().collect();
            let got: Vec<_> = dst.get_all(key).iter().collect();
            assert_eq!(got, want, "values for {key}");
        }
    }

    #[test]
    fn copy_into_empty_from_empty() {
        let mut dst = HeaderMap::new();
        copy_headers(&HeaderMap::new(), &mut dst);
        assert!(dst.is_empty());
    }
}
