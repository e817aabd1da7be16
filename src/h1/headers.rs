//! Ordered header list and the request/response header rewrites.

use http::header::{HeaderName, HeaderValue};

/// An ordered sequence of header name/value pairs.
///
/// Unlike a map, this preserves the order and multiplicity the peer sent,
/// so re-serialized heads stay close to the original. Name comparisons are
/// case-insensitive (`HeaderName` normalizes to lowercase).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderList(Vec<(HeaderName, HeaderValue)>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.push((name, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.0.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.0
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.as_str().eq_ignore_ascii_case(name));
    }

    /// True if any value of `name`, read as a comma-separated token list,
    /// contains `token` (case-insensitive).
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.0
            .iter()
            .filter(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .filter_map(|(_, v)| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|part| part.trim().eq_ignore_ascii_case(token))
    }

    /// True if the last token of the last `name` value equals `token`.
    pub fn last_token_is(&self, name: &str, token: &str) -> bool {
        self.0
            .iter()
            .filter(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .filter_map(|(_, v)| v.to_str().ok())
            .last()
            .and_then(|v| v.split(',').last())
            .map(|part| part.trim().eq_ignore_ascii_case(token))
            .unwrap_or(false)
    }

    /// Serialize as `name: value\r\n` lines.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        for (name, value) in &self.0 {
            buf.extend_from_slice(name.as_str().as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
    }

    /// Rebuild every value of `name` with `token` removed from its token
    /// list; headers whose list becomes empty are dropped entirely.
    fn strip_token(&mut self, name: &str, token: &str) {
        let mut out = Vec::with_capacity(self.0.len());
        for (n, v) in self.0.drain(..) {
            if !n.as_str().eq_ignore_ascii_case(name) {
                out.push((n, v));
                continue;
            }
            let Ok(text) = v.to_str() else {
                out.push((n, v));
                continue;
            };
            let kept: Vec<&str> = text
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty() && !part.eq_ignore_ascii_case(token))
                .collect();
            if kept.is_empty() {
                continue;
            }
            if let Ok(rebuilt) = HeaderValue::from_str(&kept.join(", ")) {
                out.push((n, rebuilt));
            }
        }
        self.0 = out;
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for HeaderList {
    fn from_iter<T: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Rewrite the inbound request headers for forwarding upstream.
///
/// Drops the `keep-alive` connection token, `Host`, `Content-Length` and
/// `Transfer-Encoding` (the forwarder re-supplies authority and framing),
/// then guarantees a `Connection: close` token unless the request is an
/// upgrade candidate, whose `Connection: upgrade` must reach the backend
/// intact. The result is the same no matter how often it is applied.
pub fn rewrite_request(headers: &HeaderList, upgrade: bool) -> HeaderList {
    let mut out = headers.clone();
    out.strip_token("connection", "keep-alive");
    out.remove("host");
    out.remove("content-length");
    out.remove("transfer-encoding");
    if !upgrade && !out.contains_token("connection", "close") {
        out.push(
            HeaderName::from_static("connection"),
            HeaderValue::from_static("close"),
        );
    }
    out
}

/// Rewrite the backend response headers for delivery to the client.
///
/// Drops the `keep-alive` connection token and, when `should_close` holds,
/// guarantees a `Connection: close` token.
pub fn rewrite_response(headers: &HeaderList, should_close: bool) -> HeaderList {
    let mut out = headers.clone();
    out.strip_token("connection", "keep-alive");
    if should_close && !out.contains_token("connection", "close") {
        out.push(
            HeaderName::from_static("connection"),
            HeaderValue::from_static("close"),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(&str, &str)]) -> HeaderList {
        pairs
            .iter()
            .map(|(n, v)| {
                (
                    HeaderName::from_bytes(n.as_bytes()).unwrap(),
                    HeaderValue::from_str(v).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn token_scan_is_case_insensitive() {
        let headers = list(&[("Connection", "Keep-Alive, Upgrade")]);
        assert!(headers.contains_token("connection", "upgrade"));
        assert!(headers.contains_token("connection", "keep-alive"));
        assert!(!headers.contains_token("connection", "close"));
    }

    #[test]
    fn last_token_detects_chunked() {
        let headers = list(&[("Transfer-Encoding", "gzip, chunked")]);
        assert!(headers.last_token_is("transfer-encoding", "chunked"));
        let headers = list(&[("Transfer-Encoding", "chunked, gzip")]);
        assert!(!headers.last_token_is("transfer-encoding", "chunked"));
    }

    #[test]
    fn request_rewrite_drops_and_closes() {
        let headers = list(&[
            ("Host", "example.test"),
            ("Connection", "keep-alive"),
            ("Content-Length", "12"),
            ("X-Custom", "yes"),
        ]);
        let rewritten = rewrite_request(&headers, false);
        assert!(rewritten.get("host").is_none());
        assert!(rewritten.get("content-length").is_none());
        assert!(!rewritten.contains_token("connection", "keep-alive"));
        assert!(rewritten.contains_token("connection", "close"));
        assert_eq!(rewritten.get("x-custom").unwrap(), "yes");
    }

    #[test]
    fn request_rewrite_is_idempotent() {
        let headers = list(&[
            ("Host", "example.test"),
            ("Connection", "keep-alive, upgrade"),
            ("Upgrade", "websocket"),
            ("Content-Length", "4"),
        ]);
        for upgrade in [false, true] {
            let once = rewrite_request(&headers, upgrade);
            let twice = rewrite_request(&once, upgrade);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn upgrade_rewrite_keeps_upgrade_token() {
        let headers = list(&[("Connection", "keep-alive, Upgrade"), ("Upgrade", "websocket")]);
        let rewritten = rewrite_request(&headers, true);
        assert!(rewritten.contains_token("connection", "upgrade"));
        assert!(!rewritten.contains_token("connection", "close"));
    }

    #[test]
    fn response_rewrite_appends_close_once() {
        let headers = list(&[("Content-Length", "5"), ("Connection", "keep-alive")]);
        let once = rewrite_response(&headers, true);
        assert!(once.contains_token("connection", "close"));
        let twice = rewrite_response(&once, true);
        assert_eq!(once, twice);

        let no_close = rewrite_response(&headers, false);
        assert!(no_close.get("connection").is_none());
    }
}
