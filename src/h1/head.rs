//! Request and response head parsing and serialization.

use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode, Version};

use crate::h1::headers::HeaderList;

const MAX_HEADERS: usize = 96;

/// Framing of a message body, derived from the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    None,
    ContentLength(u64),
    Chunked,
}

/// Error raised while parsing a message head.
#[derive(Debug)]
pub enum HeadError {
    Malformed(&'static str),
    TooLarge,
}

impl std::fmt::Display for HeadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadError::Malformed(what) => write!(f, "malformed head: {}", what),
            HeadError::TooLarge => write!(f, "head exceeds configured limit"),
        }
    }
}

impl std::error::Error for HeadError {}

/// A parsed inbound request head plus the per-cycle metadata the relay
/// mutates (`upgraded` is set by the upgrade screen).
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HeaderList,
    pub body: BodyMode,
    pub expect_continue: bool,
    pub wants_close: bool,
    pub upgraded: bool,
}

/// A parsed response head.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderList,
}

impl ResponseHead {
    /// Serialize as status line + headers + blank line.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(version_text(self.version).as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.as_str().as_bytes());
        if !self.reason.is_empty() {
            buf.push(b' ');
            buf.extend_from_slice(self.reason.as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        self.headers.encode_into(&mut buf);
        buf.extend_from_slice(b"\r\n");
        buf
    }
}

pub fn version_text(version: Version) -> &'static str {
    match version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}

fn version_from_httparse(version: Option<u8>) -> Version {
    match version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn headers_from_httparse(raw: &[httparse::Header<'_>]) -> Result<HeaderList, HeadError> {
    let mut list = HeaderList::new();
    for h in raw {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| HeadError::Malformed("header name"))?;
        let value =
            HeaderValue::from_bytes(h.value).map_err(|_| HeadError::Malformed("header value"))?;
        list.push(name, value);
    }
    Ok(list)
}

fn content_length(headers: &HeaderList) -> Result<Option<u64>, HeadError> {
    match headers.get("content-length") {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or(HeadError::Malformed("content-length")),
    }
}

fn body_mode(headers: &HeaderList) -> Result<BodyMode, HeadError> {
    if headers.last_token_is("transfer-encoding", "chunked") {
        return Ok(BodyMode::Chunked);
    }
    // An explicit zero stays ContentLength so the forwarder re-emits it.
    match content_length(headers)? {
        None => Ok(BodyMode::None),
        Some(n) => Ok(BodyMode::ContentLength(n)),
    }
}

fn wants_close(version: Version, headers: &HeaderList) -> bool {
    if headers.contains_token("connection", "close") {
        return true;
    }
    version == Version::HTTP_10 && !headers.contains_token("connection", "keep-alive")
}

/// Parse a request head from `buf`. Returns the head and the number of
/// bytes it occupied, or `None` if the head is not yet complete.
pub fn parse_request(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, HeadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let consumed = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(HeadError::TooLarge),
        Err(_) => return Err(HeadError::Malformed("request head")),
    };

    let method = Method::from_bytes(req.method.ok_or(HeadError::Malformed("method"))?.as_bytes())
        .map_err(|_| HeadError::Malformed("method"))?;
    let target = req.path.ok_or(HeadError::Malformed("target"))?.to_string();
    let version = version_from_httparse(req.version);
    let list = headers_from_httparse(req.headers)?;
    let body = body_mode(&list)?;
    let expect_continue = list.contains_token("expect", "100-continue");
    let close = wants_close(version, &list);

    Ok(Some((
        RequestHead {
            method,
            target,
            version,
            headers: list,
            body,
            expect_continue,
            wants_close: close,
            upgraded: false,
        },
        consumed,
    )))
}

/// Parse a response head from `buf`. Returns the head and the number of
/// bytes it occupied, or `None` if the head is not yet complete.
pub fn parse_response(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>, HeadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);
    let consumed = match resp.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(HeadError::TooLarge),
        Err(_) => return Err(HeadError::Malformed("response head")),
    };

    let status = StatusCode::from_u16(resp.code.ok_or(HeadError::Malformed("status"))?)
        .map_err(|_| HeadError::Malformed("status"))?;
    let reason = resp
        .reason
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());

    Ok(Some((
        ResponseHead {
            version: version_from_httparse(resp.version),
            status,
            reason,
            headers: headers_from_httparse(resp.headers)?,
        },
        consumed,
    )))
}
