//! Upgrade screening.
//!
//! Runs before the relay: a request asserting `Connection: upgrade` must
//! carry a well-formed `Upgrade` header or the cycle is answered 400
//! without dialing a backend. The protocol token itself is not
//! interpreted; the relay decides later whether the backend honored the
//! switch.

use crate::h1::head::RequestHead;
use crate::relay::error::RelayError;

/// Inspect the request and mark it as an upgrade candidate, or reject a
/// malformed attempt.
pub fn screen(req: &mut RequestHead) -> Result<(), RelayError> {
    if !req.headers.contains_token("connection", "upgrade") {
        return Ok(());
    }

    let Some(value) = req.headers.get("upgrade") else {
        return Err(RelayError::BadUpgrade("missing Upgrade header"));
    };
    let Ok(text) = value.to_str() else {
        return Err(RelayError::BadUpgrade("non-ASCII Upgrade header"));
    };

    let mut protocols = text.split(',').map(str::trim);
    let well_formed = {
        let mut any = false;
        let mut all = true;
        for protocol in protocols.by_ref() {
            any = true;
            if !is_protocol_token(protocol) {
                all = false;
            }
        }
        any && all
    };
    if !well_formed {
        return Err(RelayError::BadUpgrade("invalid Upgrade protocol token"));
    }

    req.upgraded = true;
    Ok(())
}

/// `protocol-name ["/" protocol-version]`, both RFC 7230 tokens.
fn is_protocol_token(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let mut parts = s.splitn(2, '/');
    let name = parts.next().unwrap_or("");
    let version = parts.next();
    is_token(name) && version.map(is_token).unwrap_or(true)
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}
