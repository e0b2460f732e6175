//! Opening handshake.
//!
//! The header-level functions ([`validate_request`], [`response_headers`],
//! [`request_headers`], [`validate_response`]) only deal with name/value pairs and
//! can be plugged into any HTTP stack. [`accept`] and [`connect`] drive the whole
//! exchange directly over a raw stream.

use std::io::{Read, Write};

use base64::engine::general_purpose;
use base64::Engine;
use http::StatusCode;
use httparse::{Request, Response, Status};
use log::{debug, warn};
use rand::RngCore;
use sha1::{Digest, Sha1};
use url::{ParseError, Url};

use crate::buffer::ScratchBuffer;
use crate::ws::error::Rejection;
use crate::ws::protocol::{WS_GUID, WS_VERSION};
use crate::ws::Error;

const MAX_HEAD_LENGTH: usize = 8192;
const MAX_HEADERS: usize = 64;
const HEAD_DELIMITER: &[u8] = b"\r\n\r\n";
const SINGLE_VALUE: &str = "a single value";

/// `Sec-WebSocket-Accept` value for the given `Sec-WebSocket-Key`.
pub fn compute_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

/// Fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_key<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut nonce = [0u8; 16];
    rng.fill_bytes(&mut nonce);
    general_purpose::STANDARD.encode(nonce)
}

/// Checks the upgrade request headers and returns the `Sec-WebSocket-Accept` value
/// to answer with. Header names are matched case-insensitively.
pub fn validate_request(headers: &[(&str, &str)]) -> Result<String, Rejection> {
    ensure_token(headers, "Upgrade", "websocket")?;
    ensure_token(headers, "Connection", "Upgrade")?;

    match find_header(headers, "Sec-WebSocket-Version", WS_VERSION)? {
        None => return Err(Rejection::MissingHeader("Sec-WebSocket-Version")),
        Some(version) if version.trim() != WS_VERSION => {
            return Err(Rejection::InvalidHeader {
                header: "Sec-WebSocket-Version",
                expected: WS_VERSION,
            });
        }
        Some(_) => {}
    }

    match find_header(headers, "Sec-WebSocket-Key", SINGLE_VALUE)?.map(str::trim) {
        None | Some("") => Err(Rejection::MissingHeader("Sec-WebSocket-Key")),
        Some(key) => Ok(compute_accept(key)),
    }
}

/// Headers to send along with the `101 Switching Protocols` status.
pub fn response_headers(accept: &str) -> [(&'static str, String); 3] {
    [
        ("Upgrade", "websocket".to_owned()),
        ("Connection", "Upgrade".to_owned()),
        ("Sec-WebSocket-Accept", accept.to_owned()),
    ]
}

/// Headers a client must put on its upgrade request.
pub fn request_headers(host: &str, key: &str) -> [(&'static str, String); 5] {
    [
        ("Host", host.to_owned()),
        ("Upgrade", "websocket".to_owned()),
        ("Connection", "Upgrade".to_owned()),
        ("Sec-WebSocket-Key", key.to_owned()),
        ("Sec-WebSocket-Version", WS_VERSION.to_owned()),
    ]
}

/// Checks the server answer to an upgrade request sent with `key`.
pub fn validate_response(status: u16, headers: &[(&str, &str)], key: &str) -> Result<(), Rejection> {
    if status != StatusCode::SWITCHING_PROTOCOLS.as_u16() {
        return Err(Rejection::Status(status));
    }
    ensure_token(headers, "Upgrade", "websocket")?;
    ensure_token(headers, "Connection", "Upgrade")?;

    match find_header(headers, "Sec-WebSocket-Accept", SINGLE_VALUE)? {
        None => Err(Rejection::MissingHeader("Sec-WebSocket-Accept")),
        Some(accept) if accept.trim() == compute_accept(key) => Ok(()),
        Some(_) => Err(Rejection::AcceptMismatch),
    }
}

/// Server side of the handshake over a raw stream. Reads the request head, answers
/// with `101` (or `400` if the request is refused) and returns the request target.
///
/// Nothing past the end of the request head is consumed, so frames the client sends
/// right after its request stay in the stream.
#[cold]
pub fn accept<S: Read + Write + ?Sized>(stream: &mut S) -> Result<String, Error> {
    let mut buf = ScratchBuffer::with_capacity(1024);
    buf.read_until(stream, HEAD_DELIMITER, MAX_HEAD_LENGTH)?;

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = Request::new(&mut headers);
    let parsed = request
        .parse(buf.view())
        .map_err(|err| Rejection::Malformed(err.to_string()))
        .and_then(|status| match status {
            Status::Complete(_) => Ok(()),
            Status::Partial => Err(Rejection::Malformed("incomplete request head".to_owned())),
        })
        .and_then(|_| match request.method {
            Some("GET") => Ok(()),
            method => Err(Rejection::Malformed(format!("unexpected method {method:?}"))),
        })
        .and_then(|_| collect_headers(&*request.headers))
        .and_then(|headers| validate_request(&headers));

    match parsed {
        Ok(accept) => {
            write_head(stream, StatusCode::SWITCHING_PROTOCOLS, &response_headers(&accept))?;
            let path = request.path.unwrap_or("/").to_owned();
            debug!("websocket handshake accepted for {path}");
            Ok(path)
        }
        Err(rejection) => {
            warn!("rejecting websocket handshake: {rejection}");
            write_head(stream, StatusCode::BAD_REQUEST, &[("Connection", "close".to_owned())])?;
            Err(rejection.into())
        }
    }
}

/// Client side of the handshake over a raw stream, upgrading to `url` (`ws` or `wss`
/// scheme). Transport security, if any, is the stream's business.
#[cold]
pub fn connect<S, R>(stream: &mut S, url: &str, rng: &mut R) -> Result<(), Error>
where
    S: Read + Write + ?Sized,
    R: RngCore + ?Sized,
{
    let (host, endpoint) = parse_url(url)?;
    let key = generate_key(rng);

    let mut head = format!("GET {endpoint} HTTP/1.1\r\n");
    for (name, value) in request_headers(&host, &key) {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())?;
    stream.flush()?;

    let mut buf = ScratchBuffer::with_capacity(1024);
    buf.read_until(stream, HEAD_DELIMITER, MAX_HEAD_LENGTH)?;

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = Response::new(&mut headers);
    match response.parse(buf.view()) {
        Ok(Status::Complete(_)) => {}
        Ok(Status::Partial) => return Err(Rejection::Malformed("incomplete response head".to_owned()).into()),
        Err(err) => return Err(Rejection::Malformed(err.to_string()).into()),
    }
    let status = response.code.unwrap_or_default();
    let headers = collect_headers(&*response.headers)?;
    validate_response(status, &headers, &key)?;

    debug!("websocket handshake completed with {host}{endpoint}");
    Ok(())
}

/// Returns the `Host` header value and the request target (path and query).
fn parse_url(url: &str) -> Result<(String, String), Error> {
    let url = Url::parse(url)?;
    match url.scheme() {
        "ws" | "wss" => {}
        scheme => Err(std::io::Error::other(format!("unrecognised url scheme: {scheme}")))?,
    }
    let host = url.host_str().ok_or(ParseError::EmptyHost)?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let endpoint = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    Ok((host, endpoint))
}

fn write_head<S: Write + ?Sized>(stream: &mut S, status: StatusCode, headers: &[(&str, String)]) -> Result<(), Error> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    );
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())?;
    stream.flush()?;
    Ok(())
}

fn collect_headers<'a>(headers: &[httparse::Header<'a>]) -> Result<Vec<(&'a str, &'a str)>, Rejection> {
    headers
        .iter()
        .map(|header| match std::str::from_utf8(header.value) {
            Ok(value) => Ok((header.name, value)),
            Err(_) => Err(Rejection::Malformed(format!("non utf-8 value for header '{}'", header.name))),
        })
        .collect()
}

/// Value of a header that may appear at most once. A repeated header is refused
/// as `expected` since its values can not be told apart.
fn find_header<'a>(
    headers: &[(&str, &'a str)],
    name: &'static str,
    expected: &'static str,
) -> Result<Option<&'a str>, Rejection> {
    let mut values = headers.iter().filter(|(header, _)| header.eq_ignore_ascii_case(name));
    match (values.next(), values.next()) {
        (Some((_, value)), None) => Ok(Some(*value)),
        (None, _) => Ok(None),
        (Some(_), Some(_)) => Err(Rejection::InvalidHeader { header: name, expected }),
    }
}

/// Header must be present and list `token` among its comma separated values.
fn ensure_token(headers: &[(&str, &str)], header: &'static str, token: &'static str) -> Result<(), Rejection> {
    let mut found = false;
    for (_, value) in headers.iter().filter(|(name, _)| name.eq_ignore_ascii_case(header)) {
        found = true;
        if value.split(',').any(|candidate| candidate.trim().eq_ignore_ascii_case(token)) {
            return Ok(());
        }
    }
    if found {
        Err(Rejection::InvalidHeader {
            header,
            expected: token,
        })
    } else {
        Err(Rejection::MissingHeader(header))
    }
}
