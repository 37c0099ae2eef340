//! Minimal HTTP/1.1 request parsing and response writing.
//!
//! One request per connection: the head is parsed with `httparse` as bytes
//! arrive, the body is read by `Content-Length`, and the response closes the
//! connection.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Largest request head accepted, in bytes.
pub(crate) const MAX_HEAD_BYTES: usize = 16 * 1024;

const MAX_HEADERS: usize = 64;

/// Response status codes the transport emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Ok,
    Accepted,
    BadRequest,
    NotFound,
    RequestTimeout,
    PayloadTooLarge,
    InternalServerError,
    ServiceUnavailable,
}

impl Status {
    pub(crate) const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Accepted => 202,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::RequestTimeout => 408,
            Self::PayloadTooLarge => 413,
            Self::InternalServerError => 500,
            Self::ServiceUnavailable => 503,
        }
    }

    const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Accepted => "Accepted",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::RequestTimeout => "Request Timeout",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable => "Service Unavailable",
        }
    }
}

#[derive(Debug)]
pub(crate) struct Response {
    status: Status,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    pub(crate) const fn new(status: Status, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub(crate) fn plain(status: Status, body: impl Into<String>) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body.into().into_bytes())
    }

    pub(crate) const fn status(&self) -> Status {
        self.status
    }

    #[cfg(test)]
    pub(crate) const fn body(&self) -> &[u8] {
        self.body.as_slice()
    }

    pub(crate) fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status.code(),
            self.status.reason(),
            self.content_type,
            self.body.len()
        );
        writer.write_all(head.as_bytes())?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}

/// Parsed request line and headers.
#[derive(Debug)]
pub(crate) struct RequestHead {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parses a request head from the start of `bytes`.
    ///
    /// Returns the head and its length in bytes, blank line included, or
    /// `None` while the head is still incomplete.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Option<(Self, usize)>, httparse::Error> {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut request = httparse::Request::new(&mut slots);
        let httparse::Status::Complete(length) = request.parse(bytes)? else {
            return Ok(None);
        };
        let headers = request
            .headers
            .iter()
            .map(|header| {
                (
                    header.name.to_owned(),
                    String::from_utf8_lossy(header.value).trim().to_owned(),
                )
            })
            .collect();
        // A complete parse always carries both.
        let (Some(method), Some(target)) = (request.method, request.path) else {
            return Err(httparse::Error::Token);
        };
        Ok(Some((
            Self {
                method: method.to_owned(),
                target: target.to_owned(),
                headers,
            },
            length,
        )))
    }

    pub(crate) const fn method(&self) -> &str {
        self.method.as_str()
    }

    pub(crate) const fn target(&self) -> &str {
        self.target.as_str()
    }

    /// First header named `name`, compared case-insensitively.
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    }

    pub(crate) fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    }

    /// Declared body length; zero when absent, `None` when malformed.
    pub(crate) fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .map_or(Some(0), |value| value.parse().ok())
    }
}

/// Outcome of reading a request head.
#[derive(Debug)]
pub(crate) enum HeadRead {
    /// The parsed head, the raw bytes it was parsed from, and any bytes read
    /// past it.
    Complete {
        head: RequestHead,
        raw: Vec<u8>,
        leftover: Vec<u8>,
    },
    /// The peer closed, or shutdown was requested, before a full head.
    Closed,
    /// No complete head arrived before the deadline.
    Expired,
    TooLarge,
    Malformed(httparse::Error),
}

/// Reads until a complete request head has arrived.
///
/// Read timeouts are retried until `should_stop` returns `true` or
/// `deadline` has passed since `started`.
pub(crate) fn read_head(
    stream: &mut impl Read,
    started: Instant,
    deadline: Duration,
    should_stop: &impl Fn() -> bool,
) -> io::Result<HeadRead> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    let expired = || started.elapsed() >= deadline;
    let give_up = || should_stop() || expired();
    loop {
        match RequestHead::parse(&buffer) {
            Ok(Some((head, length))) => {
                let leftover = buffer.split_off(length);
                return Ok(HeadRead::Complete {
                    head,
                    raw: buffer,
                    leftover,
                });
            }
            Ok(None) => {}
            Err(error) => return Ok(HeadRead::Malformed(error)),
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Ok(HeadRead::TooLarge);
        }
        if expired() {
            return Ok(HeadRead::Expired);
        }
        match read_some(stream, &mut chunk, &give_up)? {
            Some(0) => return Ok(HeadRead::Closed),
            None if expired() => return Ok(HeadRead::Expired),
            None => return Ok(HeadRead::Closed),
            Some(read) => buffer.extend(chunk.iter().take(read)),
        }
    }
}

/// Reads exactly `length` body bytes, starting with `leftover`.
///
/// Returns `None` when the peer closes or shutdown is requested first.
pub(crate) fn read_body(
    stream: &mut impl Read,
    mut leftover: Vec<u8>,
    length: usize,
    should_stop: &impl Fn() -> bool,
) -> io::Result<Option<Vec<u8>>> {
    leftover.truncate(length);
    let mut body = leftover;
    let mut chunk = [0_u8; 4096];
    while body.len() < length {
        let wanted = length.saturating_sub(body.len()).min(chunk.len());
        let window = chunk.get_mut(..wanted).unwrap_or_default();
        match read_some(stream, window, should_stop)? {
            Some(0) | None => return Ok(None),
            Some(read) => body.extend(window.iter().take(read)),
        }
    }
    Ok(Some(body))
}

fn read_some(
    stream: &mut impl Read,
    buffer: &mut [u8],
    should_stop: &impl Fn() -> bool,
) -> io::Result<Option<usize>> {
    loop {
        match stream.read(buffer) {
            Ok(read) => return Ok(Some(read)),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                if should_stop() {
                    return Ok(None);
                }
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    const PATIENT: Duration = Duration::from_secs(60);

    const fn never() -> bool {
        false
    }

    fn read(bytes: &[u8]) -> HeadRead {
        let mut stream = Cursor::new(bytes.to_vec());
        read_head(&mut stream, Instant::now(), PATIENT, &never).expect("read succeeds")
    }

    /// Yields one byte per read, failing reads with `WouldBlock` in between,
    /// like a socket with a read timeout fed by a slow client.
    struct Trickle {
        bytes: Vec<u8>,
        position: usize,
        ready: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
            self.ready = !self.ready;
            if !self.ready {
                std::thread::sleep(Duration::from_millis(5));
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let Some(byte) = self.bytes.get(self.position) else {
                std::thread::sleep(Duration::from_millis(5));
                return Err(io::ErrorKind::WouldBlock.into());
            };
            let Some(slot) = buffer.first_mut() else {
                return Ok(0);
            };
            *slot = *byte;
            self.position += 1;
            Ok(1)
        }
    }

    #[test]
    fn head_and_leftover_are_split_after_the_blank_line() {
        let mut stream = Cursor::new(
            b"POST /queue HTTP/1.1\r\nContent-Length: 7\r\nAccept: application/json\r\n\r\nkey: 1\n".to_vec(),
        );

        let HeadRead::Complete { head, raw, leftover } =
            read_head(&mut stream, Instant::now(), PATIENT, &never).expect("read succeeds")
        else {
            panic!("head should be complete");
        };

        assert_eq!(head.method(), "POST");
        assert_eq!(head.target(), "/queue");
        assert_eq!(head.header("ACCEPT"), Some("application/json"));
        assert_eq!(head.content_length(), Some(7));
        assert!(raw.ends_with(b"\r\n\r\n"));
        let body = read_body(&mut stream, leftover, 7, &never).expect("read succeeds");
        assert_eq!(body.as_deref(), Some(b"key: 1\n".as_slice()));
    }

    #[test]
    fn truncated_bodies_report_closure() {
        let mut stream = Cursor::new(b"abc".to_vec());
        let body = read_body(&mut stream, Vec::new(), 10, &never).expect("read succeeds");
        assert!(body.is_none());
    }

    #[test]
    fn oversized_heads_are_rejected() {
        let mut request = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        request.extend(std::iter::repeat_n(b'a', MAX_HEAD_BYTES + 10));

        assert!(matches!(read(&request), HeadRead::TooLarge));
    }

    #[test]
    fn heads_cut_short_report_closure() {
        assert!(matches!(read(b"GET / HTTP/1.1\r\nHost: x\r\n"), HeadRead::Closed));
    }

    #[rstest]
    #[case(b"GET /\r\n\r\n".as_slice())]
    #[case(b"GET / FTP/1.0\r\n\r\n".as_slice())]
    #[case(b"GET / HTTP/1.1\r\nno-colon-here\r\n\r\n".as_slice())]
    #[case(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n".as_slice())]
    fn malformed_heads_are_reported(#[case] bytes: &[u8]) {
        assert!(matches!(read(bytes), HeadRead::Malformed(_)));
    }

    #[test]
    fn a_slow_head_expires_at_the_deadline() {
        let mut bytes = b"GET / HTTP/1.1\r\nX-Slow: ".to_vec();
        bytes.extend(std::iter::repeat_n(b'a', 4096));
        let mut stream = Trickle {
            bytes,
            position: 0,
            ready: false,
        };
        let started = Instant::now();

        let outcome = read_head(&mut stream, started, Duration::from_millis(60), &never)
            .expect("read succeeds");

        assert!(matches!(outcome, HeadRead::Expired));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn a_silent_peer_expires_at_the_deadline() {
        let mut stream = Trickle {
            bytes: Vec::new(),
            position: 0,
            ready: false,
        };

        let outcome = read_head(&mut stream, Instant::now(), Duration::from_millis(30), &never)
            .expect("read succeeds");

        assert!(matches!(outcome, HeadRead::Expired));
    }

    #[test]
    fn websocket_upgrades_are_detected() {
        let HeadRead::Complete { head, .. } = read(
            b"GET / HTTP/1.1\r\nUpgrade: WebSocket\r\nSec-WebSocket-Key: abc\r\nContent-Length: x\r\n\r\n",
        ) else {
            panic!("head should be complete");
        };
        assert!(head.is_websocket_upgrade());
        assert_eq!(head.content_length(), None);
    }

    #[test]
    fn responses_close_the_connection() {
        let mut written = Vec::new();
        Response::plain(Status::NotFound, "not found\n")
            .write_to(&mut written)
            .expect("write succeeds");
        let text = String::from_utf8(written).expect("utf8");

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nnot found\n"));
    }
}
