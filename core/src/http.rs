//! HTTP/1.1 wire helpers: the fixed GET request and response-head scanning.
//!
//! # Design
//! The client never needs more than four facts from a response head: the
//! status code, `Content-Length`, whether the body is chunked, and whether the
//! server announced `Connection: close`. Header lookups are literal,
//! case-sensitive substring matches over the head block.

pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
pub const CHUNKED_TERMINATOR: &[u8] = b"0\r\n\r\n";

const ACCEPT: &str = "application/json, text/html, application/xml, */*";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Facts extracted from a response status line and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseHead {
    pub status_code: u16,
    /// Zero when absent or unparsable.
    pub content_len: usize,
    pub chunked: bool,
    pub connection_close: bool,
}

/// Serialize the GET request sent for every fetch.
pub fn build_get_request(host: &str, path: &str, user_agent: &str) -> Vec<u8> {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: {user_agent}\r\n\
         Accept: {ACCEPT}\r\n\
         Accept-Language: {ACCEPT_LANGUAGE}\r\n\
         Accept-Encoding: identity\r\n\
         Connection: close\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Offset just past the first `\r\n\r\n` at or after `from`.
pub fn find_header_end(buf: &[u8], from: usize) -> Option<usize> {
    find(buf, HEADER_TERMINATOR, from).map(|i| i + HEADER_TERMINATOR.len())
}

/// Offset just past the first `0\r\n\r\n` at or after `from`.
pub fn find_chunked_terminator(buf: &[u8], from: usize) -> Option<usize> {
    find(buf, CHUNKED_TERMINATOR, from).map(|i| i + CHUNKED_TERMINATOR.len())
}

/// Parse the head block (status line through the blank line).
///
/// Never fails: an unreadable status line yields status 0, which the
/// client reports as a non-2xx response.
pub fn parse_response_head(head: &[u8]) -> ResponseHead {
    let text = String::from_utf8_lossy(head);

    ResponseHead {
        status_code: parse_status_code(&text).unwrap_or(0),
        content_len: header_number(&text, "Content-Length:").unwrap_or(0),
        chunked: text.contains("Transfer-Encoding: chunked"),
        connection_close: text.contains("Connection: close"),
    }
}

/// `HTTP/1.<minor> <code> <reason>`
fn parse_status_code(text: &str) -> Option<u16> {
    let line = text.split("\r\n").next()?;
    let rest = line.strip_prefix("HTTP/1.")?;
    let (minor, rest) = rest.split_once(' ')?;
    if minor.is_empty() || !minor.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn header_number(text: &str, name: &str) -> Option<usize> {
    let start = text.find(name)? + name.len();
    let digits: String = text[start..]
        .trim_start_matches(|c: char| c == ' ' || c == '\t')
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn find(buf: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if buf.len() < needle.len() || from > buf.len() - needle.len() {
        return None;
    }
    buf[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
