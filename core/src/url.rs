//! Splits a fetch URL into the pieces the connector and request writer need.
//!
//! Only the scheme prefix is interpreted: `http://` selects port 80 and
//! `https://` port 443. Anything else is read as a bare host. The port stays
//! textual because the connector resolves service names as well as numbers.

use crate::error::UrlError;

pub const HTTP_DEFAULT_PORT: &str = "80";
pub const HTTPS_DEFAULT_PORT: &str = "443";

pub const MAX_HOSTNAME_LEN: usize = 255;
pub const MAX_PORT_LEN: usize = 15;
pub const MAX_PATH_LEN: usize = 511;

/// Host, port and path of a request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub hostname: String,
    pub port: String,
    pub path: String,
}

/// Parse `url` into a [`ParsedUrl`].
///
/// Fails only when no usable hostname can be extracted. An oversized or
/// malformed port is ignored in favour of the scheme default, and the path
/// is cut to [`MAX_PATH_LEN`] bytes.
pub fn parse_url(url: &str) -> Result<ParsedUrl, UrlError> {
    let (rest, default_port) = if let Some(rest) = url.strip_prefix("http://") {
        (rest, HTTP_DEFAULT_PORT)
    } else if let Some(rest) = url.strip_prefix("https://") {
        (rest, HTTPS_DEFAULT_PORT)
    } else {
        (url, HTTP_DEFAULT_PORT)
    };

    let host_end = rest.find(|c: char| c == ':' || c == '/').unwrap_or(rest.len());
    let hostname = &rest[..host_end];
    if hostname.is_empty() {
        return Err(UrlError::EmptyHostname);
    }
    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(UrlError::HostnameTooLong(hostname.len()));
    }

    let mut port = default_port;
    let mut rest = &rest[host_end..];
    if let Some(after_colon) = rest.strip_prefix(':') {
        let port_end = after_colon.find('/').unwrap_or(after_colon.len());
        let candidate = &after_colon[..port_end];
        if is_port_token(candidate) {
            port = candidate;
        }
        rest = &after_colon[port_end..];
    }

    let path = if rest.starts_with('/') {
        truncate_at_boundary(rest, MAX_PATH_LEN)
    } else {
        "/"
    };

    Ok(ParsedUrl {
        hostname: hostname.to_string(),
        port: port.to_string(),
        path: path.to_string(),
    })
}

/// A port is either digits or a service name; both fit in 15 bytes.
fn is_port_token(s: &str) -> bool {
    (1..=MAX_PORT_LEN).contains(&s.len())
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
