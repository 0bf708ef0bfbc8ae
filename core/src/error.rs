//! Error types for the tick-driven HTTP client.
//!
//! # Design
//! Every failure a client can hit is terminal, so `FetchError` is a flat list
//! of outcomes rather than a layered hierarchy. Its `Display` text is exactly
//! what an `"ERROR"` callback receives as payload; `Status` renders as
//! `HTTP <code>: <body>` so consumers that only see strings can still tell a
//! remote error status apart from a transport failure.

use std::collections::TryReserveError;
use std::io;

use crate::chunked::ChunkedError;

/// Reasons a URL cannot be split into host, port and path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    /// Nothing between the scheme and the first `:` or `/`.
    #[error("no hostname in URL")]
    EmptyHostname,

    /// The hostname is longer than a DNS name can be.
    #[error("hostname is {0} bytes, maximum is 255")]
    HostnameTooLong(usize),
}

/// Errors reported by a fetch, either synchronously from `http_get` or
/// through the `"ERROR"` callback event.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Rejected before a client was created.
    #[error("URL is {len} bytes, maximum is {max}")]
    UrlTooLong { len: usize, max: usize },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    /// A response or request buffer could not grow.
    #[error("memory allocation failed")]
    Allocation(#[from] TryReserveError),

    /// Resolution failed or no candidate address accepted a connect.
    #[error("failed to initiate connection: {0}")]
    Connect(#[source] io::Error),

    /// The socket reported an error while the connect was completing.
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] io::Error),

    /// A state that needs the socket ran without one.
    #[error("connection not established")]
    NotConnected,

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("read failed: {0}")]
    Receive(#[source] io::Error),

    #[error("peek failed: {0}")]
    Peek(#[source] io::Error),

    /// The peer closed the stream before a complete header block arrived.
    #[error("connection closed before response headers")]
    ClosedBeforeHeaders,

    #[error("chunked decode failed")]
    Chunked(#[source] ChunkedError),

    /// The transfer succeeded but the status is outside `200..300`.
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
}

impl FetchError {
    /// True for failures that happened on the wire rather than in the
    /// caller's input or the server's status.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FetchError::Connect(_)
                | FetchError::ConnectionFailed(_)
                | FetchError::NotConnected
                | FetchError::Send(_)
                | FetchError::Receive(_)
                | FetchError::Peek(_)
                | FetchError::ClosedBeforeHeaders
        )
    }
}
