//! One non-blocking TCP stream, driven by polling instead of readiness events.
//!
//! # Design
//! `mio::net::TcpStream::connect` starts the handshake and returns at once;
//! completion is detected on later ticks by checking the pending socket error
//! and whether the peer address is known yet. Reads, writes and peeks each
//! make a single attempt and report would-block as a value, never as an
//! error, so the state machine can tell "try again next tick" apart from
//! "the stream ended" and from a hard failure.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use dns_lookup::{AddrInfoHints, SockType};
use mio::net::TcpStream;

/// Result of polling a connect that is in flight.
#[derive(Debug)]
pub enum ConnectStatus {
    Connected,
    Connecting,
    Failed(io::Error),
}

/// Result of one non-blocking receive (or peek).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were placed in the buffer.
    Data(usize),
    /// Nothing available yet.
    WouldBlock,
    /// The peer closed its side; no more bytes will arrive.
    Closed,
}

/// Result of one non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent(usize),
    WouldBlock,
}

/// Owner of at most one non-blocking stream socket.
#[derive(Debug, Default)]
pub struct TcpConnector {
    stream: Option<TcpStream>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self { stream: None }
    }

    /// True from a successful `connect` until `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Resolve `host`/`port` and start a non-blocking connect to the first
    /// candidate address that accepts one.
    ///
    /// Resolution itself goes through the system resolver and may block.
    pub fn connect(&mut self, host: &str, port: &str) -> io::Result<()> {
        if self.stream.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "connector already owns a socket",
            ));
        }

        let candidates = resolve(host, port)?;
        tracing::debug!(host, port, candidates = candidates.len(), "resolved");

        let mut last_err = None;
        for addr in candidates {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    tracing::debug!(%addr, "connect initiated");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(%addr, error = %err, "connect attempt failed, trying next address");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {host}"))
        }))
    }

    /// Check whether the connect started by [`connect`](Self::connect) has
    /// completed.
    pub fn poll_connected(&self) -> ConnectStatus {
        let Some(stream) = &self.stream else {
            return ConnectStatus::Failed(io::Error::from(io::ErrorKind::NotConnected));
        };

        match stream.take_error() {
            Ok(Some(err)) | Err(err) => return ConnectStatus::Failed(err),
            Ok(None) => {}
        }

        match stream.peer_addr() {
            Ok(_) => ConnectStatus::Connected,
            Err(err) if is_in_progress(&err) => ConnectStatus::Connecting,
            Err(err) => ConnectStatus::Failed(err),
        }
    }

    /// One send attempt.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<WriteOutcome> {
        let stream = self.stream_mut()?;
        match stream.write(buf) {
            Ok(n) => Ok(WriteOutcome::Sent(n)),
            Err(err) if is_retryable(&err) => Ok(WriteOutcome::WouldBlock),
            Err(err) => Err(err),
        }
    }

    /// One receive attempt into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        let stream = self.stream_mut()?;
        classify_read(stream.read(buf))
    }

    /// Look at pending bytes without consuming them.
    pub fn peek(&self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        classify_read(stream.peek(buf))
    }

    /// Close the socket if one is open. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("socket closed");
        }
    }

    fn stream_mut(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

fn classify_read(result: io::Result<usize>) -> io::Result<ReadOutcome> {
    match result {
        Ok(0) => Ok(ReadOutcome::Closed),
        Ok(n) => Ok(ReadOutcome::Data(n)),
        Err(err) if is_retryable(&err) => Ok(ReadOutcome::WouldBlock),
        Err(err) => Err(err),
    }
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// `peer_addr` on a socket whose handshake is still running reports
/// `ENOTCONN`.
fn is_in_progress(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::WouldBlock
    )
}

/// Look up `host` and `port` with the system resolver. The port may be a
/// number or any service name known to the services database.
fn resolve(host: &str, port: &str) -> io::Result<Vec<SocketAddr>> {
    let hints = AddrInfoHints {
        socktype: SockType::Stream.into(),
        ..AddrInfoHints::default()
    };
    dns_lookup::getaddrinfo(Some(host), Some(port), Some(hints))
        .map_err(io::Error::from)?
        .map(|info| info.map(|info| info.sockaddr))
        .collect()
}
