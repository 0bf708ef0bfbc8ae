//! Tick-driven HTTP/1.1 GET client.
//!
//! # Design
//! `HttpClient` is a state machine advanced by the scheduler: every call to
//! [`Task::work`] performs at most one bounded step (parse, connect, poll the
//! connect, one send, or one receive) and returns. The client owns its
//! socket and buffers outright, so nothing is shared between clients and no
//! locking is involved.
//!
//! A response is complete when one of three conditions holds:
//! - `Content-Length` bytes of body have been buffered,
//! - the literal `0\r\n\r\n` terminator appears after the head (chunked),
//! - neither applies and the peer has closed the stream.
//!
//! The callback is an `FnOnce` taken out of the client the first time an
//! event is emitted, so it fires at most once by construction.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunked::decode_chunked;
use crate::config::{ClientConfig, READ_CHUNK_SIZE};
use crate::error::FetchError;
use crate::http::{
    build_get_request, find_chunked_terminator, find_header_end, parse_response_head,
    CHUNKED_TERMINATOR, HEADER_TERMINATOR,
};
use crate::scheduler::{Scheduler, Spawner, Task, TaskId, TaskStatus};
use crate::tcp::{ConnectStatus, ReadOutcome, TcpConnector, WriteOutcome};
use crate::types::{Event, State};
use crate::url::{parse_url, ParsedUrl};

type Callback = Box<dyn FnOnce(Event)>;

/// One in-flight GET request.
pub struct HttpClient {
    id: Uuid,
    url: String,
    state: State,
    config: ClientConfig,
    timer: Option<u64>,
    timeout_ms: u64,
    callback: Option<Callback>,

    target: Option<ParsedUrl>,
    connection: Option<TcpConnector>,

    write_buffer: Option<Vec<u8>>,
    write_offset: usize,

    read_buffer: Vec<u8>,
    header_scan_from: usize,
    chunk_scan_from: usize,
    /// Zero until the head has been parsed.
    body_start: usize,
    /// Zero means unknown.
    content_len: usize,
    chunked: bool,
    connection_close: bool,
    status_code: u16,
    body: Option<Vec<u8>>,
}

/// Start a GET of `url` on `scheduler` with the default configuration.
///
/// Only an oversized URL fails here; every other problem is reported to
/// `callback` as an `Event::Error`.
pub fn http_get(
    scheduler: &mut Scheduler,
    url: &str,
    timeout: Duration,
    callback: impl FnOnce(Event) + 'static,
) -> Result<TaskId, FetchError> {
    http_get_with_config(scheduler, url, timeout, callback, &ClientConfig::default())
}

pub fn http_get_with_config(
    scheduler: &mut Scheduler,
    url: &str,
    timeout: Duration,
    callback: impl FnOnce(Event) + 'static,
    config: &ClientConfig,
) -> Result<TaskId, FetchError> {
    let client = HttpClient::new(url, timeout, callback, config.clone())?;
    Ok(scheduler.spawn(Box::new(client)))
}

/// Queue a GET on `spawner`. Unlike [`http_get`] this needs no borrow of
/// the scheduler, so it can be called from inside another request's
/// callback. The request starts on the next pass.
pub fn http_get_queued(
    spawner: &Spawner,
    url: &str,
    timeout: Duration,
    callback: impl FnOnce(Event) + 'static,
    config: &ClientConfig,
) -> Result<(), FetchError> {
    let client = HttpClient::new(url, timeout, callback, config.clone())?;
    spawner.spawn(Box::new(client));
    Ok(())
}

impl HttpClient {
    pub fn new(
        url: &str,
        timeout: Duration,
        callback: impl FnOnce(Event) + 'static,
        config: ClientConfig,
    ) -> Result<Self, FetchError> {
        if url.len() > config.max_url_len {
            return Err(FetchError::UrlTooLong {
                len: url.len(),
                max: config.max_url_len,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            state: State::Init,
            config,
            timer: None,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            callback: Some(Box::new(callback)),
            target: None,
            connection: None,
            write_buffer: None,
            write_offset: 0,
            read_buffer: Vec::new(),
            header_scan_from: 0,
            chunk_scan_from: 0,
            body_start: 0,
            content_len: 0,
            chunked: false,
            connection_close: false,
            status_code: 0,
            body: None,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn work_init(&mut self) -> State {
        match parse_url(&self.url) {
            Ok(target) => {
                info!(
                    request = %self.id,
                    host = %target.hostname,
                    port = %target.port,
                    path = %target.path,
                    "starting request"
                );
                self.target = Some(target);
                State::Connect
            }
            Err(err) => self.fail(err.into()),
        }
    }

    fn work_connect(&mut self) -> State {
        let Some(target) = &self.target else {
            return self.fail(FetchError::NotConnected);
        };

        let mut connection = TcpConnector::new();
        match connection.connect(&target.hostname, &target.port) {
            Ok(()) => {
                self.connection = Some(connection);
                State::Connecting
            }
            Err(err) => self.fail(FetchError::Connect(err)),
        }
    }

    fn work_connecting(&mut self) -> State {
        let Some(connection) = &self.connection else {
            return self.fail(FetchError::NotConnected);
        };

        match connection.poll_connected() {
            ConnectStatus::Connected => State::Writing,
            ConnectStatus::Connecting => State::Connecting,
            ConnectStatus::Failed(err) => self.fail(FetchError::ConnectionFailed(err)),
        }
    }

    fn work_writing(&mut self) -> State {
        if self.write_buffer.is_none() {
            let Some(target) = &self.target else {
                return self.fail(FetchError::NotConnected);
            };
            let request = build_get_request(&target.hostname, &target.path, &self.config.user_agent);
            self.write_buffer = Some(request);
            self.write_offset = 0;
        }

        let pending = self.write_buffer.as_deref().unwrap_or_default();
        let write_size = pending.len();
        let result = match self.connection.as_mut() {
            Some(connection) => connection.write(&pending[self.write_offset..]),
            None => return self.fail(FetchError::NotConnected),
        };

        match result {
            Ok(WriteOutcome::Sent(n)) => {
                self.write_offset += n;
                debug!(request = %self.id, sent = n, offset = self.write_offset, total = write_size, "request bytes sent");
                if self.write_offset >= write_size {
                    self.write_buffer = None;
                    State::Reading
                } else {
                    State::Writing
                }
            }
            Ok(WriteOutcome::WouldBlock) => State::Writing,
            Err(err) => self.fail(FetchError::Send(err)),
        }
    }

    fn work_reading(&mut self) -> State {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let limit = self.config.effective_read_chunk();
        let outcome = match self.connection.as_mut() {
            Some(connection) => connection.read(&mut chunk[..limit]),
            None => return self.fail(FetchError::NotConnected),
        };

        match outcome {
            Ok(ReadOutcome::WouldBlock) => State::Reading,
            Ok(ReadOutcome::Closed) => {
                debug!(request = %self.id, buffered = self.read_buffer.len(), "peer closed");
                self.finish_at_eof()
            }
            Ok(ReadOutcome::Data(n)) => {
                debug!(request = %self.id, received = n, "response bytes received");
                if let Err(err) = self.absorb(&chunk[..n]) {
                    return self.fail(err);
                }
                self.check_complete()
            }
            Err(err) => self.fail(FetchError::Receive(err)),
        }
    }

    fn work_done(&mut self) -> State {
        let text = String::from_utf8_lossy(self.body.as_deref().unwrap_or_default()).into_owned();
        let event = if (200..300).contains(&self.status_code) {
            Event::Response(text)
        } else {
            Event::Error(FetchError::Status {
                code: self.status_code,
                body: text,
            })
        };
        self.emit(event);
        self.release();
        State::Dispose
    }

    /// Append received bytes and parse the head once it is complete.
    fn absorb(&mut self, data: &[u8]) -> Result<(), FetchError> {
        self.read_buffer.try_reserve(data.len())?;
        self.read_buffer.extend_from_slice(data);

        if self.body_start != 0 {
            return Ok(());
        }

        match find_header_end(&self.read_buffer, self.header_scan_from) {
            Some(end) => {
                let head = parse_response_head(&self.read_buffer[..end]);
                self.status_code = head.status_code;
                self.content_len = head.content_len;
                self.chunked = head.chunked;
                self.connection_close = head.connection_close;
                self.body_start = end;
                self.chunk_scan_from = end;
                debug!(
                    request = %self.id,
                    status = head.status_code,
                    content_length = head.content_len,
                    chunked = head.chunked,
                    connection_close = head.connection_close,
                    "response head parsed"
                );
            }
            None => {
                self.header_scan_from = self
                    .read_buffer
                    .len()
                    .saturating_sub(HEADER_TERMINATOR.len() - 1);
            }
        }
        Ok(())
    }

    fn check_complete(&mut self) -> State {
        if self.body_start == 0 {
            return State::Reading;
        }

        if self.content_len > 0 {
            // A length past the address space can only end at EOF.
            match self.body_start.checked_add(self.content_len) {
                Some(end) if self.read_buffer.len() >= end => {
                    let body = self.read_buffer[self.body_start..end].to_vec();
                    self.complete(body)
                }
                _ => State::Reading,
            }
        } else if self.chunked {
            match find_chunked_terminator(&self.read_buffer, self.chunk_scan_from) {
                Some(end) => self.decode_body(end),
                None => {
                    self.chunk_scan_from = self
                        .read_buffer
                        .len()
                        .saturating_sub(CHUNKED_TERMINATOR.len() - 1)
                        .max(self.body_start);
                    State::Reading
                }
            }
        } else {
            self.finish_if_drained()
        }
    }

    /// Without a length or chunking the body runs until the peer closes;
    /// a zero-byte peek says it already has.
    fn finish_if_drained(&mut self) -> State {
        let mut peek_buf = [0u8; 1];
        let outcome = match &self.connection {
            Some(connection) => connection.peek(&mut peek_buf),
            None => return self.fail(FetchError::NotConnected),
        };

        match outcome {
            Ok(ReadOutcome::Closed) => self.take_remaining_body(),
            Ok(ReadOutcome::WouldBlock) | Ok(ReadOutcome::Data(_)) => State::Reading,
            Err(err) => self.fail(FetchError::Peek(err)),
        }
    }

    fn finish_at_eof(&mut self) -> State {
        if self.body_start == 0 {
            return self.fail(FetchError::ClosedBeforeHeaders);
        }
        if self.chunked {
            let end = self.read_buffer.len();
            self.decode_body(end)
        } else {
            self.take_remaining_body()
        }
    }

    fn decode_body(&mut self, end: usize) -> State {
        match decode_chunked(&self.read_buffer[self.body_start..end]) {
            Ok(body) => {
                self.content_len = body.len();
                self.complete(body)
            }
            Err(err) => {
                warn!(request = %self.id, error = %err, "chunked body rejected");
                self.fail(FetchError::Chunked(err))
            }
        }
    }

    fn take_remaining_body(&mut self) -> State {
        let body = self.read_buffer[self.body_start..].to_vec();
        self.content_len = body.len();
        self.complete(body)
    }

    fn complete(&mut self, body: Vec<u8>) -> State {
        debug!(request = %self.id, status = self.status_code, body_len = body.len(), "response complete");
        self.body = Some(body);
        State::Done
    }

    fn fail(&mut self, err: FetchError) -> State {
        if err.is_transport() {
            warn!(request = %self.id, state = ?self.state, error = %err, "transport failed");
        } else {
            info!(request = %self.id, state = ?self.state, error = %err, "request rejected");
        }
        self.emit(Event::Error(err));
        State::Dispose
    }

    fn emit(&mut self, event: Event) {
        if let Some(callback) = self.callback.take() {
            info!(request = %self.id, event = event.kind(), "delivering event");
            callback(event);
        }
    }

    /// Drop buffers and close the socket.
    fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.disconnect();
        }
        self.write_buffer = None;
        self.read_buffer = Vec::new();
        self.body = None;
    }
}

impl Task for HttpClient {
    fn work(&mut self, now_ms: u64) -> TaskStatus {
        if self.state.is_terminal() {
            return TaskStatus::Finished;
        }

        match self.timer {
            None => self.timer = Some(now_ms),
            Some(start) if now_ms >= start.saturating_add(self.timeout_ms) => {
                warn!(request = %self.id, state = ?self.state, elapsed_ms = now_ms - start, "request timed out");
                self.emit(Event::Timeout);
                self.release();
                self.state = State::Dispose;
                return TaskStatus::Finished;
            }
            Some(_) => {}
        }

        let next = match self.state {
            State::Init => self.work_init(),
            State::Connect => self.work_connect(),
            State::Connecting => self.work_connecting(),
            State::Writing => self.work_writing(),
            State::Reading => self.work_reading(),
            State::Done => self.work_done(),
            State::Dispose => State::Dispose,
        };

        if next != self.state {
            debug!(request = %self.id, from = ?self.state, to = ?next, "state change");
        }
        self.state = next;

        if next.is_terminal() {
            self.release();
            TaskStatus::Finished
        } else {
            TaskStatus::Running
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state)
            .field("status_code", &self.status_code)
            .field("buffered", &self.read_buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_URL_LEN;
    use std::cell::RefCell;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::rc::Rc;
    use std::time::Instant;

    type Log = Rc<RefCell<Vec<(&'static str, Option<String>)>>>;

    fn recorder() -> (Log, impl FnOnce(Event) + 'static) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        (log, move |event: Event| {
            sink.borrow_mut().push((event.kind(), event.payload()))
        })
    }

    fn client_for(url: &str, timeout: Duration) -> (HttpClient, Log) {
        let (log, callback) = recorder();
        let client = HttpClient::new(url, timeout, callback, ClientConfig::default()).unwrap();
        (client, log)
    }

    /// Tick at a constant time until the client finishes.
    fn drive(client: &mut HttpClient) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while client.work(1) == TaskStatus::Running {
            assert!(Instant::now() < deadline, "stuck in {:?}", client.state());
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Serve one connection: read the request head, write `response`, close.
    fn serve_once(response: &'static [u8]) -> (u16, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 512];
            while find_header_end(&request, 0).is_none() {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "client closed before sending a request");
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response).unwrap();
            String::from_utf8(request).unwrap()
        });
        (port, handle)
    }

    #[test]
    fn oversized_url_is_rejected_synchronously() {
        let url = format!("http://example.com/{}", "a".repeat(MAX_URL_LEN));
        let (_log, callback) = recorder();
        let err = HttpClient::new(&url, Duration::from_secs(1), callback, ClientConfig::default())
            .unwrap_err();
        assert!(matches!(err, FetchError::UrlTooLong { max: 1024, .. }));
    }

    #[test]
    fn invalid_url_reports_error_without_network() {
        let (mut client, log) = client_for("http://", Duration::from_secs(1));
        assert_eq!(client.work(1), TaskStatus::Finished);
        assert_eq!(client.state(), State::Dispose);
        assert!(client.connection.is_none());
        assert_eq!(
            *log.borrow(),
            vec![("ERROR", Some("invalid URL: no hostname in URL".to_string()))]
        );
    }

    #[test]
    fn unresolvable_host_reports_connect_error() {
        let (mut client, log) = client_for("http://host.invalid/", Duration::from_secs(60));
        drive(&mut client);
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "ERROR");
        assert!(log[0].1.as_deref().unwrap().starts_with("failed to initiate connection"));
    }

    #[test]
    fn content_length_gates_completion() {
        let (mut client, _log) = client_for("http://example.com/", Duration::from_secs(1));

        client.absorb(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel").unwrap();
        assert_eq!(client.body_start, 38);
        assert_eq!(client.content_len, 5);
        assert_eq!(client.check_complete(), State::Reading);
        assert!(client.body.is_none());

        client.absorb(b"lo, and trailing junk").unwrap();
        assert_eq!(client.check_complete(), State::Done);
        assert_eq!(client.body.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn head_split_across_reads() {
        let (mut client, _log) = client_for("http://example.com/", Duration::from_secs(1));

        client.absorb(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r").unwrap();
        assert_eq!(client.body_start, 0);
        assert_eq!(client.check_complete(), State::Reading);

        client.absorb(b"\n\r").unwrap();
        assert_eq!(client.body_start, 0);

        client.absorb(b"\nOK").unwrap();
        assert_eq!(client.status_code, 200);
        assert_eq!(client.check_complete(), State::Done);
        assert_eq!(client.body.as_deref(), Some(&b"OK"[..]));
    }

    #[test]
    fn head_is_parsed_only_once() {
        let (mut client, _log) = client_for("http://example.com/", Duration::from_secs(1));
        client
            .absorb(b"HTTP/1.1 200 OK\r\nContent-Length: 40\r\n\r\n")
            .unwrap();
        let body_start = client.body_start;
        client
            .absorb(b"HTTP/1.1 500 Oops\r\nContent-Length: 1\r\n\r\n")
            .unwrap();
        assert_eq!(client.status_code, 200);
        assert_eq!(client.content_len, 40);
        assert_eq!(client.body_start, body_start);
    }

    #[test]
    fn chunked_waits_for_terminator() {
        let (mut client, _log) = client_for("http://example.com/", Duration::from_secs(1));

        client
            .absorb(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ntest\r\n")
            .unwrap();
        assert!(client.chunked);
        assert_eq!(client.check_complete(), State::Reading);

        client.absorb(b"0\r\n\r\n").unwrap();
        assert_eq!(client.check_complete(), State::Done);
        assert_eq!(client.body.as_deref(), Some(&b"test"[..]));
        assert_eq!(client.content_len, 4);
    }

    #[test]
    fn chunked_scan_resumes_near_previous_end() {
        let (mut client, _log) = client_for("http://example.com/", Duration::from_secs(1));
        client
            .absorb(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap();
        let body_start = client.body_start;
        assert_eq!(client.chunk_scan_from, body_start);

        client.absorb(b"4\r\ntest\r\n0\r").unwrap();
        assert_eq!(client.check_complete(), State::Reading);
        assert_eq!(client.chunk_scan_from, client.read_buffer.len() - 4);

        client.absorb(b"\n\r\n").unwrap();
        assert_eq!(client.check_complete(), State::Done);
        assert_eq!(client.body.as_deref(), Some(&b"test"[..]));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn huge_content_length_waits_for_eof() {
        let (mut client, log) = client_for("http://example.com/", Duration::from_secs(1));
        client
            .absorb(b"HTTP/1.1 200 OK\r\nContent-Length: 18446744073709551615\r\n\r\nab")
            .unwrap();
        assert_eq!(client.content_len, usize::MAX);
        assert_eq!(client.check_complete(), State::Reading);

        assert_eq!(client.finish_at_eof(), State::Done);
        assert_eq!(client.work_done(), State::Dispose);
        assert_eq!(*log.borrow(), vec![("RESPONSE", Some("ab".to_string()))]);
    }

    #[test]
    fn malformed_chunked_body_is_an_error() {
        let (mut client, log) = client_for("http://example.com/", Duration::from_secs(1));
        client
            .absorb(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\ntest\r\n0\r\n\r\n")
            .unwrap();
        assert_eq!(client.check_complete(), State::Dispose);
        assert_eq!(
            *log.borrow(),
            vec![("ERROR", Some("chunked decode failed".to_string()))]
        );
    }

    #[test]
    fn eof_before_head_is_an_error() {
        let (mut client, log) = client_for("http://example.com/", Duration::from_secs(1));
        client.absorb(b"HTTP/1.1 200 OK\r\n").unwrap();
        assert_eq!(client.finish_at_eof(), State::Dispose);
        assert_eq!(log.borrow()[0].0, "ERROR");
    }

    #[test]
    fn eof_decodes_chunked_body_without_final_crlf() {
        let (mut client, _log) = client_for("http://example.com/", Duration::from_secs(1));
        client
            .absorb(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ntest\r\n0\r\n")
            .unwrap();
        assert_eq!(client.check_complete(), State::Reading);
        assert_eq!(client.finish_at_eof(), State::Done);
        assert_eq!(client.body.as_deref(), Some(&b"test"[..]));
    }

    #[test]
    fn eof_keeps_whatever_body_arrived() {
        let (mut client, _log) = client_for("http://example.com/", Duration::from_secs(1));
        client
            .absorb(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort")
            .unwrap();
        assert_eq!(client.check_complete(), State::Reading);
        assert_eq!(client.finish_at_eof(), State::Done);
        assert_eq!(client.body.as_deref(), Some(&b"short"[..]));
        assert_eq!(client.content_len, 5);
    }

    #[test]
    fn done_maps_status_to_event() {
        let (mut client, log) = client_for("http://example.com/", Duration::from_secs(1));
        client
            .absorb(b"HTTP/1.1 404 Not Found\r\nContent-Length: 8\r\n\r\nnot here")
            .unwrap();
        assert_eq!(client.check_complete(), State::Done);
        assert_eq!(client.work_done(), State::Dispose);
        assert!(client.body.is_none());
        assert!(client.read_buffer.is_empty());
        assert_eq!(
            *log.borrow(),
            vec![("ERROR", Some("HTTP 404: not here".to_string()))]
        );
    }

    #[test]
    fn eof_terminated_body_over_a_socket() {
        let (port, server) = serve_once(b"HTTP/1.1 200 OK\r\nServer: test\r\n\r\nhello, world");
        let (mut client, log) = client_for(&format!("http://127.0.0.1:{port}/plain"), Duration::from_secs(60));

        drive(&mut client);

        assert_eq!(*log.borrow(), vec![("RESPONSE", Some("hello, world".to_string()))]);
        let request = server.join().unwrap();
        assert!(request.starts_with("GET /plain HTTP/1.1\r\nHost: 127.0.0.1\r\n"));
        assert!(request.contains("\r\nConnection: close\r\n"));
    }

    #[test]
    fn small_read_chunks_still_assemble_the_body() {
        let (port, _server) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world");
        let (log, callback) = recorder();
        let config = ClientConfig {
            read_chunk_size: 3,
            ..ClientConfig::default()
        };
        let mut client = HttpClient::new(
            &format!("http://127.0.0.1:{port}/"),
            Duration::from_secs(60),
            callback,
            config,
        )
        .unwrap();

        drive(&mut client);

        assert_eq!(*log.borrow(), vec![("RESPONSE", Some("hello world".to_string()))]);
    }

    #[test]
    fn timeout_fires_once_in_any_state() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut client, log) = client_for(&format!("http://127.0.0.1:{port}/"), Duration::from_millis(500));

        // First tick starts the clock; keep time frozen until reading.
        let deadline = Instant::now() + Duration::from_secs(5);
        while client.state() != State::Reading {
            assert_eq!(client.work(1_000), TaskStatus::Running);
            assert!(Instant::now() < deadline, "stuck in {:?}", client.state());
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(client.work(1_499), TaskStatus::Running);
        assert!(log.borrow().is_empty());

        assert_eq!(client.work(1_500), TaskStatus::Finished);
        assert_eq!(client.state(), State::Dispose);
        assert!(client.connection.is_none());
        assert_eq!(client.work(9_999), TaskStatus::Finished);
        assert_eq!(*log.borrow(), vec![("TIMEOUT", None)]);
    }

    #[test]
    fn timeout_preempts_init() {
        let (mut client, log) = client_for("http://", Duration::ZERO);
        // The first tick only records the start time before running INIT.
        assert_eq!(client.work(7), TaskStatus::Finished);
        assert_eq!(log.borrow()[0].0, "ERROR");

        let (mut client, log) = client_for("http://127.0.0.1:9/", Duration::from_millis(10));
        client.timer = Some(7);
        assert_eq!(client.work(17), TaskStatus::Finished);
        assert_eq!(client.state(), State::Dispose);
        assert_eq!(*log.borrow(), vec![("TIMEOUT", None)]);
    }

    #[test]
    fn http_get_registers_with_scheduler() {
        let mut sched = Scheduler::new();
        let (log, callback) = recorder();
        let id = http_get(&mut sched, "http://", Duration::from_secs(1), callback).unwrap();
        assert!(sched.contains(id));
        sched.work(1);
        assert!(sched.is_empty());
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn callback_can_queue_a_follow_up_request() {
        let mut sched = Scheduler::new();
        let spawner = sched.spawner();
        let (log, record) = recorder();
        let first_log = Rc::clone(&log);

        http_get(&mut sched, "http://", Duration::from_secs(1), move |event: Event| {
            first_log.borrow_mut().push((event.kind(), event.payload()));
            http_get_queued(&spawner, "https://", Duration::from_secs(1), record, &ClientConfig::default())
                .unwrap();
        })
        .unwrap();

        sched.work(1);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(sched.len(), 1);

        sched.work(2);
        assert!(sched.is_empty());
        assert_eq!(log.borrow().len(), 2);
        assert!(log.borrow().iter().all(|(kind, _)| *kind == "ERROR"));
    }
}
