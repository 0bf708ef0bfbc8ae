//! Callback events and client phases.
//!
//! # Design
//! Consumers written against the string protocol (`"RESPONSE"`, `"ERROR"`,
//! `"TIMEOUT"` plus an optional payload) get it from [`Event::kind`] and
//! [`Event::payload`]; Rust callers match on the enum instead.

use crate::error::FetchError;

/// The single outcome delivered to a fetch callback.
#[derive(Debug)]
pub enum Event {
    /// 2xx response; the body text, possibly empty.
    Response(String),
    /// Any failure, including a non-2xx status.
    Error(FetchError),
    /// The configured timeout elapsed first.
    Timeout,
}

impl Event {
    pub const RESPONSE: &'static str = "RESPONSE";
    pub const ERROR: &'static str = "ERROR";
    pub const TIMEOUT: &'static str = "TIMEOUT";

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Response(_) => Self::RESPONSE,
            Event::Error(_) => Self::ERROR,
            Event::Timeout => Self::TIMEOUT,
        }
    }

    /// Body for responses, diagnostic text for errors, nothing for timeouts.
    pub fn payload(&self) -> Option<String> {
        match self {
            Event::Response(body) => Some(body.clone()),
            Event::Error(err) => Some(err.to_string()),
            Event::Timeout => None,
        }
    }
}

/// Phase of a client, advanced once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Connect,
    Connecting,
    Writing,
    Reading,
    Done,
    Dispose,
}

impl State {
    pub fn is_terminal(self) -> bool {
        self == State::Dispose
    }
}
