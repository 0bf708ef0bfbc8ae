//! Non-blocking HTTP/1.1 GET client driven by an external tick.
//!
//! # Overview
//! Nothing in this crate blocks or spawns threads. A host owns a
//! [`Scheduler`], registers requests with [`http_get`], and calls
//! [`Scheduler::work`] from its own loop with a monotonic millisecond clock.
//! Each request advances at most one step per tick and eventually invokes its
//! callback exactly once with a RESPONSE, ERROR or TIMEOUT event.
//!
//! # Design
//! - `url`, `chunked` and `http` are pure functions over bytes and strings.
//! - `tcp` wraps a non-blocking `mio` stream and reports would-block as a
//!   value rather than an error.
//! - `client` owns one request's socket and buffers; the scheduler owns the
//!   clients and drops each one as soon as it reports `Finished`.
//! - Log events go through `tracing`; each client tags them with a request id.

pub mod chunked;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod scheduler;
pub mod tcp;
pub mod types;
pub mod url;

pub use chunked::{decode_chunked, ChunkedError};
pub use client::{http_get, http_get_queued, http_get_with_config, HttpClient};
pub use config::ClientConfig;
pub use error::{FetchError, UrlError};
pub use scheduler::{monotonic_ms, Scheduler, Spawner, Task, TaskId, TaskStatus};
pub use types::{Event, State};
pub use url::{parse_url, ParsedUrl};
