//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! The scheduler is handed to C as an opaque pointer. Events cross the
//! boundary as a pair of borrowed C strings that live only for the duration
//! of the callback, so the C side never frees anything it receives.

use std::cell::{Cell, RefCell};
use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use tick_http_core::{Event, Scheduler, Spawner};

/// Opaque handle to a `Scheduler`. C callers receive a pointer to this and
/// pass it back into every FFI function.
///
/// Entry points only ever take shared references to the handle, because a
/// callback running inside `tick_http_scheduler_work` may call back in. The
/// scheduler itself sits behind a `RefCell`; while a pass holds it, new
/// requests go through `spawner` instead.
pub struct FfiScheduler {
    pub(crate) inner: RefCell<Scheduler>,
    pub(crate) spawner: Spawner,
    /// Live request count at the start of the current or last pass.
    pub(crate) live_at_pass: Cell<usize>,
}

impl FfiScheduler {
    pub(crate) fn new() -> Self {
        let scheduler = Scheduler::new();
        Self {
            spawner: scheduler.spawner(),
            inner: RefCell::new(scheduler),
            live_at_pass: Cell::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self.inner.try_borrow() {
            Ok(scheduler) => scheduler.len(),
            Err(_) => self.live_at_pass.get() + self.spawner.pending(),
        }
    }
}

/// Result code returned by entry points that can fail.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    NullArg = 1,
    InvalidUtf8 = 2,
    UrlTooLong = 3,
    Panic = 4,
    /// The call is not allowed from inside a callback.
    Busy = 5,
}

/// Completion callback. `event` is `"RESPONSE"`, `"ERROR"` or `"TIMEOUT"`;
/// `payload` is null for `"TIMEOUT"`. Both strings are valid only during the
/// call.
pub type FfiCallback =
    extern "C" fn(event: *const c_char, payload: *const c_char, user_data: *mut c_void);

/// An event rendered as C strings.
pub(crate) struct FfiEvent {
    kind: CString,
    payload: Option<CString>,
}

impl FfiEvent {
    pub(crate) fn from_core(event: &Event) -> Self {
        Self {
            kind: to_c_string(event.kind().to_string()),
            payload: event.payload().map(to_c_string),
        }
    }

    pub(crate) fn dispatch(&self, callback: FfiCallback, user_data: *mut c_void) {
        let payload = self
            .payload
            .as_ref()
            .map_or(std::ptr::null(), |p| p.as_ptr());
        callback(self.kind.as_ptr(), payload, user_data);
    }
}

/// C strings end at the first NUL, so anything after one is dropped.
fn to_c_string(s: String) -> CString {
    let mut bytes = s.into_bytes();
    if let Some(nul) = bytes.iter().position(|&b| b == 0) {
        bytes.truncate(nul);
    }
    CString::new(bytes).unwrap_or_default()
}
