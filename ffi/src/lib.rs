//! C-ABI wrapper around `tick-http-core`.
//!
//! # Overview
//! A C host creates a scheduler, registers GET requests on it, and calls
//! `tick_http_scheduler_work` from its own event loop. Each request reports
//! back exactly once through an `extern "C"` callback.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - The scheduler and its clients are single-threaded; a handle must only be
//!   used from the thread that created it.
//! - A callback may call `tick_http_get` on its own handle. The request is
//!   queued and starts on the next `tick_http_scheduler_work`. Calling
//!   `tick_http_scheduler_work` from a callback returns `Busy`, and
//!   `tick_http_scheduler_free` from a callback is ignored.
//! - Strings passed to the callback are borrowed for the duration of the call
//!   and freed by Rust afterwards.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tick_http_core::{http_get, http_get_queued, monotonic_ms, ClientConfig, Event, FetchError};

use types::*;

// ---------------------------------------------------------------------------
// Scheduler lifecycle
// ---------------------------------------------------------------------------

/// Create an empty scheduler.
///
/// Returns null if an internal panic occurs. The caller must free the
/// returned pointer with `tick_http_scheduler_free`.
#[unsafe(no_mangle)]
pub extern "C" fn tick_http_scheduler_new() -> *mut FfiScheduler {
    catch_unwind(|| {
        Box::into_raw(Box::new(FfiScheduler::new()))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a scheduler and every request still registered on it. Pending
/// callbacks are dropped without being invoked. Safe to call with null.
///
/// Ignored when called from inside one of the scheduler's own callbacks;
/// free it after `tick_http_scheduler_work` returns instead.
#[unsafe(no_mangle)]
pub extern "C" fn tick_http_scheduler_free(scheduler: *mut FfiScheduler) {
    if !scheduler.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            if unsafe { &*scheduler }.inner.try_borrow_mut().is_err() {
                tracing::warn!("scheduler freed from inside its own callback; ignored");
                return;
            }
            drop(unsafe { Box::from_raw(scheduler) });
        }));
    }
}

/// Advance every registered request by one step. `mon_time_ms` must come
/// from a monotonic clock; `tick_http_monotonic_ms` is one.
///
/// Callbacks run from inside this call. Returns `Busy` when called from one
/// of them.
#[unsafe(no_mangle)]
pub extern "C" fn tick_http_scheduler_work(scheduler: *mut FfiScheduler, mon_time_ms: u64) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        if scheduler.is_null() {
            return FfiStatus::NullArg;
        }
        let handle = unsafe { &*scheduler };
        let Ok(mut inner) = handle.inner.try_borrow_mut() else {
            return FfiStatus::Busy;
        };
        handle.live_at_pass.set(inner.len());
        inner.work(mon_time_ms);
        handle.live_at_pass.set(inner.len());
        FfiStatus::Ok
    }))
    .unwrap_or(FfiStatus::Panic)
}

/// Number of requests that have not finished yet. Zero for null.
///
/// From inside a callback this is the count at the start of the running pass
/// plus any requests queued since.
#[unsafe(no_mangle)]
pub extern "C" fn tick_http_scheduler_len(scheduler: *const FfiScheduler) -> u32 {
    catch_unwind(AssertUnwindSafe(|| {
        if scheduler.is_null() {
            return 0;
        }
        let handle = unsafe { &*scheduler };
        u32::try_from(handle.len()).unwrap_or(u32::MAX)
    }))
    .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Register a GET of `url` on `scheduler`.
///
/// On `Ok`, `callback` is invoked exactly once from a later
/// `tick_http_scheduler_work` call with `user_data` passed through. On any
/// other status the callback is never invoked. Called from a callback, the
/// request is queued and starts on the next pass.
#[unsafe(no_mangle)]
pub extern "C" fn tick_http_get(
    scheduler: *mut FfiScheduler,
    url: *const c_char,
    timeout_ms: u64,
    callback: Option<FfiCallback>,
    user_data: *mut c_void,
) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(callback) = callback else {
            return FfiStatus::NullArg;
        };
        if scheduler.is_null() || url.is_null() {
            return FfiStatus::NullArg;
        }
        let handle = unsafe { &*scheduler };
        let Ok(url) = unsafe { CStr::from_ptr(url) }.to_str() else {
            return FfiStatus::InvalidUtf8;
        };

        let timeout = Duration::from_millis(timeout_ms);
        let on_event = move |event: Event| FfiEvent::from_core(&event).dispatch(callback, user_data);
        let registered: Result<(), FetchError> = match handle.inner.try_borrow_mut() {
            Ok(mut inner) => http_get(&mut inner, url, timeout, on_event).map(drop),
            // A pass is running, so this came from a callback.
            Err(_) => http_get_queued(&handle.spawner, url, timeout, on_event, &ClientConfig::default()),
        };
        match registered {
            Ok(()) => FfiStatus::Ok,
            // Oversized URLs are the only failure reported before a client exists.
            Err(err) => {
                tracing::warn!(error = %err, "request rejected");
                FfiStatus::UrlTooLong
            }
        }
    }))
    .unwrap_or(FfiStatus::Panic)
}

/// Milliseconds on the process monotonic clock, starting at 1.
#[unsafe(no_mangle)]
pub extern "C" fn tick_http_monotonic_ms() -> u64 {
    catch_unwind(monotonic_ms).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_server::scripted::{Script, ScriptedServer};
    use std::cell::RefCell;
    use std::ffi::CString;
    use std::time::Instant;

    type Log = RefCell<Vec<(String, Option<String>)>>;

    extern "C" fn record(event: *const c_char, payload: *const c_char, user_data: *mut c_void) {
        let log = unsafe { &*(user_data as *const Log) };
        let event = unsafe { CStr::from_ptr(event) }.to_string_lossy().into_owned();
        let payload = (!payload.is_null())
            .then(|| unsafe { CStr::from_ptr(payload) }.to_string_lossy().into_owned());
        log.borrow_mut().push((event, payload));
    }

    fn user_data(log: &Log) -> *mut c_void {
        log as *const Log as *mut c_void
    }

    fn drive(scheduler: *mut FfiScheduler) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while tick_http_scheduler_len(scheduler) > 0 {
            assert!(Instant::now() < deadline, "requests never finished");
            assert_eq!(tick_http_scheduler_work(scheduler, tick_http_monotonic_ms()), FfiStatus::Ok);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn scheduler_new_and_free() {
        let scheduler = tick_http_scheduler_new();
        assert!(!scheduler.is_null());
        assert_eq!(tick_http_scheduler_len(scheduler), 0);
        tick_http_scheduler_free(scheduler);
    }

    #[test]
    fn null_handles_are_tolerated() {
        tick_http_scheduler_free(std::ptr::null_mut());
        assert_eq!(tick_http_scheduler_len(std::ptr::null()), 0);
        assert_eq!(tick_http_scheduler_work(std::ptr::null_mut(), 1), FfiStatus::NullArg);
    }

    #[test]
    fn get_rejects_null_arguments() {
        let scheduler = tick_http_scheduler_new();
        let url = CString::new("http://127.0.0.1/").unwrap();
        let log = Log::default();

        let status = tick_http_get(std::ptr::null_mut(), url.as_ptr(), 1000, Some(record), user_data(&log));
        assert_eq!(status, FfiStatus::NullArg);
        let status = tick_http_get(scheduler, std::ptr::null(), 1000, Some(record), user_data(&log));
        assert_eq!(status, FfiStatus::NullArg);
        let status = tick_http_get(scheduler, url.as_ptr(), 1000, None, user_data(&log));
        assert_eq!(status, FfiStatus::NullArg);

        assert_eq!(tick_http_scheduler_len(scheduler), 0);
        tick_http_scheduler_free(scheduler);
    }

    #[test]
    fn get_rejects_invalid_utf8() {
        let scheduler = tick_http_scheduler_new();
        let url = CString::new(vec![b'h', 0xff, b'/']).unwrap();
        let log = Log::default();

        let status = tick_http_get(scheduler, url.as_ptr(), 1000, Some(record), user_data(&log));
        assert_eq!(status, FfiStatus::InvalidUtf8);
        tick_http_scheduler_free(scheduler);
    }

    #[test]
    fn get_rejects_oversized_url() {
        let scheduler = tick_http_scheduler_new();
        let url = CString::new(format!("http://127.0.0.1/{}", "a".repeat(1100))).unwrap();
        let log = Log::default();

        let status = tick_http_get(scheduler, url.as_ptr(), 1000, Some(record), user_data(&log));
        assert_eq!(status, FfiStatus::UrlTooLong);
        assert_eq!(tick_http_scheduler_len(scheduler), 0);
        assert!(log.borrow().is_empty());
        tick_http_scheduler_free(scheduler);
    }

    #[test]
    fn response_is_delivered_through_callback() {
        let server = ScriptedServer::start(Script::new([
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK",
        ]))
        .unwrap();
        let scheduler = tick_http_scheduler_new();
        let url = CString::new(server.url("/status")).unwrap();
        let log = Log::default();

        let status = tick_http_get(scheduler, url.as_ptr(), 5000, Some(record), user_data(&log));
        assert_eq!(status, FfiStatus::Ok);
        assert_eq!(tick_http_scheduler_len(scheduler), 1);

        drive(scheduler);

        assert_eq!(*log.borrow(), vec![("RESPONSE".to_string(), Some("OK".to_string()))]);
        tick_http_scheduler_free(scheduler);
    }

    #[test]
    fn error_status_is_delivered_through_callback() {
        let server = ScriptedServer::start(Script::new([
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n",
        ]))
        .unwrap();
        let scheduler = tick_http_scheduler_new();
        let url = CString::new(server.url("/missing")).unwrap();
        let log = Log::default();

        assert_eq!(
            tick_http_get(scheduler, url.as_ptr(), 5000, Some(record), user_data(&log)),
            FfiStatus::Ok
        );
        drive(scheduler);

        assert_eq!(*log.borrow(), vec![("ERROR".to_string(), Some("HTTP 404: ".to_string()))]);
        tick_http_scheduler_free(scheduler);
    }

    #[test]
    fn timeout_has_null_payload() {
        let server = ScriptedServer::start(Script::new(Vec::<Vec<u8>>::new()).hold_open()).unwrap();
        let scheduler = tick_http_scheduler_new();
        let url = CString::new(server.url("/")).unwrap();
        let log = Log::default();

        assert_eq!(
            tick_http_get(scheduler, url.as_ptr(), 100, Some(record), user_data(&log)),
            FfiStatus::Ok
        );
        drive(scheduler);

        assert_eq!(*log.borrow(), vec![("TIMEOUT".to_string(), None)]);
        tick_http_scheduler_free(scheduler);
    }

    #[test]
    fn freeing_with_pending_requests_skips_callbacks() {
        let server = ScriptedServer::start(Script::new(Vec::<Vec<u8>>::new()).hold_open()).unwrap();
        let scheduler = tick_http_scheduler_new();
        let url = CString::new(server.url("/")).unwrap();
        let log = Log::default();

        assert_eq!(
            tick_http_get(scheduler, url.as_ptr(), 60_000, Some(record), user_data(&log)),
            FfiStatus::Ok
        );
        tick_http_scheduler_work(scheduler, tick_http_monotonic_ms());
        tick_http_scheduler_free(scheduler);

        assert!(log.borrow().is_empty());
    }

    /// Shared with `chain` through `user_data`.
    struct Chain {
        scheduler: *mut FfiScheduler,
        url: CString,
        log: Log,
        follow_up: RefCell<Option<FfiStatus>>,
        nested_work: RefCell<Option<FfiStatus>>,
        len_inside: RefCell<Option<u32>>,
    }

    /// Records the event, then issues one follow-up request on the same
    /// scheduler and tries to run a nested pass.
    extern "C" fn chain(event: *const c_char, payload: *const c_char, user_data: *mut c_void) {
        let ctx = unsafe { &*(user_data as *const Chain) };
        record(event, payload, &ctx.log as *const Log as *mut c_void);
        if ctx.log.borrow().len() > 1 {
            return;
        }
        let status = tick_http_get(ctx.scheduler, ctx.url.as_ptr(), 5000, Some(chain), user_data);
        *ctx.follow_up.borrow_mut() = Some(status);
        *ctx.len_inside.borrow_mut() = Some(tick_http_scheduler_len(ctx.scheduler));
        *ctx.nested_work.borrow_mut() = Some(tick_http_scheduler_work(ctx.scheduler, tick_http_monotonic_ms()));
        tick_http_scheduler_free(ctx.scheduler);
    }

    #[test]
    fn callback_can_issue_a_second_request() {
        let server = ScriptedServer::start(Script::new([
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK",
        ]))
        .unwrap();
        let scheduler = tick_http_scheduler_new();
        let ctx = Chain {
            scheduler,
            url: CString::new(server.url("/status")).unwrap(),
            log: Log::default(),
            follow_up: RefCell::new(None),
            nested_work: RefCell::new(None),
            len_inside: RefCell::new(None),
        };
        let data = &ctx as *const Chain as *mut c_void;

        assert_eq!(
            tick_http_get(scheduler, ctx.url.as_ptr(), 5000, Some(chain), data),
            FfiStatus::Ok
        );
        drive(scheduler);

        let ok = ("RESPONSE".to_string(), Some("OK".to_string()));
        assert_eq!(*ctx.log.borrow(), vec![ok.clone(), ok]);
        assert_eq!(*ctx.follow_up.borrow(), Some(FfiStatus::Ok));
        assert_eq!(*ctx.nested_work.borrow(), Some(FfiStatus::Busy));
        // The first request is still in the pass that is running; the second is queued.
        assert_eq!(*ctx.len_inside.borrow(), Some(2));
        assert_eq!(server.requests().len(), 2);
        tick_http_scheduler_free(scheduler);
    }

    #[test]
    fn monotonic_clock_is_nonzero() {
        let a = tick_http_monotonic_ms();
        assert!(a >= 1);
        assert!(tick_http_monotonic_ms() >= a);
    }
}
