//! Fetch one URL with the tick client and print the outcome.
//!
//! Usage: `tick-fetch <url>`, built with `--features cli`. The timeout
//! comes from `TICK_HTTP_TIMEOUT_MS` (default 10000) and log verbosity from
//! `RUST_LOG`.

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use tick_http_core::{http_get_with_config, ClientConfig, Event, Scheduler};
use tracing_subscriber::EnvFilter;

const ENV_TIMEOUT_MS: &str = "TICK_HTTP_TIMEOUT_MS";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const TICK: Duration = Duration::from_millis(1);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let Some(url) = std::env::args().nth(1) else {
        eprintln!("usage: tick-fetch <url>");
        return ExitCode::from(2);
    };

    let timeout_ms = std::env::var(ENV_TIMEOUT_MS)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    let outcome: Rc<RefCell<Option<Event>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outcome);

    let mut scheduler = Scheduler::new();
    if let Err(err) = http_get_with_config(
        &mut scheduler,
        &url,
        Duration::from_millis(timeout_ms),
        move |event| *sink.borrow_mut() = Some(event),
        &ClientConfig::from_env(),
    ) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    scheduler.run_until_idle(TICK);

    let event = outcome.borrow_mut().take();
    match event {
        Some(Event::Response(body)) => {
            println!("{body}");
            ExitCode::SUCCESS
        }
        Some(Event::Error(err)) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
        Some(Event::Timeout) => {
            eprintln!("timed out after {timeout_ms} ms");
            ExitCode::FAILURE
        }
        None => {
            eprintln!("request finished without an outcome");
            ExitCode::FAILURE
        }
    }
}
