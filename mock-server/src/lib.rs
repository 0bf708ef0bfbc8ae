//! Local HTTP fixtures for exercising the tick client.
//!
//! [`app`] is an axum router with a handful of fixed routes. [`scripted`]
//! serves hand-written byte sequences for cases where the exact framing on
//! the wire matters.

pub mod scripted;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// How long `/stall` waits before answering.
pub const STALL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub latitude: f64,
    pub longitude: f64,
    pub current: CurrentWeather,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub time: String,
    pub temperature_2m: f64,
    pub wind_speed_10m: f64,
}

impl Forecast {
    /// Deterministic weather for a coordinate.
    pub fn for_location(latitude: f64, longitude: f64) -> Self {
        let temperature = (25.0 - latitude.abs() * 0.4) * 10.0;
        let wind = (longitude.abs() % 20.0 + 1.0) * 10.0;
        Self {
            latitude,
            longitude,
            current: CurrentWeather {
                time: "2024-01-01T12:00".to_string(),
                temperature_2m: temperature.round() / 10.0,
                wind_speed_10m: wind.round() / 10.0,
            },
        }
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/missing", get(missing))
        .route("/v1/forecast", get(forecast))
        .route("/stall", get(stall))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Serve [`app`] on an ephemeral loopback port from a background thread.
pub fn spawn_app() -> std::io::Result<SocketAddr> {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    std_listener.set_nonblocking(true)?;
    let addr = std_listener.local_addr()?;

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::error!(error = %err, "failed to build runtime");
                return;
            }
        };
        let result = runtime.block_on(async move {
            let listener = TcpListener::from_std(std_listener)?;
            run(listener).await
        });
        if let Err(err) = result {
            tracing::error!(error = %err, %addr, "mock server stopped");
        }
    });

    Ok(addr)
}

async fn status() -> &'static str {
    "OK"
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn forecast(Query(query): Query<ForecastQuery>) -> Json<Forecast> {
    tracing::debug!(latitude = query.latitude, longitude = query.longitude, "forecast");
    Json(Forecast::for_location(query.latitude, query.longitude))
}

async fn stall() -> &'static str {
    tokio::time::sleep(STALL).await;
    "late"
}
