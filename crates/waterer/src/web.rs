use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use axum::Router;
use rpi_control::shutdown::Shutdown;
use rpi_control::sim::ManualInput;
use rpi_control::StatusReader;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::info;

use crate::state::Snapshot;

#[derive(Clone)]
pub struct AppState {
    pub status: StatusReader<Snapshot>,
    /// Present only when the probe is the manual simulator.
    pub manual: Option<ManualInput>,
    pub started_at: Instant,
}

#[derive(Serialize)]
struct StatusBody {
    #[serde(flatten)]
    snapshot: Snapshot,
    uptime_secs: u64,
}

/// At least one of the two must be present.
#[derive(Deserialize)]
struct ReadingBody {
    #[serde(default, alias = "humidity")]
    value: Option<f64>,
    #[serde(default)]
    temperature: Option<f64>,
}

/// Plausible air temperatures, °C.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = -40.0..=85.0;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/sim/reading", put(put_reading))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusBody {
        snapshot: state.status.snapshot(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn put_reading(State(state): State<AppState>, Json(body): Json<ReadingBody>) -> Response {
    let Some(manual) = state.manual else {
        return (StatusCode::CONFLICT, "probe is not in manual mode").into_response();
    };
    if body.value.is_none() && body.temperature.is_none() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            "expected `value` and/or `temperature`",
        )
            .into_response();
    }
    if body.value.is_some_and(|v| !(0.0..=100.0).contains(&v)) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            "value must be within 0..=100",
        )
            .into_response();
    }
    if body.temperature.is_some_and(|t| !TEMPERATURE_RANGE.contains(&t)) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            "temperature must be within -40..=85",
        )
            .into_response();
    }

    info!(value = body.value, temperature = body.temperature, "manual reading set");
    if let Some(v) = body.value {
        manual.set(v);
    }
    if let Some(t) = body.temperature {
        manual.set_temperature(t);
    }
    StatusCode::NO_CONTENT.into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

/// Serve until `shutdown` fires.
pub async fn serve(port: u16, state: AppState, shutdown: Shutdown) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("status endpoint listening on http://{addr}/api/status");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.wait_owned())
        .await?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
