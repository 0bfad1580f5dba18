use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use rpi_control::shutdown::Shutdown;
use rpi_control::StatusReader;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::levels::Levels;

pub fn router(levels: StatusReader<Levels>) -> Router {
    Router::new()
        .route("/api/levels", get(api_levels))
        .with_state(levels)
}

async fn api_levels(State(levels): State<StatusReader<Levels>>) -> impl IntoResponse {
    Json(levels.snapshot())
}

pub async fn serve(port: u16, levels: StatusReader<Levels>, shutdown: Shutdown) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("levels endpoint listening on http://{addr}/api/levels");

    axum::serve(listener, router(levels))
        .with_graceful_shutdown(shutdown.wait_owned())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{Material, Settings};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use rpi_control::StatusBoard;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn levels_endpoint_serves_snapshot() {
        let settings = Settings {
            water_threshold: 50.0,
            oil_threshold: 30.0,
            smooth_width: 100,
            channels: 7,
            period: Duration::from_millis(100),
        };
        let board = StatusBoard::new(Levels::new(&settings));
        board.update(|l| {
            let ch = &mut l.channels[3];
            ch.raw = Some(767);
            ch.value = Some(75.0);
            ch.smoothed = Some(74.2);
            ch.samples = 12;
            ch.material = Material::Water;
        });

        let resp = router(board.reader())
            .oneshot(Request::get("/api/levels").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let channels = json["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 7);
        assert_eq!(channels[3]["material"], "WATER");
        assert_eq!(channels[3]["raw"], 767);
        assert_eq!(channels[3]["samples"], 12);
        assert_eq!(channels[0]["material"], "UNKNOWN");
        assert!(channels[0]["smoothed"].is_null());
        assert_eq!(json["oil_threshold"], 30.0);
    }
}
