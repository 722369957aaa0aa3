mod attendance;
mod health;
mod metrics;
mod overlay;
mod roster;
#[cfg(feature = "camera")]
mod video_feed;

use crate::server::SharedState;
use axum::{routing::get, Router};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/roster", get(roster::roster))
        .route("/overlay", get(overlay::overlay))
        .route("/attendance/summary", get(attendance::summary))
        .route("/attendance/summary/{name}", get(attendance::user_summary))
        .route("/attendance/history/{name}", get(attendance::history))
}

#[cfg(feature = "camera")]
pub fn video_routes(video_stream: crate::stream::VideoStream) -> Router<SharedState> {
    Router::new()
        .route("/video_feed", get(video_feed::video_feed))
        .with_state(video_stream)
}
