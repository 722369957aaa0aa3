use crate::{overlay::Overlay, server::SharedState};
use axum::{extract::State, response::Json};

pub async fn overlay(State(state): State<SharedState>) -> Json<Overlay> {
    state.metrics.record_request("/overlay");
    Json(state.pipeline_state.overlay())
}
