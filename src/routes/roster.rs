use crate::{roster::AttendanceEntry, server::SharedState};
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct RosterView {
    present: usize,
    total: usize,
    entries: Vec<AttendanceEntry>,
}

pub async fn roster(State(state): State<SharedState>) -> Json<RosterView> {
    state.metrics.record_request("/roster");
    let roster = state.pipeline_state.roster();

    Json(RosterView {
        present: roster.present_count(),
        total: roster.len(),
        entries: roster.entries().to_vec(),
    })
}
