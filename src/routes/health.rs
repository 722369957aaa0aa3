use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    roster_entries: usize,
}

pub async fn healthcheck(State(state): State<SharedState>) -> Json<Status> {
    Json(Status {
        status: "Available".into(),
        roster_entries: state.pipeline_state.roster().len(),
    })
}
