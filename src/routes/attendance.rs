use crate::{
    backend::{AttendanceSummary, BackendError, UserAttendance},
    server::SharedState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::collections::BTreeMap;
use tracing::instrument;

pub struct UpstreamError(BackendError);

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        tracing::error!("Attendance backend failed: {}", self.0);
        (
            StatusCode::BAD_GATEWAY,
            format!("Attendance backend failed: {}", self.0),
        )
            .into_response()
    }
}

#[instrument(skip(state))]
pub async fn summary(
    State(state): State<SharedState>,
) -> Result<Json<AttendanceSummary>, UpstreamError> {
    state.metrics.record_request("/attendance/summary");
    let summary = state.backend.attendance_summary().await.map_err(UpstreamError)?;
    Ok(Json(summary))
}

#[instrument(skip(state))]
pub async fn user_summary(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<UserAttendance>, UpstreamError> {
    state.metrics.record_request("/attendance/summary/user");
    let attendance = state
        .backend
        .user_attendance(&name)
        .await
        .map_err(UpstreamError)?;
    Ok(Json(attendance))
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<BTreeMap<String, bool>>, UpstreamError> {
    state.metrics.record_request("/attendance/history");
    let history = state
        .backend
        .attendance_history(&name)
        .await
        .map_err(UpstreamError)?;
    Ok(Json(history))
}
