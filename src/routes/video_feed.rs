use crate::stream::{VideoStream, VideoStreamError, FRAME_BOUNDARY};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::instrument;

#[instrument(skip(video_stream))]
pub async fn video_feed(
    State(video_stream): State<VideoStream>,
) -> Result<Response, VideoStreamError> {
    let stream = video_stream.generate_stream();

    let body = Body::from_stream(stream);

    let response = Response::builder()
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", FRAME_BOUNDARY),
        )
        .body(body)
        .map_err(|e| VideoStreamError::HttpBuilderError(e.to_string()))?;

    Ok(response)
}

impl IntoResponse for VideoStreamError {
    fn into_response(self) -> Response {
        let status = match self {
            VideoStreamError::Camera(_) | VideoStreamError::CvUtils(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            VideoStreamError::HttpBuilderError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
