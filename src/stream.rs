use crate::camera::{CameraError, OpenCvCamera};
use crate::cv_utils::{self, CvUtilsError};
use crate::pipeline::PipelineState;
use bytes::Bytes;
use futures::stream;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

pub const FRAME_BOUNDARY: &str = "frame";

/// Live camera frames with the current overlay burned in.
#[derive(Clone)]
pub struct VideoStream {
    camera: Arc<OpenCvCamera>,
    state: PipelineState,
    video_stream_delay: u64,
}

#[derive(Error, Debug)]
pub enum VideoStreamError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Cv utils error: {0}")]
    CvUtils(#[from] CvUtilsError),
    #[error("Http builder error: {0}")]
    HttpBuilderError(String),
}

impl VideoStream {
    pub fn new(camera: Arc<OpenCvCamera>, state: PipelineState, video_stream_delay: u64) -> Self {
        Self {
            camera,
            state,
            video_stream_delay,
        }
    }

    async fn annotated_frame(&self) -> Result<Vec<u8>, VideoStreamError> {
        let mut frame = self.camera.capture_mat().await?;
        let overlay = self.state.overlay();
        cv_utils::draw_overlay(&mut frame, &overlay)?;
        Ok(cv_utils::encode_jpg(&frame)?)
    }

    #[instrument(skip(self))]
    pub fn generate_stream(self) -> impl futures::Stream<Item = Result<Bytes, VideoStreamError>> {
        stream::unfold(self, |video| async move {
            sleep(Duration::from_millis(video.video_stream_delay)).await;
            match video.annotated_frame().await {
                Ok(frame) => {
                    let part_header = format!(
                        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                        FRAME_BOUNDARY,
                        frame.len()
                    );
                    let mut body = part_header.into_bytes();
                    body.extend_from_slice(&frame);
                    body.extend_from_slice(b"\r\n");
                    Some((Ok::<_, VideoStreamError>(Bytes::from(body)), video))
                }
                Err(e) => {
                    tracing::error!("Error getting frame: {:?}", e);
                    Some((Err(e), video))
                }
            }
        })
    }
}
