use crate::{
    config::CameraConfig,
    cv_utils::{self, CvUtilsError},
    detection::{BoundingBox, Detection, DetectionError, FaceLocalizer},
    frame::{Frame, FrameError, FrameSource},
};
use async_trait::async_trait;
use opencv::{
    core::{Mat, Rect, Size, Vector},
    objdetect,
    prelude::*,
    videoio,
};
use std::path::Path;
use thiserror::Error;
use tokio::sync::Mutex;

const SCALE_FACTOR: f64 = 1.1;
const MIN_NEIGHBORS: i32 = 4;
const MIN_FACE_SIZE: i32 = 40;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    OpenCameraFailed(opencv::Error),
    #[error("Camera {0} could not be opened")]
    CameraNotOpened(i32),
    #[error("Failed to read frame: {0}")]
    ReadFrameFailed(opencv::Error),
    #[error("Camera returned an empty frame")]
    EmptyFrame,
    #[error("Failed to load face cascade from {path}: {reason}")]
    LoadCascadeFailed { path: String, reason: String },
    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),
    #[error("Cv utils error: {0}")]
    CvUtils(#[from] CvUtilsError),
}

/// Webcam capture resized to the configured viewport.
pub struct OpenCvCamera {
    capture: Mutex<videoio::VideoCapture>,
    viewport: (u32, u32),
}

impl OpenCvCamera {
    pub fn new(config: &CameraConfig, viewport: (u32, u32)) -> Result<Self, CameraError> {
        let mut capture = videoio::VideoCapture::new(config.device_index, videoio::CAP_ANY)
            .map_err(CameraError::OpenCameraFailed)?;
        if !capture.is_opened()? {
            return Err(CameraError::CameraNotOpened(config.device_index));
        }

        // Devices may ignore these, fit_viewport covers that case.
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, viewport.0 as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, viewport.1 as f64)?;

        tracing::info!(
            "Opened camera {} with a {}x{} viewport",
            config.device_index,
            viewport.0,
            viewport.1
        );
        Ok(Self {
            capture: Mutex::new(capture),
            viewport,
        })
    }

    /// Raw BGR frame at viewport size.
    pub async fn capture_mat(&self) -> Result<Mat, CameraError> {
        let mut cam = self.capture.lock().await;
        let mut frame = Mat::default();
        let grabbed = cam.read(&mut frame).map_err(CameraError::ReadFrameFailed)?;
        drop(cam);

        if !grabbed || frame.empty() {
            return Err(CameraError::EmptyFrame);
        }
        Ok(cv_utils::fit_viewport(frame, self.viewport)?)
    }
}

#[async_trait]
impl FrameSource for OpenCvCamera {
    async fn capture_frame(&self) -> Result<Frame, FrameError> {
        let mat = self
            .capture_mat()
            .await
            .map_err(|e| FrameError::Unavailable(e.to_string()))?;
        cv_utils::mat_to_frame(&mat).map_err(|e| FrameError::Unavailable(e.to_string()))
    }
}

/// Haar cascade face localizer. The cascade is read from disk once, here.
pub struct HaarFaceLocalizer {
    classifier: Mutex<objdetect::CascadeClassifier>,
}

impl HaarFaceLocalizer {
    pub fn new(cascade_path: &Path) -> Result<Self, CameraError> {
        let path = cascade_path.to_string_lossy().to_string();
        let classifier =
            objdetect::CascadeClassifier::new(&path).map_err(|e| CameraError::LoadCascadeFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if classifier.empty()? {
            return Err(CameraError::LoadCascadeFailed {
                path,
                reason: "cascade is empty".into(),
            });
        }

        tracing::info!("Loaded face cascade from {}", path);
        Ok(Self {
            classifier: Mutex::new(classifier),
        })
    }
}

#[async_trait]
impl FaceLocalizer for HaarFaceLocalizer {
    async fn detect_faces(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let mut classifier = self.classifier.lock().await;
        let gray = cv_utils::frame_to_gray_mat(frame)
            .map_err(|e| DetectionError::Unavailable(e.to_string()))?;

        let mut faces = Vector::<Rect>::new();
        classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                SCALE_FACTOR,
                MIN_NEIGHBORS,
                0,
                Size::new(MIN_FACE_SIZE, MIN_FACE_SIZE),
                Size::new(0, 0),
            )
            .map_err(|e| DetectionError::Unavailable(e.to_string()))?;

        Ok(faces
            .iter()
            .map(|rect| {
                Detection::from(BoundingBox::new(
                    rect.x as f32,
                    rect.y as f32,
                    rect.width as f32,
                    rect.height as f32,
                ))
            })
            .collect())
    }
}
