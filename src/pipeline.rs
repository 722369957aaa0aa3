use crate::{
    backend::{BackendError, RecognitionResult, Recognizer},
    config::{CaptureConfig, RecognitionConfig},
    cropper::{crop_face, CropError},
    detection::{Detection, DetectionError, FaceLocalizer},
    frame::{Frame, FrameError, FrameSource},
    overlay::{Annotation, Overlay},
    renderer::AnnotationRenderer,
    roster::{AttendanceEntry, Roster},
    telemetry::Metrics,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tokio::{
    sync::broadcast,
    task::{JoinHandle, JoinSet},
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::instrument;

const FAILURE_WARN_EVERY: u64 = 10;

#[derive(Error, Debug)]
pub enum TickError {
    #[error("Skipping tick, frame unavailable: {0}")]
    Frame(#[from] FrameError),
    #[error("Skipping tick, detection unavailable: {0}")]
    Detection(#[from] DetectionError),
}

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("Crop failed: {0}")]
    Crop(#[from] CropError),
    #[error("Recognition request failed: {0}")]
    Recognition(#[from] BackendError),
}

/// What a tick did, for logs and metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub detections: usize,
    pub recognized: usize,
    pub failed: usize,
    pub newly_present: Vec<AttendanceEntry>,
}

/// Roster and overlay, shared between overlapping ticks and the HTTP layer.
///
/// Locks are only taken for in-memory updates, never across an await.
#[derive(Clone)]
pub struct PipelineState {
    roster: Arc<Mutex<Roster>>,
    overlay: Arc<Mutex<Overlay>>,
}

impl PipelineState {
    pub fn new(roster: Roster, viewport: (u32, u32)) -> Self {
        Self {
            roster: Arc::new(Mutex::new(roster)),
            overlay: Arc::new(Mutex::new(Overlay::new(viewport.0, viewport.1))),
        }
    }

    pub fn roster(&self) -> Roster {
        self.roster.lock().clone()
    }

    pub fn overlay(&self) -> Overlay {
        self.overlay.lock().clone()
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.overlay.lock().dimensions()
    }

    fn mark_present(&self, names: &[String]) -> (Vec<AttendanceEntry>, usize) {
        let mut roster = self.roster.lock();
        let newly_present = names
            .iter()
            .filter_map(|name| roster.mark_present(name).cloned())
            .collect();
        (newly_present, roster.present_count())
    }

    fn present(&self, annotations: Vec<Annotation>) {
        self.overlay.lock().present(annotations);
    }
}

pub struct CapturePipeline<F, L, R> {
    frame_source: Arc<F>,
    localizer: Arc<L>,
    recognizer: Arc<R>,
    state: PipelineState,
    renderer: AnnotationRenderer,
    acceptance_threshold: f64,
    jpeg_quality: u8,
    metrics: Option<Arc<Metrics>>,
}

impl<F, L, R> CapturePipeline<F, L, R>
where
    F: FrameSource,
    L: FaceLocalizer,
    R: Recognizer,
{
    pub fn new(
        frame_source: Arc<F>,
        localizer: Arc<L>,
        recognizer: Arc<R>,
        state: PipelineState,
        capture: &CaptureConfig,
        recognition: &RecognitionConfig,
    ) -> Self {
        Self {
            frame_source,
            localizer,
            recognizer,
            state,
            renderer: AnnotationRenderer::new(recognition.display_threshold),
            acceptance_threshold: recognition.acceptance_threshold,
            jpeg_quality: capture.jpeg_quality,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// One capture, detect, recognize, annotate cycle.
    #[instrument(skip(self), fields(frame_age_ms = tracing::field::Empty))]
    pub async fn run_tick(&self) -> Result<TickReport, TickError> {
        let outcome = self.tick().await;

        if let Some(metrics) = &self.metrics {
            match &outcome {
                Ok(report) if report.detections == 0 => metrics.record_tick("empty"),
                Ok(report) => {
                    metrics.record_tick("processed");
                    metrics.record_faces(report.detections, report.failed);
                }
                Err(_) => metrics.record_tick("skipped"),
            }
        }

        outcome
    }

    async fn tick(&self) -> Result<TickReport, TickError> {
        let frame = self.frame_source.capture_frame().await?;
        let (width, height) = self.state.viewport();
        frame.ensure_viewport(width, height)?;

        let detections = self.localizer.detect_faces(&frame).await?;
        tracing::Span::current().record("frame_age_ms", frame.age().num_milliseconds());
        if detections.is_empty() {
            tracing::debug!("No face detected");
            self.state.present(Vec::new());
            return Ok(TickReport::default());
        }

        let started = Instant::now();
        let outcomes = join_all(
            detections
                .iter()
                .map(|detection| self.process_face(&frame, detection)),
        )
        .await;
        if let Some(metrics) = &self.metrics {
            metrics.record_recognition_duration(started.elapsed().as_millis() as u64);
        }

        let mut report = TickReport {
            detections: detections.len(),
            ..TickReport::default()
        };
        let mut annotations = Vec::with_capacity(detections.len());
        let mut accepted = Vec::new();

        for (index, (detection, outcome)) in detections.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(result) => {
                    report.recognized += 1;
                    annotations.push(self.renderer.annotate(detection, &result));
                    if result.confidence > self.acceptance_threshold {
                        accepted.push(result.prediction);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Error recognizing face {}: {}", index + 1, e);
                }
            }
        }

        let (newly_present, present_count) = self.state.mark_present(&accepted);
        for entry in &newly_present {
            tracing::info!("Marked {} (id {}) present", entry.name, entry.id);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_attendees_present(present_count);
        }
        report.newly_present = newly_present;

        self.state.present(annotations);

        Ok(report)
    }

    async fn process_face(
        &self,
        frame: &Frame,
        detection: &Detection,
    ) -> Result<RecognitionResult, FaceError> {
        let crop = crop_face(frame, detection, self.jpeg_quality)?;
        let result = self.recognizer.recognize(&crop).await?;
        Ok(result)
    }
}

/// Fires a tick every period without waiting on the previous one.
pub struct PipelinePoller<F, L, R> {
    pipeline: Arc<CapturePipeline<F, L, R>>,
    period: Duration,
}

impl<F, L, R> PipelinePoller<F, L, R>
where
    F: FrameSource,
    L: FaceLocalizer,
    R: Recognizer,
{
    pub fn new(pipeline: Arc<CapturePipeline<F, L, R>>, capture: &CaptureConfig) -> Self {
        Self {
            pipeline,
            period: capture.get_period(),
        }
    }

    pub fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let period = self.period;

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = JoinSet::new();
            let mut consecutive_failures: u64 = 0;

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let pipeline = pipeline.clone();
                        ticks.spawn(async move { pipeline.run_tick().await });
                    }
                    Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                        match joined {
                            Ok(Ok(report)) => {
                                consecutive_failures = 0;
                                tracing::debug!(
                                    "Tick done: {} detected, {} recognized, {} failed",
                                    report.detections,
                                    report.recognized,
                                    report.failed
                                );
                            }
                            Ok(Err(e)) => {
                                consecutive_failures += 1;
                                tracing::debug!("{}", e);
                                if consecutive_failures % FAILURE_WARN_EVERY == 0 {
                                    tracing::warn!(
                                        "{} consecutive ticks skipped, last error: {}",
                                        consecutive_failures,
                                        e
                                    );
                                }
                            }
                            Err(e) => {
                                tracing::error!("Tick task failed: {:?}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Capture polling received shutdown signal");
                        break;
                    }
                }
            }

            ticks.abort_all();
            tracing::info!("Capture polling stopped");
        })
    }
}
