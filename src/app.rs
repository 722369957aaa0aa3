use crate::backend::{fetch_roster, BackendClient};
use crate::config::Config;
use crate::detection::FaceLocalizer;
use crate::frame::FrameSource;
use crate::pipeline::{CapturePipeline, PipelinePoller, PipelineState};
use crate::roster::Roster;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;

use axum::Router;
use chrono::Local;
use std::{error::Error, future::Future, sync::Arc};
use tokio::{signal, sync::broadcast};

/// Opens the webcam and loads the face cascade, then runs the service.
#[cfg(feature = "camera")]
pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    use crate::camera::{HaarFaceLocalizer, OpenCvCamera};
    use crate::routes::video_routes;
    use crate::stream::VideoStream;

    let viewport = config.capture.get_viewport();
    let camera = match OpenCvCamera::new(&config.camera, viewport) {
        Ok(cam) => Arc::new(cam),
        Err(e) => {
            tracing::error!("Failed to initialize camera: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let localizer = match HaarFaceLocalizer::new(&config.camera.cascade_path) {
        Ok(localizer) => Arc::new(localizer),
        Err(e) => {
            tracing::error!("Failed to load face localizer: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let stream_delay = config.camera.get_stream_delay_ms();
    run_app(config, camera.clone(), localizer, move |pipeline_state| {
        video_routes(VideoStream::new(camera, pipeline_state, stream_delay))
    })
    .await
}

/// Loads today's roster, starts the capture poller and the HTTP server,
/// and waits for Ctrl+C or SIGTERM.
pub async fn run_app<F, L>(
    config: Config,
    frame_source: Arc<F>,
    localizer: Arc<L>,
    extra_routes: impl FnOnce(PipelineState) -> Router<SharedState>,
) -> Result<(), Box<dyn Error>>
where
    F: FrameSource,
    L: FaceLocalizer,
{
    run_app_until(config, frame_source, localizer, extra_routes, shutdown_signal()).await
}

/// Same as [`run_app`], stopping when `shutdown` resolves.
pub async fn run_app_until<F, L>(
    config: Config,
    frame_source: Arc<F>,
    localizer: Arc<L>,
    extra_routes: impl FnOnce(PipelineState) -> Router<SharedState>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Box<dyn Error>>
where
    F: FrameSource,
    L: FaceLocalizer,
{
    let metrics = Arc::new(Metrics::new()?);

    let backend = match BackendClient::new(&config.backend) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to initialize backend client: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let today = Local::now().date_naive();
    let entries = fetch_roster(
        &backend,
        today,
        config.backend.roster_fetch_attempts,
        config.backend.get_roster_retry_delay(),
    )
    .await;
    let pipeline_state = PipelineState::new(Roster::new(entries), config.capture.get_viewport());

    let pipeline = Arc::new(
        CapturePipeline::new(
            frame_source,
            localizer,
            Arc::new(backend.clone()),
            pipeline_state.clone(),
            &config.capture,
            &config.recognition,
        )
        .with_metrics(metrics.clone()),
    );

    let app_state = SharedState {
        pipeline_state: pipeline_state.clone(),
        backend,
        metrics,
    };
    let server = HttpServer::new(app_state, extra_routes(pipeline_state), &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();
    let poller_shutdown_rx = shutdown_tx.subscribe();

    let poller_handle = PipelinePoller::new(pipeline, &config.capture).run(poller_shutdown_rx);
    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown.await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = poller_handle.await;
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
