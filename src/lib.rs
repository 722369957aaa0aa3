mod routes;

pub mod app;
pub mod backend;
pub mod config;
pub mod cropper;
pub mod detection;
pub mod frame;
pub mod overlay;
pub mod pipeline;
pub mod renderer;
pub mod roster;
pub mod server;
pub mod telemetry;

#[cfg(feature = "camera")]
pub mod camera;
#[cfg(feature = "camera")]
mod cv_utils;
#[cfg(feature = "camera")]
mod stream;

pub use app::{run_app, run_app_until};
#[cfg(feature = "camera")]
pub use app::start_app;
