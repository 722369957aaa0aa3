use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub backend: BackendConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    pub camera: CameraConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where the recognition backend lives and how patiently we talk to it.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_roster_fetch_attempts")]
    pub roster_fetch_attempts: u32,
    #[serde(default = "default_roster_retry_delay_ms")]
    pub roster_retry_delay_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_roster_fetch_attempts() -> u32 {
    3
}

fn default_roster_retry_delay_ms() -> u64 {
    200
}

impl BackendConfig {
    pub fn get_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn get_request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn get_roster_retry_delay(&self) -> Duration {
        Duration::from_millis(self.roster_retry_delay_ms)
    }
}

/// The overlay and the frame source share these viewport dimensions.
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_period_ms() -> u64 {
    1000
}

fn default_viewport_width() -> u32 {
    850
}

fn default_viewport_height() -> u32 {
    540
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl CaptureConfig {
    pub fn get_period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn get_viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.period_ms == 0 {
            return Err("capture.period_ms must be greater than zero".into());
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(format!(
                "capture viewport must be non-empty, got {}x{}",
                self.viewport_width, self.viewport_height
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(format!(
                "capture.jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            ));
        }
        Ok(())
    }
}

/// Acceptance gates the roster, display gates the box color. Both compare strictly.
#[derive(Debug, Deserialize, Clone)]
pub struct RecognitionConfig {
    #[serde(default = "default_threshold")]
    pub acceptance_threshold: f64,
    #[serde(default = "default_threshold")]
    pub display_threshold: f64,
}

fn default_threshold() -> f64 {
    0.98
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_threshold(),
            display_threshold: default_threshold(),
        }
    }
}

impl RecognitionConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("acceptance_threshold", self.acceptance_threshold),
            ("display_threshold", self.display_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!(
                    "recognition.{} must be within [0, 1], got {}",
                    name, value
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: i32,
    pub cascade_path: PathBuf,
    #[serde(default = "default_stream_fps")]
    pub stream_fps: u64,
}

fn default_stream_fps() -> u64 {
    20
}

fn fps_to_delay_ms(fps: u64) -> u64 {
    (1000.0 / fps.max(1) as f64).round() as u64
}

impl CameraConfig {
    pub fn get_stream_delay_ms(&self) -> u64 {
        fps_to_delay_ms(self.stream_fps)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("FA")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    if let Err(e) = config
        .capture
        .validate()
        .and_then(|_| config.recognition.validate())
    {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}
