use crate::{config::BackendConfig, cropper::FaceCrop, roster::AttendanceEntry};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} answered {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("Malformed reply from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
    #[error("Cannot build a request URL from {base}: {reason}")]
    InvalidUrl { base: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecognitionResult {
    pub prediction: String,
    pub confidence: f64,
}

#[derive(Serialize)]
struct RecognitionRequest<'a> {
    image_base64: &'a str,
}

/// Aggregate counts across every recorded day.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AttendanceSummary {
    #[serde(rename = "totalDays")]
    pub total_days: u64,
    pub attendance: BTreeMap<String, u64>,
}

/// Days recorded and days present for one attendee.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserAttendance {
    #[serde(rename = "totalDays")]
    pub total_days: u64,
    #[serde(rename = "totalPresent")]
    pub total_present: u64,
}

/// Identifies one face crop.
#[async_trait]
pub trait Recognizer: Send + Sync + 'static {
    async fn recognize(&self, crop: &FaceCrop) -> Result<RecognitionResult, BackendError>;
}

/// Server-side attendance ledger, read once per session.
#[async_trait]
pub trait RosterSource: Send + Sync + 'static {
    async fn daily_roster(&self, date: NaiveDate) -> Result<Vec<AttendanceEntry>, BackendError>;
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.get_request_timeout())
            .build()
            .map_err(BackendError::ClientBuild)?;

        Ok(Self {
            client,
            base_url: config.get_base_url().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `path` followed by one percent-encoded segment, so names carrying
    /// `/`, `?` or `#` stay a single path segment.
    fn url_with_segment(&self, path: &str, segment: &str) -> Result<Url, BackendError> {
        let invalid = |reason: String| BackendError::InvalidUrl {
            base: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.url(path)).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    #[instrument(skip(self))]
    pub async fn attendance_summary(&self) -> Result<AttendanceSummary, BackendError> {
        let endpoint = self.url("/get_attendance/");
        let response = self.client.get(&endpoint).send().await;
        read_json(&endpoint, response).await
    }

    /// Date (`YYYY-MM-DD`) to presence for one attendee.
    #[instrument(skip(self))]
    pub async fn attendance_history(
        &self,
        name: &str,
    ) -> Result<BTreeMap<String, bool>, BackendError> {
        let endpoint = self.url_with_segment("/user_attendance_history/", name)?;
        let response = self.client.get(endpoint.clone()).send().await;
        read_json(endpoint.as_str(), response).await
    }

    #[instrument(skip(self))]
    pub async fn user_attendance(&self, name: &str) -> Result<UserAttendance, BackendError> {
        let endpoint = self.url_with_segment("/get_attendance/", name)?;
        let response = self.client.get(endpoint.clone()).send().await;
        read_json(endpoint.as_str(), response).await
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: Result<Response, reqwest::Error>,
) -> Result<T, BackendError> {
    let response = response.map_err(|source| BackendError::Request {
        endpoint: endpoint.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await.map_err(|source| BackendError::Request {
        endpoint: endpoint.to_string(),
        source,
    })?;

    serde_json::from_slice(&bytes).map_err(|e| BackendError::Malformed {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Recognizer for BackendClient {
    #[instrument(skip(self, crop), fields(width = crop.width, height = crop.height))]
    async fn recognize(&self, crop: &FaceCrop) -> Result<RecognitionResult, BackendError> {
        let endpoint = self.url("/recognize_face/");
        let response = self
            .client
            .post(&endpoint)
            .json(&RecognitionRequest {
                image_base64: &crop.image_base64,
            })
            .send()
            .await;

        let result: RecognitionResult = read_json(&endpoint, response).await?;
        if !result.confidence.is_finite() || !(0.0..=1.0).contains(&result.confidence) {
            return Err(BackendError::Malformed {
                endpoint,
                reason: format!("confidence {} outside [0, 1]", result.confidence),
            });
        }

        tracing::debug!(
            "Recognized {} with confidence {:.4}",
            result.prediction,
            result.confidence
        );
        Ok(result)
    }
}

#[async_trait]
impl RosterSource for BackendClient {
    #[instrument(skip(self))]
    async fn daily_roster(&self, date: NaiveDate) -> Result<Vec<AttendanceEntry>, BackendError> {
        let endpoint = self.url(&format!("/get_daily_attendance/{}", date.format("%Y-%m-%d")));
        let response = self.client.get(&endpoint).send().await;
        read_json(&endpoint, response).await
    }
}

/// Loads the roster with exponential backoff. Gives up with an empty roster.
pub async fn fetch_roster<S: RosterSource + ?Sized>(
    source: &S,
    date: NaiveDate,
    attempts: u32,
    initial_delay: Duration,
) -> Vec<AttendanceEntry> {
    let max_retry_delay = Duration::from_secs(2);
    let mut retry_delay = initial_delay;

    for attempt in 1..=attempts.max(1) {
        match source.daily_roster(date).await {
            Ok(entries) => {
                tracing::info!("Loaded {} roster entries for {}", entries.len(), date);
                return entries;
            }
            Err(e) => {
                tracing::warn!(
                    "Roster fetch attempt {}/{} failed: {}",
                    attempt,
                    attempts.max(1),
                    e
                );
            }
        }

        if attempt < attempts {
            let jitter = rand::random::<f32>() * 0.2 + 0.9;
            sleep(retry_delay.mul_f32(jitter)).await;
            retry_delay = (retry_delay * 2).min(max_retry_delay);
        }
    }

    tracing::error!("Could not load roster for {}, continuing with an empty roster", date);
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };
    use tokio::net::TcpListener;

    async fn spawn_backend(router: Router) -> BackendClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        BackendClient::new(&BackendConfig {
            base_url: format!("http://{}/", addr),
            request_timeout_ms: 500,
            roster_fetch_attempts: 1,
            roster_retry_delay_ms: 1,
        })
        .unwrap()
    }

    fn crop() -> FaceCrop {
        FaceCrop {
            width: 2,
            height: 2,
            image_base64: "aGVsbG8=".into(),
        }
    }

    async fn recognize_echo(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
        let image = body["image_base64"].as_str().unwrap_or_default().to_string();
        Json(serde_json::json!({ "prediction": image, "confidence": 0.995 }))
    }

    #[tokio::test]
    async fn test_recognize_posts_base64_and_parses_reply() {
        let router = Router::new().route("/recognize_face/", post(recognize_echo));
        let client = spawn_backend(router).await;

        let result = client.recognize(&crop()).await.unwrap();

        assert_eq!(result.prediction, "aGVsbG8=");
        assert_eq!(result.confidence, 0.995);
    }

    #[tokio::test]
    async fn test_recognize_non_2xx_is_status_error() {
        let router = Router::new().route(
            "/recognize_face/",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "Cannot recognize face" })),
                )
            }),
        );
        let client = spawn_backend(router).await;

        let err = client.recognize(&crop()).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_recognize_malformed_reply() {
        let router = Router::new().route(
            "/recognize_face/",
            post(|| async { Json(serde_json::json!({ "label": "Alice" })) }),
        );
        let client = spawn_backend(router).await;

        let err = client.recognize(&crop()).await.unwrap_err();
        assert!(matches!(err, BackendError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_recognize_rejects_out_of_range_confidence() {
        let router = Router::new().route(
            "/recognize_face/",
            post(|| async { Json(serde_json::json!({ "prediction": "Alice", "confidence": 99.5 })) }),
        );
        let client = spawn_backend(router).await;

        let err = client.recognize(&crop()).await.unwrap_err();
        assert!(matches!(err, BackendError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_recognize_times_out() {
        let router = Router::new().route(
            "/recognize_face/",
            post(|| async {
                sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({ "prediction": "Alice", "confidence": 0.99 }))
            }),
        );
        let client = spawn_backend(router).await;

        let err = client.recognize(&crop()).await.unwrap_err();
        assert!(matches!(err, BackendError::Request { .. }));
    }

    #[tokio::test]
    async fn test_daily_roster_uses_iso_date() {
        let router = Router::new().route(
            "/get_daily_attendance/{date}",
            get(|Path(date): Path<String>| async move {
                let name = if date == "2024-03-07" { "Alice" } else { "wrong date" };
                Json(serde_json::json!([{ "id": 1, "name": name, "status": false }]))
            }),
        );
        let client = spawn_backend(router).await;

        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let entries = client.daily_roster(date).await.unwrap();

        assert_eq!(
            entries,
            vec![AttendanceEntry {
                id: 1,
                name: "Alice".into(),
                status: false
            }]
        );
    }

    #[tokio::test]
    async fn test_fetch_roster_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/get_daily_attendance/{date}",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StatusCode::INTERNAL_SERVER_ERROR)
                    } else {
                        Ok(Json(serde_json::json!([{ "id": 7, "name": "Bob", "status": true }])))
                    }
                }
            }),
        );
        let client = spawn_backend(router).await;

        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let entries = fetch_roster(&client, date, 3, Duration::from_millis(1)).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Bob");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_roster_gives_up_with_empty_roster() {
        let router = Router::new().route(
            "/get_daily_attendance/{date}",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let client = spawn_backend(router).await;

        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let entries = fetch_roster(&client, date, 2, Duration::from_millis(1)).await;

        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_attendance_summary_and_history() {
        let router = Router::new()
            .route(
                "/get_attendance/",
                get(|| async {
                    Json(serde_json::json!({ "totalDays": 4, "attendance": { "Alice": 3, "Bob": 1 } }))
                }),
            )
            .route(
                "/user_attendance_history/{name}",
                get(|Path(name): Path<String>| async move {
                    Json(serde_json::json!({ "2024-03-06": name == "Alice", "2024-03-07": false }))
                }),
            );
        let client = spawn_backend(router).await;

        let summary = client.attendance_summary().await.unwrap();
        assert_eq!(summary.total_days, 4);
        assert_eq!(summary.attendance.get("Alice"), Some(&3));

        let history = client.attendance_history("Alice").await.unwrap();
        assert_eq!(history.get("2024-03-06"), Some(&true));
        assert_eq!(history.get("2024-03-07"), Some(&false));
    }

    #[tokio::test]
    async fn test_history_name_is_sent_as_one_encoded_segment() {
        let router = Router::new().route(
            "/user_attendance_history/{name}",
            get(|Path(name): Path<String>| async move {
                Json(BTreeMap::from([(name, true)]))
            }),
        );
        let client = spawn_backend(router).await;

        for name in ["Ann#2", "R&D?x", "Jo Ann"] {
            let history = client.attendance_history(name).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history.get(name), Some(&true), "name {:?}", name);
        }
    }

    #[tokio::test]
    async fn test_user_attendance() {
        let router = Router::new().route(
            "/get_attendance/{name}",
            get(|Path(name): Path<String>| async move {
                let present = if name == "Ann#2" { 3 } else { 0 };
                Json(serde_json::json!({ "totalDays": 5, "totalPresent": present }))
            }),
        );
        let client = spawn_backend(router).await;

        let attendance = client.user_attendance("Ann#2").await.unwrap();
        assert_eq!(
            attendance,
            UserAttendance {
                total_days: 5,
                total_present: 3
            }
        );
    }
}
