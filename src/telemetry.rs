use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to build prometheus exporter: {0}")]
    Exporter(String),
}

pub struct Metrics {
    request_counter: Counter<u64>,
    tick_counter: Counter<u64>,
    faces_detected: Counter<u64>,
    recognition_failures: Counter<u64>,
    recognition_duration: Histogram<u64>,
    attendees_present: Gauge<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("face_attendance");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let tick_counter = meter
            .u64_counter("ticks_total")
            .with_description("Capture ticks by outcome")
            .build();

        let faces_detected = meter
            .u64_counter("faces_detected_total")
            .with_description("Faces found by the localizer")
            .build();

        let recognition_failures = meter
            .u64_counter("recognition_failures_total")
            .with_description("Faces skipped because cropping or recognition failed")
            .build();

        let boundaries = generate_boundaries((15, 30, 60, 500, 1000));

        let recognition_duration = meter
            .u64_histogram("recognition_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of the recognition stage of a tick in milliseconds")
            .build();

        let attendees_present = meter
            .u64_gauge("attendees_present")
            .with_description("Roster entries marked present")
            .build();

        Ok(Metrics {
            request_counter,
            tick_counter,
            faces_detected,
            recognition_failures,
            recognition_duration,
            attendees_present,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_tick(&self, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.tick_counter.add(1, &attributes);
    }

    pub fn record_faces(&self, detected: usize, failed: usize) {
        self.faces_detected.add(detected as u64, &[]);
        self.recognition_failures.add(failed as u64, &[]);
    }

    pub fn record_recognition_duration(&self, duration_ms: u64) {
        self.recognition_duration.record(duration_ms, &[]);
    }

    pub fn record_attendees_present(&self, present: usize) {
        self.attendees_present.record(present as u64, &[]);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 2;
    let end_step: usize = 20;
    let tail_step: usize = 100;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
