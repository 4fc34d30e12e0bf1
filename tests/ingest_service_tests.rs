//! Integration tests driving `IngestService` directly, without a network.
//!
//! Tests verify:
//! - Authentication runs before admission control
//! - Quota denial and invalid requests leave the buffer untouched
//! - Persisted lines decode back to the submitted measurement
//! - Buffer failures surface as `Internal`

mod common;

use common::{sensor_data, test_key, FailingSink, SharedSink};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry_sink::grpc_server::{IngestService, ACK_MESSAGE};
use telemetry_sink::proto::telemetry_service_server::TelemetryService;
use telemetry_sink::proto::SensorData;
use telemetry_sink::rate_limit::RateLimiter;
use telemetry_sink::security::{ConnectionAuthenticator, PayloadEncryptor, RecordSealer};
use telemetry_sink::telemetry::{DurableBuffer, MeasurementRecord};
use tonic::{Code, Request};

struct Harness<W: std::io::Write> {
    service: IngestService<W>,
    limiter: Arc<RateLimiter>,
    sealer: Arc<RecordSealer>,
    buffer: Arc<DurableBuffer<W>>,
}

fn harness<W: std::io::Write>(
    sink: W,
    authenticator: ConnectionAuthenticator,
    limiter: RateLimiter,
    sealer: RecordSealer,
) -> Harness<W> {
    let limiter = Arc::new(limiter);
    let sealer = Arc::new(sealer);
    let buffer = Arc::new(DurableBuffer::with_sink(sink, 4096));
    let service = IngestService::new(
        authenticator,
        Arc::clone(&limiter),
        Arc::clone(&sealer),
        Arc::clone(&buffer),
    );
    Harness {
        service,
        limiter,
        sealer,
        buffer,
    }
}

/// A refill instant in the future keeps the bucket from refilling.
fn frozen() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

fn open_harness(sink: SharedSink) -> Harness<SharedSink> {
    harness(
        sink,
        ConnectionAuthenticator::disabled(),
        RateLimiter::new(1024 * 1024),
        RecordSealer::Plain,
    )
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn test_accepted_measurement_persisted_as_json_line() {
    let sink = SharedSink::default();
    let h = open_harness(sink.clone());

    let response = h
        .service
        .send_sensor_data(Request::new(sensor_data("boiler-1", 73)))
        .await
        .unwrap();
    assert_eq!(response.into_inner().message, ACK_MESSAGE);

    h.buffer.close().unwrap();
    let lines = sink.lines();
    assert_eq!(lines.len(), 1);

    let json: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(json["sensor_name"], "boiler-1");
    assert_eq!(json["sensor_value"], 73);
    assert!(json["timestamp"].is_string());
    assert!(json["data_time"].is_string());
}

#[tokio::test]
async fn test_encrypted_persistence_decodes_back() {
    let sink = SharedSink::default();
    let encryptor = PayloadEncryptor::new(&test_key()).unwrap();
    let h = harness(
        sink.clone(),
        ConnectionAuthenticator::disabled(),
        RateLimiter::new(1024 * 1024),
        RecordSealer::Encrypted(encryptor),
    );

    for value in [1, 2, 3] {
        h.service
            .send_sensor_data(Request::new(sensor_data("vault", value)))
            .await
            .unwrap();
    }
    h.buffer.close().unwrap();

    let lines = sink.lines();
    assert_eq!(lines.len(), 3);
    for (line, expected) in lines.iter().zip([1, 2, 3]) {
        assert!(!line.contains("vault"), "plaintext leaked: {}", line);

        let json = h.sealer.open_line(line.as_bytes()).unwrap();
        let record = MeasurementRecord::from_json(&json).unwrap();
        assert_eq!(record.producer(), "vault");
        assert_eq!(record.value(), expected);
    }
}

// ============================================================================
// PIPELINE ORDER
// ============================================================================

#[tokio::test]
async fn test_authentication_precedes_admission() {
    let sink = SharedSink::default();
    let h = harness(
        sink.clone(),
        ConnectionAuthenticator::new(true),
        RateLimiter::with_state(100, 100, Instant::now()),
        RecordSealer::Plain,
    );

    // A plain request carries no handshake information
    let status = h
        .service
        .send_sensor_data(Request::new(sensor_data("intruder", 1)))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(h.limiter.snapshot().available, 100);
    assert_eq!(h.buffer.stats().pending_bytes, 0);
}

#[tokio::test]
async fn test_invalid_request_consumes_no_quota() {
    let sink = SharedSink::default();
    let h = harness(
        sink.clone(),
        ConnectionAuthenticator::disabled(),
        RateLimiter::with_state(1_000, 1_000, Instant::now()),
        RecordSealer::Plain,
    );

    let missing_timestamp = SensorData {
        sensor_name: "s".to_string(),
        sensor_value: 1,
        timestamp: None,
    };
    let status = h
        .service
        .send_sensor_data(Request::new(missing_timestamp))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = h
        .service
        .send_sensor_data(Request::new(sensor_data("", 1)))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    assert_eq!(h.limiter.snapshot().available, 1_000);
    assert_eq!(h.buffer.stats().pending_bytes, 0);
}

#[tokio::test]
async fn test_quota_denial_leaves_buffer_untouched() {
    let sink = SharedSink::default();
    let h = harness(
        sink.clone(),
        ConnectionAuthenticator::disabled(),
        RateLimiter::with_state(1, 0, frozen()),
        RecordSealer::Plain,
    );

    let status = h
        .service
        .send_sensor_data(Request::new(sensor_data("chatty", 5)))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::ResourceExhausted);
    assert_eq!(status.message(), "rate limit exceeded");
    let stats = h.buffer.stats();
    assert_eq!(stats.pending_bytes, 0);
    assert_eq!(stats.flushes, 0);
    assert!(sink.contents().is_empty());
}

#[tokio::test]
async fn test_quota_charged_by_encoded_request_size() {
    use prost::Message;

    let data = sensor_data("metered", 9);
    let size = data.encoded_len() as i64;

    let h = harness(
        SharedSink::default(),
        ConnectionAuthenticator::disabled(),
        RateLimiter::with_state(size as u64, size, frozen()),
        RecordSealer::Plain,
    );

    h.service
        .send_sensor_data(Request::new(data.clone()))
        .await
        .unwrap();
    assert_eq!(h.limiter.snapshot().available, 0);

    let status = h
        .service
        .send_sensor_data(Request::new(data))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::ResourceExhausted);
}

// ============================================================================
// DURABILITY FAILURES
// ============================================================================

#[tokio::test]
async fn test_forced_flush_failure_is_internal() {
    let sink = FailingSink::broken();
    let limiter = RateLimiter::new(1024 * 1024);
    let buffer = Arc::new(DurableBuffer::with_sink(sink.clone(), 64));
    let service = IngestService::new(
        ConnectionAuthenticator::disabled(),
        Arc::new(limiter),
        Arc::new(RecordSealer::Plain),
        Arc::clone(&buffer),
    );

    // Nothing is pending for the first record; the second forces a flush that fails
    service
        .send_sensor_data(Request::new(sensor_data("a", 1)))
        .await
        .unwrap();
    let pending = buffer.stats().pending_bytes;

    let status = service
        .send_sensor_data(Request::new(sensor_data("b", 2)))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(buffer.stats().pending_bytes, pending);

    sink.repair();
    buffer.close().unwrap();
    let lines = sink.inner.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("\"sensor_name\":\"a\""));
}
