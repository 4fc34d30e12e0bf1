//! Delivery agent behaviour under scripted transport failures.
//!
//! All tests run on paused tokio time, so backoff sleeps complete instantly
//! while still being observable through `tokio::time::Instant`.

mod common;

use async_trait::async_trait;
use common::sensor_data;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use telemetry_sink::delivery::{
    BackoffConfig, DeliveryAgent, DeliveryConfig, DeliveryOutcome, MeasurementTransport,
    SensorNode,
};
use telemetry_sink::proto::SensorData;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};

/// Replays a fixed script of replies and records every measurement sent.
#[derive(Clone, Default)]
struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Result<String, Status>>>>,
    sent: Arc<Mutex<Vec<(SensorData, Instant)>>>,
}

impl ScriptedTransport {
    fn with_replies(replies: Vec<Result<String, Status>>) -> Self {
        let transport = Self::default();
        *transport.replies.lock() = replies.into();
        transport
    }

    fn sent(&self) -> Vec<(SensorData, Instant)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MeasurementTransport for ScriptedTransport {
    async fn send(&mut self, measurement: &SensorData) -> Result<String, Status> {
        self.sent.lock().push((measurement.clone(), Instant::now()));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("Received successfully".to_string()))
    }
}

// ============================================================================
// TERMINAL OUTCOMES
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_aborts_immediately() {
    let transport =
        ScriptedTransport::with_replies(vec![Err(Status::invalid_argument("bad measurement"))]);
    let mut agent = DeliveryAgent::new(transport.clone(), DeliveryConfig::default());

    let started = Instant::now();
    let report = agent.deliver(&sensor_data("s1", 4)).await;

    assert_eq!(report.attempts, 1);
    assert!(report.delays.is_empty());
    assert_eq!(Instant::now(), started);
    assert_eq!(
        report.outcome,
        DeliveryOutcome::Aborted {
            code: Code::InvalidArgument,
            message: "bad measurement".to_string(),
        }
    );
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_is_not_retried() {
    let transport =
        ScriptedTransport::with_replies(vec![Err(Status::unauthenticated("no certificate"))]);
    let mut agent = DeliveryAgent::new(transport.clone(), DeliveryConfig::default());

    let report = agent.deliver(&sensor_data("s1", 4)).await;
    assert!(matches!(
        report.outcome,
        DeliveryOutcome::Aborted {
            code: Code::Unauthenticated,
            ..
        }
    ));
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failures_exhaust_budget_without_final_sleep() {
    let replies = (0..5).map(|_| Err(Status::unavailable("sink down"))).collect();
    let transport = ScriptedTransport::with_replies(replies);
    let mut agent = DeliveryAgent::new(transport.clone(), DeliveryConfig::default());

    let started = Instant::now();
    let report = agent.deliver(&sensor_data("s1", 4)).await;
    let elapsed = Instant::now() - started;

    assert_eq!(report.attempts, 5);
    assert_eq!(report.delays.len(), 4);
    assert!(matches!(
        report.outcome,
        DeliveryOutcome::RetriesExhausted {
            last_code: Code::Unavailable,
            ..
        }
    ));

    // The clock only moved by the recorded backoff sleeps, up to the timer's
    // millisecond granularity per sleep
    let slept: Duration = report.delays.iter().sum();
    assert!(elapsed >= slept);
    assert!(elapsed <= slept + Duration::from_millis(4));

    let sent = transport.sent();
    assert_eq!(sent.len(), 5);
    assert_eq!(sent.last().map(|(_, at)| *at), Some(started + elapsed));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_grow_within_jitter_bounds() {
    let replies = (0..5).map(|_| Err(Status::resource_exhausted("slow down"))).collect();
    let transport = ScriptedTransport::with_replies(replies);
    let mut agent = DeliveryAgent::new(transport, DeliveryConfig::default());

    let report = agent.deliver(&sensor_data("s1", 4)).await;
    let backoff = BackoffConfig::default();

    for (attempt, delay) in report.delays.iter().enumerate() {
        let nominal = backoff.base_delay * 2u32.pow(attempt as u32);
        assert!(*delay >= nominal.mul_f64(0.75), "attempt {}: {:?}", attempt, delay);
        assert!(*delay <= nominal.mul_f64(1.25), "attempt {}: {:?}", attempt, delay);
    }
}

#[tokio::test(start_paused = true)]
async fn test_delays_clamped_to_ceiling() {
    let config = DeliveryConfig {
        max_attempts: 4,
        attempt_timeout: Duration::from_secs(5),
        backoff: BackoffConfig {
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(5),
            jitter: 0.25,
        },
    };
    let replies = (0..4).map(|_| Err(Status::aborted("conflict"))).collect();
    let mut agent = DeliveryAgent::new(ScriptedTransport::with_replies(replies), config);

    let report = agent.deliver(&sensor_data("s1", 4)).await;

    assert_eq!(report.delays.len(), 3);
    // 8s and 16s nominal are past the ceiling even with -25% jitter
    assert_eq!(report.delays[1], Duration::from_secs(5));
    assert_eq!(report.delays[2], Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_recovery_after_transient_failures() {
    let transport = ScriptedTransport::with_replies(vec![
        Err(Status::deadline_exceeded("slow")),
        Err(Status::internal("flush failed")),
    ]);
    let mut agent = DeliveryAgent::new(transport.clone(), DeliveryConfig::default());

    let report = agent.deliver(&sensor_data("s1", 4)).await;
    assert!(report.is_delivered());
    assert_eq!(report.attempts, 3);

    // Every attempt carries the same measurement
    let sent = transport.sent();
    assert!(sent.iter().all(|(m, _)| m == &sent[0].0));
}

// ============================================================================
// SENSOR NODE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sensor_node_ticks_until_cancelled() {
    let transport = ScriptedTransport::with_replies(vec![Err(Status::not_found("gone"))]);
    let agent = DeliveryAgent::new(transport.clone(), DeliveryConfig::default());
    let node = SensorNode::new("ticker", Duration::from_millis(500), agent);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(node.run(shutdown.clone()));

    // Ticks at 0.5s, 1.0s, 1.5s and 2.0s
    tokio::time::sleep(Duration::from_millis(2_250)).await;
    shutdown.cancel();
    let stats = handle.await.unwrap();

    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.delivered, 3);

    let sent = transport.sent();
    assert_eq!(sent.len(), 4);
    for (measurement, _) in sent {
        assert_eq!(measurement.sensor_name, "ticker");
        assert!((0..100).contains(&measurement.sensor_value));
    }
}
