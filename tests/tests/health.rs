//! Health reporting from the consumer loop.
//!
//! Runs in its own test binary because the health registry is global.

use integration_tests::{fixtures, setup::test_config, setup::TestContext};
use telemetry::{health, HealthStatus};

#[tokio::test]
async fn test_consumer_health_follows_outcomes() {
    // Keep redelivering so a dead letter cannot flip the consumer back to healthy.
    let mut config = test_config(4);
    config.max_redeliveries = u32::MAX;
    let ctx = TestContext::with_config(config);
    health().redpanda.set_healthy();
    health().clickhouse.set_healthy();

    // A file with no valid rows fails the attempt.
    let bad = fixtures::csv_file(&["garbage"]);
    ctx.files.add_pending(1, "bad.csv");
    ctx.source.publish(&fixtures::event_for(1, &bad));

    let consumer = ctx.consumer_worker();
    let shutdown = ctx.shutdown_receiver();
    let handle = tokio::spawn(async move { consumer.run(shutdown).await });

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while health().consumer.message().is_none() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    ctx.shutdown();
    handle.await.unwrap().unwrap();

    assert!(!health().consumer.is_healthy());
    assert!(health()
        .consumer
        .message()
        .is_some_and(|m| m.contains("INGEST_001")));

    let report = health().report();
    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(health().is_ready());
    assert!(report.to_json().contains("\"consumer\""));
}
