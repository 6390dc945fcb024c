//! Failure-path tests: what is withheld, what is acknowledged, and what a
//! redelivery does afterwards.

use ingest_core::{Error, FileStatus, IngestionEvent};
use integration_tests::{fixtures, setup::test_config, setup::TestContext};
use std::time::Duration;
use worker::Disposition;

/// `t1,200.0` has no valid rows: the attempt fails and the file stays pending.
#[tokio::test]
async fn test_out_of_range_only_is_empty_dataset() {
    let ctx = TestContext::new();
    let line = format!("{},200.0", fixtures::timestamp(0));
    let csv = fixtures::csv_file(&[line.as_str()]);
    ctx.files.add_pending(1, "hot.csv");
    ctx.source.publish(&fixtures::event_for(1, &csv));

    let err = ctx.consumer_worker().poll_once().await.unwrap_err();

    match err {
        Error::EmptyDataset { file_id, lines_read } => {
            assert_eq!(file_id, 1);
            assert_eq!(lines_read, 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(ctx.source.commits().is_empty());
    assert_eq!(ctx.files.get(1).unwrap().status, FileStatus::Pending);
    assert_eq!(ctx.writer.call_count(), 0);
}

/// The literal `t1,200.0` line is rejected and leaves nothing to ingest.
#[tokio::test]
async fn test_unparseable_out_of_range_line_is_empty_dataset() {
    let ctx = TestContext::new();
    let csv = fixtures::csv_file(&["t1,200.0"]);
    ctx.files.add_pending(20, "t1.csv");

    let err = ctx
        .ingestion_worker()
        .handle(&fixtures::event_for(20, &csv))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::EmptyDataset {
            file_id: 20,
            lines_read: 1
        }
    ));
    assert_eq!(ctx.files.get(20).unwrap().status, FileStatus::Pending);
    assert_eq!(ctx.files.save_count(), 0);
    assert_eq!(ctx.writer.call_count(), 0);
}

/// An empty file fails the same way.
#[tokio::test]
async fn test_empty_file_is_empty_dataset() {
    let ctx = TestContext::new();
    let csv = fixtures::csv_file(&[]);
    ctx.files.add_pending(2, "empty.csv");

    let err = ctx
        .ingestion_worker()
        .handle(&fixtures::event_for(2, &csv))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EmptyDataset { lines_read: 0, .. }));
    assert!(err.is_retryable());
    assert_eq!(ctx.files.save_count(), 0);
}

/// One failed batch withholds the ack; the redelivery purges and redoes it.
#[tokio::test]
async fn test_partial_persistence_not_acknowledged_then_recovers() {
    let ctx = TestContext::with_config(test_config(4));
    ctx.writer.fail_calls([1]);
    let csv = fixtures::generated_csv(12);
    ctx.files.add_pending(3, "flaky.csv");
    ctx.source.publish(&fixtures::event_for(3, &csv));
    let consumer = ctx.consumer_worker();

    let err = consumer.poll_once().await.unwrap_err();
    match err {
        Error::PartialPersistence {
            file_id,
            failed_batches,
            total_batches,
        } => {
            assert_eq!(file_id, 3);
            assert_eq!(failed_batches, 1);
            assert_eq!(total_batches, 3);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(ctx.source.commits().is_empty());
    assert_eq!(ctx.files.get(3).unwrap().status, FileStatus::Pending);
    assert_eq!(ctx.writer.rows_for(3), 8);

    // Redelivery: only call 1 was scripted to fail.
    let committed = consumer.poll_once().await.unwrap();
    assert_eq!(committed, 1);
    assert_eq!(ctx.source.commits(), vec![1]);
    // Only the redelivery found rows to purge.
    assert_eq!(ctx.writer.purges(), vec![3]);
    assert_eq!(ctx.writer.rows_for(3), 12);
    assert!(ctx.files.get(3).unwrap().is_completed());
}

/// A transient insert failure is absorbed by per-batch retries.
#[tokio::test]
async fn test_batch_retry_absorbs_transient_failure() {
    let mut config = test_config(10);
    config.max_batch_retries = 2;
    let ctx = TestContext::with_config(config);
    ctx.writer.fail_calls([0]);
    let csv = fixtures::generated_csv(10);
    ctx.files.add_pending(4, "retry.csv");

    let disposition = ctx
        .ingestion_worker()
        .handle(&fixtures::event_for(4, &csv))
        .await
        .unwrap();

    assert!(matches!(disposition, Disposition::Completed(_)));
    assert_eq!(ctx.writer.call_count(), 2);
    assert_eq!(ctx.writer.rows_for(4), 10);
}

/// Rows already written are not enough: a failed status save withholds the ack.
#[tokio::test]
async fn test_failed_status_save_is_not_acknowledged() {
    let ctx = TestContext::new();
    ctx.files.set_fail_saves(true);
    let csv = fixtures::readings_csv(&[1.0, 2.0, 3.0]);
    ctx.files.add_pending(5, "nosave.csv");
    ctx.source.publish(&fixtures::event_for(5, &csv));
    let consumer = ctx.consumer_worker();

    let err = consumer.poll_once().await.unwrap_err();
    assert!(matches!(err, Error::Database(_)));
    assert!(ctx.source.commits().is_empty());
    assert_eq!(ctx.files.get(5).unwrap().status, FileStatus::Pending);

    ctx.files.set_fail_saves(false);
    assert_eq!(consumer.poll_once().await.unwrap(), 1);
    assert_eq!(ctx.writer.rows_for(5), 3);
    assert_eq!(ctx.files.get(5).unwrap().median, Some(2.0));
}

/// Events after a failed one are not committed ahead of it.
#[tokio::test]
async fn test_failure_blocks_later_commits() {
    let ctx = TestContext::new();
    let bad = fixtures::csv_file(&["garbage"]);
    let good = fixtures::readings_csv(&[3.0]);
    ctx.files.add_pending(6, "bad.csv");
    ctx.files.add_pending(7, "good.csv");
    ctx.source.publish(&fixtures::event_for(6, &bad));
    ctx.source.publish(&fixtures::event_for(7, &good));

    assert!(ctx.consumer_worker().poll_once().await.is_err());

    assert_eq!(ctx.source.position(), 0);
    assert_eq!(ctx.files.get(7).unwrap().status, FileStatus::Pending);
}

/// The loop rewinds after a failure and redelivers until it succeeds.
#[tokio::test]
async fn test_consumer_loop_redelivers_after_failure() {
    let ctx = TestContext::new();
    ctx.writer.fail_calls([0]);
    let csv = fixtures::readings_csv(&[8.0, 12.0]);
    ctx.files.add_pending(8, "redeliver.csv");
    ctx.source.publish(&fixtures::event_for(8, &csv));

    let consumer = ctx.consumer_worker();
    let shutdown = ctx.shutdown_receiver();
    let handle = tokio::spawn(async move { consumer.run(shutdown).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while ctx.source.pending() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    ctx.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("consumer should stop")
        .expect("consumer task should not panic")
        .expect("consumer should exit cleanly");

    assert_eq!(ctx.source.commits(), vec![1]);
    assert!(ctx.source.rewind_count() >= 1);
    assert_eq!(ctx.writer.rows_for(8), 2);
    assert_eq!(ctx.files.get(8).unwrap().mean, Some(10.0));
}

/// Shutdown mid-file drains in-flight batches and leaves the event unacked.
#[tokio::test]
async fn test_shutdown_mid_file_leaves_pending() {
    let mut config = test_config(4);
    config.max_in_flight = 1;
    let ctx = TestContext::with_config(config);
    ctx.writer.set_delay(Some(Duration::from_millis(20)));
    let csv = fixtures::generated_csv(400);
    ctx.files.add_pending(9, "slow.csv");
    ctx.source.publish(&fixtures::event_for(9, &csv));

    let consumer = ctx.consumer_worker();
    let shutdown = ctx.shutdown_receiver();
    let handle = tokio::spawn(async move { consumer.run(shutdown).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    ctx.shutdown();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("consumer should stop within the drain window")
        .expect("consumer task should not panic")
        .expect("consumer should exit cleanly");

    assert!(ctx.source.commits().is_empty());
    assert_eq!(ctx.files.get(9).unwrap().status, FileStatus::Pending);
    assert!(ctx.writer.rows_for(9) < 400);
}

/// A hung insert cannot hold a file past shutdown once every slot is taken.
#[tokio::test]
async fn test_shutdown_with_all_slots_hung_returns_promptly() {
    let mut config = test_config(1);
    config.max_in_flight = 1;
    config.drain_timeout_ms = 500;
    let ctx = TestContext::with_config(config);
    ctx.writer.set_delay(Some(Duration::from_secs(3600)));
    let csv = fixtures::readings_csv(&[1.0, 2.0, 3.0]);
    ctx.files.add_pending(21, "hung.csv");
    let event = fixtures::event_for(21, &csv);

    let worker = ctx.ingestion_worker();
    let handle = tokio::spawn(async move { worker.handle(&event).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    ctx.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("handle should return within the drain window")
        .expect("ingestion task should not panic");

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(ctx.files.get(21).unwrap().status, FileStatus::Pending);
    assert_eq!(ctx.writer.rows_for(21), 0);
}

/// Without a shutdown, a hung insert fails the attempt after the deadline.
#[tokio::test]
async fn test_hung_insert_fails_attempt_after_deadline() {
    let mut config = test_config(1);
    config.max_in_flight = 1;
    config.drain_timeout_ms = 50;
    let ctx = TestContext::with_config(config);
    ctx.writer.set_delay(Some(Duration::from_secs(3600)));
    let csv = fixtures::readings_csv(&[1.0, 2.0, 3.0]);
    ctx.files.add_pending(22, "stuck.csv");
    ctx.source.publish(&fixtures::event_for(22, &csv));

    let err = tokio::time::timeout(Duration::from_secs(3), ctx.consumer_worker().poll_once())
        .await
        .expect("poll should return after the deadline")
        .unwrap_err();

    assert!(matches!(err, Error::PartialPersistence { file_id: 22, .. }));
    assert!(err.is_retryable());
    assert!(ctx.source.commits().is_empty());
    assert_eq!(ctx.files.get(22).unwrap().status, FileStatus::Pending);
}

/// After its redeliveries run out a failing event is committed past, so the
/// events behind it still run.
#[tokio::test]
async fn test_exhausted_event_is_dead_lettered() {
    let mut config = test_config(4);
    config.max_redeliveries = 2;
    let ctx = TestContext::with_config(config);
    let bad = fixtures::csv_file(&["garbage"]);
    let good = fixtures::readings_csv(&[3.0, 5.0]);
    ctx.files.add_pending(23, "bad.csv");
    ctx.files.add_pending(24, "good.csv");
    ctx.source.publish(&fixtures::event_for(23, &bad));
    ctx.source.publish(&fixtures::event_for(24, &good));
    let consumer = ctx.consumer_worker();

    for _ in 0..2 {
        let err = consumer.poll_once().await.unwrap_err();
        assert!(matches!(err, Error::EmptyDataset { file_id: 23, .. }));
        assert!(ctx.source.commits().is_empty());
    }

    assert_eq!(consumer.poll_once().await.unwrap(), 2);
    assert_eq!(ctx.source.commits(), vec![1, 2]);
    assert_eq!(ctx.files.get(23).unwrap().status, FileStatus::Pending);
    assert_eq!(ctx.files.get(24).unwrap().mean, Some(4.0));
}

/// The running loop moves past a poisoned event instead of rewinding forever.
#[tokio::test]
async fn test_consumer_loop_dead_letters_poisoned_event() {
    let mut config = test_config(4);
    config.max_redeliveries = 2;
    let ctx = TestContext::with_config(config);
    let bad = fixtures::csv_file(&["garbage"]);
    let good = fixtures::readings_csv(&[7.0]);
    ctx.files.add_pending(25, "poison.csv");
    ctx.files.add_pending(26, "behind.csv");
    ctx.source.publish(&fixtures::event_for(25, &bad));
    ctx.source.publish(&IngestionEvent::new(26, good.path()));

    let consumer = ctx.consumer_worker();
    let shutdown = ctx.shutdown_receiver();
    let handle = tokio::spawn(async move { consumer.run(shutdown).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while ctx.source.pending() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    ctx.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("consumer should stop")
        .expect("consumer task should not panic")
        .expect("consumer should exit cleanly");

    assert_eq!(ctx.source.position(), 2);
    assert_eq!(ctx.source.rewind_count(), 2);
    assert_eq!(ctx.files.get(25).unwrap().status, FileStatus::Pending);
    assert!(ctx.files.get(26).unwrap().is_completed());
}

fn misconfigured_store() -> Error {
    Error::config("file store misconfigured")
}

/// A terminal store error is acknowledged once and never redelivered.
#[tokio::test]
async fn test_terminal_error_is_acknowledged() {
    let ctx = TestContext::new();
    ctx.files.set_find_error(Some(misconfigured_store));
    let csv = fixtures::readings_csv(&[1.0]);
    ctx.files.add_pending(27, "terminal.csv");
    ctx.source.publish(&fixtures::event_for(27, &csv));

    assert_eq!(ctx.consumer_worker().poll_once().await.unwrap(), 1);

    assert_eq!(ctx.source.commits(), vec![1]);
    assert_eq!(ctx.source.rewind_count(), 0);
    assert_eq!(ctx.files.get(27).unwrap().status, FileStatus::Pending);
    assert_eq!(ctx.writer.call_count(), 0);
}

/// Terminal errors are not retried; attempt failures are.
#[test]
fn test_error_classification() {
    assert!(!Error::RecordNotFound(1).is_retryable());
    assert!(!Error::FileNotFound("/tmp/none.csv".into()).is_retryable());
    assert!(!Error::invalid_event("bad key").is_retryable());

    assert!(Error::EmptyDataset {
        file_id: 1,
        lines_read: 3
    }
    .is_retryable());
    assert!(Error::PartialPersistence {
        file_id: 1,
        failed_batches: 1,
        total_batches: 2
    }
    .is_retryable());
    assert!(Error::database("connection reset").is_retryable());
}
