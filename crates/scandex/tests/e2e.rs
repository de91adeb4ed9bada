//! End-to-end pipeline tests: real coordinator, worker pool, stage tree,
//! and index store; only the recognition engine is scripted.

mod common;

use std::time::Duration;

use common::harness::{Step, TestHarness, ACCOUNT_ONLY_TEXT, FULL_TEXT};

const DEADLINE: Duration = Duration::from_secs(10);

#[test]
fn test_document_with_all_fields_is_fully_indexed() {
    let harness = TestHarness::new();
    harness.engine.script("scan1.pdf", vec![Step::Text(FULL_TEXT)]);
    harness.drop_file("scan1.pdf");

    let pipeline = harness.start();
    assert!(
        harness.wait_until(DEADLINE, || harness.fully_indexed_files() == ["scan1.pdf"]),
        "document should reach fully_indexed"
    );
    let summary = pipeline.stop();

    assert_eq!(summary.fully_indexed, 1);
    assert_eq!(summary.failed, 0);
    assert!(harness.scan_files().is_empty());

    let record = harness.find_record("scan1.pdf").expect("record missing");
    assert_eq!(record.client_name, "Jane Doe");
    assert_eq!(record.account_number, "00012345");
    assert!(record.filepath.ends_with("fully_indexed/scan1.pdf"));
    assert_eq!(harness.record_count(), 1);
}

#[test]
fn test_account_only_document_is_partially_indexed() {
    let harness = TestHarness::new();
    harness
        .engine
        .script("letter.pdf", vec![Step::Text(ACCOUNT_ONLY_TEXT)]);
    harness.drop_file("letter.pdf");

    let pipeline = harness.start();
    assert!(
        harness.wait_until(DEADLINE, || {
            harness.partially_indexed_files() == ["letter.pdf"]
        }),
        "document should reach partially_indexed"
    );
    let summary = pipeline.stop();

    assert_eq!(summary.partially_indexed, 1);
    assert!(harness.fully_indexed_files().is_empty());

    // The found field is stored; the missing one is stored empty.
    let record = harness.find_record("letter.pdf").expect("record missing");
    assert_eq!(record.account_number, "00012345");
    assert_eq!(record.client_name, "");
}

#[test]
fn test_unreadable_document_fails_after_attempt_budget() {
    let harness = TestHarness::new();
    harness.engine.script("blank.pdf", vec![Step::Empty]);
    harness.drop_file("blank.pdf");

    let pipeline = harness.start();
    assert!(
        harness.wait_until(DEADLINE, || harness.failed_files() == ["blank.pdf"]),
        "document should reach failed after exhausting attempts"
    );
    let summary = pipeline.stop();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retries_scheduled, 2);
    assert_eq!(harness.engine.calls("blank.pdf"), 3);
    assert!(harness.scan_files().is_empty());
    // Failed documents get no index record.
    assert_eq!(harness.record_count(), 0);
}

#[test]
fn test_transient_engine_failure_is_retried() {
    let harness = TestHarness::new();
    harness.engine.script(
        "flaky.pdf",
        vec![
            Step::EngineFailure("tesseract terminated unexpectedly"),
            Step::Text(FULL_TEXT),
        ],
    );
    harness.drop_file("flaky.pdf");

    let pipeline = harness.start();
    assert!(
        harness.wait_until(DEADLINE, || harness.fully_indexed_files() == ["flaky.pdf"]),
        "document should succeed on the second attempt"
    );
    let summary = pipeline.stop();

    assert_eq!(summary.fully_indexed, 1);
    assert_eq!(summary.retries_scheduled, 1);
    assert_eq!(harness.engine.calls("flaky.pdf"), 2);
    assert_eq!(harness.record_count(), 1);
}

#[test]
fn test_filename_collision_gets_suffixed_name() {
    let harness = TestHarness::new();
    let pipeline = harness.start();

    // Two distinct uploads arriving under the same name.
    harness.drop_file("scan.pdf");
    assert!(harness.wait_until(DEADLINE, || {
        harness.fully_indexed_files() == ["scan.pdf"]
    }));

    harness.drop_file("scan.pdf");
    assert!(
        harness.wait_until(DEADLINE, || {
            harness.fully_indexed_files() == ["scan.pdf", "scan_2.pdf"]
        }),
        "second upload should land under a suffixed name"
    );
    pipeline.stop();

    // Two stored names, two records, neither overwritten.
    assert_eq!(harness.record_count(), 2);
    let first = harness.find_record("scan.pdf").expect("first record missing");
    let second = harness.find_record("scan_2.pdf").expect("second record missing");
    assert!(first.filepath.ends_with("fully_indexed/scan.pdf"));
    assert!(second.filepath.ends_with("fully_indexed/scan_2.pdf"));
}

#[test]
fn test_batch_larger_than_worker_pool() {
    let harness = TestHarness::new();
    let names: Vec<String> = (0..8).map(|i| format!("batch{i}.pdf")).collect();
    for name in &names {
        harness.drop_file(name);
    }

    let pipeline = harness.start();
    assert!(
        harness.wait_until(DEADLINE, || {
            harness.fully_indexed_files().len() == names.len()
        }),
        "all documents should be routed"
    );
    let summary = pipeline.stop();

    assert_eq!(summary.fully_indexed, 8);
    assert!(harness.scan_files().is_empty());
    // One record per document, even with more files than workers.
    assert_eq!(harness.record_count(), 8);
    for name in &names {
        assert_eq!(harness.engine.calls(name), 1);
    }
}

#[test]
fn test_unsupported_files_are_ignored() {
    let harness = TestHarness::new();
    harness.drop_file("notes.txt");
    harness.drop_file("scan1.pdf");

    let pipeline = harness.start();
    assert!(
        harness.wait_until(DEADLINE, || harness.fully_indexed_files() == ["scan1.pdf"]),
        "supported document should be processed"
    );
    let summary = pipeline.stop();

    assert_eq!(summary.fully_indexed, 1);
    // The unsupported file stays in intake untouched.
    assert_eq!(harness.scan_files(), ["notes.txt"]);
    assert_eq!(harness.engine.calls("notes.txt"), 0);
}

#[test]
fn test_restart_is_idempotent_for_routed_documents() {
    let harness = TestHarness::new();
    harness.drop_file("scan1.pdf");

    let pipeline = harness.start();
    assert!(harness.wait_until(DEADLINE, || harness.fully_indexed_files() == ["scan1.pdf"]));
    pipeline.stop();
    assert_eq!(harness.record_count(), 1);

    // Second run over the same tree and store: nothing left in intake, so
    // nothing is reprocessed.
    let pipeline = harness.start();
    harness.drop_file("scan2.pdf");
    assert!(harness.wait_until(DEADLINE, || {
        harness.fully_indexed_files() == ["scan1.pdf", "scan2.pdf"]
    }));
    pipeline.stop();

    assert_eq!(harness.engine.calls("scan1.pdf"), 1);
    assert_eq!(harness.record_count(), 2);
}

#[test]
fn test_restart_picks_up_documents_left_in_intake() {
    let mut harness = TestHarness::new();
    // First run: the settle interval is far longer than the run, so the
    // dropped file is never dispatched.
    harness.config.process_delay_secs = 3600.0;

    let pipeline = harness.start();
    harness.drop_file("late.pdf");
    std::thread::sleep(Duration::from_millis(200));
    let summary = pipeline.stop();
    assert_eq!(summary.fully_indexed, 0);
    assert_eq!(harness.scan_files(), ["late.pdf"]);

    // Restart with a normal settle interval: the rescan finds the file.
    harness.config.process_delay_secs = 0.0;
    let pipeline = harness.start();
    assert!(
        harness.wait_until(DEADLINE, || harness.fully_indexed_files() == ["late.pdf"]),
        "intake leftovers should be processed after restart"
    );
    pipeline.stop();
    assert_eq!(harness.record_count(), 1);
}

#[test]
fn test_submit_now_skips_the_settle_wait() {
    let mut harness = TestHarness::new();
    harness.config.process_delay_secs = 3600.0;

    let pipeline = harness.start();
    let path = harness.drop_file("upload.pdf");
    pipeline.handle.submit_now(path).unwrap();

    assert!(
        harness.wait_until(DEADLINE, || harness.fully_indexed_files() == ["upload.pdf"]),
        "announced upload should be processed immediately"
    );
    let summary = pipeline.stop();
    assert_eq!(summary.fully_indexed, 1);
}
