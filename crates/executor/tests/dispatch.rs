//! End-to-end dispatch tests against real `sh` subprocesses.
//!
//! # Test Coverage
//!
//! - Output far larger than a pipe buffer, with every K
//! - Peak concurrent executions never exceed K
//! - Byte-exact output for a deterministic emitter
//! - Spawn failures and non-zero exits stay local to their item
//! - Exactly one record per submitted item
//! - Two runs of the same items produce identical output
//! - Dispatch-level errors for an empty item list and a zero limit

#![cfg(unix)]

use std::collections::HashSet;
use std::time::Duration;

use executor::{DispatchConfig, Dispatcher, StderrMode};
use fanout::{
    CommandSpec, ConcurrencyLimit, DispatchError, DispatchReport, ExecutionError, StaticSource,
    WorkItem,
};
use test_case::test_case;

const DEADLINE: Duration = Duration::from_secs(120);

/// Each item is a byte count; the command emits that many bytes of a
/// repeating ten-character line.
fn emit_bytes(item: &WorkItem) -> CommandSpec {
    CommandSpec::new("sh")
        .unwrap()
        .arg("-c")
        .arg(format!("yes abcdefghi | head -c {}", item.as_str()))
}

fn expected_bytes(len: usize) -> Vec<u8> {
    b"abcdefghi\n".iter().copied().cycle().take(len).collect()
}

/// Each item is a shell script run verbatim.
fn run_script(item: &WorkItem) -> CommandSpec {
    CommandSpec::new("sh").unwrap().arg("-c").arg(item.as_str())
}

fn items<I: IntoIterator<Item = S>, S: Into<String>>(values: I) -> Vec<WorkItem> {
    values
        .into_iter()
        .map(|v| WorkItem::new(v).unwrap())
        .collect()
}

fn config(k: usize) -> DispatchConfig {
    DispatchConfig::default()
        .with_limit(ConcurrencyLimit::new(k).unwrap())
        .with_stderr(StderrMode::Capture)
}

async fn dispatch_within_deadline(dispatcher: &Dispatcher, work: Vec<WorkItem>) -> DispatchReport {
    tokio::time::timeout(DEADLINE, dispatcher.dispatch(work))
        .await
        .expect("dispatch must not hang")
        .expect("dispatch must start")
}

// ============================================================================
// Volume
// ============================================================================

#[test_case(1 ; "serial")]
#[test_case(2 ; "two")]
#[test_case(10 ; "ten")]
#[test_case(16 ; "all items at once")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_deadlock_when_output_exceeds_pipe_buffer(k: usize) {
    // 16 items of 512 KiB each: eight times a 64 KiB pipe buffer per item.
    let len = 512 * 1024;
    let work = items((0..16).map(|_| len.to_string()));
    let dispatcher = Dispatcher::new(config(k), emit_bytes);

    let report = dispatch_within_deadline(&dispatcher, work).await;

    assert_eq!(report.records.len(), 16);
    assert!(report.all_succeeded(), "failures: {:?}", report.failures().collect::<Vec<_>>());
    assert!(report.records.iter().all(|r| r.len() == len));
    assert_eq!(report.summary.total_bytes, 16 * len as u64);
}

#[tokio::test]
async fn test_small_pipe_capacity_still_drains() {
    let dispatcher = Dispatcher::new(config(2).with_pipe_capacity(1), emit_bytes);
    let report = dispatch_within_deadline(&dispatcher, items(["100000", "70000", "1"])).await;
    assert!(report.all_succeeded());
    assert_eq!(report.summary.total_bytes, 170_001);
}

// ============================================================================
// Concurrency bound
// ============================================================================

#[test_case(1 ; "one")]
#[test_case(2 ; "two")]
#[test_case(10 ; "ten")]
#[test_case(12 ; "n")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_peak_concurrency_never_exceeds_limit(k: usize) {
    let work = items((0..12).map(|i| format!("sleep 0.05; echo {i}")));
    let dispatcher = Dispatcher::new(config(k), run_script);

    let report = dispatch_within_deadline(&dispatcher, work).await;

    assert!(report.all_succeeded());
    assert!(report.summary.peak_concurrency >= 1);
    assert!(
        report.summary.peak_concurrency <= k,
        "peak {} exceeded limit {k}",
        report.summary.peak_concurrency
    );
    assert_eq!(report.summary.limit.get(), k);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_processes_observe_the_bound() {
    // Each process records itself in a shared directory while it runs and
    // reports how many others it saw.
    let dir = tempfile::tempdir().unwrap();
    let script = format!(
        "touch {d}/$$; sleep 0.1; ls {d} | wc -l; rm {d}/$$",
        d = dir.path().display()
    );
    let work = items((0..9).map(|i| format!("{script} # {i}")));
    let dispatcher = Dispatcher::new(config(3), run_script);

    let report = dispatch_within_deadline(&dispatcher, work).await;

    assert!(report.all_succeeded());
    for record in &report.records {
        let seen: usize = record.stdout_lossy().trim().parse().unwrap();
        assert!((1..=3).contains(&seen), "a process saw {seen} concurrent peers");
    }
}

// ============================================================================
// Byte-exact output
// ============================================================================

#[tokio::test]
async fn test_output_is_byte_exact() {
    let lengths = [0usize, 1, 9, 10, 65_536, 65_537, 300_000];
    let dispatcher = Dispatcher::new(config(3), emit_bytes);

    let mut report =
        dispatch_within_deadline(&dispatcher, items(lengths.iter().map(|l| l.to_string()))).await;
    report.sort_by_submission();

    for (record, len) in report.records.iter().zip(lengths) {
        assert_eq!(record.len(), len, "item {}", record.item);
        assert_eq!(record.stdout, expected_bytes(len), "item {}", record.item);
        assert_eq!(record.exit_code, Some(0));
    }
}

// ============================================================================
// Failure containment
// ============================================================================

#[tokio::test]
async fn test_failures_stay_local_to_their_item() {
    let work = items([
        "printf good-0",
        "echo before-failure; exit 7",
        "printf good-2",
        "echo problem >&2; kill -9 $$",
        "printf good-4",
    ]);
    let dispatcher = Dispatcher::new(config(2), run_script);

    let mut report = dispatch_within_deadline(&dispatcher, work).await;
    report.sort_by_submission();
    let records = &report.records;

    assert_eq!(records.len(), 5);
    assert_eq!(report.summary.failed, 2);
    for i in [0, 2, 4] {
        assert!(records[i].is_success());
        assert_eq!(records[i].stdout, format!("good-{i}").into_bytes());
    }

    assert_eq!(records[1].stdout, b"before-failure\n");
    assert_eq!(records[1].error.as_ref().and_then(ExecutionError::exit_code), Some(7));

    assert!(matches!(
        records[3].error,
        Some(ExecutionError::NonZeroExit {
            code: None,
            signal: Some(9),
            ..
        })
    ));
    assert_eq!(records[3].stderr.as_deref(), Some(&b"problem\n"[..]));
}

#[tokio::test]
async fn test_spawn_failure_does_not_hang_or_spread() {
    let work = items(["true", "missing", "true"]);
    let dispatcher = Dispatcher::new(config(1), |item: &WorkItem| {
        let program = if item.as_str() == "missing" {
            "no-such-binary-for-fanout-tests"
        } else {
            "true"
        };
        CommandSpec::new(program).unwrap()
    });

    let mut report = dispatch_within_deadline(&dispatcher, work).await;
    report.sort_by_submission();

    assert_eq!(report.records.len(), 3);
    assert!(report.records[0].is_success());
    assert!(report.records[2].is_success());
    let failed = &report.records[1];
    assert!(failed.error.as_ref().is_some_and(ExecutionError::is_spawn_failure));
    assert!(failed.started_at.is_none());
    assert!(failed.is_empty());
}

#[tokio::test]
async fn test_timeout_is_reported_per_item() {
    let dispatcher = Dispatcher::new(
        config(2).with_process_timeout(Duration::from_millis(200)),
        run_script,
    );
    let mut report =
        dispatch_within_deadline(&dispatcher, items(["exec sleep 30", "printf quick"])).await;
    report.sort_by_submission();

    assert!(matches!(
        report.records[0].error,
        Some(ExecutionError::TimedOut { .. })
    ));
    assert_eq!(report.records[1].stdout, b"quick");
}

// ============================================================================
// Completeness and idempotence
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_record_per_item() {
    let n = 40;
    // Duplicate work items are still distinct submissions.
    let work = items((0..n).map(|i| format!("printf {}", i % 10)));
    let dispatcher = Dispatcher::new(config(5), run_script);

    let report = dispatch_within_deadline(&dispatcher, work).await;

    assert_eq!(report.records.len(), n);
    let indices: HashSet<usize> = report.records.iter().map(|r| r.index).collect();
    assert_eq!(indices, (0..n).collect::<HashSet<_>>());
    for record in &report.records {
        assert_eq!(record.stdout, (record.index % 10).to_string().into_bytes());
    }
}

#[tokio::test]
async fn test_repeated_dispatch_is_identical() {
    let work = items(["1000", "200000", "77"]);
    let dispatcher = Dispatcher::new(config(2), emit_bytes);

    let mut first = dispatch_within_deadline(&dispatcher, work.clone()).await;
    let mut second = dispatch_within_deadline(&dispatcher, work).await;
    first.sort_by_submission();
    second.sort_by_submission();

    let outputs = |r: &DispatchReport| r.records.iter().map(|r| r.stdout.clone()).collect::<Vec<_>>();
    assert_eq!(outputs(&first), outputs(&second));
    assert_ne!(first.summary.dispatch_id, second.summary.dispatch_id);
}

#[tokio::test]
async fn test_streaming_consumption_sees_every_record() {
    let dispatcher = Dispatcher::new(config(2), emit_bytes);
    let (mut stream, handle) = dispatcher.start(items(["10", "20", "30"])).unwrap();

    let consume = async {
        let mut total = 0;
        while let Some(record) = stream.recv().await {
            total += record.len();
        }
        total
    };
    let (total, summary) = tokio::time::timeout(DEADLINE, async { tokio::join!(consume, handle.wait()) })
        .await
        .unwrap();

    assert_eq!(total, 60);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.total_bytes, 60);
}

#[tokio::test]
async fn test_dispatch_from_source() {
    let dispatcher = Dispatcher::new(config(2), emit_bytes);
    let source = StaticSource::new(items(["5", "6"]));
    let report = dispatcher.dispatch_from(&source).await.unwrap();
    assert_eq!(report.summary.total_bytes, 11);
}

// ============================================================================
// Dispatch-level errors
// ============================================================================

#[tokio::test]
async fn test_empty_item_list_is_a_dispatch_error() {
    let dispatcher = Dispatcher::new(config(2), run_script);
    let err = dispatcher.dispatch(Vec::new()).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoWorkItems));
}

#[test]
fn test_zero_limit_is_rejected_before_dispatch() {
    let err = ConcurrencyLimit::new(0).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidConcurrencyLimit { value: 0 }));
}
