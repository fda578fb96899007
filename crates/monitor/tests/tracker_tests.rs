//! Integration tests for `BatchTracker`: submission, shared versus dual
//! polling, and cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use outreach_core::email::EmailDraft;
use outreach_core::job::JobStatus;
use outreach_core::request::GenerationRequest;
use outreach_monitor::aggregator::CommitOutcome;
use outreach_monitor::config::PollMode;
use outreach_monitor::error::{ServiceError, TrackerError};
use outreach_monitor::events::{self, MonitorEvent};
use outreach_monitor::tracker::{BatchTracker, TrackerOptions};

use common::{draft, handles, FakeSubmitter, RecordingSink, ScriptedSource};

fn options(mode: PollMode) -> TrackerOptions {
    TrackerOptions {
        mode,
        result_interval: Duration::from_millis(1000),
        ..Default::default()
    }
}

fn two_job_source() -> Arc<ScriptedSource> {
    Arc::new(
        ScriptedSource::new()
            .script(
                "job1",
                vec![
                    Ok(JobStatus::running(50.0, "Analyzing website")),
                    Ok(JobStatus::completed(draft("Acme"))),
                ],
            )
            .script("job2", vec![Ok(JobStatus::completed(draft("Globex")))]),
    )
}

async fn submit(
    submitter: &FakeSubmitter,
    target_urls: &str,
) -> Result<BatchTracker, TrackerError> {
    BatchTracker::submit(
        submitter,
        &GenerationRequest::new(1, target_urls),
        two_job_source(),
        Arc::new(RecordingSink::new()),
        events::channel(),
        TrackerOptions::default(),
    )
    .await
}

// ---------------------------------------------------------------------------
// Test: submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_request_is_rejected_before_submission() {
    let submitter = FakeSubmitter::returning(handles(1));

    let err = submit(&submitter, " , ").await.err().unwrap();
    assert_matches!(err, TrackerError::InvalidRequest(_));
    assert!(err.to_string().contains("No target URLs provided"));

    let err = submit(&submitter, "https://ok.com, not a url").await.err().unwrap();
    assert!(err.to_string().contains("Invalid URL format: not a url"));

    assert_eq!(submitter.calls(), 0);
}

#[tokio::test]
async fn submission_failure_is_surfaced() {
    let submitter = FakeSubmitter::failing(ServiceError::Rejected {
        status: 400,
        detail: "This would exceed your daily limit of 20 emails".into(),
    });

    let err = submit(&submitter, "https://a.com").await.err().unwrap();
    assert_matches!(
        err,
        TrackerError::SubmitFailed(ServiceError::Rejected { status: 400, .. })
    );
}

#[tokio::test]
async fn empty_submission_is_an_error() {
    let submitter = FakeSubmitter::returning(Vec::new());
    let err = submit(&submitter, "https://a.com").await.err().unwrap();
    assert_matches!(err, TrackerError::EmptyBatch);
    assert_eq!(submitter.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn submitted_batch_is_tracked() {
    let submitter = FakeSubmitter::returning(handles(2));
    let tracker = submit(&submitter, "https://target1.com,https://target2.com")
        .await
        .unwrap();

    assert_eq!(tracker.jobs().len(), 2);
    assert_eq!(tracker.mode(), PollMode::Shared);
    assert!(tracker.wait_until_done().await);
    assert_eq!(tracker.results().await.completed, 2);
    tracker.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: shared polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn shared_mode_collects_results_from_monitor_rounds() {
    let source = two_job_source();
    let sink = Arc::new(RecordingSink::new());
    let tx = events::channel();
    let mut rx = tx.subscribe();
    let tracker = BatchTracker::start(
        handles(2),
        source.clone(),
        sink.clone(),
        tx,
        options(PollMode::Shared),
    );

    assert!(tracker.wait_until_done().await);
    let snap = tracker.snapshot();
    assert!(snap.is_done);
    assert_eq!(snap.round, 2);

    let results = tracker.results().await;
    assert_eq!((results.completed, results.total), (2, 2));
    assert_eq!(results.get("job1").unwrap().payload.company_name(), "Acme");

    // One query per active job per round, nothing extra for results.
    assert_eq!(source.calls_for("job1"), 2);
    assert_eq!(source.calls_for("job2"), 1);

    let mut ready = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let MonitorEvent::ResultReady { job_id, .. } = event {
            ready.push(job_id);
        }
    }
    ready.sort();
    ready.dedup();
    assert_eq!(ready, vec!["job1", "job2"]);

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shared_mode_refetches_completed_job_without_draft() {
    let source = Arc::new(ScriptedSource::new().script(
        "job1",
        vec![
            Ok(JobStatus::completed(EmailDraft::default())),
            Ok(JobStatus::completed(EmailDraft::default())),
            Ok(JobStatus::completed(draft("Acme"))),
        ],
    ));
    let tracker = BatchTracker::start(
        handles(1),
        source.clone(),
        Arc::new(RecordingSink::new()),
        events::channel(),
        options(PollMode::Shared),
    );

    assert!(tracker.wait_until_done().await);
    assert_eq!(tracker.snapshot().round, 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let results = tracker.results().await;
    assert_eq!(results.completed, 1);
    assert_eq!(results.get("job1").unwrap().payload.company_name(), "Acme");
    // Monitor round at 0, then the result loop at 0 and 1000.
    assert_eq!(source.call_times_ms("job1"), vec![0, 0, 1000]);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(source.calls_for("job1"), 3);

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commit_all_commits_each_result_once() {
    let sink = Arc::new(RecordingSink::new());
    let tracker = BatchTracker::start(
        handles(2),
        two_job_source(),
        sink.clone(),
        events::channel(),
        options(PollMode::Shared),
    );
    assert!(tracker.wait_until_done().await);

    let outcomes = tracker.commit_all().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|(_, o)| matches!(o, Ok(CommitOutcome::Committed))));

    assert!(tracker.commit_all().await.is_empty());
    assert_eq!(
        tracker.commit("job1").await.unwrap(),
        CommitOutcome::AlreadyCommitted
    );
    assert_eq!(sink.calls().len(), 2);
    assert_eq!(tracker.results().await.committed(), 2);

    tracker.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: dual polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dual_mode_fetches_results_on_its_own_interval() {
    let source = Arc::new(
        ScriptedSource::new().script("job1", vec![Ok(JobStatus::running(10.0, "Analyzing website"))]),
    );
    let tracker = BatchTracker::start(
        handles(1),
        source.clone(),
        Arc::new(RecordingSink::new()),
        events::channel(),
        options(PollMode::Dual),
    );

    tokio::time::sleep(Duration::from_millis(2600)).await;

    // Monitor at 0 and 2500; the result loop at 0, 1000 and 2000.
    assert_eq!(source.call_times_ms("job1"), vec![0, 0, 1000, 2000, 2500]);
    assert!(tracker.results().await.is_empty());

    tracker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dual_mode_result_loop_stops_once_settled() {
    let source = Arc::new(
        ScriptedSource::new().script("job1", vec![Ok(JobStatus::completed(draft("Acme")))]),
    );
    let tracker = BatchTracker::start(
        handles(1),
        source.clone(),
        Arc::new(RecordingSink::new()),
        events::channel(),
        options(PollMode::Dual),
    );

    assert!(tracker.wait_until_done().await);
    assert_eq!(tracker.results().await.completed, 1);
    let calls = source.total_calls();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    // Every query happened at start; later ticks find nothing to fetch.
    assert_eq!(source.total_calls(), calls);
    assert!(source.call_times_ms("job1").iter().all(|&at| at == 0));

    tracker.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: stop()
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stop_cancels_monitor_and_result_loop() {
    let source = Arc::new(
        ScriptedSource::new().script("job1", vec![Ok(JobStatus::running(10.0, "x"))]),
    );
    let tracker = BatchTracker::start(
        handles(1),
        source.clone(),
        Arc::new(RecordingSink::new()),
        events::channel(),
        options(PollMode::Dual),
    );

    tracker.watch().wait_for(|s| s.round == 1).await.unwrap();
    tracker.stop();
    let calls = source.total_calls();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.total_calls(), calls);
    assert!(!tracker.wait_until_done().await);

    tracker.shutdown().await;
}
