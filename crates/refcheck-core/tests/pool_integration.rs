//! Integration tests for the [`VerificationPool`] and `check_records`.
//!
//! All lookups are mocks; no test makes an HTTP request.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use refcheck_core::lookup::mock::{MockResponse, MockSearch};
use refcheck_core::pool::{RecordJob, VerificationPool};
use refcheck_core::rate_limit::AdaptiveLimiter;
use refcheck_core::{
    CitationStyle, Config, Degradation, Lookups, ProgressEvent, RateLimiters, ReferenceRecord,
    Tier, check_records,
};
use tokio_util::sync::CancellationToken;

fn config(num_workers: usize) -> Config {
    Config {
        rate_limiters: Arc::new(RateLimiters::empty()),
        num_workers,
        ..Config::default()
    }
}

fn record(title: &str) -> ReferenceRecord {
    ReferenceRecord {
        raw_text: format!("[1] A. Author, \"{title},\" Proc. X, 2020."),
        style: CitationStyle::Ieee,
        title: Some(title.to_string()),
        doi: None,
    }
}

fn untitled(raw: &str) -> ReferenceRecord {
    ReferenceRecord {
        raw_text: raw.to_string(),
        style: CitationStyle::Unknown,
        title: None,
        doi: None,
    }
}

fn collector() -> (
    Arc<Mutex<Vec<ProgressEvent>>>,
    impl Fn(ProgressEvent) + Send + Sync + 'static,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (events, move |e| sink.lock().unwrap().push(e))
}

#[tokio::test]
async fn single_job_completes() {
    let lookups = Arc::new(Lookups::new().with_primary(Arc::new(MockSearch::new(
        "Scopus",
        MockResponse::hit("A Test Paper"),
    ))));
    let pool = VerificationPool::new(
        lookups,
        Arc::new(config(2)),
        CancellationToken::new(),
        2,
    );

    let (tx, rx) = tokio::sync::oneshot::channel();
    pool.submit(RecordJob {
        record: record("A Test Paper"),
        result_tx: tx,
        index: 0,
        total: 1,
        progress: Arc::new(|_| {}),
    })
    .await;

    let verdict = rx.await.unwrap();
    assert_eq!(verdict.tier, Tier::TitleHitPrimary);
    pool.shutdown().await;
}

#[tokio::test]
async fn results_keep_input_order() {
    // Early records are slow so later ones finish first.
    let primary = MockSearch::with_sequence(
        "Scopus",
        vec![
            MockResponse::hit("Paper zero"),
            MockResponse::hit("Paper one"),
            MockResponse::Empty,
        ],
    )
    .with_delay(Duration::from_millis(5));
    let lookups = Arc::new(Lookups::new().with_primary(Arc::new(primary)));

    let records: Vec<_> = (0..6).map(|i| record(&format!("Paper {i}"))).collect();
    let report = check_records(
        records,
        lookups,
        Arc::new(config(3)),
        |_| {},
        CancellationToken::new(),
    )
    .await;

    let titles: Vec<_> = report
        .entries
        .iter()
        .map(|v| v.record.title.clone().unwrap())
        .collect();
    assert_eq!(
        titles,
        (0..6).map(|i| format!("Paper {i}")).collect::<Vec<_>>()
    );
    assert_eq!(report.counts.total(), 6);
    assert_eq!(report.cancelled, 0);
}

#[tokio::test]
async fn unextractable_records_are_never_looked_up() {
    let primary = Arc::new(MockSearch::new("Scopus", MockResponse::Empty));
    let lookups = Arc::new(Lookups::new().with_primary(primary.clone()));

    let report = check_records(
        vec![untitled("garbled line"), record("Real title"), untitled("2020.")],
        lookups,
        Arc::new(config(2)),
        |_| {},
        CancellationToken::new(),
    )
    .await;

    assert_eq!(primary.call_count(), 1);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.unextractable.len(), 2);
    assert_eq!(report.counts.not_found, 1);
}

#[tokio::test]
async fn budgeted_capability_is_serialized() {
    let scholar = Arc::new(
        MockSearch::new("Google Scholar", MockResponse::Empty)
            .with_delay(Duration::from_millis(10))
            .budgeted(),
    );
    let lookups = Arc::new(Lookups::new().with_secondary(scholar.clone()));
    let mut limiters = RateLimiters::empty();
    limiters.insert("Google Scholar", AdaptiveLimiter::per_second(1000));
    let config = Config {
        rate_limiters: Arc::new(limiters),
        num_workers: 4,
        ..Config::default()
    };

    let records: Vec<_> = (0..8).map(|i| record(&format!("Paper {i}"))).collect();
    check_records(
        records,
        lookups,
        Arc::new(config),
        |_| {},
        CancellationToken::new(),
    )
    .await;

    assert_eq!(scholar.call_count(), 8);
    assert_eq!(scholar.max_concurrent_calls(), 1);
}

#[tokio::test]
async fn budgeted_capability_is_serialized_without_limiters() {
    let scholar = Arc::new(
        MockSearch::new("Google Scholar", MockResponse::Empty)
            .with_delay(Duration::from_millis(20))
            .budgeted(),
    );
    let lookups = Arc::new(Lookups::new().with_secondary(scholar.clone()));
    let config = Config {
        rate_limiters: Arc::new(RateLimiters::empty()),
        num_workers: 4,
        ..Config::default()
    };

    let records: Vec<_> = (0..8).map(|i| record(&format!("Paper {i}"))).collect();
    check_records(
        records,
        lookups,
        Arc::new(config),
        |_| {},
        CancellationToken::new(),
    )
    .await;

    assert_eq!(scholar.call_count(), 8);
    assert_eq!(scholar.max_concurrent_calls(), 1);
}

#[tokio::test]
async fn unbudgeted_capability_runs_concurrently() {
    let primary = Arc::new(
        MockSearch::new("Scopus", MockResponse::Empty).with_delay(Duration::from_millis(20)),
    );
    let lookups = Arc::new(Lookups::new().with_primary(primary.clone()));

    let records: Vec<_> = (0..8).map(|i| record(&format!("Paper {i}"))).collect();
    check_records(
        records,
        lookups,
        Arc::new(config(4)),
        |_| {},
        CancellationToken::new(),
    )
    .await;

    assert!(primary.max_concurrent_calls() > 1);
    assert!(primary.max_concurrent_calls() <= 4);
}

#[tokio::test]
async fn cancel_before_start_checks_nothing() {
    let primary = Arc::new(MockSearch::new("Scopus", MockResponse::Empty));
    let lookups = Arc::new(Lookups::new().with_primary(primary.clone()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let records: Vec<_> = (0..5).map(|i| record(&format!("Paper {i}"))).collect();
    let report = check_records(records, lookups, Arc::new(config(2)), |_| {}, cancel).await;

    assert!(report.entries.is_empty());
    assert_eq!(report.cancelled, 5);
    assert_eq!(primary.call_count(), 0);
}

#[tokio::test]
async fn cancel_mid_run_keeps_completed_verdicts() {
    let primary = Arc::new(MockSearch::new("Scopus", MockResponse::hit("Paper 0")));
    let lookups = Arc::new(Lookups::new().with_primary(primary.clone()));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    // One worker: the first verdict cancels the run before record 1 starts.
    let progress = move |e: ProgressEvent| {
        if matches!(e, ProgressEvent::Verdict { .. }) {
            trigger.cancel();
        }
    };

    let records: Vec<_> = (0..4).map(|i| record(&format!("Paper {i}"))).collect();
    let report = check_records(records, lookups, Arc::new(config(1)), progress, cancel).await;

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].tier, Tier::TitleHitPrimary);
    assert_eq!(report.cancelled, 3);
    assert_eq!(primary.call_count(), 1);
}

#[tokio::test]
async fn progress_events_per_record() {
    let lookups = Arc::new(Lookups::new());
    let (events, progress) = collector();

    check_records(
        vec![record("One"), record("Two")],
        lookups,
        Arc::new(config(1)),
        progress,
        CancellationToken::new(),
    )
    .await;

    let events = events.lock().unwrap();
    let checking = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Checking { total: 2, .. }))
        .count();
    let verdicts = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                ProgressEvent::Verdict {
                    tier: Tier::NotFound,
                    ..
                }
            )
        })
        .count();
    assert_eq!(checking, 2);
    assert_eq!(verdicts, 2);
}

#[tokio::test]
async fn quota_exhaustion_is_announced_once() {
    let scholar = Arc::new(MockSearch::with_sequence(
        "Google Scholar",
        vec![MockResponse::QuotaExceeded(
            "Your account has run out of searches.".into(),
        )],
    ));
    let lookups = Arc::new(
        Lookups::new()
            .with_secondary(scholar.clone())
            .with_remedial(scholar.clone()),
    );
    let (events, progress) = collector();

    let records: Vec<_> = (0..5).map(|i| record(&format!("Paper {i}"))).collect();
    let report = check_records(
        records,
        lookups.clone(),
        Arc::new(config(1)),
        progress,
        CancellationToken::new(),
    )
    .await;

    let announced = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ProgressEvent::QuotaExhausted { .. }))
        .count();
    assert_eq!(announced, 1);
    assert_eq!(scholar.call_count(), 1);
    assert!(report.quota_exhausted());
    assert!(
        report
            .entries
            .iter()
            .all(|v| v.degraded == Some(Degradation::QuotaExceeded))
    );
    assert!(lookups.quota.is_exhausted());
}

#[tokio::test]
async fn search_errors_emit_warnings() {
    let scholar = Arc::new(MockSearch::new(
        "Google Scholar",
        MockResponse::Error("connection reset".into()),
    ));
    let lookups = Arc::new(
        Lookups::new()
            .with_secondary(scholar.clone())
            .with_remedial(scholar),
    );
    let (events, progress) = collector();

    let report = check_records(
        vec![record("Only")],
        lookups,
        Arc::new(config(1)),
        progress,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(report.entries[0].tier, Tier::NotFound);
    assert!(report.search_error().unwrap().contains("connection reset"));
    let warnings = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Warning { index: 0, .. }))
        .count();
    assert_eq!(warnings, 2);
}

#[tokio::test]
async fn search_error_warning_names_the_failing_step() {
    let scholar = Arc::new(MockSearch::with_sequence(
        "Google Scholar",
        vec![
            MockResponse::Empty,
            MockResponse::Error("connection reset".into()),
        ],
    ));
    let lookups = Arc::new(
        Lookups::new()
            .with_secondary(scholar.clone())
            .with_remedial(scholar.clone()),
    );
    let (events, progress) = collector();

    check_records(
        vec![record("Only paper")],
        lookups,
        Arc::new(config(1)),
        progress,
        CancellationToken::new(),
    )
    .await;

    let messages: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Warning { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert!(messages.iter().any(|m| m.starts_with("remedial search error")));
    assert!(!messages.iter().any(|m| m.contains("remedial step skipped")));
}
