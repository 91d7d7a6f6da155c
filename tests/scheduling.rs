//! Loop lifecycle tests. All of them run on paused time, so intervals and
//! latencies are exact.


use fixtures::*;
use std::sync::Arc;
use std::time::Duration;
use tcw::api::download::{self, DownloadOutcome, DownloadPolicy, DownloadTarget};
use tcw::api::poller::LogTarget;
use tcw::app::{LogKind, PollTimings, TestCase, TestStatus};
use tcw::controller::Controller;
use tcw::events::AppEvent;
use tcw::traits::{ArtifactSink, Backend};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

struct Harness {
    controller: Controller,
    rx: mpsc::UnboundedReceiver<AppEvent>,
    backend: Arc<FakeBackend>,
    sink: Arc<CountingSink>,
}

impl Harness {
    fn new(cases: Vec<TestCase>) -> Self {
        Self::with_timings(cases, PollTimings::default())
    }

    fn with_timings(cases: Vec<TestCase>, timings: PollTimings) -> Self {
        let backend = Arc::new(FakeBackend::with_cases(cases.clone()));
        let sink = Arc::new(CountingSink::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = make_state_with(timings);
        state.apply_cases(cases);
        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let dyn_sink: Arc<dyn ArtifactSink> = sink.clone();
        Self {
            controller: Controller::new(state, dyn_backend, dyn_sink, tx),
            rx,
            backend,
            sink,
        }
    }

    /// Feeds events to the controller until one matches.
    async fn pump_until(&mut self, pred: impl Fn(&AppEvent) -> bool) -> Instant {
        loop {
            let event = self.rx.recv().await.expect("channel open");
            let hit = pred(&event);
            self.controller.handle_event(event);
            if hit {
                return Instant::now();
            }
        }
    }

    /// Next event within `within`, or `None` if nothing arrived.
    async fn next_within(&mut self, within: Duration) -> Option<AppEvent> {
        time::timeout(within, self.rx.recv()).await.ok().flatten()
    }
}

fn cases() -> Vec<TestCase> {
    vec![
        case(1, TestStatus::Success),
        case(2, TestStatus::Todo),
        case(3, TestStatus::Failed),
    ]
}

// ========== Case list loop ==========

#[tokio::test(start_paused = true)]
async fn case_loop_replaces_snapshot_and_keeps_it_on_failure() {
    let mut h = Harness::new(Vec::new());
    *h.backend.cases.lock().unwrap() = cases();
    h.controller.start();
    h.controller.start();
    assert!(h.controller.is_polling_cases());

    h.pump_until(|e| matches!(e, AppEvent::CasesResult(_))).await;
    assert_eq!(h.controller.state.cases, cases());

    h.backend.set_failing(true);
    assert!(h.next_within(Duration::from_secs(5)).await.is_none());
    assert_eq!(h.controller.state.cases, cases());

    h.backend.set_failing(false);
    h.backend.cases.lock().unwrap()[1].status = TestStatus::InProgress;
    h.pump_until(|e| matches!(e, AppEvent::CasesResult(_))).await;
    assert_eq!(h.controller.state.cases[1].status, TestStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn case_loop_ticks_once_per_interval() {
    let mut h = Harness::new(cases());
    h.controller.start();

    let first = h.pump_until(|e| matches!(e, AppEvent::CasesResult(_))).await;
    let second = h.pump_until(|e| matches!(e, AppEvent::CasesResult(_))).await;

    assert_eq!(second - first, Duration::from_millis(1000));
}

// ========== Log loop ==========

#[tokio::test(start_paused = true)]
async fn retarget_cancels_exactly_once_and_starts_exactly_once() {
    let mut h = Harness::new(cases());

    let first = h.controller.select(Some(1));
    assert_eq!(first.cancelled, None);
    let a = first.started.unwrap();
    assert_eq!(a.case_id, 1);

    let second = h.controller.select(Some(2));
    assert_eq!(second.cancelled, Some(a));
    let b = second.started.unwrap();
    assert_eq!(b.case_id, 2);
    assert!(b.generation > a.generation);
    assert_eq!(h.controller.log_target(), Some(b));

    // Re-selecting the same case is a no-op.
    let same = h.controller.select(Some(2));
    assert_eq!(same.cancelled, None);
    assert_eq!(same.started, None);

    let cleared = h.controller.select(None);
    assert_eq!(cleared.cancelled, Some(b));
    assert_eq!(cleared.started, None);
    assert!(h.controller.log_target().is_none());
}

#[tokio::test(start_paused = true)]
async fn log_loop_fetches_immediately_then_every_interval() {
    let mut h = Harness::new(cases());
    let selected_at = Instant::now();
    h.controller.select(Some(1));

    h.pump_until(|e| matches!(e, AppEvent::LogFetchSettled { .. }))
        .await;
    h.pump_until(|e| matches!(e, AppEvent::LogFetchSettled { .. }))
        .await;

    let fetches = h.backend.log_fetches.lock().unwrap().clone();
    assert_eq!(fetches.len(), 2);
    assert_eq!(fetches[0], (1, selected_at));
    assert_eq!(fetches[1].1 - fetches[0].1, Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn old_case_is_not_fetched_after_retarget() {
    let mut h = Harness::new(cases());
    h.controller.select(Some(1));
    h.pump_until(|e| matches!(e, AppEvent::LogFetchSettled { .. }))
        .await;

    h.controller.select(Some(2));
    h.pump_until(|e| matches!(e, AppEvent::LogFetchSettled { case_id: 2, .. }))
        .await;
    h.pump_until(|e| matches!(e, AppEvent::LogFetchSettled { case_id: 2, .. }))
        .await;

    let fetches = h.backend.log_fetches.lock().unwrap().clone();
    let for_one = fetches.iter().filter(|(id, _)| *id == 1).count();
    assert_eq!(for_one, 1);
}

#[tokio::test(start_paused = true)]
async fn stale_log_result_is_discarded() {
    let mut h = Harness::new(cases());
    h.backend.set_logs(1, vec![log("from case 1", LogKind::Info)]);
    let a = h.controller.select(Some(1)).started.unwrap();
    let b = h.controller.select(Some(2)).started.unwrap();

    // A response for the previous selection arriving late.
    h.controller.handle_event(AppEvent::LogsResult {
        case_id: a.case_id,
        generation: a.generation,
        logs: vec![log("from case 1", LogKind::Info)],
    });
    h.controller.handle_event(AppEvent::LogFetchStarted {
        case_id: a.case_id,
        generation: a.generation,
    });

    assert!(!h.controller.state.log_cache.contains_key(&1));
    assert!(!h.controller.state.is_loading());
    assert_eq!(
        h.controller.log_target(),
        Some(LogTarget {
            case_id: 2,
            generation: b.generation,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn loading_lasts_at_least_minimum_on_fast_fetch() {
    let mut h = Harness::new(cases());
    h.backend.set_log_latency(Duration::from_millis(10));
    h.backend
        .set_logs(3, vec![log("Upload rejected", LogKind::Error)]);
    h.controller.select(Some(3));

    let started = h
        .pump_until(|e| matches!(e, AppEvent::LogFetchStarted { .. }))
        .await;
    assert!(h.controller.state.is_loading());

    let arrived = h
        .pump_until(|e| matches!(e, AppEvent::LogsResult { .. }))
        .await;
    assert_eq!(arrived - started, Duration::from_millis(10));
    assert!(h.controller.state.is_loading());
    assert_eq!(h.controller.state.log_cache[&3].len(), 1);

    let settled = h
        .pump_until(|e| matches!(e, AppEvent::LogFetchSettled { .. }))
        .await;
    assert!(settled - started >= Duration::from_millis(500));
    assert!(!h.controller.state.is_loading());
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_settles_when_it_completes() {
    let mut h = Harness::new(cases());
    h.backend.set_log_latency(Duration::from_millis(800));
    h.controller.select(Some(1));

    let started = h
        .pump_until(|e| matches!(e, AppEvent::LogFetchStarted { .. }))
        .await;
    let settled = h
        .pump_until(|e| matches!(e, AppEvent::LogFetchSettled { .. }))
        .await;

    assert_eq!(settled - started, Duration::from_millis(800));
}

#[tokio::test(start_paused = true)]
async fn failed_log_fetch_keeps_previous_logs() {
    let mut h = Harness::new(cases());
    h.backend.set_logs(1, vec![log("first", LogKind::Info)]);
    h.controller.select(Some(1));
    h.pump_until(|e| matches!(e, AppEvent::LogFetchSettled { .. }))
        .await;

    h.backend.set_failing(true);
    h.pump_until(|e| matches!(e, AppEvent::LogFetchSettled { .. }))
        .await;

    assert_eq!(h.controller.state.log_cache[&1].len(), 1);
    assert!(h.controller.state.error_message().is_none());
}

// ========== Report download ==========

#[tokio::test(start_paused = true)]
async fn download_polls_until_ready_then_saves_once() {
    let mut h = Harness::new(cases());
    h.backend
        .script_probes(&[Probe::NotReady, Probe::NotReady, Probe::Ready]);
    h.controller.select(Some(1));
    h.controller.download_selected();
    assert!(h.controller.is_downloading());

    h.pump_until(|e| matches!(e, AppEvent::DownloadFinished { .. }))
        .await;

    let times = h.backend.probe_times.lock().unwrap().clone();
    assert_eq!(times.len(), 3);
    assert_eq!(times[1] - times[0], Duration::from_millis(1000));
    assert_eq!(times[2] - times[1], Duration::from_millis(1000));
    assert_eq!(h.sink.count(), 1);
    assert!(!h.controller.is_downloading());
    assert!(h.controller.state.download.is_none());
    assert_eq!(
        h.controller.state.notifications.last().map(|n| n.message.as_str()),
        Some("Report saved to test-report-1.csv")
    );

    // No further probes once saved.
    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.backend.probe_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn download_gives_up_after_attempt_limit() {
    let timings = PollTimings {
        download_attempts: 3,
        ..PollTimings::default()
    };
    let mut h = Harness::with_timings(cases(), timings);
    h.controller.select(Some(3));
    h.controller.download_selected();

    h.pump_until(|e| matches!(e, AppEvent::DownloadFinished { .. }))
        .await;

    assert_eq!(h.backend.probe_count(), 3);
    assert_eq!(h.sink.count(), 0);
    assert_eq!(
        h.controller.state.error_message(),
        Some("Report for case #3 not ready after 3 checks")
    );
}

#[tokio::test(start_paused = true)]
async fn download_stops_when_backend_unreachable() {
    let mut h = Harness::new(cases());
    *h.backend.probe_default.lock().unwrap() = Some(Probe::Down);
    h.controller.select(Some(1));
    h.controller.download_selected();

    h.pump_until(|e| matches!(e, AppEvent::DownloadFinished { .. }))
        .await;

    assert_eq!(h.backend.probe_count(), 5);
    assert!(h
        .controller
        .state
        .error_message()
        .is_some_and(|m| m.starts_with("Report download failed")));
}

#[tokio::test(start_paused = true)]
async fn not_ready_answer_resets_transport_failure_count() {
    let backend = FakeBackend::default();
    backend.script_probes(&[
        Probe::Down,
        Probe::Down,
        Probe::NotReady,
        Probe::Down,
        Probe::Down,
        Probe::Ready,
    ]);
    let sink = CountingSink::default();
    let (tx, _rx) = mpsc::unbounded_channel();
    let policy = DownloadPolicy {
        interval: Duration::from_millis(100),
        max_attempts: 0,
        max_transport_failures: 3,
    };

    let target = DownloadTarget {
        case_id: 9,
        generation: 1,
    };

    let outcome = download::poll_for_artifact(&backend, &sink, target, policy, &tx).await;

    assert_eq!(
        outcome,
        DownloadOutcome::Saved("test-report-9.csv".into())
    );
    assert_eq!(backend.probe_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn selecting_another_case_cancels_download() {
    let mut h = Harness::new(cases());
    h.controller.select(Some(1));
    h.controller.download_selected();
    h.pump_until(|e| matches!(e, AppEvent::DownloadProgress { .. }))
        .await;

    h.controller.select(Some(3));

    assert!(!h.controller.is_downloading());
    assert!(h.controller.state.download.is_none());
    let probes = h.backend.probe_count();
    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.backend.probe_count(), probes);
}

#[tokio::test(start_paused = true)]
async fn cancelled_download_finish_is_ignored() {
    let mut h = Harness::new(cases());
    h.controller.select(Some(1));
    h.controller.download_selected();
    let target = h.controller.download_target().unwrap();
    h.controller.cancel_download();

    h.controller.handle_event(AppEvent::DownloadFinished {
        case_id: target.case_id,
        generation: target.generation,
        outcome: DownloadOutcome::NotReady { attempts: 1 },
    });

    assert!(h.controller.state.error_message().is_none());
}

#[tokio::test(start_paused = true)]
async fn superseded_download_events_do_not_touch_the_new_one() {
    let mut h = Harness::new(cases());
    h.backend.script_probes(&[Probe::Ready]);
    h.controller.select(Some(1));
    h.controller.download_selected();
    let first = h.controller.download_target().unwrap();
    h.controller.download_selected();
    let second = h.controller.download_target().unwrap();
    assert_eq!(first.case_id, second.case_id);
    assert_ne!(first.generation, second.generation);

    // Events the first poll queued before it was cancelled.
    h.controller.handle_event(AppEvent::DownloadProgress {
        case_id: 1,
        generation: first.generation,
        attempt: 7,
    });
    h.controller.handle_event(AppEvent::DownloadFinished {
        case_id: 1,
        generation: first.generation,
        outcome: DownloadOutcome::NotReady { attempts: 7 },
    });

    assert!(h.controller.is_downloading());
    assert_eq!(h.controller.download_target(), Some(second));
    assert_eq!(h.controller.state.download.map(|p| p.attempt), Some(0));
    assert!(h.controller.state.error_message().is_none());

    h.pump_until(|e| matches!(e, AppEvent::DownloadFinished { .. }))
        .await;
    assert_eq!(h.sink.count(), 1);
    assert!(!h.controller.is_downloading());
    assert_eq!(
        h.controller.state.notifications.last().map(|n| n.message.as_str()),
        Some("Report saved to test-report-1.csv")
    );
}

// ========== Teardown ==========

#[tokio::test(start_paused = true)]
async fn shutdown_stops_every_loop() {
    let mut h = Harness::new(cases());
    h.controller.start();
    h.controller.select(Some(1));
    h.controller.download_selected();
    h.pump_until(|e| matches!(e, AppEvent::CasesResult(_))).await;

    h.controller.shutdown();
    assert!(!h.controller.is_polling_cases());
    assert!(h.controller.log_target().is_none());
    assert!(!h.controller.is_downloading());

    // Let aborted tasks unwind, then drop anything already queued.
    time::sleep(Duration::from_millis(1)).await;
    while h.rx.try_recv().is_ok() {}
    let fetches = h.backend.log_fetches.lock().unwrap().len();
    let probes = h.backend.probe_count();

    assert!(h.next_within(Duration::from_secs(10)).await.is_none());
    assert_eq!(h.backend.log_fetches.lock().unwrap().len(), fetches);
    assert_eq!(h.backend.probe_count(), probes);
}
