//! Background polling loops.
//!
//! Every loop is owned by a [`PollLoop`], which aborts its task when dropped,
//! so a loop lives exactly as long as the value that started it. The case-list
//! loop is started once and runs until teardown. The log loop is owned by
//! [`LogScheduler`], which keeps at most one of them alive and tags every
//! result with the `(case_id, generation)` it was started for.
//!
//! Loops never touch application state. They report through the event
//! channel and the main loop decides what is still relevant.

use crate::app::CaseId;
use crate::events::AppEvent;
use crate::traits::Backend;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Consecutive case-list failures before the log level goes from debug to warn.
const FAILURE_WARN_THRESHOLD: u32 = 5;

/// An owned background task. Dropping it cancels the task.
pub struct PollLoop {
    label: &'static str,
    handle: JoinHandle<()>,
}

impl PollLoop {
    pub fn spawn<F>(label: &'static str, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!("{label}: started");
        Self {
            label,
            handle: tokio::spawn(fut),
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::debug!("{}: stopped", self.label);
    }
}

/// Runs `fut` and reports a panic through the event channel instead of losing
/// it silently.
pub fn spawn_monitored(
    tx: mpsc::UnboundedSender<AppEvent>,
    label: &'static str,
    fut: impl Future<Output = ()> + Send + 'static,
) {
    tokio::spawn(async move {
        let handle = tokio::spawn(fut);
        if let Err(join_err) = handle.await {
            if !join_err.is_panic() {
                return;
            }
            let msg = match join_err.into_panic().downcast::<String>() {
                Ok(s) => *s,
                Err(payload) => match payload.downcast::<&str>() {
                    Ok(s) => s.to_string(),
                    Err(_) => "unknown panic".to_string(),
                },
            };
            tracing::error!("{label} panicked: {msg}");
            if tx
                .send(AppEvent::Error(format!("{label} crashed: {msg}")))
                .is_err()
            {
                tracing::warn!("{label}: channel closed while reporting panic");
            }
        }
    });
}

fn ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Refreshes the whole case list every `interval`. Failures keep the previous
/// snapshot on screen and are only logged.
pub async fn run_case_loop(
    backend: Arc<dyn Backend>,
    interval: Duration,
    tx: mpsc::UnboundedSender<AppEvent>,
) {
    let mut ticker = ticker(interval);
    let mut failures: u32 = 0;

    loop {
        ticker.tick().await;
        match backend.list_cases().await {
            Ok(cases) => {
                if failures >= FAILURE_WARN_THRESHOLD {
                    tracing::info!("case list poll recovered after {failures} failures");
                }
                failures = 0;
                if tx.send(AppEvent::CasesResult(cases)).is_err() {
                    return;
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                if failures == FAILURE_WARN_THRESHOLD {
                    tracing::warn!("case list poll failing repeatedly: {e}");
                } else {
                    tracing::debug!("case list poll failed ({failures}): {e}");
                }
                if tx.is_closed() {
                    return;
                }
            }
        }
    }
}

/// Identity a log loop was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogTarget {
    pub case_id: CaseId,
    pub generation: u64,
}

/// Fetches logs for one case every `interval`. The loading window opened by
/// `LogFetchStarted` is held open for at least `min_loading`, whatever the
/// request latency.
pub async fn run_log_loop(
    backend: Arc<dyn Backend>,
    target: LogTarget,
    interval: Duration,
    min_loading: Duration,
    tx: mpsc::UnboundedSender<AppEvent>,
) {
    let LogTarget {
        case_id,
        generation,
    } = target;
    let mut ticker = ticker(interval);

    loop {
        ticker.tick().await;
        let started = Instant::now();
        if tx
            .send(AppEvent::LogFetchStarted {
                case_id,
                generation,
            })
            .is_err()
        {
            return;
        }

        match backend.fetch_logs(case_id).await {
            Ok(logs) => {
                if tx
                    .send(AppEvent::LogsResult {
                        case_id,
                        generation,
                        logs,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => tracing::debug!("log poll for case {case_id} failed: {e}"),
        }

        time::sleep_until(started + min_loading).await;
        if tx
            .send(AppEvent::LogFetchSettled {
                case_id,
                generation,
            })
            .is_err()
        {
            return;
        }
    }
}

/// What a retarget did to the log loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Retarget {
    pub cancelled: Option<LogTarget>,
    pub started: Option<LogTarget>,
}

/// Owns the single log loop.
pub struct LogScheduler {
    backend: Arc<dyn Backend>,
    tx: mpsc::UnboundedSender<AppEvent>,
    interval: Duration,
    min_loading: Duration,
    active: Option<(LogTarget, PollLoop)>,
}

impl LogScheduler {
    pub fn new(
        backend: Arc<dyn Backend>,
        tx: mpsc::UnboundedSender<AppEvent>,
        interval: Duration,
        min_loading: Duration,
    ) -> Self {
        Self {
            backend,
            tx,
            interval,
            min_loading,
            active: None,
        }
    }

    /// Cancels the running loop, then starts one for `target` if any. The old
    /// task is aborted before the new one is spawned.
    pub fn retarget(&mut self, target: Option<LogTarget>) -> Retarget {
        let cancelled = self.stop();
        let started = target.map(|target| {
            let poll = PollLoop::spawn(
                "log poll",
                run_log_loop(
                    self.backend.clone(),
                    target,
                    self.interval,
                    self.min_loading,
                    self.tx.clone(),
                ),
            );
            self.active = Some((target, poll));
            target
        });
        Retarget { cancelled, started }
    }

    pub fn stop(&mut self) -> Option<LogTarget> {
        self.active.take().map(|(target, poll)| {
            drop(poll);
            target
        })
    }

    pub fn target(&self) -> Option<LogTarget> {
        self.active.as_ref().map(|(target, _)| *target)
    }
}
