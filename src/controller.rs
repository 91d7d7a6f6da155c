//! Applies events and user actions to [`AppState`] and keeps the background
//! loops in step with the selection.

use crate::api::download::{self, DownloadOutcome, DownloadPolicy, DownloadTarget};
use crate::api::poller::{self, LogScheduler, LogTarget, PollLoop, Retarget};
use crate::app::{AppState, CaseId, DownloadProgress, TestCase, TestStatus};
use crate::diff;
use crate::events::AppEvent;
use crate::input::{self, Action, InputContext};
use crate::traits::{ArtifactSink, Backend};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Controller {
    pub state: AppState,
    backend: Arc<dyn Backend>,
    sink: Arc<dyn ArtifactSink>,
    tx: mpsc::UnboundedSender<AppEvent>,
    case_loop: Option<PollLoop>,
    logs: LogScheduler,
    download: Option<(DownloadTarget, PollLoop)>,
    download_generation: u64,
}

impl Controller {
    pub fn new(
        state: AppState,
        backend: Arc<dyn Backend>,
        sink: Arc<dyn ArtifactSink>,
        tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let timings = state.config.timings;
        let logs = LogScheduler::new(
            backend.clone(),
            tx.clone(),
            timings.log_interval,
            timings.min_loading,
        );
        Self {
            state,
            backend,
            sink,
            tx,
            case_loop: None,
            logs,
            download: None,
            download_generation: 0,
        }
    }

    /// Starts the case-list loop. Calling it again is a no-op.
    pub fn start(&mut self) {
        if self.case_loop.is_some() {
            return;
        }
        let interval = self.state.config.timings.case_interval;
        self.case_loop = Some(PollLoop::spawn(
            "case poll",
            poller::run_case_loop(self.backend.clone(), interval, self.tx.clone()),
        ));
    }

    /// Stops every loop this controller owns.
    pub fn shutdown(&mut self) {
        self.case_loop = None;
        self.logs.stop();
        self.cancel_download();
        tracing::info!("polling stopped");
    }

    pub fn is_polling_cases(&self) -> bool {
        self.case_loop.is_some()
    }

    pub fn log_target(&self) -> Option<LogTarget> {
        self.logs.target()
    }

    pub fn is_downloading(&self) -> bool {
        self.download.is_some()
    }

    pub fn download_target(&self) -> Option<DownloadTarget> {
        self.download.as_ref().map(|(target, _)| *target)
    }

    pub fn input_context(&self) -> InputContext {
        InputContext {
            has_error: self.state.error.is_some(),
            has_selection: self.state.selection().is_some(),
            downloading: self.is_downloading(),
        }
    }

    /// Changes the selection and retargets the log loop. A download for a
    /// different case is cancelled.
    pub fn select(&mut self, selection: Option<CaseId>) -> Retarget {
        let Some(generation) = self.state.set_selection(selection) else {
            return Retarget::default();
        };
        if self
            .download
            .as_ref()
            .is_some_and(|(target, _)| Some(target.case_id) != selection)
        {
            self.cancel_download();
        }
        let retarget = self.logs.retarget(selection.map(|case_id| LogTarget {
            case_id,
            generation,
        }));
        tracing::debug!(?retarget, "selection changed");
        retarget
    }

    pub fn toggle_select_at_cursor(&mut self) -> Retarget {
        let Some(case_id) = self.state.case_at_cursor().map(|c| c.id) else {
            return Retarget::default();
        };
        if self.state.selection() == Some(case_id) {
            self.select(None)
        } else {
            self.select(Some(case_id))
        }
    }

    fn ordinal(&self, case_id: CaseId) -> usize {
        self.state.case_position(case_id).map_or(0, |pos| pos + 1)
    }

    /// Resolves the selected case, surfacing a toast when there is none.
    fn selected_for_action(&mut self) -> Option<(CaseId, TestStatus)> {
        let resolved = match self.state.selected_case() {
            Ok(Some(case)) => Ok((case.id, case.status)),
            Ok(None) => Err("Select a test case first".to_string()),
            Err(e) => Err(e.to_string()),
        };
        match resolved {
            Ok(selected) => Some(selected),
            Err(msg) => {
                self.state.set_error(msg);
                None
            }
        }
    }

    pub fn start_selected(&mut self) {
        let Some((case_id, status)) = self.selected_for_action() else {
            return;
        };
        if status == TestStatus::InProgress {
            let ordinal = self.ordinal(case_id);
            self.state
                .set_error(format!("Case #{ordinal} is already running"));
            return;
        }
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        poller::spawn_monitored(self.tx.clone(), "trigger", async move {
            let event = match backend.trigger_run(case_id).await {
                Ok(()) => AppEvent::TriggerSent(case_id),
                Err(e) => {
                    tracing::error!("failed to trigger case {case_id}: {e}");
                    AppEvent::ActionFailed(format!("Failed to trigger test: {e}"))
                }
            };
            if tx.send(event).is_err() {
                tracing::warn!("trigger: channel closed");
            }
        });
    }

    pub fn reset_all(&mut self) {
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        poller::spawn_monitored(self.tx.clone(), "reset", async move {
            let event = match backend.reset_all().await {
                Ok(()) => AppEvent::ResetSent,
                Err(e) => {
                    tracing::error!("failed to reset test cases: {e}");
                    AppEvent::ActionFailed(format!("Failed to reset tests: {e}"))
                }
            };
            if tx.send(event).is_err() {
                tracing::warn!("reset: channel closed");
            }
        });
    }

    /// Starts polling for the selected case's report. Re-requesting restarts
    /// the poll.
    pub fn download_selected(&mut self) {
        let Some((case_id, status)) = self.selected_for_action() else {
            return;
        };
        if !status.has_result() {
            self.state
                .set_error("No result to download yet".to_string());
            return;
        }
        self.cancel_download();
        self.download_generation = self.download_generation.wrapping_add(1);
        let target = DownloadTarget {
            case_id,
            generation: self.download_generation,
        };

        let policy = DownloadPolicy::from(&self.state.config.timings);
        let backend = self.backend.clone();
        let sink = self.sink.clone();
        let tx = self.tx.clone();
        let task = PollLoop::spawn("report download", async move {
            let outcome =
                download::poll_for_artifact(&*backend, &*sink, target, policy, &tx).await;
            if tx
                .send(AppEvent::DownloadFinished {
                    case_id,
                    generation: target.generation,
                    outcome,
                })
                .is_err()
            {
                tracing::warn!("download: channel closed");
            }
        });
        self.download = Some((target, task));
        self.state.download = Some(DownloadProgress {
            case_id,
            attempt: 0,
            max_attempts: policy.max_attempts,
        });
    }

    pub fn cancel_download(&mut self) -> bool {
        self.state.download = None;
        self.download.take().is_some()
    }

    pub fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.state.should_quit = true,
            Action::DismissError => self.state.clear_error(),
            Action::MoveUp => self.state.move_cursor_up(),
            Action::MoveDown => self.state.move_cursor_down(),
            Action::ToggleSelect => {
                self.toggle_select_at_cursor();
            }
            Action::ClearSelection => {
                self.select(None);
            }
            Action::QuickSelect(n) => {
                if let Some(case_id) = self.state.quick_select(n) {
                    self.select(Some(case_id));
                }
            }
            Action::StartRun => self.start_selected(),
            Action::ResetAll => self.reset_all(),
            Action::Download => self.download_selected(),
            Action::CancelDownload => {
                if self.cancel_download() {
                    self.state
                        .push_notification(None, "Download cancelled".to_string());
                }
            }
            Action::ToggleLogs => {
                if self.state.selection().is_some() {
                    self.state.logs_expanded = !self.state.logs_expanded;
                }
            }
            Action::None => {}
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => {
                let action = input::map_key(key, &self.input_context());
                self.handle_action(action);
            }
            AppEvent::Tick => {
                self.state.advance_spinner();
                self.state.prune_notifications();
                self.state.prune_error();
            }
            AppEvent::CasesResult(cases) => self.apply_cases(cases),
            AppEvent::LogFetchStarted {
                case_id,
                generation,
            } => {
                self.state.begin_log_fetch(case_id, generation);
            }
            AppEvent::LogsResult {
                case_id,
                generation,
                logs,
            } => {
                if !self.state.apply_logs(case_id, generation, logs) {
                    tracing::debug!(
                        "discarding stale logs for case {case_id} (generation {generation})"
                    );
                }
            }
            AppEvent::LogFetchSettled {
                case_id,
                generation,
            } => {
                self.state.settle_log_fetch(case_id, generation);
            }
            AppEvent::TriggerSent(case_id) => {
                let ordinal = self.ordinal(case_id);
                self.state
                    .push_notification(Some(case_id), format!("Triggered case #{ordinal}"));
            }
            AppEvent::ResetSent => {
                self.state
                    .push_notification(None, "All test cases reset".to_string());
            }
            AppEvent::ActionFailed(msg) | AppEvent::Error(msg) => self.state.set_error(msg),
            AppEvent::DownloadProgress {
                case_id,
                generation,
                attempt,
            } => {
                if !self.is_current_download(case_id, generation) {
                    return;
                }
                if let Some(progress) = self.state.download.as_mut() {
                    progress.attempt = attempt;
                }
            }
            AppEvent::DownloadFinished {
                case_id,
                generation,
                outcome,
            } => {
                self.finish_download(case_id, generation, outcome);
            }
        }
    }

    fn apply_cases(&mut self, cases: Vec<TestCase>) {
        let finished = diff::detect_changes(&mut self.state, &cases);
        self.state.apply_cases(cases);

        #[cfg(feature = "desktop-notify")]
        if self.state.desktop_notify {
            for case_id in &finished {
                if let Some(case) = self.state.cases.iter().find(|c| c.id == *case_id) {
                    crate::notify::send_desktop(case);
                }
            }
        }
        #[cfg(not(feature = "desktop-notify"))]
        let _ = finished;
    }

    fn is_current_download(&self, case_id: CaseId, generation: u64) -> bool {
        self.download_target()
            == Some(DownloadTarget {
                case_id,
                generation,
            })
    }

    fn finish_download(&mut self, case_id: CaseId, generation: u64, outcome: DownloadOutcome) {
        // Events from a cancelled or superseded poll are ignored.
        if !self.is_current_download(case_id, generation) {
            tracing::debug!(
                "discarding finished download for case {case_id} (generation {generation})"
            );
            return;
        }
        self.download = None;
        self.state.download = None;

        let ordinal = self.ordinal(case_id);
        match outcome {
            DownloadOutcome::Saved(path) => self.state.push_notification(
                Some(case_id),
                format!("Report saved to {}", path.display()),
            ),
            DownloadOutcome::NotReady { attempts } => self.state.set_error(format!(
                "Report for case #{ordinal} not ready after {attempts} checks"
            )),
            DownloadOutcome::Unreachable { error, .. } => self
                .state
                .set_error(format!("Report download failed: {error}")),
            DownloadOutcome::SaveFailed(error) => self
                .state
                .set_error(format!("Could not save report: {error}")),
        }
    }
}
