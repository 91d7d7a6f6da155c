use crate::error::SelectionError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

// Polling intervals (milliseconds)
pub const CASE_POLL_INTERVAL_MS: u64 = 1000;
pub const LOG_POLL_INTERVAL_MS: u64 = 1000;
pub const LOG_MIN_LOADING_MS: u64 = 500;
pub const DOWNLOAD_POLL_INTERVAL_MS: u64 = 1000;
pub const DOWNLOAD_MAX_ATTEMPTS: u32 = 120;
pub const DOWNLOAD_MAX_TRANSPORT_FAILURES: u32 = 5;

// UI constants
pub const NOTIFICATION_TTL_SECS: u64 = 5;
pub const ERROR_TTL_SECS: u64 = 10;
pub const QUICK_SELECT_MAX: usize = 9;
pub const NARROW_WIDTH_THRESHOLD: u16 = 60;
pub const COLLAPSED_LOG_LINES: usize = 12;

/// Backend identity of a test case. Also the ordinal used in API paths.
pub type CaseId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    Todo,
    InProgress,
    Success,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TestStatus {
    /// A finished run leaves a downloadable report behind.
    pub fn has_result(self) -> bool {
        matches!(self, TestStatus::Success | TestStatus::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            TestStatus::Todo => "todo",
            TestStatus::InProgress => "in-progress",
            TestStatus::Success => "success",
            TestStatus::Failed => "failed",
            TestStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Error,
    #[serde(other)]
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub id: CaseId,
    pub description: String,
    pub step_count: u32,
    pub status: TestStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub kind: LogKind,
}

/// A report body returned by the download endpoint once it is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub case_id: CaseId,
    /// Filename suggested by the server, if any.
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactProbe {
    Ready(Artifact),
    NotReady { status: u16 },
}

/// Timing knobs for every loop the client runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimings {
    pub case_interval: Duration,
    pub log_interval: Duration,
    pub min_loading: Duration,
    pub download_interval: Duration,
    /// `0` keeps probing until the report shows up.
    pub download_attempts: u32,
    pub download_transport_failures: u32,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            case_interval: Duration::from_millis(CASE_POLL_INTERVAL_MS),
            log_interval: Duration::from_millis(LOG_POLL_INTERVAL_MS),
            min_loading: Duration::from_millis(LOG_MIN_LOADING_MS),
            download_interval: Duration::from_millis(DOWNLOAD_POLL_INTERVAL_MS),
            download_attempts: DOWNLOAD_MAX_ATTEMPTS,
            download_transport_failures: DOWNLOAD_MAX_TRANSPORT_FAILURES,
        }
    }
}

/// Immutable configuration set at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub output_dir: PathBuf,
    pub timings: PollTimings,
    pub version_string: String,
}

impl AppConfig {
    pub fn new(base_url: impl Into<String>, output_dir: PathBuf, timings: PollTimings) -> Self {
        Self {
            base_url: base_url.into(),
            output_dir,
            timings,
            version_string: format!("tcw v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub case_id: Option<CaseId>,
    pub message: String,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub case_id: CaseId,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Everything the detail panel needs for the selected case.
#[derive(Debug, Clone, Copy)]
pub struct CaseView<'a> {
    /// 1-based row position in the table.
    pub ordinal: usize,
    pub case: &'a TestCase,
    pub logs: &'a [LogEntry],
    pub has_result: bool,
    pub in_progress: bool,
    pub loading: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum CurrentView<'a> {
    NoSelection,
    Selected(CaseView<'a>),
    /// The selection points at a case the latest list no longer contains.
    Unavailable { case_id: CaseId },
}

pub struct AppState {
    pub config: AppConfig,

    // Case list snapshot
    pub cases: Vec<TestCase>,
    pub previous_snapshot: HashMap<CaseId, TestStatus>,
    pub last_poll: Option<Instant>,

    // Table navigation
    pub cursor: usize,

    // Selection and log polling
    selection: Option<CaseId>,
    generation: u64,
    loading: bool,
    pub log_cache: HashMap<CaseId, Vec<LogEntry>>,
    pub logs_expanded: bool,

    // Report download
    pub download: Option<DownloadProgress>,

    // Transient UI
    pub notifications: Vec<Notification>,
    pub error: Option<(String, Instant)>,
    pub spinner_frame: usize,
    pub should_quit: bool,

    // Desktop notifications
    pub desktop_notify: bool,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            cases: Vec::new(),
            previous_snapshot: HashMap::new(),
            last_poll: None,
            cursor: 0,
            selection: None,
            generation: 0,
            loading: false,
            log_cache: HashMap::new(),
            logs_expanded: false,
            download: None,
            notifications: Vec::new(),
            error: None,
            spinner_frame: 0,
            should_quit: false,
            desktop_notify: true,
        }
    }

    /// Replaces the case snapshot wholesale.
    pub fn apply_cases(&mut self, cases: Vec<TestCase>) {
        self.cases = cases;
        self.last_poll = Some(Instant::now());
        if self.cursor >= self.cases.len() {
            self.cursor = self.cases.len().saturating_sub(1);
        }
    }

    pub fn selection(&self) -> Option<CaseId> {
        self.selection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Changes the selection and returns the new log generation, or `None`
    /// when the selection did not actually change.
    pub fn set_selection(&mut self, selection: Option<CaseId>) -> Option<u64> {
        if self.selection == selection {
            return None;
        }
        self.selection = selection;
        self.generation = self.generation.wrapping_add(1);
        self.loading = false;
        self.logs_expanded = false;
        Some(self.generation)
    }

    /// True when a log result tagged `(case_id, generation)` still belongs to
    /// the current selection.
    pub fn is_current(&self, case_id: CaseId, generation: u64) -> bool {
        self.selection == Some(case_id) && self.generation == generation
    }

    pub fn begin_log_fetch(&mut self, case_id: CaseId, generation: u64) -> bool {
        if !self.is_current(case_id, generation) {
            return false;
        }
        self.loading = true;
        true
    }

    /// Stores a log snapshot if it is still relevant. Returns `false` when the
    /// result was discarded as stale.
    pub fn apply_logs(&mut self, case_id: CaseId, generation: u64, logs: Vec<LogEntry>) -> bool {
        if !self.is_current(case_id, generation) {
            return false;
        }
        self.log_cache.insert(case_id, logs);
        true
    }

    pub fn settle_log_fetch(&mut self, case_id: CaseId, generation: u64) -> bool {
        if !self.is_current(case_id, generation) {
            return false;
        }
        self.loading = false;
        true
    }

    pub fn case_position(&self, case_id: CaseId) -> Option<usize> {
        self.cases.iter().position(|c| c.id == case_id)
    }

    pub fn selected_case(&self) -> Result<Option<&TestCase>, SelectionError> {
        match self.selection {
            None => Ok(None),
            Some(case_id) => self
                .cases
                .iter()
                .find(|c| c.id == case_id)
                .map(Some)
                .ok_or(SelectionError::Inconsistent { case_id }),
        }
    }

    pub fn current_view(&self) -> CurrentView<'_> {
        let Some(case_id) = self.selection else {
            return CurrentView::NoSelection;
        };
        let Some(ordinal) = self.case_position(case_id) else {
            return CurrentView::Unavailable { case_id };
        };
        let case = &self.cases[ordinal];
        CurrentView::Selected(CaseView {
            ordinal: ordinal + 1,
            case,
            logs: self.log_cache.get(&case_id).map_or(&[][..], Vec::as_slice),
            has_result: case.status.has_result(),
            in_progress: case.status == TestStatus::InProgress,
            loading: self.loading,
        })
    }

    pub fn case_at_cursor(&self) -> Option<&TestCase> {
        self.cases.get(self.cursor)
    }

    pub fn move_cursor_up(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
    }

    pub fn move_cursor_down(&mut self) {
        if !self.cases.is_empty() && self.cursor < self.cases.len() - 1 {
            self.cursor += 1;
        }
    }

    /// Moves the cursor to the n-th row (1-based). Returns the case there.
    pub fn quick_select(&mut self, n: usize) -> Option<CaseId> {
        if n == 0 || n > QUICK_SELECT_MAX {
            return None;
        }
        let case_id = self.cases.get(n - 1)?.id;
        self.cursor = n - 1;
        Some(case_id)
    }

    pub fn has_in_progress(&self) -> bool {
        self.cases.iter().any(|c| c.status == TestStatus::InProgress)
    }

    pub fn push_notification(&mut self, case_id: Option<CaseId>, message: String) {
        self.notifications.push(Notification {
            case_id,
            message,
            timestamp: Instant::now(),
        });
    }

    pub fn prune_notifications(&mut self) {
        self.notifications
            .retain(|n| n.timestamp.elapsed().as_secs() < NOTIFICATION_TTL_SECS);
    }

    pub fn advance_spinner(&mut self) {
        self.spinner_frame = self.spinner_frame.wrapping_add(1);
    }

    pub fn set_error(&mut self, msg: String) {
        self.error = Some((msg, Instant::now()));
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn prune_error(&mut self) {
        if let Some((_, at)) = &self.error {
            if at.elapsed().as_secs() >= ERROR_TTL_SECS {
                self.error = None;
            }
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|(msg, _)| msg.as_str())
    }
}
