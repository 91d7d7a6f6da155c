//! Terminal input thread and application event channel.
//!
//! [`EventHandler`] spawns an OS thread (not a tokio task) because
//! `crossterm::event::poll()` blocks. Background loops share the same channel,
//! so the main loop is the only place state is ever mutated.

use crate::api::download::DownloadOutcome;
use crate::app::{CaseId, LogEntry, TestCase};
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Tick,
    CasesResult(Vec<TestCase>),
    LogFetchStarted {
        case_id: CaseId,
        generation: u64,
    },
    LogsResult {
        case_id: CaseId,
        generation: u64,
        logs: Vec<LogEntry>,
    },
    /// Sent no sooner than the minimum loading time after `LogFetchStarted`.
    LogFetchSettled {
        case_id: CaseId,
        generation: u64,
    },
    TriggerSent(CaseId),
    ResetSent,
    /// Trigger or reset could not be delivered.
    ActionFailed(String),
    DownloadProgress {
        case_id: CaseId,
        generation: u64,
        attempt: u32,
    },
    DownloadFinished {
        case_id: CaseId,
        generation: u64,
        outcome: DownloadOutcome,
    },
    /// Global toast, auto-dismisses after `ERROR_TTL_SECS`.
    Error(String),
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();

        let thread = std::thread::spawn(move || {
            while !shutdown_flag.load(Ordering::Relaxed) {
                match event::poll(tick_rate) {
                    Err(e) => {
                        let _ = event_tx.send(AppEvent::Error(format!("Terminal poll error: {e}")));
                        break;
                    }
                    Ok(false) => {
                        if event_tx.send(AppEvent::Tick).is_err() {
                            break;
                        }
                        continue;
                    }
                    Ok(true) => {}
                }
                match event::read() {
                    Ok(CrosstermEvent::Key(key)) => {
                        if event_tx.send(AppEvent::Key(key)).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        let _ = event_tx.send(AppEvent::Error(format!("Terminal read error: {e}")));
                        break;
                    }
                    _ => {}
                }
            }
        });

        Self {
            rx,
            tx,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("event thread panicked");
            }
        }
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        // Joining here could deadlock if crossterm::event::poll is blocked
        // during unwinding; the thread exits on its next poll tick.
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
