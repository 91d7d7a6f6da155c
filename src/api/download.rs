//! On-demand report download: probe the report endpoint until it is ready,
//! save it once, stop.

use crate::app::{Artifact, ArtifactProbe, CaseId, PollTimings};
use crate::events::AppEvent;
use crate::traits::{ArtifactSink, Backend};
use color_eyre::eyre::{eyre, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPolicy {
    pub interval: Duration,
    /// `0` means no limit.
    pub max_attempts: u32,
    /// Consecutive transport failures that end the poll early.
    pub max_transport_failures: u32,
}

impl From<&PollTimings> for DownloadPolicy {
    fn from(timings: &PollTimings) -> Self {
        Self {
            interval: timings.download_interval,
            max_attempts: timings.download_attempts,
            max_transport_failures: timings.download_transport_failures,
        }
    }
}

/// Identity a download poll was started for. Re-requesting a report for the
/// same case starts a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadTarget {
    pub case_id: CaseId,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    /// The server kept answering "not ready" until the attempt limit.
    NotReady { attempts: u32 },
    /// The server could not be reached several times in a row.
    Unreachable { attempts: u32, error: String },
    SaveFailed(String),
}

pub async fn poll_for_artifact(
    backend: &dyn Backend,
    sink: &dyn ArtifactSink,
    target: DownloadTarget,
    policy: DownloadPolicy,
    tx: &mpsc::UnboundedSender<AppEvent>,
) -> DownloadOutcome {
    let DownloadTarget {
        case_id,
        generation,
    } = target;
    let mut attempt: u32 = 0;
    let mut transport_failures: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        // Progress is cosmetic; a closed channel is handled by the caller.
        let _ = tx.send(AppEvent::DownloadProgress {
            case_id,
            generation,
            attempt,
        });

        match backend.check_artifact(case_id).await {
            Ok(ArtifactProbe::Ready(artifact)) => {
                return match sink.save(&artifact) {
                    Ok(path) => {
                        tracing::info!("saved report for case {case_id} to {}", path.display());
                        DownloadOutcome::Saved(path)
                    }
                    Err(e) => {
                        tracing::error!("saving report for case {case_id} failed: {e}");
                        DownloadOutcome::SaveFailed(e.to_string())
                    }
                };
            }
            Ok(ArtifactProbe::NotReady { status }) => {
                transport_failures = 0;
                tracing::debug!("report for case {case_id} not ready (HTTP {status})");
            }
            Err(e) => {
                transport_failures = transport_failures.saturating_add(1);
                tracing::warn!("report probe for case {case_id} failed: {e}");
                if transport_failures >= policy.max_transport_failures.max(1) {
                    return DownloadOutcome::Unreachable {
                        attempts: attempt,
                        error: e.to_string(),
                    };
                }
            }
        }

        if policy.max_attempts != 0 && attempt >= policy.max_attempts {
            return DownloadOutcome::NotReady { attempts: attempt };
        }
        time::sleep(policy.interval).await;
    }
}

/// Writes reports into a directory.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

pub fn default_report_name(case_id: CaseId) -> String {
    format!("test-report-{case_id}.csv")
}

impl ArtifactSink for FileSink {
    fn save(&self, artifact: &Artifact) -> Result<PathBuf> {
        let name = artifact
            .filename
            .clone()
            .unwrap_or_else(|| default_report_name(artifact.case_id));
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| eyre!("Failed to create {}: {e}", self.dir.display()))?;
        let path = self.dir.join(name);
        std::fs::write(&path, &artifact.bytes)
            .map_err(|e| eyre!("Failed to write {}: {e}", path.display()))?;
        Ok(path)
    }
}
