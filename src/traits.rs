use crate::app::{Artifact, ArtifactProbe, CaseId, LogEntry, TestCase};
use crate::error::TransportError;
use async_trait::async_trait;
use color_eyre::eyre::Result;
use std::path::PathBuf;

/// The backend operations the dashboard depends on, already normalized into
/// domain shapes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_cases(&self) -> Result<Vec<TestCase>, TransportError>;
    async fn fetch_logs(&self, case_id: CaseId) -> Result<Vec<LogEntry>, TransportError>;
    async fn trigger_run(&self, case_id: CaseId) -> Result<(), TransportError>;
    async fn reset_all(&self) -> Result<(), TransportError>;
    async fn check_artifact(&self, case_id: CaseId) -> Result<ArtifactProbe, TransportError>;
}

/// Where a downloaded report ends up.
pub trait ArtifactSink: Send + Sync {
    fn save(&self, artifact: &Artifact) -> Result<PathBuf>;
}
