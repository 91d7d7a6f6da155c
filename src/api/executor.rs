use crate::api::parser;
use crate::app::{Artifact, ArtifactProbe, CaseId, LogEntry, TestCase};
use crate::error::TransportError;
use crate::traits::Backend;
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the test runner's HTTP API.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    prefix: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_prefix: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix: normalize_prefix(api_prefix),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.prefix, path)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, TransportError> {
        self.client
            .get(self.url(path))
            .send()
            .await
            .map_err(|source| TransportError::Request {
                path: path.to_string(),
                source,
            })
    }

    async fn get_text(&self, path: &str) -> Result<String, TransportError> {
        let resp = self.get(path).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(|source| TransportError::Request {
            path: path.to_string(),
            source,
        })
    }
}

/// `""` stays empty, anything else gets exactly one leading slash and no
/// trailing one.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_cases(&self) -> Result<Vec<TestCase>, TransportError> {
        let path = "/test-cases";
        let body = self.get_text(path).await?;
        parser::parse_cases(&body).map_err(|source| TransportError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn fetch_logs(&self, case_id: CaseId) -> Result<Vec<LogEntry>, TransportError> {
        let path = format!("/test-logs/{case_id}");
        let body = self.get_text(&path).await?;
        parser::parse_logs(&body).map_err(|source| TransportError::Decode { path, source })
    }

    async fn trigger_run(&self, case_id: CaseId) -> Result<(), TransportError> {
        self.get_text(&format!("/trigger-tests/{case_id}")).await?;
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), TransportError> {
        self.get_text("/test-reset-all").await?;
        Ok(())
    }

    async fn check_artifact(&self, case_id: CaseId) -> Result<ArtifactProbe, TransportError> {
        let path = format!("/download-test-report/{case_id}");
        let resp = self.get(&path).await?;
        let status = resp.status();
        if !status.is_success() {
            return Ok(ArtifactProbe::NotReady {
                status: status.as_u16(),
            });
        }
        let filename = resp
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parser::filename_from_disposition);
        let bytes = resp
            .bytes()
            .await
            .map_err(|source| TransportError::Request { path, source })?;
        Ok(ArtifactProbe::Ready(Artifact {
            case_id,
            filename,
            bytes: bytes.to_vec(),
        }))
    }
}
