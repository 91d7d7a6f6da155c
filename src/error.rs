use crate::app::CaseId;

/// Failure talking to the backend. Polls swallow it and retry on the next
/// tick; one-shot actions log it and report it once.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} returned HTTP {status}")]
    Status { path: String, status: u16 },

    #[error("could not decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("test case {case_id} is no longer in the case list")]
    Inconsistent { case_id: CaseId },
}
