//! Natural-language labelling of entity chunks via a local LLM.

pub mod generator;
pub mod ollama;

use thiserror::Error;

pub use generator::{sanitize_label, LabelGenerator};
pub use ollama::{LlmClient, MockLlmClient, OllamaClient};

/// Labelling failures are chunk-local: the orchestrator records the chunk
/// as failed and moves on. Transport-level variants are retried a fixed
/// number of times; validation variants never are.
#[derive(Debug, Error)]
pub enum LabellingError {
    #[error("label service is not reachable at {0}")]
    Connection(String),

    #[error("label request timed out after {0}s")]
    Timeout(u64),

    #[error("label service returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("malformed label service response: {0}")]
    ResponseParsing(String),

    #[error("failed to serialize chunk entities: {0}")]
    Serialize(String),

    #[error("label is empty")]
    Empty,

    #[error("label too short ({len} chars, minimum {min})")]
    TooShort { len: usize, min: usize },

    #[error("label begins with an error marker: {0:?}")]
    ErrorMarker(String),
}

impl LabellingError {
    /// Transport failures may be retried; validation failures may not.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Timeout(_)
                | Self::Service { .. }
                | Self::HttpClient(_)
                | Self::ResponseParsing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(LabellingError::Connection("http://localhost:11434".into()).is_transport());
        assert!(LabellingError::Timeout(120).is_transport());
        assert!(LabellingError::Service {
            status: 503,
            body: "overloaded".into()
        }
        .is_transport());
        assert!(LabellingError::ResponseParsing("bad json".into()).is_transport());

        assert!(!LabellingError::Empty.is_transport());
        assert!(!LabellingError::TooShort { len: 3, min: 10 }.is_transport());
        assert!(!LabellingError::ErrorMarker("Error: x".into()).is_transport());
        assert!(!LabellingError::Serialize("oops".into()).is_transport());
    }
}
