//! Terminal failure modes of an agent run.
//!
//! Every variant halts the pipeline before a report exists. A failing build is
//! deliberately absent: it is a normal outcome carried by
//! [`PipelineOutcome`](crate::pipeline::PipelineOutcome).

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

/// The model provider call did not produce a response body.
#[derive(Debug, Error)]
#[error("{}", describe_transport(*status, body))]
pub struct TransportError {
    /// HTTP status when the provider answered; `None` for network/decode failures.
    pub status: Option<u16>,
    /// Provider response body, or the client error message.
    pub body: String,
}

fn describe_transport(status: Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("model API error {code}: {body}"),
        None => format!("model API request failed: {body}"),
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing credential or invalid settings. Raised before any side effect.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response had no fenced `diff` block.
    #[error("model did not return a ```diff block. Full response:\n{raw}")]
    Parse { raw: String },

    /// `git apply` rejected the patch; the diff was saved to `artifact`.
    #[error("git apply failed (patch saved to {}): {stderr}", artifact.display())]
    Apply { stderr: String, artifact: PathBuf },

    /// Dependency installation failed, so no build signal can be trusted.
    #[error("{command} failed:\n{log_tail}")]
    Environment { command: String, log_tail: String },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        exit_codes::FAILURE
    }

    /// Short stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Transport(_) => "transport",
            PipelineError::Parse { .. } => "parse",
            PipelineError::Apply { .. } => "apply",
            PipelineError::Environment { .. } => "environment",
            PipelineError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_carries_status_and_body() {
        let err = TransportError {
            status: Some(429),
            body: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "model API error 429: quota exceeded");
    }

    #[test]
    fn transport_error_without_status_names_request_failure() {
        let err = TransportError {
            status: None,
            body: "connection refused".to_string(),
        };
        assert!(err.to_string().starts_with("model API request failed"));
    }

    #[test]
    fn parse_error_preserves_raw_response() {
        let err = PipelineError::Parse {
            raw: "just prose".to_string(),
        };
        assert!(err.to_string().contains("just prose"));
        assert_eq!(err.kind(), "parse");
        assert_eq!(err.exit_code(), exit_codes::FAILURE);
    }
}
