use crate::generator::SceneFailureRecord;
use crate::media::FrameSize;
use std::path::PathBuf;
use thiserror::Error;

/// A story document that cannot be processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("story title is missing or empty")]
    MissingTitle,

    #[error("story has no scenes")]
    NoScenes,

    #[error("scene {index} has no narration")]
    MissingNarration { index: usize },

    #[error("scene {index} has no image prompt")]
    MissingImagePrompt { index: usize },

    #[error("story is not valid JSON: {0}")]
    Malformed(String),
}

/// A generative backend rejected or failed a single request.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{service} rejected request (HTTP {status}): {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed response from {service}: {message}")]
    MalformedResponse {
        service: &'static str,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Transport failures, throttling and server-side errors may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.status().is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
            }
            SynthesisError::Transport(_) => true,
            SynthesisError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Failure while probing, encoding or writing media.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("no segments to concatenate")]
    Empty,

    #[error("output path not writable: {}: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("segment frame {found} differs from expected {expected}")]
    DimensionMismatch {
        expected: FrameSize,
        found: FrameSize,
    },

    #[error("probe failed for {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    #[error("encoder failed: {0}")]
    Encoder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single scene could not be rendered.
#[derive(Error, Debug)]
pub enum SceneFailure {
    #[error("illustration failed: {0}")]
    Illustration(#[source] SynthesisError),

    #[error("narration failed: {0}")]
    Narration(#[source] SynthesisError),

    #[error("media processing failed: {0}")]
    Media(#[source] EncodingError),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
#[error("scene {scene_index} failed: {cause}")]
pub struct SceneRenderError {
    pub scene_index: usize,
    #[source]
    pub cause: SceneFailure,
}

/// Run-fatal errors returned by the orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid story: {0}")]
    Schema(#[from] SchemaError),

    #[error("run aborted: {0}")]
    SceneAborted(#[source] SceneRenderError),

    #[error("no scene could be rendered ({} failed)", .failures.len())]
    NoSegmentsProduced { failures: Vec<SceneFailureRecord> },

    #[error("final video could not be written: {0}")]
    Encoding(#[from] EncodingError),

    #[error("run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let throttled = SynthesisError::Rejected {
            service: "openai",
            status: 429,
            message: "slow down".into(),
        };
        let unauthorized = SynthesisError::Rejected {
            service: "openai",
            status: 401,
            message: "bad key".into(),
        };
        assert!(throttled.is_retryable());
        assert!(!unauthorized.is_retryable());
        assert!(SynthesisError::Transport("reset".into()).is_retryable());
        assert!(!SynthesisError::InvalidInput("empty".into()).is_retryable());
    }

    #[test]
    fn scene_error_mentions_index_and_cause() {
        let err = SceneRenderError {
            scene_index: 1,
            cause: SceneFailure::Illustration(SynthesisError::Transport("connection reset".into())),
        };
        let text = err.to_string();
        assert!(text.contains("scene 1"), "{text}");
        assert!(text.contains("connection reset"), "{text}");
    }
}
