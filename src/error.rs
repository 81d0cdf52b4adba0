// Error taxonomy for a run. Every step of the pipeline returns
// `Result<_, PosterError>` and the first error aborts the run.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The five steps of a run, in the order they execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Resolve,
    Upload,
    Save,
    Post,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Resolve => "resolve",
            Step::Upload => "upload",
            Step::Save => "save",
            Step::Post => "post",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PosterError {
    /// Required setting missing or unparsable. Raised before any request is sent.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP-layer failure: connection, timeout, non-2xx status or undecodable body.
    #[error("transport error during {step}: {source}")]
    Transport {
        step: Step,
        #[source]
        source: reqwest::Error,
    },

    /// Error object embedded in an otherwise successful response.
    #[error("provider error {code} during {step}: {message}")]
    Provider {
        step: Step,
        code: i64,
        message: String,
    },

    #[error("comic fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("unexpected payload during {step}: {detail}")]
    UnexpectedPayload { step: Step, detail: String },

    #[error("scratch file {}: {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PosterError {
    /// Wrap an HTTP failure. The request URL is dropped: VK calls carry the
    /// access token in the query string.
    pub(crate) fn transport(step: Step) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| PosterError::Transport {
            step,
            source: source.without_url(),
        }
    }

    pub(crate) fn fetch(reason: impl Into<String>) -> Self {
        PosterError::Fetch {
            reason: reason.into(),
        }
    }

    /// Step the error aborted, when it belongs to one.
    pub fn step(&self) -> Option<Step> {
        match self {
            PosterError::Transport { step, .. }
            | PosterError::Provider { step, .. }
            | PosterError::UnexpectedPayload { step, .. } => Some(*step),
            PosterError::Fetch { .. } => Some(Step::Fetch),
            PosterError::Config(_) | PosterError::Scratch { .. } => None,
        }
    }

    /// Process exit status for this error: 2 for configuration, 1 otherwise.
    pub const fn exit_code(&self) -> i32 {
        match self {
            PosterError::Config(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PosterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_message_carries_code_and_step() {
        let err = PosterError::Provider {
            step: Step::Save,
            code: 100,
            message: "One of the parameters specified was missing or invalid".into(),
        };
        assert_eq!(
            err.to_string(),
            "provider error 100 during save: One of the parameters specified was missing or invalid"
        );
        assert_eq!(err.step(), Some(Step::Save));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn config_errors_exit_with_two() {
        let err = PosterError::Config("VK_ACCESS_TOKEN is not set".into());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.step(), None);
    }
}
