use thiserror::Error;

use crate::provider::ProviderKind;

/// Everything that can fail a single request.
///
/// Device problems are deliberately absent: an unusable accelerator is a
/// diagnostic, not an error.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Missing required field, invalid path or unusable option.
    #[error("configuration error: {0}")]
    Config(String),

    /// Control line that could not be understood.
    #[error("malformed control line: {0}")]
    Protocol(String),

    /// Provider could not be brought up. The cache slot stays empty.
    #[error("failed to initialise {kind} provider: {message}")]
    ProviderInit { kind: ProviderKind, message: String },

    /// Provider was up but a call failed.
    #[error("{kind} provider failed: {message}")]
    Provider { kind: ProviderKind, message: String },

    /// A derived artefact (e.g. the reference transcript) was unusable.
    #[error("{0}")]
    Derivation(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl WorkerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn provider(kind: ProviderKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    pub fn provider_init(kind: ProviderKind, message: impl Into<String>) -> Self {
        Self::ProviderInit {
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_provider() {
        let err = WorkerError::provider_init(ProviderKind::Xtts, "binary missing");
        assert_eq!(
            err.to_string(),
            "failed to initialise xtts_v2 provider: binary missing"
        );
    }

    #[test]
    fn derivation_message_is_passed_through() {
        let err = WorkerError::Derivation("reference transcript is empty".into());
        assert_eq!(err.to_string(), "reference transcript is empty");
    }
}
