//! Error types shared across Reelcut crates.
//!
//! The variants mirror the export pipeline's failure taxonomy. Callers that
//! need to turn a failure into a user-facing response use
//! [`ReelcutError::is_recoverable`] rather than matching on messages.

use std::path::PathBuf;

/// Top-level error type for Reelcut operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelcutError {
    #[error("Unsupported codec: {codec}")]
    UnsupportedCodec { codec: String },

    #[error("Resource exhausted: {message}")]
    ResourceExhausted { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Mux error: {message}")]
    Mux { message: String },

    #[error("Demux error: {message}")]
    Demux { message: String },

    #[error("No frames in range [{in_point_us}us, {out_point_us}us)")]
    NoFramesInRange { in_point_us: i64, out_point_us: i64 },

    #[error("An export is already in progress")]
    ExportInProgress,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelcutError.
pub type ReelcutResult<T> = Result<T, ReelcutError>;

impl ReelcutError {
    pub fn unsupported_codec(codec: impl Into<String>) -> Self {
        Self::UnsupportedCodec {
            codec: codec.into(),
        }
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux {
            message: msg.into(),
        }
    }

    pub fn demux(msg: impl Into<String>) -> Self {
        Self::Demux {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether a fresh attempt at the same operation may succeed.
    ///
    /// Unsupported codecs, resource exhaustion and empty ranges need the
    /// user to change the request; transient codec/mux failures and a
    /// rejected concurrent export do not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::UnsupportedCodec { .. }
            | Self::ResourceExhausted { .. }
            | Self::NoFramesInRange { .. }
            | Self::InvalidInput { .. }
            | Self::Config { .. }
            | Self::FileNotFound { .. }
            | Self::Demux { .. }
            | Self::Json(_) => false,
            Self::Decode { .. } | Self::Encode { .. } | Self::Mux { .. } | Self::ExportInProgress => {
                true
            }
            Self::Io(err) => err.kind() != std::io::ErrorKind::OutOfMemory,
            Self::Other(err) => !looks_like_allocation_failure(&err.to_string()),
        }
    }

    /// Re-classify an opaque error whose message reports an allocation
    /// failure as resource exhaustion. Other errors are returned unchanged.
    pub fn classify(self) -> Self {
        match self {
            Self::Other(err) if looks_like_allocation_failure(&err.to_string()) => {
                Self::resource_exhausted(err.to_string())
            }
            Self::Io(err) if err.kind() == std::io::ErrorKind::OutOfMemory => {
                Self::resource_exhausted(err.to_string())
            }
            other => other,
        }
    }
}

fn looks_like_allocation_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("out of memory")
        || lower.contains("allocation failed")
        || lower.contains("memory allocation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability_matches_taxonomy() {
        assert!(!ReelcutError::unsupported_codec("hev1").is_recoverable());
        assert!(!ReelcutError::resource_exhausted("too big").is_recoverable());
        assert!(!ReelcutError::NoFramesInRange {
            in_point_us: 0,
            out_point_us: 10
        }
        .is_recoverable());
        assert!(ReelcutError::decode("corrupt slice").is_recoverable());
        assert!(ReelcutError::encode("queue overflow").is_recoverable());
        assert!(ReelcutError::ExportInProgress.is_recoverable());
    }

    #[test]
    fn test_classify_detects_allocation_failures() {
        let err = ReelcutError::Other(anyhow::anyhow!("memory allocation of 8 GB failed"));
        assert!(!err.is_recoverable());
        assert!(matches!(
            err.classify(),
            ReelcutError::ResourceExhausted { .. }
        ));

        let err = ReelcutError::Other(anyhow::anyhow!("worker hiccup"));
        assert!(matches!(err.classify(), ReelcutError::Other(_)));
    }
}
