//! Error types for the decode pipeline.
//!
//! Three families, matching the three places things can go wrong:
//! - [`ConfigError`]: fatal, raised while building backends or the cascade.
//! - [`DecodeError`]: per-request, raised before or around a pipeline run.
//! - [`BackendError`]: a single detector call failed. The pipeline never
//!   surfaces this to callers; it logs it and treats the stage as empty.
//!
//! "No QR code found" is not an error anywhere in this crate. It is an empty
//! [`DecodeResult`](crate::DecodeResult).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backend::artifacts::ArtifactKind;

/// Errors raised while constructing backends, the cascade or the worker pool.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required model artifact does not exist.
    #[error("model artifact {kind} not found at {}", path.display())]
    MissingArtifact {
        /// Which of the four artifacts is missing.
        kind: ArtifactKind,
        /// The configured path.
        path: PathBuf,
    },

    /// A model artifact exists but holds no data.
    #[error("model artifact {kind} at {} is empty", path.display())]
    EmptyArtifact {
        /// Which artifact.
        kind: ArtifactKind,
        /// The configured path.
        path: PathBuf,
    },

    /// A model artifact is present but cannot be what it claims to be.
    #[error("model artifact {kind} at {} is malformed: {reason}", path.display())]
    MalformedArtifact {
        /// Which artifact.
        kind: ArtifactKind,
        /// The configured path.
        path: PathBuf,
        /// What the check tripped on.
        reason: String,
    },

    /// The detector engine rejected the artifacts.
    #[error("failed to load detector models: {message}")]
    ModelLoad {
        /// Engine-provided message.
        message: String,
    },

    /// The requested backend was not compiled into this build.
    #[error("backend {name} is unavailable: {reason}")]
    BackendUnavailable {
        /// Backend name.
        name: String,
        /// Why it cannot be constructed.
        reason: String,
    },

    /// A stage references a backend role that has no backend behind it.
    #[error("stage {stage:?} references the {role} backend, which is not configured")]
    UnknownBackend {
        /// Stage name.
        stage: String,
        /// Requested role.
        role: String,
    },

    /// A stage definition is not usable.
    #[error("stage {stage:?} is invalid: {reason}")]
    InvalidStage {
        /// Stage name (may be empty).
        stage: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The cascade has neither stages nor a fallback.
    #[error("decode cascade has no stages")]
    EmptyCascade,

    /// Reading a configuration file failed.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid JSON for the expected schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The decode worker pool could not be started.
    #[error("failed to start decode workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Per-request failures.
///
/// `InputRejected` is deliberately distinct from an empty result: a corrupt
/// upload and an image without a code get different replies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The image buffer is empty, unparseable or has an unusable shape.
    #[error("image rejected: {reason}")]
    InputRejected {
        /// Human-readable cause, for logs.
        reason: String,
    },

    /// The caller's deadline elapsed before the cascade finished.
    #[error("decode did not finish within {after:?}")]
    TimedOut {
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// The worker running the request went away without answering.
    #[error("decode worker stopped before replying")]
    WorkerGone,
}

impl DecodeError {
    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        DecodeError::InputRejected {
            reason: reason.into(),
        }
    }
}

/// A single detector call failed.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The underlying engine reported an error.
    #[error("{backend}: {message}")]
    Engine {
        /// Backend name.
        backend: String,
        /// Engine-provided message.
        message: String,
    },
}
