//! Serializable description of a cascade.
//!
//! A [`PipelineConfig`] names backends by [`BackendRole`] instead of holding
//! them, so the same JSON can be built against whatever backends the host
//! managed to construct.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DecodeAttempt, FALLBACK_STAGE, Fallback, Pipeline, StageSource};
use crate::backend::{BackendRole, Backends};
use crate::error::ConfigError;
use crate::preprocess::Transform;

/// One stage entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage identifier, reported with successful results.
    pub name: String,
    /// Input policy.
    #[serde(default)]
    pub source: StageSource,
    /// Transform chain. Empty means identity.
    #[serde(default)]
    pub transforms: Vec<Transform>,
    /// Backend the stage calls.
    #[serde(default)]
    pub backend: BackendRole,
}

impl StageConfig {
    /// Stage on the original image calling the primary backend.
    pub fn new(name: impl Into<String>, transforms: Vec<Transform>) -> Self {
        Self {
            name: name.into(),
            source: StageSource::Original,
            transforms,
            backend: BackendRole::Primary,
        }
    }
}

/// The fallback entry. It always calls the secondary backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Step identifier.
    #[serde(default = "default_fallback_name")]
    pub name: String,
}

fn default_fallback_name() -> String {
    FALLBACK_STAGE.to_string()
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            name: default_fallback_name(),
        }
    }
}

/// Ordered stage table plus optional fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stages in evaluation order.
    pub stages: Vec<StageConfig>,
    /// Fallback step, run on the last stage's output.
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                StageConfig::new("direct", vec![Transform::Identity]),
                StageConfig::new(
                    "binarize",
                    vec![
                        Transform::Grayscale,
                        Transform::Median { ksize: 5 },
                        Transform::Otsu,
                    ],
                ),
                // Runs on the color upload, not on the binarized intermediate.
                StageConfig::new("morph-close", vec![Transform::MorphClose { ksize: 5 }]),
            ],
            fallback: Some(FallbackConfig::default()),
        }
    }
}

impl PipelineConfig {
    /// Standard cascade for hosts where the classic decoder fills the
    /// primary role.
    ///
    /// Same stages as [`PipelineConfig::default`], but the binarize stage
    /// smooths with a 3x3 median. rqrr cannot read codes whose module
    /// corners a 5x5 median has rounded off.
    pub fn classic() -> Self {
        let mut config = Self::default();
        for stage in &mut config.stages {
            for transform in &mut stage.transforms {
                if let Transform::Median { ksize } = transform {
                    *ksize = 3;
                }
            }
        }
        config
    }

    /// Copy of this config with the fallback removed.
    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    /// Resolve roles against `backends` and build a validated [`Pipeline`].
    ///
    /// A stage whose role has no backend is a configuration error. A
    /// fallback with no secondary backend is dropped.
    pub fn build(&self, backends: &Backends) -> Result<Pipeline, ConfigError> {
        let mut builder = Pipeline::builder();
        for stage in &self.stages {
            let backend = backends
                .get(stage.backend)
                .ok_or_else(|| ConfigError::UnknownBackend {
                    stage: stage.name.clone(),
                    role: stage.backend.to_string(),
                })?;
            builder = builder.stage(
                DecodeAttempt::new(stage.name.clone(), backend.clone())
                    .source(stage.source)
                    .transforms(stage.transforms.iter().copied()),
            );
        }

        if let Some(fallback) = &self.fallback {
            match backends.secondary() {
                Some(secondary) => {
                    builder = builder.fallback(Fallback::named(fallback.name.clone(), secondary.clone()));
                }
                None => debug!(stage = %fallback.name, "no secondary backend, fallback disabled"),
            }
        }

        builder.build()
    }
}
