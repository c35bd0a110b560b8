//! The decode cascade.
//!
//! A [`Pipeline`] is an ordered table of [`DecodeAttempt`]s plus an optional
//! fallback. [`Pipeline::run`] walks the table once, stops at the first stage
//! whose detector returns any text, and otherwise hands the last stage's image
//! to the fallback backend.
//!
//! Each stage declares where its input comes from ([`StageSource`]). The
//! choice matters: re-deriving from an already thresholded intermediate gives
//! different recognition rates than starting from the upload.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{ClassicBackend, QrBackend};
use crate::error::{ConfigError, DecodeError};
use crate::models::{DecodeResult, Image};
use crate::preprocess::{Transform, apply_chain};

pub mod config;

pub use config::{FallbackConfig, PipelineConfig, StageConfig};

/// Default identifier of the fallback step.
pub const FALLBACK_STAGE: &str = "fallback-library";

/// Input policy of a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSource {
    /// Transform the image as it was submitted.
    #[default]
    Original,
    /// Transform the image the preceding stage produced (the original for
    /// the first stage).
    Previous,
}

impl fmt::Display for StageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageSource::Original => f.write_str("original"),
            StageSource::Previous => f.write_str("previous"),
        }
    }
}

/// One stage: a transform chain followed by a detector call.
#[derive(Clone)]
pub struct DecodeAttempt {
    name: String,
    source: StageSource,
    transforms: Vec<Transform>,
    backend: Arc<dyn QrBackend>,
}

impl DecodeAttempt {
    /// A stage that sends the original image straight to `backend`.
    pub fn new(name: impl Into<String>, backend: Arc<dyn QrBackend>) -> Self {
        Self {
            name: name.into(),
            source: StageSource::Original,
            transforms: Vec::new(),
            backend,
        }
    }

    /// Set the input policy.
    pub fn source(mut self, source: StageSource) -> Self {
        self.source = source;
        self
    }

    /// Append one transform to the chain.
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Replace the whole transform chain.
    pub fn transforms(mut self, transforms: impl IntoIterator<Item = Transform>) -> Self {
        self.transforms = transforms.into_iter().collect();
        self
    }

    /// Stage identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input policy.
    pub fn input(&self) -> StageSource {
        self.source
    }

    /// Transform chain, applied left to right.
    pub fn chain(&self) -> &[Transform] {
        &self.transforms
    }

    /// Name of the backend this stage calls.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

impl fmt::Debug for DecodeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeAttempt")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("transforms", &self.transforms)
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Last-resort detector call on the final stage's output.
#[derive(Clone)]
pub struct Fallback {
    name: String,
    backend: Arc<dyn QrBackend>,
}

impl Fallback {
    /// Fallback step with the default identifier.
    pub fn new(backend: Arc<dyn QrBackend>) -> Self {
        Self::named(FALLBACK_STAGE, backend)
    }

    /// Fallback step with a custom identifier.
    pub fn named(name: impl Into<String>, backend: Arc<dyn QrBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    /// Step identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the backend this step calls.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback")
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Immutable decode cascade. Share it behind an `Arc`; `run` takes `&self`
/// and keeps no state between calls.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<DecodeAttempt>,
    fallback: Option<Fallback>,
}

impl Pipeline {
    /// Start an empty builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// [`PipelineConfig::classic`] with the classic decoder in both roles.
    ///
    /// Needs no model files and cannot fail, so it skips the builder.
    pub fn classic() -> Self {
        let classic: Arc<dyn QrBackend> = Arc::new(ClassicBackend::new());
        let config = PipelineConfig::classic();
        let stages = config
            .stages
            .into_iter()
            .map(|stage| {
                DecodeAttempt::new(stage.name, classic.clone())
                    .source(stage.source)
                    .transforms(stage.transforms)
            })
            .collect();
        let fallback = config
            .fallback
            .map(|fallback| Fallback::named(fallback.name, classic));
        Self { stages, fallback }
    }

    /// Configured stages, in evaluation order.
    pub fn stages(&self) -> &[DecodeAttempt] {
        &self.stages
    }

    /// Configured fallback step.
    pub fn fallback(&self) -> Option<&Fallback> {
        self.fallback.as_ref()
    }

    /// Decode an encoded upload.
    ///
    /// Empty or unreadable buffers are rejected before any stage runs.
    pub fn run_bytes(&self, bytes: &[u8]) -> Result<DecodeResult, DecodeError> {
        let image = Image::decode(bytes)?;
        Ok(self.run(&image))
    }

    /// Run the cascade on one image.
    ///
    /// Returns the first non-empty detector output tagged with its stage, or
    /// an empty result once every stage and the fallback came back empty.
    pub fn run(&self, image: &Image) -> DecodeResult {
        let mut previous = image.clone();
        let mut attempts = 0usize;

        for stage in &self.stages {
            let input = match stage.source {
                StageSource::Original => image,
                StageSource::Previous => &previous,
            };
            let candidate = apply_chain(&stage.transforms, input);

            attempts += 1;
            let texts = attempt(&stage.name, stage.backend.as_ref(), &candidate);
            if !texts.is_empty() {
                info!(stage = %stage.name, count = texts.len(), "decoded QR code");
                return DecodeResult::decoded(texts, stage.name.as_str(), attempts);
            }
            debug!(stage = %stage.name, "stage found nothing");
            previous = candidate;
        }

        if let Some(fallback) = &self.fallback {
            attempts += 1;
            let texts = attempt(&fallback.name, fallback.backend.as_ref(), &previous);
            if !texts.is_empty() {
                info!(stage = %fallback.name, count = texts.len(), "decoded QR code");
                return DecodeResult::decoded(texts, fallback.name.as_str(), attempts);
            }
        }

        debug!(attempts, "cascade exhausted without a result");
        DecodeResult::not_found(attempts)
    }
}

/// One detector call. Engine errors and panics are logged and read as "nothing found".
fn attempt(stage: &str, backend: &dyn QrBackend, image: &Image) -> Vec<String> {
    debug!(
        stage,
        backend = backend.name(),
        width = image.width(),
        height = image.height(),
        channels = image.channels(),
        "running detector"
    );
    match catch_unwind(AssertUnwindSafe(|| backend.detect_and_decode(image))) {
        Ok(Ok(texts)) => texts,
        Ok(Err(err)) => {
            warn!(stage, backend = backend.name(), error = %err, "detector failed, skipping stage");
            Vec::new()
        }
        Err(_) => {
            warn!(stage, backend = backend.name(), "detector panicked, skipping stage");
            Vec::new()
        }
    }
}

/// Collects stages and validates them into a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<DecodeAttempt>,
    fallback: Option<Fallback>,
}

impl PipelineBuilder {
    /// Append a stage.
    pub fn stage(mut self, stage: DecodeAttempt) -> Self {
        self.stages.push(stage);
        self
    }

    /// Set the fallback step.
    pub fn fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Validate and freeze the cascade.
    ///
    /// Stage names must be non-empty and unique (fallback included), and all
    /// transform parameters must be valid.
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        if self.stages.is_empty() && self.fallback.is_none() {
            return Err(ConfigError::EmptyCascade);
        }

        let mut seen: Vec<&str> = Vec::new();
        let names = self
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.fallback.iter().map(|f| f.name.as_str()));
        for name in names {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidStage {
                    stage: name.to_string(),
                    reason: "stage name is empty".to_string(),
                });
            }
            if seen.contains(&name) {
                return Err(ConfigError::InvalidStage {
                    stage: name.to_string(),
                    reason: "duplicate stage name".to_string(),
                });
            }
            seen.push(name);
        }

        for stage in &self.stages {
            for transform in &stage.transforms {
                transform
                    .validate()
                    .map_err(|reason| ConfigError::InvalidStage {
                        stage: stage.name.clone(),
                        reason,
                    })?;
            }
        }

        Ok(Pipeline {
            stages: self.stages,
            fallback: self.fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use image::GrayImage;

    struct Fixed(Vec<String>);

    impl QrBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect_and_decode(&self, _image: &Image) -> Result<Vec<String>, BackendError> {
            Ok(self.0.clone())
        }
    }

    fn empty() -> Arc<dyn QrBackend> {
        Arc::new(Fixed(Vec::new()))
    }

    fn image() -> Image {
        Image::from_gray(GrayImage::from_pixel(8, 8, image::Luma([200])))
    }

    #[test]
    fn test_builtin_classic_matches_validated_build() {
        let classic: Arc<dyn QrBackend> = Arc::new(ClassicBackend::new());
        let backends = crate::backend::Backends::new(classic.clone(), Some(classic));
        let built = PipelineConfig::classic().build(&backends).unwrap();
        let builtin = Pipeline::classic();

        assert_eq!(builtin.stages().len(), built.stages().len());
        for (a, b) in builtin.stages().iter().zip(built.stages()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.input(), b.input());
            assert_eq!(a.chain(), b.chain());
            assert_eq!(a.backend_name(), "classic");
        }
        assert_eq!(
            builtin.fallback().map(|f| (f.name(), f.backend_name())),
            Some((FALLBACK_STAGE, "classic"))
        );
    }

    #[test]
    fn test_build_rejects_empty_cascade() {
        assert!(matches!(
            Pipeline::builder().build(),
            Err(ConfigError::EmptyCascade)
        ));
    }

    #[test]
    fn test_build_rejects_duplicate_names() {
        let result = Pipeline::builder()
            .stage(DecodeAttempt::new("direct", empty()))
            .fallback(Fallback::named("direct", empty()))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidStage { .. })));
    }

    #[test]
    fn test_build_rejects_bad_kernel() {
        let result = Pipeline::builder()
            .stage(DecodeAttempt::new("close", empty()).transform(Transform::MorphClose { ksize: 4 }))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidStage { stage, .. }) if stage == "close"));
    }

    #[test]
    fn test_fallback_only_cascade() {
        let pipeline = Pipeline::builder()
            .fallback(Fallback::new(Arc::new(Fixed(vec!["x".into()]))))
            .build()
            .unwrap();
        let result = pipeline.run(&image());
        assert_eq!(result.texts, vec!["x"]);
        assert_eq!(result.stage(), Some(FALLBACK_STAGE));
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_empty_text_counts_as_found() {
        // A code that encodes "" is still a decoded code.
        let pipeline = Pipeline::builder()
            .stage(DecodeAttempt::new("direct", Arc::new(Fixed(vec![String::new()]))))
            .build()
            .unwrap();
        assert!(pipeline.run(&image()).found());
    }

    #[test]
    fn test_run_bytes_rejects_zero_bytes() {
        let pipeline = Pipeline::builder()
            .stage(DecodeAttempt::new("direct", empty()))
            .build()
            .unwrap();
        assert!(matches!(
            pipeline.run_bytes(&[]),
            Err(DecodeError::InputRejected { .. })
        ));
    }
}
