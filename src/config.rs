//! Application configuration.
//!
//! Loaded from an optional JSON file, then overridden from the environment:
//!
//! | Variable           | Effect                                           |
//! |--------------------|--------------------------------------------------|
//! | `QRDE_MODELS_DIR`  | models directory (replaces explicit model paths) |
//! | `QRDE_WORKERS`     | worker threads, `0` for one per core             |
//! | `QRDE_NO_FALLBACK` | non-zero disables the fallback decoder           |

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{Backends, ClassicBackend, ModelArtifacts, QrBackend, load_model_backend};
use crate::error::ConfigError;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::reply::ReplyStyle;
use crate::service::DecodeService;

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the four model files under their standard names.
    pub models_dir: Option<PathBuf>,
    /// Explicit model paths. Take precedence over `models_dir`.
    pub models: Option<ModelArtifacts>,
    /// Cascade definition. `None` picks the standard cascade for whichever
    /// detector fills the primary role.
    pub pipeline: Option<PipelineConfig>,
    /// Worker threads; `None` means one per core.
    pub workers: Option<usize>,
    /// Reply layout for surfaces that do not announce their own.
    pub reply_style: ReplyStyle,
    /// Whether to run the model-free fallback decoder.
    pub use_fallback: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models_dir: None,
            models: None,
            pipeline: None,
            workers: None,
            reply_style: ReplyStyle::default(),
            use_fallback: true,
        }
    }
}

fn parse_env_usize(value: Option<String>) -> Option<usize> {
    value.and_then(|v| v.trim().parse::<usize>().ok())
}

fn parse_env_bool_u8(value: Option<String>, default: bool) -> bool {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map(|v| v != 0)
        .unwrap_or(default)
}

impl AppConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|name| env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("QRDE_MODELS_DIR").filter(|v| !v.trim().is_empty()) {
            self.models_dir = Some(PathBuf::from(dir.trim()));
            self.models = None;
        }
        if let Some(workers) = parse_env_usize(lookup("QRDE_WORKERS")) {
            self.workers = (workers > 0).then_some(workers);
        }
        self.use_fallback = !parse_env_bool_u8(lookup("QRDE_NO_FALLBACK"), !self.use_fallback);
        self
    }

    /// Model paths, if any source configured them.
    pub fn artifacts(&self) -> Option<ModelArtifacts> {
        self.models
            .clone()
            .or_else(|| self.models_dir.as_ref().map(ModelArtifacts::from_dir))
    }

    /// The cascade to build: the configured one, or the standard cascade
    /// for the model detector or the classic decoder.
    pub fn pipeline_config(&self) -> PipelineConfig {
        match (&self.pipeline, self.artifacts()) {
            (Some(pipeline), _) => pipeline.clone(),
            (None, Some(_)) => PipelineConfig::default(),
            (None, None) => PipelineConfig::classic(),
        }
    }

    /// Construct the backends.
    ///
    /// With models configured the primary is the model detector and any
    /// artifact problem is fatal. Without models the classic decoder fills
    /// the primary role too.
    pub fn build_backends(&self) -> Result<Backends, ConfigError> {
        let primary: Arc<dyn QrBackend> = match self.artifacts() {
            Some(artifacts) => load_model_backend(&artifacts)?,
            None => {
                info!("no detector models configured, classic decoder runs the primary stages");
                Arc::new(ClassicBackend::new())
            }
        };
        let secondary: Option<Arc<dyn QrBackend>> = if self.use_fallback {
            Some(Arc::new(ClassicBackend::new()))
        } else {
            None
        };
        Ok(Backends::new(primary, secondary))
    }

    /// Build backends and the cascade.
    pub fn build_pipeline(&self) -> Result<Pipeline, ConfigError> {
        let backends = self.build_backends()?;
        let pipeline = self.pipeline_config();
        if self.use_fallback {
            pipeline.build(&backends)
        } else {
            pipeline.without_fallback().build(&backends)
        }
    }

    /// Build the cascade and start its worker pool.
    pub fn build_service(&self) -> Result<DecodeService, ConfigError> {
        DecodeService::new(self.build_pipeline()?, self.workers)
    }
}
