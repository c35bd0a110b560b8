//! Detector backends
//!
//! A backend turns one [`Image`] into zero or more decoded strings. The
//! pipeline only sees the [`QrBackend`] trait, so the neural primary detector
//! and the classic fallback decoder are interchangeable at every stage.
//!
//! Backends are built once and shared read-only between requests. A backend
//! whose engine is not reentrant serializes calls internally.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BackendError, ConfigError};
use crate::models::Image;

pub mod artifacts;
pub mod classic;
#[cfg(feature = "wechat")]
pub mod wechat;

pub use artifacts::{ArtifactKind, ModelArtifacts};
pub use classic::{ClassicBackend, utf8_payloads};

/// Locate and decode QR codes in a pixel buffer.
///
/// An image without a code is a normal outcome and must return `Ok(vec![])`.
/// `Err` is reserved for the engine itself failing.
pub trait QrBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Decode every QR code the engine can find, in engine order.
    fn detect_and_decode(&self, image: &Image) -> Result<Vec<String>, BackendError>;
}

/// Which configured backend a stage talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendRole {
    /// The main (model-based) detector.
    #[default]
    Primary,
    /// The model-free fallback decoder.
    Secondary,
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendRole::Primary => f.write_str("primary"),
            BackendRole::Secondary => f.write_str("secondary"),
        }
    }
}

/// The constructed backends, injected into the pipeline at build time.
#[derive(Clone)]
pub struct Backends {
    primary: Arc<dyn QrBackend>,
    secondary: Option<Arc<dyn QrBackend>>,
}

impl Backends {
    /// Bundle a primary backend with an optional fallback.
    pub fn new(primary: Arc<dyn QrBackend>, secondary: Option<Arc<dyn QrBackend>>) -> Self {
        Self { primary, secondary }
    }

    /// Backend filling `role`, if one is configured.
    pub fn get(&self, role: BackendRole) -> Option<&Arc<dyn QrBackend>> {
        match role {
            BackendRole::Primary => Some(&self.primary),
            BackendRole::Secondary => self.secondary.as_ref(),
        }
    }

    /// The primary backend.
    pub fn primary(&self) -> &Arc<dyn QrBackend> {
        &self.primary
    }

    /// The fallback backend, if configured.
    pub fn secondary(&self) -> Option<&Arc<dyn QrBackend>> {
        self.secondary.as_ref()
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.as_ref().map(|b| b.name()))
            .finish()
    }
}

/// Lock a non-reentrant engine.
///
/// A panic inside an earlier call poisons the mutex. The pipeline already
/// caught that panic, so the engine is taken back and the poison cleared.
#[cfg_attr(not(feature = "wechat"), allow(dead_code))]
pub(crate) fn lock_engine<'a, T>(backend: &str, engine: &'a Mutex<T>) -> MutexGuard<'a, T> {
    engine.lock().unwrap_or_else(|poisoned| {
        warn!(backend, "detector lock poisoned by an earlier panic, recovering");
        engine.clear_poison();
        poisoned.into_inner()
    })
}

/// Build the model-based primary backend from its artifacts.
///
/// Artifacts are validated first, so a broken install is reported the same
/// way whether or not the engine is compiled in.
pub fn load_model_backend(artifacts: &ModelArtifacts) -> Result<Arc<dyn QrBackend>, ConfigError> {
    artifacts.validate()?;
    info!(
        detect = %artifacts.detect_prototxt.display(),
        sr = %artifacts.sr_prototxt.display(),
        "loading model detector"
    );
    build_engine(artifacts)
}

#[cfg(feature = "wechat")]
fn build_engine(artifacts: &ModelArtifacts) -> Result<Arc<dyn QrBackend>, ConfigError> {
    Ok(Arc::new(wechat::WeChatBackend::new(artifacts)?))
}

#[cfg(not(feature = "wechat"))]
fn build_engine(_artifacts: &ModelArtifacts) -> Result<Arc<dyn QrBackend>, ConfigError> {
    Err(ConfigError::BackendUnavailable {
        name: "wechat".to_string(),
        reason: "built without the `wechat` feature".to_string(),
    })
}
