//! qrde - QR code decoding with a preprocessing cascade
//!
//! A [`Pipeline`] tries a short, ordered list of detector attempts on one
//! image. Each attempt may first transform the image (grayscale, median
//! smoothing, Otsu binarization, morphological closing). The first attempt
//! that decodes anything wins; when all of them fail a model-free fallback
//! decoder gets a last try.
//!
//! ```no_run
//! use qrde::{AppConfig, Reply, ReplyStyle};
//!
//! let config = AppConfig::default().apply_env();
//! let pipeline = config.build_pipeline()?;
//! let bytes = std::fs::read("code.png")?;
//! let outcome = pipeline.run_bytes(&bytes);
//! println!("{}", Reply::for_outcome(&outcome, ReplyStyle::Plain));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

/// Detector backends (model-based primary, classic fallback)
pub mod backend;
/// Application configuration (JSON file + environment)
pub mod config;
/// Error types
pub mod error;
/// Tracing subscriber setup
pub mod logger;
/// Core data structures (Image, DecodeResult)
pub mod models;
/// The decode cascade
pub mod pipeline;
/// Image transforms applied before a detector call
pub mod preprocess;
/// Reply formatting for chat surfaces
pub mod reply;
/// Worker-pool dispatch
pub mod service;
/// Dataset iteration and reading-rate tallies
pub mod tools;
/// Pixel kernels (grayscale, binarization, filters)
pub mod utils;

pub use backend::{BackendRole, Backends, ClassicBackend, ModelArtifacts, QrBackend};
pub use config::AppConfig;
pub use error::{BackendError, ConfigError, DecodeError};
pub use models::{DecodeResult, Image};
pub use pipeline::{DecodeAttempt, Fallback, Pipeline, PipelineBuilder, PipelineConfig, StageSource};
pub use preprocess::Transform;
pub use reply::{Reply, ReplyStyle};
pub use service::{DecodeService, DecodeTicket};

/// Decode an encoded image with [`Pipeline::classic`], built on first use.
///
/// Needs no model files. Hosts that want models or a custom cascade should
/// build their own [`Pipeline`] from an [`AppConfig`].
pub fn decode(bytes: &[u8]) -> Result<DecodeResult, DecodeError> {
    static CLASSIC: std::sync::OnceLock<Pipeline> = std::sync::OnceLock::new();
    CLASSIC.get_or_init(Pipeline::classic).run_bytes(bytes)
}
