//! Model files for the neural primary detector.
//!
//! The detector needs two network pairs: a QR localisation net and a
//! super-resolution net, each as a Caffe architecture (`.prototxt`) plus
//! weights (`.caffemodel`). All four are checked up front so a bad install
//! fails at startup instead of on the first request.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default file name of the detection network architecture.
pub const DETECT_PROTOTXT: &str = "detect.prototxt";
/// Default file name of the detection network weights.
pub const DETECT_CAFFEMODEL: &str = "detect.caffemodel";
/// Default file name of the super-resolution network architecture.
pub const SR_PROTOTXT: &str = "sr.prototxt";
/// Default file name of the super-resolution network weights.
pub const SR_CAFFEMODEL: &str = "sr.caffemodel";

/// Identifies one of the four artifacts in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Detection network architecture.
    DetectPrototxt,
    /// Detection network weights.
    DetectWeights,
    /// Super-resolution network architecture.
    SrPrototxt,
    /// Super-resolution network weights.
    SrWeights,
}

impl ArtifactKind {
    fn is_prototxt(self) -> bool {
        matches!(self, ArtifactKind::DetectPrototxt | ArtifactKind::SrPrototxt)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::DetectPrototxt => "detection architecture",
            ArtifactKind::DetectWeights => "detection weights",
            ArtifactKind::SrPrototxt => "super-resolution architecture",
            ArtifactKind::SrWeights => "super-resolution weights",
        };
        f.pad(label)
    }
}

/// Paths to the four model artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifacts {
    /// Detection network architecture.
    pub detect_prototxt: PathBuf,
    /// Detection network weights.
    pub detect_caffemodel: PathBuf,
    /// Super-resolution network architecture.
    pub sr_prototxt: PathBuf,
    /// Super-resolution network weights.
    pub sr_caffemodel: PathBuf,
}

impl ModelArtifacts {
    /// Standard file names inside `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            detect_prototxt: dir.join(DETECT_PROTOTXT),
            detect_caffemodel: dir.join(DETECT_CAFFEMODEL),
            sr_prototxt: dir.join(SR_PROTOTXT),
            sr_caffemodel: dir.join(SR_CAFFEMODEL),
        }
    }

    /// All four paths with their roles, in engine argument order.
    pub fn entries(&self) -> [(ArtifactKind, &Path); 4] {
        [
            (ArtifactKind::DetectPrototxt, self.detect_prototxt.as_path()),
            (ArtifactKind::DetectWeights, self.detect_caffemodel.as_path()),
            (ArtifactKind::SrPrototxt, self.sr_prototxt.as_path()),
            (ArtifactKind::SrWeights, self.sr_caffemodel.as_path()),
        ]
    }

    /// Check that every artifact exists, is non-empty and, for architecture
    /// files, looks like a Caffe network definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, path) in self.entries() {
            validate_artifact(kind, path)?;
        }
        Ok(())
    }
}

fn validate_artifact(kind: ArtifactKind, path: &Path) -> Result<(), ConfigError> {
    let metadata = fs::metadata(path).map_err(|_| ConfigError::MissingArtifact {
        kind,
        path: path.to_path_buf(),
    })?;
    if !metadata.is_file() {
        return Err(ConfigError::MalformedArtifact {
            kind,
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    if metadata.len() == 0 {
        return Err(ConfigError::EmptyArtifact {
            kind,
            path: path.to_path_buf(),
        });
    }
    if kind.is_prototxt() {
        check_prototxt(kind, path)?;
    }
    Ok(())
}

fn check_prototxt(kind: ArtifactKind, path: &Path) -> Result<(), ConfigError> {
    let malformed = |reason: &str| ConfigError::MalformedArtifact {
        kind,
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let bytes = fs::read(path)?;
    let text = std::str::from_utf8(&bytes).map_err(|_| malformed("not UTF-8 text"))?;
    let declares_network = text.lines().map(str::trim_start).any(|line| {
        line.starts_with("layer") || line.starts_with("input") || line.starts_with("name:")
    });
    if !declares_network {
        return Err(malformed("no layer or input declarations"));
    }
    Ok(())
}
