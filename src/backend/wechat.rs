//! Neural primary detector: the WeChat QR engine from opencv_contrib.
//!
//! The engine's `detect_and_decode` takes `&mut self` and is not documented
//! as thread-safe, so calls go through a per-backend mutex. A panic inside
//! the engine does not disable the backend for later calls.

use std::path::Path;
use std::sync::Mutex;

use opencv::core::{Mat, Vector};
use opencv::prelude::*;
use opencv::wechat_qrcode::WeChatQRCode;

use super::artifacts::ModelArtifacts;
use super::{QrBackend, lock_engine};
use crate::error::{BackendError, ConfigError};
use crate::models::Image;

const NAME: &str = "wechat";

/// Model-based detector with CNN localisation and super-resolution.
pub struct WeChatBackend {
    engine: Mutex<WeChatQRCode>,
}

impl WeChatBackend {
    /// Load the four networks. Artifacts must already be validated.
    pub fn new(artifacts: &ModelArtifacts) -> Result<Self, ConfigError> {
        let engine = WeChatQRCode::new(
            path_str(&artifacts.detect_prototxt)?,
            path_str(&artifacts.detect_caffemodel)?,
            path_str(&artifacts.sr_prototxt)?,
            path_str(&artifacts.sr_caffemodel)?,
        )
        .map_err(|err| ConfigError::ModelLoad {
            message: err.to_string(),
        })?;
        Ok(Self {
            engine: Mutex::new(engine),
        })
    }
}

fn path_str(path: &Path) -> Result<&str, ConfigError> {
    path.to_str().ok_or_else(|| ConfigError::ModelLoad {
        message: format!("model path {} is not valid UTF-8", path.display()),
    })
}

fn engine_error(err: opencv::Error) -> BackendError {
    BackendError::Engine {
        backend: NAME.to_string(),
        message: err.to_string(),
    }
}

/// Copy the image into an 8-bit `Mat`, swapping RGB to the BGR order OpenCV expects.
fn to_mat(image: &Image) -> Result<Mat, opencv::Error> {
    let channels = image.channels() as i32;
    let rows = image.height() as i32;
    let bytes: Vec<u8> = if image.is_gray() {
        image.as_bytes().to_vec()
    } else {
        image
            .as_bytes()
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect()
    };
    let flat = Mat::from_slice(&bytes)?;
    let shaped = flat.reshape(channels, rows)?;
    shaped.try_clone()
}

impl QrBackend for WeChatBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn detect_and_decode(&self, image: &Image) -> Result<Vec<String>, BackendError> {
        let mat = to_mat(image).map_err(engine_error)?;
        let mut points = Vector::<Mat>::new();
        let mut engine = lock_engine(NAME, &self.engine);
        let texts = engine
            .detect_and_decode(&mat, &mut points)
            .map_err(engine_error)?;
        Ok(texts.into_iter().collect())
    }
}
