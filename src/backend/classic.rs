//! Model-free fallback decoder built on `rqrr`.

use tracing::debug;

use super::QrBackend;
use crate::error::BackendError;
use crate::models::Image;

/// Classic finder-pattern QR decoder. Needs no model files and is reentrant:
/// every call builds its own working buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicBackend;

impl ClassicBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }

    /// Raw payload bytes of every grid that decodes, in detection order.
    /// Grids that fail error correction are skipped.
    pub fn decode_payloads(&self, image: &Image) -> Vec<Vec<u8>> {
        let gray = image.to_luma();
        let width = gray.width() as usize;
        let pixels = gray.as_raw();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, gray.height() as usize, |x, y| {
                pixels[y * width + x]
            });

        let grids = prepared.detect_grids();
        let mut payloads = Vec::with_capacity(grids.len());
        for (idx, grid) in grids.iter().enumerate() {
            let mut payload = Vec::new();
            match grid.decode_to(&mut payload) {
                Ok(_) => payloads.push(payload),
                Err(err) => debug!(grid = idx, error = %err, "grid failed to decode"),
            }
        }
        payloads
    }
}

impl QrBackend for ClassicBackend {
    fn name(&self) -> &str {
        "classic"
    }

    fn detect_and_decode(&self, image: &Image) -> Result<Vec<String>, BackendError> {
        Ok(utf8_payloads(self.decode_payloads(image)))
    }
}

/// Keep the payloads that are valid UTF-8, in order. Invalid ones are
/// dropped individually; they never fail the whole batch.
pub fn utf8_payloads(payloads: Vec<Vec<u8>>) -> Vec<String> {
    payloads
        .into_iter()
        .enumerate()
        .filter_map(|(idx, bytes)| match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(err) => {
                debug!(payload = idx, error = %err.utf8_error(), "dropping non UTF-8 payload");
                None
            }
        })
        .collect()
}
