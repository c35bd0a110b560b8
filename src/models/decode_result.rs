use serde::Serialize;

/// Outcome of one pipeline run.
///
/// `texts` keeps the detector's ordering. `stage` names the stage that
/// produced them and is meant for logs, not for users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeResult {
    /// Decoded payloads, possibly empty.
    pub texts: Vec<String>,
    /// Stage that produced `texts`; `None` when nothing was found.
    pub stage: Option<String>,
    /// Number of detector calls made, fallback included.
    pub attempts: usize,
}

impl DecodeResult {
    /// A successful result from the named stage.
    pub fn decoded(texts: Vec<String>, stage: impl Into<String>, attempts: usize) -> Self {
        Self {
            texts,
            stage: Some(stage.into()),
            attempts,
        }
    }

    /// The cascade ran dry.
    pub fn not_found(attempts: usize) -> Self {
        Self {
            texts: Vec::new(),
            stage: None,
            attempts,
        }
    }

    /// Whether any text was decoded.
    pub fn found(&self) -> bool {
        !self.texts.is_empty()
    }

    /// Stage identifier, if any stage succeeded.
    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }
}
