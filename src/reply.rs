//! Turning decode outcomes into chat replies.
//!
//! This is the boundary layer: it knows nothing about stages or backends,
//! only about the ordered list of texts and what the destination surface
//! can render.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::models::DecodeResult;

/// Header line that precedes decoded texts.
pub const RESULT_HEADER: &str = "QR code result:";
/// Notice sent when no code was found.
pub const NOT_FOUND_NOTICE: &str = "No QR code was found in the image.";
/// Notice sent when the upload could not be read as an image.
pub const UNREADABLE_NOTICE: &str =
    "Could not read the image. Make sure it is a valid, undamaged picture and try again.";
/// Notice sent when the message carries no image at all.
pub const MISSING_IMAGE_NOTICE: &str = "Attach or quote an image in your message.";
/// Notice sent when decoding did not finish.
pub const BUSY_NOTICE: &str = "Decoding did not finish in time. Please try again later.";

/// Platform name whose surface renders forwarded multi-message replies.
const FORWARD_PLATFORM: &str = "aiocqhttp";

/// How decoded texts are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStyle {
    /// One message per decoded text, after a header message.
    Forward,
    /// A single flattened text block.
    #[default]
    Plain,
}

impl ReplyStyle {
    /// Style supported by the named chat platform.
    pub fn for_platform(platform: &str) -> Self {
        if platform == FORWARD_PLATFORM {
            ReplyStyle::Forward
        } else {
            ReplyStyle::Plain
        }
    }
}

/// A reply ready to hand to a chat adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Threaded reply: header entry plus one entry per text.
    Forward {
        /// First entry.
        header: String,
        /// Decoded texts in detector order, untouched.
        entries: Vec<String>,
    },
    /// Flattened reply body.
    Text(String),
    /// Nothing decoded.
    NotFound(String),
    /// The upload could not be read.
    Unreadable(String),
    /// No image was supplied.
    MissingImage(String),
    /// The request did not complete.
    Busy(String),
}

impl Reply {
    /// Reply for a message that carries no image.
    pub fn missing_image() -> Self {
        Reply::MissingImage(MISSING_IMAGE_NOTICE.to_string())
    }

    /// Reply for a finished or failed decode request.
    pub fn for_outcome(outcome: &Result<DecodeResult, DecodeError>, style: ReplyStyle) -> Self {
        match outcome {
            Ok(result) => format_texts(&result.texts, style),
            Err(DecodeError::InputRejected { .. }) => {
                Reply::Unreadable(UNREADABLE_NOTICE.to_string())
            }
            Err(DecodeError::TimedOut { .. } | DecodeError::WorkerGone) => {
                Reply::Busy(BUSY_NOTICE.to_string())
            }
        }
    }

    /// Whether this reply carries decoded content.
    pub fn is_result(&self) -> bool {
        matches!(self, Reply::Forward { .. } | Reply::Text(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Forward { header, entries } => {
                write!(f, "{header}")?;
                for entry in entries {
                    write!(f, "\n---\n{entry}")?;
                }
                Ok(())
            }
            Reply::Text(text)
            | Reply::NotFound(text)
            | Reply::Unreadable(text)
            | Reply::MissingImage(text)
            | Reply::Busy(text) => f.write_str(text),
        }
    }
}

/// Lay out decoded texts. An empty list yields the not-found notice.
pub fn format_texts(texts: &[String], style: ReplyStyle) -> Reply {
    if texts.is_empty() {
        return Reply::NotFound(NOT_FOUND_NOTICE.to_string());
    }
    match style {
        ReplyStyle::Forward => Reply::Forward {
            header: RESULT_HEADER.to_string(),
            entries: texts.to_vec(),
        },
        ReplyStyle::Plain => Reply::Text(plain_block(texts)),
    }
}

fn plain_block(texts: &[String]) -> String {
    let mut block = format!("{RESULT_HEADER} \n");
    for text in texts {
        block.push_str(text.trim());
        block.push('\n');
    }
    block.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_platform_style() {
        assert_eq!(ReplyStyle::for_platform("aiocqhttp"), ReplyStyle::Forward);
        assert_eq!(ReplyStyle::for_platform("telegram"), ReplyStyle::Plain);
    }

    #[test]
    fn test_plain_block_trims_each_text() {
        let reply = format_texts(&texts(&["  https://a.example \n", "second"]), ReplyStyle::Plain);
        assert_eq!(
            reply,
            Reply::Text("QR code result: \nhttps://a.example\nsecond".to_string())
        );
    }

    #[test]
    fn test_plain_block_with_blank_text() {
        let reply = format_texts(&texts(&["   "]), ReplyStyle::Plain);
        assert_eq!(reply, Reply::Text(RESULT_HEADER.to_string()));
    }

    #[test]
    fn test_forward_keeps_entries() {
        let reply = format_texts(&texts(&["one ", "two"]), ReplyStyle::Forward);
        match reply {
            Reply::Forward { header, entries } => {
                assert_eq!(header, RESULT_HEADER);
                assert_eq!(entries, texts(&["one ", "two"]));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_empty_is_not_found() {
        for style in [ReplyStyle::Plain, ReplyStyle::Forward] {
            assert_eq!(
                format_texts(&[], style),
                Reply::NotFound(NOT_FOUND_NOTICE.to_string())
            );
        }
    }

    #[test]
    fn test_outcome_mapping() {
        let rejected = Err(DecodeError::InputRejected {
            reason: "empty".into(),
        });
        assert!(matches!(
            Reply::for_outcome(&rejected, ReplyStyle::Plain),
            Reply::Unreadable(_)
        ));

        let late = Err(DecodeError::TimedOut {
            after: Duration::from_secs(1),
        });
        assert!(matches!(
            Reply::for_outcome(&late, ReplyStyle::Plain),
            Reply::Busy(_)
        ));

        let ok = Ok(DecodeResult::decoded(texts(&["hi"]), "direct", 1));
        let reply = Reply::for_outcome(&ok, ReplyStyle::Plain);
        assert!(reply.is_result());
        assert_eq!(reply.to_string(), "QR code result: \nhi");
    }
}
