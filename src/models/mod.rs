//! Core data structures passed between the pipeline and its callers

/// Pipeline outcome
pub mod decode_result;
/// Decoded pixel buffers
pub mod pixels;

pub use decode_result::DecodeResult;
pub use pixels::Image;
