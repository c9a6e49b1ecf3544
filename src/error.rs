use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ollama::InferenceError;

/// Failures surfaced by the assessment pipeline.
///
/// Unparseable model output is not an error; it comes back as
/// [`Assessment::RawFallback`](crate::sentinel::Assessment::RawFallback).
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("Failed to read image '{}': {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decode image '{}': {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

pub type Result<T> = std::result::Result<T, SentinelError>;
