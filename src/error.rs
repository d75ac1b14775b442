//! Error taxonomy for the decklist pipeline.
//!
//! Only [`ValidationError`] and [`SegmentationError`] abort a job. Everything
//! else degrades inside the job and is reported alongside the result.

use thiserror::Error;

/// Rejection of an input payload before any pixel work happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("file is empty or could not be read")]
    Empty,

    #[error("file size ({size_mb:.1}MB) exceeds maximum ({max_mb:.1}MB)")]
    TooLarge { size_mb: f64, max_mb: f64 },

    #[error("unsupported image format (accepted: {accepted})")]
    UnsupportedFormat { accepted: String },

    #[error("maximum {max} images per batch (received {received})")]
    BatchTooLarge { max: usize, received: usize },
}

/// Layout detection failed badly enough that nothing can be extracted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentationError {
    #[error("image has no pixels")]
    EmptyImage,

    #[error("no deck sections detected")]
    NoSections,

    #[error("no card slots detected in {sections} section(s)")]
    NoCardSlots { sections: usize },
}

/// A recognition provider could not be invoked.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),

    #[error("recognizer failed: {0}")]
    Invocation(String),

    #[error("recognizer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode region: {0}")]
    Encode(#[from] image::ImageError),
}

/// One field stayed unresolved after every fallback. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("field `{field}` unresolved: {reason}")]
pub struct FieldExtractionFailure {
    pub field: String,
    pub reason: String,
}

impl FieldExtractionFailure {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog row {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("catalog header is missing column `{0}`")]
    MissingColumn(String),

    #[error("catalog contains no entries")]
    Empty,
}

/// Failure of the optional downstream persistence step.
#[derive(Error, Debug)]
pub enum DownstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("deck API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no cards could be resolved by the deck API")]
    NoResolvableCards,
}

/// Fatal outcome of one image job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("unexpected failure: {0}")]
    Internal(String),
}

impl JobError {
    /// Reason code carried by `error` stream events.
    pub fn reason(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation",
            JobError::Segmentation(_) => "segmentation",
            JobError::Decode(_) => "decode",
            JobError::Internal(_) => "internal",
        }
    }
}
