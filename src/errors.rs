use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the lane label loader.
///
/// Each variant carries the context of its failure (the offending path, split name,
/// catalog index, ...) so callers can match on the kind without parsing messages.
#[derive(Error, Debug)]
pub enum LaneSegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unknown or unloadable split `{name}` (expected one of: train, val)")]
    InvalidSplit { name: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read label map {path:?}")]
    LabelRead {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Gave up reading {path:?} after {attempts} attempts: out of memory")]
    ResourceExhausted { path: PathBuf, attempts: u32 },

    #[error("Duplicate image id `{id}`: {first:?} and {second:?}")]
    DuplicateImageId {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Catalog index {index} is out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("Label map {path:?} contains value {value}, expected < {num_classes}")]
    InvalidLabelValue {
        path: PathBuf,
        value: u16,
        num_classes: usize,
    },

    #[error("Image file name {path:?} is not valid UTF-8")]
    NonUtf8FileName { path: PathBuf },

    #[error("Image error: {operation} failed")]
    Image {
        operation: String,
        #[source]
        source: image::ImageError,
    },
}

pub type Result<T> = std::result::Result<T, LaneSegError>;

impl LaneSegError {
    /// Errors a `LabelErrorPolicy::Skip` scan may step over.
    pub const fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::LabelRead { .. }
                | Self::InvalidLabelValue { .. }
                | Self::NonUtf8FileName { .. }
        )
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should build `LaneSegError::FileSystem`
/// directly; this is the fallback for `?` on bare I/O calls.
impl From<std::io::Error> for LaneSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors raised outside of label decoding (mask export).
impl From<image::ImageError> for LaneSegError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(source) => Self::FileSystem {
                path: PathBuf::from("unknown"),
                operation: "image I/O".to_string(),
                source,
            },
            other => Self::Image {
                operation: "image codec".to_string(),
                source: other,
            },
        }
    }
}

/// Shape errors only come out of label-map and mask construction, where a decoded
/// buffer disagrees with the dimensions it reported.
impl From<ndarray::ShapeError> for LaneSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::LabelRead {
            path: PathBuf::from("unknown"),
            source: Box::new(err),
        }
    }
}
