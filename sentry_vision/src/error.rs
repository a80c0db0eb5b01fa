//! Error types for the capture, analysis and supervision layers.
//!
//! Each enum maps to one failure class and one recovery policy:
//!
//! | Error               | Scope of the failure                          |
//! |---------------------|-----------------------------------------------|
//! | `ConnectError`      | ends one worker instance, camera -> `error`   |
//! | `ReadError`         | retried in place by the worker                |
//! | `FrameFormatError`  | current frame skipped                         |
//! | `AnalysisError`     | one analysis kind skipped for one frame       |
//! | `PersistenceError`  | the frame's record is dropped                 |
//! | `InventoryError`    | supervisor cycle retried after a backoff      |

use crate::models::CameraId;

/// The stream for a camera could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("camera {camera_id}: stream could not be opened at {target}")]
    Unreachable { camera_id: CameraId, target: String },

    #[error("camera {camera_id}: invalid connection descriptor: {reason}")]
    InvalidDescriptor { camera_id: CameraId, reason: String },

    #[error("camera {camera_id}: stream backend error: {message}")]
    Backend { camera_id: CameraId, message: String },
}

/// A frame could not be read from an open stream.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("no frame available")]
    NoFrame,

    #[error("read timed out")]
    Timeout,

    #[error("stream backend error: {0}")]
    Backend(String),
}

/// A frame does not have the shape the consumer expects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameFormatError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGB")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("frame is {actual_width}x{actual_height}, background model is {model_width}x{model_height}")]
    DimensionMismatch {
        model_width: u32,
        model_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// The external classifier could not produce a label.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("classifier returned HTTP {0}")]
    Status(u16),

    #[error("classifier input could not be encoded: {0}")]
    Encode(#[from] image::ImageError),

    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// One analysis kind failed on one frame.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("classifier returned an invalid confidence ({0})")]
    InvalidConfidence(f64),

    #[error("frame format error: {0}")]
    Frame(#[from] FrameFormatError),
}

/// A frame image or analysis record could not be stored.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// The camera inventory could not be read or updated.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("inventory parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown camera {0}")]
    UnknownCamera(CameraId),

    #[error("inventory unavailable: {0}")]
    Unavailable(String),
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {name} has an invalid value {value:?}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
