//! Camera stream seam: open, read next frame, close.
//!
//! The worker only depends on these traits. The OpenCV backend (feature `opencv`)
//! implements them over RTSP; tests implement them with scripted frames.

use crate::error::{ConnectError, ReadError};
use crate::models::{Camera, Frame};

/// An open camera stream. Exclusively owned by one worker.
pub trait FrameStream: Send {
    /// Blocks until the next frame is decoded or the read fails.
    fn read_frame(&mut self) -> Result<Frame, ReadError>;

    /// Releases the underlying connection. Called exactly once by `StreamHandle`.
    fn close(&mut self);
}

/// Opens streams from connection descriptors.
pub trait StreamConnector: Send + Sync {
    fn open(&self, camera: &Camera) -> Result<Box<dyn FrameStream>, ConnectError>;
}

/// Owns an open stream and closes it when dropped, on every exit path.
pub struct StreamHandle {
    stream: Box<dyn FrameStream>,
    closed: bool,
}

impl StreamHandle {
    pub fn new(stream: Box<dyn FrameStream>) -> Self {
        Self { stream, closed: false }
    }

    pub fn read_frame(&mut self) -> Result<Frame, ReadError> {
        self.stream.read_frame()
    }

    /// Closes the stream now instead of at drop.
    pub fn release(mut self) {
        self.close_once();
    }

    fn close_once(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stream.close();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close_once();
    }
}

#[cfg(feature = "opencv")]
pub use self::opencv_backend::OpenCvConnector;

#[cfg(feature = "opencv")]
mod opencv_backend {
    use super::{FrameStream, StreamConnector};
    use crate::error::{ConnectError, ReadError};
    use crate::models::{Camera, CameraId, Frame, RGB_CHANNELS};
    use chrono::Utc;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture},
    };

    /// RTSP streams decoded by OpenCV's `VideoCapture`.
    #[derive(Debug, Default, Clone)]
    pub struct OpenCvConnector;

    impl OpenCvConnector {
        pub fn new() -> Self {
            Self
        }
    }

    impl StreamConnector for OpenCvConnector {
        fn open(&self, camera: &Camera) -> Result<Box<dyn FrameStream>, ConnectError> {
            let url = camera
                .connection
                .rtsp_url()
                .map_err(|reason| ConnectError::InvalidDescriptor {
                    camera_id: camera.id.clone(),
                    reason,
                })?;
            let backend = |e: opencv::Error| ConnectError::Backend {
                camera_id: camera.id.clone(),
                message: e.to_string(),
            };

            let mut capture = VideoCapture::from_file(&url, videoio::CAP_ANY).map_err(backend)?;
            if !capture.is_opened().map_err(backend)? {
                return Err(ConnectError::Unreachable {
                    camera_id: camera.id.clone(),
                    target: camera.connection.redacted_url(),
                });
            }
            // Keep only the newest frame buffered; stale frames are worthless here.
            if let Err(e) = capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0) {
                tracing::debug!(camera_id = %camera.id, error = %e, "Capture buffer size not adjustable");
            }

            Ok(Box::new(OpenCvStream {
                camera_id: camera.id.clone(),
                capture,
                bgr: Mat::default(),
            }))
        }
    }

    pub struct OpenCvStream {
        camera_id: CameraId,
        capture: VideoCapture,
        bgr: Mat,
    }

    impl FrameStream for OpenCvStream {
        fn read_frame(&mut self) -> Result<Frame, ReadError> {
            let got_frame = self
                .capture
                .read(&mut self.bgr)
                .map_err(|e| ReadError::Backend(e.to_string()))?;
            if !got_frame || self.bgr.empty() {
                return Err(ReadError::NoFrame);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&self.bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)
                .map_err(|e| ReadError::Backend(e.to_string()))?;
            let data = rgb
                .data_bytes()
                .map_err(|e| ReadError::Backend(e.to_string()))?
                .to_vec();

            Ok(Frame::new(
                self.camera_id.clone(),
                Utc::now(),
                rgb.cols() as u32,
                rgb.rows() as u32,
                RGB_CHANNELS,
                data,
            ))
        }

        fn close(&mut self) {
            if let Err(e) = self.capture.release() {
                tracing::warn!(camera_id = %self.camera_id, error = %e, "Failed to release capture");
            }
        }
    }
}
