// THEORY:
// The `MotionGate` is the first decision point of a camera's processing cycle. It owns
// that camera's `BackgroundModel`, feeds it every frame, and reduces the resulting
// per-pixel foreground mask to a single yes/no answer: is something moving?
//
// Key architectural principles:
// 1.  **Per-camera ownership**: a gate belongs to exactly one camera worker. Its model
//     is never shared, so no synchronization is needed around it.
// 2.  **Lazy model creation**: the background model is created from the first frame's
//     dimensions. A well-formed frame at a new resolution (the camera renegotiated
//     its stream) replaces the model with a fresh one seeded from that frame.
//     Malformed frames are rejected as format errors and leave the model untouched.
// 3.  **Fraction threshold**: motion is declared when the foreground fraction is
//     strictly greater than `foreground_threshold` (1% by default). The model learns
//     from every accepted frame, whether or not motion was declared.

use crate::config::MotionConfig;
use crate::core_modules::background_model::{BackgroundModel, ForegroundMask};
use crate::error::FrameFormatError;
use crate::models::Frame;

/// Motion decision for a foreground mask under a given threshold.
pub fn motion_detected(mask: &ForegroundMask, threshold: f64) -> bool {
    mask.foreground_fraction() > threshold
}

/// Stateful motion detector for a single camera.
pub struct MotionGate {
    config: MotionConfig,
    model: Option<BackgroundModel>,
    last_fraction: f64,
}

impl MotionGate {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            model: None,
            last_fraction: 0.0,
        }
    }

    /// Updates the background model with `frame` and reports whether it shows motion.
    pub fn observe(&mut self, frame: &Frame) -> Result<bool, FrameFormatError> {
        frame.validate()?;

        if let Some(model) = &self.model {
            let (width, height) = model.dimensions();
            if (width, height) != (frame.width, frame.height) {
                tracing::warn!(
                    camera_id = %frame.camera_id,
                    from = %format!("{width}x{height}"),
                    to = %format!("{}x{}", frame.width, frame.height),
                    "Frame size changed, relearning background"
                );
                self.model = None;
            }
        }

        let config = &self.config;
        let model = self
            .model
            .get_or_insert_with(|| BackgroundModel::new(frame.width, frame.height, config.clone()));
        let mask = model.apply(&frame.data, frame.width, frame.height)?;

        self.last_fraction = mask.foreground_fraction();
        Ok(motion_detected(&mask, self.config.foreground_threshold))
    }

    /// Foreground fraction of the most recently accepted frame.
    pub fn last_fraction(&self) -> f64 {
        self.last_fraction
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}
