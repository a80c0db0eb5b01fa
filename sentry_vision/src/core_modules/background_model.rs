// THEORY:
// The `BackgroundModel` is the temporal memory of the Motion Gate. It is a stateful,
// learning entity that holds one running estimate of "what this pixel normally looks
// like" for every pixel of a camera's frame, and classifies each new sample as
// background or foreground against that estimate.
//
// Key architectural principles:
// 1.  **One Gaussian per pixel**: each pixel keeps a mean color and a single shared
//     variance. A sample is foreground when its squared distance from the mean exceeds
//     `variance_threshold` times the variance (a Mahalanobis test).
// 2.  **Always learning**: the estimate moves toward every sample, foreground or not.
//     There is no freeze mode; an object that stops moving fades into the background
//     over roughly `history` frames.
// 3.  **Fast warm-up**: the learning rate starts high (1 / 2n for the n-th frame) and
//     settles at 1 / history, so a freshly created model stabilizes within a few
//     frames instead of a few hundred.
// 4.  **Bounded variance**: variance is clamped to [variance_min, variance_max] so a
//     perfectly static scene does not become infinitely sensitive, and a noisy one
//     does not become blind.

use crate::config::MotionConfig;
use crate::error::FrameFormatError;

const CHANNELS: usize = 3;

/// Per-pixel foreground decisions for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundMask {
    pub width: u32,
    pub height: u32,
    /// Row-major; `true` marks a foreground pixel.
    pub pixels: Vec<bool>,
}

impl ForegroundMask {
    pub fn foreground_count(&self) -> usize {
        self.pixels.iter().filter(|&&fg| fg).count()
    }

    /// Share of foreground pixels in [0, 1]. An empty mask has no foreground.
    pub fn foreground_fraction(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.foreground_count() as f64 / self.pixels.len() as f64
    }
}

/// A running per-pixel background estimate for one camera.
pub struct BackgroundModel {
    // --- Identity ---
    /// Frame width in pixels this model was created for.
    width: u32,
    /// Frame height in pixels this model was created for.
    height: u32,

    // --- Learned State ---
    /// Running mean color per pixel.
    mean: Vec<[f32; CHANNELS]>,
    /// Running variance per pixel, shared across channels.
    variance: Vec<f32>,
    /// Frames folded into the estimate so far.
    frames_seen: u32,

    // --- Tuning ---
    config: MotionConfig,
}

impl BackgroundModel {
    pub fn new(width: u32, height: u32, config: MotionConfig) -> Self {
        let num_pixels = width as usize * height as usize;
        Self {
            width,
            height,
            mean: vec![[0.0; CHANNELS]; num_pixels],
            variance: vec![config.variance_init; num_pixels],
            frames_seen: 0,
            config,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Learning rate for the next update.
    fn learning_rate(&self) -> f32 {
        let horizon = self
            .frames_seen
            .max(1)
            .saturating_mul(2)
            .min(self.config.history.max(1));
        1.0 / horizon as f32
    }

    /// Classifies every pixel of a packed RGB buffer, then folds the buffer into the estimate.
    pub fn apply(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<ForegroundMask, FrameFormatError> {
        if (width, height) != (self.width, self.height) {
            return Err(FrameFormatError::DimensionMismatch {
                model_width: self.width,
                model_height: self.height,
                actual_width: width,
                actual_height: height,
            });
        }
        let expected = self.mean.len() * CHANNELS;
        if rgb.len() != expected {
            return Err(FrameFormatError::BufferSize {
                width,
                height,
                expected,
                actual: rgb.len(),
            });
        }

        // The first frame seeds the estimate and is all background.
        if self.frames_seen == 0 {
            for (mean, sample) in self.mean.iter_mut().zip(rgb.chunks_exact(CHANNELS)) {
                for channel in 0..CHANNELS {
                    mean[channel] = sample[channel] as f32;
                }
            }
            self.frames_seen = 1;
            return Ok(ForegroundMask {
                width,
                height,
                pixels: vec![false; self.mean.len()],
            });
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = self.learning_rate();
        let threshold = self.config.variance_threshold;
        let (variance_min, variance_max) = (self.config.variance_min, self.config.variance_max);

        let pixels = self
            .mean
            .iter_mut()
            .zip(self.variance.iter_mut())
            .zip(rgb.chunks_exact(CHANNELS))
            .map(|((mean, variance), sample)| {
                let mut deltas = [0.0f32; CHANNELS];
                let mut distance_squared = 0.0f32;
                for channel in 0..CHANNELS {
                    deltas[channel] = sample[channel] as f32 - mean[channel];
                    distance_squared += deltas[channel] * deltas[channel];
                }

                let is_foreground = distance_squared > threshold * *variance;

                for channel in 0..CHANNELS {
                    mean[channel] += alpha * deltas[channel];
                }
                *variance = (*variance + alpha * (distance_squared - *variance)).clamp(variance_min, variance_max);

                is_foreground
            })
            .collect();

        Ok(ForegroundMask { width, height, pixels })
    }
}
