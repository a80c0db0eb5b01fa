//! Color-mask fire heuristic.
//!
//! A pixel is "fire colored" when its 8-bit hue falls in one of the configured bands
//! and its saturation and value both reach the configured minimums. The frame is
//! flagged when the share of such pixels exceeds the threshold. Stateless: the same
//! image always yields the same reading.

use crate::config::FireConfig;
use crate::core_modules::pixel::{Hsv8, Pixel};
use image::RgbImage;

/// Outcome of one fire scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireReading {
    /// Share of fire-colored pixels in [0, 1].
    pub fraction: f64,
    pub flagged: bool,
}

pub struct FireDetector {
    config: FireConfig,
}

impl FireDetector {
    pub fn new(config: FireConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FireConfig {
        &self.config
    }

    fn is_fire_colored(&self, hsv: Hsv8) -> bool {
        hsv.saturation >= self.config.min_saturation
            && hsv.value >= self.config.min_value
            && self.config.hue_bands.iter().any(|band| band.contains(hsv.hue))
    }

    /// Share of pixels inside the fire mask.
    pub fn fire_fraction(&self, image: &RgbImage) -> f64 {
        let total = image.width() as usize * image.height() as usize;
        if total == 0 {
            return 0.0;
        }
        let masked = image
            .pixels()
            .filter(|rgb| self.is_fire_colored(Pixel::from(**rgb).hsv8()))
            .count();
        masked as f64 / total as f64
    }

    pub fn scan(&self, image: &RgbImage) -> FireReading {
        let fraction = self.fire_fraction(image);
        FireReading {
            fraction,
            flagged: fraction > self.config.threshold,
        }
    }
}
