//! Service configuration.
//!
//! `ServiceConfig::default()` carries the reference tuning; `from_env` overlays
//! `SENTRY_*` environment variables and validates the result.

use crate::error::ConfigError;
use crate::scheduler::rate_interval;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Tuning for the adaptive background model behind the Motion Gate.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    /// Fraction of foreground pixels above which a frame counts as motion.
    pub foreground_threshold: f64,
    /// Number of frames the background estimate effectively remembers.
    pub history: u32,
    /// Squared Mahalanobis distance beyond which a pixel is foreground.
    pub variance_threshold: f32,
    pub variance_init: f32,
    pub variance_min: f32,
    pub variance_max: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            foreground_threshold: 0.01,
            history: 500,
            variance_threshold: 16.0,
            variance_init: 15.0,
            variance_min: 4.0,
            variance_max: 75.0,
        }
    }
}

/// An inclusive hue range in the 8-bit scale (0..=180).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HueBand {
    pub min: u8,
    pub max: u8,
}

impl HueBand {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, hue: u8) -> bool {
        (self.min..=self.max).contains(&hue)
    }
}

/// Color-mask heuristic for the fire analysis kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FireConfig {
    /// Red/orange at the bottom of the wheel and the red wrap-around at the top.
    pub hue_bands: Vec<HueBand>,
    pub min_saturation: u8,
    pub min_value: u8,
    /// Masked-pixel fraction above which the frame is flagged.
    pub threshold: f64,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            hue_bands: vec![HueBand::new(0, 10), HueBand::new(170, 180)],
            min_saturation: 50,
            min_value: 50,
            threshold: 0.05,
        }
    }
}

/// Maximum dispatch rate per analysis kind, in frames per second.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRates {
    pub violence_fps: f64,
    pub fire_fps: f64,
}

impl Default for AnalysisRates {
    fn default() -> Self {
        Self {
            violence_fps: 1.0,
            fire_fps: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Pause between frame reads; caps CPU usage per camera.
    pub poll_delay: Duration,
    /// Pause after a failed read before retrying.
    pub read_retry_delay: Duration,
    /// JPEG quality for stored frames (1-100).
    pub jpeg_quality: u8,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_delay: Duration::from_millis(100),
            read_retry_delay: Duration::from_secs(1),
            jpeg_quality: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Pause between reconciliation cycles.
    pub poll_interval: Duration,
    /// Pause after a failed inventory fetch.
    pub fetch_retry_delay: Duration,
    /// How long shutdown waits for each worker before abandoning it.
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            fetch_retry_delay: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything the service binary needs to wire itself up.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub motion: MotionConfig,
    pub fire: FireConfig,
    pub rates: AnalysisRates,
    pub worker: WorkerConfig,
    pub supervisor: SupervisorConfig,
    /// JSON file listing the cameras.
    pub inventory_path: PathBuf,
    /// Root directory for stored frames and analysis records.
    pub storage_dir: PathBuf,
    /// Endpoint of the image classifier; the violence kind is disabled without it.
    pub classifier_url: Option<String>,
    pub classifier_timeout: Duration,
    pub log_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            motion: MotionConfig::default(),
            fire: FireConfig::default(),
            rates: AnalysisRates::default(),
            worker: WorkerConfig::default(),
            supervisor: SupervisorConfig::default(),
            inventory_path: PathBuf::from("cameras.json"),
            storage_dir: PathBuf::from("storage"),
            classifier_url: None,
            classifier_timeout: Duration::from_secs(10),
            log_file: Some(PathBuf::from("analyzer.log")),
        }
    }
}

impl ServiceConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`, then validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServiceConfig::default();

        if let Some(path) = lookup("SENTRY_INVENTORY_PATH") {
            config.inventory_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("SENTRY_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("SENTRY_CLASSIFIER_URL") {
            config.classifier_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(path) = lookup("SENTRY_LOG_FILE") {
            config.log_file = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(fps) = parse_var(&lookup, "SENTRY_VIOLENCE_FPS")? {
            config.rates.violence_fps = fps;
        }
        if let Some(fps) = parse_var(&lookup, "SENTRY_FIRE_FPS")? {
            config.rates.fire_fps = fps;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SENTRY_POLL_INTERVAL_SECS")? {
            config.supervisor.poll_interval = Duration::from_secs(secs);
        }
        if let Some(threshold) = parse_var(&lookup, "SENTRY_MOTION_THRESHOLD")? {
            config.motion.foreground_threshold = threshold;
        }
        if let Some(threshold) = parse_var(&lookup, "SENTRY_FIRE_THRESHOLD")? {
            config.fire.threshold = threshold;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, fps) in [
            ("violence", self.rates.violence_fps),
            ("fire", self.rates.fire_fps),
        ] {
            if rate_interval(fps).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{name} rate must be a positive number of frames per second with a representable interval, got {fps}"
                )));
            }
        }

        let fastest = self.rates.violence_fps.max(self.rates.fire_fps);
        if self.worker.poll_delay.as_secs_f64() >= 1.0 / fastest {
            return Err(ConfigError::Invalid(format!(
                "poll delay {:?} must be shorter than the fastest analysis interval ({:.3}s)",
                self.worker.poll_delay,
                1.0 / fastest
            )));
        }

        if !(0.0..1.0).contains(&self.motion.foreground_threshold) {
            return Err(ConfigError::Invalid(format!(
                "motion threshold must be in [0, 1), got {}",
                self.motion.foreground_threshold
            )));
        }
        if self.motion.history == 0 {
            return Err(ConfigError::Invalid("motion history must be at least one frame".into()));
        }
        let m = &self.motion;
        if !(m.variance_min > 0.0 && m.variance_min <= m.variance_init && m.variance_init <= m.variance_max) {
            return Err(ConfigError::Invalid(format!(
                "variance bounds must satisfy 0 < min <= init <= max, got {}/{}/{}",
                m.variance_min, m.variance_init, m.variance_max
            )));
        }

        if !(0.0..1.0).contains(&self.fire.threshold) {
            return Err(ConfigError::Invalid(format!(
                "fire threshold must be in [0, 1), got {}",
                self.fire.threshold
            )));
        }
        if self.fire.hue_bands.is_empty() {
            return Err(ConfigError::Invalid("fire detection needs at least one hue band".into()));
        }
        if let Some(band) = self.fire.hue_bands.iter().find(|b| b.min > b.max || b.max > 180) {
            return Err(ConfigError::Invalid(format!(
                "hue band {}..={} is outside 0..=180 or inverted",
                band.min, band.max
            )));
        }

        if !(1..=100).contains(&self.worker.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "JPEG quality must be in 1..=100, got {}",
                self.worker.jpeg_quality
            )));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnv {
                name: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
