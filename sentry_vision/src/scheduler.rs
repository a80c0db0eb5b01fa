//! Per-camera rate limiter deciding which analysis kinds run on each frame.
//!
//! With motion, every configured kind is eligible and runs once its interval
//! (`1 / fps`) has elapsed since it last ran. Without motion only the slowest kind
//! is considered; the others are skipped and keep their last-run time, so they fire
//! on the first motion frame after a quiet spell.

use crate::models::CameraId;
use crate::pipeline::AnalysisKind;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct KindSchedule {
    kind: AnalysisKind,
    fps: f64,
    interval: Duration,
    last_run: Option<Instant>,
}

impl KindSchedule {
    fn is_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }
}

/// Minimum spacing between runs for a rate in frames per second.
pub fn rate_interval(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps).ok()
}

/// Schedule state for one camera. Owned by that camera's worker only.
#[derive(Debug, Clone)]
pub struct AnalysisScheduler {
    camera_id: CameraId,
    schedules: Vec<KindSchedule>,
    /// Kind sampled even when the scene is still.
    still_kind: Option<AnalysisKind>,
}

impl AnalysisScheduler {
    /// `rates` pairs each kind with its maximum rate in frames per second.
    /// A rate that is non-positive, non-finite, or too small for its interval to
    /// fit a `Duration` disables the kind.
    pub fn new(camera_id: CameraId, rates: impl IntoIterator<Item = (AnalysisKind, f64)>) -> Self {
        let schedules: Vec<KindSchedule> = rates
            .into_iter()
            .filter_map(|(kind, fps)| match rate_interval(fps) {
                Some(interval) => Some(KindSchedule {
                    kind,
                    fps,
                    interval,
                    last_run: None,
                }),
                None => {
                    tracing::warn!(camera_id = %camera_id, kind = %kind, fps, "Unusable analysis rate, kind disabled");
                    None
                }
            })
            .collect();

        // Lowest rate wins; on a tie the first configured kind is kept.
        let still_kind = schedules
            .iter()
            .fold(None::<&KindSchedule>, |slowest, s| match slowest {
                Some(current) if current.fps <= s.fps => Some(current),
                _ => Some(s),
            })
            .map(|s| s.kind);

        Self {
            camera_id,
            schedules,
            still_kind,
        }
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    /// The kind that keeps sampling without motion.
    pub fn still_kind(&self) -> Option<AnalysisKind> {
        self.still_kind
    }

    pub fn last_run(&self, kind: AnalysisKind) -> Option<Instant> {
        self.schedules
            .iter()
            .find(|s| s.kind == kind)
            .and_then(|s| s.last_run)
    }

    /// Kinds to run on the frame observed at `now`; selected kinds are marked as run.
    pub fn decide(&mut self, motion_detected: bool, now: Instant) -> Vec<AnalysisKind> {
        let still_kind = self.still_kind;
        let mut selected = Vec::new();
        for schedule in self.schedules.iter_mut() {
            let considered = motion_detected || Some(schedule.kind) == still_kind;
            if considered && schedule.is_due(now) {
                schedule.last_run = Some(now);
                selected.push(schedule.kind);
            }
        }
        selected
    }
}
