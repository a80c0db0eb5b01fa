// THEORY:
// A `CameraWorker` is the unit of concurrency of the service: one per active camera,
// running on its own blocking thread. It walks a small state machine,
// `Connecting -> Connected -> {Connected, Error}`, and ends either when the shared
// shutdown signal is triggered or when the stream cannot be opened.
//
// Key architectural principles:
// 1.  **Exclusive ownership**: the worker owns its stream handle, its `MotionGate`
//     and its `AnalysisScheduler`. Nothing else touches them, so none of them is
//     behind a lock. The `AnalysisPipeline` is shared, but read-only.
// 2.  **No retry on connect**: a failed open is reported as `error` exactly once and
//     ends the worker. Recovery belongs to the supervisor's next reconciliation.
// 3.  **Every failure is local**: read errors are retried in place, bad frames are
//     skipped, failing analysis kinds are dropped for the frame, and persistence
//     failures drop the frame's record. None of them leaves the `Connected` loop.
// 4.  **Deterministic release**: the stream lives in a `StreamHandle`, which closes
//     it on every exit path, unwinding included.

use crate::config::{MotionConfig, WorkerConfig};
use crate::core_modules::motion_gate::MotionGate;
use crate::error::PersistenceError;
use crate::inventory::Inventory;
use crate::models::{Camera, CameraStatus, Frame};
use crate::persistence::{PersistenceSink, RecordId, RecordedVerdict, encode_jpeg};
use crate::pipeline::{AnalysisPipeline, Verdict};
use crate::scheduler::AnalysisScheduler;
use crate::stream::{StreamConnector, StreamHandle};
use crate::supervisor::ShutdownSignal;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

/// Collaborators and tuning shared by every worker the supervisor starts.
#[derive(Clone)]
pub struct WorkerContext {
    pub connector: Arc<dyn StreamConnector>,
    pub inventory: Arc<dyn Inventory>,
    pub sink: Arc<dyn PersistenceSink>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub motion: MotionConfig,
    pub worker: WorkerConfig,
}

/// Why a worker finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The shutdown signal was observed.
    Stopped,
    /// The stream could not be opened; the camera was reported as `error`.
    ConnectFailed,
}

/// Counters kept by one worker over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames_read: u64,
    pub read_failures: u64,
    pub format_skips: u64,
    pub motion_frames: u64,
    pub analysis_failures: u64,
    pub records_stored: u64,
    pub persistence_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub exit: WorkerExit,
    pub stats: WorkerStats,
}

pub struct CameraWorker {
    camera: Camera,
    ctx: WorkerContext,
    signal: ShutdownSignal,
    gate: MotionGate,
    scheduler: AnalysisScheduler,
    stats: WorkerStats,
}

impl CameraWorker {
    pub fn new(camera: Camera, ctx: WorkerContext, signal: ShutdownSignal) -> Self {
        let gate = MotionGate::new(ctx.motion.clone());
        let scheduler = AnalysisScheduler::new(camera.id.clone(), ctx.pipeline.rates());
        Self {
            camera,
            ctx,
            signal,
            gate,
            scheduler,
            stats: WorkerStats::default(),
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Runs the worker to completion on the calling thread.
    pub fn run(mut self) -> WorkerReport {
        tracing::info!(
            camera_id = %self.camera.id,
            camera = self.camera.display_name(),
            target = %self.camera.connection.redacted_url(),
            "Camera worker starting"
        );

        // --- Connecting ---
        let stream = match self.ctx.connector.open(&self.camera) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(camera_id = %self.camera.id, error = %e, "Failed to open camera stream");
                self.report_status(CameraStatus::Error, None);
                return self.finish(WorkerExit::ConnectFailed);
            }
        };
        let mut handle = StreamHandle::new(stream);
        self.report_status(CameraStatus::Connected, None);

        // --- Connected ---
        while self.signal.is_running() {
            match handle.read_frame() {
                Ok(frame) => {
                    self.stats.frames_read += 1;
                    self.process_frame(frame);
                    std::thread::sleep(self.ctx.worker.poll_delay);
                }
                Err(e) => {
                    self.stats.read_failures += 1;
                    tracing::debug!(camera_id = %self.camera.id, error = %e, "Frame read failed, retrying");
                    std::thread::sleep(self.ctx.worker.read_retry_delay);
                }
            }
        }

        handle.release();
        self.report_status(CameraStatus::Stopped, None);
        self.finish(WorkerExit::Stopped)
    }

    /// Motion gate, scheduler and pipeline for one frame; persists any verdicts.
    fn process_frame(&mut self, frame: Frame) {
        let motion = match self.gate.observe(&frame) {
            Ok(motion) => motion,
            Err(e) => {
                self.stats.format_skips += 1;
                tracing::warn!(camera_id = %self.camera.id, error = %e, "Skipping malformed frame");
                return;
            }
        };
        if motion {
            self.stats.motion_frames += 1;
        }

        let selected = self.scheduler.decide(motion, Instant::now());
        if selected.is_empty() {
            return;
        }

        let image = match frame.to_rgb_image() {
            Ok(image) => image,
            Err(e) => {
                self.stats.format_skips += 1;
                tracing::warn!(camera_id = %self.camera.id, error = %e, "Skipping malformed frame");
                return;
            }
        };

        let outcome = self.ctx.pipeline.run(&selected, &image);
        for (kind, e) in &outcome.failures {
            self.stats.analysis_failures += 1;
            tracing::warn!(camera_id = %self.camera.id, kind = %kind, error = %e, "Analysis failed");
        }
        if outcome.verdicts.is_empty() {
            return;
        }

        for verdict in &outcome.verdicts {
            tracing::debug!(
                camera_id = %self.camera.id,
                kind = %verdict.kind,
                label = %verdict.label,
                confidence = verdict.confidence,
                flagged = verdict.flagged,
                "Verdict"
            );
        }

        match self.persist(&frame, &image, outcome.verdicts) {
            Ok(record_id) => {
                self.stats.records_stored += 1;
                tracing::debug!(camera_id = %self.camera.id, record_id, "Analysis record stored");
                self.report_status(CameraStatus::Connected, Some(frame.captured_at));
            }
            Err(e) => {
                self.stats.persistence_failures += 1;
                tracing::error!(camera_id = %self.camera.id, error = %e, "Dropping analysis record");
            }
        }
    }

    fn persist(
        &self,
        frame: &Frame,
        image: &RgbImage,
        verdicts: Vec<Verdict>,
    ) -> Result<RecordId, PersistenceError> {
        let jpeg = encode_jpeg(image, self.ctx.worker.jpeg_quality)?;
        let image_path = self
            .ctx
            .sink
            .store_image(&self.camera.id, frame.captured_at, &jpeg)?;
        let recorded = verdicts.into_iter().map(RecordedVerdict::from).collect();
        self.ctx
            .sink
            .store_analysis_record(&self.camera.id, &image_path, frame.captured_at, recorded)
    }

    fn report_status(&self, status: CameraStatus, last_frame_at: Option<DateTime<Utc>>) {
        if let Err(e) = self
            .ctx
            .inventory
            .update_status(&self.camera.id, status, last_frame_at)
        {
            tracing::warn!(camera_id = %self.camera.id, status = %status, error = %e, "Status update failed");
        }
    }

    fn finish(self, exit: WorkerExit) -> WorkerReport {
        let stats = self.stats;
        tracing::info!(
            camera_id = %self.camera.id,
            exit = ?exit,
            frames_read = stats.frames_read,
            read_failures = stats.read_failures,
            format_skips = stats.format_skips,
            motion_frames = stats.motion_frames,
            analysis_failures = stats.analysis_failures,
            records_stored = stats.records_stored,
            persistence_failures = stats.persistence_failures,
            "Camera worker finished"
        );
        WorkerReport { exit, stats }
    }
}
