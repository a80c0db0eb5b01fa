#![allow(dead_code)]

use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use sentry_vision::classifier::{Classification, Classifier};
use sentry_vision::config::{AnalysisRates, FireConfig, MotionConfig, WorkerConfig};
use sentry_vision::error::{
    ClassifierError, ConnectError, InventoryError, PersistenceError, ReadError,
};
use sentry_vision::inventory::Inventory;
use sentry_vision::models::{Camera, CameraId, CameraStatus, ConnectionDescriptor, Frame};
use sentry_vision::persistence::{PersistenceSink, RecordId, RecordedVerdict};
use sentry_vision::pipeline::AnalysisPipeline;
use sentry_vision::stream::{FrameStream, StreamConnector};
use sentry_vision::supervisor::ShutdownSignal;
use sentry_vision::worker::WorkerContext;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;

pub fn camera(id: &str) -> Camera {
    Camera::new(id, ConnectionDescriptor::new("10.0.0.1").with_credentials("admin", "secret"))
}

/// A uniform grey frame.
pub fn still_frame(camera_id: &str) -> Frame {
    Frame::from_rgb_image(
        CameraId::from(camera_id),
        Utc::now(),
        RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([100, 100, 100])),
    )
}

/// The grey scene with a bright block covering a quarter of the frame, shifted by `step`.
pub fn motion_frame(camera_id: &str, step: u32) -> Frame {
    let x0 = (step * 4) % (WIDTH / 2);
    let image = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        if x >= x0 && x < x0 + WIDTH / 2 && y < HEIGHT / 2 {
            Rgb([250, 250, 250])
        } else {
            Rgb([100, 100, 100])
        }
    });
    Frame::from_rgb_image(CameraId::from(camera_id), Utc::now(), image)
}

/// What a scripted stream does once its frames run out.
#[derive(Clone)]
pub enum StreamEnd {
    /// Trigger the shutdown signal, then fail every read.
    Shutdown(ShutdownSignal),
    /// Keep yielding still frames, pausing before each one.
    Repeat(Duration),
}

struct ScriptedStream {
    camera_id: String,
    frames: VecDeque<Frame>,
    end: StreamEnd,
    closes: Arc<AtomicUsize>,
}

impl FrameStream for ScriptedStream {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        match &self.end {
            StreamEnd::Shutdown(signal) => {
                signal.trigger();
                Err(ReadError::NoFrame)
            }
            StreamEnd::Repeat(pause) => {
                std::thread::sleep(*pause);
                Ok(still_frame(&self.camera_id))
            }
        }
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
enum Script {
    Frames(Vec<Frame>, StreamEnd),
    Unreachable,
}

/// Connector handing out scripted streams per camera id.
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<HashMap<CameraId, Script>>,
    opens: Mutex<HashMap<CameraId, usize>>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames(self, camera_id: &str, frames: Vec<Frame>, end: StreamEnd) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(CameraId::from(camera_id), Script::Frames(frames, end));
        self
    }

    pub fn unreachable(self, camera_id: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(CameraId::from(camera_id), Script::Unreachable);
        self
    }

    pub fn opens(&self, camera_id: &str) -> usize {
        self.opens
            .lock()
            .unwrap()
            .get(&CameraId::from(camera_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl StreamConnector for ScriptedConnector {
    fn open(&self, camera: &Camera) -> Result<Box<dyn FrameStream>, ConnectError> {
        *self.opens.lock().unwrap().entry(camera.id.clone()).or_insert(0) += 1;
        let script = self.scripts.lock().unwrap().get(&camera.id).cloned();
        match script {
            Some(Script::Frames(frames, end)) => Ok(Box::new(ScriptedStream {
                camera_id: camera.id.to_string(),
                frames: frames.into(),
                end,
                closes: self.closes.clone(),
            })),
            Some(Script::Unreachable) | None => Err(ConnectError::Unreachable {
                camera_id: camera.id.clone(),
                target: camera.connection.redacted_url(),
            }),
        }
    }
}

/// Inventory with a fixed camera list that records every status update.
pub struct MemoryInventory {
    cameras: Vec<Camera>,
    fail_fetch: bool,
    fetches: AtomicUsize,
    updates: Mutex<Vec<(CameraId, CameraStatus, Option<DateTime<Utc>>)>>,
}

impl MemoryInventory {
    pub fn new(cameras: Vec<Camera>) -> Self {
        Self {
            cameras,
            fail_fetch: false,
            fetches: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_fetch: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn statuses_of(&self, camera_id: &str) -> Vec<CameraStatus> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id.as_str() == camera_id)
            .map(|(_, status, _)| *status)
            .collect()
    }

    pub fn last_frame_updates(&self, camera_id: &str) -> usize {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, at)| id.as_str() == camera_id && at.is_some())
            .count()
    }
}

impl Inventory for MemoryInventory {
    fn list_active_cameras(&self) -> Result<Vec<Camera>, InventoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(InventoryError::Unavailable("inventory offline".into()));
        }
        Ok(self.cameras.clone())
    }

    fn update_status(
        &self,
        camera_id: &CameraId,
        status: CameraStatus,
        last_frame_at: Option<DateTime<Utc>>,
    ) -> Result<(), InventoryError> {
        self.updates
            .lock()
            .unwrap()
            .push((camera_id.clone(), status, last_frame_at));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub camera_id: CameraId,
    pub image_path: String,
    pub verdicts: Vec<RecordedVerdict>,
}

/// Sink keeping images and records in memory.
#[derive(Default)]
pub struct RecordingSink {
    images: Mutex<Vec<(CameraId, usize)>>,
    records: Mutex<Vec<StoredRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn image_count(&self) -> usize {
        self.images.lock().unwrap().len()
    }
}

impl PersistenceSink for RecordingSink {
    fn store_image(
        &self,
        camera_id: &CameraId,
        _captured_at: DateTime<Utc>,
        jpeg: &[u8],
    ) -> Result<String, PersistenceError> {
        let mut images = self.images.lock().unwrap();
        images.push((camera_id.clone(), jpeg.len()));
        Ok(format!("memory://{}/{}", camera_id, images.len()))
    }

    fn store_analysis_record(
        &self,
        camera_id: &CameraId,
        image_path: &str,
        _captured_at: DateTime<Utc>,
        verdicts: Vec<RecordedVerdict>,
    ) -> Result<RecordId, PersistenceError> {
        let mut records = self.records.lock().unwrap();
        records.push(StoredRecord {
            camera_id: camera_id.clone(),
            image_path: image_path.to_string(),
            verdicts,
        });
        Ok(records.len() as RecordId)
    }
}

/// Always answers with the same label.
pub struct FixedClassifier {
    label: &'static str,
    confidence: f64,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(label: &'static str, confidence: f64) -> Self {
        Self {
            label,
            confidence,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, _image: &RgbImage) -> Result<Classification, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Classification::new(self.label, self.confidence))
    }
}

/// Fails its first `failures` calls, then answers "violent".
pub struct FlakyClassifier {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyClassifier {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Classifier for FlakyClassifier {
    fn classify(&self, _image: &RgbImage) -> Result<Classification, ClassifierError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ClassifierError::Unavailable("model warming up".into()));
        }
        Ok(Classification::new("violent", 0.7))
    }
}

pub fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_delay: Duration::from_millis(1),
        read_retry_delay: Duration::from_millis(1),
        jpeg_quality: 75,
    }
}

pub fn worker_context(
    connector: Arc<ScriptedConnector>,
    inventory: Arc<MemoryInventory>,
    sink: Arc<dyn PersistenceSink>,
    classifier: Arc<dyn Classifier>,
    rates: AnalysisRates,
    worker: WorkerConfig,
) -> WorkerContext {
    WorkerContext {
        connector,
        inventory,
        sink,
        pipeline: Arc::new(AnalysisPipeline::standard(
            Some(classifier),
            &rates,
            FireConfig::default(),
        )),
        motion: MotionConfig::default(),
        worker,
    }
}
