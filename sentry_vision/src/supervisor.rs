// THEORY:
// The `Supervisor` keeps the set of running camera workers aligned with the camera
// inventory. It is the only component that knows which workers exist: the mapping
// from camera id to `WorkerHandle` is a private field and never leaves this module.
//
// Key architectural principles:
// 1.  **Reconciliation, not events**: every cycle fetches the whole active-camera list
//     and starts a worker for each camera that lacks a live one. A camera whose
//     worker died (for example on a connect failure) simply gets a fresh worker on
//     the next cycle. There is no backoff growth for repeated failures.
// 2.  **Blocking work off the reactor**: workers and inventory fetches run on tokio's
//     blocking pool, so a hung stream read never stalls the supervisor's own loop.
// 3.  **One writer for the running flag**: the `ShutdownSignal` is cloned into every
//     worker at construction. Workers only read it; `stop` is the only writer.
// 4.  **Bounded shutdown**: `stop` waits up to a fixed timeout per worker, then
//     abandons whatever is still running. Abandoned workers release their stream on
//     their own exit path.

use crate::config::SupervisorConfig;
use crate::error::InventoryError;
use crate::inventory::Inventory;
use crate::models::{Camera, CameraId};
use crate::worker::{CameraWorker, WorkerContext, WorkerReport};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Process-wide cooperative cancellation flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clears the running flag and wakes anyone waiting in `stopped`.
    pub fn trigger(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once `trigger` has been called.
    pub async fn stopped(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent trigger is not missed.
        notified.as_mut().enable();
        if !self.is_running() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A started worker, as tracked by the supervisor.
pub struct WorkerHandle {
    camera_id: CameraId,
    started_at: Instant,
    join: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    /// Starts `worker` on the blocking pool.
    pub fn start(worker: CameraWorker) -> Self {
        let camera_id = worker.camera().id.clone();
        let join = tokio::task::spawn_blocking(move || worker.run());
        Self {
            camera_id,
            started_at: Instant::now(),
            join,
        }
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    pub fn is_alive(&self) -> bool {
        !self.join.is_finished()
    }

    /// Waits for the worker's report; `None` if it panicked or was cancelled.
    pub async fn join(self) -> Option<WorkerReport> {
        match self.join.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(camera_id = %self.camera_id, error = %e, "Camera worker panicked");
                None
            }
        }
    }
}

/// What one reconciliation cycle changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub active_cameras: usize,
    pub spawned: usize,
    pub reaped: usize,
}

/// How the workers ended during `stop`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub joined: usize,
    pub abandoned: usize,
}

pub struct Supervisor {
    inventory: Arc<dyn Inventory>,
    worker_ctx: WorkerContext,
    config: SupervisorConfig,
    signal: ShutdownSignal,
    workers: HashMap<CameraId, WorkerHandle>,
}

impl Supervisor {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        worker_ctx: WorkerContext,
        config: SupervisorConfig,
        signal: ShutdownSignal,
    ) -> Self {
        Self {
            inventory,
            worker_ctx,
            config,
            signal,
            workers: HashMap::new(),
        }
    }

    pub fn signal(&self) -> &ShutdownSignal {
        &self.signal
    }

    /// Number of workers currently tracked, alive or not yet reaped.
    pub fn tracked_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn live_workers(&self) -> usize {
        self.workers.values().filter(|w| w.is_alive()).count()
    }

    /// One reconciliation cycle.
    pub async fn reconcile(&mut self) -> Result<ReconcileSummary, InventoryError> {
        let cameras = self.fetch_cameras().await?;
        let mut summary = ReconcileSummary {
            active_cameras: cameras.len(),
            ..ReconcileSummary::default()
        };

        // Reap every finished worker first; cameras still in the inventory get a new one below.
        let finished: Vec<CameraId> = self
            .workers
            .iter()
            .filter(|(_, handle)| !handle.is_alive())
            .map(|(id, _)| id.clone())
            .collect();
        for camera_id in finished {
            if let Some(handle) = self.workers.remove(&camera_id) {
                let lifetime = handle.started_at.elapsed();
                if let Some(report) = handle.join().await {
                    tracing::info!(
                        camera_id = %camera_id,
                        exit = ?report.exit,
                        lifetime_secs = lifetime.as_secs(),
                        "Reaped camera worker"
                    );
                }
                summary.reaped += 1;
            }
        }

        if !self.signal.is_running() {
            return Ok(summary);
        }

        for camera in cameras {
            if self.workers.contains_key(&camera.id) {
                continue;
            }
            tracing::info!(camera_id = %camera.id, camera = camera.display_name(), "Starting camera worker");
            let worker = CameraWorker::new(camera, self.worker_ctx.clone(), self.signal.clone());
            let handle = WorkerHandle::start(worker);
            self.workers.insert(handle.camera_id().clone(), handle);
            summary.spawned += 1;
        }

        Ok(summary)
    }

    async fn fetch_cameras(&self) -> Result<Vec<Camera>, InventoryError> {
        let inventory = Arc::clone(&self.inventory);
        tokio::task::spawn_blocking(move || inventory.list_active_cameras())
            .await
            .map_err(|e| InventoryError::Unavailable(format!("inventory fetch task failed: {e}")))?
    }

    /// Reconciles until the shutdown signal fires, then stops all workers.
    pub async fn run(&mut self) -> ShutdownSummary {
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs_f64(),
            "Supervisor started"
        );

        while self.signal.is_running() {
            let delay = match self.reconcile().await {
                Ok(summary) => {
                    if summary.spawned > 0 || summary.reaped > 0 {
                        tracing::info!(
                            active = summary.active_cameras,
                            spawned = summary.spawned,
                            reaped = summary.reaped,
                            live = self.live_workers(),
                            "Reconciliation cycle"
                        );
                    } else {
                        tracing::debug!(active = summary.active_cameras, "Reconciliation cycle");
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "Camera inventory fetch failed, backing off");
                    self.config.fetch_retry_delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.signal.stopped() => {}
            }
        }

        self.stop().await
    }

    /// Clears the running flag and waits, bounded per worker, for every worker to finish.
    pub async fn stop(&mut self) -> ShutdownSummary {
        self.signal.trigger();
        let timeout = self.config.shutdown_timeout;
        tracing::info!(workers = self.workers.len(), "Stopping camera workers");

        let joins = self.workers.drain().map(|(camera_id, handle)| async move {
            match tokio::time::timeout(timeout, handle.join()).await {
                Ok(_) => true,
                Err(_) => {
                    tracing::warn!(
                        camera_id = %camera_id,
                        timeout_secs = timeout.as_secs_f64(),
                        "Camera worker did not stop in time, abandoning it"
                    );
                    false
                }
            }
        });
        let results = futures::future::join_all(joins).await;

        let summary = ShutdownSummary {
            joined: results.iter().filter(|joined| **joined).count(),
            abandoned: results.iter().filter(|joined| !**joined).count(),
        };
        tracing::info!(joined = summary.joined, abandoned = summary.abandoned, "Supervisor stopped");
        summary
    }
}
