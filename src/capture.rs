//! Capture loop driver.
//!
//! One background thread pulls frames from a `FrameSource`, runs the
//! classifier at most once per inference interval and feeds the result into
//! the `Engine`. Frame-source failures are logged and retried after a short
//! backoff; they never end the loop. Stopping is cooperative: the running flag
//! is observed at the next iteration boundary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::classify::ClassifierAdapter;
use crate::engine::Engine;
use crate::ingest::FrameSource;

/// Pause between frames so a source without its own pacing cannot spin.
const IDLE_PAUSE: Duration = Duration::from_millis(10);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureSettings {
    /// Minimum spacing between inference ticks; frames in between are dropped.
    pub inference_interval: Duration,
    /// Pause after a frame-source failure before retrying.
    pub retry_backoff: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            inference_interval: Duration::from_millis(500),
            retry_backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Default)]
struct LoopShared {
    running: AtomicBool,
    ticks: AtomicU64,
}

/// Owner of the (at most one) capture thread feeding an engine.
pub struct CaptureHandle {
    engine: Arc<Engine>,
    settings: CaptureSettings,
    shared: Arc<LoopShared>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureHandle {
    pub fn new(engine: Arc<Engine>, settings: CaptureSettings) -> Self {
        Self {
            engine,
            settings,
            shared: Arc::new(LoopShared::default()),
            join: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn join_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.join
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the loop. Returns `false` (and drops the arguments) if a loop is
    /// already running.
    pub fn start(
        &self,
        source: Box<dyn FrameSource>,
        adapter: ClassifierAdapter,
    ) -> Result<bool> {
        let mut slot = self.join_slot();
        if self.shared.running.load(Ordering::SeqCst) {
            log::debug!("capture loop already running; start ignored");
            return Ok(false);
        }
        if let Some(previous) = slot.take() {
            previous
                .join()
                .map_err(|_| anyhow!("previous capture thread panicked"))?;
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let worker = CaptureWorker {
            engine: Arc::clone(&self.engine),
            settings: self.settings.clone(),
            shared: Arc::clone(&self.shared),
            source,
            adapter,
        };
        let spawned = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || worker.run())
            .context("spawn capture thread");
        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(true)
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Signal the loop to stop and wait for the thread to exit.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.join_slot();
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = slot.take() {
            handle
                .join()
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Inference ticks completed since this handle was created.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("capture loop shutdown failed: {:#}", err);
        }
    }
}

struct CaptureWorker {
    engine: Arc<Engine>,
    settings: CaptureSettings,
    shared: Arc<LoopShared>,
    source: Box<dyn FrameSource>,
    adapter: ClassifierAdapter,
}

impl CaptureWorker {
    fn running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Connect, retrying after the backoff until it succeeds or the loop is
    /// stopped. Returns whether a connection was made.
    fn connect(&mut self) -> bool {
        while self.running() {
            match self.source.connect() {
                Ok(()) => return true,
                Err(err) => {
                    log::warn!(
                        "frame source {} connect failed: {:#}",
                        self.source.stats().url,
                        err
                    );
                    std::thread::sleep(self.settings.retry_backoff);
                }
            }
        }
        false
    }

    fn run(mut self) {
        log::info!(
            "capture loop started: source={} classifier={} interval={:?}",
            self.source.stats().url,
            self.adapter.name(),
            self.settings.inference_interval
        );
        self.adapter.warm_up();

        let mut connected = self.connect();
        let mut last_tick: Option<Instant> = None;
        let mut last_health_log = Instant::now();

        while self.running() {
            if !connected {
                connected = self.connect();
                continue;
            }

            match self.source.next_frame() {
                Ok(frame) => {
                    let due = last_tick
                        .map_or(true, |at| at.elapsed() >= self.settings.inference_interval);
                    if due {
                        last_tick = Some(Instant::now());
                        let pred = self.adapter.predict(&frame);
                        self.engine.process(pred, &frame);
                        self.shared.ticks.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Err(err) => {
                    log::warn!("frame source error, retrying: {:#}", err);
                    std::thread::sleep(self.settings.retry_backoff);
                    if !self.source.is_healthy() {
                        log::warn!("frame source unhealthy; reconnecting");
                        connected = false;
                    }
                }
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                log::info!(
                    "source health={} frames={} ticks={} degraded={} verdict={} url={}",
                    self.source.is_healthy(),
                    stats.frames_captured,
                    self.shared.ticks.load(Ordering::SeqCst),
                    self.adapter.degraded_count(),
                    self.engine.last_verdict().as_str(),
                    stats.url
                );
                last_health_log = Instant::now();
            }

            std::thread::sleep(IDLE_PAUSE);
        }

        log::info!(
            "capture loop stopped after {} ticks",
            self.shared.ticks.load(Ordering::SeqCst)
        );
    }
}
