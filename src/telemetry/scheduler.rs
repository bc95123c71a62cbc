//! Step scheduler
//!
//! The engine only advances when stepped. The [`Scheduler`] either steps on
//! demand ([`Scheduler::step_once`]) or runs a worker thread that steps and
//! polls at the configured rate. Every step is followed by exactly one poll
//! tick, so telemetry follows the step cadence rather than the render rate.

use crate::config::SchedulerSettings;
use crate::engine::EngineClient;
use crate::telemetry::poller::TelemetryPoller;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Something that can advance the engine by one step.
///
/// The MIDI router uses this to trigger a manual step after delivering input
/// while the engine is paused.
pub trait Stepper: Send + Sync {
    /// Whether a free-running loop is already stepping the engine
    fn is_free_running(&self) -> bool;

    /// Advance by one step
    fn step(&self);
}

struct Worker {
    handle: JoinHandle<()>,
    stop_tx: Sender<()>,
}

/// Drives engine steps and the telemetry poll that follows each one
pub struct Scheduler {
    engine: EngineClient,
    poller: Arc<TelemetryPoller>,
    settings: SchedulerSettings,
    running: Arc<AtomicBool>,
    steps: Arc<AtomicU64>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    pub fn new(
        engine: EngineClient,
        poller: Arc<TelemetryPoller>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            engine,
            poller,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            steps: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        }
    }

    /// Step once and poll
    pub fn step_once(&self) {
        step_and_poll(&self.engine, &self.poller, &self.steps);
    }

    /// Start free-running; returns false when already running
    pub fn start(&self) -> bool {
        let mut worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if worker.is_some() {
            return false;
        }

        let (stop_tx, stop_rx) = bounded(1);
        let engine = self.engine.clone();
        let poller = Arc::clone(&self.poller);
        let running = Arc::clone(&self.running);
        let steps = Arc::clone(&self.steps);
        let interval = self.settings.step_interval();

        running.store(true, Ordering::SeqCst);
        let handle = std::thread::spawn(move || {
            run_loop(engine, poller, running, steps, stop_rx, interval);
        });

        *worker = Some(Worker { handle, stop_tx });
        tracing::info!(
            "Scheduler started at {} Hz",
            self.settings.step_rate_hz
        );
        true
    }

    /// Stop free-running and join the worker; returns false when not running
    pub fn stop(&self) -> bool {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(worker) = worker else {
            return false;
        };

        self.running.store(false, Ordering::SeqCst);
        let _ = worker.stop_tx.send(());
        if worker.handle.join().is_err() {
            tracing::error!("Scheduler worker panicked");
        }
        tracing::info!("Scheduler stopped after {} step(s)", self.step_count());
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Total steps taken, manual and free-running
    pub fn step_count(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn poller(&self) -> &Arc<TelemetryPoller> {
        &self.poller
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }
}

impl Stepper for Scheduler {
    fn is_free_running(&self) -> bool {
        self.is_running()
    }

    fn step(&self) {
        self.step_once();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .field("steps", &self.step_count())
            .field("settings", &self.settings)
            .finish()
    }
}

fn step_and_poll(engine: &EngineClient, poller: &TelemetryPoller, steps: &AtomicU64) {
    engine.step();
    steps.fetch_add(1, Ordering::Relaxed);
    poller.tick();
}

fn run_loop(
    engine: EngineClient,
    poller: Arc<TelemetryPoller>,
    running: Arc<AtomicBool>,
    steps: Arc<AtomicU64>,
    stop_rx: Receiver<()>,
    interval: Option<Duration>,
) {
    tracing::debug!("Scheduler worker started");

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        step_and_poll(&engine, &poller, &steps);

        // Rate limit; a stop request wakes the sleep early
        let wait = match interval {
            Some(interval) => interval.saturating_sub(started.elapsed()),
            None => Duration::ZERO,
        };
        match stop_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    tracing::debug!("Scheduler worker stopped");
}
