//! Scheduler Trigger - fires sweeps on a fixed cadence.
//!
//! One background task owns a `tokio::time::interval`; every tick runs a
//! sweep at the current instant. Manual sweeps and timer sweeps share one
//! async mutex, so at most one sweep is ever in progress. Ticks that come due
//! while a sweep is still running are skipped rather than queued.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatch::Dispatcher;
use crate::domain::SweepReport;

/// Configuration for the trigger.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl TriggerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// State shared between the handle and the worker task
struct Shared {
    dispatcher: Dispatcher,
    sweep_guard: tokio::sync::Mutex<()>,
    last_report: Mutex<Option<SweepReport>>,
}

impl Shared {
    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let _guard = self.sweep_guard.lock().await;
        let report = self.dispatcher.sweep(now).await;

        if report.is_aborted() {
            tracing::error!(report = %report, "Sweep aborted");
        } else if report.failed > 0 {
            tracing::warn!(report = %report, failed = ?report.failed_ids(), "Sweep finished with failures");
        } else {
            tracing::info!(report = %report, "Sweep finished");
        }

        if let Ok(mut last) = self.last_report.lock() {
            *last = Some(report.clone());
        }
        report
    }
}

struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic sweep driver with explicit start / stop.
pub struct Trigger {
    shared: Arc<Shared>,
    config: TriggerConfig,
    worker: Mutex<Option<Worker>>,
}

impl Trigger {
    pub fn new(dispatcher: Dispatcher, config: TriggerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher,
                sweep_guard: tokio::sync::Mutex::new(()),
                last_report: Mutex::new(None),
            }),
            config,
            worker: Mutex::new(None),
        }
    }

    /// Start the timer. A second call while running does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let Ok(mut worker) = self.worker.lock() else {
            tracing::error!("Trigger state poisoned, not starting");
            return;
        };
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            tracing::debug!("Trigger already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        let period = self.config.interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    // Shutdown wins over a tick that became ready during a long sweep
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        shared.sweep(Utc::now()).await;
                    }
                }
            }
            tracing::info!("Trigger stopped");
        });

        tracing::info!(interval_secs = period.as_secs_f64(), "Trigger started");
        *worker = Some(Worker { shutdown_tx, handle });
    }

    /// Stop the timer and wait for the worker to exit.
    ///
    /// A sweep already in progress runs to completion first.
    pub async fn stop(&self) {
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        let Some(worker) = worker else {
            return;
        };

        let _ = worker.shutdown_tx.send(true);
        if let Err(e) = worker.handle.await {
            tracing::error!(error = ?e, "Trigger task panicked");
        }
    }

    /// Run one sweep now, waiting for any sweep in progress to finish.
    pub async fn trigger_sweep_now(&self, now: DateTime<Utc>) -> SweepReport {
        self.shared.sweep(now).await
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .map(|w| w.as_ref().is_some_and(|w| !w.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Report of the most recent completed sweep.
    pub fn last_report(&self) -> Option<SweepReport> {
        self.shared.last_report.lock().ok().and_then(|r| r.clone())
    }
}
