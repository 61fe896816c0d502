//! Bounded pool of persistent worker processes
//!
//! The pool owns `pool_size` [`WorkerProcess`]es and a FIFO of the idle ones.
//! A request checks a worker out (blocking up to the request timeout, which
//! throttles callers to the pool size), sends the request and returns the
//! worker to the queue if it is still healthy. A worker that failed is parked
//! instead; the health monitor restarts it and puts it back in rotation.

use crate::config::PoolSettings;
use crate::error::{PoolError, PoolResult};
use crate::worker::process::{WorkerProcess, WorkerStats};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Aggregated pool counters
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub healthy_workers: usize,
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_restarts: u64,
    pub workers: Vec<WorkerStats>,
}

/// State shared with the health monitor
struct PoolInner {
    workers: Vec<WorkerProcess>,
    idle_tx: Sender<usize>,
    idle_rx: Receiver<usize>,
    /// Workers taken out of rotation after a failure
    parked: Mutex<Vec<usize>>,
    shutdown: AtomicBool,
}

impl PoolInner {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn checkout(&self, timeout: Duration) -> PoolResult<usize> {
        if self.is_shutdown() {
            return Err(PoolError::Shutdown);
        }
        match self.idle_rx.recv_timeout(timeout) {
            Ok(idx) => Ok(idx),
            Err(RecvTimeoutError::Timeout) => Err(PoolError::CheckoutTimeout { timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::Shutdown),
        }
    }

    /// Return a worker to the idle queue, or park it when unhealthy
    fn checkin(&self, idx: usize) {
        if self.workers[idx].is_healthy() && !self.is_shutdown() {
            let _ = self.idle_tx.send(idx);
        } else {
            debug!(worker = idx, "Parking worker until restarted");
            let mut parked = self.parked.lock();
            if !parked.contains(&idx) {
                parked.push(idx);
            }
        }
    }

    fn unpark(&self, idx: usize) -> bool {
        let mut parked = self.parked.lock();
        match parked.iter().position(|&p| p == idx) {
            Some(pos) => {
                parked.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// One monitor pass: ping every worker and restart the unhealthy ones
    fn check_health(&self) -> usize {
        let mut restarted = 0;
        for (idx, worker) in self.workers.iter().enumerate() {
            if self.is_shutdown() {
                break;
            }
            if worker.health_check() {
                continue;
            }
            match worker.restart() {
                Ok(()) => {
                    restarted += 1;
                    if self.unpark(idx) {
                        let _ = self.idle_tx.send(idx);
                    }
                }
                Err(e) => warn!(worker = idx, error = %e, "Worker restart failed"),
            }
        }
        if restarted > 0 {
            info!(restarted = restarted, "Health monitor restarted workers");
        }
        restarted
    }
}

/// Pool of worker processes shared by all parse units
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    monitor_stop: Mutex<Option<Sender<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `pool_size` workers and the health monitor
    ///
    /// Fails only if not a single worker could be started. Workers that fail
    /// to start are parked and retried by the monitor.
    pub fn new(settings: PoolSettings) -> PoolResult<Self> {
        let size = settings.pool_size;
        if size == 0 {
            return Err(PoolError::NoWorkers {
                requested: 0,
                reason: "pool size must be at least 1".into(),
            });
        }

        let (idle_tx, idle_rx) = bounded(size);
        let workers: Vec<WorkerProcess> = (0..size)
            .map(|id| WorkerProcess::new(id, &settings))
            .collect();

        let mut parked = Vec::new();
        let mut last_error = None;
        for worker in &workers {
            match worker.start() {
                Ok(()) => {
                    let _ = idle_tx.send(worker.id());
                }
                Err(e) => {
                    warn!(worker = worker.id(), error = %e, "Worker failed to start");
                    parked.push(worker.id());
                    last_error = Some(e);
                }
            }
        }

        if parked.len() == size {
            return Err(PoolError::NoWorkers {
                requested: size,
                reason: last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown".into()),
            });
        }

        info!(
            workers = size - parked.len(),
            requested = size,
            program = %settings.command.display(),
            "Worker pool ready"
        );

        let inner = Arc::new(PoolInner {
            workers,
            idle_tx,
            idle_rx,
            parked: Mutex::new(parked),
            shutdown: AtomicBool::new(false),
        });

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let monitor_inner = Arc::clone(&inner);
        let interval = settings.health_interval;
        let monitor = thread::Builder::new()
            .name("health-monitor".into())
            .spawn(move || monitor_loop(monitor_inner, stop_rx, interval))
            .map_err(|e| PoolError::NoWorkers {
                requested: size,
                reason: format!("cannot start health monitor: {}", e),
            })?;

        Ok(Self {
            inner,
            monitor_stop: Mutex::new(Some(stop_tx)),
            monitor: Mutex::new(Some(monitor)),
        })
    }

    /// Number of worker processes
    pub fn size(&self) -> usize {
        self.inner.workers.len()
    }

    /// Extract `keys` from `file`, retrying on other workers
    ///
    /// Makes at most one attempt per worker. Returns the data lines of the
    /// first successful reply.
    pub fn parse_file(
        &self,
        file: &Path,
        keys: &[String],
        timeout: Duration,
    ) -> PoolResult<Vec<String>> {
        let attempts = self.size();
        for attempt in 1..=attempts {
            let idx = self.inner.checkout(timeout)?;
            let result = self.inner.workers[idx].parse(file, keys, timeout);
            self.inner.checkin(idx);

            match result {
                Ok(lines) => return Ok(lines),
                Err(e) => warn!(
                    worker = idx,
                    attempt = attempt,
                    file = %file.display(),
                    error = %e,
                    "Worker attempt failed"
                ),
            }
        }

        Err(PoolError::AllWorkersFailed {
            file: file.to_path_buf(),
            attempts,
        })
    }

    /// Run one health monitor pass now; returns the number of restarted workers
    pub fn check_health(&self) -> usize {
        self.inner.check_health()
    }

    /// Snapshot of pool and worker counters
    pub fn stats(&self) -> PoolStats {
        let workers: Vec<WorkerStats> = self.inner.workers.iter().map(|w| w.stats()).collect();
        PoolStats {
            pool_size: workers.len(),
            healthy_workers: workers.iter().filter(|w| w.is_healthy).count(),
            total_requests: workers.iter().map(|w| w.requests_served).sum(),
            total_errors: workers.iter().map(|w| w.errors_encountered).sum(),
            total_restarts: workers.iter().map(|w| w.restarts).sum(),
            workers,
        }
    }

    /// Stop the monitor and every worker; further requests fail
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.monitor_stop.lock().take();
        if let Some(handle) = self.monitor.lock().take() {
            let _ = handle.join();
        }
        for worker in &self.inner.workers {
            worker.shutdown();
        }
        info!("Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn monitor_loop(inner: Arc<PoolInner>, stop: Receiver<()>, interval: Duration) {
    debug!(interval_secs = interval.as_secs_f64(), "Health monitor started");
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                inner.check_health();
            }
            _ => break,
        }
    }
    debug!("Health monitor stopped");
}
