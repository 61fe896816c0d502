//! A single persistent worker process
//!
//! Each worker:
//! - Is spawned once and announces itself with `READY`
//! - Serves one request at a time (the I/O pair sits behind a mutex)
//! - Has its stdout drained by a dedicated reader thread so every line read
//!   can be bounded by a timeout
//! - Is marked unhealthy on any failure and waits for a restart

use crate::config::{PoolSettings, WorkerCommand};
use crate::error::{WorkerError, WorkerResult};
use crate::worker::protocol::{Reply, Request};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Poll interval while waiting for a process to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Stdout lines buffered ahead of the reader; the reader thread blocks when full
const LINE_BUFFER: usize = 1024;

/// Kill and reap a child that will never be handed out
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Lifecycle state of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Healthy,
    Unhealthy,
    Restarting,
    Failed,
    Stopped,
}

/// Counters collected by a worker
#[derive(Debug, Default)]
struct WorkerCounters {
    requests_served: AtomicU64,
    errors: AtomicU64,
    restarts: AtomicU64,
}

impl WorkerCounters {
    fn record_request(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of a worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub id: usize,
    pub pid: Option<u32>,
    pub state: WorkerState,
    pub requests_served: u64,
    pub errors_encountered: u64,
    pub restarts: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub is_healthy: bool,
}

/// Pipes of a running process
struct ProcessIo {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<io::Result<String>>,
}

impl ProcessIo {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn send(&mut self, id: usize, request: &Request) -> WorkerResult<()> {
        self.stdin
            .write_all(request.encode().as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| WorkerError::Io {
                id,
                reason: e.to_string(),
            })
    }

    fn read_line(&self, id: usize, timeout: Duration) -> WorkerResult<String> {
        match self.lines.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(WorkerError::Io {
                id,
                reason: e.to_string(),
            }),
            Err(RecvTimeoutError::Timeout) => Err(WorkerError::Timeout { id, timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Exited { id }),
        }
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the process to exit, killing it after `grace`
    fn stop(mut self, id: usize, grace: Duration) {
        if self.send(id, &Request::Shutdown).is_ok() {
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                if self.has_exited() {
                    debug!(worker = id, "Worker exited after SHUTDOWN");
                    return;
                }
                thread::sleep(EXIT_POLL_INTERVAL);
            }
        }
        warn!(worker = id, pid = self.pid(), "Worker did not exit, killing");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A persistent external worker process
pub struct WorkerProcess {
    id: usize,
    command: WorkerCommand,
    startup_timeout: Duration,
    read_timeout: Duration,
    ping_timeout: Duration,
    shutdown_timeout: Duration,
    io: Mutex<Option<ProcessIo>>,
    state: Mutex<WorkerState>,
    last_used: Mutex<Option<DateTime<Utc>>>,
    counters: WorkerCounters,
}

impl WorkerProcess {
    /// Create a worker; call [`start`](Self::start) to spawn the process
    pub fn new(id: usize, settings: &PoolSettings) -> Self {
        Self {
            id,
            command: settings.command.clone(),
            startup_timeout: settings.startup_timeout,
            read_timeout: settings.read_timeout,
            ping_timeout: settings.ping_timeout,
            shutdown_timeout: settings.shutdown_timeout,
            io: Mutex::new(None),
            state: Mutex::new(WorkerState::Starting),
            last_used: Mutex::new(None),
            counters: WorkerCounters::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == WorkerState::Healthy
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    /// Flag the worker for restart by the health monitor
    pub fn mark_unhealthy(&self) {
        let mut state = self.state.lock();
        if *state == WorkerState::Healthy {
            *state = WorkerState::Unhealthy;
        }
    }

    /// Spawn the process and wait for `READY`
    pub fn start(&self) -> WorkerResult<()> {
        let mut io = self.io.lock();
        self.start_locked(&mut io)
    }

    fn start_locked(&self, slot: &mut Option<ProcessIo>) -> WorkerResult<()> {
        self.set_state(WorkerState::Starting);
        match self.spawn() {
            Ok(io) => {
                info!(worker = self.id, pid = io.pid(), "Worker started");
                *slot = Some(io);
                self.set_state(WorkerState::Healthy);
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Failed);
                Err(e)
            }
        }
    }

    fn spawn(&self) -> WorkerResult<ProcessIo> {
        let id = self.id;
        let spawn_failed = |reason: String| WorkerError::SpawnFailed {
            id,
            program: self.command.display(),
            reason,
        };

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_failed(e.to_string()))?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            abandon(&mut child);
            return Err(spawn_failed("stdio pipes unavailable".into()));
        };

        let (tx, rx) = bounded(LINE_BUFFER);
        let stdout_reader = thread::Builder::new()
            .name(format!("worker-{}-stdout", id))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        if let Err(e) = stdout_reader {
            abandon(&mut child);
            return Err(spawn_failed(format!("cannot start stdout reader: {}", e)));
        }

        let stderr_reader = thread::Builder::new()
            .name(format!("worker-{}-stderr", id))
            .spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(worker = id, "stderr: {}", line);
                }
            });
        if let Err(e) = stderr_reader {
            abandon(&mut child);
            return Err(spawn_failed(format!("cannot start stderr reader: {}", e)));
        }

        let mut io = ProcessIo {
            child,
            stdin,
            lines: rx,
        };

        let first = match io.read_line(id, self.startup_timeout) {
            Ok(line) => line,
            Err(e) => {
                let got = match e {
                    WorkerError::Exited { .. } => "<exited>".to_string(),
                    WorkerError::Timeout { .. } => "<nothing>".to_string(),
                    other => other.to_string(),
                };
                io.stop(id, Duration::ZERO);
                return Err(WorkerError::NotReady {
                    id,
                    timeout: self.startup_timeout,
                    got,
                });
            }
        };

        if Reply::classify(&first) != Reply::Ready {
            io.stop(id, Duration::ZERO);
            return Err(WorkerError::NotReady {
                id,
                timeout: self.startup_timeout,
                got: first,
            });
        }
        Ok(io)
    }

    /// Ask the worker to extract `keys` from `file`
    ///
    /// Returns the data lines of the reply. Any failure marks the worker
    /// unhealthy; it is not used again until restarted.
    pub fn parse(
        &self,
        file: &Path,
        keys: &[String],
        timeout: Duration,
    ) -> WorkerResult<Vec<String>> {
        let mut guard = self.io.lock();
        if !self.is_healthy() {
            return Err(WorkerError::Unhealthy { id: self.id });
        }
        let io = guard
            .as_mut()
            .ok_or(WorkerError::Unhealthy { id: self.id })?;

        match self.exchange(io, file, keys, timeout) {
            Ok(lines) => {
                self.counters.record_request();
                *self.last_used.lock() = Some(Utc::now());
                debug!(
                    worker = self.id,
                    file = %file.display(),
                    lines = lines.len(),
                    "Request served"
                );
                Ok(lines)
            }
            Err(e) => {
                self.counters.record_error();
                self.mark_unhealthy();
                warn!(
                    worker = self.id,
                    file = %file.display(),
                    error = %e,
                    "Request failed, worker marked unhealthy"
                );
                Err(e)
            }
        }
    }

    fn exchange(
        &self,
        io: &mut ProcessIo,
        file: &Path,
        keys: &[String],
        timeout: Duration,
    ) -> WorkerResult<Vec<String>> {
        io.send(self.id, &Request::parse(file, keys))?;

        let deadline = Instant::now() + timeout;
        let mut lines = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(WorkerError::Timeout { id: self.id, timeout });
            }
            let line = io
                .read_line(self.id, remaining.min(self.read_timeout))
                .map_err(|e| match e {
                    WorkerError::Timeout { .. } => WorkerError::Timeout { id: self.id, timeout },
                    other => other,
                })?;

            match Reply::classify(&line) {
                Reply::EndParse => return Ok(lines),
                Reply::Data(data) => {
                    if !data.trim().is_empty() {
                        lines.push(data);
                    }
                }
                Reply::Error(message) => {
                    self.counters.record_error();
                    error!(
                        worker = self.id,
                        file = %file.display(),
                        "Worker reported: {}",
                        message
                    );
                }
                Reply::RestartNeeded => {
                    warn!(worker = self.id, "Worker requested a restart");
                    self.mark_unhealthy();
                }
                Reply::Ready | Reply::Pong => {
                    debug!(worker = self.id, line = %line, "Ignoring unexpected line");
                }
            }
        }
    }

    /// Check liveness with `PING`
    ///
    /// A worker busy with a request is reported healthy without being
    /// disturbed. Returns the resulting health.
    pub fn health_check(&self) -> bool {
        let Some(mut guard) = self.io.try_lock() else {
            return self.is_healthy();
        };
        if !self.is_healthy() {
            return false;
        }
        let Some(io) = guard.as_mut() else {
            self.mark_unhealthy();
            return false;
        };

        let alive = !io.has_exited()
            && io.send(self.id, &Request::Ping).is_ok()
            && matches!(
                io.read_line(self.id, self.ping_timeout).map(|l| Reply::classify(&l)),
                Ok(Reply::Pong)
            );

        if !alive {
            warn!(worker = self.id, "Health check failed");
            self.mark_unhealthy();
        }
        alive
    }

    /// Stop the process (if any) and start a fresh one
    pub fn restart(&self) -> WorkerResult<()> {
        let mut slot = self.io.lock();
        self.set_state(WorkerState::Restarting);
        if let Some(io) = slot.take() {
            io.stop(self.id, self.shutdown_timeout);
        }
        self.counters.record_restart();
        info!(worker = self.id, "Restarting worker");
        self.start_locked(&mut slot)
    }

    /// Gracefully stop the process, killing it if it does not comply
    pub fn shutdown(&self) {
        let mut slot = self.io.lock();
        if let Some(io) = slot.take() {
            io.stop(self.id, self.shutdown_timeout);
            debug!(worker = self.id, "Worker stopped");
        }
        self.set_state(WorkerState::Stopped);
    }

    /// Snapshot of the worker counters
    pub fn stats(&self) -> WorkerStats {
        let pid = self.io.try_lock().and_then(|io| io.as_ref().map(ProcessIo::pid));
        let state = self.state();
        WorkerStats {
            id: self.id,
            pid,
            state,
            requests_served: self.counters.requests_served.load(Ordering::Relaxed),
            errors_encountered: self.counters.errors.load(Ordering::Relaxed),
            restarts: self.counters.restarts.load(Ordering::Relaxed),
            last_used: *self.last_used.lock(),
            is_healthy: state == WorkerState::Healthy,
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if let Some(io) = self.io.get_mut().take() {
            io.stop(self.id, self.shutdown_timeout);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::worker::testing::{settings, SCRIPT};

    fn keys() -> Vec<String> {
        vec!["cpuIpc".to_string(), "cacheMisses".to_string()]
    }

    #[test]
    fn test_start_and_parse() {
        let worker = WorkerProcess::new(0, &settings(SCRIPT));
        worker.start().unwrap();
        assert!(worker.is_healthy());

        let lines = worker
            .parse(Path::new("/tmp/stats.txt"), &keys(), Duration::from_secs(5))
            .unwrap();
        assert_eq!(lines, vec!["scalar/cpuIpc/1.5", "vector/cacheMisses::cpu0/10"]);

        let stats = worker.stats();
        assert_eq!(stats.requests_served, 1);
        assert!(stats.last_used.is_some());
        assert!(stats.pid.is_some());
        worker.shutdown();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_reply_larger_than_line_buffer() {
        let script = r#"echo READY
while IFS= read -r line; do
  case "$line" in
    SHUTDOWN) exit 0 ;;
    PARSE*) i=0; while [ $i -lt 3000 ]; do echo "scalar/s$i/$i"; i=$((i+1)); done; echo END_PARSE ;;
  esac
done"#;
        let worker = WorkerProcess::new(8, &settings(script));
        worker.start().unwrap();

        let lines = worker
            .parse(Path::new("/tmp/stats.txt"), &keys(), Duration::from_secs(20))
            .unwrap();
        assert!(lines.len() > LINE_BUFFER);
        assert_eq!(lines.len(), 3000);
        assert_eq!(lines[2999], "scalar/s2999/2999");
        assert!(worker.is_healthy());
    }

    #[test]
    fn test_wrong_startup_line() {
        let worker = WorkerProcess::new(1, &settings("echo HELLO; sleep 5"));
        let err = worker.start().unwrap_err();
        assert!(matches!(err, WorkerError::NotReady { ref got, .. } if got == "HELLO"));
        assert_eq!(worker.state(), WorkerState::Failed);
    }

    #[test]
    fn test_missing_program() {
        let worker = WorkerProcess::new(
            2,
            &PoolSettings::new(WorkerCommand::new("/nonexistent/stat-worker")),
        );
        assert!(matches!(
            worker.start(),
            Err(WorkerError::SpawnFailed { .. })
        ));
    }

    #[test]
    fn test_timeout_marks_unhealthy() {
        let worker = WorkerProcess::new(3, &settings(SCRIPT));
        worker.start().unwrap();

        let err = worker
            .parse(Path::new("/tmp/slow/stats.txt"), &keys(), Duration::from_millis(300))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(!worker.is_healthy());
        assert_eq!(worker.stats().errors_encountered, 1);

        // refuses further work until restarted
        assert!(matches!(
            worker.parse(Path::new("/tmp/stats.txt"), &keys(), Duration::from_secs(1)),
            Err(WorkerError::Unhealthy { .. })
        ));

        worker.restart().unwrap();
        assert!(worker.is_healthy());
        assert_eq!(worker.stats().restarts, 1);
        assert!(worker
            .parse(Path::new("/tmp/stats.txt"), &keys(), Duration::from_secs(5))
            .is_ok());
    }

    #[test]
    fn test_error_lines_are_not_terminal() {
        let worker = WorkerProcess::new(4, &settings(SCRIPT));
        worker.start().unwrap();
        let lines = worker
            .parse(Path::new("/tmp/broken/stats.txt"), &keys(), Duration::from_secs(5))
            .unwrap();
        assert!(lines.is_empty());
        assert!(worker.is_healthy());
        assert_eq!(worker.stats().errors_encountered, 1);
    }

    #[test]
    fn test_restart_needed_drains_then_flags() {
        let worker = WorkerProcess::new(5, &settings(SCRIPT));
        worker.start().unwrap();
        let lines = worker
            .parse(Path::new("/tmp/restart/stats.txt"), &keys(), Duration::from_secs(5))
            .unwrap();
        assert!(lines.is_empty());
        assert!(!worker.is_healthy());
    }

    #[test]
    fn test_health_check() {
        let worker = WorkerProcess::new(6, &settings(SCRIPT));
        worker.start().unwrap();
        assert!(worker.health_check());

        let dead = WorkerProcess::new(7, &settings("echo READY; exit 0"));
        dead.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(!dead.health_check());
        assert_eq!(dead.state(), WorkerState::Unhealthy);
    }
}
