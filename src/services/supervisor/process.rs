//! One supervised OS process.
//!
//! Each started process is owned by a monitor task. The task spawns the
//! child, confirms it past the start window, respawns it when configured to,
//! and serves stop/kill requests sent over a control channel. Callers observe
//! the state through a watch channel.

use std::collections::VecDeque;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::restart::RestartTracker;
use super::ProcessTiming;
use crate::domain::errors::ProcessError;
use crate::domain::models::{ProcessState, ServiceProcessConfig};

/// How long to wait for output readers to drain after the child exited.
const OUTPUT_DRAIN_LIMIT: Duration = Duration::from_millis(200);

type Reply = oneshot::Sender<Result<(), ProcessError>>;
type Messages = Arc<Mutex<VecDeque<String>>>;
type LastError = Arc<watch::Sender<Option<String>>>;

enum Control {
    Stop(Reply),
    Kill(Reply),
}

enum Outcome {
    Exited(ExitStatus),
    Finished,
}

/// A single supervised OS process and its run state.
pub struct ServiceProcess {
    config: ServiceProcessConfig,
    label: String,
    timing: ProcessTiming,
    state: Arc<watch::Sender<ProcessState>>,
    pid: Arc<AtomicU32>,
    messages: Messages,
    last_error: LastError,
    control: Mutex<Option<mpsc::Sender<Control>>>,
    /// Serializes start/stop/kill on this process.
    op_lock: Mutex<()>,
}

impl ServiceProcess {
    pub fn new(service: &str, config: ServiceProcessConfig, timing: ProcessTiming) -> Self {
        let (state, _) = watch::channel(ProcessState::NotStarted);
        Self {
            label: format!("{service}:{}", config.name),
            config,
            timing,
            state: Arc::new(state),
            pid: Arc::new(AtomicU32::new(0)),
            messages: Arc::new(Mutex::new(VecDeque::new())),
            last_error: Arc::new(watch::channel(None).0),
            control: Mutex::new(None),
            op_lock: Mutex::new(()),
        }
    }

    /// `<service>:<process name>`, used in logs and errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &ServiceProcessConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    /// Pid of the current child, if one is alive.
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Why the process last went `Failed`, kept until the next start.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    /// Last lines the process wrote to stdout/stderr.
    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }

    /// Spawn the process and wait until it is confirmed running.
    ///
    /// Resolves after the start window elapsed with the process alive, or
    /// with the first failure: spawn error, unexpected exit, or a respawn
    /// storm when `restart` is set.
    pub async fn start(&self) -> Result<(), ProcessError> {
        let _op = self.op_lock.lock().await;
        let state = self.state();
        if !state.can_start() {
            return Err(ProcessError::InvalidState {
                process: self.label.clone(),
                action: "start",
                state: state.to_string(),
            });
        }
        if !self.config.executable.is_file() {
            error!(
                process = %self.label,
                executable = %self.config.executable.display(),
                "executable does not exist"
            );
            let err = ProcessError::ExecutableNotFound(self.config.executable.clone());
            self.last_error.send_replace(Some(err.to_string()));
            self.state.send_replace(ProcessState::Failed);
            return Err(err);
        }

        self.last_error.send_replace(None);
        self.state.send_replace(ProcessState::Starting);
        let (control_tx, control_rx) = mpsc::channel(4);
        let (started_tx, started_rx) = oneshot::channel();
        let monitor = Monitor {
            config: self.config.clone(),
            label: self.label.clone(),
            timing: self.timing,
            state: Arc::clone(&self.state),
            pid: Arc::clone(&self.pid),
            messages: Arc::clone(&self.messages),
            last_error: Arc::clone(&self.last_error),
            control: control_rx,
            started: Some(started_tx),
            tracker: RestartTracker::new(
                self.timing.max_restart_count,
                self.timing.min_restart_interval,
            ),
        };
        *self.control.lock().await = Some(control_tx);
        tokio::spawn(monitor.run());

        started_rx
            .await
            .unwrap_or_else(|_| Err(ProcessError::SupervisorGone(self.label.clone())))
    }

    /// Terminate gracefully, waiting at most the stop-time limit.
    ///
    /// A process that outlives the limit is reported as
    /// [`ProcessError::StopTimeout`] and left in `Stopping`; [`Self::kill`]
    /// finishes it. Stopping a process that is not alive is a no-op.
    pub async fn stop(&self) -> Result<(), ProcessError> {
        let _op = self.op_lock.lock().await;
        if !self.state().is_alive() {
            debug!(process = %self.label, state = %self.state(), "stop skipped, not running");
            return Ok(());
        }
        self.request(Control::Stop).await
    }

    /// Force-kill the process.
    pub async fn kill(&self) -> Result<(), ProcessError> {
        let _op = self.op_lock.lock().await;
        if !self.state().is_alive() {
            return Ok(());
        }
        self.request(Control::Kill).await
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Control) -> Result<(), ProcessError> {
        let Some(control) = self.control.lock().await.clone() else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if control.send(make(reply_tx)).await.is_err() {
            // Monitor already finished; nothing left to stop.
            return Ok(());
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) if !self.state().is_alive() => Ok(()),
            Err(_) => Err(ProcessError::SupervisorGone(self.label.clone())),
        }
    }
}

impl std::fmt::Debug for ServiceProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProcess")
            .field("label", &self.label)
            .field("state", &self.state())
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

struct Monitor {
    config: ServiceProcessConfig,
    label: String,
    timing: ProcessTiming,
    state: Arc<watch::Sender<ProcessState>>,
    pid: Arc<AtomicU32>,
    messages: Messages,
    last_error: LastError,
    control: mpsc::Receiver<Control>,
    /// Pending reply to `start`, taken once the outcome is known.
    started: Option<oneshot::Sender<Result<(), ProcessError>>>,
    tracker: RestartTracker,
}

impl Monitor {
    async fn run(mut self) {
        loop {
            self.tracker.record_start(Instant::now());
            if self.config.restart && self.respawning_too_fast() {
                let err = ProcessError::RespawnTooFast {
                    process: self.label.clone(),
                    attempts: self.tracker.attempts(),
                    window: self.tracker.window(),
                };
                self.fail(err);
                return;
            }

            let (mut child, readers) = match self.spawn() {
                Ok(spawned) => spawned,
                Err(err) => {
                    self.fail(err);
                    return;
                }
            };

            let outcome = self.supervise(&mut child).await;
            self.pid.store(0, Ordering::Release);
            let status = match outcome {
                Outcome::Finished => return,
                Outcome::Exited(status) => status,
            };

            let _ = tokio::time::timeout(OUTPUT_DRAIN_LIMIT, join_all(readers)).await;
            if self.config.restart {
                warn!(process = %self.label, %status, "process ended, restarting");
                self.set_state(ProcessState::Starting);
                continue;
            }
            let messages = self.messages.lock().await.iter().cloned().collect();
            self.fail(ProcessError::Exit {
                process: self.label.clone(),
                code: status.code(),
                signal: status.signal(),
                messages,
            });
            return;
        }
    }

    /// While the first start is unconfirmed, running out of attempts is
    /// enough; afterwards only a run of fast restarts counts.
    fn respawning_too_fast(&self) -> bool {
        self.tracker.is_storm()
            || (self.started.is_some() && self.tracker.attempts() > self.timing.max_restart_count)
    }

    fn spawn(&self) -> Result<(Child, Vec<JoinHandle<()>>), ProcessError> {
        let mut child = Command::new(&self.config.executable)
            .args(&self.config.args)
            .current_dir(&self.config.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                process: self.label.clone(),
                source,
            })?;

        let pid = child.id().unwrap_or_default();
        self.pid.store(pid, Ordering::Release);
        info!(process = %self.label, pid, executable = %self.config.executable.display(), "process spawned");

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.forward_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.forward_output(stderr, "stderr"));
        }
        Ok((child, readers))
    }

    fn forward_output<R>(&self, reader: R, stream: &'static str) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let label = self.label.clone();
        let messages = Arc::clone(&self.messages);
        let limit = self.timing.message_lines;
        tokio::spawn(async move {
            // Keep reading until EOF; closing the pipe early would SIGPIPE the child.
            let mut segments = BufReader::new(reader).split(b'\n');
            loop {
                let raw = match segments.next_segment().await {
                    Ok(Some(raw)) => raw,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(process = %label, stream, error = %err, "failed to read process output");
                        break;
                    }
                };
                let line = String::from_utf8_lossy(&raw);
                let line = line.strip_suffix('\r').unwrap_or(&*line).to_string();
                debug!(process = %label, stream, "{line}");
                let mut buffer = messages.lock().await;
                buffer.push_back(line);
                while buffer.len() > limit {
                    buffer.pop_front();
                }
            }
        })
    }

    async fn supervise(&mut self, child: &mut Child) -> Outcome {
        let grace = tokio::time::sleep(self.timing.start_time_limit);
        tokio::pin!(grace);
        let mut confirmed = false;

        loop {
            tokio::select! {
                status = child.wait() => {
                    return match status {
                        Ok(status) => Outcome::Exited(status),
                        Err(err) => {
                            error!(process = %self.label, error = %err, "failed to wait for process");
                            let _ = child.kill().await;
                            Outcome::Exited(ExitStatus::from_raw(Signal::SIGKILL as i32))
                        }
                    };
                }
                () = &mut grace, if !confirmed => {
                    confirmed = true;
                    self.tracker.record_success();
                    self.set_state(ProcessState::Running);
                    info!(process = %self.label, pid = ?child.id(), "process running");
                    if let Some(started) = self.started.take() {
                        let _ = started.send(Ok(()));
                    }
                }
                command = self.control.recv() => {
                    match command {
                        Some(Control::Stop(reply)) => self.terminate(child, reply).await,
                        Some(Control::Kill(reply)) => {
                            self.force_kill(child).await;
                            let _ = reply.send(Ok(()));
                        }
                        None => self.force_kill(child).await,
                    }
                    return Outcome::Finished;
                }
            }
        }
    }

    /// SIGTERM, then wait up to the stop-time limit.
    async fn terminate(&mut self, child: &mut Child, reply: Reply) {
        self.set_state(ProcessState::Stopping);
        let Some(pid) = child.id() else {
            self.set_state(ProcessState::Stopped);
            let _ = reply.send(Ok(()));
            return;
        };

        match send_signal(pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(source) => {
                let _ = reply.send(Err(ProcessError::Signal {
                    process: self.label.clone(),
                    source,
                }));
                self.await_escalation(child).await;
                return;
            }
        }

        let limit = self.timing.stop_time_limit;
        if let Ok(status) = tokio::time::timeout(limit, child.wait()).await {
            info!(process = %self.label, pid, status = ?status.ok(), "process stopped");
            self.set_state(ProcessState::Stopped);
            let _ = reply.send(Ok(()));
            return;
        }

        warn!(process = %self.label, pid, ?limit, "process did not stop in time");
        let _ = reply.send(Err(ProcessError::StopTimeout {
            process: self.label.clone(),
            pid,
            limit,
        }));
        self.await_escalation(child).await;
    }

    /// After a failed stop: wait for the process to exit on its own or for
    /// the supervisor to kill it.
    async fn await_escalation(&mut self, child: &mut Child) {
        tokio::select! {
            _ = child.wait() => {
                self.set_state(ProcessState::Stopped);
            }
            command = self.control.recv() => {
                self.force_kill(child).await;
                if let Some(Control::Stop(reply) | Control::Kill(reply)) = command {
                    let _ = reply.send(Ok(()));
                }
            }
        }
    }

    async fn force_kill(&self, child: &mut Child) {
        warn!(process = %self.label, pid = ?child.id(), "killing process");
        if let Err(err) = child.kill().await {
            error!(process = %self.label, error = %err, "failed to kill process");
        }
        self.set_state(ProcessState::Stopped);
    }

    fn fail(&mut self, err: ProcessError) {
        error!(process = %self.label, error = %err, "process failed");
        self.last_error.send_replace(Some(err.to_string()));
        self.set_state(ProcessState::Failed);
        if let Some(started) = self.started.take() {
            let _ = started.send(Err(err));
        }
    }

    fn set_state(&self, next: ProcessState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(process = %self.label, from = %previous, to = %next, "state change");
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn send_signal(pid: u32, signal: Signal) -> Result<(), Errno> {
    kill(Pid::from_raw(pid as i32), signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> ProcessTiming {
        ProcessTiming {
            start_time_limit: Duration::from_millis(200),
            stop_time_limit: Duration::from_millis(500),
            min_restart_interval: Duration::from_millis(200),
            max_restart_count: 3,
            message_lines: 10,
        }
    }

    fn sh(name: &str, script: &str) -> ServiceProcessConfig {
        ServiceProcessConfig::new("/bin/sh", name, vec!["-c".into(), script.into()], "/")
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let process = ServiceProcess::new("svc", sh("sleeper", "exec sleep 30"), timing());
        process.start().await.unwrap();
        assert_eq!(process.state(), ProcessState::Running);
        assert!(process.pid().is_some());

        process.stop().await.unwrap();
        assert_eq!(process.state(), ProcessState::Stopped);
        assert_eq!(process.pid(), None);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let process = ServiceProcess::new("svc", sh("sleeper", "exec sleep 30"), timing());
        process.start().await.unwrap();
        let err = process.start().await.unwrap_err();
        assert!(matches!(err, ProcessError::InvalidState { action: "start", .. }));
        process.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_started_is_noop() {
        let process = ServiceProcess::new("svc", sh("idle", "true"), timing());
        process.stop().await.unwrap();
        assert_eq!(process.state(), ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_missing_executable_fails() {
        let config = ServiceProcessConfig::new("/nonexistent/bin", "ghost", vec![], "/");
        let process = ServiceProcess::new("svc", config, timing());
        let err = process.start().await.unwrap_err();
        assert!(matches!(err, ProcessError::ExecutableNotFound(_)));
        assert_eq!(process.state(), ProcessState::Failed);
        assert!(process.last_error().unwrap().contains("/nonexistent/bin"));
    }

    #[tokio::test]
    async fn test_restart_clears_last_error() {
        let process = ServiceProcess::new("svc", sh("sleeper", "exec sleep 30"), timing());
        process.last_error.send_replace(Some("old failure".to_string()));
        process.start().await.unwrap();
        assert_eq!(process.last_error(), None);
        process.stop().await.unwrap();
    }
}
