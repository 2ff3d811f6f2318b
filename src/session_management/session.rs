use super::transport::{RemoteTransport, StopStrategy};
use super::types::{CaptureResult, ExitInfo, SessionEvent, SessionOutcome, SessionState};
use crate::configuration::types::Host;
use crate::error_handling::types::CaptureError;
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// ETX, what a terminal sends for Ctrl-C.
const INTERRUPT_BYTE: u8 = 0x03;

/// One in-flight capture on one host.
///
/// The capture process is owned by a background task. The session keeps the
/// two ends that talk to it: a stop channel and a one-shot result slot.
/// Dropping the session counts as a stop request.
pub struct CaptureSession {
    pub id: Uuid,
    pub host: Host,
    pub started_at: DateTime<Utc>,
    stop_tx: Option<oneshot::Sender<()>>,
    result_rx: oneshot::Receiver<CaptureResult>,
    task: JoinHandle<()>,
}

/// Pieces of a session handed to the orchestrator's collector.
pub(crate) struct SessionParts {
    pub id: Uuid,
    pub host: Host,
    pub started_at: DateTime<Utc>,
    pub stop_tx: Option<oneshot::Sender<()>>,
    pub result_rx: oneshot::Receiver<CaptureResult>,
    pub task: JoinHandle<()>,
}

struct Supervisor {
    id: Uuid,
    host: Host,
    started_at: DateTime<Utc>,
    strategy: StopStrategy,
    state: SessionState,
}

impl CaptureSession {
    /// Establishes a remote context for `host` and launches the capture.
    ///
    /// Returns once the process is running; an unreachable host or a command
    /// that cannot be spawned is reported here and no session is created.
    pub async fn start(
        host: Host,
        transport: Arc<dyn RemoteTransport>,
        capture_command: &str,
        connect_timeout: Duration,
    ) -> Result<CaptureSession, CaptureError> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        debug!("[{}/{}] starting capture session", host, id);

        if let Some((address, port)) = transport.probe_endpoint(&host) {
            probe(&address, port, connect_timeout).await.map_err(|e| {
                error!("[{}/{}] {}", host, id, e);
                e
            })?;
        }

        let mut cmd = transport.command(&host, capture_command);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            error!("[{}/{}] failed to spawn capture: {}", host, id, e);
            CaptureError::SpawnFailed(e)
        })?;

        let supervisor = Supervisor {
            id,
            host: host.clone(),
            started_at,
            strategy: transport.stop_strategy(),
            state: SessionState::Starting,
        }
        .transition(SessionEvent::Launched);

        let (stop_tx, stop_rx) = oneshot::channel();
        let (result_tx, result_rx) = oneshot::channel();
        let task = tokio::spawn(supervisor.run(child, stop_rx, result_tx));

        info!("[{}/{}] capture running", host, id);
        Ok(CaptureSession {
            id,
            host,
            started_at,
            stop_tx: Some(stop_tx),
            result_rx,
            task,
        })
    }

    /// Asks the capture to stop. Does not wait for it; later calls are no-ops.
    pub fn request_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            debug!("[{}/{}] sending stop signal", self.host, self.id);
            // the process may already be gone
            let _ = tx.send(());
        }
    }

    /// Waits for the single result of this session.
    pub async fn result(self) -> CaptureResult {
        let SessionParts {
            id,
            host,
            started_at,
            stop_tx,
            result_rx,
            task: _task,
        } = self.into_parts();
        let result = result_rx.await;
        drop(stop_tx);
        result.unwrap_or_else(|_| CaptureResult::lost(id, host, started_at))
    }

    pub(crate) fn into_parts(self) -> SessionParts {
        SessionParts {
            id: self.id,
            host: self.host,
            started_at: self.started_at,
            stop_tx: self.stop_tx,
            result_rx: self.result_rx,
            task: self.task,
        }
    }
}

impl CaptureResult {
    /// Result for a session whose task vanished without reporting.
    pub(crate) fn lost(id: Uuid, host: Host, started_at: DateTime<Utc>) -> Self {
        Self::abandoned(id, host, started_at, SessionOutcome::Failed, CaptureError::TaskLost)
    }

    pub(crate) fn timed_out(id: Uuid, host: Host, started_at: DateTime<Utc>) -> Self {
        Self::abandoned(id, host, started_at, SessionOutcome::TimedOut, CaptureError::Timeout)
    }

    fn abandoned(
        id: Uuid,
        host: Host,
        started_at: DateTime<Utc>,
        outcome: SessionOutcome,
        error: CaptureError,
    ) -> Self {
        Self {
            session_id: id,
            host,
            output: String::new(),
            error: Some(error),
            exit: None,
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

impl Supervisor {
    fn transition(mut self, event: SessionEvent) -> Self {
        match self.state.advance(event) {
            Some(next) => {
                trace!(
                    "[{}/{}] {:?} -> {:?}",
                    self.host,
                    self.id,
                    self.state,
                    next
                );
                self.state = next;
            }
            None => warn!(
                "[{}/{}] ignoring {:?} while {:?}",
                self.host, self.id, event, self.state
            ),
        }
        self
    }

    async fn run(
        mut self,
        mut child: Child,
        mut stop_rx: oneshot::Receiver<()>,
        result_tx: oneshot::Sender<CaptureResult>,
    ) {
        let tag = format!("[{}/{}]", self.host, self.id);
        let stdout_task = child.stdout.take().map(|out| tokio::spawn(read_output(out)));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr, tag.clone()));
        }
        let mut stdin = child.stdin.take();
        let mut error = None;

        let waited = tokio::select! {
            status = child.wait() => status,
            // an explicit stop and a dropped session both end the capture
            _ = &mut stop_rx => {
                self = self.transition(SessionEvent::StopRequested);
                if let Err(e) = deliver_stop(self.strategy, &mut child, &mut stdin).await {
                    warn!("{} failed to deliver stop signal: {}", tag, e);
                    error = Some(CaptureError::StopFailed(e));
                    let _ = child.start_kill();
                }
                child.wait().await
            }
        };

        let exit = match waited {
            Ok(status) => {
                let exit = ExitInfo::from(status);
                self = self.transition(SessionEvent::Exited(exit));
                Some(exit)
            }
            Err(e) => {
                error!("{} failed to wait for capture: {}", tag, e);
                self = self.transition(SessionEvent::Lost);
                error.get_or_insert(CaptureError::OutputError(e));
                None
            }
        };
        drop(stdin);

        let output = match stdout_task {
            Some(task) => match task.await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    warn!("{} failed to read capture output: {}", tag, e);
                    error.get_or_insert(CaptureError::OutputError(e));
                    String::new()
                }
                Err(e) => {
                    warn!("{} output reader panicked: {}", tag, e);
                    error.get_or_insert(CaptureError::TaskLost);
                    String::new()
                }
            },
            None => String::new(),
        };

        let outcome = self.state.outcome().unwrap_or(SessionOutcome::Failed);
        debug!(
            "{} capture finished: {:?} {:?}, {} bytes of output",
            tag,
            outcome,
            exit,
            output.len()
        );

        let result = CaptureResult {
            session_id: self.id,
            host: self.host,
            output,
            error,
            exit,
            outcome,
            started_at: self.started_at,
            finished_at: Utc::now(),
        };
        if result_tx.send(result).is_err() {
            debug!("{} result dropped, nobody is collecting", tag);
        }
    }
}

async fn probe(address: &str, port: u16, limit: Duration) -> Result<(), CaptureError> {
    match tokio::time::timeout(limit, TcpStream::connect((address, port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(CaptureError::ConnectFailed(format!(
            "{}:{}: {}",
            address, port, e
        ))),
        Err(_) => Err(CaptureError::ConnectFailed(format!(
            "{}:{}: no answer after {:?}",
            address, port, limit
        ))),
    }
}

async fn deliver_stop(
    strategy: StopStrategy,
    child: &mut Child,
    stdin: &mut Option<ChildStdin>,
) -> std::io::Result<()> {
    match (strategy, stdin.as_mut()) {
        (StopStrategy::Interrupt, Some(input)) => {
            input.write_all(&[INTERRUPT_BYTE]).await?;
            input.flush().await
        }
        (StopStrategy::KillGroup, _) => kill_group(child),
        _ => child.start_kill(),
    }
}

#[cfg(unix)]
fn kill_group(child: &mut Child) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // no id once the child has been reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

async fn read_output<R: AsyncReadExt + Unpin>(mut out: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    out.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn log_stderr<R: tokio::io::AsyncRead + Unpin>(err: R, tag: String) {
    let mut lines = BufReader::new(err).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("{}[stderr] {}", tag, line);
    }
}
