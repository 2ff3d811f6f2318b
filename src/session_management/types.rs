//! Core types shared by capture sessions and the cluster orchestrator.

use crate::configuration::types::Host;
use crate::error_handling::types::CaptureError;
use chrono::{DateTime, Utc};
use std::process::ExitStatus;
use uuid::Uuid;

/// Exit code reported for a process interrupted with SIGINT (128 + 2).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// How a remote process terminated, without platform-specific encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit code, when the process exited on its own.
    pub code: Option<i32>,
    /// Terminating signal, when the local child was killed by one.
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Terminal classification of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The capture ran to completion on its own.
    Success,
    /// The capture was ended by the stop broadcast, the expected case.
    Killed,
    /// The capture or the remote connection failed.
    Failed,
    /// The collector gave up waiting for this host.
    TimedOut,
}

impl SessionOutcome {
    /// Classifies an exit. A SIGINT exit status always counts as a stop; a
    /// signal death only does once a stop was requested.
    pub fn classify(stop_requested: bool, exit: &ExitInfo) -> SessionOutcome {
        match (exit.code, exit.signal) {
            (Some(INTERRUPTED_EXIT_CODE), _) => SessionOutcome::Killed,
            (_, Some(_)) if stop_requested => SessionOutcome::Killed,
            (Some(0), _) => SessionOutcome::Success,
            _ => SessionOutcome::Failed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SessionOutcome::Failed | SessionOutcome::TimedOut)
    }
}

/// Lifecycle of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Done(SessionOutcome),
}

impl SessionState {
    /// Moves to the next state; `None` for transitions the lifecycle forbids.
    pub fn advance(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;
        match (self, event) {
            (Starting, Launched) => Some(Running),
            (Starting, LaunchFailed) => Some(Done(SessionOutcome::Failed)),
            (Running, StopRequested) => Some(Stopping),
            (Running, Exited(exit)) => Some(Done(SessionOutcome::classify(false, &exit))),
            (Stopping, Exited(exit)) => Some(Done(SessionOutcome::classify(true, &exit))),
            (Running | Stopping, Lost) => Some(Done(SessionOutcome::Failed)),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        match self {
            SessionState::Done(outcome) => Some(*outcome),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Launched,
    LaunchFailed,
    StopRequested,
    Exited(ExitInfo),
    /// The process could not be waited on.
    Lost,
}

/// The single value every capture session delivers.
#[derive(Debug)]
pub struct CaptureResult {
    pub session_id: Uuid,
    pub host: Host,
    /// Everything the capture command wrote on stdout.
    pub output: String,
    pub error: Option<CaptureError>,
    pub exit: Option<ExitInfo>,
    pub outcome: SessionOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CaptureResult {
    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }
}
