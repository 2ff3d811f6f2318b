//! Capture session management.
//!
//! A [`CaptureSession`] runs the capture command on one host through a
//! [`RemoteTransport`] and yields exactly one [`CaptureResult`]. The
//! [`ClusterOrchestrator`] fans sessions out to every host and fans their
//! results back in through [`ClusterHandle::collect`].
//!
//! ```text
//! ┌──────────────┐ start_all ┌────────────────┐  ssh -tt  ┌────────┐
//! │ Orchestrator │──────────▶│ CaptureSession │──────────▶│ host N │
//! └──────────────┘           │  (task/host)   │           └────────┘
//!        ▲                   └────────────────┘
//!        │    collect()              │ oneshot
//!        └───────────────────────────┘
//! ```

pub mod orchestrator;
pub mod session;
#[cfg(all(test, target_os = "linux"))]
pub(crate) mod testing;
pub mod transport;
pub mod types;

pub use orchestrator::{ClusterHandle, ClusterOrchestrator};
pub use session::CaptureSession;
pub use transport::{LocalTransport, RemoteTransport, SshTransport, StopStrategy};
pub use types::{CaptureResult, ExitInfo, SessionOutcome, SessionState};
