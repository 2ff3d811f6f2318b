use super::session::{CaptureSession, SessionParts};
use super::transport::RemoteTransport;
use super::types::CaptureResult;
use crate::configuration::types::Host;
use crate::error_handling::types::CaptureError;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

/// Runs the same capture command on every host of a cluster.
///
/// Start-up is fail-fast: if any host cannot be started, the sessions that
/// did start are stopped and the whole operation returns the error, since a
/// capture missing a host produces a misleading graph.
pub struct ClusterOrchestrator {
    transport: Arc<dyn RemoteTransport>,
    capture_command: String,
    connect_timeout: Duration,
}

/// Running sessions of one cluster-wide capture.
pub struct ClusterHandle {
    sessions: Vec<CaptureSession>,
}

impl ClusterOrchestrator {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        capture_command: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            capture_command: capture_command.into(),
            connect_timeout,
        }
    }

    pub async fn start_all(&self, hosts: &[Host]) -> Result<ClusterHandle, CaptureError> {
        info!("Starting capture on {} hosts", hosts.len());

        // establishing each context may block on the network, so do it concurrently
        let mut starting = JoinSet::new();
        for (index, host) in hosts.iter().cloned().enumerate() {
            let transport = Arc::clone(&self.transport);
            let command = self.capture_command.clone();
            let connect_timeout = self.connect_timeout;
            starting.spawn(async move {
                let started =
                    CaptureSession::start(host.clone(), transport, &command, connect_timeout).await;
                (index, host, started)
            });
        }

        let mut sessions: Vec<Option<CaptureSession>> = hosts.iter().map(|_| None).collect();
        let mut failure = None;
        while let Some(joined) = starting.join_next().await {
            match joined {
                Ok((index, _, Ok(session))) => sessions[index] = Some(session),
                Ok((_, host, Err(e))) => {
                    error!("[{}] failed to start capture: {}", host, e);
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    error!("capture start task failed: {}", e);
                    failure.get_or_insert(CaptureError::TaskLost);
                }
            }
        }

        let handle = ClusterHandle {
            sessions: sessions.into_iter().flatten().collect(),
        };
        if let Some(e) = failure {
            warn!(
                "Aborting cluster capture, stopping {} started hosts",
                handle.len()
            );
            handle.shutdown(self.connect_timeout).await;
            return Err(e);
        }

        info!("Capture running on all {} hosts", handle.len());
        Ok(handle)
    }
}

impl ClusterHandle {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.sessions.iter().map(|s| &s.host)
    }

    /// Broadcasts a stop request to every session without waiting.
    pub fn stop_all(&mut self) {
        info!("Sending stop signal to {} hosts", self.sessions.len());
        for session in &mut self.sessions {
            session.request_stop();
        }
    }

    /// Stops every session and waits at most `grace` per host for it to end.
    ///
    /// Used on abort paths, where the captured output is thrown away but no
    /// capture may outlive the run.
    pub async fn shutdown(mut self, grace: Duration) -> Vec<CaptureResult> {
        self.stop_all();
        let results = self.collect(Some(grace)).await;
        debug!("{} sessions shut down", results.len());
        results
    }

    /// Waits until every session has delivered its result.
    ///
    /// Results come back in arrival order, not host order. With a
    /// `per_host_timeout`, a host that has not answered in time is abandoned
    /// and reported with a `TimedOut` outcome; `None` waits indefinitely.
    pub async fn collect(self, per_host_timeout: Option<Duration>) -> Vec<CaptureResult> {
        let expected = self.sessions.len();
        let mut pending = JoinSet::new();
        // kept alive so an unstopped session is not stopped by the collector
        let mut stop_senders: Vec<oneshot::Sender<()>> = Vec::new();

        for session in self.sessions {
            let SessionParts {
                id,
                host,
                started_at,
                stop_tx,
                result_rx,
                task,
            } = session.into_parts();
            stop_senders.extend(stop_tx);

            pending.spawn(async move {
                let received = match per_host_timeout {
                    Some(limit) => match tokio::time::timeout(limit, result_rx).await {
                        Ok(received) => received,
                        Err(_) => {
                            warn!("[{}/{}] no result after {:?}, giving up", host, id, limit);
                            // dropping the child inside the task kills it
                            task.abort();
                            let _ = task.await;
                            return CaptureResult::timed_out(id, host, started_at);
                        }
                    },
                    None => result_rx.await,
                };
                received.unwrap_or_else(|_| CaptureResult::lost(id, host, started_at))
            });
        }

        let mut results = Vec::with_capacity(expected);
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(result) => {
                    debug!(
                        "[{}] result received ({}/{})",
                        result.host,
                        results.len() + 1,
                        expected
                    );
                    results.push(result);
                }
                Err(e) => error!("result collector task failed: {}", e),
            }
        }
        drop(stop_senders);

        info!("Collected {} of {} capture results", results.len(), expected);
        results
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    #[cfg(target_os = "linux")]
    use crate::session_management::testing::{tagged_process_alive, TaggedTransport};
    use crate::session_management::transport::{LocalTransport, StopStrategy};
    use crate::session_management::types::SessionOutcome;
    use tokio::process::Command;

    const CONNECT: Duration = Duration::from_secs(5);

    fn hosts(names: &[&str]) -> Vec<Host> {
        names.iter().map(|n| Host::parse(n).unwrap()).collect()
    }

    /// Runs a per-host script picked by host address.
    struct ScriptedTransport;

    impl RemoteTransport for ScriptedTransport {
        fn probe_endpoint(&self, _host: &Host) -> Option<(String, u16)> {
            None
        }

        fn command(&self, host: &Host, _capture_command: &str) -> Command {
            let script = match host.address.as_str() {
                "fails" => "echo 'partial line'; exit 2",
                "hangs" => "trap '' INT TERM; exec sleep 30",
                "quick" => "echo done",
                _ => "echo 'captured'; exec sleep 30",
            };
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            cmd
        }

        fn stop_strategy(&self) -> StopStrategy {
            StopStrategy::Kill
        }
    }

    /// Refuses to launch on one host.
    struct BrokenTransport;

    impl RemoteTransport for BrokenTransport {
        fn probe_endpoint(&self, _host: &Host) -> Option<(String, u16)> {
            None
        }

        fn command(&self, host: &Host, capture_command: &str) -> Command {
            if host.address == "broken" {
                Command::new("/nonexistent/capture-agent")
            } else {
                LocalTransport.command(host, capture_command)
            }
        }

        fn stop_strategy(&self) -> StopStrategy {
            StopStrategy::Kill
        }
    }

    #[tokio::test]
    async fn test_collect_returns_one_result_per_host() {
        let orchestrator =
            ClusterOrchestrator::new(Arc::new(ScriptedTransport), "unused", CONNECT);
        let targets = hosts(&["h1", "h2", "h3", "h4", "h5"]);
        let mut handle = orchestrator.start_all(&targets).await.unwrap();
        assert_eq!(handle.len(), 5);

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop_all();
        let results = handle.collect(None).await;

        assert_eq!(results.len(), 5);
        let mut names: Vec<_> = results.iter().map(|r| r.host.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["h1", "h2", "h3", "h4", "h5"]);
        for result in &results {
            assert_eq!(result.outcome, SessionOutcome::Killed);
            assert_eq!(result.output, "captured\n");
        }
    }

    #[tokio::test]
    async fn test_failed_host_does_not_abort_collection() {
        let orchestrator =
            ClusterOrchestrator::new(Arc::new(ScriptedTransport), "unused", CONNECT);
        let mut handle = orchestrator
            .start_all(&hosts(&["fails", "ok", "quick"]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop_all();
        let results = handle.collect(None).await;
        assert_eq!(results.len(), 3);

        let by_name = |name: &str| results.iter().find(|r| r.host.name == name).unwrap();
        assert_eq!(by_name("fails").outcome, SessionOutcome::Failed);
        assert_eq!(by_name("fails").output, "partial line\n");
        assert_eq!(by_name("ok").outcome, SessionOutcome::Killed);
        assert_eq!(by_name("quick").outcome, SessionOutcome::Success);
    }

    #[tokio::test]
    async fn test_start_failure_aborts_everything() {
        let orchestrator =
            ClusterOrchestrator::new(Arc::new(BrokenTransport), "exec sleep 30", CONNECT);
        let err = orchestrator
            .start_all(&hosts(&["a", "broken", "b"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::SpawnFailed(_)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_start_failure_leaves_no_capture_running() {
        let transport = TaggedTransport::new();
        let tag = transport.tag.clone();
        let orchestrator = ClusterOrchestrator::new(
            Arc::new(transport),
            "echo captured; exec sleep 30",
            CONNECT,
        );
        let err = orchestrator
            .start_all(&hosts(&["a", "broken", "b"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::SpawnFailed(_)));

        // no await from here on, as if the process exited right away
        std::thread::sleep(Duration::from_millis(200));
        assert!(!tagged_process_alive(&tag));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_shutdown_waits_for_captures() {
        let transport = TaggedTransport::new();
        let tag = transport.tag.clone();
        let orchestrator =
            ClusterOrchestrator::new(Arc::new(transport), "sleep 30 | cat", CONNECT);
        let handle = orchestrator.start_all(&hosts(&["a", "b"])).await.unwrap();
        assert!(tagged_process_alive(&tag));

        let results = handle.shutdown(Duration::from_secs(5)).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome == SessionOutcome::Killed));
        std::thread::sleep(Duration::from_millis(200));
        assert!(!tagged_process_alive(&tag));
    }

    #[tokio::test]
    async fn test_collect_without_stop_waits_for_completion() {
        let orchestrator =
            ClusterOrchestrator::new(Arc::new(LocalTransport), "echo a; echo b", CONNECT);
        let handle = orchestrator.start_all(&hosts(&["x", "y"])).await.unwrap();
        let results = handle.collect(None).await;
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| r.outcome == SessionOutcome::Success && r.output == "a\nb\n"));
    }

    #[tokio::test]
    async fn test_collect_timeout_is_recovered() {
        // a stop delivered through stdin is ignored by a process that never reads it
        struct DeafTransport;
        impl RemoteTransport for DeafTransport {
            fn probe_endpoint(&self, _host: &Host) -> Option<(String, u16)> {
                None
            }
            fn command(&self, host: &Host, capture_command: &str) -> Command {
                ScriptedTransport.command(host, capture_command)
            }
            fn stop_strategy(&self) -> StopStrategy {
                StopStrategy::Interrupt
            }
        }

        let orchestrator = ClusterOrchestrator::new(Arc::new(DeafTransport), "unused", CONNECT);
        let mut handle = orchestrator
            .start_all(&hosts(&["hangs", "quick"]))
            .await
            .unwrap();
        handle.stop_all();
        let results = handle.collect(Some(Duration::from_millis(500))).await;
        assert_eq!(results.len(), 2);

        let hung = results.iter().find(|r| r.host.name == "hangs").unwrap();
        assert_eq!(hung.outcome, SessionOutcome::TimedOut);
        assert!(matches!(hung.error, Some(CaptureError::Timeout)));
        assert!(hung.is_failure());

        let quick = results.iter().find(|r| r.host.name == "quick").unwrap();
        assert_eq!(quick.outcome, SessionOutcome::Success);
    }

    #[tokio::test]
    async fn test_empty_cluster() {
        let orchestrator = ClusterOrchestrator::new(Arc::new(LocalTransport), "true", CONNECT);
        let handle = orchestrator.start_all(&[]).await.unwrap();
        assert!(handle.is_empty());
        assert!(handle.collect(None).await.is_empty());
    }
}
