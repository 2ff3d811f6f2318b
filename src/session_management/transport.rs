//! How capture commands reach a host.

use crate::configuration::types::Host;
use tokio::process::Command;

const DEFAULT_SSH_PORT: u16 = 22;

/// How a running capture is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStrategy {
    /// Write ETX on the forced remote tty so the remote process gets SIGINT.
    Interrupt,
    /// Kill the local child process.
    Kill,
    /// Kill the process group the local child leads, taking pipelines and
    /// other forked helpers down with it.
    KillGroup,
}

/// Seam between capture sessions and the mechanism that runs their command.
pub trait RemoteTransport: Send + Sync {
    /// TCP endpoint that must accept a connection before the session is
    /// considered established. `None` skips the check.
    fn probe_endpoint(&self, host: &Host) -> Option<(String, u16)>;

    /// Builds the process that runs `capture_command` for `host`.
    fn command(&self, host: &Host, capture_command: &str) -> Command;

    fn stop_strategy(&self) -> StopStrategy;
}

/// Runs captures over `ssh` with a forced tty.
#[derive(Debug, Clone)]
pub struct SshTransport {
    program: String,
    options: Vec<String>,
}

impl SshTransport {
    pub fn new(options: Vec<String>) -> Self {
        Self {
            program: String::from("ssh"),
            options,
        }
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RemoteTransport for SshTransport {
    fn probe_endpoint(&self, host: &Host) -> Option<(String, u16)> {
        Some((host.address.clone(), host.port.unwrap_or(DEFAULT_SSH_PORT)))
    }

    fn command(&self, host: &Host, capture_command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-tt").arg("-o").arg("BatchMode=yes");
        if let Some(port) = host.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(user) = &host.user {
            cmd.arg("-l").arg(user);
        }
        cmd.args(&self.options)
            .arg(&host.address)
            .arg(capture_command);
        cmd
    }

    fn stop_strategy(&self) -> StopStrategy {
        StopStrategy::Interrupt
    }
}

/// Runs captures with `sh -c` on this machine, ignoring the host address.
///
/// Each capture leads its own process group so a stop reaches everything the
/// shell forked.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

impl RemoteTransport for LocalTransport {
    fn probe_endpoint(&self, _host: &Host) -> Option<(String, u16)> {
        None
    }

    fn command(&self, _host: &Host, capture_command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(capture_command);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    fn stop_strategy(&self) -> StopStrategy {
        StopStrategy::KillGroup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_ssh_command_line() {
        let transport = SshTransport::new(vec!["-o".into(), "StrictHostKeyChecking=no".into()]);
        let host = Host::parse("root@compute1:2222").unwrap();
        let cmd = transport.command(&host, "sysdig -c httplog");

        assert_eq!(cmd.as_std().get_program(), "ssh");
        assert_eq!(
            args(&cmd),
            vec![
                "-tt",
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-l",
                "root",
                "-o",
                "StrictHostKeyChecking=no",
                "compute1",
                "sysdig -c httplog",
            ]
        );
        assert_eq!(
            transport.probe_endpoint(&host),
            Some(("compute1".to_string(), 2222))
        );
    }

    #[test]
    fn test_ssh_defaults() {
        let transport = SshTransport::default();
        let host = Host::parse("controller").unwrap();
        assert_eq!(
            args(&transport.command(&host, "true")),
            vec!["-tt", "-o", "BatchMode=yes", "controller", "true"]
        );
        assert_eq!(
            transport.probe_endpoint(&host),
            Some(("controller".to_string(), 22))
        );
        assert_eq!(transport.stop_strategy(), StopStrategy::Interrupt);
    }

    #[test]
    fn test_local_command_line() {
        let host = Host::parse("anything").unwrap();
        let cmd = LocalTransport.command(&host, "echo hi");
        assert_eq!(cmd.as_std().get_program(), "sh");
        assert_eq!(args(&cmd), vec!["-c", "echo hi"]);
        assert_eq!(LocalTransport.probe_endpoint(&host), None);
        assert_eq!(LocalTransport.stop_strategy(), StopStrategy::KillGroup);
    }
}
