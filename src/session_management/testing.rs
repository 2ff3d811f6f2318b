//! Helpers for tests that need to see which capture processes are still alive.

use super::transport::{LocalTransport, RemoteTransport, StopStrategy};
use crate::configuration::types::Host;
use tokio::process::Command;
use uuid::Uuid;

const TAG_VAR: &str = "MESHTRACE_TEST_TAG";

/// Local transport that marks every process it starts with a unique tag in
/// the environment. Refuses to launch on a host named `broken`.
pub(crate) struct TaggedTransport {
    pub tag: String,
}

impl TaggedTransport {
    pub fn new() -> Self {
        Self {
            tag: Uuid::new_v4().to_string(),
        }
    }
}

impl RemoteTransport for TaggedTransport {
    fn probe_endpoint(&self, _host: &Host) -> Option<(String, u16)> {
        None
    }

    fn command(&self, host: &Host, capture_command: &str) -> Command {
        if host.address == "broken" {
            return Command::new("/nonexistent/capture-agent");
        }
        let mut cmd = LocalTransport.command(host, capture_command);
        cmd.env(TAG_VAR, &self.tag);
        cmd
    }

    fn stop_strategy(&self) -> StopStrategy {
        LocalTransport.stop_strategy()
    }
}

/// Whether any live (non-zombie) process carries `tag`.
pub(crate) fn tagged_process_alive(tag: &str) -> bool {
    let marker = format!("{}={}", TAG_VAR, tag);
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };

    entries.flatten().any(|entry| {
        let path = entry.path();
        let Ok(environ) = std::fs::read(path.join("environ")) else {
            return false;
        };
        let tagged = environ
            .split(|b| *b == 0)
            .any(|var| var == marker.as_bytes());
        if !tagged {
            return false;
        }
        // state is the first field after the parenthesised command name
        match std::fs::read_to_string(path.join("stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    })
}
