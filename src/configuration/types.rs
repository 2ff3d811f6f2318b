use crate::error_handling::types::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

fn host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?P<user>[^@\s]+)@)?(?:\[(?P<v6>[0-9A-Fa-f:.%\w]+)\]|(?P<addr>[^@:\s\[\]]+))(?::(?P<port>\d+))?$")
            .unwrap_or_else(|e| panic!("invalid host pattern: {}", e))
    })
}

/// A remote capture target, parsed from a `[user@]address[:port]` specifier.
///
/// `name` keeps the specifier as typed on the command line and is used in
/// every log line and result for that host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub user: Option<String>,
    pub address: String,
    pub port: Option<u16>,
}

impl Host {
    pub fn parse(input: &str) -> Result<Host, ConfigError> {
        let input = input.trim();
        let caps = host_pattern()
            .captures(input)
            .ok_or_else(|| ConfigError::InvalidHost(input.to_string()))?;

        let address = caps
            .name("v6")
            .or_else(|| caps.name("addr"))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ConfigError::InvalidHost(input.to_string()))?;

        let port = match caps.name("port") {
            Some(p) => Some(
                p.as_str()
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| ConfigError::InvalidHost(input.to_string()))?,
            ),
            None => None,
        };

        Ok(Host {
            name: input.to_string(),
            user: caps.name("user").map(|m| m.as_str().to_string()),
            address,
            port,
        })
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Settings for the per-host capture sessions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Shell command run on every host; must print one event per line.
    ///
    /// Over `ssh -tt` the remote stderr shares the tty with stdout, so
    /// diagnostics have to be kept out of it here.
    pub command: String,
    /// Extra options handed to `ssh` before the destination.
    pub ssh_options: Vec<String>,
    pub connect_timeout_secs: u64,
    /// `0` waits for every host forever.
    pub collect_timeout_secs: u64,
    pub strict_direction: bool,
    /// Run the capture on this machine instead of over ssh.
    pub local: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: String::from(
                "stty -echo 2>/dev/null; exec sudo sysdig -c httplog container.name!=host 2>/dev/null",
            ),
            ssh_options: Vec::new(),
            connect_timeout_secs: 10,
            collect_timeout_secs: 0,
            strict_direction: false,
            local: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub rally_bin: PathBuf,
    /// Directory holding the rally scenario files.
    pub rally_dir: PathBuf,
    /// Scenario path, relative to `rally_dir`.
    pub rally_task: PathBuf,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            rally_bin: PathBuf::from("rally"),
            rally_dir: PathBuf::from("samples/tasks/scenarios"),
            rally_task: PathBuf::from("nova/boot-and-delete.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Port map file, one `service:port[,port...]` entry per line.
    pub ports_file: PathBuf,
    pub output: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            ports_file: PathBuf::from("openstack.ports"),
            output: PathBuf::from("openstack-callgraph.dot"),
        }
    }
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RancherConfig {
    pub host: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Default for RancherConfig {
    fn default() -> Self {
        Self {
            host: String::from("slfy80.local:8080"),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

// Keys stay out of logs.
impl fmt::Debug for RancherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RancherConfig")
            .field("host", &self.host)
            .field("access_key", &"***")
            .field("secret_key", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_host() {
        let host = Host::parse("compute1").unwrap();
        assert_eq!(host.name, "compute1");
        assert_eq!(host.address, "compute1");
        assert_eq!(host.user, None);
        assert_eq!(host.port, None);
    }

    #[test]
    fn test_parse_user_and_port() {
        let host = Host::parse("root@10.0.0.5:2222").unwrap();
        assert_eq!(host.user.as_deref(), Some("root"));
        assert_eq!(host.address, "10.0.0.5");
        assert_eq!(host.port, Some(2222));
        assert_eq!(host.to_string(), "root@10.0.0.5:2222");
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let host = Host::parse("admin@[fe80::1]:22").unwrap();
        assert_eq!(host.address, "fe80::1");
        assert_eq!(host.port, Some(22));
    }

    #[test]
    fn test_reject_bad_specifiers() {
        for input in ["", "host:", "host:99999", "host:0", "a@@b", "fe80::1", "two words"] {
            assert!(
                matches!(Host::parse(input), Err(ConfigError::InvalidHost(_))),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_default_capture_keeps_stderr_out_of_trace() {
        let capture = CaptureConfig::default();
        assert!(capture.command.contains("sysdig"));
        assert!(capture.command.ends_with("2>/dev/null"));
        assert!(!capture.local);
    }

    #[test]
    fn test_rancher_debug_hides_keys() {
        let rancher = RancherConfig {
            access_key: "AK".into(),
            secret_key: "SK".into(),
            ..Default::default()
        };
        let shown = format!("{:?}", rancher);
        assert!(!shown.contains("AK"));
        assert!(!shown.contains("SK"));
    }
}
