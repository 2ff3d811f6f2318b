use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line surface of the tool.
///
/// Every optional flag left unset falls back to the TOML file given with
/// `--config`, then to the built-in defaults.
#[derive(Parser, Debug, Clone)]
#[command(name = "meshtrace")]
#[command(version = "0.0.2")]
#[command(about = "Reconstructs a service callgraph from traffic captured across a cluster")]
pub struct Args {
    /// Hosts to capture on, as `[user@]address[:port]`
    #[arg(required = true, num_args = 1..)]
    pub hosts: Vec<String>,

    /// TOML file with `[capture]`, `[workload]`, `[graph]` and `[rancher]` tables
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// File with mappings between ports and service names
    #[arg(long = "ports-file", alias = "openstack-ports")]
    pub ports_file: Option<PathBuf>,

    /// Where to write the rendered callgraph
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Capture command run on every host
    #[arg(long)]
    pub capture_command: Option<String>,

    /// rally executable
    #[arg(long)]
    pub rally_bin: Option<PathBuf>,

    /// Directory holding the rally scenario files
    #[arg(long)]
    pub rally_dir: Option<PathBuf>,

    /// Scenario to run, relative to `--rally-dir`
    #[arg(long = "rally-task")]
    pub rally_task: Option<PathBuf>,

    /// Host of the rancher server
    #[arg(long)]
    pub rancher_host: Option<String>,

    #[arg(long, env = "RANCHER_ACCESS_KEY", hide_env_values = true)]
    pub rancher_access_key: Option<String>,

    #[arg(long, env = "RANCHER_SECRET_KEY", hide_env_values = true)]
    pub rancher_secret_key: Option<String>,

    /// Seconds allowed for reaching each host before the run is aborted
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,

    /// Seconds to wait for each host after the stop broadcast (0 waits forever)
    #[arg(long)]
    pub collect_timeout_secs: Option<u64>,

    /// Reject direction markers other than `<` and `>`
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub strict_direction: bool,

    /// Run the capture command on this machine instead of over ssh
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub local: bool,

    #[arg(long, short, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

/// File layout accepted by `--config`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub capture: CaptureConfig,
    pub workload: WorkloadConfig,
    pub graph: GraphConfig,
    pub rancher: RancherConfig,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }
}

/// Complete run configuration, built once in `main` and borrowed by every
/// component afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub hosts: Vec<Host>,
    pub capture: CaptureConfig,
    pub workload: WorkloadConfig,
    pub graph: GraphConfig,
    pub rancher: RancherConfig,
    pub verbose: bool,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Applies explicit command-line values on top of `file`, then validates.
    pub fn merge(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig {
            mut capture,
            mut workload,
            mut graph,
            mut rancher,
        } = file;

        if args.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        let hosts = args
            .hosts
            .iter()
            .map(|h| Host::parse(h))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(v) = args.capture_command {
            capture.command = v;
        }
        if let Some(v) = args.connect_timeout_secs {
            capture.connect_timeout_secs = v;
        }
        if let Some(v) = args.collect_timeout_secs {
            capture.collect_timeout_secs = v;
        }
        capture.strict_direction |= args.strict_direction;
        capture.local |= args.local;

        if let Some(v) = args.rally_bin {
            workload.rally_bin = v;
        }
        if let Some(v) = args.rally_dir {
            workload.rally_dir = v;
        }
        if let Some(v) = args.rally_task {
            workload.rally_task = v;
        }

        if let Some(v) = args.ports_file {
            graph.ports_file = v;
        }
        if let Some(v) = args.output {
            graph.output = v;
        }

        if let Some(v) = args.rancher_host {
            rancher.host = v;
        }
        if let Some(v) = args.rancher_access_key {
            rancher.access_key = v;
        }
        if let Some(v) = args.rancher_secret_key {
            rancher.secret_key = v;
        }

        let config = Config {
            hosts,
            capture,
            workload,
            graph,
            rancher,
            verbose: args.verbose,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rancher.access_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("RANCHER_ACCESS_KEY".into()));
        }
        if self.rancher.secret_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("RANCHER_SECRET_KEY".into()));
        }
        if self.capture.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue("capture command is empty".into()));
        }
        if self.capture.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "connect timeout must be at least one second".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.capture.connect_timeout_secs)
    }

    pub fn collect_timeout(&self) -> Option<Duration> {
        match self.capture.collect_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
