//! Synthetic workload driven while the cluster is being captured.

use crate::configuration::types::{RancherConfig, WorkloadConfig};
use crate::error_handling::types::WorkloadError;
use log::{error, info};
use std::process::Stdio;
use tokio::process::Command;

pub struct WorkloadRunner<'a> {
    workload: &'a WorkloadConfig,
    rancher: &'a RancherConfig,
}

impl<'a> WorkloadRunner<'a> {
    pub fn new(workload: &'a WorkloadConfig, rancher: &'a RancherConfig) -> Self {
        Self { workload, rancher }
    }

    /// `rally task start <rally_dir>/<rally_task>`, with the rancher
    /// credentials exported for scenarios that talk to the cluster.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.workload.rally_bin);
        cmd.arg("task")
            .arg("start")
            .arg(self.workload.rally_dir.join(&self.workload.rally_task))
            .env("RANCHER_URL", format!("http://{}", self.rancher.host))
            .env("RANCHER_ACCESS_KEY", &self.rancher.access_key)
            .env("RANCHER_SECRET_KEY", &self.rancher.secret_key)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Runs the workload to completion and returns its combined output.
    pub async fn run(&self) -> Result<String, WorkloadError> {
        let mut cmd = self.command();
        let std_cmd = cmd.as_std();
        let line = std::iter::once(std_cmd.get_program())
            .chain(std_cmd.get_args())
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        info!("==> Executing: {}", line);

        let output = cmd.output().await.map_err(|e| {
            error!("Failed to spawn workload {}: {}", line, e);
            WorkloadError::SpawnFailed(e)
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !combined.is_empty() {
            info!("==> Output: {}", combined.trim_end());
        }

        if !output.status.success() {
            return Err(WorkloadError::Failed(format!(
                "{} exited with {}",
                line, output.status
            )));
        }
        Ok(combined)
    }
}
