use crate::callgraph::{CallGraph, CallgraphBuilder, ServiceResolver};
use crate::configuration::config::Config;
use crate::error_handling::types::*;
use crate::session_management::{
    CaptureResult, ClusterOrchestrator, LocalTransport, RemoteTransport, SshTransport,
};
use crate::trace::{EventRecord, TraceParser};
use crate::workload::WorkloadRunner;
use log::{debug, info, warn};
use std::sync::Arc;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub hosts: usize,
    pub failed_hosts: usize,
    pub records: usize,
    pub edges: usize,
}

/// Drives one capture → workload → graph run.
pub struct Controller<'a> {
    config: &'a Config,
    transport: Arc<dyn RemoteTransport>,
}

impl<'a> Controller<'a> {
    pub fn new(config: &'a Config) -> Self {
        let transport: Arc<dyn RemoteTransport> = if config.capture.local {
            info!("Capturing on this machine only");
            Arc::new(LocalTransport)
        } else {
            Arc::new(SshTransport::new(config.capture.ssh_options.clone()))
        };
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: &'a Config, transport: Arc<dyn RemoteTransport>) -> Self {
        Self { config, transport }
    }

    pub async fn run(&self) -> Result<(CallGraph, RunSummary), ControllerError> {
        let resolver = ServiceResolver::from_file(&self.config.graph.ports_file)?;

        let orchestrator = ClusterOrchestrator::new(
            Arc::clone(&self.transport),
            self.config.capture.command.clone(),
            self.config.connect_timeout(),
        );
        let mut handle = orchestrator.start_all(&self.config.hosts).await?;

        let workload = WorkloadRunner::new(&self.config.workload, &self.config.rancher)
            .run()
            .await;
        if let Err(e) = workload {
            warn!("Workload failed, stopping captures");
            handle.shutdown(self.config.connect_timeout()).await;
            return Err(e.into());
        }
        handle.stop_all();

        let results = handle.collect(self.config.collect_timeout()).await;
        let (records, failed_hosts) =
            gather_records(&results, TraceParser::new(self.config.capture.strict_direction))?;

        let mut builder = CallgraphBuilder::new(&resolver);
        builder.extend(&records);
        let graph = builder.build();

        print!("{}", graph.render());
        graph.write_to(&self.config.graph.output)?;

        let summary = RunSummary {
            hosts: results.len(),
            failed_hosts,
            records: records.len(),
            edges: graph.len(),
        };
        info!(
            "Callgraph built: {} hosts ({} failed), {} records, {} edges",
            summary.hosts, summary.failed_hosts, summary.records, summary.edges
        );
        Ok((graph, summary))
    }
}

/// Parses every usable host output. Host failures are only logged; a trace
/// that cannot be parsed aborts the run.
pub fn gather_records(
    results: &[CaptureResult],
    parser: TraceParser,
) -> Result<(Vec<EventRecord>, usize), ControllerError> {
    let mut records = Vec::new();
    let mut failed_hosts = 0;

    for result in results {
        if result.is_failure() {
            failed_hosts += 1;
            match &result.error {
                Some(e) => warn!("[{}] capture failed: {}", result.host, e),
                None => warn!(
                    "[{}] capture failed with {:?}",
                    result.host, result.exit
                ),
            }
            if result.output.is_empty() {
                continue;
            }
        }

        let parsed = parser
            .parse(&result.output)
            .map_err(|source| ControllerError::ParseError {
                host: result.host.name.clone(),
                source,
            })?;
        debug!("[{}] {} records", result.host, parsed.len());
        records.extend(parsed);
    }

    Ok((records, failed_hosts))
}
