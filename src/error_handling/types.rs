use crate::trace::parser::MIN_FIELDS;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NoHosts,
    InvalidHost(String),
    MissingCredential(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NoHosts => write!(f, "usage: meshtrace <host 1> ... <host n>"),
            ConfigError::InvalidHost(e) => write!(f, "invalid host '{}'", e),
            ConfigError::MissingCredential(e) => write!(f, "set {} environment variable", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum ResolverError {
    ReadFailed(PathBuf, std::io::Error),
}

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverError::ReadFailed(path, e) => {
                write!(f, "failed to open ports file {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ResolverError {}

#[derive(Debug)]
pub enum CaptureError {
    ConnectFailed(String),
    SpawnFailed(std::io::Error),
    OutputError(std::io::Error),
    StopFailed(std::io::Error),
    Timeout,
    TaskLost,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::ConnectFailed(e) => write!(f, "Remote connection failed: {}", e),
            CaptureError::SpawnFailed(e) => write!(f, "Capture spawn failed: {}", e),
            CaptureError::OutputError(e) => write!(f, "Capture output error: {}", e),
            CaptureError::StopFailed(e) => write!(f, "Stop signal delivery failed: {}", e),
            CaptureError::Timeout => write!(f, "Capture did not finish in time"),
            CaptureError::TaskLost => write!(f, "Capture task ended without a result"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug, PartialEq)]
pub enum ParseError {
    TooFewFields { line: usize, found: usize },
    UnknownDirection { line: usize, marker: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooFewFields { line, found } => {
                write!(
                    f,
                    "line {}: expected at least {} fields, found {}",
                    line, MIN_FIELDS, found
                )
            }
            ParseError::UnknownDirection { line, marker } => {
                write!(f, "line {}: unknown direction marker '{}'", line, marker)
            }
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub enum WorkloadError {
    SpawnFailed(std::io::Error),
    Failed(String),
}

impl fmt::Display for WorkloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadError::SpawnFailed(e) => write!(f, "Workload spawn failed: {}", e),
            WorkloadError::Failed(e) => write!(f, "Workload failed: {}", e),
        }
    }
}

impl std::error::Error for WorkloadError {}

#[derive(Debug)]
pub enum GraphError {
    WriteFailed(PathBuf, std::io::Error),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::WriteFailed(path, e) => {
                write!(f, "failed to write callgraph to {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for GraphError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    ResolverError(ResolverError),
    CaptureError(CaptureError),
    WorkloadError(WorkloadError),
    ParseError { host: String, source: ParseError },
    GraphError(GraphError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::ResolverError(e) => write!(f, "error extracting service ports: {}", e),
            ControllerError::CaptureError(e) => write!(f, "failed to start capture: {}", e),
            ControllerError::WorkloadError(e) => write!(f, "workload is out of gas? : {}", e),
            ControllerError::ParseError { host, source } => {
                write!(f, "error parsing results from {}: {}", host, source)
            }
            ControllerError::GraphError(e) => write!(f, "Graph error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<ResolverError> for ControllerError {
    fn from(err: ResolverError) -> Self {
        ControllerError::ResolverError(err)
    }
}

impl From<CaptureError> for ControllerError {
    fn from(err: CaptureError) -> Self {
        ControllerError::CaptureError(err)
    }
}

impl From<WorkloadError> for ControllerError {
    fn from(err: WorkloadError) -> Self {
        ControllerError::WorkloadError(err)
    }
}

impl From<GraphError> for ControllerError {
    fn from(err: GraphError) -> Self {
        ControllerError::GraphError(err)
    }
}
