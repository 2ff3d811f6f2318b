pub mod callgraph;
pub use callgraph::{CallGraph, CallgraphBuilder, Edge, ServiceResolver};

pub mod configuration;
pub use configuration::{Config, Host};

pub mod controller;
pub use controller::{Controller, RunSummary};

pub mod error_handling;

pub mod session_management;
pub use session_management::{CaptureResult, CaptureSession, ClusterHandle, ClusterOrchestrator};

pub mod trace;
pub use trace::{Direction, EventRecord, TraceParser};

pub mod workload;
