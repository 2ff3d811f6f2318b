pub mod config;
pub mod types;

pub use config::{Args, Config, FileConfig};
pub use types::{CaptureConfig, GraphConfig, Host, RancherConfig, WorkloadConfig};
