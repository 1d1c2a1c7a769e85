// initiocs - EPICS IOC deployment tool
//
// This is the library crate containing the configuration model and the
// provisioning pipeline. The binary crate (main.rs) provides the CLI.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::{ConfigDocument, ConfigManager, DeviceEntry};
pub use metrics::RunMetrics;
pub use models::{
    BinaryLayout, ConfigError, DeployerSettings, DeploymentSettings, DeviceRecord, GlobalConfig,
};
pub use services::{ParsedConfig, ProvisionResult, Provisioner, parse_config, run_deployment};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
