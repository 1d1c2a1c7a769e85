//! Services module - the deployment pipeline, free of any front-end code.
//!
//! # Components
//!
//! - [`config_parser`]: turns CONFIGURE text into devices, globals and the binary layout
//! - [`binary_locator`]: finds a driver's IOC executable by directory convention
//! - [`rewrite`]: pure line rewriters for `st.cmd`, `unique.cmd`, `config` and `envPaths`
//! - [`provisioning`]: the per-device stage pipeline ([`Provisioner`])
//! - [`deploy`]: the driver that validates settings and provisions every device in order
//! - [`process`]: subprocess execution with optional timeouts (git, cleanup scripts)
//!
//! # Usage Example
//!
//! ```ignore
//! use initiocs::services::{parse_config, run_deployment};
//!
//! let parsed = parse_config(&std::fs::read_to_string("CONFIGURE.txt")?)?;
//! let results = run_deployment(&parsed, &DeployerSettings::default(), &metrics).await?;
//! for result in &results {
//!     println!("{}: {}", result.device_name, result.message);
//! }
//! ```
//!
//! Any front end (the CLI here, or an interactive form) calls into these
//! functions and owns no provisioning logic itself.

pub mod binary_locator;
pub mod config_parser;
pub mod deploy;
pub mod process;
pub mod provisioning;
pub mod rewrite;

pub use binary_locator::{LocateError, driver_root, locate_ioc_binary};
pub use config_parser::{LineKind, ParsedConfig, classify_line, parse_config, parse_config_file};
pub use deploy::{init_ioc_dir, provision, run_deployment};
pub use provisioning::{
    ProvisionError, ProvisionResult, ProvisionStatus, Provisioner, StageReport,
};
