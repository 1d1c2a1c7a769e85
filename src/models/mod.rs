//! Data models for initiocs.
//!
//! - [`DeviceRecord`]: one device line of the CONFIGURE file, i.e. one IOC to provision
//! - [`GlobalConfig`]: the `KEY=value` settings in file order
//! - [`BinaryLayout`]: flat or `support/`-nested binary distribution
//! - [`DeploymentSettings`]: validated, typed view of the globals used while provisioning
//! - [`CONFIG_SCHEMA`]: label, default and help text for every global setting
//! - [`DeployerSettings`]: tool settings (template source, timeouts) from `initiocs.yaml`
//!
//! Records and settings are built once per run and never mutated afterwards.

pub mod config;
pub mod device;

pub use config::{
    BinaryLayout, CONFIG_SCHEMA, ConfigError, ConfigField, DeployerSettings, DeploymentSettings,
    GlobalConfig, TemplateSource, schema_field,
};
pub use device::DeviceRecord;
