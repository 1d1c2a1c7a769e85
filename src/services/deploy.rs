use crate::metrics::RunMetrics;
use crate::models::{ConfigError, DeployerSettings, DeploymentSettings, DeviceRecord};
use crate::services::config_parser::ParsedConfig;
use crate::services::provisioning::{ProvisionError, ProvisionResult, Provisioner, StageReport};
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

/// Create the IOC output directory if it does not exist yet.
pub fn init_ioc_dir(settings: &DeploymentSettings) -> Result<(), ConfigError> {
    if settings.ioc_dir.is_dir() {
        tracing::info!("IOC directory {} already exists", settings.ioc_dir);
    } else {
        fs::create_dir_all(&settings.ioc_dir)?;
        tracing::info!("Created IOC directory {}", settings.ioc_dir);
    }
    Ok(())
}

/// Provision every device in order, one at a time.
///
/// A failed device never stops the devices after it. A device whose name was
/// already used by an earlier record fails without touching the filesystem,
/// since both would clone into the same directory.
pub async fn provision(
    records: &[DeviceRecord],
    settings: &DeploymentSettings,
    deployer: &DeployerSettings,
) -> Vec<ProvisionResult> {
    let provisioner = Provisioner::new(settings, deployer);
    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(records.len());

    for device in records {
        if !seen.insert(device.device_name.as_str()) {
            let error = ProvisionError::DuplicateDeviceName(device.device_name.clone());
            tracing::error!("Skipping device #{}: {}", device.sequence_number, error);
            results.push(ProvisionResult::failed(
                &device.device_name,
                error,
                StageReport::default(),
                Duration::ZERO,
            ));
            continue;
        }

        results.push(provisioner.provision_device(device).await);
    }

    results
}

/// Validate the configuration, prepare `IOC_DIR` and provision every device.
///
/// # Errors
///
/// Only fatal configuration problems (missing key, empty `IOC_DIR`, an
/// uncreatable output directory) are returned; per-device failures are in
/// the result list.
pub async fn run_deployment(
    parsed: &ParsedConfig,
    deployer: &DeployerSettings,
    metrics: &RunMetrics,
) -> Result<Vec<ProvisionResult>, ConfigError> {
    let settings = parsed.settings()?;
    init_ioc_dir(&settings)?;

    tracing::info!(
        "Provisioning {} IOCs into {} (binaries {:?} under {})",
        parsed.devices.len(),
        settings.ioc_dir,
        settings.layout,
        settings.binary_root
    );

    let results = provision(&parsed.devices, &settings, deployer).await;
    for result in &results {
        metrics.record_result(result);
    }

    Ok(results)
}
