use crate::models::{DeployerSettings, DeploymentSettings, DeviceRecord, TemplateSource};
use crate::services::binary_locator::{LocateError, locate_ioc_binary};
use crate::services::process::{ProcessOutcome, run_process};
use crate::services::rewrite::{
    render_startup_script, rewrite_env_paths, rewrite_procserv_config, rewrite_unique_settings,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

pub const STARTUP_SCRIPT: &str = "st.cmd";
pub const STARTUP_SCRIPTS_DIR: &str = "startupScripts";
pub const AUTOSAVE_DIR: &str = "autosaveFiles";
pub const AUTOSAVE_FILE: &str = "auto_settings.req";
pub const DEPENDENCY_DIR: &str = "dependancyFiles";
pub const UNIQUE_FILE: &str = "unique.cmd";
pub const UNIQUE_BACKUP: &str = "unique_OLD.cmd";
pub const PROCSERV_CONFIG: &str = "config";
pub const PROCSERV_BACKUP: &str = "config_OLD";
pub const ENV_PATHS_FILE: &str = "envPaths";
pub const ENV_PATHS_BACKUP: &str = "envPaths_OLD";

/// Cleanup script shipped with the template for this platform
pub fn cleanup_script_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "cleanup.bat"
    } else {
        "cleanup.sh"
    }
}

/// Errors that abort provisioning of a single device
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to clone IOC template for {name}: {reason}")]
    CloneFailed { name: String, reason: String },

    #[error("{0} is not yet supported, no matching startup script")]
    UnsupportedDeviceType(String),

    #[error("Could not locate IOC binary: {0}")]
    Binary(#[from] LocateError),

    #[error("Device name {0} is already used by an earlier device")]
    DuplicateDeviceName(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Utf8Path, source: std::io::Error) -> ProvisionError {
    ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Final state of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStatus {
    Provisioned,
    Failed,
}

/// What the optional stages actually did for one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// File under `startupScripts/` that became `st.cmd`
    pub startup_template: Option<String>,
    pub autosave_placed: bool,
    pub dependency_files: Vec<String>,
    pub unique_rewritten: bool,
    pub config_rewritten: bool,
    pub env_paths_fixed: bool,
    pub cleanup_ran: bool,
}

impl StageReport {
    /// Number of generated or rewritten template files
    pub fn files_rewritten(&self) -> usize {
        [
            self.startup_template.is_some(),
            self.unique_rewritten,
            self.config_rewritten,
            self.env_paths_fixed,
        ]
        .into_iter()
        .filter(|done| *done)
        .count()
    }

    /// Get a summary string of what was done
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if let Some(template) = &self.startup_template {
            parts.push(format!("st.cmd from {}", template));
        }
        if self.autosave_placed {
            parts.push("auto_settings.req".to_string());
        }
        if !self.dependency_files.is_empty() {
            parts.push(format!("{} dependency files", self.dependency_files.len()));
        }
        if self.unique_rewritten {
            parts.push(UNIQUE_FILE.to_string());
        }
        if self.config_rewritten {
            parts.push(PROCSERV_CONFIG.to_string());
        }
        if self.env_paths_fixed {
            parts.push(ENV_PATHS_FILE.to_string());
        }
        if self.cleanup_ran {
            parts.push("cleanup".to_string());
        }

        if parts.is_empty() {
            "Nothing generated".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Result of provisioning one device
#[derive(Debug)]
pub struct ProvisionResult {
    pub device_name: String,
    pub success: bool,
    pub status: ProvisionStatus,
    pub message: String,
    pub duration: Duration,
    pub report: StageReport,
    pub error: Option<ProvisionError>,
}

impl ProvisionResult {
    pub fn provisioned(device_name: &str, report: StageReport, duration: Duration) -> Self {
        Self {
            device_name: device_name.to_string(),
            success: true,
            status: ProvisionStatus::Provisioned,
            message: report.summary(),
            duration,
            report,
            error: None,
        }
    }

    pub fn failed(
        device_name: &str,
        error: ProvisionError,
        report: StageReport,
        duration: Duration,
    ) -> Self {
        Self {
            device_name: device_name.to_string(),
            success: false,
            status: ProvisionStatus::Failed,
            message: error.to_string(),
            duration,
            report,
            error: Some(error),
        }
    }
}

/// Runs the per-device pipeline: fetch template, st.cmd, autosave and
/// dependency files, unique.cmd, procServ config, envPaths, cleanup.
///
/// Stages run strictly in order. Only template fetch, startup script
/// generation and I/O failures abort a device; absent optional files are
/// logged and recorded in the [`StageReport`]. Nothing is rolled back.
pub struct Provisioner<'a> {
    settings: &'a DeploymentSettings,
    template: TemplateSource,
    clone_timeout: Option<Duration>,
    cleanup_timeout: Option<Duration>,
}

impl<'a> Provisioner<'a> {
    pub fn new(settings: &'a DeploymentSettings, deployer: &DeployerSettings) -> Self {
        Self {
            settings,
            template: deployer.template(),
            clone_timeout: deployer.clone_timeout(),
            cleanup_timeout: deployer.cleanup_timeout(),
        }
    }

    /// Provision one device. Never fails; errors are reported in the result.
    pub async fn provision_device(&self, device: &DeviceRecord) -> ProvisionResult {
        tracing::info!("-------------------------------------------");
        tracing::info!("Setup process for IOC {}", device.device_name);
        tracing::info!("-------------------------------------------");

        let start = Instant::now();
        let mut report = StageReport::default();

        match self.run_stages(device, &mut report).await {
            Ok(()) => {
                let result =
                    ProvisionResult::provisioned(&device.device_name, report, start.elapsed());
                tracing::info!("IOC {} provisioned: {}", device.device_name, result.message);
                result
            }
            Err(e) => {
                tracing::error!("IOC {} failed: {}", device.device_name, e);
                ProvisionResult::failed(&device.device_name, e, report, start.elapsed())
            }
        }
    }

    async fn run_stages(
        &self,
        device: &DeviceRecord,
        report: &mut StageReport,
    ) -> Result<(), ProvisionError> {
        let ioc_path = self.fetch_template(device).await?;
        report.startup_template = Some(self.generate_startup_script(device, &ioc_path)?);
        report.autosave_placed = self.place_autosave_file(device, &ioc_path)?;
        report.dependency_files = self.place_dependency_files(device, &ioc_path)?;
        report.unique_rewritten = self.update_unique(device, &ioc_path)?;
        report.config_rewritten = self.update_procserv_config(device, &ioc_path)?;
        report.env_paths_fixed = self.fix_env_paths(&ioc_path)?;
        report.cleanup_ran = self.cleanup(device, &ioc_path).await?;
        Ok(())
    }

    /// Clone or copy the template into `<IOC_DIR>/<device_name>`.
    pub async fn fetch_template(&self, device: &DeviceRecord) -> Result<Utf8PathBuf, ProvisionError> {
        let dest = self.settings.ioc_path(&device.device_name);
        let clone_failed = |reason: String| ProvisionError::CloneFailed {
            name: device.device_name.clone(),
            reason,
        };

        if dest.exists() && !is_empty_dir(&dest) {
            return Err(clone_failed(format!("{} already exists", dest)));
        }

        match &self.template {
            TemplateSource::Git(url) => {
                let mut command = Command::new("git");
                command
                    .args(["clone", "--quiet"])
                    .arg(url)
                    .arg(dest.as_str());

                match run_process(command, "git clone", self.clone_timeout).await {
                    Ok(ProcessOutcome::Exited(0)) => {}
                    Ok(ProcessOutcome::Exited(code)) => {
                        return Err(clone_failed(format!("git exited with code {}", code)));
                    }
                    Ok(ProcessOutcome::TimedOut(limit)) => {
                        return Err(clone_failed(format!("git timed out after {:?}", limit)));
                    }
                    Err(e) => return Err(clone_failed(format!("could not run git: {}", e))),
                }
            }
            TemplateSource::Local(source) => {
                copy_dir_recursive(source.as_std_path(), dest.as_std_path())
                    .map_err(|e| clone_failed(format!("copy from {} failed: {}", source, e)))?;
            }
        }

        tracing::info!("IOC template cloned, converting st.cmd");
        Ok(dest)
    }

    /// Replace `st.cmd` with the device's startup script from `startupScripts/`.
    ///
    /// Returns the name of the template script used.
    pub fn generate_startup_script(
        &self,
        device: &DeviceRecord,
        ioc_path: &Utf8Path,
    ) -> Result<String, ProvisionError> {
        let st_cmd = ioc_path.join(STARTUP_SCRIPT);
        if st_cmd.exists() {
            fs::remove_file(&st_cmd).map_err(|e| io_error(&st_cmd, e))?;
        }

        let scripts_dir = ioc_path.join(STARTUP_SCRIPTS_DIR);
        let short_type = device.short_type_lower();
        let template_name = sorted_file_names(&scripts_dir)?
            .into_iter()
            .find(|name| name.to_lowercase().contains(&short_type))
            .ok_or_else(|| ProvisionError::UnsupportedDeviceType(device.device_type.clone()))?;

        let template_path = scripts_dir.join(&template_name);
        let template =
            fs::read_to_string(&template_path).map_err(|e| io_error(&template_path, e))?;

        let script = render_startup_script(&template, || {
            locate_ioc_binary(
                &self.settings.binary_root,
                self.settings.layout,
                &device.device_type,
            )
        })?;

        fs::write(&st_cmd, script).map_err(|e| io_error(&st_cmd, e))?;
        tracing::debug!("Wrote {} from {}", st_cmd, template_path);

        Ok(template_name)
    }

    /// Move `autosaveFiles/<short>_auto_settings.req` to `auto_settings.req`.
    pub fn place_autosave_file(
        &self,
        device: &DeviceRecord,
        ioc_path: &Utf8Path,
    ) -> Result<bool, ProvisionError> {
        let source = ioc_path
            .join(AUTOSAVE_DIR)
            .join(format!("{}_auto_settings.req", device.short_type_lower()));

        if !source.is_file() {
            tracing::info!(
                "Could not find supported auto_settings.req file for IOC {}",
                device.device_name
            );
            return Ok(false);
        }

        tracing::info!("Generating auto_settings.req file for IOC {}", device.device_name);
        let dest = ioc_path.join(AUTOSAVE_FILE);
        fs::rename(&source, &dest).map_err(|e| io_error(&source, e))?;
        Ok(true)
    }

    /// Move matching files from `dependancyFiles/` into the IOC root.
    pub fn place_dependency_files(
        &self,
        device: &DeviceRecord,
        ioc_path: &Utf8Path,
    ) -> Result<Vec<String>, ProvisionError> {
        let dependency_dir = ioc_path.join(DEPENDENCY_DIR);
        let short_type = device.short_type_lower();

        let moved: Vec<String> = sorted_file_names(&dependency_dir)?
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&short_type))
            .collect();

        for name in &moved {
            tracing::info!("Copying dependency file {} for {}", name, device.device_type);
            let source = dependency_dir.join(name);
            fs::rename(&source, ioc_path.join(name)).map_err(|e| io_error(&source, e))?;
        }

        Ok(moved)
    }

    /// Rewrite `unique.cmd`, keeping the previous version as `unique_OLD.cmd`.
    pub fn update_unique(
        &self,
        device: &DeviceRecord,
        ioc_path: &Utf8Path,
    ) -> Result<bool, ProvisionError> {
        let unique = ioc_path.join(UNIQUE_FILE);
        if !unique.is_file() {
            tracing::info!("No unique file found, proceeding to next step");
            return Ok(false);
        }

        tracing::info!("Updating unique file based on configuration");
        rewrite_in_place(&unique, &ioc_path.join(UNIQUE_BACKUP), |old| {
            rewrite_unique_settings(old, device, self.settings)
        })?;
        Ok(true)
    }

    /// Rewrite the procServ `config`, keeping the previous version as `config_OLD`.
    pub fn update_procserv_config(
        &self,
        device: &DeviceRecord,
        ioc_path: &Utf8Path,
    ) -> Result<bool, ProvisionError> {
        let config = ioc_path.join(PROCSERV_CONFIG);
        if !config.is_file() {
            tracing::info!("No config file found, moving to next step");
            return Ok(false);
        }

        tracing::info!("Updating config file for procServ connection");
        rewrite_in_place(&config, &ioc_path.join(PROCSERV_BACKUP), |old| {
            rewrite_procserv_config(old, device, &self.settings.hostname)
        })?;
        Ok(true)
    }

    /// Point `EPICS_BASE` at `$(SUPPORT)/../base`. Flat layouts need no change.
    pub fn fix_env_paths(&self, ioc_path: &Utf8Path) -> Result<bool, ProvisionError> {
        if self.settings.layout.is_flat() {
            return Ok(false);
        }

        let env_paths = ioc_path.join(ENV_PATHS_FILE);
        if !env_paths.is_file() {
            tracing::info!("No envPaths file found, base location left unchanged");
            return Ok(false);
        }

        tracing::info!("Fixing base location in envPaths");
        rewrite_in_place(&env_paths, &ioc_path.join(ENV_PATHS_BACKUP), rewrite_env_paths)?;
        Ok(true)
    }

    /// Run the template's cleanup script, then make `st.cmd` executable.
    ///
    /// A failing script is logged but does not fail the device.
    pub async fn cleanup(
        &self,
        device: &DeviceRecord,
        ioc_path: &Utf8Path,
    ) -> Result<bool, ProvisionError> {
        let script = ioc_path.join(cleanup_script_name());

        let ran = if script.is_file() {
            tracing::info!("Performing cleanup for {}", device.device_name);
            match run_process(cleanup_command(&script, ioc_path), "cleanup", self.cleanup_timeout)
                .await
            {
                Ok(outcome) if outcome.success() => {}
                Ok(outcome) => {
                    tracing::warn!("Cleanup for {} ended with {:?}", device.device_name, outcome)
                }
                Err(e) => tracing::warn!("Could not run {}: {}", script, e),
            }
            true
        } else {
            tracing::warn!("No cleanup script found, using outdated version of IOC template");
            false
        };

        make_executable(&ioc_path.join(STARTUP_SCRIPT))?;
        Ok(ran)
    }
}

fn cleanup_command(script: &Utf8Path, ioc_path: &Utf8Path) -> Command {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", script.as_str()]);
        c
    } else {
        let mut c = Command::new("bash");
        c.arg(script.as_str());
        c
    };
    command.current_dir(ioc_path);
    command
}

/// Move `path` to `backup`, then write the rewritten backup content to `path`.
fn rewrite_in_place<F>(path: &Utf8Path, backup: &Utf8Path, rewrite: F) -> Result<(), ProvisionError>
where
    F: FnOnce(&str) -> String,
{
    fs::rename(path, backup).map_err(|e| io_error(path, e))?;
    let old = fs::read_to_string(backup).map_err(|e| io_error(backup, e))?;
    fs::write(path, rewrite(&old)).map_err(|e| io_error(path, e))?;
    Ok(())
}

/// Sorted names of the regular files in `dir`; empty if `dir` does not exist.
fn sorted_file_names(dir: &Utf8Path) -> Result<Vec<String>, ProvisionError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in dir.read_dir_utf8().map_err(|e| io_error(dir, e))? {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn is_empty_dir(path: &Utf8Path) -> bool {
    path.read_dir_utf8()
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Utf8Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;

    if path.is_file() {
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| io_error(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Utf8Path) -> Result<(), ProvisionError> {
    Ok(())
}
