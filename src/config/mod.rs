pub mod document;

pub use document::{ConfigDocument, DeviceEntry};

use crate::models::{CONFIG_SCHEMA, DeployerSettings};
use crate::services::config_parser::{ParsedConfig, parse_config};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt::Write as _;
use std::fs;

pub const DEFAULT_CONFIG_FILE: &str = "CONFIGURE.txt";
pub const DEFAULT_SETTINGS_FILE: &str = "initiocs.yaml";

/// Configuration manager for the CONFIGURE file and the tool settings.
///
/// Manages two files:
/// - `CONFIGURE.txt`: global deployment settings and one line per IOC
/// - `initiocs.yaml`: template source and subprocess timeouts
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager for the given files. Neither has to exist yet.
    pub fn new<P: AsRef<Utf8Path>, Q: AsRef<Utf8Path>>(config_path: P, settings_path: Q) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            settings_path: settings_path.as_ref().to_path_buf(),
        }
    }

    /// Load and parse the CONFIGURE file.
    pub fn load_config(&self) -> Result<ParsedConfig> {
        let text = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read configuration: {}", self.config_path))?;

        let parsed = parse_config(&text)
            .with_context(|| format!("Failed to parse configuration: {}", self.config_path))?;

        tracing::info!(
            "Loaded configuration from {} ({} IOCs)",
            self.config_path,
            parsed.devices.len()
        );
        Ok(parsed)
    }

    /// Load the CONFIGURE file for editing.
    pub fn load_document(&self) -> Result<ConfigDocument> {
        let text = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read configuration: {}", self.config_path))?;
        Ok(ConfigDocument::parse(&text))
    }

    /// Save an edited CONFIGURE file. The document must still parse.
    pub fn save_document(&self, document: &ConfigDocument) -> Result<()> {
        document
            .parsed()
            .context("Refusing to save a configuration that does not parse")?;

        fs::write(&self.config_path, document.to_string())
            .with_context(|| format!("Failed to write configuration: {}", self.config_path))?;

        tracing::info!("Saved configuration to {}", self.config_path);
        Ok(())
    }

    /// Write a documented CONFIGURE file with default values.
    pub fn create_default_config(&self) -> Result<()> {
        if self.config_path.exists() {
            bail!("Configuration {} already exists", self.config_path);
        }

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent))?;
            }
        }

        fs::write(&self.config_path, default_config_text())
            .with_context(|| format!("Failed to write configuration: {}", self.config_path))?;

        tracing::info!("Wrote default configuration to {}", self.config_path);
        Ok(())
    }

    /// Load the tool settings.
    ///
    /// # Returns
    /// The loaded DeployerSettings, or defaults if the file doesn't exist
    pub fn load_settings(&self) -> Result<DeployerSettings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            return Ok(DeployerSettings::default());
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: DeployerSettings = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save the tool settings.
    pub fn save_settings(&self, settings: &DeployerSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

/// Text of a fresh CONFIGURE file built from [`CONFIG_SCHEMA`].
pub fn default_config_text() -> String {
    let mut text = String::new();

    text.push_str("# initiocs deployment configuration\n");
    text.push_str("#\n");
    text.push_str("# Global settings are KEY=value lines. Every other line that is not a\n");
    text.push_str("# comment describes one IOC.\n\n");
    text.push_str("#------------MAIN CONFIGURATION------------\n");

    for field in CONFIG_SCHEMA {
        let _ = writeln!(text, "# {}: {}", field.label, field.help);
        let _ = writeln!(text, "{}={}", field.key, field.default);
        text.push('\n');
    }

    text.push_str("#------------IOC DEFINITIONS------------\n");
    text.push_str("# One IOC per line: driver type, IOC name, procServ port, connection\n");
    text.push_str("# IOC Type        IOC Name        Port    Connection\n");
    text.push_str("# ADProsilica     cam-ps1         4000    192.168.1.10\n");

    text
}
