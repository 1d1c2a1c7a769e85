use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const IOC_DIR_KEY: &str = "IOC_DIR";
pub const TOP_BINARY_DIR_KEY: &str = "TOP_BINARY_DIR";
pub const BINARIES_FLAT_KEY: &str = "BINARIES_FLAT";
pub const PREFIX_KEY: &str = "PREFIX";
pub const ENGINEER_KEY: &str = "ENGINEER";
pub const HOSTNAME_KEY: &str = "HOSTNAME";
pub const CA_ADDRESS_KEY: &str = "CA_ADDRESS";

/// Template repository cloned for every IOC unless overridden.
pub const DEFAULT_TEMPLATE_URL: &str = "https://github.com/epicsNSLS2-deploy/ioc-template";

/// Errors raised while reading, validating or editing the deployment configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required configuration key {0} is missing")]
    MissingKey(String),

    #[error("IOC_DIR is empty, no output directory to deploy into")]
    EmptyOutputRoot,

    #[error("Malformed device line {line}: {reason}")]
    MalformedDeviceLine { line: usize, reason: String },

    #[error("Invalid device entry: {0}")]
    InvalidDeviceEntry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where compiled driver binaries live relative to the distribution root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BinaryLayout {
    /// `<root>/areaDetector/...`
    #[default]
    Flat,
    /// `<root>/support/areaDetector/...`
    Nested,
}

impl BinaryLayout {
    /// Interpret a `BINARIES_FLAT` line. Only an explicit `NO` switches to nested.
    pub fn from_toggle(line: &str) -> Self {
        if line.contains("NO") {
            BinaryLayout::Nested
        } else {
            BinaryLayout::Flat
        }
    }

    pub fn is_flat(self) -> bool {
        self == BinaryLayout::Flat
    }

    /// Value written back to the configuration file.
    pub fn as_toggle(self) -> &'static str {
        match self {
            BinaryLayout::Flat => "YES",
            BinaryLayout::Nested => "NO",
        }
    }

    /// Directory that holds `areaDetector` for this layout.
    pub fn support_root(self, root: &Utf8Path) -> Utf8PathBuf {
        match self {
            BinaryLayout::Flat => root.to_path_buf(),
            BinaryLayout::Nested => root.join("support"),
        }
    }
}

/// Global `KEY=value` settings in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    values: IndexMap<String, String>,
}

impl GlobalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value; an overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Typed, validated view of the global configuration used by the provisioner.
///
/// Building it is the point where a missing key or an empty `IOC_DIR` becomes
/// fatal, before any device is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSettings {
    pub ioc_dir: Utf8PathBuf,
    pub binary_root: Utf8PathBuf,
    pub layout: BinaryLayout,
    pub prefix: String,
    pub engineer: String,
    pub hostname: String,
    pub ca_address: String,
}

impl DeploymentSettings {
    pub fn from_config(globals: &GlobalConfig, layout: BinaryLayout) -> Result<Self, ConfigError> {
        let ioc_dir = globals.require(IOC_DIR_KEY)?;
        if ioc_dir.trim().is_empty() {
            return Err(ConfigError::EmptyOutputRoot);
        }

        Ok(Self {
            ioc_dir: Utf8PathBuf::from(ioc_dir),
            binary_root: Utf8PathBuf::from(globals.require(TOP_BINARY_DIR_KEY)?),
            layout,
            prefix: globals.require(PREFIX_KEY)?.to_string(),
            engineer: globals.require(ENGINEER_KEY)?.to_string(),
            hostname: globals.require(HOSTNAME_KEY)?.to_string(),
            ca_address: globals.require(CA_ADDRESS_KEY)?.to_string(),
        })
    }

    /// Value of `SUPPORT_DIR` in generated unique files.
    pub fn support_dir(&self) -> String {
        match self.layout {
            BinaryLayout::Flat => self.binary_root.to_string(),
            BinaryLayout::Nested => format!("{}/support", self.binary_root),
        }
    }

    /// Destination directory of a single IOC.
    pub fn ioc_path(&self, device_name: &str) -> Utf8PathBuf {
        self.ioc_dir.join(device_name)
    }
}

/// One user-editable global setting: what it is called, what it starts as,
/// and what to tell the operator about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigField {
    pub key: &'static str,
    pub label: &'static str,
    pub default: &'static str,
    pub help: &'static str,
}

/// Every global setting in the order it appears in a generated configuration.
pub const CONFIG_SCHEMA: &[ConfigField] = &[
    ConfigField {
        key: IOC_DIR_KEY,
        label: "IOC output directory",
        default: "/epics/iocs",
        help: "Directory into which every generated IOC is cloned",
    },
    ConfigField {
        key: TOP_BINARY_DIR_KEY,
        label: "Binary distribution root",
        default: "/epics/src/deploy",
        help: "Top of the compiled EPICS/areaDetector binary distribution",
    },
    ConfigField {
        key: BINARIES_FLAT_KEY,
        label: "Flat binary layout",
        default: "YES",
        help: "YES if areaDetector sits directly under the binary root, NO if it sits under support/",
    },
    ConfigField {
        key: PREFIX_KEY,
        label: "PV prefix",
        default: "XF:10IDC-BI",
        help: "Beamline prefix; each camera becomes <prefix>{<type>-Cam:<n>}",
    },
    ConfigField {
        key: ENGINEER_KEY,
        label: "Engineer",
        default: "",
        help: "Name of the engineer deploying these IOCs",
    },
    ConfigField {
        key: HOSTNAME_KEY,
        label: "Host name",
        default: "localhost",
        help: "Machine the IOCs will run on",
    },
    ConfigField {
        key: CA_ADDRESS_KEY,
        label: "Channel Access address list",
        default: "127.0.0.255",
        help: "Value of EPICS_CA_ADDR_LIST for every IOC",
    },
];

/// Look up the schema entry for a global key.
pub fn schema_field(key: &str) -> Option<&'static ConfigField> {
    CONFIG_SCHEMA.iter().find(|field| field.key == key)
}

/// Tool settings from `initiocs.yaml`, separate from the CONFIGURE file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployerSettings {
    /// Git URL or local directory holding the IOC template
    #[serde(rename = "Template Source", default = "default_template_source")]
    pub template_source: String,

    /// Seconds before a clone is abandoned, 0 waits forever
    #[serde(rename = "Clone Timeout", default = "default_clone_timeout")]
    pub clone_timeout: u64,

    /// Seconds before a cleanup script is abandoned, 0 waits forever
    #[serde(rename = "Cleanup Timeout", default = "default_cleanup_timeout")]
    pub cleanup_timeout: u64,
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            template_source: default_template_source(),
            clone_timeout: default_clone_timeout(),
            cleanup_timeout: default_cleanup_timeout(),
        }
    }
}

fn default_template_source() -> String {
    DEFAULT_TEMPLATE_URL.to_string()
}

fn default_clone_timeout() -> u64 {
    300
}

fn default_cleanup_timeout() -> u64 {
    120
}

impl DeployerSettings {
    pub fn template(&self) -> TemplateSource {
        TemplateSource::parse(&self.template_source)
    }

    pub fn clone_timeout(&self) -> Option<Duration> {
        seconds(self.clone_timeout)
    }

    pub fn cleanup_timeout(&self) -> Option<Duration> {
        seconds(self.cleanup_timeout)
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Where the per-IOC template comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Cloned with `git clone`
    Git(String),
    /// Copied recursively from a directory on disk
    Local(Utf8PathBuf),
}

impl TemplateSource {
    /// URLs and scp-style remotes are cloned; an existing directory is copied.
    pub fn parse(source: &str) -> Self {
        let looks_remote = source.contains("://") || source.starts_with("git@");
        let path = Utf8Path::new(source);
        if !looks_remote && path.is_dir() {
            TemplateSource::Local(path.to_path_buf())
        } else {
            TemplateSource::Git(source.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_globals() -> GlobalConfig {
        let mut globals = GlobalConfig::new();
        globals.insert(IOC_DIR_KEY, "/tmp/iocs");
        globals.insert(TOP_BINARY_DIR_KEY, "/epics/deploy");
        globals.insert(PREFIX_KEY, "XF:10ID");
        globals.insert(ENGINEER_KEY, "J. Wlodek");
        globals.insert(HOSTNAME_KEY, "xf10id-ioc1");
        globals.insert(CA_ADDRESS_KEY, "10.0.0.255");
        globals
    }

    #[test]
    fn test_layout_toggle() {
        assert_eq!(BinaryLayout::from_toggle("BINARIES_FLAT=NO"), BinaryLayout::Nested);
        assert_eq!(BinaryLayout::from_toggle("BINARIES_FLAT=YES"), BinaryLayout::Flat);
        assert_eq!(BinaryLayout::from_toggle("BINARIES_FLAT=maybe"), BinaryLayout::Flat);
        assert_eq!(BinaryLayout::default(), BinaryLayout::Flat);
    }

    #[test]
    fn test_support_dir_follows_layout() {
        let globals = complete_globals();
        let flat = DeploymentSettings::from_config(&globals, BinaryLayout::Flat).unwrap();
        assert_eq!(flat.support_dir(), "/epics/deploy");

        let nested = DeploymentSettings::from_config(&globals, BinaryLayout::Nested).unwrap();
        assert_eq!(nested.support_dir(), "/epics/deploy/support");
    }

    #[test]
    fn test_missing_key_is_reported() {
        let mut globals = complete_globals();
        globals.values.shift_remove(HOSTNAME_KEY);

        let err = DeploymentSettings::from_config(&globals, BinaryLayout::Flat).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == HOSTNAME_KEY));
    }

    #[test]
    fn test_empty_ioc_dir_is_fatal() {
        let mut globals = complete_globals();
        globals.insert(IOC_DIR_KEY, "  ");

        let err = DeploymentSettings::from_config(&globals, BinaryLayout::Flat).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyOutputRoot));
    }

    #[test]
    fn test_overwritten_key_keeps_position() {
        let mut globals = complete_globals();
        globals.insert(IOC_DIR_KEY, "/other");
        assert_eq!(globals.iter().next(), Some((IOC_DIR_KEY, "/other")));
        assert_eq!(globals.len(), 6);
    }

    #[test]
    fn test_schema_covers_consumed_keys() {
        for key in [
            IOC_DIR_KEY,
            TOP_BINARY_DIR_KEY,
            BINARIES_FLAT_KEY,
            PREFIX_KEY,
            ENGINEER_KEY,
            HOSTNAME_KEY,
            CA_ADDRESS_KEY,
        ] {
            assert!(schema_field(key).is_some(), "no schema entry for {}", key);
        }
    }

    #[test]
    fn test_deployer_settings_defaults() {
        let settings = DeployerSettings::default();
        assert_eq!(settings.template(), TemplateSource::Git(DEFAULT_TEMPLATE_URL.to_string()));
        assert_eq!(settings.clone_timeout(), Some(Duration::from_secs(300)));

        let unbounded = DeployerSettings {
            cleanup_timeout: 0,
            ..DeployerSettings::default()
        };
        assert_eq!(unbounded.cleanup_timeout(), None);
    }

    #[test]
    fn test_template_source_local_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        assert_eq!(TemplateSource::parse(path.as_str()), TemplateSource::Local(path.clone()));
        assert!(matches!(
            TemplateSource::parse("git@github.com:org/ioc-template.git"),
            TemplateSource::Git(_)
        ));
    }
}
