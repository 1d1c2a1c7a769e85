//! Parser for the line-oriented CONFIGURE file.
//!
//! ```text
//! # comment
//! IOC_DIR=/epics/iocs
//! BINARIES_FLAT=NO
//! ADProsilica   cam-ps1   4000   10.0.0.5
//! ```
//!
//! Every non-blank line is exactly one of: a comment, the binary layout toggle,
//! a `KEY=value` global setting, or a four-token device line.

use crate::models::config::BINARIES_FLAT_KEY;
use crate::models::device::DEVICE_TYPE_PREFIX_LEN;
use crate::models::{BinaryLayout, ConfigError, DeploymentSettings, DeviceRecord, GlobalConfig};
use camino::Utf8Path;
use std::fs;

/// Number of whitespace-separated tokens on a device line
pub const DEVICE_LINE_FIELDS: usize = 4;

/// What a single configuration line means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Comment,
    Layout(BinaryLayout),
    Setting { key: &'a str, value: &'a str },
    Device(Vec<&'a str>),
}

/// Classify one line without validating it.
pub fn classify_line(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with('#') {
        return LineKind::Comment;
    }
    if trimmed.contains(BINARIES_FLAT_KEY) {
        return LineKind::Layout(BinaryLayout::from_toggle(trimmed));
    }
    if let Some((key, value)) = trimmed.split_once('=') {
        return LineKind::Setting {
            key: key.trim(),
            value: value.trim(),
        };
    }

    LineKind::Device(trimmed.split_whitespace().collect())
}

/// Everything read from a CONFIGURE file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedConfig {
    pub devices: Vec<DeviceRecord>,
    pub globals: GlobalConfig,
    pub layout: BinaryLayout,
}

impl ParsedConfig {
    /// Validate the globals into the settings the provisioner consumes.
    pub fn settings(&self) -> Result<DeploymentSettings, ConfigError> {
        DeploymentSettings::from_config(&self.globals, self.layout)
    }
}

/// Parse configuration text.
///
/// Device lines must hold exactly four tokens and a device type longer than
/// the driver-family prefix; anything else is reported with its 1-based line
/// number.
pub fn parse_config(text: &str) -> Result<ParsedConfig, ConfigError> {
    let mut parsed = ParsedConfig::default();

    for (index, line) in text.lines().enumerate() {
        match classify_line(line) {
            LineKind::Blank | LineKind::Comment => {}
            // A toggle line can only move the layout away from the flat default
            LineKind::Layout(BinaryLayout::Nested) => {
                tracing::debug!("Nested binary layout selected on line {}", index + 1);
                parsed.layout = BinaryLayout::Nested;
            }
            LineKind::Layout(BinaryLayout::Flat) => {}
            LineKind::Setting { key, value } => {
                parsed.globals.insert(key, value);
            }
            LineKind::Device(tokens) => {
                let record = device_from_tokens(&tokens, index + 1, parsed.devices.len() + 1)?;
                parsed.devices.push(record);
            }
        }
    }

    tracing::debug!(
        "Parsed {} global settings and {} devices",
        parsed.globals.len(),
        parsed.devices.len()
    );

    Ok(parsed)
}

/// Read and parse a configuration file.
pub fn parse_config_file(path: &Utf8Path) -> Result<ParsedConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    parse_config(&text)
}

fn device_from_tokens(
    tokens: &[&str],
    line: usize,
    sequence_number: usize,
) -> Result<DeviceRecord, ConfigError> {
    if tokens.len() != DEVICE_LINE_FIELDS {
        return Err(ConfigError::MalformedDeviceLine {
            line,
            reason: format!(
                "expected {} fields (type, name, port, connection), found {}",
                DEVICE_LINE_FIELDS,
                tokens.len()
            ),
        });
    }

    if tokens[0].chars().count() <= DEVICE_TYPE_PREFIX_LEN {
        return Err(ConfigError::MalformedDeviceLine {
            line,
            reason: format!("device type '{}' is too short", tokens[0]),
        });
    }

    Ok(DeviceRecord::new(
        tokens[0],
        tokens[1],
        tokens[2],
        tokens[3],
        sequence_number,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# initiocs configuration
IOC_DIR=/tmp/iocs
TOP_BINARY_DIR=/epics/deploy
BINARIES_FLAT=YES
PREFIX=XF:10ID

# IOC Type      IOC Name    Port    Connection
ADProsilica     cam-ps1     4000    10.0.0.5
ADUVC    cam-uvc1   4001      25344
";

    #[test]
    fn test_classify_lines() {
        assert_eq!(classify_line("   "), LineKind::Blank);
        assert_eq!(classify_line("# IOC_DIR=/x"), LineKind::Comment);
        assert_eq!(classify_line("BINARIES_FLAT=NO"), LineKind::Layout(BinaryLayout::Nested));
        assert_eq!(
            classify_line("IOC_DIR = /epics/iocs "),
            LineKind::Setting {
                key: "IOC_DIR",
                value: "/epics/iocs"
            }
        );
        assert_eq!(
            classify_line("ADSimDetector  sim1  4000  none"),
            LineKind::Device(vec!["ADSimDetector", "sim1", "4000", "none"])
        );
    }

    #[test]
    fn test_setting_splits_on_first_equals() {
        assert_eq!(
            classify_line("PREFIX=XF:10ID{a=b}"),
            LineKind::Setting {
                key: "PREFIX",
                value: "XF:10ID{a=b}"
            }
        );
    }

    #[test]
    fn test_parse_sample() {
        let parsed = parse_config(SAMPLE).unwrap();

        assert_eq!(parsed.layout, BinaryLayout::Flat);
        assert_eq!(parsed.globals.get("IOC_DIR"), Some("/tmp/iocs"));
        assert_eq!(parsed.globals.get("PREFIX"), Some("XF:10ID"));
        assert_eq!(parsed.globals.len(), 3);

        assert_eq!(parsed.devices.len(), 2);
        assert_eq!(
            parsed.devices[0],
            DeviceRecord::new("ADProsilica", "cam-ps1", "4000", "10.0.0.5", 1)
        );
        assert_eq!(parsed.devices[1].device_name, "cam-uvc1");
        assert_eq!(parsed.devices[1].sequence_number, 2);
    }

    #[test]
    fn test_layout_no_switches_to_nested() {
        let parsed = parse_config("BINARIES_FLAT=NO\n").unwrap();
        assert_eq!(parsed.layout, BinaryLayout::Nested);
        assert!(parsed.globals.get(BINARIES_FLAT_KEY).is_none());
    }

    #[test]
    fn test_non_ascii_device_type_keeps_short_type() {
        let parsed = parse_config("€xy  cam1  4000  none\n").unwrap();
        assert_eq!(parsed.devices[0].short_type(), "y");
        assert!(!parsed.devices[0].short_type_lower().is_empty());
    }

    #[test]
    fn test_later_yes_does_not_undo_no() {
        let parsed = parse_config("BINARIES_FLAT=NO\nBINARIES_FLAT=YES\n").unwrap();
        assert_eq!(parsed.layout, BinaryLayout::Nested);

        let parsed = parse_config("BINARIES_FLAT=YES\nBINARIES_FLAT=NO\n").unwrap();
        assert_eq!(parsed.layout, BinaryLayout::Nested);
    }

    #[test]
    fn test_commented_layout_line_is_ignored() {
        let parsed = parse_config("# set BINARIES_FLAT to NO for support/ layouts\n").unwrap();
        assert_eq!(parsed.layout, BinaryLayout::Flat);
    }

    #[test]
    fn test_short_device_line_is_rejected() {
        let err = parse_config("IOC_DIR=/x\nADProsilica cam1 4000\n").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedDeviceLine { line: 2, .. }));
    }

    #[test]
    fn test_prefix_only_device_type_is_rejected() {
        let err = parse_config("AD cam1 4000 10.0.0.1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedDeviceLine { line: 1, .. }));
    }

    #[test]
    fn test_missing_key_surfaces_from_settings() {
        let parsed = parse_config(SAMPLE).unwrap();
        let err = parsed.settings().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "ENGINEER"));
    }
}
