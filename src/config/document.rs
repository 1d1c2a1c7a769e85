use crate::models::config::BINARIES_FLAT_KEY;
use crate::models::device::DEVICE_TYPE_PREFIX_LEN;
use crate::models::{BinaryLayout, ConfigError};
use crate::services::config_parser::{LineKind, ParsedConfig, classify_line, parse_config};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// `KEY=value` with the key, separator spacing and value captured separately
static SETTING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<lead>\s*(?P<key>[^#=\s][^=]*?)\s*=\s*)(?P<value>.*?)\s*$")
        .expect("Invalid setting line regex")
});

/// Editable CONFIGURE file.
///
/// Keeps every line, comments and spacing included, so an edit touches only
/// the line it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            trailing_newline: text.ends_with('\n'),
        }
    }

    /// Parse the document the same way a deployment run will.
    pub fn parsed(&self) -> Result<ParsedConfig, ConfigError> {
        parse_config(&self.to_string())
    }

    /// Effective value of a global setting (the last definition wins).
    pub fn value(&self, key: &str) -> Option<&str> {
        if key == BINARIES_FLAT_KEY {
            return self
                .layout_indices()
                .next()
                .map(|_| self.layout().as_toggle());
        }

        let index = self.setting_index(key)?;
        match classify_line(&self.lines[index]) {
            LineKind::Setting { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Binary layout the document currently selects: nested if any toggle
    /// line says so.
    pub fn layout(&self) -> BinaryLayout {
        let nested = self.layout_indices().any(|index| {
            matches!(
                classify_line(&self.lines[index]),
                LineKind::Layout(BinaryLayout::Nested)
            )
        });
        if nested {
            BinaryLayout::Nested
        } else {
            BinaryLayout::Flat
        }
    }

    /// Set a global value, editing its line in place or adding one after the
    /// last global setting.
    ///
    /// Every uncommented layout toggle line is rewritten.
    pub fn set_value(&mut self, key: &str, value: &str) {
        let targets: Vec<usize> = if key == BINARIES_FLAT_KEY {
            self.layout_indices().collect()
        } else {
            self.setting_index(key).into_iter().collect()
        };

        if !targets.is_empty() {
            for index in targets {
                let updated = match SETTING_LINE.captures(&self.lines[index]) {
                    Some(caps) => format!("{}{}", &caps["lead"], value),
                    None => format!("{}={}", key, value),
                };
                self.lines[index] = updated;
            }
            return;
        }

        let insert_at = self
            .lines
            .iter()
            .rposition(|line| {
                matches!(
                    classify_line(line),
                    LineKind::Setting { .. } | LineKind::Layout(_)
                )
            })
            .map(|index| index + 1)
            .or_else(|| {
                self.lines
                    .iter()
                    .position(|line| matches!(classify_line(line), LineKind::Device(_)))
            })
            .unwrap_or(self.lines.len());

        self.lines.insert(insert_at, format!("{}={}", key, value));
    }

    /// Append a device line after the last existing one.
    pub fn add_device(&mut self, entry: &DeviceEntry) {
        let insert_at = self
            .lines
            .iter()
            .rposition(|line| matches!(classify_line(line), LineKind::Device(_)))
            .map(|index| index + 1)
            .unwrap_or(self.lines.len());

        self.lines.insert(insert_at, entry.to_line());
    }

    fn setting_index(&self, key: &str) -> Option<usize> {
        self.lines.iter().rposition(|line| {
            matches!(classify_line(line), LineKind::Setting { key: found, .. } if found == key)
        })
    }

    fn layout_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| matches!(classify_line(line), LineKind::Layout(_)))
            .map(|(index, _)| index)
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))?;
        if self.trailing_newline {
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// A device line to add to the configuration, validated so that it parses
/// back as exactly one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub device_type: String,
    pub device_name: String,
    pub control_port: String,
    pub connection: String,
}

impl DeviceEntry {
    pub fn new(
        device_type: &str,
        device_name: &str,
        control_port: &str,
        connection: &str,
    ) -> Result<Self, ConfigError> {
        let fields = [
            ("IOC type", device_type),
            ("IOC name", device_name),
            ("IOC port", control_port),
            ("connection", connection),
        ];

        for (label, value) in fields {
            let invalid = |reason: &str| ConfigError::InvalidDeviceEntry(format!("{} {}", label, reason));
            if value.is_empty() {
                return Err(invalid("must be filled in"));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(invalid("must not contain whitespace"));
            }
            if value.contains('=') || value.contains(BINARIES_FLAT_KEY) {
                return Err(invalid("would be read as a global setting"));
            }
        }

        if device_type.starts_with('#') {
            return Err(ConfigError::InvalidDeviceEntry(
                "IOC type would be read as a comment".to_string(),
            ));
        }
        if device_type.chars().count() <= DEVICE_TYPE_PREFIX_LEN {
            return Err(ConfigError::InvalidDeviceEntry(format!(
                "IOC type '{}' is too short",
                device_type
            )));
        }
        if control_port.parse::<u16>().is_err() {
            return Err(ConfigError::InvalidDeviceEntry(format!(
                "IOC port '{}' is not a port number",
                control_port
            )));
        }

        Ok(Self {
            device_type: device_type.to_string(),
            device_name: device_name.to_string(),
            control_port: control_port.to_string(),
            connection: connection.to_string(),
        })
    }

    /// Column-aligned device line.
    pub fn to_line(&self) -> String {
        format!(
            "{:<15} {:<15} {:<7} {}",
            self.device_type, self.device_name, self.control_port, self.connection
        )
    }
}
