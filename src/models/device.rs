use std::fmt;

/// Number of leading characters of a device type that name the driver family
/// (`AD` in `ADProsilica`). The remainder is the short type.
pub const DEVICE_TYPE_PREFIX_LEN: usize = 2;

/// One device line of the configuration file: a single IOC to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// areaDetector driver name, e.g. `ADProsilica`
    pub device_type: String,

    /// IOC instance name, also the destination directory name
    pub device_name: String,

    /// Port the process server exposes the IOC console on
    pub control_port: String,

    /// IP address, serial number or whatever the driver connects with
    pub connection_string: String,

    /// 1-based position among device lines in file order
    pub sequence_number: usize,
}

impl DeviceRecord {
    pub fn new(
        device_type: impl Into<String>,
        device_name: impl Into<String>,
        control_port: impl Into<String>,
        connection_string: impl Into<String>,
        sequence_number: usize,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            device_name: device_name.into(),
            control_port: control_port.into(),
            connection_string: connection_string.into(),
            sequence_number,
        }
    }

    /// Device type with the driver-family prefix stripped (`Prosilica`).
    pub fn short_type(&self) -> &str {
        self.device_type
            .char_indices()
            .nth(DEVICE_TYPE_PREFIX_LEN)
            .map_or("", |(start, _)| &self.device_type[start..])
    }

    /// Lowercase short type, used to match startup scripts and support files.
    pub fn short_type_lower(&self) -> String {
        self.short_type().to_lowercase()
    }

    /// PV prefix for this camera: `<prefix>{<short>-Cam:<seq>}`.
    pub fn pv_prefix(&self, prefix: &str) -> String {
        format!(
            "{}{{{}-Cam:{}}}",
            prefix,
            self.short_type(),
            self.sequence_number
        )
    }

    /// Name of the IOC executable target, `ioc<device_type>`.
    pub fn ioc_target(&self) -> String {
        format!("ioc{}", self.device_type)
    }

    /// asyn port name used by the driver, `<short>1`.
    pub fn asyn_port(&self) -> String {
        format!("{}1", self.short_type())
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}) port={} connection={}",
            self.sequence_number,
            self.device_name,
            self.device_type,
            self.control_port,
            self.connection_string
        )
    }
}
