//! Line rewriters for the files of a cloned IOC template.
//!
//! All functions here are pure: they take the old file content and return the
//! new content. Lines that are not replaced are copied byte-for-byte, including
//! their line endings. Replaced lines always end in `\n`.

use crate::models::{DeploymentSettings, DeviceRecord};
use crate::services::binary_locator::LocateError;
use camino::Utf8PathBuf;

/// Replacement for the envPaths include of a template startup script
pub const ENV_PATHS_DIRECTIVE: &str = "< envPaths";

/// `EPICS_BASE` location for support-nested binary distributions
pub const NESTED_EPICS_BASE: &str = "$(SUPPORT)/../base";

/// `epicsEnvSet("<key>", "<value>")`
pub fn env_set(key: &str, value: &str) -> String {
    format!("epicsEnvSet(\"{}\", \"{}\")", key, value)
}

fn rewrite_lines<F>(content: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut output = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        match replace(line) {
            Some(new_line) => {
                output.push_str(&new_line);
                output.push('\n');
            }
            None => output.push_str(line),
        }
    }
    output
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Turn a template startup script into the IOC's `st.cmd`.
///
/// The shebang line points at the resolved IOC binary and any envPaths include
/// becomes [`ENV_PATHS_DIRECTIVE`]. `resolve_binary` is only called if the
/// template has a shebang, and at most once.
pub fn render_startup_script<F>(template: &str, mut resolve_binary: F) -> Result<String, LocateError>
where
    F: FnMut() -> Result<Utf8PathBuf, LocateError>,
{
    let mut binary: Option<Utf8PathBuf> = None;
    let mut failure: Option<LocateError> = None;

    let output = rewrite_lines(template, |line| {
        if line.trim_start().starts_with("#!") {
            if binary.is_none() && failure.is_none() {
                match resolve_binary() {
                    Ok(path) => binary = Some(path),
                    Err(e) => failure = Some(e),
                }
            }
            binary.as_ref().map(|path| format!("#!{}", path))
        } else if line.contains("envPaths") {
            Some(ENV_PATHS_DIRECTIVE.to_string())
        } else {
            None
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(output),
    }
}

/// Rewrite `unique.cmd` with this device's settings.
///
/// Matching is by substring on non-comment lines, first rule wins:
/// `SUPPORT_DIR`, `ENGINEER`, `CAM-CONNECT`, `HOSTNAME`, `PREFIX`, `CTPREFIX`,
/// `IOCNAME`, `EPICS_CA_ADDR_LIST`, `IOC`, `PORT`.
pub fn rewrite_unique_settings(
    content: &str,
    device: &DeviceRecord,
    settings: &DeploymentSettings,
) -> String {
    rewrite_lines(content, |line| {
        if is_comment(line) {
            return None;
        }
        unique_setting(line, device, settings).map(|(key, value)| env_set(key, &value))
    })
}

fn unique_setting(
    line: &str,
    device: &DeviceRecord,
    settings: &DeploymentSettings,
) -> Option<(&'static str, String)> {
    let setting = if line.contains("SUPPORT_DIR") {
        ("SUPPORT_DIR", settings.support_dir())
    } else if line.contains("ENGINEER") {
        ("ENGINEER", settings.engineer.clone())
    } else if line.contains("CAM-CONNECT") {
        ("CAM-CONNECT", device.connection_string.clone())
    } else if line.contains("HOSTNAME") {
        ("HOSTNAME", settings.hostname.clone())
    } else if line.contains("PREFIX") && !line.contains("CTPREFIX") {
        ("PREFIX", device.pv_prefix(&settings.prefix))
    } else if line.contains("CTPREFIX") {
        ("CTPREFIX", device.pv_prefix(&settings.prefix))
    } else if line.contains("IOCNAME") {
        ("IOCNAME", device.device_name.clone())
    } else if line.contains("EPICS_CA_ADDR_LIST") {
        ("EPICS_CA_ADDR_LIST", settings.ca_address.clone())
    } else if line.contains("IOC") {
        ("IOC", device.ioc_target())
    } else if line.contains("PORT") {
        ("PORT", device.asyn_port())
    } else {
        return None;
    };
    Some(setting)
}

/// Rewrite the procServ `config` file: `NAME`, `PORT` and `HOST` lines.
pub fn rewrite_procserv_config(content: &str, device: &DeviceRecord, hostname: &str) -> String {
    rewrite_lines(content, |line| {
        if line.contains("NAME") {
            Some(format!("NAME={}", device.device_name))
        } else if line.contains("PORT") {
            Some(format!("PORT={}", device.control_port))
        } else if line.contains("HOST") {
            Some(format!("HOST={}", hostname))
        } else {
            None
        }
    })
}

/// Point `EPICS_BASE` in `envPaths` at the base shipped next to `support/`.
pub fn rewrite_env_paths(content: &str) -> String {
    rewrite_lines(content, |line| {
        line.contains("EPICS_BASE")
            .then(|| env_set("EPICS_BASE", NESTED_EPICS_BASE))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BinaryLayout;

    fn device() -> DeviceRecord {
        DeviceRecord::new("ADProsilica", "cam-ps1", "4000", "10.0.0.5", 2)
    }

    fn settings(layout: BinaryLayout) -> DeploymentSettings {
        DeploymentSettings {
            ioc_dir: Utf8PathBuf::from("/tmp/iocs"),
            binary_root: Utf8PathBuf::from("/epics/deploy"),
            layout,
            prefix: "XF:10ID".to_string(),
            engineer: "J. Wlodek".to_string(),
            hostname: "xf10id-ioc1".to_string(),
            ca_address: "10.0.0.255".to_string(),
        }
    }

    const UNIQUE: &str = "\
# unique settings
epicsEnvSet(\"SUPPORT_DIR\", \"/old\")
epicsEnvSet(\"ENGINEER\", \"nobody\")
epicsEnvSet(\"CAM-CONNECT\", \"0.0.0.0\")
epicsEnvSet(\"HOSTNAME\", \"old\")
epicsEnvSet(\"PREFIX\", \"old\")
epicsEnvSet(\"CTPREFIX\", \"old\")
epicsEnvSet(\"IOCNAME\", \"old\")
epicsEnvSet(\"EPICS_CA_ADDR_LIST\", \"old\")
epicsEnvSet(\"IOC\", \"old\")
epicsEnvSet(\"PORT\", \"old\")
epicsEnvSet(\"QSIZE\", \"20\")
# PORT stays a comment
";

    #[test]
    fn test_startup_script_substitutions() {
        let template = "#!../../bin/linux-x86_64/prosilicaApp\n< envPaths.linux\nerrlogInit(20000)\r\n";
        let rendered = render_startup_script(template, || {
            Ok(Utf8PathBuf::from("/epics/bin/prosilicaApp"))
        })
        .unwrap();

        assert_eq!(
            rendered,
            "#!/epics/bin/prosilicaApp\n< envPaths\nerrlogInit(20000)\r\n"
        );
    }

    #[test]
    fn test_startup_script_without_shebang_skips_resolution() {
        let rendered = render_startup_script("dbLoadDatabase(\"x.dbd\")\n", || {
            panic!("binary must not be resolved")
        })
        .unwrap();
        assert_eq!(rendered, "dbLoadDatabase(\"x.dbd\")\n");
    }

    #[test]
    fn test_startup_script_resolution_failure() {
        let result = render_startup_script("#!/old\n", || {
            Err(LocateError::BinaryNotFound {
                dir: Utf8PathBuf::from("/x"),
                what: "App executable",
            })
        });
        assert!(matches!(result, Err(LocateError::BinaryNotFound { .. })));
    }

    #[test]
    fn test_unique_rewrite() {
        let rewritten = rewrite_unique_settings(UNIQUE, &device(), &settings(BinaryLayout::Flat));
        let lines: Vec<&str> = rewritten.lines().collect();

        assert_eq!(lines[0], "# unique settings");
        assert_eq!(lines[1], env_set("SUPPORT_DIR", "/epics/deploy"));
        assert_eq!(lines[2], env_set("ENGINEER", "J. Wlodek"));
        assert_eq!(lines[3], env_set("CAM-CONNECT", "10.0.0.5"));
        assert_eq!(lines[4], env_set("HOSTNAME", "xf10id-ioc1"));
        assert_eq!(lines[5], env_set("PREFIX", "XF:10ID{Prosilica-Cam:2}"));
        assert_eq!(lines[6], env_set("CTPREFIX", "XF:10ID{Prosilica-Cam:2}"));
        assert_eq!(lines[7], env_set("IOCNAME", "cam-ps1"));
        assert_eq!(lines[8], env_set("EPICS_CA_ADDR_LIST", "10.0.0.255"));
        assert_eq!(lines[9], env_set("IOC", "iocADProsilica"));
        assert_eq!(lines[10], env_set("PORT", "Prosilica1"));
        assert_eq!(lines[11], "epicsEnvSet(\"QSIZE\", \"20\")");
        assert_eq!(lines[12], "# PORT stays a comment");
    }

    #[test]
    fn test_ctprefix_wins_over_prefix() {
        let rewritten = rewrite_unique_settings(
            "epicsEnvSet(\"CTPREFIX\", \"$(PREFIX)\")\n",
            &device(),
            &settings(BinaryLayout::Flat),
        );
        assert_eq!(
            rewritten,
            format!("{}\n", env_set("CTPREFIX", "XF:10ID{Prosilica-Cam:2}"))
        );
    }

    #[test]
    fn test_unique_rewrite_nested_support_dir() {
        let rewritten = rewrite_unique_settings(
            "epicsEnvSet(\"SUPPORT_DIR\", \"\")\n",
            &device(),
            &settings(BinaryLayout::Nested),
        );
        assert_eq!(
            rewritten,
            "epicsEnvSet(\"SUPPORT_DIR\", \"/epics/deploy/support\")\n"
        );
    }

    #[test]
    fn test_unique_rewrite_is_idempotent() {
        let settings = settings(BinaryLayout::Nested);
        let once = rewrite_unique_settings(UNIQUE, &device(), &settings);
        let twice = rewrite_unique_settings(&once, &device(), &settings);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_procserv_config_rewrite() {
        let config = "NAME=template\nPORT=0\nHOST=none\nUSER=softioc\n";
        let rewritten = rewrite_procserv_config(config, &device(), "xf10id-ioc1");
        assert_eq!(
            rewritten,
            "NAME=cam-ps1\nPORT=4000\nHOST=xf10id-ioc1\nUSER=softioc\n"
        );
    }

    #[test]
    fn test_env_paths_rewrite() {
        let env_paths = "epicsEnvSet(\"SUPPORT\", \"/epics/deploy/support\")\nepicsEnvSet(\"EPICS_BASE\", \"/epics/base\")";
        let rewritten = rewrite_env_paths(env_paths);
        assert_eq!(
            rewritten,
            "epicsEnvSet(\"SUPPORT\", \"/epics/deploy/support\")\nepicsEnvSet(\"EPICS_BASE\", \"$(SUPPORT)/../base\")\n"
        );
    }
}
