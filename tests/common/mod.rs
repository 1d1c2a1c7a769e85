//! Shared fixtures: an IOC template directory and a fake binary distribution.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use initiocs::{BinaryLayout, DeployerSettings};
use std::fs;
use tempfile::TempDir;

pub const UNIQUE_TEMPLATE: &str = "\
# unique settings for this IOC
epicsEnvSet(\"SUPPORT_DIR\", \"/old/support\")
epicsEnvSet(\"ENGINEER\", \"nobody\")
epicsEnvSet(\"CAM-CONNECT\", \"none\")
epicsEnvSet(\"HOSTNAME\", \"localhost\")
epicsEnvSet(\"PREFIX\", \"XF:OLD\")
epicsEnvSet(\"CTPREFIX\", \"XF:OLD\")
epicsEnvSet(\"IOCNAME\", \"template\")
epicsEnvSet(\"EPICS_CA_ADDR_LIST\", \"0.0.0.0\")
epicsEnvSet(\"IOC\", \"iocTemplate\")
epicsEnvSet(\"PORT\", \"TMP1\")
";

pub const PROCSERV_TEMPLATE: &str = "\
NAME=template
PORT=4000
HOST=localhost
USER=softioc
";

pub const ENV_PATHS_TEMPLATE: &str = "\
epicsEnvSet(\"TOP\",\"/epics/iocs/template\")
epicsEnvSet(\"SUPPORT\",\"/epics/src/deploy/support\")
epicsEnvSet(\"EPICS_BASE\",\"/epics/base\")
";

pub const PROSILICA_STARTUP: &str = "\
#!../../bin/linux-x86_64/prosilicaApp
< /epics/iocs/template/envPaths

< unique.cmd
dbLoadRecords(\"$(ADCORE)/db/ADBase.template\")
iocInit()
";

/// Temporary workspace with `template/`, `deploy/` and an `iocs/` output root.
pub struct Workspace {
    _temp_dir: TempDir,
    pub root: Utf8PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    pub fn template_dir(&self) -> Utf8PathBuf {
        self.root.join("template")
    }

    pub fn binary_root(&self) -> Utf8PathBuf {
        self.root.join("deploy")
    }

    pub fn ioc_dir(&self) -> Utf8PathBuf {
        self.root.join("iocs")
    }

    /// Tool settings that copy the local template instead of cloning.
    pub fn deployer(&self) -> DeployerSettings {
        DeployerSettings {
            template_source: self.template_dir().to_string(),
            ..DeployerSettings::default()
        }
    }

    /// CONFIGURE text pointing at this workspace.
    pub fn configure(&self, layout: BinaryLayout, devices: &[&str]) -> String {
        let mut text = format!(
            "# test deployment\n\
             IOC_DIR={}\n\
             TOP_BINARY_DIR={}\n\
             BINARIES_FLAT={}\n\
             PREFIX=XF:10IDC-BI\n\
             ENGINEER=J. Wlodek\n\
             HOSTNAME=xf10idc-ioc1\n\
             CA_ADDRESS=10.10.0.255\n\n",
            self.ioc_dir(),
            self.binary_root(),
            layout.as_toggle()
        );
        for device in devices {
            text.push_str(device);
            text.push('\n');
        }
        text
    }

    /// Write the IOC template every test provisions from.
    pub fn write_template(&self) {
        let template = self.template_dir();
        write(&template.join("st.cmd"), "# replaced during provisioning\n");
        write(
            &template.join("startupScripts/st_prosilica.cmd"),
            PROSILICA_STARTUP,
        );
        write(
            &template.join("startupScripts/st_uvc.cmd"),
            "#!../../bin/linux-x86_64/uvcApp\n< envPaths\niocInit()\n",
        );
        write(&template.join("startupScripts/st_simdetector.cmd"), "iocInit()\n");
        write(
            &template.join("autosaveFiles/prosilica_auto_settings.req"),
            "file \"ADBase_settings.req\", P=$(P), R=cam1:\n",
        );
        write(
            &template.join("autosaveFiles/uvc_auto_settings.req"),
            "file \"ADUVC_settings.req\", P=$(P), R=cam1:\n",
        );
        write(&template.join("dependancyFiles/prosilica_camera.xml"), "<camera/>\n");
        write(&template.join("dependancyFiles/uvc_formats.txt"), "MJPG\n");
        write(&template.join("unique.cmd"), UNIQUE_TEMPLATE);
        write(&template.join("config"), PROCSERV_TEMPLATE);
        write(&template.join("envPaths"), ENV_PATHS_TEMPLATE);
        write(&template.join("cleanup.sh"), "touch cleanup_ran\n");
    }

    /// Build `<driver>/iocs/<ioc>/bin/linux-x86_64/<app>` in the distribution.
    pub fn write_binary(
        &self,
        layout: BinaryLayout,
        driver: &str,
        ioc: &str,
        app: &str,
    ) -> Utf8PathBuf {
        let arch = layout
            .support_root(&self.binary_root())
            .join("areaDetector")
            .join(driver)
            .join("iocs")
            .join(ioc)
            .join("bin/linux-x86_64");
        let binary = arch.join(app);
        write(&binary, "");
        binary
    }
}

pub fn write(path: &Utf8Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn read(path: &Utf8Path) -> String {
    fs::read_to_string(path).unwrap()
}
