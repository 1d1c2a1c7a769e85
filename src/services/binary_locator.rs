//! Locate the IOC executable of an areaDetector driver by directory convention.
//!
//! A built driver looks like
//!
//! ```text
//! <root>[/support]/areaDetector/ADProsilica/iocs/prosilicaIOC/bin/linux-x86_64/prosilicaApp
//! ```
//!
//! Each level is probed by name. A level with no candidate is
//! [`LocateError::BinaryNotFound`]; a level with several candidates is
//! [`LocateError::AmbiguousBinary`] rather than an arbitrary pick.

use crate::models::BinaryLayout;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::ErrorKind;
use thiserror::Error;

/// Errors from probing the binary distribution
#[derive(Error, Debug)]
pub enum LocateError {
    #[error("No {what} found in {dir}")]
    BinaryNotFound { dir: Utf8PathBuf, what: &'static str },

    #[error("Ambiguous {what} in {dir}: {}", .candidates.join(", "))]
    AmbiguousBinary {
        dir: Utf8PathBuf,
        what: &'static str,
        candidates: Vec<String>,
    },

    #[error("Failed to read {dir}: {source}")]
    Io {
        dir: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top directory of a driver, e.g. `<root>/support/areaDetector/ADProsilica`.
pub fn driver_root(root: &Utf8Path, layout: BinaryLayout, device_type: &str) -> Utf8PathBuf {
    layout
        .support_root(root)
        .join("areaDetector")
        .join(device_type)
}

/// Find the executable for `device_type` under the distribution `root`.
///
/// # Errors
///
/// [`LocateError::BinaryNotFound`] when any level of the convention is missing,
/// [`LocateError::AmbiguousBinary`] when a level matches more than one entry.
pub fn locate_ioc_binary(
    root: &Utf8Path,
    layout: BinaryLayout,
    device_type: &str,
) -> Result<Utf8PathBuf, LocateError> {
    let driver = driver_root(root, layout, device_type);

    let iocs = descend(&driver, "iocs directory", true, |name| {
        name == "iocs" || name == "ioc"
    })?;
    let ioc = descend(&iocs, "IOC directory", true, |name| {
        name.contains("ioc") || name.contains("IOC")
    })?;
    let arch = descend(&ioc.join("bin"), "architecture directory", true, |_| true)?;
    let binary = descend(&arch, "App executable", false, |name| name.contains("App"))?;

    tracing::debug!("Located {} binary at {}", device_type, binary);
    Ok(binary)
}

/// Pick the single entry of `dir` accepted by `matches`.
fn descend<F>(
    dir: &Utf8Path,
    what: &'static str,
    directories_only: bool,
    matches: F,
) -> Result<Utf8PathBuf, LocateError>
where
    F: Fn(&str) -> bool,
{
    let mut candidates: Vec<String> = list_entries(dir, what)?
        .into_iter()
        .filter(|(name, is_dir)| (!directories_only || *is_dir) && matches(name))
        .map(|(name, _)| name)
        .collect();

    match candidates.len() {
        0 => Err(LocateError::BinaryNotFound {
            dir: dir.to_path_buf(),
            what,
        }),
        1 => Ok(dir.join(candidates.remove(0))),
        _ => Err(LocateError::AmbiguousBinary {
            dir: dir.to_path_buf(),
            what,
            candidates,
        }),
    }
}

/// Sorted `(name, is_dir)` pairs; a missing directory counts as not found.
fn list_entries(dir: &Utf8Path, what: &'static str) -> Result<Vec<(String, bool)>, LocateError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LocateError::BinaryNotFound {
                dir: dir.to_path_buf(),
                what,
            });
        }
        Err(source) => {
            return Err(LocateError::Io {
                dir: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| LocateError::Io {
            dir: dir.to_path_buf(),
            source,
        })?;
        // Non UTF-8 names can never match the ASCII conventions.
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir = entry.path().is_dir();
        entries.push((name, is_dir));
    }
    entries.sort();

    Ok(entries)
}
