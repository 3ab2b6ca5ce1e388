// SPDX-License-Identifier: GPL-3.0-only

//! Re-applying persisted packages into a new layer
//!
//! After a successful OS upgrade the orchestration layer hands over the
//! previous and the newly created layer volumes. The new layer's
//! filesystem is mounted read-write, checked for release
//! compatibility, given the host's `/var` via a bind mount, and the
//! persisted package set is reinstalled inside an isolated container.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use imglayer_lvm::LogicalVolume;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PersistError, Result};
use crate::mount::{BindMounted, Mounted};
use crate::release::SystemRelease;

/// Where persisted packages are collected on the host.
pub const PERSISTED_RPMS_DIR: &str = "/var/imglayer/persisted-rpms";

const RELEASE_MARKER: &str = "etc/system-release-cpe";
const HOST_RELEASE_MARKER: &str = "/etc/system-release-cpe";
const KERNEL_CMDLINE: &str = "/proc/cmdline";

/// Emitted once packages have been persisted into a new layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEvent {
    /// Name of the previous layer's volume
    pub previous_lv_name: String,

    /// Qualified name of the new layer's volume
    pub new_lv_name: String,
}

/// Reinstall the persisted package set into the new layer.
///
/// Skipped (but still reported as persisted) while a kickstart
/// installation is running, since the installer lays down packages
/// itself.
pub fn reinstall_persisted_rpms(
    previous: &LogicalVolume,
    new: &LogicalVolume,
) -> Result<PersistedEvent> {
    let cmdline = fs::read_to_string(KERNEL_CMDLINE).unwrap_or_default();
    if cmdline.contains("inst.ks") {
        info!("Not reinstalling RPMs during system installation");
    } else {
        let device = new.path()?;
        let new_fs = Mounted::new(&device)?;

        let new_release = SystemRelease::from_file(&new_fs.path(RELEASE_MARKER))?;
        let host_release = SystemRelease::from_file(Path::new(HOST_RELEASE_MARKER))?;
        if !new_release.is_compatible_with(&host_release) {
            return Err(PersistError::UnsupportedRelease(format!(
                "{new_release:?} does not match the host ({host_release:?})"
            )));
        }

        let _var = BindMounted::new(Path::new("/var"), &new_fs.path("var"))?;
        install_rpms(&new_fs)?;
    }

    Ok(PersistedEvent {
        previous_lv_name: previous.lv_name().to_string(),
        new_lv_name: new.qualified_name(),
    })
}

fn install_rpms(new_fs: &Mounted) -> Result<()> {
    let rpms = persisted_rpms(Path::new(PERSISTED_RPMS_DIR))?;
    if rpms.is_empty() {
        debug!("No persisted RPMs to reinstall");
        return Ok(());
    }

    // The container would mint a fresh machine-id into the layer;
    // stash the real one aside for the duration.
    let machine_id = new_fs.path("etc/machine-id");
    let backup = machine_id.with_extension("bak");
    fs::rename(&machine_id, &backup)?;
    let outcome = run_reinstall(new_fs.target(), &rpms);
    fs::rename(&backup, &machine_id)?;
    outcome
}

fn run_reinstall(root: &Path, rpms: &[PathBuf]) -> Result<()> {
    // Plain `rpm -Uvh` is enough: dependencies were persisted along
    // with the packages, so no repository setup is needed.
    let machine_uuid = Uuid::new_v4().simple().to_string();
    let mut command = Command::new("systemd-nspawn");
    command
        .arg("--uuid")
        .arg(&machine_uuid)
        .arg("--machine")
        .arg(machine_name())
        .arg("-D")
        .arg(root)
        .arg("rpm")
        .arg("-Uvh")
        .args(rpms);
    debug!("Running {command:?}");

    let output = command.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(PersistError::Reinstall(stderr));
    }
    Ok(())
}

fn persisted_rpms(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut rpms: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "rpm"))
        .collect();
    rpms.sort();
    Ok(rpms)
}

fn machine_name() -> String {
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "imglayer".to_string())
}
