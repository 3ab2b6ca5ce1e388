// SPDX-License-Identifier: GPL-3.0-only

//! Mount guards
//!
//! Thin wrappers over the `mount`/`umount` tools that undo themselves
//! on drop, so a failing persistence run never leaves a layer mounted.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{PersistError, Result};

fn mount_tool(args: &[&std::ffi::OsStr]) -> Result<()> {
    debug!("Running mount {args:?}");
    let output = Command::new("mount").args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(PersistError::Mount(stderr));
    }
    Ok(())
}

fn unmount(target: &Path) {
    let result = Command::new("umount").arg(target).output();
    match result {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Failed unmounting {}: {}", target.display(), stderr.trim());
        }
        Err(err) => warn!("Failed running umount for {}: {err}", target.display()),
    }
}

/// A device mounted read-write on a private temporary directory,
/// unmounted (and the directory removed) on drop.
pub struct Mounted {
    dir: TempDir,
}

impl Mounted {
    /// Mount `device` on a fresh temporary directory.
    pub fn new(device: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("imglayer-").tempdir()?;
        mount_tool(&[device.as_ref(), dir.path().as_os_str()])?;
        debug!("Mounted {device} on {}", dir.path().display());
        Ok(Self { dir })
    }

    /// The mount target directory.
    pub fn target(&self) -> &Path {
        self.dir.path()
    }

    /// A path inside the mounted tree; `relative` may carry a leading
    /// slash.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative.trim_start_matches('/'))
    }
}

impl Drop for Mounted {
    fn drop(&mut self) {
        unmount(self.dir.path());
    }
}

/// A bind mount of an existing directory into another tree, undone on
/// drop.
pub struct BindMounted {
    target: PathBuf,
}

impl BindMounted {
    /// Bind-mount `source` onto `target`.
    pub fn new(source: &Path, target: &Path) -> Result<Self> {
        mount_tool(&[
            "--bind".as_ref(),
            source.as_os_str(),
            target.as_os_str(),
        ])?;
        debug!(
            "Bind-mounted {} on {}",
            source.display(),
            target.display()
        );
        Ok(Self {
            target: target.to_path_buf(),
        })
    }
}

impl Drop for BindMounted {
    fn drop(&mut self) {
        unmount(&self.target);
    }
}
