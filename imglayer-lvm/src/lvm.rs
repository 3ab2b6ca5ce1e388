// SPDX-License-Identifier: GPL-3.0-only

//! The `Lvm` context: command runner plus the volume registry
//!
//! Snapshots and thin volumes are created as side effects of larger
//! update operations. Every such volume is recorded here so that a
//! failed operation can be swept up instead of leaving orphans behind.
//! The registry is per-context, in-memory state; it protects against
//! failures within this process only.

use std::env;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::{LvmError, Result};
use crate::invoker::{CommandRunner, LvmCommand, SystemRunner};
use crate::lv::LogicalVolume;
use crate::mounts;

/// When set, [`Lvm::reset_registered_volumes`] leaves every registered
/// volume in place. Diagnostics escape hatch, not for normal operation.
pub const KEEP_VOLUMES_ENV: &str = "IMGLAYER_KEEP_VOLUMES";

struct Inner {
    runner: Box<dyn CommandRunner>,
    registry: Mutex<Vec<LogicalVolume>>,
}

/// Handle to the LVM layer.
///
/// Volume group and logical volume handles each hold a clone of this;
/// it is cheap to clone and carries no cached volume state.
#[derive(Clone)]
pub struct Lvm {
    inner: Arc<Inner>,
}

impl fmt::Debug for Lvm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lvm")
    }
}

impl Lvm {
    /// Create a context backed by the real LVM tools.
    pub fn new() -> Result<Self> {
        Ok(Self::with_runner(SystemRunner::new()?))
    }

    /// Create a context with an injected runner.
    pub fn with_runner(runner: impl CommandRunner + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner: Box::new(runner),
                registry: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn invoke(&self, command: LvmCommand, args: &[&str]) -> Result<String> {
        self.inner.runner.invoke(command, args)
    }

    pub(crate) fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        self.inner.runner.run(program, args)
    }

    /// List all logical volumes, optionally narrowed by an LVM
    /// `--select` expression, sorted by qualified name.
    pub fn list_volumes(&self, filter: Option<&str>) -> Result<Vec<LogicalVolume>> {
        let mut args = vec!["--noheadings", "-o", "lv_full_name"];
        if let Some(filter) = filter {
            args.push("--select");
            args.push(filter);
        }
        let raw = self.invoke(LvmCommand::Lvs, &args)?;
        let mut names: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        names.sort_unstable();
        debug!("All LV names: {names:?}");
        names
            .into_iter()
            .map(|name| LogicalVolume::from_qualified_name(self, name))
            .collect()
    }

    /// Record a volume created as a side effect, passing it through.
    pub(crate) fn register(&self, volume: LogicalVolume) -> LogicalVolume {
        self.registry().push(volume.clone());
        volume
    }

    /// The volumes currently registered and not yet committed.
    pub fn registered_volumes(&self) -> Vec<LogicalVolume> {
        self.registry().clone()
    }

    /// Drop a volume from the registry once the caller considers it
    /// committed, so cleanup will no longer touch it.
    pub fn mark_committed(&self, volume: &LogicalVolume) {
        self.registry()
            .retain(|lv| lv.qualified_name() != volume.qualified_name());
    }

    /// Tear down every registered volume: unmount where mounted, then
    /// force-remove, skipping past individual failures so one stuck
    /// volume does not shield the rest. A no-op when
    /// [`KEEP_VOLUMES_ENV`] is set.
    pub fn reset_registered_volumes(&self) -> Result<()> {
        if env::var_os(KEEP_VOLUMES_ENV).is_some() {
            info!("{KEEP_VOLUMES_ENV} is set, keeping registered volumes");
            return Ok(());
        }

        let volumes: Vec<LogicalVolume> = self.registry().drain(..).collect();
        if volumes.is_empty() {
            return Ok(());
        }

        // The registry is already drained; from here on every failure
        // is logged and skipped so no volume is silently forgotten.
        if let Err(err) = self.run("sync", &[]) {
            warn!("sync before volume cleanup failed: {err}");
        }
        let mount_map = mounts::read_mountinfo()
            .map(|info| mounts::device_mount_map(&info))
            .unwrap_or_default();

        for volume in volumes {
            match volume.dm_path() {
                Ok(dm_path) => {
                    if let Some(target) = mount_map.get(&dm_path) {
                        if let Err(err) = self.run("umount", &[target]) {
                            warn!("Failed unmounting {target}: {err}");
                        }
                    }
                }
                Err(err) => debug!("No dm path for {volume}: {err}"),
            }
            if let Err(err) = volume.remove(true) {
                debug!("Failed removing LV [{volume}], skipping: {err}");
            }
        }
        Ok(())
    }

    /// Disable pool event monitoring and stop the monitoring daemon.
    /// Global and not reversible from here; meant for teardown.
    pub fn stop_monitoring(&self) -> Result<()> {
        self.invoke(LvmCommand::Vgchange, &["--monitor", "n"])?;
        if let Err(err) = self.run("pkill", &["dmeventd"]) {
            // pkill exits non-zero when nothing matched, which is the
            // desired end state here
            debug!("pkill dmeventd: {err}");
        }
        Ok(())
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Vec<LogicalVolume>> {
        self.inner
            .registry
            .lock()
            .expect("volume registry lock poisoned")
    }
}

impl Lvm {
    /// Read a value from the tool configuration (`lvmconfig`).
    pub fn config_value(&self, key: &str) -> Result<String> {
        let raw = self.invoke(LvmCommand::Lvmconfig, &["--typeconfig", "full", key])?;
        raw.trim()
            .split_once('=')
            .map(|(_, value)| value.trim().trim_matches('"').to_string())
            .ok_or_else(|| LvmError::ParseOutput(format!("no value for config key {key}")))
    }
}
