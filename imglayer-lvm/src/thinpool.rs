// SPDX-License-Identifier: GPL-3.0-only

//! Thin pool operations
//!
//! A thin pool is a logical volume that hands out space on demand to
//! thin volumes created inside it, tracking block allocation in a
//! separate metadata area. Metadata exhaustion corrupts the pool
//! silently, so pool growth is gated behind an explicit headroom check.

use std::fmt;
use std::ops::Deref;

use imglayer_types::is_name_valid;
use tracing::{debug, warn};

use crate::error::{LvmError, Result};
use crate::invoker::LvmCommand;
use crate::lv::LogicalVolume;

/// Metadata floor in MiB. Pools below this are not trusted with
/// further thin-volume creation until grown.
const MIN_METADATA_MIB: f64 = 1024.0;

/// A logical volume acting as a thin pool.
pub struct ThinPool {
    lv: LogicalVolume,
}

impl fmt::Debug for ThinPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThinPool({})", self.lv)
    }
}

impl From<LogicalVolume> for ThinPool {
    fn from(lv: LogicalVolume) -> Self {
        Self { lv }
    }
}

impl Deref for ThinPool {
    type Target = LogicalVolume;

    fn deref(&self) -> &LogicalVolume {
        &self.lv
    }
}

impl ThinPool {
    /// The underlying logical volume handle.
    pub fn lv(&self) -> &LogicalVolume {
        &self.lv
    }

    /// Create a thin volume of the given virtual size (an LVM size
    /// string such as `10G`) inside this pool.
    ///
    /// Registered before return, like snapshots, so a failed update
    /// never leaves the volume behind.
    pub fn create_thin_volume(&self, name: &str, virtual_size: &str) -> Result<LogicalVolume> {
        if !is_name_valid(name) {
            return Err(LvmError::InvalidName(name.to_string()));
        }
        let qualified = self.lv.qualified_name();
        self.lv.lvm.invoke(
            LvmCommand::Lvcreate,
            &[
                "--thin",
                "--virtualsize",
                virtual_size,
                "--name",
                name,
                &qualified,
            ],
        )?;
        let volume = LogicalVolume::from_lv_name(&self.lv.lvm, self.lv.vg_name(), name);
        Ok(self.lv.lvm.register(volume))
    }

    /// Verify the pool's metadata area has headroom.
    ///
    /// With `resize` false, a deficit below the floor is
    /// [`LvmError::ThinPoolMetadata`]. With `resize` true, the pool
    /// metadata is grown by exactly the deficit — but only when the
    /// owning VG's free space covers it; anything else is logged and
    /// left alone rather than over-committing the group.
    pub fn check_metadata_size(&self, resize: bool) -> Result<()> {
        let (used_percent, size_mib) = self.metadata_size()?;
        debug!(
            "Pool {}: metadata size={size_mib}M ({used_percent}%)",
            self.lv
        );

        let deficit_mib = MIN_METADATA_MIB - size_mib;
        if deficit_mib <= 0.0 {
            return Ok(());
        }
        if !resize {
            return Err(LvmError::ThinPoolMetadata(format!(
                "metadata of {} is {size_mib} MiB, below the {MIN_METADATA_MIB} MiB floor",
                self.lv
            )));
        }
        self.resize_metadata(deficit_mib)
    }

    /// Metadata usage percentage and absolute size in MiB.
    fn metadata_size(&self) -> Result<(f64, f64)> {
        let qualified = self.lv.qualified_name();
        let raw = self.lv.lvm.invoke(
            LvmCommand::Lvs,
            &[
                "--noheadings",
                "--nosuffix",
                "--units",
                "m",
                "-o",
                "metadata_percent,lv_metadata_size",
                &qualified,
            ],
        )?;
        let mut fields = raw.split_whitespace();
        let parse = |value: Option<&str>| -> Result<f64> {
            value
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| LvmError::ParseOutput(format!("bad metadata report: {raw:?}")))
        };
        let percent = parse(fields.next())?;
        let size_mib = parse(fields.next())?;
        Ok((percent, size_mib))
    }

    fn resize_metadata(&self, grow_mib: f64) -> Result<()> {
        let free_mib = self.lv.vg().free_mib()?;
        if grow_mib > free_mib {
            warn!("Not resizing metadata of {}: {grow_mib} > {free_mib}", self.lv);
            return Ok(());
        }
        let qualified = self.lv.qualified_name();
        let grow = format!("+{grow_mib}m");
        self.lv.lvm.invoke(
            LvmCommand::Lvextend,
            &["--poolmetadatasize", &grow, &qualified],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lvm::Lvm;
    use crate::testing::FakeRunner;

    fn pool(fake: &std::sync::Arc<FakeRunner>) -> (Lvm, ThinPool) {
        let lvm = Lvm::with_runner(fake.clone());
        let pool = ThinPool::from(LogicalVolume::from_lv_name(&lvm, "HostVG", "pool0"));
        (lvm, pool)
    }

    #[test]
    fn thin_volume_creation_registers() {
        let fake = FakeRunner::new();
        let (lvm, pool) = pool(&fake);

        let lv = pool.create_thin_volume("Base-0", "10G").unwrap();
        assert_eq!(lv.qualified_name(), "HostVG/Base-0");
        let calls = fake.calls_for("lvcreate");
        assert_eq!(
            calls[0],
            ["--thin", "--virtualsize", "10G", "--name", "Base-0", "HostVG/pool0"]
        );
        assert_eq!(lvm.registered_volumes().len(), 1);

        assert!(matches!(
            pool.create_thin_volume("..", "10G").unwrap_err(),
            LvmError::InvalidName(_)
        ));
    }

    #[test]
    fn debug_names_the_pool_volume() {
        let fake = FakeRunner::new();
        let (_lvm, pool) = pool(&fake);
        assert_eq!(format!("{pool:?}"), "ThinPool(HostVG/pool0)");
    }

    #[test]
    fn healthy_metadata_needs_no_action() {
        let fake = FakeRunner::new();
        fake.set_output("metadata_percent,lv_metadata_size", "  3.10 2048.00\n");
        let (_lvm, pool) = pool(&fake);

        pool.check_metadata_size(false).unwrap();
        assert!(fake.calls_for("lvextend").is_empty());
    }

    #[test]
    fn deficit_without_resize_is_an_error() {
        let fake = FakeRunner::new();
        fake.set_output("metadata_percent,lv_metadata_size", "  0.34 512.00\n");
        let (_lvm, pool) = pool(&fake);

        let err = pool.check_metadata_size(false).unwrap_err();
        assert!(matches!(err, LvmError::ThinPoolMetadata(_)));
        assert!(fake.calls_for("lvextend").is_empty());
    }

    #[test]
    fn deficit_with_resize_extends_by_the_deficit() {
        let fake = FakeRunner::new();
        fake.set_output("metadata_percent,lv_metadata_size", "  0.34 512.00\n");
        fake.set_output("vg_free", "  4096.00\n");
        let (_lvm, pool) = pool(&fake);

        pool.check_metadata_size(true).unwrap();
        let calls = fake.calls_for("lvextend");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ["--poolmetadatasize", "+512m", "HostVG/pool0"]);
    }

    #[test]
    fn resize_never_overcommits_free_space() {
        let fake = FakeRunner::new();
        fake.set_output("metadata_percent,lv_metadata_size", "  0.34 512.00\n");
        fake.set_output("vg_free", "  100.00\n");
        let (_lvm, pool) = pool(&fake);

        // soft failure: no extend, no error
        pool.check_metadata_size(true).unwrap();
        assert!(fake.calls_for("lvextend").is_empty());
    }
}
