// SPDX-License-Identifier: GPL-3.0-only

//! Typed command/response layer over the LVM tools
//!
//! imglayer keeps a base filesystem image on a thin logical volume and
//! layers copy-on-write snapshots on top of it for host updates. This
//! crate is the LVM domain model underneath that scheme:
//!
//! - volume group and logical volume handles that translate requests
//!   into tool invocations and parse the tabular report output back
//!   into typed values
//! - thin pool creation and metadata-capacity guarding
//! - the protect/unprotect state machine for committed layers
//! - a per-context registry that sweeps up volumes created by a failed
//!   operation
//!
//! It is not an LVM reimplementation: no on-disk metadata parsing, no
//! locking, no clustering. The external tools remain the source of
//! truth, and every property read re-queries them.

pub mod error;
pub mod invoker;
pub mod lv;
pub mod lvm;
pub mod mounts;
pub mod thinpool;
pub mod vg;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{LvmError, Result};
pub use invoker::{CommandRunner, LvmCommand, SystemRunner};
pub use lv::{LogicalVolume, VolumeRef};
pub use lvm::{Lvm, KEEP_VOLUMES_ENV};
pub use thinpool::ThinPool;
pub use vg::VolumeGroup;

// Re-export the shared vocabulary
pub use imglayer_types::{is_name_valid, LvmName, Permission};
