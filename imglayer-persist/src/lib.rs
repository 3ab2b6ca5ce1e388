// SPDX-License-Identifier: GPL-3.0-only

//! Package persistence for imglayer updates
//!
//! Consumer of the LVM core: given the previous and the newly created
//! layer volumes after an upgrade, this crate mounts the new layer,
//! verifies it is a release packages can be carried into, and
//! reinstalls the host's persisted package set inside an isolated
//! container. It never talks to the LVM tools directly; the volume
//! handles it receives are its only window into the core.

pub mod error;
pub mod mount;
pub mod release;
pub mod rpms;

pub use error::{PersistError, Result};
pub use mount::{BindMounted, Mounted};
pub use release::SystemRelease;
pub use rpms::{reinstall_persisted_rpms, PersistedEvent, PERSISTED_RPMS_DIR};
