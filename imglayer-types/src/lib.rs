// SPDX-License-Identifier: GPL-3.0-only

//! Shared vocabulary for the imglayer stack
//!
//! This crate defines the small set of value types the LVM layer and its
//! consumers agree on:
//!
//! - naming rules for volume groups and logical volumes
//! - the qualified "VG/LV" name form
//! - the permission mode of a logical volume
//!
//! Live volume state (size, activation, tags) is deliberately *not*
//! modeled here; the LVM tools remain the source of truth and handles in
//! `imglayer-lvm` re-query them on every read.

pub mod naming;
pub mod volume;

pub use naming::{MAX_NAME_LEN, is_name_valid};
pub use volume::{InvalidQualifiedName, LvmName, Permission};
