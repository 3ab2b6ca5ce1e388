// SPDX-License-Identifier: GPL-3.0-only

//! Logical volume handles
//!
//! A handle is a context plus a qualified name. Everything else —
//! paths, size, permission, activation, tags — is queried from the LVM
//! tools on every read. Staleness would be unsafe here: permission and
//! activation state gate whether a committed image layer can be
//! modified, so the tools stay the sole source of truth.

use std::fmt;
use std::path::Path;

use imglayer_types::{is_name_valid, LvmName, Permission};
use tracing::{debug, warn};

use crate::error::{LvmError, Result};
use crate::invoker::LvmCommand;
use crate::lvm::Lvm;
use crate::mounts;
use crate::thinpool::ThinPool;
use crate::vg::VolumeGroup;

/// Structural classification of a volume lookup token.
///
/// Lookup input arrives as free text from orchestration: device paths,
/// mount points, qualified names, or tag references. Classification is
/// an explicit match so every accepted form is visible in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeRef<'a> {
    /// `/dev/...` node, resolved by reverse path lookup
    DevicePath(&'a str),
    /// A live mount point, resolved via its mount source device
    MountPoint(&'a str),
    /// An already-qualified `VG/LV` name
    Qualified(&'a str),
    /// `@tag` reference, must match exactly one volume
    Tag(&'a str),
    /// None of the recognized forms
    Unrecognized(&'a str),
}

impl<'a> VolumeRef<'a> {
    /// Classify `token` against the live mount table.
    pub fn classify(token: &'a str) -> Self {
        Self::classify_with(token, |path| mounts::is_mount_point(path))
    }

    fn classify_with(token: &'a str, is_mount: impl Fn(&Path) -> bool) -> Self {
        if token.is_empty() {
            VolumeRef::Unrecognized(token)
        } else if token.starts_with("/dev") {
            VolumeRef::DevicePath(token)
        } else if is_mount(Path::new(token)) {
            VolumeRef::MountPoint(token)
        } else if token.contains('/') {
            VolumeRef::Qualified(token)
        } else if let Some(tag) = token.strip_prefix('@') {
            VolumeRef::Tag(tag)
        } else {
            VolumeRef::Unrecognized(token)
        }
    }
}

/// Handle to a logical volume inside a volume group.
#[derive(Clone)]
pub struct LogicalVolume {
    pub(crate) lvm: Lvm,
    pub(crate) name: LvmName,
}

impl fmt::Debug for LogicalVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicalVolume({})", self.name)
    }
}

impl fmt::Display for LogicalVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

impl LogicalVolume {
    /// Build a handle from its VG and LV names.
    pub fn from_lv_name(lvm: &Lvm, vg_name: impl Into<String>, lv_name: impl Into<String>) -> Self {
        Self {
            lvm: lvm.clone(),
            name: LvmName::new(vg_name, lv_name),
        }
    }

    /// Build a handle from a qualified `VG/LV` name.
    pub fn from_qualified_name(lvm: &Lvm, qualified: &str) -> Result<Self> {
        let name: LvmName = qualified
            .parse()
            .map_err(|_| LvmError::UnresolvableReference(qualified.to_string()))?;
        Ok(Self {
            lvm: lvm.clone(),
            name,
        })
    }

    /// Resolve a free-form lookup token.
    pub fn try_find(lvm: &Lvm, token: &str) -> Result<Self> {
        debug!("Trying to find LV for: {token}");
        match VolumeRef::classify(token) {
            VolumeRef::DevicePath(path) => Self::from_path(lvm, Path::new(path)),
            VolumeRef::MountPoint(dir) => {
                let info = mounts::read_mountinfo()?;
                let source = mounts::find_mount_source(&info, Path::new(dir))
                    .ok_or_else(|| LvmError::UnresolvableReference(token.to_string()))?;
                Self::from_path(lvm, Path::new(&source))
            }
            VolumeRef::Qualified(name) => Self::from_qualified_name(lvm, name),
            VolumeRef::Tag(tag) => Self::from_tag(lvm, tag),
            VolumeRef::Unrecognized(token) => {
                Err(LvmError::UnresolvableReference(token.to_string()))
            }
        }
    }

    /// Reverse lookup: which VG/LV owns this device path.
    pub fn from_path(lvm: &Lvm, path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy().into_owned();
        let raw = lvm.invoke(
            LvmCommand::Lvs,
            &["--noheadings", "-o", "vg_name,lv_name", &path_str],
        )?;
        let data = raw.trim();
        if data.is_empty() {
            return Err(LvmError::UnresolvableReference(path_str));
        }
        let lines: Vec<&str> = data.lines().collect();
        if lines.len() != 1 {
            return Err(LvmError::AmbiguousLookup {
                selector: path_str,
                matches: lines.len(),
            });
        }
        debug!("Found LV for path {path_str}: {data}");
        let mut fields = lines[0].split_whitespace();
        match (fields.next(), fields.next()) {
            (Some(vg), Some(lv)) => Ok(Self::from_lv_name(lvm, vg, lv)),
            _ => Err(LvmError::ParseOutput(format!(
                "expected vg_name and lv_name, got {data:?}"
            ))),
        }
    }

    /// All logical volumes carrying `tag`.
    pub fn find_by_tag(lvm: &Lvm, tag: &str) -> Result<Vec<Self>> {
        let selector = format!("@{}", tag.trim_start_matches('@'));
        let raw = lvm.invoke(
            LvmCommand::Lvs,
            &["--noheadings", "-o", "lv_full_name", &selector],
        )?;
        raw.lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Self::from_qualified_name(lvm, name))
            .collect()
    }

    /// The single logical volume carrying `tag`.
    pub fn from_tag(lvm: &Lvm, tag: &str) -> Result<Self> {
        let mut volumes = Self::find_by_tag(lvm, tag)?;
        if volumes.len() != 1 {
            return Err(LvmError::AmbiguousLookup {
                selector: format!("@{tag}"),
                matches: volumes.len(),
            });
        }
        Ok(volumes.remove(0))
    }

    /// Owning volume group name.
    pub fn vg_name(&self) -> &str {
        &self.name.vg_name
    }

    /// Volume name within the group.
    pub fn lv_name(&self) -> &str {
        &self.name.lv_name
    }

    /// The qualified `VG/LV` form the tools address volumes by.
    pub fn qualified_name(&self) -> String {
        self.name.to_string()
    }

    /// Handle to the owning volume group.
    pub fn vg(&self) -> VolumeGroup {
        VolumeGroup::from_name(&self.lvm, self.vg_name())
    }

    /// Device path (`/dev/VG/LV`), freshly queried.
    pub fn path(&self) -> Result<String> {
        self.report_field("lv_path")
    }

    /// Device-mapper path (`/dev/mapper/...`), freshly queried.
    pub fn dm_path(&self) -> Result<String> {
        self.report_field("lv_dm_path")
    }

    /// Volume size in bytes, freshly queried.
    pub fn size_bytes(&self) -> Result<u64> {
        let qualified = self.qualified_name();
        let raw = self.lvm.invoke(
            LvmCommand::Lvs,
            &[
                "--noheadings",
                "--nosuffix",
                "--units",
                "b",
                "-o",
                "lv_size",
                &qualified,
            ],
        )?;
        let raw = raw.trim();
        raw.parse()
            .map_err(|_| LvmError::ParseOutput(format!("bad lv_size value: {raw:?}")))
    }

    /// Create a copy-on-write snapshot of this volume.
    ///
    /// The snapshot is registered before the handle is returned, so an
    /// operation that aborts after this point leaves nothing orphaned.
    pub fn create_snapshot(&self, new_name: &str) -> Result<LogicalVolume> {
        if !is_name_valid(new_name) {
            return Err(LvmError::InvalidName(new_name.to_string()));
        }
        let qualified = self.qualified_name();
        self.lvm.invoke(
            LvmCommand::Lvcreate,
            &["--snapshot", "--name", new_name, &qualified],
        )?;
        let volume = Self::from_lv_name(&self.lvm, self.vg_name(), new_name);
        Ok(self.lvm.register(volume))
    }

    /// Remove the volume; `force` adds `-ff` for volumes that are
    /// active or still have snapshots.
    pub fn remove(&self, force: bool) -> Result<()> {
        let qualified = self.qualified_name();
        let mut args = Vec::new();
        if force {
            args.push("-ff");
        }
        args.push(qualified.as_str());
        self.lvm.invoke(LvmCommand::Lvremove, &args)?;
        Ok(())
    }

    /// Rename in place; the handle follows the new name.
    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        if !is_name_valid(new_name) {
            return Err(LvmError::InvalidName(new_name.to_string()));
        }
        self.lvm.invoke(
            LvmCommand::Lvrename,
            &[self.vg_name(), self.lv_name(), new_name],
        )?;
        self.name.lv_name = new_name.to_string();
        Ok(())
    }

    /// Activate or deactivate the volume. `ignore_skip` passes
    /// `--ignoreactivationskip`, needed whenever the skip flag was
    /// just changed and must not veto this call.
    pub fn activate(&self, active: bool, ignore_skip: bool) -> Result<()> {
        let flag = if active { "y" } else { "n" };
        let qualified = self.qualified_name();
        let mut args = vec!["--activate", flag, qualified.as_str()];
        if ignore_skip {
            args.push("--ignoreactivationskip");
        }
        self.lvm.invoke(LvmCommand::Lvchange, &args)?;
        Ok(())
    }

    /// Set or clear the activation-skip flag.
    pub fn set_activation_skip(&self, skip: bool) -> Result<()> {
        let flag = if skip { "y" } else { "n" };
        let qualified = self.qualified_name();
        self.lvm.invoke(
            LvmCommand::Lvchange,
            &["--setactivationskip", flag, &qualified],
        )?;
        Ok(())
    }

    /// Live permission mode, from the named `lv_permissions` field.
    pub fn permission(&self) -> Result<Permission> {
        let raw = self.report_field("lv_permissions")?;
        match raw.as_str() {
            "writeable" => Ok(Permission::ReadWrite),
            "read-only" => Ok(Permission::ReadOnly),
            other => Err(LvmError::ParseOutput(format!(
                "unknown lv_permissions value: {other:?}"
            ))),
        }
    }

    /// Change the permission mode; a no-op when the live mode already
    /// matches, sparing one external call.
    pub fn set_permission(&self, permission: Permission) -> Result<()> {
        if self.permission()? == permission {
            debug!("{self:?} is already {permission}");
            return Ok(());
        }
        let qualified = self.qualified_name();
        self.lvm.invoke(
            LvmCommand::Lvchange,
            &["--permission", permission.as_flag(), &qualified],
        )?;
        Ok(())
    }

    /// Whether the volume is currently active.
    pub fn is_active(&self) -> Result<bool> {
        Ok(self.report_field("lv_active")? == "active")
    }

    /// Whether the activation-skip flag is set.
    pub fn activation_skip(&self) -> Result<bool> {
        Ok(!self.report_field("lv_skip_activation")?.is_empty())
    }

    pub fn add_tag(&self, tag: &str) -> Result<()> {
        let qualified = self.qualified_name();
        self.lvm
            .invoke(LvmCommand::Lvchange, &["--addtag", tag, &qualified])?;
        Ok(())
    }

    pub fn del_tag(&self, tag: &str) -> Result<()> {
        let qualified = self.qualified_name();
        self.lvm
            .invoke(LvmCommand::Lvchange, &["--deltag", tag, &qualified])?;
        Ok(())
    }

    /// The volume's tag set (comma-separated `lv_tags` field).
    pub fn tags(&self) -> Result<Vec<String>> {
        let raw = self.report_field("lv_tags")?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        Ok(raw.split(',').map(|tag| tag.trim().to_string()).collect())
    }

    /// The origin this volume was snapshotted from, if it is a snapshot.
    pub fn origin(&self) -> Result<Option<LogicalVolume>> {
        let mut values = self.options(&["origin"])?;
        let origin = values.remove(0);
        if origin.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::from_lv_name(&self.lvm, self.vg_name(), origin)))
    }

    /// The metadata profile attached to the volume, if any.
    pub fn profile(&self) -> Result<String> {
        Ok(self.options(&["lv_profile"])?.remove(0))
    }

    /// Attach a metadata profile, optionally under an ad-hoc `--config`.
    pub fn set_profile(&self, name: &str, config: Option<&str>) -> Result<()> {
        let qualified = self.qualified_name();
        let mut args = Vec::new();
        if let Some(config) = config {
            args.push("--config");
            args.push(config);
        }
        args.extend_from_slice(&["--metadataprofile", name, &qualified]);
        self.lvm.invoke(LvmCommand::Lvchange, &args)?;
        Ok(())
    }

    /// Query several report fields in one invocation, one value per
    /// requested field.
    pub fn options(&self, fields: &[&str]) -> Result<Vec<String>> {
        // A separator the report never emits on its own, so empty
        // fields survive the split.
        const SEPARATOR: &str = "$";
        let joined = fields.join(",");
        let qualified = self.qualified_name();
        let raw = self.lvm.invoke(
            LvmCommand::Lvs,
            &[
                "--noheadings",
                "--separator",
                SEPARATOR,
                "-o",
                &joined,
                &qualified,
            ],
        )?;
        let values: Vec<String> = raw
            .trim()
            .split(SEPARATOR)
            .map(|value| value.trim().to_string())
            .collect();
        if values.len() != fields.len() {
            return Err(LvmError::ParseOutput(format!(
                "expected {} fields for {joined}, got {}",
                fields.len(),
                values.len()
            )));
        }
        Ok(values)
    }

    /// The thin pool this volume lives in.
    ///
    /// An empty `pool_lv` field means the volume is not thin; that is
    /// an error here rather than a silent fallback, so callers never
    /// mistake an ordinary LV for a pool member.
    pub fn thinpool(&self) -> Result<ThinPool> {
        let pool = self.report_field("pool_lv")?;
        if pool.is_empty() {
            return Err(LvmError::MissingThinPool(self.qualified_name()));
        }
        Ok(ThinPool::from(Self::from_lv_name(
            &self.lvm,
            self.vg_name(),
            pool,
        )))
    }

    /// Mark the volume as a committed, immutable layer: read-only,
    /// activation-skipped, inactive.
    ///
    /// Permission is tightened first so a concurrent activation cannot
    /// race into a writable volume before the deactivation lands.
    pub fn protect(&self) -> Result<()> {
        self.set_permission(Permission::ReadOnly)?;
        self.set_activation_skip(true)?;
        self.activate(false, true)
    }

    /// Reverse of [`protect`](Self::protect): writable, no skip, active.
    pub fn unprotect(&self) -> Result<()> {
        self.set_permission(Permission::ReadWrite)?;
        self.set_activation_skip(false)?;
        self.activate(true, true)
    }

    /// Run `operation` against a temporarily unprotected volume.
    ///
    /// Protection is re-applied on every exit path, including when the
    /// operation fails; the operation's error wins over a re-protect
    /// error, which is logged.
    pub fn with_unprotected<T>(&self, operation: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.unprotect()?;
        let outcome = operation(self);
        let reprotect = self.protect();
        match outcome {
            Ok(value) => {
                reprotect?;
                Ok(value)
            }
            Err(err) => {
                if let Err(protect_err) = reprotect {
                    warn!("Failed to re-protect {self:?}: {protect_err}");
                }
                Err(err)
            }
        }
    }

    fn report_field(&self, field: &str) -> Result<String> {
        let qualified = self.qualified_name();
        let raw = self
            .lvm
            .invoke(LvmCommand::Lvs, &["--noheadings", "-o", field, &qualified])?;
        Ok(raw.trim().to_string())
    }
}
