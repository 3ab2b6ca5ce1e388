// SPDX-License-Identifier: GPL-3.0-only

//! Volume group handles

use std::fmt;

use imglayer_types::is_name_valid;
use tracing::debug;

use crate::error::{LvmError, Result};
use crate::invoker::LvmCommand;
use crate::lvm::Lvm;

/// Handle to an LVM volume group.
///
/// Carries only the name; every property read goes back to the tools,
/// so two handles for the same group can never disagree.
#[derive(Clone)]
pub struct VolumeGroup {
    lvm: Lvm,
    name: String,
}

impl fmt::Debug for VolumeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolumeGroup({})", self.name)
    }
}

impl fmt::Display for VolumeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl VolumeGroup {
    pub(crate) fn from_name(lvm: &Lvm, name: impl Into<String>) -> Self {
        Self {
            lvm: lvm.clone(),
            name: name.into(),
        }
    }

    /// The group's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a volume group from physical volume paths.
    pub fn create(lvm: &Lvm, name: &str, pv_paths: &[&str]) -> Result<Self> {
        if !is_name_valid(name) {
            return Err(LvmError::InvalidName(name.to_string()));
        }
        let mut args = vec![name];
        args.extend_from_slice(pv_paths);
        lvm.invoke(LvmCommand::Vgcreate, &args)?;
        Ok(Self::from_name(lvm, name))
    }

    /// All volume groups carrying `tag`.
    pub fn find_by_tag(lvm: &Lvm, tag: &str) -> Result<Vec<Self>> {
        let selector = format!("vg_tags = {tag}");
        let raw = lvm.invoke(
            LvmCommand::Vgs,
            &["--noheadings", "--select", &selector, "-o", "vg_name"],
        )?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Self::from_name(lvm, name))
            .collect())
    }

    /// The single volume group carrying `tag`.
    ///
    /// Only valid for tags known to be unique (e.g. the base storage
    /// group tag); anything else is [`LvmError::AmbiguousLookup`].
    pub fn from_tag(lvm: &Lvm, tag: &str) -> Result<Self> {
        let mut groups = Self::find_by_tag(lvm, tag)?;
        if groups.len() != 1 {
            return Err(LvmError::AmbiguousLookup {
                selector: format!("@{tag}"),
                matches: groups.len(),
            });
        }
        Ok(groups.remove(0))
    }

    pub fn add_tag(&self, tag: &str) -> Result<()> {
        self.lvm
            .invoke(LvmCommand::Vgchange, &["--addtag", tag, &self.name])?;
        Ok(())
    }

    pub fn del_tag(&self, tag: &str) -> Result<()> {
        self.lvm
            .invoke(LvmCommand::Vgchange, &["--deltag", tag, &self.name])?;
        Ok(())
    }

    /// The group's tag set (comma-separated `vg_tags` field).
    pub fn tags(&self) -> Result<Vec<String>> {
        let raw = self
            .lvm
            .invoke(LvmCommand::Vgs, &["--noheadings", "-o", "vg_tags", &self.name])?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        Ok(raw.split(',').map(|tag| tag.trim().to_string()).collect())
    }

    /// Free space in the group, in MiB.
    pub fn free_mib(&self) -> Result<f64> {
        let raw = self.lvm.invoke(
            LvmCommand::Vgs,
            &[
                "--noheadings",
                "--nosuffix",
                "--units",
                "m",
                "-o",
                "vg_free",
                &self.name,
            ],
        )?;
        let raw = raw.trim();
        debug!("Free space in {self}: {raw} MiB");
        raw.parse()
            .map_err(|_| LvmError::ParseOutput(format!("bad vg_free value: {raw:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    #[test]
    fn create_validates_the_name() {
        let fake = FakeRunner::new();
        let lvm = Lvm::with_runner(fake.clone());

        let err = VolumeGroup::create(&lvm, "-bad", &["/dev/sda1"]).unwrap_err();
        assert!(matches!(err, LvmError::InvalidName(_)));
        assert!(fake.calls_for("vgcreate").is_empty());

        VolumeGroup::create(&lvm, "HostVG", &["/dev/sda1", "/dev/sdb1"]).unwrap();
        let calls = fake.calls_for("vgcreate");
        assert_eq!(calls[0], ["HostVG", "/dev/sda1", "/dev/sdb1"]);
    }

    #[test]
    fn from_tag_requires_exactly_one_match() {
        let fake = FakeRunner::new();
        fake.set_output("vg_name", "  HostVG\n  OtherVG\n");
        let lvm = Lvm::with_runner(fake.clone());

        let err = VolumeGroup::from_tag(&lvm, "imglayer").unwrap_err();
        assert!(matches!(err, LvmError::AmbiguousLookup { matches: 2, .. }));

        fake.set_output("vg_name", "  HostVG\n");
        let vg = VolumeGroup::from_tag(&lvm, "imglayer").unwrap();
        assert_eq!(vg.name(), "HostVG");
    }

    #[test]
    fn parses_comma_separated_tags() {
        let fake = FakeRunner::new();
        fake.set_output("vg_tags", "  imglayer,base \n");
        let lvm = Lvm::with_runner(fake.clone());
        let vg = VolumeGroup::from_name(&lvm, "HostVG");

        assert_eq!(vg.tags().unwrap(), ["imglayer", "base"]);

        fake.set_output("vg_tags", "\n");
        assert!(vg.tags().unwrap().is_empty());
    }

    #[test]
    fn parses_free_space() {
        let fake = FakeRunner::new();
        fake.set_output("vg_free", "  2048.00\n");
        let lvm = Lvm::with_runner(fake.clone());
        let vg = VolumeGroup::from_name(&lvm, "HostVG");

        assert_eq!(vg.free_mib().unwrap(), 2048.0);
    }
}
