// SPDX-License-Identifier: GPL-3.0-only

//! Qualified LV names and permission modes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A token that was expected to be a qualified `VG/LV` name but is not.
#[derive(Debug, Error)]
#[error("not a qualified VG/LV name: {0}")]
pub struct InvalidQualifiedName(pub String);

/// The qualified name of a logical volume: volume group plus LV name.
///
/// Displays as `VG/LV`, the form the LVM tools accept everywhere a
/// volume has to be addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LvmName {
    /// Owning volume group name
    pub vg_name: String,

    /// Logical volume name within the group
    pub lv_name: String,
}

impl LvmName {
    /// Build a qualified name from its two halves.
    pub fn new(vg_name: impl Into<String>, lv_name: impl Into<String>) -> Self {
        Self {
            vg_name: vg_name.into(),
            lv_name: lv_name.into(),
        }
    }
}

impl fmt::Display for LvmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vg_name, self.lv_name)
    }
}

impl FromStr for LvmName {
    type Err = InvalidQualifiedName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((vg, lv)) if !vg.is_empty() && !lv.is_empty() && !lv.contains('/') => {
                Ok(Self::new(vg, lv))
            }
            _ => Err(InvalidQualifiedName(s.to_string())),
        }
    }
}

/// Permission mode of a logical volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// Volume may not be written to (`lvchange --permission r`)
    ReadOnly,

    /// Volume is writable (`lvchange --permission rw`)
    ReadWrite,
}

impl Permission {
    /// The flag value `lvchange --permission` expects.
    pub fn as_flag(self) -> &'static str {
        match self {
            Permission::ReadOnly => "r",
            Permission::ReadWrite => "rw",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            Permission::ReadOnly => "read-only",
            Permission::ReadWrite => "read-write",
        };
        write!(f, "{mode}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_round_trips() {
        let name = LvmName::new("HostVG", "Base-0");
        assert_eq!(name.to_string(), "HostVG/Base-0");

        let parsed: LvmName = name.to_string().parse().unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn rejects_unqualified_tokens() {
        assert!("plainword".parse::<LvmName>().is_err());
        assert!("/leading".parse::<LvmName>().is_err());
        assert!("trailing/".parse::<LvmName>().is_err());
        assert!("a/b/c".parse::<LvmName>().is_err());
    }

    #[test]
    fn permission_flags() {
        assert_eq!(Permission::ReadOnly.as_flag(), "r");
        assert_eq!(Permission::ReadWrite.as_flag(), "rw");
    }
}
