// SPDX-License-Identifier: GPL-3.0-only

//! Release-compatibility marker
//!
//! Each layer carries a CPE string in `etc/system-release-cpe`
//! (`cpe:/o:vendor:product:version...`). Packages are only re-applied
//! into a new layer whose vendor and product match the running host's.

use std::fs;
use std::path::Path;

use crate::error::{PersistError, Result};

const CPE_OS_PREFIX: &str = "cpe:/o:";

/// Parsed system release marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRelease {
    pub vendor: String,
    pub product: String,
    pub version: Option<String>,
}

impl SystemRelease {
    /// Parse a CPE string such as `cpe:/o:centos:centos:8`.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim();
        let rest = content
            .strip_prefix(CPE_OS_PREFIX)
            .ok_or_else(|| PersistError::UnsupportedRelease(content.to_string()))?;
        let mut fields = rest.split(':');
        match (fields.next(), fields.next()) {
            (Some(vendor), Some(product)) if !vendor.is_empty() && !product.is_empty() => {
                Ok(Self {
                    vendor: vendor.to_string(),
                    product: product.to_string(),
                    version: fields.next().map(str::to_string),
                })
            }
            _ => Err(PersistError::UnsupportedRelease(content.to_string())),
        }
    }

    /// Read and parse a marker file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// The new layer is compatible when vendor and product match;
    /// versions are allowed to differ across an upgrade.
    pub fn is_compatible_with(&self, host: &SystemRelease) -> bool {
        self.vendor == host.vendor && self.product == host.product
    }
}
