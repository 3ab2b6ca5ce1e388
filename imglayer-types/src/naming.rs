// SPDX-License-Identifier: GPL-3.0-only

//! Naming rules for volume groups and logical volumes
//!
//! The rule follows blivet: LVM itself allows `vgname + lvname` up to
//! 126 characters minus an unspecified number of hyphen-dependent
//! reservations, so a hard cap of 55 per name stays safely inside that.

/// Maximum accepted length for a single VG or LV name.
pub const MAX_NAME_LEN: usize = 55;

/// Check whether `name` is acceptable as a VG or LV name.
///
/// Rejects `.` and `..`, names longer than [`MAX_NAME_LEN`], names
/// starting with `-`, and any character outside `[A-Za-z0-9+_.-]`.
/// Must be consulted before every create or rename; the LVM tools are
/// not the place to find out a name is bad.
pub fn is_name_valid(name: &str) -> bool {
    if name == "." || name == ".." {
        return false;
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !is_name_start(first) {
        return false;
    }
    if !chars.all(is_name_char) {
        return false;
    }

    name.len() <= MAX_NAME_LEN
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.')
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c == '-'
}
